// STDB - State Tree Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Asset resolution
//!
//! The analyzer looks state tree assets up by `(package path, name)` to check
//! that a trace was recorded against the compilation currently loaded. The
//! host owns the assets; the engine only ever holds weak references to them
//! outside of a lookup.

use std::{collections::HashMap, fs, path::Path, sync::Arc};

use eyre::{Context, Result};
use parking_lot::RwLock;
use stdb_common::types::StateTreeAsset;
use tracing::debug;

/// Looks up loaded state tree assets
pub trait AssetResolver: Send + Sync {
    /// Find the asset named `name` in `package_path`
    fn resolve(&self, package_path: &str, name: &str) -> Option<Arc<StateTreeAsset>>;
}

/// In-memory asset registry.
///
/// Registering an asset under an existing key replaces it, which models a
/// recompile: references to the previous asset stop resolving once the last
/// strong handle is gone.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    assets: RwLock<HashMap<(String, String), Arc<StateTreeAsset>>>,
}

impl AssetRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset, returning the shared handle kept by the registry
    pub fn register(&self, asset: StateTreeAsset) -> Arc<StateTreeAsset> {
        let key = (asset.package_path.clone(), asset.name.clone());
        let asset = Arc::new(asset);
        if self.assets.write().insert(key, asset.clone()).is_some() {
            debug!(name = %asset.name, hash = asset.compiled_data_hash, "Replaced asset");
        }
        asset
    }

    /// Load an asset description from a JSON file and register it
    pub fn load_json(&self, path: &Path) -> Result<Arc<StateTreeAsset>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read asset file: {path:?}"))?;
        let asset: StateTreeAsset = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse asset file: {path:?}"))?;
        Ok(self.register(asset))
    }

    /// Remove an asset
    pub fn unregister(&self, package_path: &str, name: &str) -> Option<Arc<StateTreeAsset>> {
        self.assets.write().remove(&(package_path.to_string(), name.to_string()))
    }

    /// Number of registered assets
    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }
}

impl AssetResolver for AssetRegistry {
    fn resolve(&self, package_path: &str, name: &str) -> Option<Arc<StateTreeAsset>> {
        self.assets.read().get(&(package_path.to_string(), name.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stdb_common::types::AssetRef;

    #[test]
    fn test_resolve() {
        let registry = AssetRegistry::new();
        let asset = registry.register(StateTreeAsset::new("Guard", "/Game/AI", 7));

        let resolved = registry.resolve("/Game/AI", "Guard").unwrap();
        assert!(Arc::ptr_eq(&asset, &resolved));
        assert!(registry.resolve("/Game/AI", "Other").is_none());
        assert!(registry.resolve("/Game", "Guard").is_none());
    }

    #[test]
    fn test_replace_releases_previous_asset() {
        let registry = AssetRegistry::new();
        let weak = AssetRef::new(&registry.register(StateTreeAsset::new("Guard", "/Game/AI", 1)));
        assert!(weak.is_alive());

        registry.register(StateTreeAsset::new("Guard", "/Game/AI", 2));
        assert!(!weak.is_alive());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("/Game/AI", "Guard").unwrap().compiled_data_hash, 2);
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.json");
        fs::write(
            &path,
            r#"{"name":"Guard","package_path":"/Game/AI","compiled_data_hash":9,"states":["Root","Patrol"]}"#,
        )
        .unwrap();

        let registry = AssetRegistry::new();
        let asset = registry.load_json(&path).unwrap();
        assert_eq!(asset.states.len(), 2);
        assert!(asset.tasks.is_empty());
        assert!(registry.resolve("/Game/AI", "Guard").is_some());

        fs::write(&path, "not json").unwrap();
        assert!(registry.load_json(&path).is_err());
    }
}
