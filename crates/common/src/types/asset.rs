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

use std::{
    fmt,
    sync::{Arc, Weak},
};

use serde::{Deserialize, Serialize};

use crate::types::StateHandle;

/// Compiled description of a state tree asset, as loaded by the host.
///
/// Only the parts needed to interpret a trace are kept: the names of the
/// compiled states, tasks and conditions (indexed the same way trace records
/// index them) and the hash of the compiled data used to reject traces that
/// were recorded against another compilation of the asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTreeAsset {
    /// Asset name
    pub name: String,
    /// Package path the asset lives in
    pub package_path: String,
    /// Hash of the compiled data
    pub compiled_data_hash: u32,
    /// Compiled state names, indexed by [`StateHandle`]
    #[serde(default)]
    pub states: Vec<String>,
    /// Compiled task names, indexed by task index
    #[serde(default)]
    pub tasks: Vec<String>,
    /// Compiled condition names, indexed by condition index
    #[serde(default)]
    pub conditions: Vec<String>,
}

impl StateTreeAsset {
    /// Create an asset without any compiled nodes
    pub fn new(
        name: impl Into<String>,
        package_path: impl Into<String>,
        compiled_data_hash: u32,
    ) -> Self {
        Self {
            name: name.into(),
            package_path: package_path.into(),
            compiled_data_hash,
            ..Default::default()
        }
    }

    /// Set the compiled state names
    pub fn with_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states = states.into_iter().map(Into::into).collect();
        self
    }

    /// Set the compiled task names
    pub fn with_tasks<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks = tasks.into_iter().map(Into::into).collect();
        self
    }

    /// Total number of compiled nodes (states, tasks and conditions)
    pub fn node_count(&self) -> usize {
        self.states.len() + self.tasks.len() + self.conditions.len()
    }

    /// Name of a compiled state
    pub fn state_name(&self, handle: StateHandle) -> Option<&str> {
        self.states.get(handle.index()).map(String::as_str)
    }

    /// Find the handle of a state by name
    pub fn find_state(&self, name: &str) -> Option<StateHandle> {
        self.states.iter().position(|s| s == name).map(|i| StateHandle::new(i as u16))
    }

    /// Name of a compiled task
    pub fn task_name(&self, index: u16) -> Option<&str> {
        self.tasks.get(index as usize).map(String::as_str)
    }

    /// Name of a compiled condition
    pub fn condition_name(&self, index: u16) -> Option<&str> {
        self.conditions.get(index as usize).map(String::as_str)
    }
}

/// Non-owning reference to a [`StateTreeAsset`].
///
/// Lifetime of the asset is managed by the host (the asset resolver). Two
/// references are equal when they point at the same asset allocation.
#[derive(Clone, Default)]
pub struct AssetRef(Weak<StateTreeAsset>);

impl AssetRef {
    /// Create a reference to an asset
    pub fn new(asset: &Arc<StateTreeAsset>) -> Self {
        Self(Arc::downgrade(asset))
    }

    /// A reference that never resolves
    pub fn none() -> Self {
        Self(Weak::new())
    }

    /// Get the asset if it is still alive
    pub fn upgrade(&self) -> Option<Arc<StateTreeAsset>> {
        self.0.upgrade()
    }

    /// Whether the asset is still alive
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Whether this reference points to `asset`
    pub fn points_to(&self, asset: &Arc<StateTreeAsset>) -> bool {
        Weak::ptr_eq(&self.0, &Arc::downgrade(asset))
    }
}

impl PartialEq for AssetRef {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for AssetRef {}

impl fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(asset) => write!(f, "AssetRef({}/{})", asset.package_path, asset.name),
            None => write!(f, "AssetRef(<released>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_ref_does_not_keep_asset_alive() {
        let asset = Arc::new(StateTreeAsset::new("Tree", "/Game/AI", 42));
        let asset_ref = AssetRef::new(&asset);
        assert!(asset_ref.is_alive());
        assert!(asset_ref.points_to(&asset));

        drop(asset);
        assert!(!asset_ref.is_alive());
        assert!(asset_ref.upgrade().is_none());
    }

    #[test]
    fn test_asset_ref_identity() {
        let a = Arc::new(StateTreeAsset::new("Tree", "/Game/AI", 42));
        let b = Arc::new(StateTreeAsset::new("Tree", "/Game/AI", 42));
        assert_eq!(AssetRef::new(&a), AssetRef::new(&a));
        assert_ne!(AssetRef::new(&a), AssetRef::new(&b));
    }

    #[test]
    fn test_find_state() {
        let asset = StateTreeAsset::new("Tree", "/Game/AI", 1).with_states(["Root", "Idle", "Walk"]);
        assert_eq!(asset.find_state("Walk"), Some(StateHandle::new(2)));
        assert_eq!(asset.find_state("Run"), None);
        assert_eq!(asset.state_name(StateHandle::new(1)), Some("Idle"));
        assert_eq!(asset.node_count(), 3);
    }
}
