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

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::AssetRef;

/// Identifier of one running state tree instance
///
/// An instance id is a tuple (id, serial) where:
/// - `id`: Numeric identifier, may be reused by the runtime once an instance is destroyed
/// - `serial`: Serial number that disambiguates reused ids
///
/// `(0, 0)` is reserved: see [`InstanceId::INVALID`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct InstanceId {
    /// Numeric instance id
    pub id: u32,
    /// Serial number of the id
    pub serial: u32,
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.id, self.serial)
    }
}

impl InstanceId {
    /// The invalid id. When used as a query key it stands for "every instance".
    pub const INVALID: Self = Self { id: 0, serial: 0 };

    /// Create a new instance id
    pub const fn new(id: u32, serial: u32) -> Self {
        Self { id, serial }
    }

    /// Whether the id names a concrete instance
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

/// Lifecycle transition of an instance, as reported by `InstanceEvent` records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceLifecycle {
    /// The instance started executing
    Started,
    /// The instance was stopped and destroyed
    Stopped,
}

/// Describes one traceable instance, as registered by an `InstanceEvent` record.
///
/// The descriptor only refers to its asset (see [`AssetRef`]); it never keeps it alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDescriptor {
    /// State tree asset executed by the instance
    pub asset: AssetRef,
    /// Id of the instance
    pub id: InstanceId,
    /// Display name reported by the runtime
    pub name: String,
}

impl InstanceDescriptor {
    /// Create a new descriptor
    pub fn new(asset: AssetRef, id: InstanceId, name: impl Into<String>) -> Self {
        Self { asset, id, name: name.into() }
    }

    /// Whether the descriptor points to a valid instance
    pub fn is_valid(&self) -> bool {
        self.id.is_valid()
    }
}

impl fmt::Display for InstanceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_instance_id() {
        assert!(!InstanceId::INVALID.is_valid());
        assert!(!InstanceId::default().is_valid());
        assert!(InstanceId::new(1, 0).is_valid());
        assert!(InstanceId::new(0, 1).is_valid());
    }

    #[test]
    fn test_serial_disambiguates_reused_ids() {
        let first = InstanceId::new(7, 1);
        let reused = InstanceId::new(7, 2);
        assert_ne!(first, reused);
        assert_eq!(first.to_string(), "7.1");
    }
}
