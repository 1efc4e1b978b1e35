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

use std::{collections::HashSet, fmt::Display, str::FromStr};

use eyre::{bail, eyre, Error, Result};
use serde::{Deserialize, Serialize};

use crate::types::{InstanceId, StateHandle, StateTreeAsset};

/// Set of states the debugger breaks on when they are entered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSet {
    states: HashSet<StateHandle>,
}

impl BreakpointSet {
    /// Create an empty breakpoint set
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle every handle: handles already present are removed, missing ones are added.
    pub fn toggle<I>(&mut self, handles: I)
    where
        I: IntoIterator<Item = StateHandle>,
    {
        for handle in handles {
            if !self.states.remove(&handle) {
                self.states.insert(handle);
            }
        }
    }

    /// Add a breakpoint, returns false if it was already set
    pub fn insert(&mut self, handle: StateHandle) -> bool {
        self.states.insert(handle)
    }

    /// Remove a breakpoint, returns false if it was not set
    pub fn remove(&mut self, handle: StateHandle) -> bool {
        self.states.remove(&handle)
    }

    /// Check if a breakpoint exists for the given state
    pub fn contains(&self, handle: StateHandle) -> bool {
        self.states.contains(&handle)
    }

    /// Remove every breakpoint
    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Get breakpoint count
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no breakpoint is set
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Get all breakpoints as a sorted vector
    pub fn to_sorted_vec(&self) -> Vec<StateHandle> {
        let mut sorted: Vec<StateHandle> = self.states.iter().copied().collect();
        sorted.sort();
        sorted
    }
}

/// A breakpoint that fired while reading the trace
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakpointHit {
    /// Instance that entered the state
    pub instance: InstanceId,
    /// State that was entered
    pub state: StateHandle,
    /// Time of the state event
    pub time: f64,
    /// Frame of the state event
    pub frame_index: u64,
}

/// User facing breakpoint location, resolved against an asset.
///
/// Format:
/// - `#<index>` - Breakpoint on a compiled state index
/// - `<name>` - Breakpoint on the state with that name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakpointLocation {
    /// A compiled state index
    Index(u16),
    /// A state name
    Name(String),
}

impl FromStr for BreakpointLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            bail!("Empty breakpoint location");
        }

        if let Some(index) = trimmed.strip_prefix('#') {
            let index = index.parse::<u16>().map_err(|e| eyre!("Invalid state index: {e}"))?;
            if index == StateHandle::INVALID.0 {
                bail!("State index {index} is reserved");
            }
            Ok(Self::Index(index))
        } else {
            Ok(Self::Name(trimmed.to_string()))
        }
    }
}

impl Display for BreakpointLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(index) => write!(f, "#{index}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

impl BreakpointLocation {
    /// Resolve the location to a state handle of `asset`
    pub fn resolve(&self, asset: &StateTreeAsset) -> Result<StateHandle> {
        match self {
            Self::Index(index) => {
                if (*index as usize) < asset.states.len() {
                    Ok(StateHandle::new(*index))
                } else {
                    bail!("State index {index} out of bounds (total {})", asset.states.len())
                }
            }
            Self::Name(name) => asset
                .find_state(name)
                .ok_or_else(|| eyre!("State '{name}' not found in {}", asset.name)),
        }
    }
}
