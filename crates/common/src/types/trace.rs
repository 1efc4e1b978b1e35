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

/// Identifier of a recorded trace inside a trace store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceId(pub u32);

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata of the session a trace was recorded in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Platform the traced program ran on
    pub platform: String,
    /// Name of the traced application
    pub app_name: String,
    /// Build configuration of the traced application
    pub build_config: String,
}

/// Describes one recorded trace available in a trace store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceDescriptor {
    /// Store-assigned id
    pub id: TraceId,
    /// Display name
    pub name: String,
    /// Session metadata read from the trace header
    pub metadata: SessionMetadata,
}

impl fmt::Display for TraceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.name)?;
        let meta = &self.metadata;
        if !meta.app_name.is_empty() {
            write!(f, " - {} ({}, {})", meta.app_name, meta.platform, meta.build_config)?;
        }
        Ok(())
    }
}
