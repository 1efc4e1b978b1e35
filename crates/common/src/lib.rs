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

//! STDB Common - Shared functionality for STDB components
//!
//! This crate provides the pieces shared by the analysis engine, the command
//! line front-end and the integration tests: the traced data model, the binary
//! trace wire format, configuration and logging setup.

/// Core data model: instances, events, frames, breakpoints and trace descriptors
pub mod types;

/// Configuration loading and defaults shared by every STDB component
pub mod config;
/// Logging setup and utilities for consistent logging across STDB components
pub mod logging;
/// Binary trace format: header, record framing, incremental reader and writer
pub mod wire;

pub use config::*;
pub use logging::*;
