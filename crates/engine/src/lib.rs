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

//! STDB Engine - trace analysis and debugging for state tree traces
//!
//! Analysis sessions decode recorded traces into per-instance timelines,
//! frame boundaries and gameplay data. The [`StateTreeDebugger`] reads those
//! timelines to evaluate breakpoints and step through recorded frames.

pub mod analyzer;
pub use analyzer::*;

pub mod asset;
pub use asset::*;

pub mod debugger;
pub use debugger::*;

pub mod frames;
pub use frames::*;

pub mod gameplay;

pub mod provider;
pub use provider::*;

pub mod session;
pub use session::*;

pub mod store;
pub use store::*;

pub mod timeline;
pub use timeline::*;
