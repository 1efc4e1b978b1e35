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

//! Gameplay track overlay
//!
//! Per-object timelines of gameplay and animation records, presented as a
//! hierarchy of tracks. Tracks are created on demand the first time an object
//! produces data, and the display order is recomputed in batches.

mod animation;
pub use animation::*;

mod provider;
pub use provider::*;

mod shared;
pub use shared::*;

mod track;
pub use track::*;
