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

use std::sync::Arc;

use parking_lot::RwLock;
use stdb_common::{types::FrameType, wire::TraceHeader};

use crate::{
    gameplay::{AnimationProvider, GameplayProvider},
    FrameIndex, StateTreeTraceProvider,
};

/// Session store shared between the analysis thread and its readers.
///
/// The analysis thread takes the write lock for exactly one record at a time.
/// Readers take the read lock for one query batch and must release it before
/// calling out to observers.
pub type SharedSessionStore = Arc<RwLock<SessionStore>>;

/// Every provider filled by one analysis session
#[derive(Debug, Default)]
pub struct SessionStore {
    /// State tree timelines and instances
    pub state_tree: StateTreeTraceProvider,
    /// Frame boundaries
    pub frames: FrameIndex,
    /// Traced objects
    pub gameplay: GameplayProvider,
    /// Animation timelines
    pub animation: AnimationProvider,
    frame_type: FrameType,
    header: Option<TraceHeader>,
    duration: f64,
}

impl SessionStore {
    /// Create an empty store stamping events with `frame_type` frames
    pub fn new(frame_type: FrameType) -> Self {
        Self { frame_type, ..Default::default() }
    }

    /// Wrap a new store for sharing
    pub fn shared(frame_type: FrameType) -> SharedSessionStore {
        Arc::new(RwLock::new(Self::new(frame_type)))
    }

    /// Frame type used to stamp events
    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Trace header, once decoded
    pub fn header(&self) -> Option<&TraceHeader> {
        self.header.as_ref()
    }

    pub(crate) fn set_header(&mut self, header: TraceHeader) {
        self.header = Some(header);
    }

    /// Latest timestamp seen in any record
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Extend the session duration to `time`
    pub fn advance_duration(&mut self, time: f64) {
        if time > self.duration {
            self.duration = time;
        }
    }
}
