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

use parking_lot::Mutex;
use stdb_common::types::{BreakpointHit, BreakpointSet, FrameIndexSpan, StateHandle, TimedEvent};

/// Receives debugger notifications. Every method defaults to doing nothing.
///
/// Callbacks are never invoked while the session store is locked.
pub trait DebuggerObserver: Send {
    /// The buffered events of the debugged instance changed
    fn on_traces_updated(&mut self, _events: &[TimedEvent], _spans: &[FrameIndexSpan]) {}

    /// A breakpoint fired
    fn on_breakpoint_hit(&mut self, _hit: &BreakpointHit) {}

    /// The breakpoint set changed
    fn on_breakpoints_changed(&mut self, _breakpoints: &BreakpointSet) {}

    /// The active states of the debugged instance changed
    fn on_active_states_changed(&mut self, _states: &[StateHandle]) {}
}

/// Notification captured by a [`NotificationRecorder`]
#[derive(Debug, Clone, PartialEq)]
pub enum DebuggerNotification {
    /// Buffered events changed
    TracesUpdated {
        /// Number of buffered events
        events: usize,
        /// Number of frames with events
        spans: usize,
    },
    /// A breakpoint fired
    BreakpointHit(BreakpointHit),
    /// Breakpoints changed, sorted
    BreakpointsChanged(Vec<StateHandle>),
    /// Active states changed
    ActiveStatesChanged(Vec<StateHandle>),
}

/// Observer that queues every notification for later inspection
#[derive(Debug, Clone, Default)]
pub struct NotificationRecorder {
    log: Arc<Mutex<Vec<DebuggerNotification>>>,
}

impl NotificationRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the queued notifications
    pub fn take(&self) -> Vec<DebuggerNotification> {
        std::mem::take(&mut *self.log.lock())
    }

    /// Breakpoint hits among the queued notifications, leaving the queue untouched
    pub fn hits(&self) -> Vec<BreakpointHit> {
        self.log
            .lock()
            .iter()
            .filter_map(|n| match n {
                DebuggerNotification::BreakpointHit(hit) => Some(*hit),
                _ => None,
            })
            .collect()
    }
}

impl DebuggerObserver for NotificationRecorder {
    fn on_traces_updated(&mut self, events: &[TimedEvent], spans: &[FrameIndexSpan]) {
        self.log
            .lock()
            .push(DebuggerNotification::TracesUpdated { events: events.len(), spans: spans.len() });
    }

    fn on_breakpoint_hit(&mut self, hit: &BreakpointHit) {
        self.log.lock().push(DebuggerNotification::BreakpointHit(*hit));
    }

    fn on_breakpoints_changed(&mut self, breakpoints: &BreakpointSet) {
        self.log.lock().push(DebuggerNotification::BreakpointsChanged(breakpoints.to_sorted_vec()));
    }

    fn on_active_states_changed(&mut self, states: &[StateHandle]) {
        self.log.lock().push(DebuggerNotification::ActiveStatesChanged(states.to_vec()));
    }
}
