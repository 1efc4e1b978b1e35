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

/// Stable identifier of one state in a compiled state tree layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateHandle(pub u16);

impl StateHandle {
    /// Handle that does not name any state
    pub const INVALID: Self = Self(u16::MAX);

    /// Create a handle from a compiled state index
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Compiled state index
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Whether the handle names a state
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for StateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            write!(f, "#invalid")
        }
    }
}

/// Transition kind of a state event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateEventKind {
    /// The state was entered
    Enter,
    /// The state was exited
    Exit,
    /// The state completed
    Completed,
}

/// Transition kind of a task event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskEventKind {
    /// The task was entered
    Enter,
    /// The task was exited
    Exit,
    /// The task ticked
    Tick,
    /// The task completed
    Completed,
}

/// Run status reported by a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Still running
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with a failure
    Failed,
    /// No status reported
    Unset,
}

/// One typed event recorded for a state tree instance.
///
/// The set of kinds is closed; consumers match on it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// Free text message
    Log {
        /// Logged message
        message: String,
    },
    /// A state transition
    State {
        /// Compiled state index
        index: StateHandle,
        /// Transition kind
        kind: StateEventKind,
    },
    /// A task transition
    Task {
        /// Compiled task index
        index: u16,
        /// Transition kind
        kind: TaskEventKind,
        /// Status reported by the task
        status: RunStatus,
        /// Serialized instance data of the task
        data: String,
    },
    /// A condition evaluation
    Condition {
        /// Compiled condition index
        index: u16,
        /// Evaluation result
        passed: bool,
    },
    /// The complete list of active states, from root to leaf
    ActiveStates {
        /// Active states
        states: Vec<StateHandle>,
    },
}

impl TraceEvent {
    /// Short name of the event kind
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Log { .. } => "Log",
            Self::State { .. } => "State",
            Self::Task { .. } => "Task",
            Self::Condition { .. } => "Condition",
            Self::ActiveStates { .. } => "ActiveStates",
        }
    }

    /// The state entered by this event, if it is a state `Enter` event
    pub fn entered_state(&self) -> Option<StateHandle> {
        match self {
            Self::State { index, kind: StateEventKind::Enter } => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log { message } => write!(f, "Log: {message}"),
            Self::State { index, kind } => write!(f, "State {index} {kind:?}"),
            Self::Task { index, kind, status, .. } => write!(f, "Task #{index} {kind:?} ({status:?})"),
            Self::Condition { index, passed } => {
                write!(f, "Condition #{index} {}", if *passed { "passed" } else { "failed" })
            }
            Self::ActiveStates { states } => {
                write!(f, "ActiveStates [")?;
                for (i, state) in states.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{state}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// An event with the time and frame it was recorded at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Recording time in seconds
    pub time: f64,
    /// Index of the frame the event belongs to
    pub frame_index: u64,
    /// The event itself
    pub event: TraceEvent,
}

impl TimedEvent {
    /// Create a new timed event
    pub fn new(time: f64, frame_index: u64, event: TraceEvent) -> Self {
        Self { time, frame_index, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entered_state() {
        let enter = TraceEvent::State { index: StateHandle(3), kind: StateEventKind::Enter };
        let exit = TraceEvent::State { index: StateHandle(3), kind: StateEventKind::Exit };
        assert_eq!(enter.entered_state(), Some(StateHandle(3)));
        assert_eq!(exit.entered_state(), None);
        assert_eq!(TraceEvent::Log { message: "x".into() }.entered_state(), None);
    }

    #[test]
    fn test_display() {
        let event = TraceEvent::ActiveStates { states: vec![StateHandle(0), StateHandle(2)] };
        assert_eq!(event.to_string(), "ActiveStates [#0, #2]");
        assert_eq!(StateHandle::INVALID.to_string(), "#invalid");
    }
}
