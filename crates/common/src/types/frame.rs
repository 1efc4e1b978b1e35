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

use std::{fmt, str::FromStr};

use eyre::{bail, Error, Result};
use serde::{Deserialize, Serialize};

/// Kind of frame a frame boundary belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    /// Simulation (game thread) frames
    #[default]
    Game,
    /// Rendering frames
    Rendering,
}

impl FromStr for FrameType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "game" => Ok(Self::Game),
            "rendering" => Ok(Self::Rendering),
            other => bail!("Unknown frame type: {other}"),
        }
    }
}

/// One discrete frame of the traced program
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame index, starting at 0
    pub index: u64,
    /// Time the frame started, in seconds
    pub start_time: f64,
    /// Time the frame ended, `f64::INFINITY` while the frame is still open
    pub end_time: f64,
}

impl Frame {
    /// Whether the frame has been closed
    pub fn is_complete(&self) -> bool {
        self.end_time.is_finite()
    }

    /// Whether `time` falls into `[start_time, end_time)`
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {} [{:.4}s, {:.4}s)", self.index, self.start_time, self.end_time)
    }
}

/// Sparse index entry: the first buffered event of a frame that has events
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameIndexSpan {
    /// Frame index
    pub frame_index: u64,
    /// Time of the first event of the frame
    pub time: f64,
    /// Offset of the first event of the frame in the event buffer
    pub event_offset: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_contains_is_half_open() {
        let frame = Frame { index: 10, start_time: 0.9, end_time: 1.0 };
        assert!(frame.contains(0.9));
        assert!(frame.contains(0.95));
        assert!(!frame.contains(1.0));
        assert!(frame.is_complete());

        let open = Frame { index: 11, start_time: 1.0, end_time: f64::INFINITY };
        assert!(!open.is_complete());
        assert!(open.contains(1000.0));
    }

    #[test]
    fn test_frame_type_parsing() {
        assert_eq!("game".parse::<FrameType>().unwrap(), FrameType::Game);
        assert_eq!(" Rendering ".parse::<FrameType>().unwrap(), FrameType::Rendering);
        assert!("audio".parse::<FrameType>().is_err());
        assert_eq!(FrameType::default(), FrameType::Game);
    }
}
