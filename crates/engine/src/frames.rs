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

//! Frame index: maps session time to discrete frames
//!
//! Frames are recorded per [`FrameType`] from `BeginFrame`/`EndFrame` records.
//! A frame stays open (`end_time == f64::INFINITY`) until it is ended or the
//! next frame of the same type begins.

use serde::{Deserialize, Serialize};
use stdb_common::types::{Frame, FrameType};

use crate::OutOfOrder;

/// Read access to frame boundaries
pub trait FrameProvider {
    /// Frame containing `time`: the last frame starting at or before it
    fn frame_from_time(&self, frame_type: FrameType, time: f64) -> Option<Frame>;

    /// Frame with the given index
    fn frame(&self, frame_type: FrameType, index: u64) -> Option<Frame>;

    /// Number of frames recorded so far
    fn frame_count(&self, frame_type: FrameType) -> u64;

    /// Last completed frame at or before `time`.
    ///
    /// When the frame containing `time` is still open, the frame before it is
    /// returned, so readers only ever see frames that can no longer grow.
    fn completed_frame_at(&self, frame_type: FrameType, time: f64) -> Option<Frame> {
        let frame = self.frame_from_time(frame_type, time)?;
        if frame.is_complete() {
            Some(frame)
        } else {
            frame.index.checked_sub(1).and_then(|prev| self.frame(frame_type, prev))
        }
    }
}

/// In-memory frame index built during analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameIndex {
    game: Vec<Frame>,
    rendering: Vec<Frame>,
}

impl FrameIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    fn frames(&self, frame_type: FrameType) -> &Vec<Frame> {
        match frame_type {
            FrameType::Game => &self.game,
            FrameType::Rendering => &self.rendering,
        }
    }

    fn frames_mut(&mut self, frame_type: FrameType) -> &mut Vec<Frame> {
        match frame_type {
            FrameType::Game => &mut self.game,
            FrameType::Rendering => &mut self.rendering,
        }
    }

    /// Open a new frame at `time`, closing the previous one if still open.
    /// A frame starting before the previous one is rejected.
    pub fn begin_frame(&mut self, frame_type: FrameType, time: f64) -> Result<(), OutOfOrder> {
        let frames = self.frames_mut(frame_type);
        if let Some(last) = frames.last_mut() {
            if time < last.start_time || time.is_nan() {
                return Err(OutOfOrder { time, last: last.start_time });
            }
            if !last.is_complete() {
                last.end_time = time;
            }
        }
        let index = frames.len() as u64;
        frames.push(Frame { index, start_time: time, end_time: f64::INFINITY });
        Ok(())
    }

    /// Close the open frame at `time`. Ignored when no frame is open.
    pub fn end_frame(&mut self, frame_type: FrameType, time: f64) {
        if let Some(last) = self.frames_mut(frame_type).last_mut() {
            if !last.is_complete() {
                last.end_time = time.max(last.start_time);
            }
        }
    }

    /// Index of the frame containing `time`, `0` before the first frame
    pub fn frame_index_at(&self, frame_type: FrameType, time: f64) -> u64 {
        self.frame_from_time(frame_type, time).map(|f| f.index).unwrap_or_default()
    }
}

impl FrameProvider for FrameIndex {
    fn frame_from_time(&self, frame_type: FrameType, time: f64) -> Option<Frame> {
        let frames = self.frames(frame_type);
        let next = frames.partition_point(|f| f.start_time <= time);
        next.checked_sub(1).map(|i| frames[i])
    }

    fn frame(&self, frame_type: FrameType, index: u64) -> Option<Frame> {
        self.frames(frame_type).get(usize::try_from(index).ok()?).copied()
    }

    fn frame_count(&self, frame_type: FrameType) -> u64 {
        self.frames(frame_type).len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with_frames(boundaries: &[f64]) -> FrameIndex {
        let mut index = FrameIndex::new();
        for pair in boundaries.windows(2) {
            index.begin_frame(FrameType::Game, pair[0]).unwrap();
            index.end_frame(FrameType::Game, pair[1]);
        }
        index
    }

    #[test]
    fn test_frame_from_time() {
        let index = index_with_frames(&[0.0, 0.1, 0.2, 0.3]);

        assert_eq!(index.frame_count(FrameType::Game), 3);
        assert_eq!(index.frame_from_time(FrameType::Game, 0.15).map(|f| f.index), Some(1));
        assert_eq!(index.frame_from_time(FrameType::Game, 0.1).map(|f| f.index), Some(1));
        assert_eq!(index.frame_index_at(FrameType::Game, -1.0), 0);
        assert!(index.frame_from_time(FrameType::Game, -1.0).is_none());
        assert!(index.frame_from_time(FrameType::Rendering, 0.15).is_none());
    }

    #[test]
    fn test_begin_closes_open_frame() {
        let mut index = FrameIndex::new();
        index.begin_frame(FrameType::Game, 1.0).unwrap();
        index.begin_frame(FrameType::Game, 1.5).unwrap();

        let first = index.frame(FrameType::Game, 0).unwrap();
        assert_eq!(first.end_time, 1.5);
        assert!(!index.frame(FrameType::Game, 1).unwrap().is_complete());
    }

    #[test]
    fn test_completed_frame_skips_open_frame() {
        let mut index = index_with_frames(&[0.9, 1.0, 1.1]);
        index.begin_frame(FrameType::Game, 1.1).unwrap();

        assert_eq!(index.completed_frame_at(FrameType::Game, 1.05).map(|f| f.index), Some(1));
        assert_eq!(index.completed_frame_at(FrameType::Game, 1.2).map(|f| f.index), Some(1));

        let mut single = FrameIndex::new();
        single.begin_frame(FrameType::Game, 0.0).unwrap();
        assert!(single.completed_frame_at(FrameType::Game, 0.5).is_none());
    }

    #[test]
    fn test_frame_starting_earlier_is_rejected() {
        let mut index = index_with_frames(&[1.0, 2.0]);

        assert_eq!(
            index.begin_frame(FrameType::Game, 0.5),
            Err(OutOfOrder { time: 0.5, last: 1.0 })
        );
        assert_eq!(index.frame_count(FrameType::Game), 1);
        assert_eq!(index.frame_from_time(FrameType::Game, 1.5).map(|f| f.index), Some(0));
    }
}
