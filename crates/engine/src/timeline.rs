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

//! Append-only, time-ordered event timelines
//!
//! Writers append entries in non-decreasing time order (the order the trace
//! stream delivers them). An entry older than the tail is rejected, so
//! readers can enumerate half-open time windows through binary search and a
//! query never walks entries outside the window.

use std::ops::Deref;

use serde::{Deserialize, Serialize};
use stdb_common::{types::TimedEvent, wire::WireError};
use thiserror::Error;

/// An entry that carries its own timestamp
pub trait Timed {
    /// Timestamp in seconds
    fn time(&self) -> f64;
}

impl Timed for TimedEvent {
    fn time(&self) -> f64 {
        self.time
    }
}

/// An entry was older than the last entry of its timeline
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("entry at {time}s precedes timeline end {last}s")]
pub struct OutOfOrder {
    /// Time of the rejected entry
    pub time: f64,
    /// Time of the last entry
    pub last: f64,
}

impl From<OutOfOrder> for WireError {
    fn from(e: OutOfOrder) -> Self {
        Self::OutOfOrder { time: e.time, last: e.last }
    }
}

/// Ordered collection of timed entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline<E> {
    entries: Vec<E>,
}

impl<E> Default for Timeline<E> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<E> Deref for Timeline<E> {
    type Target = [E];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl<'a, E> IntoIterator for &'a Timeline<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<E: Timed> Timeline<E> {
    /// Create an empty timeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Entries older than the last one are rejected and
    /// the timeline is left unchanged.
    pub fn push(&mut self, entry: E) -> Result<(), OutOfOrder> {
        if let Some(last) = self.end_time() {
            let time = entry.time();
            // NaN would break the partition points as well.
            if time < last || time.is_nan() {
                return Err(OutOfOrder { time, last });
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Time of the first entry
    pub fn start_time(&self) -> Option<f64> {
        self.entries.first().map(Timed::time)
    }

    /// Time of the last entry
    pub fn end_time(&self) -> Option<f64> {
        self.entries.last().map(Timed::time)
    }

    /// Offset of the first entry at or after `time`
    pub fn lower_bound(&self, time: f64) -> usize {
        self.entries.partition_point(|e| e.time() < time)
    }

    /// Entries whose time lies in `[start, end)`
    pub fn window(&self, start: f64, end: f64) -> &[E] {
        if start >= end {
            return &[];
        }
        let from = self.lower_bound(start);
        let to = self.lower_bound(end).max(from);
        &self.entries[from..to]
    }

    /// Last entry at or before `time`
    pub fn last_at_or_before(&self, time: f64) -> Option<&E> {
        let end = self.entries.partition_point(|e| e.time() <= time);
        end.checked_sub(1).map(|i| &self.entries[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stdb_common::types::TraceEvent;

    fn log(time: f64) -> TimedEvent {
        TimedEvent::new(time, 0, TraceEvent::Log { message: format!("t={time}") })
    }

    fn timeline(times: &[f64]) -> Timeline<TimedEvent> {
        let mut timeline = Timeline::new();
        for time in times {
            timeline.push(log(*time)).unwrap();
        }
        timeline
    }

    #[test]
    fn test_window_is_half_open() {
        let timeline = timeline(&[0.5, 1.0, 1.0, 1.5, 2.0]);

        let times: Vec<f64> = timeline.window(1.0, 2.0).iter().map(|e| e.time).collect();
        assert_eq!(times, vec![1.0, 1.0, 1.5]);

        assert!(timeline.window(2.5, 3.0).is_empty());
        assert!(timeline.window(1.0, 1.0).is_empty());
        assert!(timeline.window(2.0, 1.0).is_empty());
        assert_eq!(timeline.window(f64::NEG_INFINITY, f64::INFINITY).len(), 5);
    }

    #[test]
    fn test_last_at_or_before() {
        let timeline = timeline(&[0.5, 1.0, 1.5]);
        assert_eq!(timeline.last_at_or_before(1.2).map(|e| e.time), Some(1.0));
        assert_eq!(timeline.last_at_or_before(1.0).map(|e| e.time), Some(1.0));
        assert!(timeline.last_at_or_before(0.1).is_none());
    }

    #[test]
    fn test_out_of_order_entry_is_rejected() {
        let mut timeline = timeline(&[1.0, 2.0]);

        assert_eq!(timeline.push(log(1.5)), Err(OutOfOrder { time: 1.5, last: 2.0 }));
        assert_eq!(timeline.len(), 2);

        // Ties keep append order.
        timeline.push(log(2.0)).unwrap();
        timeline.push(log(3.0)).unwrap();
        assert_eq!(timeline.window(1.0, 2.5).len(), 3);
        assert_eq!(timeline.end_time(), Some(3.0));
    }

    #[test]
    fn test_bounds() {
        let timeline = timeline(&[0.25, 0.75]);
        assert_eq!(timeline.start_time(), Some(0.25));
        assert_eq!(timeline.end_time(), Some(0.75));
        assert_eq!(timeline.len(), 2);
        assert!(Timeline::<TimedEvent>::new().start_time().is_none());
    }
}
