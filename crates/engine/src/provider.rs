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

//! State tree trace provider
//!
//! Owns the per-instance event timelines and the registry of running
//! instances. The provider has no locking of its own: it lives inside the
//! [`SessionStore`](crate::SessionStore), and write access is only reachable
//! through the store's write guard.

use std::{collections::BTreeMap, sync::Arc};

use stdb_common::types::{
    AssetRef, InstanceDescriptor, InstanceId, InstanceLifecycle, StateTreeAsset, TimedEvent,
    TraceEvent,
};
use tracing::debug;

use crate::{OutOfOrder, Timeline};

/// Timeline of one state tree instance
pub type InstanceTimeline = Timeline<TimedEvent>;

/// Per-instance timelines and the active instance registry
#[derive(Debug, Default)]
pub struct StateTreeTraceProvider {
    timelines: BTreeMap<InstanceId, InstanceTimeline>,
    active: Vec<InstanceDescriptor>,
    known: Vec<InstanceDescriptor>,
    duration: f64,
}

impl StateTreeTraceProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the timeline of `instance`, creating the timeline if needed.
    /// Events older than the instance's last event are rejected.
    pub fn append_event(
        &mut self,
        instance: InstanceId,
        time: f64,
        frame_index: u64,
        event: TraceEvent,
    ) -> Result<(), OutOfOrder> {
        self.timelines.entry(instance).or_default().push(TimedEvent::new(time, frame_index, event))?;
        self.duration = self.duration.max(time);
        Ok(())
    }

    /// Register or unregister a running instance.
    ///
    /// Stopping removes every entry with the same id, whatever asset it was
    /// registered with. Stopping an unknown instance does nothing.
    pub fn append_instance_lifecycle(
        &mut self,
        asset: &Arc<StateTreeAsset>,
        instance: InstanceId,
        name: &str,
        lifecycle: InstanceLifecycle,
    ) {
        match lifecycle {
            InstanceLifecycle::Started => {
                let descriptor = InstanceDescriptor::new(AssetRef::new(asset), instance, name);
                debug!(%descriptor, "Instance started");
                if !self.known.iter().any(|d| d.id == instance) {
                    self.known.push(descriptor.clone());
                }
                self.active.push(descriptor);
            }
            InstanceLifecycle::Stopped => {
                let before = self.active.len();
                self.active.retain(|d| d.id != instance);
                if self.active.len() != before {
                    debug!(%instance, "Instance stopped");
                }
            }
        }
    }

    /// Visit the timeline of `instance`, or every timeline when `instance` is
    /// [`InstanceId::INVALID`]. Returns whether any timeline was visited.
    pub fn read_timelines<F>(&self, instance: InstanceId, mut callback: F) -> bool
    where
        F: FnMut(InstanceId, &InstanceTimeline),
    {
        if instance.is_valid() {
            match self.timelines.get(&instance) {
                Some(timeline) => {
                    callback(instance, timeline);
                    true
                }
                None => false,
            }
        } else {
            for (id, timeline) in &self.timelines {
                callback(*id, timeline);
            }
            !self.timelines.is_empty()
        }
    }

    /// Timeline of one instance
    pub fn timeline(&self, instance: InstanceId) -> Option<&InstanceTimeline> {
        self.timelines.get(&instance)
    }

    /// Snapshot of the running instances
    pub fn active_instances(&self) -> Vec<InstanceDescriptor> {
        self.active.clone()
    }

    /// Every instance that was started during the session, in start order
    pub fn known_instances(&self) -> &[InstanceDescriptor] {
        &self.known
    }

    /// Latest event time seen
    pub fn duration(&self) -> f64 {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stdb_common::types::{StateEventKind, StateHandle};

    fn asset() -> Arc<StateTreeAsset> {
        Arc::new(StateTreeAsset::new("A", "/Game/A", 1).with_states(["Root", "B", "C", "D"]))
    }

    fn state_enter(index: u16) -> TraceEvent {
        TraceEvent::State { index: StateHandle(index), kind: StateEventKind::Enter }
    }

    #[test]
    fn test_basic_round_trip_keeps_history() {
        let asset = asset();
        let id = InstanceId::new(1, 1);
        let mut provider = StateTreeTraceProvider::new();

        provider.append_instance_lifecycle(&asset, id, "Foo", InstanceLifecycle::Started);
        provider.append_event(id, 1.0, 10, state_enter(3)).unwrap();
        provider.append_instance_lifecycle(&asset, id, "Foo", InstanceLifecycle::Stopped);

        assert!(provider.active_instances().is_empty());
        let mut seen = Vec::new();
        assert!(provider.read_timelines(id, |_, timeline| seen.extend(timeline.iter().cloned())));
        assert_eq!(seen, vec![TimedEvent::new(1.0, 10, state_enter(3))]);
        assert_eq!(provider.known_instances().len(), 1);
    }

    #[test]
    fn test_stop_unknown_instance_is_noop() {
        let asset = asset();
        let mut provider = StateTreeTraceProvider::new();
        provider.append_instance_lifecycle(&asset, InstanceId::new(1, 1), "A", InstanceLifecycle::Started);

        provider.append_instance_lifecycle(&asset, InstanceId::new(9, 9), "Z", InstanceLifecycle::Stopped);
        assert_eq!(provider.active_instances().len(), 1);
    }

    #[test]
    fn test_stop_removes_every_matching_entry() {
        let first = asset();
        let second = asset();
        let id = InstanceId::new(2, 1);
        let mut provider = StateTreeTraceProvider::new();
        provider.append_instance_lifecycle(&first, id, "A", InstanceLifecycle::Started);
        provider.append_instance_lifecycle(&second, id, "A", InstanceLifecycle::Started);

        provider.append_instance_lifecycle(&second, id, "A", InstanceLifecycle::Stopped);
        assert!(provider.active_instances().is_empty());
    }

    #[test]
    fn test_read_all_timelines() {
        let mut provider = StateTreeTraceProvider::new();
        assert!(!provider.read_timelines(InstanceId::INVALID, |_, _| {}));

        provider.append_event(InstanceId::new(2, 1), 0.5, 0, state_enter(1)).unwrap();
        provider.append_event(InstanceId::new(1, 1), 0.7, 0, state_enter(2)).unwrap();

        let mut visited = Vec::new();
        assert!(provider.read_timelines(InstanceId::INVALID, |id, _| visited.push(id)));
        assert_eq!(visited, vec![InstanceId::new(1, 1), InstanceId::new(2, 1)]);
        assert!(!provider.read_timelines(InstanceId::new(3, 1), |_, _| {}));
        assert_eq!(provider.duration(), 0.7);
    }
}
