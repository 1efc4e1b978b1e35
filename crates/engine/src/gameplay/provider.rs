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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{OutOfOrder, Timed, Timeline};

/// A traced object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object id
    pub id: u64,
    /// Outer (owning) object id, `0` for root objects
    pub outer: u64,
    /// Object name
    pub name: String,
    /// Class name
    pub class_name: String,
}

/// Named event recorded on an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEventMessage {
    /// Time in seconds
    pub time: f64,
    /// Event name
    pub name: String,
}

impl Timed for ObjectEventMessage {
    fn time(&self) -> f64 {
        self.time
    }
}

/// Registry of traced objects and their event timelines
#[derive(Debug, Default)]
pub struct GameplayProvider {
    objects: BTreeMap<u64, ObjectInfo>,
    object_events: BTreeMap<u64, Timeline<ObjectEventMessage>>,
}

impl GameplayProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object, replacing any previous record with the same id
    pub fn add_object(&mut self, info: ObjectInfo) {
        self.objects.insert(info.id, info);
    }

    /// Append an event to an object's timeline
    pub fn append_object_event(
        &mut self,
        id: u64,
        time: f64,
        name: impl Into<String>,
    ) -> Result<(), OutOfOrder> {
        self.object_events.entry(id).or_default().push(ObjectEventMessage { time, name: name.into() })
    }

    /// Look up an object
    pub fn object(&self, id: u64) -> Option<&ObjectInfo> {
        self.objects.get(&id)
    }

    /// Outer of an object, if it has a registered one
    pub fn outer(&self, id: u64) -> Option<&ObjectInfo> {
        self.objects.get(&id).filter(|o| o.outer != 0).and_then(|o| self.objects.get(&o.outer))
    }

    /// Every registered object, ordered by id
    pub fn objects(&self) -> impl Iterator<Item = &ObjectInfo> {
        self.objects.values()
    }

    /// Event timeline of an object
    pub fn object_events(&self, id: u64) -> Option<&Timeline<ObjectEventMessage>> {
        self.object_events.get(&id)
    }

    /// Ids of objects that recorded at least one event
    pub fn objects_with_events(&self) -> impl Iterator<Item = u64> + '_ {
        self.object_events.iter().filter(|(_, t)| !t.is_empty()).map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(id: u64, outer: u64, name: &str) -> ObjectInfo {
        ObjectInfo { id, outer, name: name.into(), class_name: "Actor".into() }
    }

    #[test]
    fn test_outer_lookup() {
        let mut provider = GameplayProvider::new();
        provider.add_object(object(1, 0, "World"));
        provider.add_object(object(2, 1, "Pawn"));
        provider.add_object(object(3, 99, "Orphan"));

        assert_eq!(provider.outer(2).map(|o| o.name.as_str()), Some("World"));
        assert!(provider.outer(1).is_none());
        assert!(provider.outer(3).is_none());
    }

    #[test]
    fn test_objects_with_events() {
        let mut provider = GameplayProvider::new();
        provider.append_object_event(5, 0.1, "Spawned").unwrap();
        provider.append_object_event(5, 0.2, "Jumped").unwrap();
        provider.append_object_event(2, 0.3, "Spawned").unwrap();

        assert_eq!(provider.objects_with_events().collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!(provider.object_events(5).map(|t| t.len()), Some(2));

        assert!(provider.append_object_event(5, 0.15, "Landed").is_err());
        assert_eq!(provider.object_events(5).map(|t| t.len()), Some(2));
    }
}
