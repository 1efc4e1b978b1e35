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
use stdb_common::types::{Frame, FrameType};
use tracing::debug;

use super::{
    AnimGraphMessage, AnimNodeVisitMessage, GameplayProvider, SequencePlayerMessage,
    StateMachineMessage, TrackArena, TrackHost, TrackId, TrackKind,
};
use crate::{FrameProvider, SessionStore};

/// Upper bound on the outer chain walked for one object
const MAX_OUTER_DEPTH: usize = 64;

/// Object tracks of the gameplay overlay
#[derive(Debug, Default)]
pub struct GameplaySharedData {
    arena: TrackArena,
}

impl GameplaySharedData {
    /// Create an overlay without tracks
    pub fn new() -> Self {
        Self::default()
    }

    /// Track arena
    pub fn tracks(&self) -> &TrackArena {
        &self.arena
    }

    /// Create tracks for objects that recorded events since the last tick and
    /// renumber the display order if anything was added.
    pub fn tick(&mut self, store: &SessionStore, host: &mut dyn TrackHost) {
        let objects: Vec<u64> = store.gameplay.objects_with_events().collect();
        for object_id in objects {
            self.ensure_object_track(&store.gameplay, object_id, host);
        }
        self.update_order(host);
    }

    /// Track of an object, created along with the tracks of its outers
    pub fn ensure_object_track(
        &mut self,
        gameplay: &GameplayProvider,
        object_id: u64,
        host: &mut dyn TrackHost,
    ) -> TrackId {
        let mut parent = None;
        for id in outer_chain(gameplay, object_id) {
            parent = Some(self.ensure_named_track(gameplay, parent, id, host));
        }
        self.ensure_named_track(gameplay, parent, object_id, host)
    }

    fn ensure_named_track(
        &mut self,
        gameplay: &GameplayProvider,
        parent: Option<TrackId>,
        object_id: u64,
        host: &mut dyn TrackHost,
    ) -> TrackId {
        let name = gameplay
            .object(object_id)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| format!("Object {object_id}"));
        self.arena.ensure(parent, TrackKind::ObjectEvents, object_id, &name, host)
    }

    /// Child track of `kind` under an object track
    pub fn ensure_child_track(
        &mut self,
        parent: TrackId,
        kind: TrackKind,
        host: &mut dyn TrackHost,
    ) -> TrackId {
        let object_id = self.arena.get(parent).map(|t| t.object_id()).unwrap_or_default();
        self.arena.ensure(Some(parent), kind, object_id, kind.label(), host)
    }

    /// Track of an object, if one exists
    pub fn object_track(&self, gameplay: &GameplayProvider, object_id: u64) -> Option<TrackId> {
        let mut parent = None;
        for id in outer_chain(gameplay, object_id) {
            parent = Some(self.arena.find(parent, TrackKind::ObjectEvents, id)?);
        }
        self.arena.find(parent, TrackKind::ObjectEvents, object_id)
    }

    fn update_order(&mut self, host: &mut dyn TrackHost) {
        if self.arena.update_order() {
            host.on_tracks_reordered();
        }
    }
}

/// Registered outers of an object, outermost first. The walk stops at a
/// repeated object or after [`MAX_OUTER_DEPTH`] outers.
fn outer_chain(gameplay: &GameplayProvider, object_id: u64) -> Vec<u64> {
    let mut outers = Vec::new();
    let mut current = object_id;
    while let Some(outer) = gameplay.outer(current) {
        if outer.id == object_id || outers.contains(&outer.id) || outers.len() >= MAX_OUTER_DEPTH {
            debug!(object_id, "Outer chain truncated");
            break;
        }
        outers.push(outer.id);
        current = outer.id;
    }
    outers.reverse();
    outers
}

/// Animation graph data recorded during one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimNodeDebugData {
    /// Frame the query time was quantized to
    pub frame: Frame,
    /// Graph phases
    pub phases: Vec<AnimGraphMessage>,
    /// Node visits
    pub node_visits: Vec<AnimNodeVisitMessage>,
    /// State machine states
    pub state_machines: Vec<StateMachineMessage>,
    /// Sequence player positions
    pub sequence_players: Vec<SequencePlayerMessage>,
}

/// Animation tracks of the gameplay overlay
///
/// Keeps the handles of the tracks it attached to object tracks, keyed by
/// anim instance and by skeletal component.
#[derive(Debug, Default)]
pub struct AnimationSharedData {
    frame_type: FrameType,
    anim_tracks: BTreeMap<u64, AnimInstanceTracks>,
    pose_tracks: BTreeMap<u64, TrackId>,
}

/// Tracks attached to one anim instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnimInstanceTracks {
    /// Tick record track
    pub tick_records: Option<TrackId>,
    /// Curve track
    pub curves: Option<TrackId>,
    /// Graph node track
    pub anim_nodes: Option<TrackId>,
}

impl AnimationSharedData {
    /// Create the animation overlay, quantizing queries to `frame_type` frames
    pub fn new(frame_type: FrameType) -> Self {
        Self { frame_type, ..Default::default() }
    }

    /// Tracks created for an anim instance
    pub fn anim_instance_tracks(&self, anim_instance: u64) -> Option<AnimInstanceTracks> {
        self.anim_tracks.get(&anim_instance).copied()
    }

    /// Pose track of a component
    pub fn pose_track(&self, component: u64) -> Option<TrackId> {
        self.pose_tracks.get(&component).copied()
    }

    /// Create animation tracks under the object tracks of their anim instances
    /// and components.
    pub fn tick(
        &mut self,
        store: &SessionStore,
        gameplay: &mut GameplaySharedData,
        host: &mut dyn TrackHost,
    ) {
        for (anim_instance, timelines) in store.animation.instances() {
            let tracks = self.anim_tracks.entry(anim_instance).or_default();
            let wanted = [
                (&mut tracks.tick_records, !timelines.tick_records.is_empty(), TrackKind::TickRecords),
                (&mut tracks.curves, !timelines.curves.is_empty(), TrackKind::Curves),
                (&mut tracks.anim_nodes, timelines.has_graph_data(), TrackKind::AnimNodes),
            ];
            let parent = gameplay.ensure_object_track(&store.gameplay, anim_instance, host);
            for (slot, has_data, kind) in wanted {
                if has_data {
                    *slot = Some(gameplay.ensure_child_track(parent, kind, host));
                }
            }
        }

        for component in store.animation.pose_components() {
            let parent = gameplay.ensure_object_track(&store.gameplay, component, host);
            let track = gameplay.ensure_child_track(parent, TrackKind::Pose, host);
            self.pose_tracks.insert(component, track);
        }

        gameplay.update_order(host);
    }

    /// Graph data of `anim_instance` for the frame containing `time`.
    ///
    /// Every sub-timeline is read over the same frame window, so the snapshot
    /// never mixes data from different frames.
    pub fn debug_data_at(
        &self,
        store: &SessionStore,
        anim_instance: u64,
        time: f64,
    ) -> Option<AnimNodeDebugData> {
        let frame = store.frames.frame_from_time(self.frame_type, time)?;
        let timelines = store.animation.instance(anim_instance)?;
        let (start, end) = (frame.start_time, frame.end_time);

        Some(AnimNodeDebugData {
            frame,
            phases: timelines.graph.window(start, end).to_vec(),
            node_visits: timelines.node_visits.window(start, end).to_vec(),
            state_machines: timelines.state_machines.window(start, end).to_vec(),
            sequence_players: timelines.sequence_players.window(start, end).to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gameplay::{GameplayTrack, ObjectInfo, PoseMessage};

    #[derive(Default)]
    struct Host {
        added: Vec<String>,
        reorders: usize,
    }

    impl TrackHost for Host {
        fn on_track_added(&mut self, track: &GameplayTrack) {
            self.added.push(track.name().to_string());
        }

        fn on_tracks_reordered(&mut self) {
            self.reorders += 1;
        }
    }

    fn store() -> SessionStore {
        let mut store = SessionStore::new(FrameType::Game);
        for (id, outer, name) in [(1, 0, "World"), (2, 1, "Hero"), (3, 2, "HeroAnim"), (4, 2, "Mesh")] {
            store.gameplay.add_object(ObjectInfo {
                id,
                outer,
                name: name.into(),
                class_name: "Object".into(),
            });
        }
        store.frames.begin_frame(FrameType::Game, 0.9).unwrap();
        store.frames.end_frame(FrameType::Game, 1.0);
        store.frames.begin_frame(FrameType::Game, 1.0).unwrap();
        store.frames.end_frame(FrameType::Game, 1.1);
        store
    }

    #[test]
    fn test_tracks_created_once_with_hierarchy() {
        let mut store = store();
        store.gameplay.append_object_event(2, 0.95, "Spawned").unwrap();
        let mut gameplay = GameplaySharedData::new();
        let mut host = Host::default();

        gameplay.tick(&store, &mut host);
        gameplay.tick(&store, &mut host);

        assert_eq!(host.added, vec!["World", "Hero"]);
        assert_eq!(host.reorders, 1);
        let hero = gameplay.object_track(&store.gameplay, 2).unwrap();
        let hero = gameplay.tracks().get(hero).unwrap();
        assert_eq!(hero.indent(), 1);
        assert!(gameplay.object_track(&store.gameplay, 3).is_none());
    }

    #[test]
    fn test_animation_tracks() {
        let mut store = store();
        store.animation.instance_mut(3).curves.push(crate::gameplay::CurveMessage {
            time: 0.95,
            name: "Speed".into(),
            value: 1.0,
        })
        .unwrap();
        store.animation.append_pose(4, PoseMessage { time: 0.95, bone_count: 30, lod: 0 }).unwrap();

        let mut gameplay = GameplaySharedData::new();
        let mut animation = AnimationSharedData::new(FrameType::Game);
        let mut host = Host::default();
        animation.tick(&store, &mut gameplay, &mut host);

        let layout: Vec<String> = gameplay.tracks().ordered().iter().map(|t| t.to_string()).collect();
        assert_eq!(
            layout,
            vec![
                "World [ObjectEvents]",
                "  Hero [ObjectEvents]",
                "    HeroAnim [ObjectEvents]",
                "      Curves [Curves]",
                "    Mesh [ObjectEvents]",
                "      Pose [Pose]",
            ]
        );

        let tracks = animation.anim_instance_tracks(3).unwrap();
        assert!(tracks.tick_records.is_none() && tracks.anim_nodes.is_none());
        let curves = gameplay.tracks().get(tracks.curves.unwrap()).unwrap();
        assert_eq!(curves.name(), "Curves");
        let pose = animation.pose_track(4).unwrap();
        assert_eq!(gameplay.tracks().get(pose).map(|t| t.indent()), Some(3));
        assert!(animation.pose_track(3).is_none());
    }

    #[test]
    fn test_cyclic_outers_are_truncated() {
        let mut store = SessionStore::new(FrameType::Game);
        for (id, outer, name) in [(1, 2, "Ping"), (2, 1, "Pong"), (3, 3, "Narcissus")] {
            store.gameplay.add_object(ObjectInfo {
                id,
                outer,
                name: name.into(),
                class_name: "Object".into(),
            });
        }
        let mut gameplay = GameplaySharedData::new();
        let mut host = Host::default();

        assert!(gameplay.object_track(&store.gameplay, 1).is_none());
        let ping = gameplay.ensure_object_track(&store.gameplay, 1, &mut host);
        let own = gameplay.ensure_object_track(&store.gameplay, 3, &mut host);

        assert_eq!(gameplay.object_track(&store.gameplay, 1), Some(ping));
        assert_eq!(gameplay.object_track(&store.gameplay, 3), Some(own));
        assert_eq!(gameplay.tracks().get(ping).map(|t| t.indent()), Some(1));
        assert_eq!(host.added, vec!["Pong", "Ping", "Narcissus"]);
    }

    #[test]
    fn test_debug_data_is_frame_quantized() {
        let mut store = store();
        let timelines = store.animation.instance_mut(3);
        for (time, name) in [(0.95, "early"), (1.02, "blend"), (1.08, "output")] {
            timelines.node_visits.push(AnimNodeVisitMessage {
                time,
                source_node: 0,
                target_node: 1,
                weight: 1.0,
                name: name.into(),
            })
            .unwrap();
        }
        timelines.sequence_players.push(SequencePlayerMessage {
            time: 1.01,
            node_id: 4,
            position: 0.5,
            length: 2.0,
            frame_counter: 12,
        })
        .unwrap();

        let animation = AnimationSharedData::new(FrameType::Game);
        let data = animation.debug_data_at(&store, 3, 1.05).unwrap();

        assert_eq!(data.frame.index, 1);
        let names: Vec<&str> = data.node_visits.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["blend", "output"]);
        assert_eq!(data.sequence_players.len(), 1);
        assert!(animation.debug_data_at(&store, 3, 0.1).is_none());
        assert!(animation.debug_data_at(&store, 99, 1.05).is_none());
    }
}
