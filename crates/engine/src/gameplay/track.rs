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

//! Track arena for the gameplay overlay
//!
//! Tracks form a forest mirroring object ownership. Parent and child links
//! are [`TrackId`] indices into the arena, so a track never owns another one.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Index of a track in its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(usize);

impl TrackId {
    /// Arena index
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Closed set of track kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Object events, also the hierarchy node for an object
    ObjectEvents,
    /// Poses of a skeletal component
    Pose,
    /// Animation curves
    Curves,
    /// Animation tick records
    TickRecords,
    /// Animation graph nodes
    AnimNodes,
}

impl TrackKind {
    /// Display label of child tracks of this kind
    pub fn label(&self) -> &'static str {
        match self {
            Self::ObjectEvents => "Events",
            Self::Pose => "Pose",
            Self::Curves => "Curves",
            Self::TickRecords => "Tick Records",
            Self::AnimNodes => "Anim Nodes",
        }
    }
}

/// One track of the overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameplayTrack {
    id: TrackId,
    kind: TrackKind,
    object_id: u64,
    name: String,
    parent: Option<TrackId>,
    children: Vec<TrackId>,
    order: usize,
    indent: usize,
}

impl GameplayTrack {
    /// Track id
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Object the track shows
    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent track
    pub fn parent(&self) -> Option<TrackId> {
        self.parent
    }

    /// Child tracks, in creation order
    pub fn children(&self) -> &[TrackId] {
        &self.children
    }

    /// Position in the depth-first display order
    pub fn order(&self) -> usize {
        self.order
    }

    /// Depth in the hierarchy
    pub fn indent(&self) -> usize {
        self.indent
    }
}

impl fmt::Display for GameplayTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:indent$}{} [{:?}]", "", self.name, self.kind, indent = self.indent * 2)
    }
}

/// Receives tracks as they are created
pub trait TrackHost {
    /// A new track was added to the arena
    fn on_track_added(&mut self, track: &GameplayTrack);

    /// Display order of the tracks changed
    fn on_tracks_reordered(&mut self) {}
}

/// Storage for every track of the overlay
#[derive(Debug, Default)]
pub struct TrackArena {
    tracks: Vec<GameplayTrack>,
    roots: Vec<TrackId>,
    dirty: bool,
}

impl TrackArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a track
    pub fn get(&self, id: TrackId) -> Option<&GameplayTrack> {
        self.tracks.get(id.0)
    }

    /// Number of tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the arena has no tracks
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Root tracks, in creation order
    pub fn roots(&self) -> &[TrackId] {
        &self.roots
    }

    /// Whether the display order needs to be recomputed
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Find a track by scanning the children of `parent` (or the roots)
    pub fn find(&self, parent: Option<TrackId>, kind: TrackKind, object_id: u64) -> Option<TrackId> {
        let siblings = match parent {
            Some(parent) => self.get(parent).map(|p| p.children.as_slice()).unwrap_or_default(),
            None => self.roots.as_slice(),
        };
        siblings.iter().copied().find(|id| {
            let track = &self.tracks[id.0];
            track.kind == kind && track.object_id == object_id
        })
    }

    /// Get the matching track under `parent`, creating and announcing it if missing
    pub fn ensure(
        &mut self,
        parent: Option<TrackId>,
        kind: TrackKind,
        object_id: u64,
        name: &str,
        host: &mut dyn TrackHost,
    ) -> TrackId {
        if let Some(id) = self.find(parent, kind, object_id) {
            return id;
        }

        let id = TrackId(self.tracks.len());
        self.tracks.push(GameplayTrack {
            id,
            kind,
            object_id,
            name: name.to_string(),
            parent,
            children: Vec::new(),
            order: 0,
            indent: 0,
        });
        match parent.and_then(|p| self.tracks.get_mut(p.0)) {
            Some(parent) => parent.children.push(id),
            None => self.roots.push(id),
        }
        self.dirty = true;

        host.on_track_added(&self.tracks[id.0]);
        id
    }

    fn sorted_by_name(&self, ids: &[TrackId]) -> Vec<TrackId> {
        ids.iter()
            .copied()
            .sorted_by(|a, b| {
                let (a, b) = (&self.tracks[a.0], &self.tracks[b.0]);
                a.name.cmp(&b.name).then(a.id.cmp(&b.id))
            })
            .collect()
    }

    /// Renumber display order and indent, depth-first with siblings sorted by
    /// name. Does nothing unless a track was added since the last pass.
    pub fn update_order(&mut self) -> bool {
        if !self.dirty {
            return false;
        }

        let mut stack: Vec<(TrackId, usize)> =
            self.sorted_by_name(&self.roots).into_iter().rev().map(|id| (id, 0)).collect();
        let mut order = 0;
        while let Some((id, depth)) = stack.pop() {
            let children = self.sorted_by_name(&self.tracks[id.0].children);
            let track = &mut self.tracks[id.0];
            track.order = order;
            track.indent = depth;
            order += 1;
            stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }

        self.dirty = false;
        true
    }

    /// Tracks in display order
    pub fn ordered(&self) -> Vec<&GameplayTrack> {
        self.tracks.iter().sorted_by_key(|t| t.order).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl TrackHost for Recorder {
        fn on_track_added(&mut self, track: &GameplayTrack) {
            self.0.push(track.name().to_string());
        }
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut arena = TrackArena::new();
        let mut host = Recorder::default();

        let a = arena.ensure(None, TrackKind::ObjectEvents, 1, "Pawn", &mut host);
        let b = arena.ensure(None, TrackKind::ObjectEvents, 1, "Pawn", &mut host);
        let pose = arena.ensure(Some(a), TrackKind::Pose, 1, "Pose", &mut host);
        let pose_again = arena.ensure(Some(a), TrackKind::Pose, 1, "Pose", &mut host);

        assert_eq!(a, b);
        assert_eq!(pose, pose_again);
        assert_eq!(arena.len(), 2);
        assert_eq!(host.0, vec!["Pawn", "Pose"]);
        assert_eq!(arena.get(pose).unwrap().parent(), Some(a));
    }

    #[test]
    fn test_update_order_is_alphabetical_depth_first() {
        let mut arena = TrackArena::new();
        let mut host = Recorder::default();

        let zeta = arena.ensure(None, TrackKind::ObjectEvents, 1, "Zeta", &mut host);
        let alpha = arena.ensure(None, TrackKind::ObjectEvents, 2, "Alpha", &mut host);
        arena.ensure(Some(zeta), TrackKind::TickRecords, 1, "Tick Records", &mut host);
        arena.ensure(Some(zeta), TrackKind::Curves, 1, "Curves", &mut host);
        arena.ensure(Some(alpha), TrackKind::Pose, 2, "Pose", &mut host);

        assert!(arena.is_dirty());
        assert!(arena.update_order());
        assert!(!arena.update_order());

        let layout: Vec<(String, usize)> =
            arena.ordered().iter().map(|t| (t.name().to_string(), t.indent())).collect();
        assert_eq!(
            layout,
            vec![
                ("Alpha".to_string(), 0),
                ("Pose".to_string(), 1),
                ("Zeta".to_string(), 0),
                ("Curves".to_string(), 1),
                ("Tick Records".to_string(), 1),
            ]
        );
    }
}
