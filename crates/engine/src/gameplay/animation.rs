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
use stdb_common::wire::AnimGraphPhase;

use crate::{OutOfOrder, Timed, Timeline};

macro_rules! impl_timed {
    ($($ty:ty),+ $(,)?) => {
        $(impl Timed for $ty {
            fn time(&self) -> f64 {
                self.time
            }
        })+
    };
}

/// Animation asset ticked during an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecordMessage {
    /// Time in seconds
    pub time: f64,
    /// Ticked asset name
    pub asset_name: String,
    /// Graph node id
    pub node_id: i32,
    /// Blend weight
    pub blend_weight: f32,
    /// Playback time
    pub playback_time: f32,
}

/// Pose of a skeletal component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseMessage {
    /// Time in seconds
    pub time: f64,
    /// Bones in the pose
    pub bone_count: u16,
    /// Level of detail
    pub lod: u8,
}

/// Curve value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveMessage {
    /// Time in seconds
    pub time: f64,
    /// Curve name
    pub name: String,
    /// Value
    pub value: f32,
}

/// Graph update phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimGraphMessage {
    /// Time in seconds
    pub time: f64,
    /// Phase
    pub phase: AnimGraphPhase,
    /// Graph node count
    pub node_count: u32,
}

/// Node visited during a graph update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimNodeVisitMessage {
    /// Time in seconds
    pub time: f64,
    /// Visiting node
    pub source_node: i32,
    /// Visited node
    pub target_node: i32,
    /// Node weight
    pub weight: f32,
    /// Node display name
    pub name: String,
}

/// State machine status
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateMachineMessage {
    /// Time in seconds
    pub time: f64,
    /// State machine node id
    pub node_id: i32,
    /// State machine index
    pub machine: i32,
    /// Active state index
    pub state: i32,
    /// State weight
    pub weight: f32,
    /// Time spent in the state
    pub elapsed: f32,
}

/// Sequence player position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequencePlayerMessage {
    /// Time in seconds
    pub time: f64,
    /// Player node id
    pub node_id: i32,
    /// Playback position
    pub position: f32,
    /// Sequence length
    pub length: f32,
    /// Frame counter
    pub frame_counter: i32,
}

impl_timed!(
    TickRecordMessage,
    PoseMessage,
    CurveMessage,
    AnimGraphMessage,
    AnimNodeVisitMessage,
    StateMachineMessage,
    SequencePlayerMessage,
);

/// Timelines recorded for one anim instance
#[derive(Debug, Default)]
pub struct AnimInstanceTimelines {
    /// Tick records
    pub tick_records: Timeline<TickRecordMessage>,
    /// Curve values
    pub curves: Timeline<CurveMessage>,
    /// Graph update phases
    pub graph: Timeline<AnimGraphMessage>,
    /// Node visits
    pub node_visits: Timeline<AnimNodeVisitMessage>,
    /// State machine states
    pub state_machines: Timeline<StateMachineMessage>,
    /// Sequence player positions
    pub sequence_players: Timeline<SequencePlayerMessage>,
}

impl AnimInstanceTimelines {
    /// Whether any graph data (phases or node level records) was recorded
    pub fn has_graph_data(&self) -> bool {
        !self.graph.is_empty()
            || !self.node_visits.is_empty()
            || !self.state_machines.is_empty()
            || !self.sequence_players.is_empty()
    }
}

/// Animation timelines keyed by anim instance, poses keyed by component
#[derive(Debug, Default)]
pub struct AnimationProvider {
    instances: BTreeMap<u64, AnimInstanceTimelines>,
    poses: BTreeMap<u64, Timeline<PoseMessage>>,
}

impl AnimationProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Timelines of an anim instance, created on first use
    pub fn instance_mut(&mut self, anim_instance: u64) -> &mut AnimInstanceTimelines {
        self.instances.entry(anim_instance).or_default()
    }

    /// Append a pose of a component
    pub fn append_pose(&mut self, component: u64, pose: PoseMessage) -> Result<(), OutOfOrder> {
        self.poses.entry(component).or_default().push(pose)
    }

    /// Timelines of an anim instance
    pub fn instance(&self, anim_instance: u64) -> Option<&AnimInstanceTimelines> {
        self.instances.get(&anim_instance)
    }

    /// Every anim instance with recorded data
    pub fn instances(&self) -> impl Iterator<Item = (u64, &AnimInstanceTimelines)> {
        self.instances.iter().map(|(id, t)| (*id, t))
    }

    /// Pose timeline of a component
    pub fn poses(&self, component: u64) -> Option<&Timeline<PoseMessage>> {
        self.poses.get(&component)
    }

    /// Components with at least one pose
    pub fn pose_components(&self) -> impl Iterator<Item = u64> + '_ {
        self.poses.iter().filter(|(_, t)| !t.is_empty()).map(|(id, _)| *id)
    }
}
