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

//! Typed record schemas
//!
//! Each record type knows the `(logger, event)` pair it is declared under and
//! how to lay out its payload. Timestamps are raw cycle counts; convert them
//! with [`TraceHeader::cycle_to_seconds`](super::TraceHeader::cycle_to_seconds).

use serde::{Deserialize, Serialize};

use super::{PayloadReader, PayloadWriter, WireError};
use crate::types::{FrameType, InstanceId, InstanceLifecycle, RunStatus, StateEventKind, TaskEventKind};

/// Logger of state tree debugger records
pub const STATE_TREE_LOGGER: &str = "StateTreeDebugger";
/// Logger of frame boundary records
pub const MISC_LOGGER: &str = "Misc";
/// Logger of traced object records
pub const OBJECT_LOGGER: &str = "Object";
/// Logger of animation records
pub const ANIMATION_LOGGER: &str = "Animation";

/// A record with a fixed payload layout
pub trait WireRecord: Sized {
    /// Logger the record is declared under
    const LOGGER: &'static str;
    /// Event name the record is declared under
    const EVENT: &'static str;

    /// Append the payload
    fn encode(&self, out: &mut PayloadWriter);

    /// Decode the payload
    fn decode(input: &mut PayloadReader) -> Result<Self, WireError>;
}

/// Single byte enum encoding
pub trait WireEnum: Sized + Copy {
    /// Field name reported in decode errors
    const FIELD: &'static str;

    /// Wire discriminant
    fn to_wire(self) -> u8;

    /// Decode a wire discriminant
    fn from_wire(value: u8) -> Option<Self>;

    /// Read and decode a discriminant
    fn read(input: &mut PayloadReader) -> Result<Self, WireError> {
        let value = input.u8()?;
        Self::from_wire(value).ok_or(WireError::InvalidDiscriminant { field: Self::FIELD, value })
    }
}

macro_rules! wire_enum {
    ($ty:ty, $field:literal, { $($variant:ident = $value:literal),+ $(,)? }) => {
        impl WireEnum for $ty {
            const FIELD: &'static str = $field;

            fn to_wire(self) -> u8 {
                match self {
                    $(<$ty>::$variant => $value,)+
                }
            }

            fn from_wire(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(<$ty>::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

wire_enum!(InstanceLifecycle, "lifecycle", { Started = 0, Stopped = 1 });
wire_enum!(StateEventKind, "state event kind", { Enter = 0, Exit = 1, Completed = 2 });
wire_enum!(TaskEventKind, "task event kind", { Enter = 0, Exit = 1, Tick = 2, Completed = 3 });
wire_enum!(RunStatus, "run status", { Running = 0, Succeeded = 1, Failed = 2, Unset = 3 });
wire_enum!(FrameType, "frame type", { Game = 0, Rendering = 1 });

/// Phase of an animation graph update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnimGraphPhase {
    /// Graph initialization
    Initialize,
    /// Pre-update pass
    PreUpdate,
    /// Update pass
    Update,
    /// Bone caching pass
    CacheBones,
    /// Pose evaluation pass
    Evaluate,
}

wire_enum!(AnimGraphPhase, "anim graph phase", {
    Initialize = 0,
    PreUpdate = 1,
    Update = 2,
    CacheBones = 3,
    Evaluate = 4,
});

fn read_instance(input: &mut PayloadReader) -> Result<InstanceId, WireError> {
    Ok(InstanceId::new(input.u32()?, input.u32()?))
}

fn write_instance(out: &mut PayloadWriter, instance: InstanceId) {
    out.u32(instance.id).u32(instance.serial);
}

/// Instance started or stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Name of the executed asset
    pub tree_name: String,
    /// Package path of the executed asset
    pub tree_path: String,
    /// Compiled data hash the instance was recorded with
    pub compiled_hash: u32,
    /// Instance id
    pub instance: InstanceId,
    /// Display name of the instance
    pub name: String,
    /// Lifecycle transition
    pub lifecycle: InstanceLifecycle,
}

impl WireRecord for InstanceRecord {
    const LOGGER: &'static str = STATE_TREE_LOGGER;
    const EVENT: &'static str = "InstanceEvent";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle).string(&self.tree_name).string(&self.tree_path).u32(self.compiled_hash);
        write_instance(out, self.instance);
        out.string(&self.name).u8(self.lifecycle.to_wire());
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            cycle: input.u64()?,
            tree_name: input.string()?,
            tree_path: input.string()?,
            compiled_hash: input.u32()?,
            instance: read_instance(input)?,
            name: input.string()?,
            lifecycle: InstanceLifecycle::read(input)?,
        })
    }
}

/// Free text message of an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Instance id
    pub instance: InstanceId,
    /// Message
    pub message: String,
}

impl WireRecord for LogRecord {
    const LOGGER: &'static str = STATE_TREE_LOGGER;
    const EVENT: &'static str = "LogEvent";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle);
        write_instance(out, self.instance);
        out.string(&self.message);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self { cycle: input.u64()?, instance: read_instance(input)?, message: input.string()? })
    }
}

/// State transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Instance id
    pub instance: InstanceId,
    /// Compiled state index
    pub state: u16,
    /// Transition kind
    pub kind: StateEventKind,
}

impl WireRecord for StateRecord {
    const LOGGER: &'static str = STATE_TREE_LOGGER;
    const EVENT: &'static str = "StateEvent";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle);
        write_instance(out, self.instance);
        out.u16(self.state).u8(self.kind.to_wire());
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            cycle: input.u64()?,
            instance: read_instance(input)?,
            state: input.u16()?,
            kind: StateEventKind::read(input)?,
        })
    }
}

/// Task transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Instance id
    pub instance: InstanceId,
    /// Compiled task index
    pub task: u16,
    /// Transition kind
    pub kind: TaskEventKind,
    /// Status reported by the task
    pub status: RunStatus,
    /// Serialized task instance data
    pub data: String,
}

impl WireRecord for TaskRecord {
    const LOGGER: &'static str = STATE_TREE_LOGGER;
    const EVENT: &'static str = "TaskEvent";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle);
        write_instance(out, self.instance);
        out.u16(self.task).u8(self.kind.to_wire()).u8(self.status.to_wire()).string(&self.data);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            cycle: input.u64()?,
            instance: read_instance(input)?,
            task: input.u16()?,
            kind: TaskEventKind::read(input)?,
            status: RunStatus::read(input)?,
            data: input.string()?,
        })
    }
}

/// Condition evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Instance id
    pub instance: InstanceId,
    /// Compiled condition index
    pub condition: u16,
    /// Evaluation result
    pub passed: bool,
}

impl WireRecord for ConditionRecord {
    const LOGGER: &'static str = STATE_TREE_LOGGER;
    const EVENT: &'static str = "ConditionEvent";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle);
        write_instance(out, self.instance);
        out.u16(self.condition).bool(self.passed);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            cycle: input.u64()?,
            instance: read_instance(input)?,
            condition: input.u16()?,
            passed: input.bool()?,
        })
    }
}

/// Complete active state list of an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStatesRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Instance id
    pub instance: InstanceId,
    /// Active compiled state indices, root first
    pub states: Vec<u16>,
}

impl WireRecord for ActiveStatesRecord {
    const LOGGER: &'static str = STATE_TREE_LOGGER;
    const EVENT: &'static str = "ActiveStatesEvent";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle);
        write_instance(out, self.instance);
        out.u16_array(&self.states);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self { cycle: input.u64()?, instance: read_instance(input)?, states: input.u16_array()? })
    }
}

/// Start of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginFrameRecord {
    /// Frame type
    pub frame_type: FrameType,
    /// Timestamp in cycles
    pub cycle: u64,
}

impl WireRecord for BeginFrameRecord {
    const LOGGER: &'static str = MISC_LOGGER;
    const EVENT: &'static str = "BeginFrame";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u8(self.frame_type.to_wire()).u64(self.cycle);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self { frame_type: FrameType::read(input)?, cycle: input.u64()? })
    }
}

/// End of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndFrameRecord {
    /// Frame type
    pub frame_type: FrameType,
    /// Timestamp in cycles
    pub cycle: u64,
}

impl WireRecord for EndFrameRecord {
    const LOGGER: &'static str = MISC_LOGGER;
    const EVENT: &'static str = "EndFrame";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u8(self.frame_type.to_wire()).u64(self.cycle);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self { frame_type: FrameType::read(input)?, cycle: input.u64()? })
    }
}

/// A traced object and its outer (owner)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Object id
    pub id: u64,
    /// Outer object id, `0` for root objects
    pub outer: u64,
    /// Object name
    pub name: String,
    /// Class name
    pub class_name: String,
}

impl WireRecord for ObjectRecord {
    const LOGGER: &'static str = OBJECT_LOGGER;
    const EVENT: &'static str = "Object";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.id).u64(self.outer).string(&self.name).string(&self.class_name);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            id: input.u64()?,
            outer: input.u64()?,
            name: input.string()?,
            class_name: input.string()?,
        })
    }
}

/// Named event on a traced object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEventRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Object id
    pub id: u64,
    /// Event name
    pub event: String,
}

impl WireRecord for ObjectEventRecord {
    const LOGGER: &'static str = OBJECT_LOGGER;
    const EVENT: &'static str = "ObjectEvent";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle).u64(self.id).string(&self.event);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self { cycle: input.u64()?, id: input.u64()?, event: input.string()? })
    }
}

/// Animation asset ticked by an anim instance
#[derive(Debug, Clone, PartialEq)]
pub struct TickRecordRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Anim instance object id
    pub anim_instance: u64,
    /// Ticked asset name
    pub asset_name: String,
    /// Graph node id
    pub node_id: i32,
    /// Blend weight
    pub blend_weight: f32,
    /// Playback time
    pub playback_time: f32,
}

impl WireRecord for TickRecordRecord {
    const LOGGER: &'static str = ANIMATION_LOGGER;
    const EVENT: &'static str = "TickRecord";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle)
            .u64(self.anim_instance)
            .string(&self.asset_name)
            .i32(self.node_id)
            .f32(self.blend_weight)
            .f32(self.playback_time);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            cycle: input.u64()?,
            anim_instance: input.u64()?,
            asset_name: input.string()?,
            node_id: input.i32()?,
            blend_weight: input.f32()?,
            playback_time: input.f32()?,
        })
    }
}

/// Pose of a skeletal component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoseRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Component object id
    pub component: u64,
    /// Number of bones in the pose
    pub bone_count: u16,
    /// Level of detail
    pub lod: u8,
}

impl WireRecord for PoseRecord {
    const LOGGER: &'static str = ANIMATION_LOGGER;
    const EVENT: &'static str = "Pose";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle).u64(self.component).u16(self.bone_count).u8(self.lod);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            cycle: input.u64()?,
            component: input.u64()?,
            bone_count: input.u16()?,
            lod: input.u8()?,
        })
    }
}

/// Value of an animation curve
#[derive(Debug, Clone, PartialEq)]
pub struct CurveRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Anim instance object id
    pub anim_instance: u64,
    /// Curve name
    pub name: String,
    /// Curve value
    pub value: f32,
}

impl WireRecord for CurveRecord {
    const LOGGER: &'static str = ANIMATION_LOGGER;
    const EVENT: &'static str = "Curve";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle).u64(self.anim_instance).string(&self.name).f32(self.value);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            cycle: input.u64()?,
            anim_instance: input.u64()?,
            name: input.string()?,
            value: input.f32()?,
        })
    }
}

/// One phase of an animation graph update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimGraphRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Anim instance object id
    pub anim_instance: u64,
    /// Update phase
    pub phase: AnimGraphPhase,
    /// Number of graph nodes
    pub node_count: u32,
}

impl WireRecord for AnimGraphRecord {
    const LOGGER: &'static str = ANIMATION_LOGGER;
    const EVENT: &'static str = "AnimGraph";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle).u64(self.anim_instance).u8(self.phase.to_wire()).u32(self.node_count);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            cycle: input.u64()?,
            anim_instance: input.u64()?,
            phase: AnimGraphPhase::read(input)?,
            node_count: input.u32()?,
        })
    }
}

/// Graph edge visited during an update
#[derive(Debug, Clone, PartialEq)]
pub struct AnimNodeVisitRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Anim instance object id
    pub anim_instance: u64,
    /// Visiting node id
    pub source_node: i32,
    /// Visited node id
    pub target_node: i32,
    /// Weight of the visited node
    pub weight: f32,
    /// Display name of the visited node
    pub name: String,
}

impl WireRecord for AnimNodeVisitRecord {
    const LOGGER: &'static str = ANIMATION_LOGGER;
    const EVENT: &'static str = "AnimNodeVisit";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle)
            .u64(self.anim_instance)
            .i32(self.source_node)
            .i32(self.target_node)
            .f32(self.weight)
            .string(&self.name);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            cycle: input.u64()?,
            anim_instance: input.u64()?,
            source_node: input.i32()?,
            target_node: input.i32()?,
            weight: input.f32()?,
            name: input.string()?,
        })
    }
}

/// Current state of an animation state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateMachineStateRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Anim instance object id
    pub anim_instance: u64,
    /// State machine node id
    pub node_id: i32,
    /// State machine index
    pub machine: i32,
    /// Active state index
    pub state: i32,
    /// Weight of the state
    pub weight: f32,
    /// Time spent in the state
    pub elapsed: f32,
}

impl WireRecord for StateMachineStateRecord {
    const LOGGER: &'static str = ANIMATION_LOGGER;
    const EVENT: &'static str = "StateMachineState";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle)
            .u64(self.anim_instance)
            .i32(self.node_id)
            .i32(self.machine)
            .i32(self.state)
            .f32(self.weight)
            .f32(self.elapsed);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            cycle: input.u64()?,
            anim_instance: input.u64()?,
            node_id: input.i32()?,
            machine: input.i32()?,
            state: input.i32()?,
            weight: input.f32()?,
            elapsed: input.f32()?,
        })
    }
}

/// Playback position of a sequence player node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencePlayerRecord {
    /// Timestamp in cycles
    pub cycle: u64,
    /// Anim instance object id
    pub anim_instance: u64,
    /// Player node id
    pub node_id: i32,
    /// Playback position
    pub position: f32,
    /// Sequence length
    pub length: f32,
    /// Frame counter of the player
    pub frame_counter: i32,
}

impl WireRecord for SequencePlayerRecord {
    const LOGGER: &'static str = ANIMATION_LOGGER;
    const EVENT: &'static str = "SequencePlayer";

    fn encode(&self, out: &mut PayloadWriter) {
        out.u64(self.cycle)
            .u64(self.anim_instance)
            .i32(self.node_id)
            .f32(self.position)
            .f32(self.length)
            .i32(self.frame_counter);
    }

    fn decode(input: &mut PayloadReader) -> Result<Self, WireError> {
        Ok(Self {
            cycle: input.u64()?,
            anim_instance: input.u64()?,
            node_id: input.i32()?,
            position: input.f32()?,
            length: input.f32()?,
            frame_counter: input.i32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn reencode<R: WireRecord>(record: &R) -> R {
        let mut out = PayloadWriter::new();
        record.encode(&mut out);
        let mut input = PayloadReader::new(out.finish());
        let decoded = R::decode(&mut input).unwrap();
        assert_eq!(input.remaining(), 0);
        decoded
    }

    #[test]
    fn test_instance_record_layout() {
        let record = InstanceRecord {
            cycle: 42,
            tree_name: "Guard".into(),
            tree_path: "/Game/AI".into(),
            compiled_hash: 0xdead_beef,
            instance: InstanceId::new(1, 1),
            name: "Guard_C_0".into(),
            lifecycle: InstanceLifecycle::Stopped,
        };
        assert_eq!(reencode(&record), record);
    }

    #[test]
    fn test_task_record_with_data() {
        let record = TaskRecord {
            cycle: 7,
            instance: InstanceId::new(2, 3),
            task: 4,
            kind: TaskEventKind::Tick,
            status: RunStatus::Running,
            data: "{\"speed\":3}".into(),
        };
        assert_eq!(reencode(&record), record);
    }

    #[test]
    fn test_invalid_discriminant() {
        let mut out = PayloadWriter::new();
        out.u64(1).u32(1).u32(1).u16(0).u8(9);
        let err = StateRecord::decode(&mut PayloadReader::new(out.finish())).unwrap_err();
        assert!(matches!(
            err,
            WireError::InvalidDiscriminant { field: "state event kind", value: 9 }
        ));
    }

    #[test]
    fn test_truncated_record() {
        let err = PoseRecord::decode(&mut PayloadReader::new(Bytes::from_static(&[0; 12])))
            .unwrap_err();
        assert!(matches!(err, WireError::Truncated { .. }));
    }

    #[test]
    fn test_enum_discriminants_are_stable() {
        assert_eq!(StateEventKind::Enter.to_wire(), 0);
        assert_eq!(RunStatus::from_wire(3), Some(RunStatus::Unset));
        assert_eq!(AnimGraphPhase::from_wire(4), Some(AnimGraphPhase::Evaluate));
        assert_eq!(InstanceLifecycle::from_wire(2), None);
    }
}
