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

//! Record-demo command - write a synthetic trace to try the other commands on

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use eyre::{Context, Result};
use stdb_common::{
    types::{
        FrameType, InstanceId, InstanceLifecycle, RunStatus, SessionMetadata, StateEventKind,
        StateTreeAsset, TaskEventKind,
    },
    wire::{
        ActiveStatesRecord, AnimGraphPhase, AnimGraphRecord, AnimNodeVisitRecord, BeginFrameRecord,
        ConditionRecord, CurveRecord, EndFrameRecord, InstanceRecord, LogRecord, ObjectEventRecord,
        ObjectRecord, PoseRecord, SequencePlayerRecord, StateMachineStateRecord, StateRecord,
        TaskRecord, TickRecordRecord, TraceHeader, TraceWriter, WireError,
    },
};

const CYCLES_PER_SECOND: u64 = 1_000_000;
const FRAME_CYCLES: u64 = 33_333;
const FRAMES: u64 = 60;
const COMPILED_HASH: u32 = 0x5eed_0001;

const ROOT: u16 = 0;
const IDLE: u16 = 1;
const PATROL: u16 = 2;
const ALERT: u16 = 3;
const ATTACK: u16 = 4;

const WAIT: u16 = 0;
const MOVE_TO: u16 = 1;
const PLAY_MONTAGE: u16 = 2;

const GUARD_1: InstanceId = InstanceId::new(1, 1);
const GUARD_2: InstanceId = InstanceId::new(2, 1);

const WORLD: u64 = 1;
const GUARD_ACTOR: u64 = 100;
const GUARD_MESH: u64 = 101;
const GUARD_ANIM: u64 = 102;

/// Asset executed by the demo instances
fn demo_asset() -> StateTreeAsset {
    let mut asset = StateTreeAsset::new("GuardBrain", "/Game/AI/GuardBrain", COMPILED_HASH)
        .with_states(["Root", "Idle", "Patrol", "Alert", "Attack"])
        .with_tasks(["Wait", "MoveTo", "PlayMontage"]);
    asset.conditions = vec!["CanSeeTarget".to_string()];
    asset
}

fn task_of(state: u16) -> u16 {
    match state {
        PATROL => MOVE_TO,
        ATTACK => PLAY_MONTAGE,
        _ => WAIT,
    }
}

/// Write the demo trace to `out` and its asset description next to it
pub fn record_demo(out: &Path) -> Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {parent:?}"))?;
    }

    let asset = demo_asset();
    let asset_path = out.with_extension("json");
    fs::write(&asset_path, serde_json::to_string_pretty(&asset)?)
        .with_context(|| format!("Failed to write asset file: {asset_path:?}"))?;

    let file = File::create(out).with_context(|| format!("Failed to create trace: {out:?}"))?;
    let header = TraceHeader {
        cycles_per_second: CYCLES_PER_SECOND,
        metadata: SessionMetadata {
            platform: std::env::consts::OS.to_string(),
            app_name: "StdbDemo".to_string(),
            build_config: "Development".to_string(),
        },
    };
    let mut demo = DemoRecorder {
        writer: TraceWriter::new(BufWriter::new(file), &header)?,
        guard_1: IDLE,
        guard_2: IDLE,
    };
    demo.record()?;
    demo.writer.flush()?;
    tracing::info!(trace = ?out, asset = ?asset_path, frames = FRAMES, "Demo trace written");

    println!("Wrote {} and {}", out.display(), asset_path.display());
    Ok(())
}

struct DemoRecorder<W: Write> {
    writer: TraceWriter<W>,
    guard_1: u16,
    guard_2: u16,
}

impl<W: Write> DemoRecorder<W> {
    fn record(&mut self) -> Result<(), WireError> {
        for frame in 0..FRAMES {
            let cycle = frame * FRAME_CYCLES;
            self.writer.write(&BeginFrameRecord { frame_type: FrameType::Game, cycle })?;
            if frame == 0 {
                self.spawn(cycle + 1)?;
            }
            self.guards(frame, cycle + 10)?;
            self.animation(frame, cycle + 20)?;
        }
        let end = FRAMES * FRAME_CYCLES;
        self.writer.write(&EndFrameRecord { frame_type: FrameType::Game, cycle: end })
    }

    fn spawn(&mut self, cycle: u64) -> Result<(), WireError> {
        for (id, outer, name, class_name) in [
            (WORLD, 0, "World", "World"),
            (GUARD_ACTOR, WORLD, "Guard_1", "Character"),
            (GUARD_MESH, GUARD_ACTOR, "Mesh", "SkeletalMeshComponent"),
            (GUARD_ANIM, GUARD_MESH, "GuardAnim", "AnimInstance"),
        ] {
            self.writer.write(&ObjectRecord {
                id,
                outer,
                name: name.to_string(),
                class_name: class_name.to_string(),
            })?;
        }
        self.object_event(cycle, "Spawned")?;

        for instance in [GUARD_1, GUARD_2] {
            self.lifecycle(cycle, instance, InstanceLifecycle::Started)?;
            self.state(cycle, instance, ROOT, StateEventKind::Enter)?;
            self.state(cycle, instance, IDLE, StateEventKind::Enter)?;
            self.task(cycle, instance, WAIT, TaskEventKind::Enter, RunStatus::Running)?;
            self.writer.write(&ActiveStatesRecord { cycle, instance, states: vec![ROOT, IDLE] })?;
        }
        Ok(())
    }

    fn guards(&mut self, frame: u64, cycle: u64) -> Result<(), WireError> {
        match frame {
            10 => self.transition(cycle, GUARD_1, PATROL)?,
            20 => self.transition(cycle, GUARD_2, PATROL)?,
            30 => {
                self.writer.write(&LogRecord {
                    cycle,
                    instance: GUARD_1,
                    message: "Heard a noise".to_string(),
                })?;
                self.writer.write(&ConditionRecord {
                    cycle,
                    instance: GUARD_1,
                    condition: 0,
                    passed: false,
                })?;
                self.transition(cycle, GUARD_1, ALERT)?;
            }
            40 => {
                self.writer.write(&ConditionRecord {
                    cycle,
                    instance: GUARD_1,
                    condition: 0,
                    passed: true,
                })?;
                self.transition(cycle, GUARD_1, ATTACK)?;
            }
            42 => self.object_event(cycle, "TookDamage")?,
            45 => self.lifecycle(cycle, GUARD_2, InstanceLifecycle::Stopped)?,
            50 => self.transition(cycle, GUARD_1, PATROL)?,
            _ => {}
        }

        if frame % 5 == 4 {
            let task = task_of(self.guard_1);
            self.task(cycle + 1, GUARD_1, task, TaskEventKind::Tick, RunStatus::Running)?;
        }
        Ok(())
    }

    fn transition(&mut self, cycle: u64, instance: InstanceId, to: u16) -> Result<(), WireError> {
        let from = if instance == GUARD_1 { self.guard_1 } else { self.guard_2 };
        self.task(cycle, instance, task_of(from), TaskEventKind::Exit, RunStatus::Succeeded)?;
        self.state(cycle, instance, from, StateEventKind::Exit)?;
        self.state(cycle, instance, to, StateEventKind::Enter)?;
        self.task(cycle, instance, task_of(to), TaskEventKind::Enter, RunStatus::Running)?;
        self.writer.write(&ActiveStatesRecord { cycle, instance, states: vec![ROOT, to] })?;

        if instance == GUARD_1 {
            self.guard_1 = to;
        } else {
            self.guard_2 = to;
        }
        Ok(())
    }

    fn animation(&mut self, frame: u64, cycle: u64) -> Result<(), WireError> {
        let walking = matches!(self.guard_1, PATROL | ATTACK);
        let speed = if walking { 150.0 } else { 0.0 };
        let (asset_name, length) = if walking { ("Walk", 1.2) } else { ("Idle", 2.0) };
        let playback_time = (frame as f32 / 30.0) % length;

        self.writer.write(&AnimGraphRecord {
            cycle,
            anim_instance: GUARD_ANIM,
            phase: AnimGraphPhase::Update,
            node_count: 4,
        })?;
        self.writer.write(&AnimNodeVisitRecord {
            cycle,
            anim_instance: GUARD_ANIM,
            source_node: 0,
            target_node: 1,
            weight: 1.0,
            name: "Locomotion".to_string(),
        })?;
        self.writer.write(&StateMachineStateRecord {
            cycle,
            anim_instance: GUARD_ANIM,
            node_id: 1,
            machine: 0,
            state: i32::from(walking),
            weight: 1.0,
            elapsed: playback_time,
        })?;
        self.writer.write(&SequencePlayerRecord {
            cycle,
            anim_instance: GUARD_ANIM,
            node_id: 2,
            position: playback_time,
            length,
            frame_counter: frame as i32,
        })?;
        self.writer.write(&TickRecordRecord {
            cycle,
            anim_instance: GUARD_ANIM,
            asset_name: asset_name.to_string(),
            node_id: 2,
            blend_weight: 1.0,
            playback_time,
        })?;
        self.writer.write(&CurveRecord {
            cycle,
            anim_instance: GUARD_ANIM,
            name: "Speed".to_string(),
            value: speed,
        })?;
        self.writer.write(&PoseRecord { cycle, component: GUARD_MESH, bone_count: 65, lod: 0 })
    }

    fn object_event(&mut self, cycle: u64, event: &str) -> Result<(), WireError> {
        self.writer.write(&ObjectEventRecord { cycle, id: GUARD_ACTOR, event: event.to_string() })
    }

    fn lifecycle(
        &mut self,
        cycle: u64,
        instance: InstanceId,
        lifecycle: InstanceLifecycle,
    ) -> Result<(), WireError> {
        self.writer.write(&InstanceRecord {
            cycle,
            tree_name: "GuardBrain".to_string(),
            tree_path: "/Game/AI/GuardBrain".to_string(),
            compiled_hash: COMPILED_HASH,
            instance,
            name: format!("Guard_{}", instance.id),
            lifecycle,
        })
    }

    fn state(
        &mut self,
        cycle: u64,
        instance: InstanceId,
        state: u16,
        kind: StateEventKind,
    ) -> Result<(), WireError> {
        self.writer.write(&StateRecord { cycle, instance, state, kind })
    }

    fn task(
        &mut self,
        cycle: u64,
        instance: InstanceId,
        task: u16,
        kind: TaskEventKind,
        status: RunStatus,
    ) -> Result<(), WireError> {
        let data = format!("{{\"task\":{task},\"cycle\":{cycle}}}");
        self.writer.write(&TaskRecord { cycle, instance, task, kind, status, data })
    }
}
