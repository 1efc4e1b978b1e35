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

use stdb_common::wire::{
    AnimGraphRecord, AnimNodeVisitRecord, CurveRecord, PayloadReader, PoseRecord,
    SequencePlayerRecord, StateMachineStateRecord, TickRecordRecord, WireError, WireRecord,
};

use super::{Analyzer, EventContext, RouteBuilder, RouteId};
use crate::gameplay::{
    AnimGraphMessage, AnimNodeVisitMessage, CurveMessage, PoseMessage, SequencePlayerMessage,
    StateMachineMessage, TickRecordMessage,
};

const ROUTE_TICK_RECORD: RouteId = 0;
const ROUTE_POSE: RouteId = 1;
const ROUTE_CURVE: RouteId = 2;
const ROUTE_ANIM_GRAPH: RouteId = 3;
const ROUTE_NODE_VISIT: RouteId = 4;
const ROUTE_STATE_MACHINE: RouteId = 5;
const ROUTE_SEQUENCE_PLAYER: RouteId = 6;

/// Records animation data per anim instance
#[derive(Debug, Default)]
pub struct AnimationAnalyzer;

impl Analyzer for AnimationAnalyzer {
    fn name(&self) -> &'static str {
        "animation"
    }

    fn on_analysis_begin(&mut self, routes: &mut RouteBuilder<'_>) {
        routes
            .route::<TickRecordRecord>(ROUTE_TICK_RECORD)
            .route::<PoseRecord>(ROUTE_POSE)
            .route::<CurveRecord>(ROUTE_CURVE)
            .route::<AnimGraphRecord>(ROUTE_ANIM_GRAPH)
            .route::<AnimNodeVisitRecord>(ROUTE_NODE_VISIT)
            .route::<StateMachineStateRecord>(ROUTE_STATE_MACHINE)
            .route::<SequencePlayerRecord>(ROUTE_SEQUENCE_PLAYER);
    }

    fn on_event(
        &mut self,
        route: RouteId,
        ctx: &mut EventContext<'_>,
        payload: &mut PayloadReader,
    ) -> Result<(), WireError> {
        match route {
            ROUTE_TICK_RECORD => {
                let r = TickRecordRecord::decode(payload)?;
                let time = ctx.seconds(r.cycle);
                ctx.store.animation.instance_mut(r.anim_instance).tick_records.push(
                    TickRecordMessage {
                        time,
                        asset_name: r.asset_name,
                        node_id: r.node_id,
                        blend_weight: r.blend_weight,
                        playback_time: r.playback_time,
                    },
                )?;
            }
            ROUTE_POSE => {
                let r = PoseRecord::decode(payload)?;
                let time = ctx.seconds(r.cycle);
                ctx.store.animation.append_pose(
                    r.component,
                    PoseMessage { time, bone_count: r.bone_count, lod: r.lod },
                )?;
            }
            ROUTE_CURVE => {
                let r = CurveRecord::decode(payload)?;
                let time = ctx.seconds(r.cycle);
                ctx.store
                    .animation
                    .instance_mut(r.anim_instance)
                    .curves
                    .push(CurveMessage { time, name: r.name, value: r.value })?;
            }
            ROUTE_ANIM_GRAPH => {
                let r = AnimGraphRecord::decode(payload)?;
                let time = ctx.seconds(r.cycle);
                ctx.store
                    .animation
                    .instance_mut(r.anim_instance)
                    .graph
                    .push(AnimGraphMessage { time, phase: r.phase, node_count: r.node_count })?;
            }
            ROUTE_NODE_VISIT => {
                let r = AnimNodeVisitRecord::decode(payload)?;
                let time = ctx.seconds(r.cycle);
                ctx.store.animation.instance_mut(r.anim_instance).node_visits.push(
                    AnimNodeVisitMessage {
                        time,
                        source_node: r.source_node,
                        target_node: r.target_node,
                        weight: r.weight,
                        name: r.name,
                    },
                )?;
            }
            ROUTE_STATE_MACHINE => {
                let r = StateMachineStateRecord::decode(payload)?;
                let time = ctx.seconds(r.cycle);
                ctx.store.animation.instance_mut(r.anim_instance).state_machines.push(
                    StateMachineMessage {
                        time,
                        node_id: r.node_id,
                        machine: r.machine,
                        state: r.state,
                        weight: r.weight,
                        elapsed: r.elapsed,
                    },
                )?;
            }
            ROUTE_SEQUENCE_PLAYER => {
                let r = SequencePlayerRecord::decode(payload)?;
                let time = ctx.seconds(r.cycle);
                ctx.store.animation.instance_mut(r.anim_instance).sequence_players.push(
                    SequencePlayerMessage {
                        time,
                        node_id: r.node_id,
                        position: r.position,
                        length: r.length,
                        frame_counter: r.frame_counter,
                    },
                )?;
            }
            _ => {}
        }
        Ok(())
    }
}
