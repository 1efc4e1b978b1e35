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

use std::{fmt, sync::Arc};

use stdb_common::{
    types::{InstanceId, StateHandle, TraceEvent},
    wire::{
        ActiveStatesRecord, ConditionRecord, InstanceRecord, LogRecord, PayloadReader, StateRecord,
        TaskRecord, WireError, WireRecord,
    },
};
use tracing::{debug, warn};

use super::{Analyzer, EventContext, RouteBuilder, RouteId};
use crate::AssetResolver;

const ROUTE_INSTANCE: RouteId = 0;
const ROUTE_LOG: RouteId = 1;
const ROUTE_STATE: RouteId = 2;
const ROUTE_TASK: RouteId = 3;
const ROUTE_CONDITION: RouteId = 4;
const ROUTE_ACTIVE_STATES: RouteId = 5;

/// Decodes state tree debugger records into the state tree provider.
///
/// Instance lifecycle records are only applied when the executed asset can be
/// resolved and its compiled data hash matches the one in the trace. Event
/// records are appended whether or not their instance was registered.
pub struct StateTreeTraceAnalyzer {
    resolver: Arc<dyn AssetResolver>,
}

impl fmt::Debug for StateTreeTraceAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTreeTraceAnalyzer").finish_non_exhaustive()
    }
}

impl StateTreeTraceAnalyzer {
    /// Create an analyzer resolving assets through `resolver`
    pub fn new(resolver: Arc<dyn AssetResolver>) -> Self {
        Self { resolver }
    }

    fn on_instance(&self, ctx: &mut EventContext<'_>, record: InstanceRecord) {
        ctx.seconds(record.cycle);

        let Some(asset) = self.resolver.resolve(&record.tree_path, &record.tree_name) else {
            warn!(
                tree = %record.tree_name,
                path = %record.tree_path,
                instance = %record.instance,
                "Unable to find state tree asset, instance lifecycle dropped"
            );
            return;
        };

        if asset.compiled_data_hash != record.compiled_hash {
            warn!(
                tree = %record.tree_name,
                instance = %record.instance,
                traced_hash = record.compiled_hash,
                loaded_hash = asset.compiled_data_hash,
                "State tree asset was modified since the trace was recorded, instance lifecycle dropped"
            );
            return;
        }

        ctx.store.state_tree.append_instance_lifecycle(
            &asset,
            record.instance,
            &record.name,
            record.lifecycle,
        );
    }
}

fn append(
    ctx: &mut EventContext<'_>,
    cycle: u64,
    instance: InstanceId,
    event: TraceEvent,
) -> Result<(), WireError> {
    let time = ctx.seconds(cycle);
    let frame_index = ctx.frame_index_at(time);
    debug!(%instance, time, frame_index, kind = event.kind_name(), "Appending state tree event");
    ctx.store.state_tree.append_event(instance, time, frame_index, event)?;
    Ok(())
}

impl Analyzer for StateTreeTraceAnalyzer {
    fn name(&self) -> &'static str {
        "state-tree"
    }

    fn on_analysis_begin(&mut self, routes: &mut RouteBuilder<'_>) {
        routes
            .route::<InstanceRecord>(ROUTE_INSTANCE)
            .route::<LogRecord>(ROUTE_LOG)
            .route::<StateRecord>(ROUTE_STATE)
            .route::<TaskRecord>(ROUTE_TASK)
            .route::<ConditionRecord>(ROUTE_CONDITION)
            .route::<ActiveStatesRecord>(ROUTE_ACTIVE_STATES);
    }

    fn on_event(
        &mut self,
        route: RouteId,
        ctx: &mut EventContext<'_>,
        payload: &mut PayloadReader,
    ) -> Result<(), WireError> {
        match route {
            ROUTE_INSTANCE => self.on_instance(ctx, InstanceRecord::decode(payload)?),
            ROUTE_LOG => {
                let r = LogRecord::decode(payload)?;
                append(ctx, r.cycle, r.instance, TraceEvent::Log { message: r.message })?;
            }
            ROUTE_STATE => {
                let r = StateRecord::decode(payload)?;
                let event = TraceEvent::State { index: StateHandle::new(r.state), kind: r.kind };
                append(ctx, r.cycle, r.instance, event)?;
            }
            ROUTE_TASK => {
                let r = TaskRecord::decode(payload)?;
                let event =
                    TraceEvent::Task { index: r.task, kind: r.kind, status: r.status, data: r.data };
                append(ctx, r.cycle, r.instance, event)?;
            }
            ROUTE_CONDITION => {
                let r = ConditionRecord::decode(payload)?;
                let event = TraceEvent::Condition { index: r.condition, passed: r.passed };
                append(ctx, r.cycle, r.instance, event)?;
            }
            ROUTE_ACTIVE_STATES => {
                let r = ActiveStatesRecord::decode(payload)?;
                let states = r.states.into_iter().map(StateHandle::new).collect();
                append(ctx, r.cycle, r.instance, TraceEvent::ActiveStates { states })?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AssetRegistry, SessionStore};
    use stdb_common::{
        types::{FrameType, InstanceLifecycle, StateEventKind, StateTreeAsset},
        wire::{PayloadWriter, TraceHeader},
    };

    fn run<R: WireRecord>(
        analyzer: &mut StateTreeTraceAnalyzer,
        store: &mut SessionStore,
        route: RouteId,
        record: &R,
    ) {
        let header = TraceHeader { cycles_per_second: 10, ..Default::default() };
        let mut out = PayloadWriter::new();
        record.encode(&mut out);
        let mut ctx = EventContext::new(store, &header);
        analyzer.on_event(route, &mut ctx, &mut PayloadReader::new(out.finish())).unwrap();
    }

    fn lifecycle(hash: u32, id: u32, lifecycle: InstanceLifecycle) -> InstanceRecord {
        InstanceRecord {
            cycle: 0,
            tree_name: "Guard".into(),
            tree_path: "/Game/AI".into(),
            compiled_hash: hash,
            instance: InstanceId::new(id, 1),
            name: format!("Guard_{id}"),
            lifecycle,
        }
    }

    #[test]
    fn test_hash_gated_lifecycle() {
        let registry = Arc::new(AssetRegistry::new());
        registry.register(StateTreeAsset::new("Guard", "/Game/AI", 100));
        let mut analyzer = StateTreeTraceAnalyzer::new(registry);
        let mut store = SessionStore::new(FrameType::Game);

        run(&mut analyzer, &mut store, ROUTE_INSTANCE, &lifecycle(100, 1, InstanceLifecycle::Started));
        run(&mut analyzer, &mut store, ROUTE_INSTANCE, &lifecycle(200, 2, InstanceLifecycle::Started));

        let active = store.state_tree.active_instances();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, InstanceId::new(1, 1));

        // Events of the dropped instance are still recorded.
        let state = StateRecord {
            cycle: 5,
            instance: InstanceId::new(2, 1),
            state: 1,
            kind: StateEventKind::Enter,
        };
        run(&mut analyzer, &mut store, ROUTE_STATE, &state);
        assert_eq!(store.state_tree.timeline(InstanceId::new(2, 1)).map(|t| t.len()), Some(1));
    }

    #[test]
    fn test_missing_asset_drops_lifecycle() {
        let mut analyzer = StateTreeTraceAnalyzer::new(Arc::new(AssetRegistry::new()));
        let mut store = SessionStore::new(FrameType::Game);

        run(&mut analyzer, &mut store, ROUTE_INSTANCE, &lifecycle(1, 1, InstanceLifecycle::Started));
        assert!(store.state_tree.active_instances().is_empty());
    }

    #[test]
    fn test_older_event_is_rejected() {
        let mut analyzer = StateTreeTraceAnalyzer::new(Arc::new(AssetRegistry::new()));
        let mut store = SessionStore::new(FrameType::Game);
        let header = TraceHeader { cycles_per_second: 10, ..Default::default() };
        let id = InstanceId::new(1, 1);

        let mut feed = |store: &mut SessionStore, cycle: u64| {
            let mut out = PayloadWriter::new();
            StateRecord { cycle, instance: id, state: 1, kind: StateEventKind::Enter }.encode(&mut out);
            let mut ctx = EventContext::new(store, &header);
            analyzer.on_event(ROUTE_STATE, &mut ctx, &mut PayloadReader::new(out.finish()))
        };

        feed(&mut store, 20).unwrap();
        let err = feed(&mut store, 10).unwrap_err();
        assert!(matches!(err, WireError::OutOfOrder { time, last } if time == 1.0 && last == 2.0));
        feed(&mut store, 30).unwrap();

        let times: Vec<f64> = store.state_tree.timeline(id).unwrap().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![2.0, 3.0]);
    }

    #[test]
    fn test_events_are_stamped_with_frames() {
        let mut analyzer = StateTreeTraceAnalyzer::new(Arc::new(AssetRegistry::new()));
        let mut store = SessionStore::new(FrameType::Game);
        store.frames.begin_frame(FrameType::Game, 0.0).unwrap();
        store.frames.begin_frame(FrameType::Game, 1.0).unwrap();

        let record =
            ActiveStatesRecord { cycle: 15, instance: InstanceId::new(1, 1), states: vec![0, 2] };
        run(&mut analyzer, &mut store, ROUTE_ACTIVE_STATES, &record);

        let timeline = store.state_tree.timeline(InstanceId::new(1, 1)).unwrap();
        assert_eq!(timeline[0].time, 1.5);
        assert_eq!(timeline[0].frame_index, 1);
        assert_eq!(
            timeline[0].event,
            TraceEvent::ActiveStates { states: vec![StateHandle(0), StateHandle(2)] }
        );
    }
}
