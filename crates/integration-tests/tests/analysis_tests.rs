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

//! Analysis of traces read from disk

use std::{sync::Arc, time::Duration};

use serial_test::serial;
use stdb_common::{
    config::AnalysisConfig,
    types::{FrameType, InstanceId, StateHandle, StateTreeAsset, TraceEvent},
    wire::STATE_TREE_LOGGER,
};
use stdb_engine::{
    Analyzer, AnalysisSession, AnimationAnalyzer, AssetRegistry, FrameAnalyzer, FrameProvider,
    GameplayAnalyzer, StateTreeTraceAnalyzer, StoreClient,
};
use stdb_integration_tests::test_utils::{
    debugger::{guard_asset, wait_until},
    init::init_test_environment,
    store::TraceDir,
    traces::TraceBuilder,
};

const GUARD: InstanceId = InstanceId::new(7, 1);

fn analyzers(registry: &Arc<AssetRegistry>) -> Vec<Box<dyn Analyzer>> {
    vec![
        Box::new(FrameAnalyzer),
        Box::new(StateTreeTraceAnalyzer::new(registry.clone())),
        Box::new(GameplayAnalyzer),
        Box::new(AnimationAnalyzer),
    ]
}

fn config() -> AnalysisConfig {
    AnalysisConfig { read_chunk_size: 64, live_poll_interval_ms: 1, frame_type: FrameType::Game }
}

/// Analyze trace `name` of `dir` to completion
fn analyze(dir: &TraceDir, name: &str, registry: &Arc<AssetRegistry>) -> AnalysisSession {
    let client = dir.client();
    let trace = client.find_trace(name).unwrap();
    let stream = client.read_trace(trace.id).unwrap();
    let mut session =
        AnalysisSession::start(trace, stream, Box::new(|| false), analyzers(registry), &config())
            .unwrap();
    session.wait();
    session
}

fn registry_with(asset: StateTreeAsset) -> Arc<AssetRegistry> {
    let registry = Arc::new(AssetRegistry::new());
    registry.register(asset);
    registry
}

#[test]
fn test_recorded_trace_is_analyzed() {
    init_test_environment();
    let dir = TraceDir::new().unwrap();
    let mut trace = TraceBuilder::new(&guard_asset());
    trace
        .frame(0)
        .started(1, GUARD, "Guard_7")
        .enter(2, GUARD, 1)
        .active(2, GUARD, &[0, 1])
        .frame(10)
        .task(11, GUARD, 0)
        .enter(14, GUARD, 2)
        .active(14, GUARD, &[0, 2])
        .frame(20)
        .log(23, GUARD, "Lost sight of target")
        .end_frame(30);
    dir.add("patrol", &trace.build()).unwrap();

    let descriptor = dir.client().find_trace("patrol").unwrap();
    assert_eq!(descriptor.metadata.app_name, "StdbTests");

    let session = analyze(&dir, "patrol", &registry_with(guard_asset()));
    assert!(session.is_complete());
    assert_eq!(session.duration(), 3.0);

    let store = session.store().read();
    assert_eq!(store.frames.frame_count(FrameType::Game), 3);
    assert!(store.frames.frame(FrameType::Game, 2).is_some_and(|f| f.is_complete()));

    let instances = store.state_tree.active_instances();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].name, "Guard_7");

    let timeline = store.state_tree.timeline(GUARD).unwrap();
    let frames: Vec<u64> = timeline.iter().map(|e| e.frame_index).collect();
    assert_eq!(frames, vec![0, 0, 1, 1, 1, 2]);
    assert!(matches!(
        timeline[3].event,
        TraceEvent::State { index: StateHandle(2), .. }
    ));
    assert!(matches!(&timeline[5].event, TraceEvent::Log { message } if message == "Lost sight of target"));
}

#[test]
#[serial]
fn test_modified_asset_drops_instances() {
    let capture = init_test_environment();
    capture.clear();

    let dir = TraceDir::new().unwrap();
    let mut trace = TraceBuilder::with_hash(&guard_asset(), 0xdead_beef);
    trace.frame(0).started(1, GUARD, "Guard_7").enter(2, GUARD, 1).frame(10);
    dir.add("stale", &trace.build()).unwrap();

    let session = analyze(&dir, "stale", &registry_with(guard_asset()));
    assert!(session.is_complete());
    assert!(session.store().read().state_tree.active_instances().is_empty());
    assert!(capture.contains("modified since the trace was recorded"));
}

#[test]
#[serial]
fn test_unknown_asset_drops_instances() {
    let capture = init_test_environment();
    capture.clear();

    let dir = TraceDir::new().unwrap();
    let mut trace = TraceBuilder::new(&guard_asset());
    trace.frame(0).started(1, GUARD, "Guard_7").frame(10);
    dir.add("orphan", &trace.build()).unwrap();

    let session = analyze(&dir, "orphan", &Arc::new(AssetRegistry::new()));
    assert!(session.store().read().state_tree.known_instances().is_empty());
    assert!(capture.contains("Unable to find state tree asset"));
}

#[test]
#[serial]
fn test_malformed_records_are_skipped() {
    let capture = init_test_environment();
    capture.clear();

    let dir = TraceDir::new().unwrap();
    let mut trace = TraceBuilder::new(&guard_asset());
    trace
        .frame(0)
        .started(1, GUARD, "Guard_7")
        .raw(STATE_TREE_LOGGER, "StateEvent", &[1, 2])
        .raw("Telemetry", "Heartbeat", &[0; 16])
        .enter(3, GUARD, 4)
        .frame(10);
    dir.add("noisy", &trace.build()).unwrap();

    let session = analyze(&dir, "noisy", &registry_with(guard_asset()));
    let store = session.store().read();
    let timeline = store.state_tree.timeline(GUARD).unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].event.entered_state(), Some(StateHandle(4)));
    assert!(capture.contains("Malformed record skipped"));
    assert!(capture.errors().is_empty());
}

#[test]
#[serial]
fn test_record_older_than_its_timeline_is_skipped() {
    let capture = init_test_environment();
    capture.clear();

    let dir = TraceDir::new().unwrap();
    let mut trace = TraceBuilder::new(&guard_asset());
    trace
        .frame(0)
        .started(1, GUARD, "Guard_7")
        .enter(20, GUARD, 1)
        .enter(10, GUARD, 2)
        .enter(30, GUARD, 3)
        .frame(40);
    dir.add("rewound", &trace.build()).unwrap();

    let session = analyze(&dir, "rewound", &registry_with(guard_asset()));
    assert!(session.is_complete());
    assert_eq!(session.duration(), 4.0);

    let store = session.store().read();
    let timeline = store.state_tree.timeline(GUARD).unwrap();
    let entered: Vec<_> = timeline.iter().filter_map(|e| e.event.entered_state()).collect();
    assert_eq!(entered, vec![StateHandle(1), StateHandle(3)]);
    assert!(capture.contains("Malformed record skipped"));
    assert!(capture.errors().is_empty());
}

#[test]
fn test_live_trace_is_followed_until_finished() {
    init_test_environment();
    let dir = TraceDir::new().unwrap();
    let mut trace = TraceBuilder::new(&guard_asset());
    trace.frame(0).started(1, GUARD, "Guard_7").enter(2, GUARD, 1);
    dir.add("live", &trace.take_bytes()).unwrap();
    dir.mark_live("live", true).unwrap();

    let client = Arc::new(dir.client());
    let descriptor = client.find_trace("live").unwrap();
    let stream = client.read_trace(descriptor.id).unwrap();
    let live = {
        let client = client.clone();
        let id = descriptor.id;
        Box::new(move || client.is_live(id))
    };
    let mut session = AnalysisSession::start(
        descriptor,
        stream,
        live,
        analyzers(&registry_with(guard_asset())),
        &config(),
    )
    .unwrap();

    let timeline_len = |session: &AnalysisSession| {
        session.store().read().state_tree.timeline(GUARD).map_or(0, |t| t.len())
    };
    assert!(wait_until(Duration::from_secs(5), || timeline_len(&session) == 1));
    assert!(!session.is_complete());

    trace.frame(10).enter(12, GUARD, 2).frame(20);
    dir.append("live", &trace.take_bytes()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || session.duration() >= 2.0));
    assert_eq!(timeline_len(&session), 2);
    assert!(!session.is_complete());

    dir.mark_live("live", false).unwrap();
    session.wait();
    assert!(session.is_complete());
    assert_eq!(session.store().read().frames.frame_count(FrameType::Game), 3);
}
