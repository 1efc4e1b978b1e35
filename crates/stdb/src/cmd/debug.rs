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

//! Debug command - replay a trace with breakpoints and step through it

use std::{path::Path, sync::Arc, time::Duration};

use eyre::{bail, eyre, Result};
use itertools::Itertools;
use stdb_common::types::{
    BreakpointHit, BreakpointLocation, InstanceDescriptor, StateHandle, StateTreeAsset,
};
use stdb_engine::{
    AnalysisSession, AssetRegistry, DebuggerNotification, FrameProvider, NotificationRecorder,
    StateTreeDebugger, StoreClient,
};
use tracing::{debug, info};

use super::{describe_event, open_context, state_label};

/// Arguments of the debug command
#[derive(Debug)]
pub struct DebugArgs<'a> {
    /// Trace id or name
    pub trace: &'a str,
    /// Asset description file
    pub asset: &'a Path,
    /// Instance to debug
    pub instance: Option<&'a str>,
    /// Breakpoint locations
    pub breakpoints: &'a [String],
    /// Frames to step through after each hit
    pub steps: usize,
}

/// Follow the analysis of a trace, then replay it frame by frame with the
/// breakpoints armed. Every hit is reported, followed by the frames stepped
/// through when an instance is being debugged.
pub async fn debug_trace(cli: &crate::Cli, args: DebugArgs<'_>) -> Result<()> {
    let registry = Arc::new(AssetRegistry::new());
    let asset = registry.load_json(args.asset)?;
    let breakpoints = args
        .breakpoints
        .iter()
        .map(|location| location.parse::<BreakpointLocation>()?.resolve(&asset))
        .collect::<Result<Vec<StateHandle>>>()?;

    let ctx = open_context(cli.config()?, registry.clone());
    let tick_interval = Duration::from_millis(ctx.config.debugger.tick_interval_ms.max(1));
    let trace = ctx.store_client.find_trace(args.trace)?;

    let recorder = NotificationRecorder::new();
    let mut debugger = StateTreeDebugger::new(ctx, &asset);
    debugger.add_observer(Box::new(recorder.clone()));
    if !debugger.start_session_analysis(&trace) {
        bail!("Failed to start analysis of trace {trace}");
    }

    // Follow the session until the trace is fully analyzed
    let mut ticker = tokio::time::interval(tick_interval);
    loop {
        ticker.tick().await;
        debugger.tick();
        if debugger.session().is_none_or(AnalysisSession::is_complete) {
            break;
        }
    }
    debugger.tick();
    info!(duration = debugger.session().map(AnalysisSession::duration), "Trace analyzed");

    let selected = match args.instance {
        Some(name) => Some(find_instance(&debugger, &asset, name)?),
        None => None,
    };
    match &selected {
        Some(instance) => println!("Debugging {instance}"),
        None => println!("Watching every instance of {}", asset.name),
    }

    debugger.set_debugged_instance(selected);
    debugger.toggle_breakpoints(breakpoints);
    debugger.rewind();
    debugger.unpause();
    recorder.take();

    let frame_count = debugger
        .session()
        .map(|session| {
            let store = session.store().read();
            store.frames.frame_count(store.frame_type())
        })
        .unwrap_or_default();

    let mut hits = 0;
    if frame_count == 0 {
        debugger.sync_to_current_session_duration();
        hits += report_hits(&mut debugger, &recorder, &asset, args.steps);
    }
    for frame in 0..frame_count {
        if !debugger.read_trace(frame) {
            debug!(frame, "Stopped at open frame");
            break;
        }
        hits += report_hits(&mut debugger, &recorder, &asset, args.steps);
    }

    println!("{hits} breakpoint hit(s)");
    debugger.stop_analysis();
    Ok(())
}

fn find_instance(
    debugger: &StateTreeDebugger,
    asset: &Arc<StateTreeAsset>,
    name: &str,
) -> Result<InstanceDescriptor> {
    let session = debugger.session().ok_or_else(|| eyre!("No analysis session"))?;
    let store = session.store().read();
    let found = store
        .state_tree
        .known_instances()
        .iter()
        .find(|d| d.name == name && d.asset.points_to(asset))
        .cloned();
    found.ok_or_else(|| eyre!("Instance '{name}' of {} not found in trace", asset.name))
}

/// Print the hits of the last read, stepping through frames after each one
fn report_hits(
    debugger: &mut StateTreeDebugger,
    recorder: &NotificationRecorder,
    asset: &StateTreeAsset,
    steps: usize,
) -> usize {
    let hits: Vec<BreakpointHit> = recorder
        .take()
        .into_iter()
        .filter_map(|n| match n {
            DebuggerNotification::BreakpointHit(hit) => Some(hit),
            _ => None,
        })
        .collect();

    for hit in &hits {
        println!(
            "Breakpoint hit: instance {} entered {} at {:.4}s (frame {})",
            hit.instance,
            state_label(asset, hit.state),
            hit.time,
            hit.frame_index
        );
        if debugger.debugged_instance().is_some() {
            print_cursor_frame(debugger, asset);
            for _ in 0..steps {
                if !debugger.step_forward() {
                    break;
                }
                print_cursor_frame(debugger, asset);
            }
        }
        debugger.unpause();
    }
    hits.len()
}

/// Print the buffered events of the frame under the cursor
fn print_cursor_frame(debugger: &StateTreeDebugger, asset: &StateTreeAsset) {
    let frame = debugger.scrub_frame_index();
    let spans = debugger.frame_spans();
    let Some(position) = spans.iter().position(|s| s.frame_index == frame) else {
        println!("  frame {frame}: no events");
        return;
    };
    let start = spans[position].event_offset;
    let end = spans.get(position + 1).map_or(debugger.events().len(), |s| s.event_offset);

    println!("  frame {frame}:");
    for event in &debugger.events()[start..end] {
        println!("    {:>9.4}s  {}", event.time, describe_event(asset, &event.event));
    }
    println!(
        "    active: {}",
        debugger.active_states().iter().map(|s| state_label(asset, *s)).join(" > ")
    );
}
