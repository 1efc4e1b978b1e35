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

//! Command modules for the STDB CLI

mod debug;
mod instances;
mod record_demo;
mod traces;
mod tracks;

pub use debug::{debug_trace, DebugArgs};
pub use instances::list_instances;
pub use record_demo::record_demo;
pub use traces::list_traces;
pub use tracks::print_tracks;

use std::sync::Arc;

use eyre::{eyre, Result};
use itertools::Itertools;
use stdb_common::{
    types::{StateHandle, StateTreeAsset, TraceDescriptor, TraceEvent},
    Config,
};
use stdb_engine::{AnalysisSession, AssetResolver, DebuggerContext, FileStoreClient, StoreClient};

/// Debugger context over the configured trace directory
fn open_context(config: Config, assets: Arc<dyn AssetResolver>) -> DebuggerContext {
    let client = Arc::new(FileStoreClient::new(&config.store.trace_dir));
    DebuggerContext::new(client, assets, config)
}

/// Analyze the whole trace on a blocking thread
async fn analyze(ctx: &DebuggerContext, trace: TraceDescriptor) -> Result<AnalysisSession> {
    let client = ctx.store_client.clone();
    let stream = client.read_trace(trace.id).ok_or_else(|| eyre!("Failed to open trace {trace}"))?;
    let id = trace.id;
    let mut session = AnalysisSession::start(
        trace,
        stream,
        Box::new(move || client.is_live(id)),
        ctx.analyzers(),
        &ctx.config.analysis,
    )?;

    tokio::task::spawn_blocking(move || {
        session.wait();
        session
    })
    .await
    .map_err(|e| eyre!("Analysis task failed: {e}"))
}

fn state_label(asset: &StateTreeAsset, state: StateHandle) -> String {
    asset.state_name(state).map_or_else(|| state.to_string(), str::to_string)
}

/// One line description of an event using the names compiled into `asset`
fn describe_event(asset: &StateTreeAsset, event: &TraceEvent) -> String {
    match event {
        TraceEvent::State { index, kind } => format!("State {} {kind:?}", state_label(asset, *index)),
        TraceEvent::Task { index, kind, status, .. } => {
            format!("Task {} {kind:?} ({status:?})", asset.task_name(*index).unwrap_or("?"))
        }
        TraceEvent::Condition { index, passed } => format!(
            "Condition {} {}",
            asset.condition_name(*index).unwrap_or("?"),
            if *passed { "passed" } else { "failed" }
        ),
        TraceEvent::ActiveStates { states } => {
            format!("ActiveStates [{}]", states.iter().map(|s| state_label(asset, *s)).join(" > "))
        }
        TraceEvent::Log { .. } => event.to_string(),
    }
}
