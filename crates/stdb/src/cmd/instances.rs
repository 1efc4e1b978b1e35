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

//! Instances command - analyze a trace and summarize its instances

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use eyre::Result;
use itertools::Itertools;
use stdb_common::types::InstanceId;
use stdb_engine::{AssetRegistry, StoreClient};

use super::{analyze, open_context};

/// Print every instance seen in the trace with its event count
pub async fn list_instances(cli: &crate::Cli, trace: &str, assets: &[PathBuf]) -> Result<()> {
    let registry = Arc::new(AssetRegistry::new());
    for path in assets {
        let asset = registry.load_json(path)?;
        tracing::info!(name = %asset.name, hash = asset.compiled_data_hash, "Loaded asset");
    }

    let ctx = open_context(cli.config()?, registry);
    let trace = ctx.store_client.find_trace(trace)?;
    let session = analyze(&ctx, trace).await?;

    let store = session.store().read();
    let provider = &store.state_tree;
    println!("Trace {} ({:.3}s)", session.trace(), store.duration());

    let names: HashMap<InstanceId, &str> =
        provider.known_instances().iter().map(|d| (d.id, d.name.as_str())).collect();
    let active: Vec<InstanceId> = provider.active_instances().iter().map(|d| d.id).collect();
    let mut event_counts = HashMap::new();
    provider.read_timelines(InstanceId::INVALID, |id, timeline| {
        event_counts.insert(id, timeline.len());
    });

    let ids: Vec<InstanceId> =
        names.keys().chain(event_counts.keys()).copied().unique().sorted().collect();
    if ids.is_empty() {
        println!("No instances");
        return Ok(());
    }

    println!("{:<10} {:<24} {:<9} EVENTS", "ID", "NAME", "STATUS");
    for id in ids {
        let status = if active.contains(&id) {
            "running"
        } else if names.contains_key(&id) {
            "stopped"
        } else {
            "unknown"
        };
        println!(
            "{:<10} {:<24} {:<9} {}",
            id.to_string(),
            names.get(&id).copied().unwrap_or("-"),
            status,
            event_counts.get(&id).copied().unwrap_or_default()
        );
    }
    Ok(())
}
