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

//! Traces command - list the traces of the store

use eyre::Result;
use stdb_engine::{FileStoreClient, StoreClient};

/// Print every trace of the configured trace directory
pub fn list_traces(cli: &crate::Cli) -> Result<()> {
    let config = cli.config()?;
    let client = FileStoreClient::new(&config.store.trace_dir);
    let traces = client.traces()?;
    tracing::debug!(dir = %client.dir().display(), count = traces.len(), "Listed traces");

    if traces.is_empty() {
        println!("No traces in {}", client.dir().display());
        return Ok(());
    }

    println!("{:<4} {:<24} {:<5} {:<10} {:<20} BUILD", "ID", "NAME", "LIVE", "PLATFORM", "APP");
    for trace in traces {
        let live = if client.is_live(trace.id) { "yes" } else { "no" };
        println!(
            "{:<4} {:<24} {:<5} {:<10} {:<20} {}",
            trace.id.to_string(),
            trace.name,
            live,
            trace.metadata.platform,
            trace.metadata.app_name,
            trace.metadata.build_config
        );
    }
    Ok(())
}
