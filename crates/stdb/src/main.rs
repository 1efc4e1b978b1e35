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

//! STDB - State Tree Debugger
//!
//! Analyze recorded state tree traces and step through them frame by frame.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::Result;
use stdb_common::Config;

mod cmd;

/// Command-line interface for STDB
#[derive(Debug, Parser)]
#[command(name = "stdb")]
#[command(about = "State Tree Debugger - Analyze and step through recorded state tree traces")]
#[command(version)]
pub struct Cli {
    /// Directory holding the trace files (default: from ~/.stdb.toml)
    #[arg(long, env = "STDB_TRACE_DIR", global = true)]
    pub trace_dir: Option<PathBuf>,

    /// Only log to the console
    #[arg(long, global = true)]
    pub no_file_log: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the traces in the store
    Traces,
    /// Analyze a trace and list its instances
    Instances {
        /// Trace id or name
        trace: String,
        /// Asset description files used to register instances
        #[arg(long)]
        asset: Vec<PathBuf>,
    },
    /// Debug the instances of a state tree asset
    Debug {
        /// Trace id or name
        trace: String,
        /// Asset description file of the debugged state tree
        #[arg(long)]
        asset: PathBuf,
        /// Name of the instance to debug (default: break on any instance)
        #[arg(long)]
        instance: Option<String>,
        /// Breakpoint location: a state name or `#<index>`
        #[arg(long = "break", value_name = "STATE")]
        breakpoints: Vec<String>,
        /// Frames with events to step through after each breakpoint hit
        #[arg(long, default_value = "3")]
        steps: usize,
    },
    /// Print the gameplay track tree of a trace
    Tracks {
        /// Trace id or name
        trace: String,
        /// Also print the animation graph data of the frame at this time, in seconds
        #[arg(long)]
        at: Option<f64>,
    },
    /// Write a synthetic trace and the description of its asset
    RecordDemo {
        /// Output trace file
        out: PathBuf,
    },
}

impl Cli {
    /// User configuration with command line overrides applied
    pub fn config(&self) -> Result<Config> {
        let config = Config::load()?;
        Ok(match &self.trace_dir {
            Some(dir) => config.with_trace_dir(dir.clone()),
            None => config,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    stdb_common::init_logging("stdb", !cli.no_file_log)?;

    match &cli.command {
        Commands::Traces => cmd::list_traces(&cli),
        Commands::Instances { trace, asset } => cmd::list_instances(&cli, trace, asset).await,
        Commands::Debug { trace, asset, instance, breakpoints, steps } => {
            let args = cmd::DebugArgs {
                trace,
                asset,
                instance: instance.as_deref(),
                breakpoints,
                steps: *steps,
            };
            cmd::debug_trace(&cli, args).await
        }
        Commands::Tracks { trace, at } => cmd::print_tracks(&cli, trace, *at).await,
        Commands::RecordDemo { out } => cmd::record_demo(out),
    }
}
