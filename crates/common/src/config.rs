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

//! Configuration system for STDB
//!
//! User settings are kept in `~/.stdb.toml`. A default file is created the
//! first time the configuration is loaded. Command line flags override
//! individual values after loading.

use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::FrameType;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trace store settings
    pub store: StoreConfig,
    /// Analysis session settings
    pub analysis: AnalysisConfig,
    /// Debugger settings
    pub debugger: DebuggerConfig,
}

/// Trace store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory scanned for `*.sttrace` files
    pub trace_dir: PathBuf,
}

/// Analysis session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Bytes requested per read of the trace stream
    pub read_chunk_size: usize,
    /// Sleep between reads once a live trace has no more bytes, in milliseconds
    pub live_poll_interval_ms: u64,
    /// Frame type used to quantize scrubbing
    pub frame_type: FrameType,
}

/// Debugger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Pause the scrub cursor when a breakpoint hits
    pub pause_on_breakpoint: bool,
    /// Interval between debugger ticks driven by the command line, in milliseconds
    pub tick_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let trace_dir = dirs::home_dir()
            .map(|home| home.join(".stdb").join("traces"))
            .unwrap_or_else(|| PathBuf::from(".stdb/traces"));
        Self { trace_dir }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { read_chunk_size: 64 * 1024, live_poll_interval_ms: 50, frame_type: FrameType::Game }
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self { pause_on_breakpoint: true, tick_interval_ms: 100 }
    }
}

impl Config {
    /// Get the config file path (~/.stdb.toml)
    pub fn config_path() -> Result<PathBuf> {
        let home =
            dirs::home_dir().ok_or_else(|| eyre::eyre!("Unable to determine home directory"))?;
        Ok(home.join(".stdb.toml"))
    }

    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, creating a default file if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file not found, creating default at {:?}", path);
            let default_config = Self::default();
            default_config.save_to(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {parent:?}"))?;
            }
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {path:?}"))?;

        debug!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Override the trace directory
    pub fn with_trace_dir(mut self, trace_dir: impl Into<PathBuf>) -> Self {
        self.store.trace_dir = trace_dir.into();
        self
    }
}
