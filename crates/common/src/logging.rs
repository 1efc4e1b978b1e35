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

//! Logging setup for STDB components
//!
//! Console output is pretty-printed with local timestamps. File output, when
//! enabled, goes to a daily rolling log under `$TMP/stdb-logs/<component>`.
//! Both honour `RUST_LOG` and default to `info`.

use std::{
    env, fs,
    path::PathBuf,
    sync::{Once, OnceLock},
};

use eyre::Result;
use tracing::Level;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Keeps the file writer flushing for the lifetime of the process
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize logging for a STDB component
///
/// # Arguments
/// * `component_name` - Name of the component (e.g., "stdb")
/// * `enable_file_logging` - Whether to also write a rolling log file
///
/// # Examples
/// ```rust,no_run
/// fn main() -> eyre::Result<()> {
///     stdb_common::logging::init_logging("stdb", true)?;
///     tracing::info!("Application started");
///     Ok(())
/// }
/// ```
pub fn init_logging(component_name: &str, enable_file_logging: bool) -> Result<()> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .pretty();

    if enable_file_logging {
        let log_dir = create_log_directory(component_name)?;

        let file_appender = rolling::daily(&log_dir, format!("{component_name}.log"));
        let (writer, guard) = non_blocking(file_appender);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(LocalTime::rfc_3339())
            .with_ansi(false)
            .with_writer(writer);

        tracing_subscriber::registry()
            .with(console_layer.with_filter(default_filter("info")))
            .with(file_layer.with_filter(default_filter("debug")))
            .try_init()
            .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {}", e))?;

        // A second successful init is impossible, so the slot is always empty here.
        let _ = FILE_GUARD.set(guard);

        tracing::info!(
            component = component_name,
            log_dir = %log_dir.display(),
            "Logging initialized with console and file output"
        );
    } else {
        tracing_subscriber::registry()
            .with(console_layer.with_filter(default_filter("info")))
            .try_init()
            .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {}", e))?;

        tracing::info!(component = component_name, "Logging initialized with console output only");
    }

    log_environment_info(component_name);

    Ok(())
}

/// Create the log directory in the system temp folder
fn create_log_directory(component_name: &str) -> Result<PathBuf> {
    let log_dir = env::temp_dir().join("stdb-logs").join(component_name);
    fs::create_dir_all(&log_dir)?;
    Ok(log_dir)
}

/// `RUST_LOG` when set and valid, `fallback` otherwise
fn default_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

fn log_environment_info(component_name: &str) {
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let args: Vec<String> = env::args().collect();

    tracing::info!(
        component = component_name,
        rust_log = %rust_log,
        args = ?args,
        "Environment information"
    );

    if let Ok(current_dir) = env::current_dir() {
        tracing::debug!(working_directory = %current_dir.display(), "Working directory");
    }
}

/// Initialize compact console-only logging at `level` (unless `RUST_LOG` says otherwise)
pub fn init_simple_logging(level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter(level.as_str()))
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to initialize simple logging: {}", e))?;

    Ok(())
}

static TEST_LOGGING_INIT: Once = Once::new();

/// Logging initialization for tests, safe to call any number of times.
///
/// Falls back to `INFO` when no level is given. Errors are ignored: they mean
/// another subscriber is already installed.
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING_INIT.call_once(|| {
        let _ = init_simple_logging(default_level.unwrap_or(Level::INFO));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tracing::{debug, info, warn};

    #[test]
    #[serial]
    fn test_logging_functions_work() {
        ensure_test_logging(None);

        info!("Test info message");
        warn!("Test warning message");
        debug!("Test debug message");
    }

    #[test]
    fn test_log_directory_creation() {
        let log_dir = create_log_directory("test-component").unwrap();
        assert!(log_dir.exists());
        assert!(log_dir.to_string_lossy().contains("stdb-logs"));
        assert!(log_dir.ends_with("test-component"));
    }

    #[test]
    #[serial]
    fn test_repeated_initialization_does_not_panic() {
        ensure_test_logging(Some(Level::DEBUG));

        // A subscriber is already installed, so both attempts report an error.
        assert!(init_logging("test-repeat", false).is_err());
        assert!(init_simple_logging(Level::INFO).is_err());

        info!("Logging still works after repeated init attempts");
    }
}
