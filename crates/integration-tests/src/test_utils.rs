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

//! Test utilities for integration tests

use std::sync::Arc;

/// Initialization utilities for tests
pub mod init {
    use super::logging::{self, LogCapture};

    /// Install test logging and return the capture shared by every test of
    /// the binary
    pub fn init_test_environment() -> LogCapture {
        logging::setup_test_logging_with_capture()
    }
}

/// Capture of warnings and errors emitted while a test runs
pub mod logging {
    use std::sync::OnceLock;

    use parking_lot::Mutex;
    use tracing::Level;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    use super::*;

    static CAPTURE: OnceLock<LogCapture> = OnceLock::new();

    /// A tracing layer recording the message of every `WARN` and `ERROR` event
    #[derive(Debug, Clone, Default)]
    pub struct LogCapture {
        messages: Arc<Mutex<Vec<(Level, String)>>>,
    }

    impl LogCapture {
        /// Create an empty capture
        pub fn new() -> Self {
            Self::default()
        }

        /// Captured warning messages
        pub fn warnings(&self) -> Vec<String> {
            self.at_level(Level::WARN)
        }

        /// Captured error messages
        pub fn errors(&self) -> Vec<String> {
            self.at_level(Level::ERROR)
        }

        /// Whether any captured message contains `needle`
        pub fn contains(&self, needle: &str) -> bool {
            self.messages.lock().iter().any(|(_, message)| message.contains(needle))
        }

        /// Forget everything captured so far
        pub fn clear(&self) {
            self.messages.lock().clear();
        }

        fn at_level(&self, level: Level) -> Vec<String> {
            self.messages
                .lock()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, message)| message.clone())
                .collect()
        }
    }

    #[derive(Default)]
    struct MessageVisitor {
        message: String,
    }

    impl tracing::field::Visit for MessageVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.message = format!("{value:?}");
            }
        }

        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            if field.name() == "message" {
                self.message = value.to_string();
            }
        }
    }

    impl<S> tracing_subscriber::Layer<S> for LogCapture
    where
        S: tracing::Subscriber,
    {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let level = *event.metadata().level();
            if level > Level::WARN {
                return;
            }
            let mut visitor = MessageVisitor::default();
            event.record(&mut visitor);
            if !visitor.message.is_empty() {
                self.messages.lock().push((level, visitor.message));
            }
        }
    }

    /// Install the global subscriber with a capture layer on first use.
    ///
    /// Later calls return the capture that was installed, so every test of a
    /// binary observes the same messages. Tests asserting on captured output
    /// should run `#[serial]` and call [`LogCapture::clear`] first.
    pub fn setup_test_logging_with_capture() -> LogCapture {
        CAPTURE
            .get_or_init(|| {
                let capture = LogCapture::new();
                let filter = EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("warn,stdb_engine=debug,stdb_common=debug"));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(capture.clone())
                    .with(tracing_subscriber::fmt::layer().with_test_writer())
                    .try_init();
                capture
            })
            .clone()
    }
}

/// Builders for encoded traces
pub mod traces {
    use stdb_common::{
        types::{
            FrameType, InstanceId, InstanceLifecycle, RunStatus, SessionMetadata, StateEventKind,
            StateTreeAsset, TaskEventKind,
        },
        wire::{
            ActiveStatesRecord, AnimGraphPhase, AnimGraphRecord, AnimNodeVisitRecord,
            BeginFrameRecord, EndFrameRecord, InstanceRecord, LogRecord, ObjectEventRecord,
            ObjectRecord, PoseRecord, StateRecord, TaskRecord, TraceHeader, TraceWriter,
            WireRecord,
        },
    };

    /// Clock rate of built traces: cycle 10 is one second
    pub const CYCLES_PER_SECOND: u64 = 10;

    /// Writes the records of a state tree trace into memory.
    ///
    /// Instance records are stamped with the asset given at construction.
    /// Writing into a [`Vec`] cannot fail, so builder methods panic on error.
    #[derive(Debug)]
    pub struct TraceBuilder {
        writer: TraceWriter<Vec<u8>>,
        tree_name: String,
        tree_path: String,
        compiled_hash: u32,
    }

    impl TraceBuilder {
        /// Start a trace whose instances run `asset`
        pub fn new(asset: &StateTreeAsset) -> Self {
            Self::with_hash(asset, asset.compiled_data_hash)
        }

        /// Start a trace whose instances claim `compiled_hash` for `asset`
        pub fn with_hash(asset: &StateTreeAsset, compiled_hash: u32) -> Self {
            let header = TraceHeader {
                cycles_per_second: CYCLES_PER_SECOND,
                metadata: SessionMetadata {
                    platform: "Linux".into(),
                    app_name: "StdbTests".into(),
                    build_config: "Development".into(),
                },
            };
            Self {
                writer: TraceWriter::new(Vec::new(), &header).expect("in-memory header"),
                tree_name: asset.name.clone(),
                tree_path: asset.package_path.clone(),
                compiled_hash,
            }
        }

        fn push<R: WireRecord>(&mut self, record: R) -> &mut Self {
            self.writer.write(&record).expect("in-memory record");
            self
        }

        /// Begin a game frame
        pub fn frame(&mut self, cycle: u64) -> &mut Self {
            self.push(BeginFrameRecord { frame_type: FrameType::Game, cycle })
        }

        /// End the current game frame
        pub fn end_frame(&mut self, cycle: u64) -> &mut Self {
            self.push(EndFrameRecord { frame_type: FrameType::Game, cycle })
        }

        fn lifecycle(
            &mut self,
            cycle: u64,
            instance: InstanceId,
            name: &str,
            lifecycle: InstanceLifecycle,
        ) -> &mut Self {
            let record = InstanceRecord {
                cycle,
                tree_name: self.tree_name.clone(),
                tree_path: self.tree_path.clone(),
                compiled_hash: self.compiled_hash,
                instance,
                name: name.into(),
                lifecycle,
            };
            self.push(record)
        }

        /// Start an instance
        pub fn started(&mut self, cycle: u64, instance: InstanceId, name: &str) -> &mut Self {
            self.lifecycle(cycle, instance, name, InstanceLifecycle::Started)
        }

        /// Stop an instance
        pub fn stopped(&mut self, cycle: u64, instance: InstanceId, name: &str) -> &mut Self {
            self.lifecycle(cycle, instance, name, InstanceLifecycle::Stopped)
        }

        /// Enter a state
        pub fn enter(&mut self, cycle: u64, instance: InstanceId, state: u16) -> &mut Self {
            self.push(StateRecord { cycle, instance, state, kind: StateEventKind::Enter })
        }

        /// Exit a state
        pub fn exit(&mut self, cycle: u64, instance: InstanceId, state: u16) -> &mut Self {
            self.push(StateRecord { cycle, instance, state, kind: StateEventKind::Exit })
        }

        /// Report the active states, root first
        pub fn active(&mut self, cycle: u64, instance: InstanceId, states: &[u16]) -> &mut Self {
            self.push(ActiveStatesRecord { cycle, instance, states: states.to_vec() })
        }

        /// Log a message
        pub fn log(&mut self, cycle: u64, instance: InstanceId, message: &str) -> &mut Self {
            self.push(LogRecord { cycle, instance, message: message.into() })
        }

        /// Tick a task
        pub fn task(&mut self, cycle: u64, instance: InstanceId, task: u16) -> &mut Self {
            self.push(TaskRecord {
                cycle,
                instance,
                task,
                kind: TaskEventKind::Tick,
                status: RunStatus::Running,
                data: String::new(),
            })
        }

        /// Declare a traced object
        pub fn object(&mut self, id: u64, outer: u64, name: &str, class_name: &str) -> &mut Self {
            self.push(ObjectRecord { id, outer, name: name.into(), class_name: class_name.into() })
        }

        /// Record an object event
        pub fn object_event(&mut self, cycle: u64, id: u64, event: &str) -> &mut Self {
            self.push(ObjectEventRecord { cycle, id, event: event.into() })
        }

        /// Record a component pose
        pub fn pose(&mut self, cycle: u64, component: u64, bone_count: u16) -> &mut Self {
            self.push(PoseRecord { cycle, component, bone_count, lod: 0 })
        }

        /// Record an evaluated animation graph and one node visit
        pub fn anim_update(
            &mut self,
            cycle: u64,
            anim_instance: u64,
            node_name: &str,
            weight: f32,
        ) -> &mut Self {
            self.push(AnimGraphRecord {
                cycle,
                anim_instance,
                phase: AnimGraphPhase::Update,
                node_count: 2,
            })
            .push(AnimNodeVisitRecord {
                cycle,
                anim_instance,
                source_node: 0,
                target_node: 1,
                weight,
                name: node_name.into(),
            })
        }

        /// Record an undecodable payload for `(logger, event)`
        pub fn raw(&mut self, logger: &str, event: &str, payload: &[u8]) -> &mut Self {
            self.writer.write_raw(logger, event, payload).expect("in-memory record");
            self
        }

        /// Take the bytes written since the last call, keeping the declarations.
        ///
        /// The first call returns the header too. Concatenating every chunk
        /// yields the complete trace.
        pub fn take_bytes(&mut self) -> Vec<u8> {
            std::mem::take(self.writer.get_mut())
        }

        /// Finish the trace
        pub fn build(self) -> Vec<u8> {
            self.writer.into_inner()
        }
    }
}

/// On-disk trace stores
pub mod store {
    use std::{
        fs::{self, OpenOptions},
        io::Write,
        path::{Path, PathBuf},
    };

    use stdb_engine::{FileStoreClient, LIVE_MARKER_EXTENSION, TRACE_EXTENSION};
    use tempfile::TempDir;

    /// Temporary directory of `*.sttrace` files
    #[derive(Debug)]
    pub struct TraceDir {
        dir: TempDir,
    }

    impl TraceDir {
        /// Create an empty trace directory
        pub fn new() -> eyre::Result<Self> {
            Ok(Self { dir: tempfile::tempdir()? })
        }

        /// Directory path
        pub fn path(&self) -> &Path {
            self.dir.path()
        }

        fn trace_path(&self, name: &str) -> PathBuf {
            self.path().join(name).with_extension(TRACE_EXTENSION)
        }

        /// Write a trace file
        pub fn add(&self, name: &str, bytes: &[u8]) -> eyre::Result<PathBuf> {
            let path = self.trace_path(name);
            fs::write(&path, bytes)?;
            Ok(path)
        }

        /// Append to a trace file
        pub fn append(&self, name: &str, bytes: &[u8]) -> eyre::Result<()> {
            let mut file = OpenOptions::new().append(true).open(self.trace_path(name))?;
            file.write_all(bytes)?;
            file.flush()?;
            Ok(())
        }

        /// Create or remove the live marker of a trace
        pub fn mark_live(&self, name: &str, live: bool) -> eyre::Result<()> {
            let marker = self.trace_path(name).with_extension(LIVE_MARKER_EXTENSION);
            if live {
                fs::write(marker, b"")?;
            } else if marker.exists() {
                fs::remove_file(marker)?;
            }
            Ok(())
        }

        /// Store client over the directory
        pub fn client(&self) -> FileStoreClient {
            FileStoreClient::new(self.path())
        }
    }
}

/// Debugger harness over an on-disk store
pub mod debugger {
    use std::time::{Duration, Instant};

    use stdb_common::{
        config::Config,
        types::{InstanceId, StateTreeAsset, TraceDescriptor},
    };
    use stdb_engine::{
        AssetRegistry, DebuggerContext, NotificationRecorder, StateTreeDebugger, StoreClient,
    };

    use super::{store::TraceDir, *};

    /// Asset shared by the integration tests
    pub fn guard_asset() -> StateTreeAsset {
        StateTreeAsset::new("GuardBrain", "/Game/AI/GuardBrain", 0x5eed_0001)
            .with_states(["Root", "Idle", "Patrol", "Alert", "Attack"])
            .with_tasks(["Wait", "MoveTo"])
    }

    /// A debugger wired to a [`TraceDir`] with a notification recorder
    pub struct DebuggerHarness {
        /// Asset registry used to resolve traced instances
        pub registry: Arc<AssetRegistry>,
        /// The debugged asset
        pub asset: Arc<StateTreeAsset>,
        /// The debugger under test
        pub debugger: StateTreeDebugger,
        /// Notifications sent by the debugger
        pub recorder: NotificationRecorder,
    }

    impl DebuggerHarness {
        /// Debug [`guard_asset`] over the traces of `dir`
        pub fn new(dir: &TraceDir) -> Self {
            let registry = Arc::new(AssetRegistry::new());
            let asset = registry.register(guard_asset());
            let mut config = Config::default().with_trace_dir(dir.path());
            config.analysis.live_poll_interval_ms = 1;

            let ctx = DebuggerContext::new(Arc::new(dir.client()), registry.clone(), config);
            let mut debugger = StateTreeDebugger::new(ctx, &asset);
            let recorder = NotificationRecorder::new();
            debugger.add_observer(Box::new(recorder.clone()));
            Self { registry, asset, debugger, recorder }
        }

        /// Descriptor of the trace named `name`
        pub fn trace(&self, name: &str) -> TraceDescriptor {
            self.debugger
                .available_traces()
                .expect("list traces")
                .into_iter()
                .find(|t| t.name == name)
                .expect("trace present")
        }

        /// Start analyzing `name`
        pub fn start(&mut self, name: &str) {
            let trace = self.trace(name);
            assert!(self.debugger.start_session_analysis(&trace));
        }

        /// Select a running instance of the debugged asset
        pub fn select(&mut self, instance: InstanceId) {
            let descriptor = self
                .debugger
                .active_instances()
                .iter()
                .find(|d| d.id == instance)
                .cloned()
                .expect("instance running");
            self.debugger.set_debugged_instance(Some(descriptor));
        }
    }

    /// Poll `condition` every millisecond until it holds or `timeout` elapses.
    /// Returns whether it held.
    pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if condition() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
