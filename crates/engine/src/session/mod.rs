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

//! Analysis sessions
//!
//! A session reads one trace on a background thread, decodes its records and
//! dispatches them to the analyzers, which fill the shared [`SessionStore`].
//! When the stream runs dry the session keeps polling for as long as the
//! trace is reported live, then finishes.

mod store;
pub use store::*;

use std::{
    io::{self, Read},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use eyre::{Context, Result};
use stdb_common::{
    config::AnalysisConfig,
    types::TraceDescriptor,
    wire::{PayloadReader, Record, RecordReader, TraceHeader},
};
use tracing::{debug, error, info, warn};

use crate::{Analyzer, EventContext, RouteLookup, RouteTable};

/// Reports whether the trace being read is still being written
pub type LiveProbe = Box<dyn Fn() -> bool + Send>;

/// One running analysis of a trace
#[derive(Debug)]
pub struct AnalysisSession {
    trace: TraceDescriptor,
    store: SharedSessionStore,
    stop_requested: Arc<AtomicBool>,
    complete: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl AnalysisSession {
    /// Start analyzing `stream` on a background thread
    pub fn start(
        trace: TraceDescriptor,
        stream: Box<dyn Read + Send>,
        live: LiveProbe,
        mut analyzers: Vec<Box<dyn Analyzer>>,
        config: &AnalysisConfig,
    ) -> Result<Self> {
        let store = SessionStore::shared(config.frame_type);
        let stop_requested = Arc::new(AtomicBool::new(false));
        let complete = Arc::new(AtomicBool::new(false));

        let worker = SessionWorker {
            routes: RouteTable::build(&mut analyzers),
            analyzers,
            stream,
            live,
            reader: RecordReader::new(),
            header: None,
            store: store.clone(),
            stop_requested: stop_requested.clone(),
            complete: complete.clone(),
            chunk_size: config.read_chunk_size.max(1),
            poll_interval: Duration::from_millis(config.live_poll_interval_ms),
        };

        let worker = thread::Builder::new()
            .name(format!("stdb-analysis-{}", trace.id))
            .spawn(move || worker.run())
            .wrap_err("Failed to spawn analysis thread")?;

        info!(trace = %trace, "Analysis session started");
        Ok(Self { trace, store, stop_requested, complete, worker: Some(worker) })
    }

    /// Trace being analyzed
    pub fn trace(&self) -> &TraceDescriptor {
        &self.trace
    }

    /// Store filled by the session
    pub fn store(&self) -> &SharedSessionStore {
        &self.store
    }

    /// Latest timestamp analyzed so far
    pub fn duration(&self) -> f64 {
        self.store.read().duration()
    }

    /// Whether the whole trace has been analyzed
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Block until the analysis finishes. For a live trace this only returns
    /// once the trace stops being live or [`stop`](Self::stop) is called elsewhere.
    pub fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(trace = %self.trace, "Analysis thread panicked");
            }
        }
    }

    /// Stop reading, flush the analyzers and join the analysis thread
    pub fn stop(&mut self) {
        if self.worker.is_some() {
            debug!(trace = %self.trace, "Stopping analysis session");
        }
        self.stop_requested.store(true, Ordering::Release);
        self.wait();
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct SessionWorker {
    analyzers: Vec<Box<dyn Analyzer>>,
    routes: RouteTable,
    stream: Box<dyn Read + Send>,
    live: LiveProbe,
    reader: RecordReader,
    header: Option<TraceHeader>,
    store: SharedSessionStore,
    stop_requested: Arc<AtomicBool>,
    complete: Arc<AtomicBool>,
    chunk_size: usize,
    poll_interval: Duration,
}

impl SessionWorker {
    fn stopping(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    fn run(mut self) {
        let mut buf = vec![0u8; self.chunk_size];
        while !self.stopping() {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    if (self.live)() && !self.stopping() {
                        thread::sleep(self.poll_interval);
                    } else {
                        break;
                    }
                }
                Ok(n) => {
                    self.reader.feed(&buf[..n]);
                    if !self.drain() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(error = %e, "Failed to read trace stream");
                    break;
                }
            }
        }
        self.finish();
    }

    /// Dispatch every complete record. Returns false if the stream is unusable.
    fn drain(&mut self) -> bool {
        loop {
            let record = match self.reader.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => return true,
                Err(e) if self.reader.header().is_none() => {
                    error!(error = %e, "Invalid trace stream, analysis aborted");
                    return false;
                }
                Err(e) => {
                    warn!(error = %e, "Malformed declaration skipped");
                    continue;
                }
            };

            if self.header.is_none() {
                if let Some(header) = self.reader.header() {
                    debug!(?header, "Trace header decoded");
                    self.store.write().set_header(header.clone());
                    self.header = Some(header.clone());
                }
            }

            match record {
                Record::Declaration(declaration) => {
                    if !self.routes.declare(&declaration) {
                        debug!(
                            logger = %declaration.logger,
                            event = %declaration.event,
                            "No analyzer for event"
                        );
                    }
                }
                Record::Event { uid, payload } => self.dispatch(uid, PayloadReader::new(payload)),
            }
        }
    }

    fn dispatch(&mut self, uid: u16, mut payload: PayloadReader) {
        let Some(header) = self.header.as_ref() else {
            return;
        };
        match self.routes.lookup(uid) {
            RouteLookup::Routed(index, route) => {
                let analyzer = &mut self.analyzers[index];
                let mut store = self.store.write();
                let mut ctx = EventContext::new(&mut store, header);
                if let Err(e) = analyzer.on_event(route, &mut ctx, &mut payload) {
                    warn!(analyzer = analyzer.name(), uid, error = %e, "Malformed record skipped");
                }
            }
            RouteLookup::Unsubscribed => {}
            RouteLookup::Unknown => warn!(uid, "Record with undeclared uid skipped"),
        }
    }

    fn finish(&mut self) {
        for analyzer in &mut self.analyzers {
            analyzer.on_analysis_end(&mut self.store.write());
        }
        self.complete.store(true, Ordering::Release);

        let store = self.store.read();
        info!(
            duration = store.duration(),
            instances = store.state_tree.known_instances().len(),
            "Analysis session finished"
        );
    }
}
