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

//! Trace store clients
//!
//! A store client lists the recorded traces available to the debugger, opens
//! byte streams over them and reports whether a trace is still being written.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;
use stdb_common::{
    types::{SessionMetadata, TraceDescriptor, TraceId},
    wire::{RecordReader, WireError},
};
use thiserror::Error;
use tracing::{debug, warn};

/// File extension of trace files
pub const TRACE_EXTENSION: &str = "sttrace";
/// Extension of the marker file flagging a trace as live
pub const LIVE_MARKER_EXTENSION: &str = "live";

/// Errors produced by store clients
#[derive(Debug, Error)]
pub enum StoreError {
    /// No trace with this id
    #[error("trace {0} not found")]
    NotFound(TraceId),
    /// I/O failure
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The trace header could not be decoded
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Access to a store of recorded traces
pub trait StoreClient: Send + Sync {
    /// Every available trace
    fn traces(&self) -> Result<Vec<TraceDescriptor>, StoreError>;

    /// Descriptor of one trace
    fn trace_info(&self, id: TraceId) -> Option<TraceDescriptor>;

    /// Open a byte stream over a trace
    fn read_trace(&self, id: TraceId) -> Option<Box<dyn Read + Send>>;

    /// Whether the trace is still being written
    fn is_live(&self, id: TraceId) -> bool;

    /// Find a trace by numeric id or by name
    fn find_trace(&self, key: &str) -> Result<TraceDescriptor, StoreError> {
        let traces = self.traces()?;
        let by_id = key.parse::<u32>().ok().map(TraceId);
        traces
            .into_iter()
            .find(|t| Some(t.id) == by_id || t.name == key)
            .ok_or_else(|| StoreError::NotFound(by_id.unwrap_or(TraceId(u32::MAX))))
    }
}

/// Read the metadata from the header at the start of `reader`
fn read_metadata(mut reader: impl Read) -> Result<SessionMetadata, StoreError> {
    let mut decoder = RecordReader::new();
    let mut buf = [0u8; 4096];
    loop {
        // The first record (or end of input) forces the header to be decoded.
        decoder.next_record()?;
        if let Some(header) = decoder.header() {
            return Ok(header.metadata.clone());
        }
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Err(WireError::Truncated { needed: 1 }.into());
        }
        decoder.feed(&buf[..n]);
    }
}

/// Ids handed out by a [`FileStoreClient`], in order of first sighting
#[derive(Debug, Default)]
struct TraceIds {
    by_path: BTreeMap<PathBuf, TraceId>,
    paths: Vec<PathBuf>,
}

impl TraceIds {
    fn assign(&mut self, path: PathBuf) -> TraceId {
        if let Some(id) = self.by_path.get(&path) {
            return *id;
        }
        let id = TraceId(self.paths.len() as u32);
        self.paths.push(path.clone());
        self.by_path.insert(path, id);
        id
    }

    fn path(&self, id: TraceId) -> Option<&Path> {
        self.paths.get(id.0 as usize).map(PathBuf::as_path)
    }
}

/// Store over a directory of `*.sttrace` files.
///
/// A trace keeps the id it was given when the client first saw it, so traces
/// landing in the directory later never renumber existing ones. Files present
/// at the first scan are numbered by name. A sibling file with the `.live`
/// extension marks a trace as still being written.
#[derive(Debug, Clone)]
pub struct FileStoreClient {
    dir: PathBuf,
    ids: Arc<RwLock<TraceIds>>,
}

impl FileStoreClient {
    /// Create a client over `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), ids: Arc::default() }
    }

    /// Directory scanned for traces
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Trace files currently in the directory with their ids, ordered by id
    fn scan(&self) -> io::Result<Vec<(TraceId, PathBuf)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == TRACE_EXTENSION))
            .collect();
        paths.sort();

        let mut ids = self.ids.write();
        let mut traces: Vec<(TraceId, PathBuf)> =
            paths.into_iter().map(|path| (ids.assign(path.clone()), path)).collect();
        traces.sort_by_key(|(id, _)| *id);
        Ok(traces)
    }

    fn trace_path(&self, id: TraceId) -> Option<PathBuf> {
        let known = self.ids.read().path(id).map(Path::to_path_buf);
        let path = match known {
            Some(path) => path,
            None => self.scan().ok()?.into_iter().find(|(i, _)| *i == id)?.1,
        };
        path.exists().then_some(path)
    }

    fn describe(id: TraceId, path: &Path) -> TraceDescriptor {
        let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let metadata = File::open(path)
            .map_err(StoreError::from)
            .and_then(read_metadata)
            .unwrap_or_else(|e| {
                debug!(path = %path.display(), error = %e, "Trace header unavailable");
                SessionMetadata::default()
            });
        TraceDescriptor { id, name, metadata }
    }
}

impl StoreClient for FileStoreClient {
    fn traces(&self) -> Result<Vec<TraceDescriptor>, StoreError> {
        Ok(self.scan()?.iter().map(|(id, path)| Self::describe(*id, path)).collect())
    }

    fn trace_info(&self, id: TraceId) -> Option<TraceDescriptor> {
        self.trace_path(id).map(|path| Self::describe(id, &path))
    }

    fn read_trace(&self, id: TraceId) -> Option<Box<dyn Read + Send>> {
        let path = self.trace_path(id)?;
        match File::open(&path) {
            Ok(file) => Some(Box::new(file)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open trace");
                None
            }
        }
    }

    fn is_live(&self, id: TraceId) -> bool {
        self.trace_path(id)
            .is_some_and(|path| path.with_extension(LIVE_MARKER_EXTENSION).exists())
    }
}

#[derive(Debug)]
struct MemoryTrace {
    name: String,
    data: Arc<RwLock<Vec<u8>>>,
    live: bool,
}

/// In-process store whose traces can keep growing while live
#[derive(Debug, Default)]
pub struct MemoryStoreClient {
    traces: RwLock<BTreeMap<TraceId, MemoryTrace>>,
}

impl MemoryStoreClient {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trace and return its id
    pub fn add_trace(&self, name: impl Into<String>, data: Vec<u8>, live: bool) -> TraceId {
        let mut traces = self.traces.write();
        let id = TraceId(traces.keys().next_back().map(|id| id.0 + 1).unwrap_or_default());
        traces.insert(
            id,
            MemoryTrace { name: name.into(), data: Arc::new(RwLock::new(data)), live },
        );
        id
    }

    /// Append bytes to a trace. Returns false if the trace does not exist.
    pub fn append(&self, id: TraceId, bytes: &[u8]) -> bool {
        match self.traces.read().get(&id) {
            Some(trace) => {
                trace.data.write().extend_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    /// Mark a trace as live or finished
    pub fn set_live(&self, id: TraceId, live: bool) {
        if let Some(trace) = self.traces.write().get_mut(&id) {
            trace.live = live;
        }
    }

    /// Remove a trace
    pub fn remove(&self, id: TraceId) -> bool {
        self.traces.write().remove(&id).is_some()
    }
}

/// Reader over a shared, growing buffer
struct MemoryTraceReader {
    data: Arc<RwLock<Vec<u8>>>,
    position: usize,
}

impl Read for MemoryTraceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.read();
        let available = data.len().saturating_sub(self.position);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

impl StoreClient for MemoryStoreClient {
    fn traces(&self) -> Result<Vec<TraceDescriptor>, StoreError> {
        let ids: Vec<TraceId> = self.traces.read().keys().copied().collect();
        Ok(ids.into_iter().filter_map(|id| self.trace_info(id)).collect())
    }

    fn trace_info(&self, id: TraceId) -> Option<TraceDescriptor> {
        let traces = self.traces.read();
        let trace = traces.get(&id)?;
        let metadata = read_metadata(trace.data.read().as_slice()).unwrap_or_default();
        Some(TraceDescriptor { id, name: trace.name.clone(), metadata })
    }

    fn read_trace(&self, id: TraceId) -> Option<Box<dyn Read + Send>> {
        let traces = self.traces.read();
        let trace = traces.get(&id)?;
        Some(Box::new(MemoryTraceReader { data: trace.data.clone(), position: 0 }))
    }

    fn is_live(&self, id: TraceId) -> bool {
        self.traces.read().get(&id).is_some_and(|t| t.live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stdb_common::wire::{TraceHeader, TraceWriter};

    fn trace_bytes(app: &str) -> Vec<u8> {
        let header = TraceHeader {
            cycles_per_second: 1000,
            metadata: SessionMetadata {
                platform: "Linux".into(),
                app_name: app.into(),
                build_config: "Debug".into(),
            },
        };
        TraceWriter::new(Vec::new(), &header).unwrap().into_inner()
    }

    #[test]
    fn test_file_store_lists_traces() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.sttrace"), trace_bytes("Second")).unwrap();
        fs::write(dir.path().join("a.sttrace"), trace_bytes("First")).unwrap();
        fs::write(dir.path().join("a.live"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let client = FileStoreClient::new(dir.path());
        let traces = client.traces().unwrap();

        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].name, "a");
        assert_eq!(traces[0].metadata.app_name, "First");
        assert_eq!(traces[1].id, TraceId(1));
        assert!(client.is_live(TraceId(0)));
        assert!(!client.is_live(TraceId(1)));
        assert!(client.read_trace(TraceId(2)).is_none());
        assert_eq!(client.find_trace("b").unwrap().id, TraceId(1));
        assert_eq!(client.find_trace("0").unwrap().name, "a");
        assert!(matches!(client.find_trace("c"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_file_store_ids_survive_new_traces() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("match_b.sttrace"), trace_bytes("B")).unwrap();
        fs::write(dir.path().join("match_b.live"), b"").unwrap();

        let client = FileStoreClient::new(dir.path());
        let live = client.find_trace("match_b").unwrap().id;
        assert!(client.is_live(live));

        // A clone shares the ids handed out so far.
        let other = client.clone();
        fs::write(dir.path().join("match_a.sttrace"), trace_bytes("A")).unwrap();
        let traces = other.traces().unwrap();
        let names: Vec<&str> = traces.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["match_b", "match_a"]);

        assert_eq!(client.trace_info(live).unwrap().name, "match_b");
        assert!(client.is_live(live));
        assert_eq!(client.find_trace("match_a").unwrap().id, TraceId(1));

        fs::remove_file(dir.path().join("match_b.sttrace")).unwrap();
        assert!(client.trace_info(live).is_none());
        assert_eq!(client.traces().unwrap().len(), 1);
    }

    #[test]
    fn test_file_store_missing_dir_is_empty() {
        let client = FileStoreClient::new("/nonexistent/stdb/traces");
        assert!(client.traces().unwrap().is_empty());
    }

    #[test]
    fn test_memory_trace_grows_while_read() {
        let client = MemoryStoreClient::new();
        let id = client.add_trace("live", b"abc".to_vec(), true);
        let mut reader = client.read_trace(id).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);

        assert!(client.append(id, b"de"));
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"de");

        assert!(client.is_live(id));
        client.set_live(id, false);
        assert!(!client.is_live(id));
    }

    #[test]
    fn test_memory_trace_metadata() {
        let client = MemoryStoreClient::new();
        let id = client.add_trace("demo", trace_bytes("Demo"), false);
        let second = client.add_trace("empty", Vec::new(), true);

        assert_eq!(client.trace_info(id).unwrap().metadata.app_name, "Demo");
        assert_eq!(client.trace_info(second).unwrap().metadata, SessionMetadata::default());
        assert_eq!(client.traces().unwrap().len(), 2);
        assert_eq!(second, TraceId(1));
    }
}
