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

//! State tree debugger
//!
//! [`StateTreeDebugger`] drives one analysis session at a time and debugs the
//! instances of one state tree asset. It copies the events of the debugged
//! instance out of the session store into its own buffer, indexed by the
//! frames that contain events, and moves a frame-quantized cursor over them.
//!
//! Reads always go up to the end of a completed frame. The read head marks
//! the end of the last read, so each read only sees events it has not
//! processed yet. Breakpoints are evaluated on those fresh events unless the
//! debugger is paused or catching up on history.

mod context;
mod observer;

pub use context::*;
pub use observer::*;

use std::sync::Arc;

use stdb_common::types::{
    AssetRef, BreakpointHit, BreakpointSet, Frame, FrameIndexSpan, FrameType, InstanceDescriptor,
    InstanceId, StateHandle, StateTreeAsset, TimedEvent, TraceDescriptor, TraceEvent,
};
use tracing::{debug, info, warn};

use crate::{AnalysisSession, FrameProvider, LiveProbe, SessionStore, StoreError};

/// End of the last read: every event before `time` has been processed
#[derive(Debug, Clone, Copy, PartialEq)]
struct ReadHead {
    frame_index: u64,
    time: f64,
}

/// Debugger over the instances of one state tree asset
pub struct StateTreeDebugger {
    ctx: DebuggerContext,
    asset: AssetRef,
    session: Option<AnalysisSession>,
    selected: Option<InstanceDescriptor>,
    active_instances: Vec<InstanceDescriptor>,
    breakpoints: BreakpointSet,
    active_states: Vec<StateHandle>,
    events: Vec<TimedEvent>,
    frame_spans: Vec<FrameIndexSpan>,
    read_head: Option<ReadHead>,
    scrub_time: f64,
    scrub_frame_index: u64,
    paused: bool,
    processing_initial_events: bool,
    pending_hit: Option<BreakpointHit>,
    has_new_events: bool,
    observers: Vec<Box<dyn DebuggerObserver>>,
}

impl std::fmt::Debug for StateTreeDebugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTreeDebugger")
            .field("asset", &self.asset)
            .field("trace", &self.trace())
            .field("selected", &self.selected)
            .field("breakpoints", &self.breakpoints)
            .field("scrub_frame_index", &self.scrub_frame_index)
            .field("paused", &self.paused)
            .finish_non_exhaustive()
    }
}

impl StateTreeDebugger {
    /// Create a debugger for the instances of `asset`
    pub fn new(ctx: DebuggerContext, asset: &Arc<StateTreeAsset>) -> Self {
        Self {
            ctx,
            asset: AssetRef::new(asset),
            session: None,
            selected: None,
            active_instances: Vec::new(),
            breakpoints: BreakpointSet::new(),
            active_states: Vec::new(),
            events: Vec::new(),
            frame_spans: Vec::new(),
            read_head: None,
            scrub_time: 0.0,
            scrub_frame_index: 0,
            paused: false,
            processing_initial_events: false,
            pending_hit: None,
            has_new_events: false,
            observers: Vec::new(),
        }
    }

    /// Register an observer
    pub fn add_observer(&mut self, observer: Box<dyn DebuggerObserver>) {
        self.observers.push(observer);
    }

    /// Debugged asset, if it is still loaded
    pub fn asset(&self) -> Option<Arc<StateTreeAsset>> {
        self.asset.upgrade()
    }

    /// Trace being analyzed
    pub fn trace(&self) -> Option<&TraceDescriptor> {
        self.session.as_ref().map(AnalysisSession::trace)
    }

    /// Current analysis session
    pub fn session(&self) -> Option<&AnalysisSession> {
        self.session.as_ref()
    }

    /// Whether an analysis session is running or finished but not stopped
    pub fn is_analyzing(&self) -> bool {
        self.session.is_some()
    }

    /// Debugged instance
    pub fn debugged_instance(&self) -> Option<&InstanceDescriptor> {
        self.selected.as_ref()
    }

    /// Buffered events of the debugged instance
    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// One entry per buffered frame with events
    pub fn frame_spans(&self) -> &[FrameIndexSpan] {
        &self.frame_spans
    }

    /// Active states of the debugged instance at the cursor
    pub fn active_states(&self) -> &[StateHandle] {
        &self.active_states
    }

    /// Breakpoints
    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    /// Time of the cursor
    pub fn scrub_time(&self) -> f64 {
        self.scrub_time
    }

    /// Frame of the cursor
    pub fn scrub_frame_index(&self) -> u64 {
        self.scrub_frame_index
    }

    /// Last frame read from the session store
    pub fn last_read_frame(&self) -> Option<u64> {
        self.read_head.map(|h| h.frame_index)
    }

    /// Whether the cursor is held in place
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Instances of the debugged asset active at the last tick
    pub fn active_instances(&self) -> &[InstanceDescriptor] {
        &self.active_instances
    }

    /// Traces available from the store
    pub fn available_traces(&self) -> Result<Vec<TraceDescriptor>, StoreError> {
        self.ctx.store_client.traces()
    }

    fn frame_type(&self) -> FrameType {
        self.ctx.config.analysis.frame_type
    }

    /// Start analyzing `trace`, stopping the current session first.
    ///
    /// Returns false when `trace` is already being analyzed or cannot be
    /// opened, in which case the debugger is left as it was.
    pub fn start_session_analysis(&mut self, trace: &TraceDescriptor) -> bool {
        if self.trace().is_some_and(|current| current.id == trace.id) {
            debug!(trace = %trace, "Trace already analyzed");
            return false;
        }

        let client = self.ctx.store_client.clone();
        let Some(info) = client.trace_info(trace.id) else {
            debug!(trace = %trace, "Trace not in store");
            return false;
        };
        let Some(stream) = client.read_trace(trace.id) else {
            debug!(trace = %trace, "Trace stream unavailable");
            return false;
        };

        self.stop_analysis();

        let id = info.id;
        let live: LiveProbe = Box::new(move || client.is_live(id));
        match AnalysisSession::start(info, stream, live, self.ctx.analyzers(), &self.ctx.config.analysis)
        {
            Ok(session) => self.session = Some(session),
            Err(e) => {
                warn!(trace = %trace, error = %e, "Failed to start analysis");
                return false;
            }
        }

        self.refresh_active_instances();
        self.with_initial_events(|debugger| debugger.sync_to_current_session_duration());
        true
    }

    /// Block until the current session has analyzed the whole trace
    pub fn wait_for_analysis(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.wait();
        }
    }

    /// Stop the session and drop everything read from it
    pub fn stop_analysis(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
            info!(trace = %session.trace(), "Analysis stopped");
        }
        self.selected = None;
        self.active_instances.clear();
        self.reset_instance_data();
        self.send_notifications();
    }

    /// Select the instance to debug, or none to watch every instance
    pub fn set_debugged_instance(&mut self, instance: Option<InstanceDescriptor>) {
        if self.selected == instance {
            return;
        }
        match &instance {
            Some(instance) => info!(instance = %instance, "Debugging instance"),
            None => info!("Debugged instance cleared"),
        }

        self.reset_instance_data();
        self.selected = instance;
        self.with_initial_events(|debugger| debugger.sync_to_current_session_duration());
        self.send_notifications();
    }

    /// Per-frame update: refresh the instance list and follow the session
    pub fn tick(&mut self) {
        self.refresh_active_instances();

        let vanished = self
            .selected
            .as_ref()
            .is_some_and(|selected| !self.active_instances.iter().any(|d| d.id == selected.id));
        if vanished {
            self.set_debugged_instance(None);
        }

        if !self.paused {
            self.sync_to_current_session_duration();
        }
    }

    /// Read up to the last completed frame of the session
    pub fn sync_to_current_session_duration(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let frame_type = self.frame_type();
        let target = {
            let store = session.store().read();
            let duration = store.duration();
            match store.frames.completed_frame_at(frame_type, duration) {
                Some(frame) => Some(frame),
                // Without frames the whole trace reads as a single frame.
                None if store.frames.frame_count(frame_type) == 0 => Some(Frame {
                    index: 0,
                    start_time: 0.0,
                    end_time: duration.next_up(),
                }),
                None => None,
            }
        };
        if let Some(frame) = target {
            self.read_range(frame);
        }
    }

    /// Read up to the end of frame `frame_index`. Returns false when the
    /// frame does not exist or is still open.
    pub fn read_trace(&mut self, frame_index: u64) -> bool {
        let Some(frame) = self.completed_frame(frame_index) else {
            return false;
        };
        self.read_range(frame);
        true
    }

    /// Move the cursor to the frame containing `time`, reading forward if needed
    pub fn set_scrub_time(&mut self, time: f64) {
        let Some(session) = &self.session else {
            return;
        };
        let frame_type = self.frame_type();
        let frame = {
            let store = session.store().read();
            if store.frames.frame_count(frame_type) == 0 {
                Some(Frame { index: 0, start_time: 0.0, end_time: time.next_up() })
            } else {
                store.frames.completed_frame_at(frame_type, time)
            }
        };
        let Some(frame) = frame else {
            debug!(time, "No completed frame at scrub time");
            return;
        };

        if self.read_head.is_none_or(|head| head.time < frame.end_time) {
            self.read_range(frame);
        }
        self.scrub_time = time;
        self.scrub_frame_index = frame.index;
        self.refresh_active_states();
    }

    /// Hold the cursor in place
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Let the cursor follow the session again
    pub fn unpause(&mut self) {
        self.paused = false;
    }

    /// Pause and drop everything read so far, putting the cursor at the start.
    ///
    /// Reading again after [`unpause`](Self::unpause) replays the trace with
    /// breakpoints armed.
    pub fn rewind(&mut self) {
        self.paused = true;
        self.reset_instance_data();
        self.send_notifications();
    }

    /// Whether [`step_forward`](Self::step_forward) would move the cursor
    pub fn can_step_forward(&self) -> bool {
        self.selected.is_some()
            && (self.next_span_after(self.scrub_frame_index).is_some()
                || self.next_unread_event_frame().is_some())
    }

    /// Whether [`step_back`](Self::step_back) would move the cursor
    pub fn can_step_back(&self) -> bool {
        self.selected.is_some() && self.prev_span_before(self.scrub_frame_index).is_some()
    }

    /// Pause and move the cursor to the next frame with events
    pub fn step_forward(&mut self) -> bool {
        if self.selected.is_none() {
            return false;
        }
        self.paused = true;

        let target = match self.next_span_after(self.scrub_frame_index) {
            Some(target) => Some(target),
            None => match self.next_unread_event_frame() {
                Some(frame) => {
                    self.read_range(frame);
                    self.next_span_after(self.scrub_frame_index)
                }
                None => None,
            },
        };
        match target {
            Some(frame_index) => {
                self.move_cursor(frame_index);
                true
            }
            None => false,
        }
    }

    /// Pause and move the cursor to the previous frame with events.
    ///
    /// The buffer is rebuilt from the start of the session up to the target.
    pub fn step_back(&mut self) -> bool {
        if self.selected.is_none() {
            return false;
        }
        let Some(target) = self.prev_span_before(self.scrub_frame_index) else {
            return false;
        };
        let Some(frame) = self.completed_frame(target) else {
            return false;
        };
        self.paused = true;

        self.events.clear();
        self.frame_spans.clear();
        self.read_head = None;
        self.has_new_events = true;
        self.with_initial_events(|debugger| debugger.read_range(frame));
        self.move_cursor(target);
        true
    }

    /// Toggle each handle in or out of the breakpoint set
    pub fn toggle_breakpoints<I>(&mut self, handles: I)
    where
        I: IntoIterator<Item = StateHandle>,
    {
        self.breakpoints.toggle(handles);
        debug!(breakpoints = ?self.breakpoints.to_sorted_vec(), "Breakpoints changed");
        self.notify_breakpoints_changed();
    }

    /// Remove every breakpoint
    pub fn clear_breakpoints(&mut self) {
        if !self.breakpoints.is_empty() {
            self.breakpoints.clear();
            self.notify_breakpoints_changed();
        }
    }

    /// Whether a breakpoint is set on `state`
    pub fn has_breakpoint(&self, state: StateHandle) -> bool {
        self.breakpoints.contains(state)
    }

    fn notify_breakpoints_changed(&mut self) {
        for observer in &mut self.observers {
            observer.on_breakpoints_changed(&self.breakpoints);
        }
    }

    /// Run `f` with breakpoint evaluation suppressed
    fn with_initial_events<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.processing_initial_events, true);
        let result = f(self);
        self.processing_initial_events = previous;
        result
    }

    fn refresh_active_instances(&mut self) {
        self.active_instances = match &self.session {
            Some(session) => session
                .store()
                .read()
                .state_tree
                .active_instances()
                .into_iter()
                .filter(|d| d.asset == self.asset)
                .collect(),
            None => Vec::new(),
        };
    }

    fn reset_instance_data(&mut self) {
        self.events.clear();
        self.frame_spans.clear();
        self.read_head = None;
        self.scrub_time = 0.0;
        self.scrub_frame_index = 0;
        self.pending_hit = None;
        self.has_new_events = true;
        self.set_active_states(Vec::new());
    }

    fn completed_frame(&self, frame_index: u64) -> Option<Frame> {
        let session = self.session.as_ref()?;
        let store = session.store().read();
        store.frames.frame(self.frame_type(), frame_index).filter(Frame::is_complete)
    }

    fn breakpoints_armed(&self) -> bool {
        !self.paused
            && !self.processing_initial_events
            && self.pending_hit.is_none()
            && !self.breakpoints.is_empty()
            && self.asset.is_alive()
    }

    /// Process every unread event up to the end of `frame`
    fn read_range(&mut self, frame: Frame) {
        let Some(session) = &self.session else {
            return;
        };
        let start = self.read_head.map_or(f64::NEG_INFINITY, |head| head.time);
        if frame.end_time <= start {
            return;
        }

        let scope = match &self.selected {
            Some(selected) => Some(selected.id),
            None if self.breakpoints_armed() => Some(InstanceId::INVALID),
            None => None,
        };
        let batch = scope.map(|instance| collect_window(&session.store().read(), instance, start, frame.end_time));
        self.read_head = Some(ReadHead { frame_index: frame.index, time: frame.end_time });

        for (instance, event) in batch.unwrap_or_default() {
            self.process_event(instance, event);
        }

        if self.paused {
            self.refresh_active_states();
        } else {
            self.scrub_frame_index = frame.index;
            self.scrub_time = frame.start_time;
        }
        self.send_notifications();
    }

    fn process_event(&mut self, instance: InstanceId, event: TimedEvent) {
        if self.breakpoints_armed() {
            if let Some(state) = event.event.entered_state().filter(|s| self.breakpoints.contains(*s)) {
                let hit = BreakpointHit {
                    instance,
                    state,
                    time: event.time,
                    frame_index: event.frame_index,
                };
                info!(instance = %instance, state = %state, time = event.time, "Breakpoint hit");
                self.pending_hit = Some(hit);
                if self.ctx.config.debugger.pause_on_breakpoint {
                    self.paused = true;
                    self.scrub_time = hit.time;
                    self.scrub_frame_index = hit.frame_index;
                }
            }
        }

        if self.selected.as_ref().is_some_and(|s| s.id == instance) {
            if let TraceEvent::ActiveStates { states } = &event.event {
                if !self.paused {
                    self.set_active_states(states.clone());
                }
            }
            self.buffer_event(event);
        }
    }

    fn buffer_event(&mut self, event: TimedEvent) {
        if self.frame_spans.last().is_none_or(|span| span.frame_index != event.frame_index) {
            self.frame_spans.push(FrameIndexSpan {
                frame_index: event.frame_index,
                time: event.time,
                event_offset: self.events.len(),
            });
        }
        self.events.push(event);
        self.has_new_events = true;
    }

    fn set_active_states(&mut self, states: Vec<StateHandle>) {
        if states == self.active_states {
            return;
        }
        self.active_states = states;
        for observer in &mut self.observers {
            observer.on_active_states_changed(&self.active_states);
        }
    }

    /// Recompute the active states from the buffered events up to the cursor
    fn refresh_active_states(&mut self) {
        let end = self
            .frame_spans
            .iter()
            .find(|span| span.frame_index > self.scrub_frame_index)
            .map_or(self.events.len(), |span| span.event_offset);
        let states = self.events[..end]
            .iter()
            .rev()
            .find_map(|e| match &e.event {
                TraceEvent::ActiveStates { states } => Some(states.clone()),
                _ => None,
            })
            .unwrap_or_default();
        self.set_active_states(states);
    }

    fn send_notifications(&mut self) {
        if std::mem::take(&mut self.has_new_events) {
            for observer in &mut self.observers {
                observer.on_traces_updated(&self.events, &self.frame_spans);
            }
        }
        if let Some(hit) = self.pending_hit.take() {
            for observer in &mut self.observers {
                observer.on_breakpoint_hit(&hit);
            }
        }
    }

    fn next_span_after(&self, frame_index: u64) -> Option<u64> {
        self.frame_spans.iter().map(|s| s.frame_index).find(|&f| f > frame_index)
    }

    fn prev_span_before(&self, frame_index: u64) -> Option<u64> {
        self.frame_spans.iter().rev().map(|s| s.frame_index).find(|&f| f < frame_index)
    }

    /// Completed frame holding the first unread event of the debugged instance
    fn next_unread_event_frame(&self) -> Option<Frame> {
        let session = self.session.as_ref()?;
        let selected = self.selected.as_ref()?;
        let start = self.read_head.map_or(f64::NEG_INFINITY, |head| head.time);

        let store = session.store().read();
        let event = store.state_tree.timeline(selected.id)?.window(start, f64::INFINITY).first()?;
        store.frames.frame(self.frame_type(), event.frame_index).filter(Frame::is_complete)
    }

    fn move_cursor(&mut self, frame_index: u64) {
        self.scrub_frame_index = frame_index;
        self.scrub_time = self
            .completed_frame(frame_index)
            .map(|f| f.start_time)
            .or_else(|| {
                self.frame_spans.iter().find(|s| s.frame_index == frame_index).map(|s| s.time)
            })
            .unwrap_or(self.scrub_time);
        self.refresh_active_states();
        self.send_notifications();
    }
}

/// Copy the events in `[start, end)` of one instance, or of every instance
/// for [`InstanceId::INVALID`], in timeline order.
fn collect_window(
    store: &SessionStore,
    instance: InstanceId,
    start: f64,
    end: f64,
) -> Vec<(InstanceId, TimedEvent)> {
    let mut batch = Vec::new();
    store.state_tree.read_timelines(instance, |id, timeline| {
        batch.extend(timeline.window(start, end).iter().map(|event| (id, event.clone())));
    });
    batch
}

#[cfg(test)]
mod tests {
    use std::{io::Write, thread, time::Duration};

    use super::*;
    use crate::{AssetRegistry, MemoryStoreClient, StoreClient};
    use stdb_common::{
        config::Config,
        types::{InstanceLifecycle, StateEventKind, TraceId},
        wire::{
            ActiveStatesRecord, BeginFrameRecord, InstanceRecord, LogRecord, StateRecord,
            TraceHeader, TraceWriter,
        },
    };

    const GUARD_A: InstanceId = InstanceId::new(1, 1);
    const GUARD_B: InstanceId = InstanceId::new(2, 1);

    struct Fixture {
        client: Arc<MemoryStoreClient>,
        registry: Arc<AssetRegistry>,
        asset: Arc<StateTreeAsset>,
        debugger: StateTreeDebugger,
        recorder: NotificationRecorder,
    }

    fn fixture() -> Fixture {
        let client = Arc::new(MemoryStoreClient::new());
        let registry = Arc::new(AssetRegistry::new());
        let asset = registry.register(
            StateTreeAsset::new("Guard", "/Game/AI", 5).with_states(["Root", "Idle", "Alert", "Attack"]),
        );
        let mut config = Config::default();
        config.analysis.live_poll_interval_ms = 1;

        let ctx = DebuggerContext::new(client.clone(), registry.clone(), config);
        let mut debugger = StateTreeDebugger::new(ctx, &asset);
        let recorder = NotificationRecorder::new();
        debugger.add_observer(Box::new(recorder.clone()));
        Fixture { client, registry, asset, debugger, recorder }
    }

    /// Appends everything written to a live memory trace
    struct LiveSink {
        client: Arc<MemoryStoreClient>,
        id: TraceId,
    }

    impl Write for LiveSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.client.append(self.id, buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn header() -> TraceHeader {
        TraceHeader { cycles_per_second: 10, ..Default::default() }
    }

    fn begin_frame<W: Write>(writer: &mut TraceWriter<W>, cycle: u64) {
        writer.write(&BeginFrameRecord { frame_type: FrameType::Game, cycle }).unwrap();
    }

    fn lifecycle<W: Write>(
        writer: &mut TraceWriter<W>,
        cycle: u64,
        instance: InstanceId,
        lifecycle: InstanceLifecycle,
    ) {
        writer
            .write(&InstanceRecord {
                cycle,
                tree_name: "Guard".into(),
                tree_path: "/Game/AI".into(),
                compiled_hash: 5,
                instance,
                name: format!("Guard_{}", instance.id),
                lifecycle,
            })
            .unwrap();
    }

    fn enter<W: Write>(writer: &mut TraceWriter<W>, cycle: u64, instance: InstanceId, state: u16) {
        writer.write(&StateRecord { cycle, instance, state, kind: StateEventKind::Enter }).unwrap();
    }

    fn active<W: Write>(writer: &mut TraceWriter<W>, cycle: u64, instance: InstanceId, states: &[u16]) {
        writer.write(&ActiveStatesRecord { cycle, instance, states: states.to_vec() }).unwrap();
    }

    /// Frames of one second starting at cycles 0, 10, 20, 30 and 40, the last one open.
    /// Guard A has events in frames 0, 1, 3 and 4; Guard B in frames 1 and 2.
    fn guard_trace() -> Vec<u8> {
        let mut w = TraceWriter::new(Vec::new(), &header()).unwrap();
        begin_frame(&mut w, 0);
        lifecycle(&mut w, 1, GUARD_A, InstanceLifecycle::Started);
        lifecycle(&mut w, 1, GUARD_B, InstanceLifecycle::Started);
        enter(&mut w, 2, GUARD_A, 1);
        active(&mut w, 2, GUARD_A, &[0, 1]);
        begin_frame(&mut w, 10);
        enter(&mut w, 12, GUARD_A, 2);
        enter(&mut w, 12, GUARD_B, 2);
        active(&mut w, 12, GUARD_A, &[0, 2]);
        begin_frame(&mut w, 20);
        w.write(&LogRecord { cycle: 25, instance: GUARD_B, message: "patrol".into() }).unwrap();
        begin_frame(&mut w, 30);
        enter(&mut w, 32, GUARD_A, 3);
        active(&mut w, 32, GUARD_A, &[0, 3]);
        begin_frame(&mut w, 40);
        enter(&mut w, 41, GUARD_A, 1);
        w.into_inner()
    }

    fn analyzed(fx: &mut Fixture) {
        let id = fx.client.add_trace("guards", guard_trace(), false);
        let trace = fx.client.trace_info(id).unwrap();
        assert!(fx.debugger.start_session_analysis(&trace));
        fx.debugger.wait_for_analysis();
        fx.debugger.tick();
    }

    fn select(fx: &mut Fixture, instance: InstanceId) {
        let descriptor = fx
            .debugger
            .active_instances()
            .iter()
            .find(|d| d.id == instance)
            .cloned()
            .unwrap();
        fx.debugger.set_debugged_instance(Some(descriptor));
    }

    #[test]
    fn test_select_reads_completed_frames() {
        let mut fx = fixture();
        analyzed(&mut fx);
        assert_eq!(fx.debugger.active_instances().len(), 2);

        select(&mut fx, GUARD_A);

        let frames: Vec<u64> = fx.debugger.frame_spans().iter().map(|s| s.frame_index).collect();
        assert_eq!(frames, vec![0, 1, 3]);
        assert_eq!(fx.debugger.events().len(), 6);
        assert_eq!(fx.debugger.last_read_frame(), Some(3));
        assert_eq!(fx.debugger.scrub_frame_index(), 3);
        assert_eq!(fx.debugger.active_states(), &[StateHandle(0), StateHandle(3)]);
        assert!(fx.recorder.hits().is_empty());
    }

    #[test]
    fn test_first_hit_wins_across_instances() {
        let mut fx = fixture();
        analyzed(&mut fx);
        fx.debugger.toggle_breakpoints([StateHandle(2)]);
        fx.debugger.rewind();
        fx.debugger.unpause();
        fx.recorder.take();

        assert!(fx.debugger.read_trace(0));
        assert!(fx.recorder.hits().is_empty());
        assert!(fx.debugger.read_trace(1));

        // Guard A and Guard B both enter state 2 in frame 1.
        let hits = fx.recorder.hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].instance, GUARD_A);
        assert_eq!(hits[0].state, StateHandle(2));
        assert!(fx.debugger.is_paused());
        assert_eq!(fx.debugger.scrub_frame_index(), 1);
    }

    #[test]
    fn test_one_hit_per_read() {
        let mut fx = fixture();
        analyzed(&mut fx);
        select(&mut fx, GUARD_A);
        fx.debugger.toggle_breakpoints([StateHandle(2), StateHandle(3)]);
        fx.debugger.rewind();
        fx.debugger.unpause();
        fx.recorder.take();

        fx.debugger.sync_to_current_session_duration();

        let hits = fx.recorder.hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].state, StateHandle(2));
        assert_eq!(hits[0].frame_index, 1);
        assert!(fx.debugger.is_paused());
        assert_eq!(fx.debugger.scrub_frame_index(), 1);
        assert_eq!(fx.debugger.active_states(), &[StateHandle(0), StateHandle(2)]);

        let updates = fx
            .recorder
            .take()
            .into_iter()
            .filter(|n| matches!(n, DebuggerNotification::TracesUpdated { .. }))
            .count();
        assert_eq!(updates, 1);
    }

    #[test]
    fn test_catch_up_does_not_break() {
        let mut fx = fixture();
        analyzed(&mut fx);
        fx.debugger.toggle_breakpoints([StateHandle(1), StateHandle(3)]);
        select(&mut fx, GUARD_A);

        assert!(fx.recorder.hits().is_empty());
        assert!(!fx.debugger.is_paused());
        assert_eq!(fx.debugger.events().len(), 6);
    }

    #[test]
    fn test_toggle_breakpoints_notifies() {
        let mut fx = fixture();
        fx.debugger.toggle_breakpoints([StateHandle(1), StateHandle(2)]);
        fx.debugger.toggle_breakpoints([StateHandle(2), StateHandle(3)]);

        assert!(fx.debugger.has_breakpoint(StateHandle(1)));
        assert!(!fx.debugger.has_breakpoint(StateHandle(2)));
        assert_eq!(
            fx.recorder.take(),
            vec![
                DebuggerNotification::BreakpointsChanged(vec![StateHandle(1), StateHandle(2)]),
                DebuggerNotification::BreakpointsChanged(vec![StateHandle(1), StateHandle(3)]),
            ]
        );

        fx.debugger.clear_breakpoints();
        fx.debugger.clear_breakpoints();
        assert_eq!(fx.recorder.take(), vec![DebuggerNotification::BreakpointsChanged(vec![])]);
    }

    #[test]
    fn test_step_back_then_forward_returns() {
        let mut fx = fixture();
        analyzed(&mut fx);
        select(&mut fx, GUARD_A);
        fx.debugger.pause();
        assert!(!fx.debugger.can_step_forward());

        assert!(fx.debugger.step_back());
        assert_eq!(fx.debugger.scrub_frame_index(), 1);
        assert_eq!(fx.debugger.events().len(), 4);
        assert_eq!(fx.debugger.active_states(), &[StateHandle(0), StateHandle(2)]);
        assert!(fx.debugger.can_step_forward());

        assert!(fx.debugger.step_forward());
        assert_eq!(fx.debugger.scrub_frame_index(), 3);
        assert_eq!(fx.debugger.events().len(), 6);

        assert!(fx.debugger.step_back());
        assert_eq!(fx.debugger.scrub_frame_index(), 1);
        assert!(fx.debugger.step_back());
        assert_eq!(fx.debugger.scrub_frame_index(), 0);
        assert!(!fx.debugger.can_step_back());
        assert!(!fx.debugger.step_back());
        assert!(fx.recorder.hits().is_empty());
    }

    #[test]
    fn test_scrub_is_frame_quantized() {
        let mut fx = fixture();
        analyzed(&mut fx);
        select(&mut fx, GUARD_A);
        fx.debugger.rewind();
        fx.recorder.take();

        fx.debugger.set_scrub_time(0.5);
        assert_eq!(fx.debugger.scrub_frame_index(), 0);
        assert_eq!(fx.debugger.events().len(), 2);

        fx.debugger.set_scrub_time(1.5);
        assert_eq!(fx.debugger.scrub_frame_index(), 1);
        assert_eq!(fx.debugger.scrub_time(), 1.5);
        assert_eq!(fx.debugger.events().len(), 4);
        assert_eq!(fx.debugger.last_read_frame(), Some(1));

        let updates: Vec<DebuggerNotification> = fx
            .recorder
            .take()
            .into_iter()
            .filter(|n| matches!(n, DebuggerNotification::TracesUpdated { .. }))
            .collect();
        assert_eq!(
            updates,
            vec![
                DebuggerNotification::TracesUpdated { events: 2, spans: 1 },
                DebuggerNotification::TracesUpdated { events: 4, spans: 2 },
            ]
        );

        // The open frame is never read.
        fx.debugger.set_scrub_time(4.5);
        assert_eq!(fx.debugger.scrub_frame_index(), 3);
        assert_eq!(fx.debugger.events().len(), 6);

        fx.debugger.set_scrub_time(0.5);
        assert_eq!(fx.debugger.events().len(), 6);
        assert_eq!(fx.debugger.active_states(), &[StateHandle(0), StateHandle(1)]);
    }

    #[test]
    fn test_vanished_instance_is_deselected() {
        let mut fx = fixture();
        let id = fx.client.add_trace("live", Vec::new(), true);
        let mut writer =
            TraceWriter::new(LiveSink { client: fx.client.clone(), id }, &header()).unwrap();
        begin_frame(&mut writer, 0);
        lifecycle(&mut writer, 1, GUARD_A, InstanceLifecycle::Started);
        enter(&mut writer, 2, GUARD_A, 1);
        begin_frame(&mut writer, 10);

        let trace = fx.client.trace_info(id).unwrap();
        assert!(fx.debugger.start_session_analysis(&trace));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while fx.debugger.active_instances().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
            fx.debugger.tick();
        }
        select(&mut fx, GUARD_A);
        assert!(fx.debugger.debugged_instance().is_some());

        lifecycle(&mut writer, 12, GUARD_A, InstanceLifecycle::Stopped);
        begin_frame(&mut writer, 20);
        fx.client.set_live(id, false);
        fx.debugger.wait_for_analysis();
        fx.debugger.tick();

        assert!(fx.debugger.debugged_instance().is_none());
        assert!(fx.debugger.active_instances().is_empty());
        assert!(fx.debugger.events().is_empty());
    }

    #[test]
    fn test_start_is_noop_for_missing_or_same_trace() {
        let mut fx = fixture();
        let missing = TraceDescriptor {
            id: TraceId(42),
            name: "missing".into(),
            metadata: Default::default(),
        };
        assert!(!fx.debugger.start_session_analysis(&missing));
        assert!(!fx.debugger.is_analyzing());

        analyzed(&mut fx);
        let current = fx.debugger.trace().cloned().unwrap();
        assert!(!fx.debugger.start_session_analysis(&current));
        assert!(!fx.debugger.start_session_analysis(&missing));
        assert_eq!(fx.debugger.trace().map(|t| t.id), Some(current.id));
        assert_eq!(fx.debugger.available_traces().unwrap().len(), 1);
    }

    #[test]
    fn test_stop_clears_analysis_data() {
        let mut fx = fixture();
        analyzed(&mut fx);
        select(&mut fx, GUARD_A);

        fx.debugger.stop_analysis();
        fx.debugger.stop_analysis();

        assert!(!fx.debugger.is_analyzing());
        assert!(fx.debugger.debugged_instance().is_none());
        assert!(fx.debugger.events().is_empty());
        assert!(fx.debugger.active_states().is_empty());
        assert!(fx.debugger.last_read_frame().is_none());
    }

    #[test]
    fn test_instances_of_other_assets_are_hidden() {
        let mut fx = fixture();
        analyzed(&mut fx);
        let other = fx.registry.register(StateTreeAsset::new("Villager", "/Game/AI", 9));
        let ctx = DebuggerContext::new(fx.client.clone(), fx.registry.clone(), Config::default());
        let mut debugger = StateTreeDebugger::new(ctx, &other);
        debugger.start_session_analysis(fx.debugger.trace().unwrap());
        debugger.wait_for_analysis();
        debugger.tick();

        assert!(debugger.active_instances().is_empty());
        assert_eq!(fx.debugger.active_instances().len(), 2);
        assert!(fx.debugger.active_instances().iter().all(|d| d.asset.points_to(&fx.asset)));
    }
}
