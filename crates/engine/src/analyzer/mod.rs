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

//! Trace analyzers
//!
//! An analyzer subscribes to `(logger, event)` pairs when analysis begins,
//! each under a small route id of its own choosing. The session binds record
//! uids to routes as declarations arrive and hands every matching record to
//! its analyzer together with write access to the [`SessionStore`].

mod animation;
pub use animation::*;

mod frame;
pub use frame::*;

mod gameplay;
pub use gameplay::*;

mod state_tree;
pub use state_tree::*;

use std::collections::{HashMap, HashSet};

use stdb_common::wire::{EventDeclaration, PayloadReader, TraceHeader, WireError, WireRecord};

use crate::SessionStore;

/// Analyzer-local identifier of a subscribed event
pub type RouteId = u16;

/// Decodes routed records into the session store
pub trait Analyzer: Send {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Subscribe to events
    fn on_analysis_begin(&mut self, routes: &mut RouteBuilder<'_>);

    /// Handle one record. Errors are logged by the session and the record is skipped.
    fn on_event(
        &mut self,
        route: RouteId,
        ctx: &mut EventContext<'_>,
        payload: &mut PayloadReader,
    ) -> Result<(), WireError>;

    /// Called once after the last record
    fn on_analysis_end(&mut self, _store: &mut SessionStore) {}
}

/// Registers the routes of one analyzer
#[derive(Debug)]
pub struct RouteBuilder<'a> {
    analyzer: usize,
    table: &'a mut RouteTable,
}

impl RouteBuilder<'_> {
    /// Subscribe to a typed record
    pub fn route<R: WireRecord>(&mut self, route: RouteId) -> &mut Self {
        self.route_event(route, R::LOGGER, R::EVENT)
    }

    /// Subscribe to an event by name
    pub fn route_event(&mut self, route: RouteId, logger: &str, event: &str) -> &mut Self {
        self.table.by_name.insert((logger.to_string(), event.to_string()), (self.analyzer, route));
        self
    }
}

/// Result of looking up a record uid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteLookup {
    /// Routed to `(analyzer index, route)`
    Routed(usize, RouteId),
    /// Declared, but no analyzer subscribed to it
    Unsubscribed,
    /// Never declared
    Unknown,
}

/// Maps event names and record uids to analyzer routes
#[derive(Debug, Default)]
pub struct RouteTable {
    by_name: HashMap<(String, String), (usize, RouteId)>,
    by_uid: HashMap<u16, (usize, RouteId)>,
    declared: HashSet<u16>,
}

impl RouteTable {
    /// Collect the subscriptions of every analyzer
    pub fn build(analyzers: &mut [Box<dyn Analyzer>]) -> Self {
        let mut table = Self::default();
        for (analyzer, instance) in analyzers.iter_mut().enumerate() {
            instance.on_analysis_begin(&mut RouteBuilder { analyzer, table: &mut table });
        }
        table
    }

    /// Bind the uid of a declaration. Returns whether an analyzer subscribed to it.
    pub fn declare(&mut self, declaration: &EventDeclaration) -> bool {
        self.declared.insert(declaration.uid);
        let key = (declaration.logger.clone(), declaration.event.clone());
        match self.by_name.get(&key) {
            Some(route) => {
                self.by_uid.insert(declaration.uid, *route);
                true
            }
            None => {
                self.by_uid.remove(&declaration.uid);
                false
            }
        }
    }

    /// Route of a record uid
    pub fn lookup(&self, uid: u16) -> RouteLookup {
        match self.by_uid.get(&uid) {
            Some((analyzer, route)) => RouteLookup::Routed(*analyzer, *route),
            None if self.declared.contains(&uid) => RouteLookup::Unsubscribed,
            None => RouteLookup::Unknown,
        }
    }
}

/// Write access handed to an analyzer for a single record
#[derive(Debug)]
pub struct EventContext<'a> {
    /// Session store, write-locked for the duration of the record
    pub store: &'a mut SessionStore,
    header: &'a TraceHeader,
}

impl<'a> EventContext<'a> {
    /// Create a context over a locked store
    pub fn new(store: &'a mut SessionStore, header: &'a TraceHeader) -> Self {
        Self { store, header }
    }

    /// Convert a cycle timestamp to seconds and extend the session duration
    pub fn seconds(&mut self, cycle: u64) -> f64 {
        let time = self.header.cycle_to_seconds(cycle);
        self.store.advance_duration(time);
        time
    }

    /// Frame index of `time` for the session's frame type
    pub fn frame_index_at(&self, time: f64) -> u64 {
        self.store.frames.frame_index_at(self.store.frame_type(), time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stdb_common::{types::FrameType, wire::StateRecord};

    struct Subscriber;

    impl Analyzer for Subscriber {
        fn name(&self) -> &'static str {
            "subscriber"
        }

        fn on_analysis_begin(&mut self, routes: &mut RouteBuilder<'_>) {
            routes.route::<StateRecord>(7).route_event(8, "Custom", "Thing");
        }

        fn on_event(
            &mut self,
            _route: RouteId,
            _ctx: &mut EventContext<'_>,
            _payload: &mut PayloadReader,
        ) -> Result<(), WireError> {
            Ok(())
        }
    }

    fn declaration(uid: u16, logger: &str, event: &str) -> EventDeclaration {
        EventDeclaration { uid, logger: logger.into(), event: event.into() }
    }

    #[test]
    fn test_route_lookup() {
        let mut analyzers: Vec<Box<dyn Analyzer>> = vec![Box::new(FrameAnalyzer), Box::new(Subscriber)];
        let mut table = RouteTable::build(&mut analyzers);

        assert!(table.declare(&declaration(3, "StateTreeDebugger", "StateEvent")));
        assert!(!table.declare(&declaration(4, "Other", "Event")));
        assert!(table.declare(&declaration(5, "Custom", "Thing")));

        assert_eq!(table.lookup(3), RouteLookup::Routed(1, 7));
        assert_eq!(table.lookup(5), RouteLookup::Routed(1, 8));
        assert_eq!(table.lookup(4), RouteLookup::Unsubscribed);
        assert_eq!(table.lookup(6), RouteLookup::Unknown);
    }

    #[test]
    fn test_context_tracks_duration() {
        let mut store = SessionStore::new(FrameType::Game);
        let header = TraceHeader { cycles_per_second: 100, ..Default::default() };
        let mut ctx = EventContext::new(&mut store, &header);

        assert_eq!(ctx.seconds(250), 2.5);
        assert_eq!(ctx.seconds(100), 1.0);
        assert_eq!(store.duration(), 2.5);
    }
}
