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

use stdb_common::wire::{ObjectEventRecord, ObjectRecord, PayloadReader, WireError, WireRecord};

use super::{Analyzer, EventContext, RouteBuilder, RouteId};
use crate::gameplay::ObjectInfo;

const ROUTE_OBJECT: RouteId = 0;
const ROUTE_OBJECT_EVENT: RouteId = 1;

/// Records traced objects and their events
#[derive(Debug, Default)]
pub struct GameplayAnalyzer;

impl Analyzer for GameplayAnalyzer {
    fn name(&self) -> &'static str {
        "gameplay"
    }

    fn on_analysis_begin(&mut self, routes: &mut RouteBuilder<'_>) {
        routes.route::<ObjectRecord>(ROUTE_OBJECT).route::<ObjectEventRecord>(ROUTE_OBJECT_EVENT);
    }

    fn on_event(
        &mut self,
        route: RouteId,
        ctx: &mut EventContext<'_>,
        payload: &mut PayloadReader,
    ) -> Result<(), WireError> {
        match route {
            ROUTE_OBJECT => {
                let r = ObjectRecord::decode(payload)?;
                ctx.store.gameplay.add_object(ObjectInfo {
                    id: r.id,
                    outer: r.outer,
                    name: r.name,
                    class_name: r.class_name,
                });
            }
            ROUTE_OBJECT_EVENT => {
                let r = ObjectEventRecord::decode(payload)?;
                let time = ctx.seconds(r.cycle);
                ctx.store.gameplay.append_object_event(r.id, time, r.event)?;
            }
            _ => {}
        }
        Ok(())
    }
}
