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

use stdb_common::wire::{BeginFrameRecord, EndFrameRecord, PayloadReader, WireError, WireRecord};

use super::{Analyzer, EventContext, RouteBuilder, RouteId};

const ROUTE_BEGIN_FRAME: RouteId = 0;
const ROUTE_END_FRAME: RouteId = 1;

/// Builds the frame index from frame boundary records
#[derive(Debug, Default)]
pub struct FrameAnalyzer;

impl Analyzer for FrameAnalyzer {
    fn name(&self) -> &'static str {
        "frames"
    }

    fn on_analysis_begin(&mut self, routes: &mut RouteBuilder<'_>) {
        routes
            .route::<BeginFrameRecord>(ROUTE_BEGIN_FRAME)
            .route::<EndFrameRecord>(ROUTE_END_FRAME);
    }

    fn on_event(
        &mut self,
        route: RouteId,
        ctx: &mut EventContext<'_>,
        payload: &mut PayloadReader,
    ) -> Result<(), WireError> {
        match route {
            ROUTE_BEGIN_FRAME => {
                let record = BeginFrameRecord::decode(payload)?;
                let time = ctx.seconds(record.cycle);
                ctx.store.frames.begin_frame(record.frame_type, time)?;
            }
            ROUTE_END_FRAME => {
                let record = EndFrameRecord::decode(payload)?;
                let time = ctx.seconds(record.cycle);
                ctx.store.frames.end_frame(record.frame_type, time);
            }
            _ => {}
        }
        Ok(())
    }
}
