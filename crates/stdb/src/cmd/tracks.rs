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

//! Tracks command - print the gameplay track tree of a trace

use std::sync::Arc;

use eyre::Result;
use stdb_engine::{
    gameplay::{AnimationSharedData, GameplaySharedData, GameplayTrack, TrackHost},
    AssetRegistry, StoreClient,
};

use super::{analyze, open_context};

#[derive(Debug, Default)]
struct TrackCounter {
    added: usize,
    reorders: usize,
}

impl TrackHost for TrackCounter {
    fn on_track_added(&mut self, track: &GameplayTrack) {
        tracing::debug!(name = track.name(), kind = ?track.kind(), "Track added");
        self.added += 1;
    }

    fn on_tracks_reordered(&mut self) {
        self.reorders += 1;
    }
}

/// Print the ordered track tree, and the animation graph data of the frame
/// containing `at` when given
pub async fn print_tracks(cli: &crate::Cli, trace: &str, at: Option<f64>) -> Result<()> {
    let ctx = open_context(cli.config()?, Arc::new(AssetRegistry::new()));
    let trace = ctx.store_client.find_trace(trace)?;
    let session = analyze(&ctx, trace).await?;
    let store = session.store().read();

    let mut host = TrackCounter::default();
    let mut gameplay = GameplaySharedData::new();
    let mut animation = AnimationSharedData::new(ctx.config.analysis.frame_type);
    gameplay.tick(&store, &mut host);
    animation.tick(&store, &mut gameplay, &mut host);
    tracing::debug!(added = host.added, reorders = host.reorders, "Tracks built");

    if gameplay.tracks().is_empty() {
        println!("No gameplay tracks");
        return Ok(());
    }
    for track in gameplay.tracks().ordered() {
        println!("{track}");
    }

    let Some(time) = at else {
        return Ok(());
    };
    for (anim_instance, _) in store.animation.instances() {
        let name = store.gameplay.object(anim_instance).map_or("?", |o| o.name.as_str());
        let Some(data) = animation.debug_data_at(&store, anim_instance, time) else {
            println!("{name}: no frame at {time:.4}s");
            continue;
        };
        println!(
            "{name} @ {}: {} phases, {} node visits, {} state machines, {} sequence players",
            data.frame,
            data.phases.len(),
            data.node_visits.len(),
            data.state_machines.len(),
            data.sequence_players.len()
        );
        for visit in &data.node_visits {
            println!(
                "  {} -> {} {} ({:.2})",
                visit.source_node, visit.target_node, visit.name, visit.weight
            );
        }
    }
    Ok(())
}
