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

use std::{fmt, sync::Arc};

use stdb_common::config::Config;

use crate::{
    Analyzer, AnimationAnalyzer, AssetResolver, FrameAnalyzer, GameplayAnalyzer, StoreClient,
    StateTreeTraceAnalyzer,
};

/// Collaborators handed to the debugger at construction
#[derive(Clone)]
pub struct DebuggerContext {
    /// Source of recorded traces
    pub store_client: Arc<dyn StoreClient>,
    /// Resolves the assets referenced by traces
    pub assets: Arc<dyn AssetResolver>,
    /// User configuration
    pub config: Config,
}

impl fmt::Debug for DebuggerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuggerContext").field("config", &self.config).finish_non_exhaustive()
    }
}

impl DebuggerContext {
    /// Create a context
    pub fn new(
        store_client: Arc<dyn StoreClient>,
        assets: Arc<dyn AssetResolver>,
        config: Config,
    ) -> Self {
        Self { store_client, assets, config }
    }

    /// Fresh set of analyzers for one session
    pub fn analyzers(&self) -> Vec<Box<dyn Analyzer>> {
        vec![
            Box::new(FrameAnalyzer),
            Box::new(StateTreeTraceAnalyzer::new(self.assets.clone())),
            Box::new(GameplayAnalyzer),
            Box::new(AnimationAnalyzer),
        ]
    }
}
