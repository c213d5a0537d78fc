// Copyright (c) 2024 Stagecraft Systems
// Licence: GNU GPLv3
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Wires the DMX, fade, and playback engines together behind one handle.

use std::sync::Arc;

use tracing::info;

use crate::bus::Bus;
use crate::config::{apply_fade_rate, Config};
use crate::dmx::DmxEngine;
use crate::error::CoreResult;
use crate::fade::FadeEngine;
use crate::playback::storage::{FixturePlacementStore, InMemoryFixtureStore, InMemorySceneStore, InMemorySettingStore, SceneStore, SettingStore};
use crate::playback::PlaybackEngine;

/// The fully wired core: one DMX engine, one fade engine sitting on top of
/// it, and one playback engine sitting on top of that, sharing a single bus.
pub struct LumenCore {
    pub bus: Arc<Bus>,
    pub dmx: DmxEngine,
    pub fade: FadeEngine,
    pub playback: PlaybackEngine,
    pub scenes: Arc<dyn SceneStore>,
    pub fixtures: Arc<dyn FixturePlacementStore>,
    pub settings: Arc<dyn SettingStore>,
}

impl LumenCore {
    /// Bring up every subsystem in dependency order: bus, then DMX output,
    /// then fades, then playback.
    pub async fn start(config: &Config) -> CoreResult<LumenCore> {
        let bus = Arc::new(Bus::new());
        let dmx = DmxEngine::start(config.dmx_config(), bus.clone()).await?;
        let fade = FadeEngine::start(dmx.clone()).await;
        apply_fade_rate(&fade, config).await?;

        let scenes: Arc<dyn SceneStore> = Arc::new(InMemorySceneStore::default());
        let fixtures: Arc<dyn FixturePlacementStore> = Arc::new(InMemoryFixtureStore::default());
        let settings: Arc<dyn SettingStore> = Arc::new(InMemorySettingStore::default());

        let playback = PlaybackEngine::new(fade.clone(), dmx.clone(), bus.clone(), scenes.clone());

        info!("lumen-core started");
        Ok(LumenCore {
            bus,
            dmx,
            fade,
            playback,
            scenes,
            fixtures,
            settings,
        })
    }

    /// Stop fading, blackout the output, and tear down the background
    /// workers in reverse dependency order.
    pub async fn shutdown(&self) {
        self.playback.stop_all_cue_lists().await;
        self.fade.cancel_all_fades().await;
        self.fade.shutdown().await;
        self.dmx.shutdown().await;
        info!("lumen-core shut down");
    }
}
