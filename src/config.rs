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

//! On-disk configuration, loaded from YAML at startup.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dmx::{DmxConfig, DEFAULT_BROADCAST_ADDR, DEFAULT_PORT};
use crate::error::{CoreError, CoreResult};
use crate::fade::FadeEngine;

/// Top-level configuration for the core, deserialized from the file named by
/// `--config` (or `lumen-core.yaml` in the current directory by default).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub art_net_enabled: bool,
    pub broadcast_address: String,
    pub art_net_port: u16,
    pub refresh_rate_hz: u32,
    pub idle_rate_hz: u32,
    pub high_rate_hold_ms: u64,
    pub universe_count: u32,
    pub fade_update_rate_hz: u32,
    pub log_directory: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            art_net_enabled: true,
            broadcast_address: DEFAULT_BROADCAST_ADDR.to_string(),
            art_net_port: DEFAULT_PORT,
            refresh_rate_hz: 60,
            idle_rate_hz: 1,
            high_rate_hold_ms: 2_000,
            universe_count: 4,
            fade_update_rate_hz: 40,
            log_directory: "logs".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, falling back to defaults for any
    /// field the file omits by deserializing over the default value.
    pub fn load(path: &Path) -> CoreResult<Config> {
        let contents = std::fs::read_to_string(path).map_err(|e| CoreError::Io(e.to_string()))?;
        serde_yaml::from_str(&contents).map_err(|e| CoreError::Io(e.to_string()))
    }

    pub fn dmx_config(&self) -> DmxConfig {
        DmxConfig {
            enabled: self.art_net_enabled,
            broadcast_addr: self.broadcast_address.clone(),
            port: self.art_net_port,
            refresh_rate_hz: self.refresh_rate_hz,
            idle_rate_hz: self.idle_rate_hz,
            high_rate_duration: Duration::from_millis(self.high_rate_hold_ms),
            universe_count: self.universe_count,
        }
    }
}

/// Apply the configured fade tick rate to an already-started fade engine.
pub async fn apply_fade_rate(fade: &FadeEngine, config: &Config) -> CoreResult<()> {
    fade.set_update_rate_hz(config.fade_update_rate_hz).await
}
