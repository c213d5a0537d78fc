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

//! The DMX output engine: the single source of truth for outgoing channel
//! state across up to four universes, and the adaptive-rate Art-Net
//! transmitter that emits them.

pub mod artnet;
mod transmit;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::bus::{Bus, Message, Topic};
use crate::error::{clamp_dmx_value, CoreError, CoreResult};

/// The highest channel number in a universe (1-indexed, inclusive).
pub const DMX_MAX: u32 = 512;
/// The largest number of universes the core will manage at once.
pub const MAX_UNIVERSES: u32 = 4;
/// The default Art-Net UDP port.
pub const DEFAULT_PORT: u16 = 6454;
/// The default broadcast target.
pub const DEFAULT_BROADCAST_ADDR: &str = "255.255.255.255";

/// Construction-time configuration for the DMX output engine.
#[derive(Clone, Debug)]
pub struct DmxConfig {
    pub enabled: bool,
    pub broadcast_addr: String,
    pub port: u16,
    pub refresh_rate_hz: u32,
    pub idle_rate_hz: u32,
    pub high_rate_duration: Duration,
    pub universe_count: u32,
}

impl Default for DmxConfig {
    fn default() -> Self {
        DmxConfig {
            enabled: true,
            broadcast_addr: DEFAULT_BROADCAST_ADDR.to_string(),
            port: DEFAULT_PORT,
            refresh_rate_hz: 60,
            idle_rate_hz: 1,
            high_rate_duration: Duration::from_secs(2),
            universe_count: 4,
        }
    }
}

/// The channel state for one universe: a 512-byte base array plus a sparse
/// override layer that wins at emission time.
#[derive(Clone)]
struct UniverseState {
    base: [u8; 512],
    overrides: FnvHashMap<u32, u8>,
    dirty: bool,
}

impl UniverseState {
    fn new() -> Self {
        UniverseState {
            base: [0u8; 512],
            overrides: FnvHashMap::default(),
            dirty: false,
        }
    }

    /// The base-plus-override composition emitted on the wire and returned
    /// from reads.
    fn composed(&self) -> [u8; 512] {
        let mut out = self.base;
        for (&channel, &value) in self.overrides.iter() {
            if channel >= 1 && channel <= DMX_MAX {
                out[(channel - 1) as usize] = value;
            }
        }
        out
    }
}

struct EngineState {
    universes: Vec<UniverseState>,
    active_scene: Option<String>,
    sequence: u8,
    enabled: bool,
    broadcast_addr: SocketAddr,
    socket: Option<UdpSocket>,
    high_rate: bool,
    last_change: Instant,
}

/// The DMX output engine.
///
/// Cheaply clonable: internally an `Arc` over the shared state, so the fade
/// and playback engines can each hold their own handle.
#[derive(Clone)]
pub struct DmxEngine {
    state: Arc<RwLock<EngineState>>,
    bus: Arc<Bus>,
    config: Arc<DmxConfig>,
    reset_tx: mpsc::Sender<()>,
    worker: Arc<WorkerHandle>,
}

struct WorkerHandle {
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DmxEngine {
    /// Start a new DMX engine and its background transmit worker.
    pub async fn start(config: DmxConfig, bus: Arc<Bus>) -> CoreResult<Self> {
        let universe_count = config.universe_count.clamp(1, MAX_UNIVERSES);
        let broadcast_addr = resolve_addr(&config.broadcast_addr, config.port)?;

        let socket = if config.enabled {
            Some(bind_broadcast_socket().await?)
        } else {
            None
        };

        let state = Arc::new(RwLock::new(EngineState {
            universes: (0..universe_count).map(|_| UniverseState::new()).collect(),
            active_scene: None,
            sequence: 0,
            enabled: config.enabled,
            broadcast_addr,
            socket,
            high_rate: false,
            last_change: Instant::now(),
        }));

        let (reset_tx, reset_rx) = mpsc::channel(1);
        let config = Arc::new(config);

        let handle = transmit::spawn(state.clone(), bus.clone(), config.clone(), reset_rx);

        Ok(DmxEngine {
            state,
            bus,
            config,
            reset_tx,
            worker: Arc::new(WorkerHandle {
                handle: tokio::sync::Mutex::new(Some(handle)),
            }),
        })
    }

    fn check_universe(&self, universe: u32) -> CoreResult<usize> {
        if universe < 1 || universe > self.config.universe_count.clamp(1, MAX_UNIVERSES) {
            return Err(CoreError::InvalidUniverse(universe, self.config.universe_count));
        }
        Ok((universe - 1) as usize)
    }

    fn check_channel(channel: u32) -> CoreResult<usize> {
        if channel < 1 || channel > DMX_MAX {
            return Err(CoreError::InvalidChannel(channel));
        }
        Ok((channel - 1) as usize)
    }

    async fn notify_change(&self, state: &mut EngineState) {
        state.high_rate = true;
        state.last_change = Instant::now();
        let _ = self.reset_tx.try_send(());
    }

    /// Write `value` into `(universe, channel)` if it differs from the
    /// current base value, marking the universe dirty and entering high-rate
    /// mode.
    pub async fn set_channel(&self, universe: u32, channel: u32, value: u8) -> CoreResult<()> {
        let u_idx = self.check_universe(universe)?;
        let c_idx = Self::check_channel(channel)?;

        let mut state = self.state.write().await;
        let changed = state.universes[u_idx].base[c_idx] != value;
        if changed {
            state.universes[u_idx].base[c_idx] = value;
            state.universes[u_idx].dirty = true;
            self.notify_change(&mut state).await;
        }
        Ok(())
    }

    /// Install a transient override that wins over the base value at
    /// emission time.
    pub async fn set_channel_override(&self, universe: u32, channel: u32, value: u8) -> CoreResult<()> {
        let u_idx = self.check_universe(universe)?;
        let c_idx = Self::check_channel(channel)?;

        let mut state = self.state.write().await;
        state.universes[u_idx].overrides.insert((c_idx + 1) as u32, value);
        state.universes[u_idx].dirty = true;
        self.notify_change(&mut state).await;
        Ok(())
    }

    pub async fn clear_channel_override(&self, universe: u32, channel: u32) -> CoreResult<()> {
        let u_idx = self.check_universe(universe)?;
        let c_idx = Self::check_channel(channel)?;

        let mut state = self.state.write().await;
        if state.universes[u_idx].overrides.remove(&((c_idx + 1) as u32)).is_some() {
            state.universes[u_idx].dirty = true;
            self.notify_change(&mut state).await;
        }
        Ok(())
    }

    pub async fn clear_all_overrides(&self) {
        let mut state = self.state.write().await;
        for universe in state.universes.iter_mut() {
            if !universe.overrides.is_empty() {
                universe.overrides.clear();
                universe.dirty = true;
            }
        }
        self.notify_change(&mut state).await;
    }

    /// Bulk-write a full 512-byte universe, marking it dirty only if any
    /// value actually changed.
    pub async fn set_all_channels(&self, universe: u32, bytes: &[u8]) -> CoreResult<()> {
        let u_idx = self.check_universe(universe)?;
        if bytes.len() != DMX_MAX as usize {
            return Err(CoreError::InvalidChannel(bytes.len() as u32));
        }

        let mut state = self.state.write().await;
        let current = state.universes[u_idx].base;
        if current.as_slice() != bytes {
            state.universes[u_idx].base.copy_from_slice(bytes);
            state.universes[u_idx].dirty = true;
            self.notify_change(&mut state).await;
        }
        Ok(())
    }

    /// Immediately zero every channel, clear overrides and the active scene,
    /// and mark every universe dirty.
    pub async fn fade_to_black(&self) {
        let mut state = self.state.write().await;
        for universe in state.universes.iter_mut() {
            universe.base = [0u8; 512];
            universe.overrides.clear();
            universe.dirty = true;
        }
        state.active_scene = None;
        self.notify_change(&mut state).await;
    }

    pub async fn get_channel(&self, universe: u32, channel: u32) -> CoreResult<u8> {
        let u_idx = self.check_universe(universe)?;
        let c_idx = Self::check_channel(channel)?;
        let state = self.state.read().await;
        Ok(state.universes[u_idx].composed()[c_idx])
    }

    /// Always returns exactly 512 entries.
    pub async fn get_universe(&self, universe: u32) -> CoreResult<[u8; 512]> {
        let u_idx = self.check_universe(universe)?;
        let state = self.state.read().await;
        Ok(state.universes[u_idx].composed())
    }

    pub async fn get_all_universes(&self) -> Vec<(u32, [u8; 512])> {
        let state = self.state.read().await;
        state
            .universes
            .iter()
            .enumerate()
            .map(|(idx, universe)| ((idx + 1) as u32, universe.composed()))
            .collect()
    }

    /// Used by the fade engine to enter high-rate mode without necessarily
    /// writing a channel itself (e.g. at the start of a fade).
    pub async fn trigger_change_detection(&self) {
        let mut state = self.state.write().await;
        self.notify_change(&mut state).await;
    }

    /// Mark every universe dirty and emit one packet per universe
    /// synchronously, under the engine lock. If the worker was idle, also
    /// pings it (non-blocking, coalescing) to re-arm at the high rate on its
    /// next cycle without emitting an extra packet itself.
    pub async fn force_immediate_transmission(&self) {
        let mut state = self.state.write().await;
        for universe in state.universes.iter_mut() {
            universe.dirty = true;
        }
        transmit::emit_frame(&mut state, &self.bus, false).await;
        state.high_rate = true;
        state.last_change = Instant::now();
        drop(state);
        let _ = self.reset_tx.try_send(());
    }

    pub async fn set_active_scene(&self, scene_id: impl Into<String>) {
        self.state.write().await.active_scene = Some(scene_id.into());
    }

    pub async fn get_active_scene_id(&self) -> Option<String> {
        self.state.read().await.active_scene.clone()
    }

    pub async fn clear_active_scene(&self) {
        self.state.write().await.active_scene = None;
    }

    /// Reconfigure the UDP target atomically. On failure to resolve/open the
    /// new address, the engine is left with no active socket.
    pub async fn reload_broadcast_address(&self, addr: &str) -> CoreResult<()> {
        let resolved = resolve_addr(addr, self.config.port)?;
        let socket = bind_broadcast_socket()
            .await
            .map_err(|e| CoreError::SocketReconfigure(e.to_string()))?;

        let mut state = self.state.write().await;
        state.broadcast_addr = resolved;
        state.socket = Some(socket);
        state.enabled = true;
        info!(%addr, "reconfigured Art-Net broadcast address");
        Ok(())
    }

    /// Disable Art-Net output entirely (simulation mode); the engine keeps
    /// computing channel state but stops transmitting.
    pub async fn disable_art_net(&self) {
        let mut state = self.state.write().await;
        state.enabled = false;
        state.socket = None;
    }

    /// Send a final all-zero frame per universe, close the socket, and stop
    /// the background worker.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write().await;
            for universe in state.universes.iter_mut() {
                universe.base = [0u8; 512];
                universe.overrides.clear();
                universe.dirty = true;
            }
            transmit::emit_frame(&mut state, &self.bus, false).await;
            state.socket = None;
        }
        if let Some(handle) = self.worker.handle.lock().await.take() {
            handle.abort();
        }
    }
}

fn resolve_addr(addr: &str, port: u16) -> CoreResult<SocketAddr> {
    use std::net::ToSocketAddrs;
    format!("{addr}:{port}")
        .to_socket_addrs()
        .map_err(|e| CoreError::SocketReconfigure(e.to_string()))?
        .next()
        .ok_or_else(|| CoreError::SocketReconfigure(format!("no address resolved for {addr}")))
}

async fn bind_broadcast_socket() -> CoreResult<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| CoreError::Io(e.to_string()))?;
    socket.set_broadcast(true).map_err(|e| CoreError::Io(e.to_string()))?;
    Ok(socket)
}

/// Helper for the bus: turn a universe's composed channel array into the
/// shared payload form used by [`Message::DmxFrame`].
pub(crate) fn frame_message(universe: u32, channels: [u8; 512]) -> Message {
    Message::DmxFrame {
        universe,
        channels: Arc::new(channels),
    }
}

pub(crate) fn dmx_topic() -> Topic {
    Topic::DmxFrame
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_engine() -> DmxEngine {
        let bus = Arc::new(Bus::new());
        DmxEngine::start(
            DmxConfig {
                enabled: false,
                ..Default::default()
            },
            bus,
        )
        .await
        .expect("engine should start in simulation mode")
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let engine = test_engine().await;
        engine.set_channel(1, 1, 128).await.unwrap();
        assert_eq!(engine.get_channel(1, 1).await.unwrap(), 128);
    }

    #[tokio::test]
    async fn get_universe_always_returns_512_entries() {
        let engine = test_engine().await;
        let universe = engine.get_universe(2).await.unwrap();
        assert_eq!(universe.len(), 512);
    }

    #[tokio::test]
    async fn invalid_universe_is_rejected() {
        let engine = test_engine().await;
        assert!(engine.set_channel(5, 1, 1).await.is_err());
        assert!(engine.set_channel(0, 1, 1).await.is_err());
    }

    #[tokio::test]
    async fn invalid_channel_is_rejected() {
        let engine = test_engine().await;
        assert!(engine.set_channel(1, 0, 1).await.is_err());
        assert!(engine.set_channel(1, 513, 1).await.is_err());
    }

    #[tokio::test]
    async fn overrides_win_over_base_value() {
        let engine = test_engine().await;
        engine.set_channel(1, 10, 50).await.unwrap();
        engine.set_channel_override(1, 10, 200).await.unwrap();
        assert_eq!(engine.get_channel(1, 10).await.unwrap(), 200);

        engine.clear_channel_override(1, 10).await.unwrap();
        assert_eq!(engine.get_channel(1, 10).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn fade_to_black_zeroes_everything() {
        let engine = test_engine().await;
        engine.set_channel(1, 1, 255).await.unwrap();
        engine.set_channel_override(1, 2, 255).await.unwrap();
        engine.set_active_scene("scene-a").await;

        engine.fade_to_black().await;

        assert_eq!(engine.get_channel(1, 1).await.unwrap(), 0);
        assert_eq!(engine.get_channel(1, 2).await.unwrap(), 0);
        assert_eq!(engine.get_active_scene_id().await, None);
    }

    #[tokio::test]
    async fn clamp_helper_saturates() {
        assert_eq!(clamp_dmx_value(300), 255);
        assert_eq!(clamp_dmx_value(-10), 0);
        assert_eq!(clamp_dmx_value(128), 128);
    }
}
