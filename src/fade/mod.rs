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

//! The fade engine: concurrent, per-channel time-based interpolation sitting
//! on top of the DMX output engine.
//!
//! Starting a new fade on a channel takes over from whatever fade was already
//! running there; the previous one is simply dropped mid-flight rather than
//! completed or cancelled explicitly, matching the channel-takeover semantics
//! in the specification.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::dmx::DmxEngine;
use crate::easing::EasingKind;
use crate::error::{clamp_dmx_value, CoreError, CoreResult};

/// A single channel's in-flight fade.
#[derive(Clone, Copy, Debug)]
struct ActiveFade {
    start_value: u8,
    target_value: u8,
    started_at: Instant,
    duration: Duration,
    easing: EasingKind,
}

impl ActiveFade {
    fn value_at(&self, now: Instant) -> u8 {
        if self.duration.is_zero() {
            return self.target_value;
        }
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        let t = (elapsed / self.duration.as_secs_f64()).clamp(0.0, 1.0);
        let eased = self.easing.apply(t);
        let span = self.target_value as f64 - self.start_value as f64;
        clamp_dmx_value((self.start_value as f64 + span * eased).round() as i32)
    }

    fn is_complete(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.duration
    }
}

struct FadeState {
    active: HashMap<(u32, u32), ActiveFade>,
}

/// A single target channel value for the start of a fade or a snap.
#[derive(Clone, Copy, Debug)]
pub struct ChannelTarget {
    pub universe: u32,
    pub channel: u32,
    pub value: u8,
}

/// The fade engine. Cheaply clonable, like [`DmxEngine`].
#[derive(Clone)]
pub struct FadeEngine {
    state: Arc<RwLock<FadeState>>,
    dmx: DmxEngine,
    update_rate_hz: Arc<AtomicU32>,
    restart_tx: mpsc::Sender<()>,
    worker: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

const DEFAULT_UPDATE_RATE_HZ: u32 = 40;
const MIN_UPDATE_RATE_HZ: u32 = 1;
const MAX_UPDATE_RATE_HZ: u32 = 240;

impl FadeEngine {
    pub async fn start(dmx: DmxEngine) -> Self {
        let state = Arc::new(RwLock::new(FadeState {
            active: HashMap::new(),
        }));
        let update_rate_hz = Arc::new(AtomicU32::new(DEFAULT_UPDATE_RATE_HZ));
        let (restart_tx, restart_rx) = mpsc::channel(1);

        let handle = spawn_ticker(state.clone(), dmx.clone(), update_rate_hz.clone(), restart_rx);

        FadeEngine {
            state,
            dmx,
            update_rate_hz,
            restart_tx,
            worker: Arc::new(tokio::sync::Mutex::new(Some(handle))),
        }
    }

    /// Start fading each listed channel from its current value to its target
    /// over `duration`, using `easing`. Any fade already running on one of
    /// these channels is taken over (replaced, not merged).
    pub async fn fade_channels(&self, targets: &[ChannelTarget], duration: Duration, easing: EasingKind) -> CoreResult<()> {
        let mut state = self.state.write().await;
        let now = Instant::now();
        for target in targets {
            let current = self.dmx.get_channel(target.universe, target.channel).await?;
            state.active.insert(
                (target.universe, target.channel),
                ActiveFade {
                    start_value: current,
                    target_value: target.value,
                    started_at: now,
                    duration,
                    easing,
                },
            );
        }
        Ok(())
    }

    /// Snap every listed channel to its target immediately with no
    /// interpolation, also cancelling any fade in flight on that channel.
    pub async fn snap_channels(&self, targets: &[ChannelTarget]) -> CoreResult<()> {
        let mut state = self.state.write().await;
        for target in targets {
            state.active.remove(&(target.universe, target.channel));
            self.dmx.set_channel(target.universe, target.channel, target.value).await?;
        }
        Ok(())
    }

    /// Convenience wrapper used by cue playback: resolve a scene's channel
    /// values, then fade or snap to them depending on `behavior`.
    pub async fn fade_to_scene(&self, targets: &[ChannelTarget], duration: Duration, easing: EasingKind) -> CoreResult<()> {
        self.fade_channels(targets, duration, easing).await
    }

    /// Fade every channel currently tracked by the DMX engine's active
    /// universes down to zero over `duration`.
    pub async fn fade_to_black(&self, universe_count: u32, duration: Duration, easing: EasingKind) -> CoreResult<()> {
        let mut targets = Vec::new();
        for universe in 1..=universe_count {
            let composed = self.dmx.get_universe(universe).await?;
            for (idx, &value) in composed.iter().enumerate() {
                if value != 0 {
                    targets.push(ChannelTarget {
                        universe,
                        channel: (idx + 1) as u32,
                        value: 0,
                    });
                }
            }
        }
        self.fade_channels(&targets, duration, easing).await
    }

    pub async fn cancel_fade(&self, universe: u32, channel: u32) {
        self.state.write().await.active.remove(&(universe, channel));
    }

    pub async fn cancel_all_fades(&self) {
        self.state.write().await.active.clear();
    }

    pub fn get_update_rate_hz(&self) -> u32 {
        self.update_rate_hz.load(Ordering::Relaxed)
    }

    /// Change the ticker's cadence without losing in-flight fades: each
    /// fade's progress is derived from wall-clock start time, not a tick
    /// count, so restarting the ticker at a new period is transparent to any
    /// fade already running.
    pub async fn set_update_rate_hz(&self, hz: u32) -> CoreResult<()> {
        if hz < MIN_UPDATE_RATE_HZ || hz > MAX_UPDATE_RATE_HZ {
            return Err(CoreError::InvalidUpdateRate(hz));
        }
        self.update_rate_hz.store(hz, Ordering::Relaxed);
        let _ = self.restart_tx.try_send(());
        Ok(())
    }

    pub async fn shutdown(&self) {
        if let Some(handle) = self.worker.lock().await.take() {
            handle.abort();
        }
    }
}

fn spawn_ticker(
    state: Arc<RwLock<FadeState>>,
    dmx: DmxEngine,
    update_rate_hz: Arc<AtomicU32>,
    mut restart_rx: mpsc::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut period = period_for(update_rate_hz.load(Ordering::Relaxed));
        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    tick_once(&state, &dmx).await;

                    let desired = period_for(update_rate_hz.load(Ordering::Relaxed));
                    if desired != period {
                        period = desired;
                        interval = tokio::time::interval(period);
                    }
                }
                signal = restart_rx.recv() => {
                    if signal.is_none() {
                        break;
                    }
                    let desired = period_for(update_rate_hz.load(Ordering::Relaxed));
                    period = desired;
                    interval = tokio::time::interval(period);
                }
            }
        }
    })
}

async fn tick_once(state: &Arc<RwLock<FadeState>>, dmx: &DmxEngine) {
    let now = Instant::now();
    let mut state = state.write().await;
    let mut finished = Vec::new();

    for (&(universe, channel), fade) in state.active.iter() {
        let value = fade.value_at(now);
        if let Err(e) = dmx.set_channel(universe, channel, value).await {
            debug!(universe, channel, error = %e, "fade tick failed to write channel");
        }
        if fade.is_complete(now) {
            finished.push((universe, channel));
        }
    }

    for key in finished {
        state.active.remove(&key);
    }
}

fn period_for(hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / hz.max(1) as f64)
}
