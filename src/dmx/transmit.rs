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

//! The adaptive-rate Art-Net transmit worker.
//!
//! While channel state is actively changing the worker ticks at
//! [`DmxConfig::refresh_rate_hz`]; once [`DmxConfig::high_rate_duration`]
//! passes with no further changes it drops back to
//! [`DmxConfig::idle_rate_hz`], re-sending every universe's last known state
//! as a keep-alive. A single coalescing signal channel lets callers that need
//! an immediate transmission re-arm the high rate without the worker emitting
//! a duplicate packet of its own.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{trace, warn};

use crate::bus::Bus;

use super::{artnet, dmx_topic, frame_message, DmxConfig, EngineState};

pub(super) fn spawn(
    state: Arc<RwLock<EngineState>>,
    bus: Arc<Bus>,
    config: Arc<DmxConfig>,
    mut reset_rx: mpsc::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let high_period = period_for(config.refresh_rate_hz);
        let idle_period = period_for(config.idle_rate_hz);

        let mut interval = tokio::time::interval(high_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut current_period = high_period;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let mut guard = state.write().await;
                    let still_high = guard.high_rate && guard.last_change.elapsed() < config.high_rate_duration;
                    if guard.high_rate && !still_high {
                        guard.high_rate = false;
                    }
                    let dirty_only = guard.high_rate;
                    emit_frame(&mut guard, &bus, dirty_only).await;
                    drop(guard);

                    let desired = if still_high { high_period } else { idle_period };
                    if desired != current_period {
                        current_period = desired;
                        interval = tokio::time::interval(current_period);
                        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        interval.reset();
                    }
                }
                signal = reset_rx.recv() => {
                    if signal.is_none() {
                        break;
                    }
                    if current_period != high_period {
                        current_period = high_period;
                        interval = tokio::time::interval(current_period);
                        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        interval.reset();
                    }
                }
            }
        }
    })
}

fn period_for(hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / hz.max(1) as f64)
}

/// Send the composed state of every universe, or just those marked dirty
/// when `dirty_only` is set, publishing a bus frame for each and clearing its
/// dirty flag. Always publishes to the bus even when Art-Net output is
/// disabled, so local subscribers keep seeing state.
pub(super) async fn emit_frame(state: &mut EngineState, bus: &Bus, dirty_only: bool) {
    let universe_count = state.universes.len();
    for idx in 0..universe_count {
        if dirty_only && !state.universes[idx].dirty {
            continue;
        }
        let composed = state.universes[idx].composed();
        state.universes[idx].dirty = false;

        let universe_number = (idx + 1) as u32;
        bus.publish_all(dmx_topic(), frame_message(universe_number, composed)).await;

        if !state.enabled {
            continue;
        }
        let Some(socket) = state.socket.as_ref() else {
            continue;
        };

        let packet = artnet::encode(universe_number, &composed, state.sequence);
        if let Err(e) = socket.send_to(&packet, state.broadcast_addr).await {
            warn!(universe = universe_number, error = %e, "failed to send Art-Net frame");
        } else {
            trace!(universe = universe_number, "sent Art-Net frame");
        }
    }
    state.sequence = state.sequence.wrapping_add(1);
    if state.sequence == 0 {
        state.sequence = 1;
    }
}
