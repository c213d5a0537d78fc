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

//! The cue-list playback engine: a state machine that walks an ordered list
//! of cues, driving the fade engine and publishing progress on the bus.
//!
//! Every `start_cue` call stamps the list's generation counter. Background
//! timers (fade-progress ticks, the fade-complete timer, the follow timer)
//! capture the generation they were spawned under and re-check it against
//! the live value before acting, so a cue that gets jumped past or stopped
//! mid-fade never has a stale timer fire on top of whatever replaced it.

pub mod cue;
pub mod storage;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bus::{Bus, Message, Topic};
use crate::dmx::DmxEngine;
use crate::error::{CoreError, CoreResult};
use crate::fade::{ChannelTarget, FadeEngine};

use cue::{Cue, CueList, FadeBehavior};
use storage::SceneStore;

const FADE_PROGRESS_TICK: Duration = Duration::from_millis(100);

/// A snapshot of one cue list's playback position, published on
/// [`Topic::CueListPlayback`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub cue_list_id: String,
    pub cue_list_name: String,
    pub current_cue_id: Option<String>,
    pub current_cue_name: Option<String>,
    pub current_cue_number: Option<f64>,
    pub fade_progress: f64,
    pub is_playing: bool,
}

/// A snapshot of every cue list currently playing, published on
/// [`Topic::GlobalPlayback`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GlobalPlaybackStatus {
    pub active: Vec<PlaybackStatus>,
}

struct ListState {
    list: CueList,
    current_index: Option<usize>,
    is_playing: bool,
    fade_started_at: Option<Instant>,
    fade_duration: Duration,
    generation: Arc<AtomicU64>,
}

/// The playback engine. Cheaply clonable, like [`DmxEngine`] and
/// [`FadeEngine`].
#[derive(Clone)]
pub struct PlaybackEngine {
    lists: Arc<RwLock<HashMap<String, ListState>>>,
    fade: FadeEngine,
    dmx: DmxEngine,
    bus: Arc<Bus>,
    scenes: Arc<dyn SceneStore>,
}

impl PlaybackEngine {
    pub fn new(fade: FadeEngine, dmx: DmxEngine, bus: Arc<Bus>, scenes: Arc<dyn SceneStore>) -> Self {
        PlaybackEngine {
            lists: Arc::new(RwLock::new(HashMap::new())),
            fade,
            dmx,
            bus,
            scenes,
        }
    }

    /// The DMX engine backing this playback engine's fades, for callers that
    /// need to read output state directly (e.g. a status page).
    pub fn dmx(&self) -> &DmxEngine {
        &self.dmx
    }

    pub async fn register_cue_list(&self, list: CueList) {
        let mut lists = self.lists.write().await;
        lists.insert(
            list.id.clone(),
            ListState {
                list,
                current_index: None,
                is_playing: false,
                fade_started_at: None,
                fade_duration: Duration::ZERO,
                generation: Arc::new(AtomicU64::new(0)),
            },
        );
    }

    pub async fn start_cue_list(&self, list_id: &str) -> CoreResult<()> {
        {
            let lists = self.lists.read().await;
            let state = lists
                .get(list_id)
                .ok_or_else(|| CoreError::CueListNotFound(list_id.to_string()))?;
            if state.list.cues.is_empty() {
                return Err(CoreError::CueListEmpty(list_id.to_string()));
            }
        }
        self.start_cue(list_id, 0).await
    }

    pub async fn jump_to_cue(&self, list_id: &str, index: usize) -> CoreResult<()> {
        self.start_cue(list_id, index).await
    }

    pub async fn go_to_cue_number(&self, list_id: &str, number: f64) -> CoreResult<()> {
        let index = {
            let lists = self.lists.read().await;
            let state = lists
                .get(list_id)
                .ok_or_else(|| CoreError::CueListNotFound(list_id.to_string()))?;
            state.list.index_of_number(number)?
        };
        self.start_cue(list_id, index).await
    }

    pub async fn go_to_cue_name(&self, list_id: &str, name: &str) -> CoreResult<()> {
        let index = {
            let lists = self.lists.read().await;
            let state = lists
                .get(list_id)
                .ok_or_else(|| CoreError::CueListNotFound(list_id.to_string()))?;
            state.list.index_of_name(name)?
        };
        self.start_cue(list_id, index).await
    }

    pub async fn next_cue(&self, list_id: &str) -> CoreResult<()> {
        let next = {
            let lists = self.lists.read().await;
            let state = lists
                .get(list_id)
                .ok_or_else(|| CoreError::CueListNotFound(list_id.to_string()))?;
            let current = state.current_index.unwrap_or(0);
            state.list.next_index(current)
        };
        match next {
            Some(index) => self.start_cue(list_id, index).await,
            None => self.stop_cue_list(list_id).await,
        }
    }

    pub async fn previous_cue(&self, list_id: &str) -> CoreResult<()> {
        let previous = {
            let lists = self.lists.read().await;
            let state = lists
                .get(list_id)
                .ok_or_else(|| CoreError::CueListNotFound(list_id.to_string()))?;
            let current = state.current_index.unwrap_or(0);
            state.list.previous_index(current)
        };
        match previous {
            Some(index) => self.start_cue(list_id, index).await,
            None => Err(CoreError::NoMoreCues(list_id.to_string())),
        }
    }

    pub async fn stop_cue_list(&self, list_id: &str) -> CoreResult<()> {
        {
            let mut lists = self.lists.write().await;
            let state = lists
                .get_mut(list_id)
                .ok_or_else(|| CoreError::CueListNotFound(list_id.to_string()))?;
            state.generation.fetch_add(1, Ordering::SeqCst);
            state.is_playing = false;
            state.fade_started_at = None;
        }
        self.emit_update(list_id).await?;
        Ok(())
    }

    pub async fn stop_all_cue_lists(&self) {
        let ids: Vec<String> = self.lists.read().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.stop_cue_list(&id).await {
                warn!(cue_list = %id, error = %e, "failed to stop cue list");
            }
        }
    }

    pub async fn get_playback_state(&self, list_id: &str) -> CoreResult<PlaybackStatus> {
        let lists = self.lists.read().await;
        let state = lists
            .get(list_id)
            .ok_or_else(|| CoreError::CueListNotFound(list_id.to_string()))?;
        Ok(status_from_state(state))
    }

    pub async fn get_formatted_status(&self, list_id: &str) -> CoreResult<String> {
        let status = self.get_playback_state(list_id).await?;
        Ok(match (&status.current_cue_name, status.current_cue_number) {
            (Some(name), Some(number)) => format!(
                "{}: cue {} \"{}\" ({:.0}% faded{})",
                status.cue_list_name,
                number,
                name,
                status.fade_progress * 100.0,
                if status.is_playing { "" } else { ", stopped" }
            ),
            _ => format!("{}: idle", status.cue_list_name),
        })
    }

    pub async fn get_global_playback_status(&self) -> GlobalPlaybackStatus {
        let lists = self.lists.read().await;
        let active = lists
            .values()
            .filter(|state| state.is_playing)
            .map(status_from_state)
            .collect();
        GlobalPlaybackStatus { active }
    }

    async fn start_cue(&self, list_id: &str, index: usize) -> CoreResult<()> {
        let (cue, generation_value, generation) = {
            let mut lists = self.lists.write().await;
            let state = lists
                .get_mut(list_id)
                .ok_or_else(|| CoreError::CueListNotFound(list_id.to_string()))?;
            let cue = state.list.cue_at(index)?.clone();

            state.generation.fetch_add(1, Ordering::SeqCst);
            let generation_value = state.generation.load(Ordering::SeqCst);
            state.current_index = Some(index);
            state.is_playing = true;
            state.fade_started_at = Some(Instant::now());
            state.fade_duration = cue.fade_in;

            (cue, generation_value, state.generation.clone())
        };

        self.execute_cue_dmx(&cue).await?;
        self.emit_update(list_id).await?;
        self.spawn_cue_timers(list_id.to_string(), cue, generation_value, generation);
        Ok(())
    }

    async fn execute_cue_dmx(&self, cue: &Cue) -> CoreResult<()> {
        let mut targets = Vec::new();
        if let Some(scene_id) = &cue.scene_id {
            let scene = self.scenes.get_scene(scene_id).ok_or_else(|| CoreError::SceneMissing(cue.id.clone()))?;
            targets.extend(scene.to_channel_targets());
        }
        // Sparse overrides apply against the same universe as the scene, or
        // universe 1 when the cue carries no scene of its own.
        let override_universe = targets.first().map(|t: &ChannelTarget| t.universe).unwrap_or(1);
        targets.extend(cue.overrides.to_channel_targets(override_universe));

        match cue.fade_behavior {
            FadeBehavior::Snap => self.fade.snap_channels(&targets).await,
            FadeBehavior::Fade => self.fade.fade_channels(&targets, cue.fade_in, cue.easing).await,
        }
    }

    fn spawn_cue_timers(&self, list_id: String, cue: Cue, generation_value: u64, generation: Arc<AtomicU64>) {
        let fade_duration = cue.fade_in;

        // Fade-progress ticker: republishes status every tick until the fade
        // completes or a newer cue takes over.
        {
            let this = self.clone();
            let list_id = list_id.clone();
            let generation = generation.clone();
            tokio::spawn(async move {
                let mut elapsed = Duration::ZERO;
                while elapsed < fade_duration {
                    tokio::time::sleep(FADE_PROGRESS_TICK.min(fade_duration.saturating_sub(elapsed).max(Duration::from_millis(1))))
                        .await;
                    elapsed += FADE_PROGRESS_TICK;
                    if generation.load(Ordering::SeqCst) != generation_value {
                        return;
                    }
                    if let Err(e) = this.emit_update(&list_id).await {
                        debug!(cue_list = %list_id, error = %e, "fade progress tick failed to publish");
                    }
                }
            });
        }

        // Fade-complete timer: one final status publish with progress pinned
        // at 1.0, guarded by the same generation check.
        {
            let this = self.clone();
            let list_id = list_id.clone();
            let generation = generation.clone();
            tokio::spawn(async move {
                tokio::time::sleep(fade_duration).await;
                if generation.load(Ordering::SeqCst) != generation_value {
                    return;
                }
                if let Err(e) = this.emit_update(&list_id).await {
                    debug!(cue_list = %list_id, error = %e, "fade complete update failed to publish");
                }
            });
        }

        // Follow timer: auto-advance to the next cue once the configured
        // follow delay elapses after the fade completes.
        if let Some(follow_delay) = cue.follow {
            let this = self.clone();
            let list_id = list_id.clone();
            let generation = generation.clone();
            tokio::spawn(async move {
                tokio::time::sleep(fade_duration + follow_delay).await;
                if generation.load(Ordering::SeqCst) != generation_value {
                    return;
                }
                info!(cue_list = %list_id, cue = %cue.name, "auto-advancing on follow timer");
                if let Err(e) = this.next_cue(&list_id).await {
                    warn!(cue_list = %list_id, error = %e, "follow advance failed");
                }
            });
        }
    }

    async fn emit_update(&self, list_id: &str) -> CoreResult<()> {
        let status = self.get_playback_state(list_id).await?;
        self.bus
            .publish_all(Topic::CueListPlayback, Message::CueListPlayback(Arc::new(status)))
            .await;
        let global = self.get_global_playback_status().await;
        self.bus
            .publish_all(Topic::GlobalPlayback, Message::GlobalPlayback(Arc::new(global)))
            .await;
        Ok(())
    }
}

fn status_from_state(state: &ListState) -> PlaybackStatus {
    let current_cue = state.current_index.and_then(|idx| state.list.cues.get(idx));
    let fade_progress = match state.fade_started_at {
        Some(started) if !state.fade_duration.is_zero() => {
            (started.elapsed().as_secs_f64() / state.fade_duration.as_secs_f64()).clamp(0.0, 1.0)
        }
        Some(_) => 1.0,
        None => 0.0,
    };

    PlaybackStatus {
        cue_list_id: state.list.id.clone(),
        cue_list_name: state.list.name.clone(),
        current_cue_id: current_cue.map(|c| c.id.clone()),
        current_cue_name: current_cue.map(|c| c.name.clone()),
        current_cue_number: current_cue.map(|c| c.number),
        fade_progress,
        is_playing: state.is_playing,
    }
}
