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

//! Collaborator storage boundaries.
//!
//! The playback engine never owns scene, fixture, or settings data directly;
//! it reads it through these traits. The in-memory implementations here
//! stand in for a real external store until one is wired up.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::fade::ChannelTarget;

/// A named snapshot of channel values, resolved to concrete universes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub values: Vec<(u32, u32, u8)>,
}

impl Scene {
    pub fn to_channel_targets(&self) -> Vec<ChannelTarget> {
        self.values
            .iter()
            .map(|&(universe, channel, value)| ChannelTarget {
                universe,
                channel,
                value,
            })
            .collect()
    }
}

/// Where a fixture's channels begin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixturePlacement {
    pub universe: u32,
    pub start_channel: u32,
}

pub trait SceneStore: Send + Sync {
    fn get_scene(&self, scene_id: &str) -> Option<Scene>;
    fn put_scene(&self, scene: Scene);
}

pub trait FixturePlacementStore: Send + Sync {
    fn get_placement(&self, fixture_id: &str) -> Option<FixturePlacement>;
    fn put_placement(&self, fixture_id: &str, placement: FixturePlacement);
}

pub trait SettingStore: Send + Sync {
    fn get_setting(&self, key: &str) -> Option<String>;
    fn set_setting(&self, key: &str, value: String);
}

/// In-memory [`SceneStore`] keyed by scene id.
#[derive(Default)]
pub struct InMemorySceneStore {
    scenes: RwLock<HashMap<String, Scene>>,
}

impl SceneStore for InMemorySceneStore {
    fn get_scene(&self, scene_id: &str) -> Option<Scene> {
        self.scenes.read().expect("scene store poisoned").get(scene_id).cloned()
    }

    fn put_scene(&self, scene: Scene) {
        self.scenes
            .write()
            .expect("scene store poisoned")
            .insert(scene.id.clone(), scene);
    }
}

/// In-memory [`FixturePlacementStore`] keyed by fixture id.
#[derive(Default)]
pub struct InMemoryFixtureStore {
    placements: RwLock<HashMap<String, FixturePlacement>>,
}

impl FixturePlacementStore for InMemoryFixtureStore {
    fn get_placement(&self, fixture_id: &str) -> Option<FixturePlacement> {
        self.placements
            .read()
            .expect("fixture store poisoned")
            .get(fixture_id)
            .copied()
    }

    fn put_placement(&self, fixture_id: &str, placement: FixturePlacement) {
        self.placements
            .write()
            .expect("fixture store poisoned")
            .insert(fixture_id.to_string(), placement);
    }
}

/// In-memory [`SettingStore`] keyed by setting name.
#[derive(Default)]
pub struct InMemorySettingStore {
    settings: RwLock<HashMap<String, String>>,
}

impl SettingStore for InMemorySettingStore {
    fn get_setting(&self, key: &str) -> Option<String> {
        self.settings.read().expect("setting store poisoned").get(key).cloned()
    }

    fn set_setting(&self, key: &str, value: String) {
        self.settings
            .write()
            .expect("setting store poisoned")
            .insert(key.to_string(), value);
    }
}
