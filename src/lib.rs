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

//! Realtime lighting control core: adaptive-rate Art-Net DMX output,
//! concurrent per-channel fades, and cue-list playback, all bound together
//! by a topic-and-filter pub/sub bus.

pub mod bus;
pub mod config;
pub mod dmx;
pub mod easing;
pub mod error;
pub mod fade;
pub mod integration;
pub mod playback;

pub use config::Config;
pub use dmx::DmxEngine;
pub use error::{CoreError, CoreResult};
pub use fade::FadeEngine;
pub use integration::LumenCore;
pub use playback::PlaybackEngine;
