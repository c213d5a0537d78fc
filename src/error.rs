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

//! Structured errors returned by user-driven operations on the core.
//!
//! Background workers (the transmit loop, the fade ticker, playback timers)
//! never surface these; they log and continue instead, per the error
//! handling design in the specification.

use thiserror::Error;

/// The structured error type for every request-serving call site in the core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("universe {0} is out of range (expected 1..={1})")]
    InvalidUniverse(u32, u32),

    #[error("channel {0} is out of range (expected 1..=512)")]
    InvalidChannel(u32),

    #[error("value {0} is out of range (expected 0..=255)")]
    InvalidValue(i32),

    #[error("offset {0} is out of range (expected 0..=511)")]
    InvalidOffset(u32),

    #[error("duplicate offset {0} in sparse channel list")]
    DuplicateOffset(u32),

    #[error("unknown easing kind {0:?}, degrading to linear")]
    InvalidEasing(String),

    #[error("update rate {0} Hz is out of range (expected 1..=240)")]
    InvalidUpdateRate(u32),

    #[error("cue {0} was not found")]
    CueNotFound(String),

    #[error("cue list {0} was not found")]
    CueListNotFound(String),

    #[error("cue list {0} is empty")]
    CueListEmpty(String),

    #[error("cue list {0} has no more cues")]
    NoMoreCues(String),

    #[error("cue index {0} is out of bounds for cue list {1} (len {2})")]
    CueIndexOutOfBounds(usize, String, usize),

    #[error("scene is missing for cue {0}")]
    SceneMissing(String),

    #[error("fixture {0} has no placement")]
    FixtureNotPlaced(String),

    #[error("socket reconfiguration failed: {0}")]
    SocketReconfigure(String),

    #[error("i/o error: {0}")]
    Io(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Clamp a signed integer intended for a DMX byte value into `0..=255`,
/// per the clamping behaviour required at the API boundary.
pub fn clamp_dmx_value(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
