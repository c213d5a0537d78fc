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

//! Cue and cue-list data types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::easing::EasingKind;
use crate::error::{CoreError, CoreResult};
use crate::fade::ChannelTarget;

/// Whether a cue interpolates into its scene or snaps directly to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FadeBehavior {
    Fade,
    Snap,
}

impl Default for FadeBehavior {
    fn default() -> Self {
        FadeBehavior::Fade
    }
}

/// A sparse list of `(offset, value)` overrides against a base universe,
/// kept sorted by offset with no duplicates. Equality compares the sorted
/// contents, so two lists built from differently-ordered input compare equal.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<(u32, u8)>", into = "Vec<(u32, u8)>")]
pub struct SparseChannels {
    entries: Vec<(u32, u8)>,
}

impl SparseChannels {
    pub fn from_pairs(pairs: Vec<(u32, u8)>) -> CoreResult<SparseChannels> {
        let mut entries = pairs;
        entries.sort_by_key(|&(offset, _)| offset);
        for window in entries.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(CoreError::DuplicateOffset(window[0].0));
            }
        }
        for &(offset, _) in &entries {
            if offset > 511 {
                return Err(CoreError::InvalidOffset(offset));
            }
        }
        Ok(SparseChannels { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_channel_targets(&self, universe: u32) -> Vec<ChannelTarget> {
        self.entries
            .iter()
            .map(|&(offset, value)| ChannelTarget {
                universe,
                channel: offset + 1,
                value,
            })
            .collect()
    }
}

impl TryFrom<Vec<(u32, u8)>> for SparseChannels {
    type Error = CoreError;

    fn try_from(pairs: Vec<(u32, u8)>) -> Result<Self, Self::Error> {
        SparseChannels::from_pairs(pairs)
    }
}

impl From<SparseChannels> for Vec<(u32, u8)> {
    fn from(sparse: SparseChannels) -> Self {
        sparse.entries
    }
}

impl PartialEq for SparseChannels {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// A single cue: a named, numbered step in a cue list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cue {
    pub id: String,
    pub name: String,
    /// The cue's position for `goToCueNumber`-style lookups. Ordering within
    /// a list follows this number, not list insertion order.
    pub number: f64,
    pub scene_id: Option<String>,
    pub overrides: SparseChannels,
    pub fade_in: Duration,
    pub fade_behavior: FadeBehavior,
    pub easing: EasingKind,
    /// If set, the cue auto-advances to the next one this long after its
    /// fade completes.
    pub follow: Option<Duration>,
}

/// An ordered list of cues plus loop/wrap configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CueList {
    pub id: String,
    pub name: String,
    pub cues: Vec<Cue>,
    /// When the last cue finishes (or is advanced past), jump back to this
    /// index instead of stopping. `None` means stop at the end.
    pub loop_to_index: Option<usize>,
}

impl CueList {
    pub fn cue_at(&self, index: usize) -> CoreResult<&Cue> {
        self.cues
            .get(index)
            .ok_or_else(|| CoreError::CueIndexOutOfBounds(index, self.id.clone(), self.cues.len()))
    }

    pub fn index_of_name(&self, name: &str) -> CoreResult<usize> {
        self.cues
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| CoreError::CueNotFound(name.to_string()))
    }

    /// Find the cue whose `number` exactly equals `number`. The
    /// specification leaves float-tolerance unspecified for this lookup;
    /// this core only ever produces cue numbers from user-supplied decimal
    /// literals stored verbatim, so exact equality is safe and simpler than
    /// introducing an arbitrary epsilon.
    pub fn index_of_number(&self, number: f64) -> CoreResult<usize> {
        self.cues
            .iter()
            .position(|c| c.number == number)
            .ok_or_else(|| CoreError::CueNotFound(number.to_string()))
    }

    /// The index that following `from` should land on, applying the loop
    /// configuration when `from` is the last cue.
    pub fn next_index(&self, from: usize) -> Option<usize> {
        if from + 1 < self.cues.len() {
            Some(from + 1)
        } else {
            self.loop_to_index
        }
    }

    pub fn previous_index(&self, from: usize) -> Option<usize> {
        if from == 0 {
            None
        } else {
            Some(from - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_channels_rejects_duplicate_offsets() {
        let err = SparseChannels::from_pairs(vec![(1, 10), (1, 20)]).unwrap_err();
        assert_eq!(err, CoreError::DuplicateOffset(1));
    }

    #[test]
    fn sparse_channels_rejects_out_of_range_offsets() {
        assert!(SparseChannels::from_pairs(vec![(512, 1)]).is_err());
        assert!(SparseChannels::from_pairs(vec![(511, 1)]).is_ok());
    }

    #[test]
    fn sparse_channels_equal_regardless_of_input_order() {
        let a = SparseChannels::from_pairs(vec![(3, 1), (1, 2)]).unwrap();
        let b = SparseChannels::from_pairs(vec![(1, 2), (3, 1)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn to_channel_targets_converts_offset_to_one_indexed_channel() {
        let sparse = SparseChannels::from_pairs(vec![(0, 255)]).unwrap();
        let targets = sparse.to_channel_targets(2);
        assert_eq!(targets[0].universe, 2);
        assert_eq!(targets[0].channel, 1);
        assert_eq!(targets[0].value, 255);
    }

    fn sample_list() -> CueList {
        CueList {
            id: "list-1".into(),
            name: "Act One".into(),
            cues: vec![
                Cue {
                    id: "c1".into(),
                    name: "Cue 1".into(),
                    number: 1.0,
                    scene_id: None,
                    overrides: SparseChannels::default(),
                    fade_in: Duration::from_secs(1),
                    fade_behavior: FadeBehavior::Fade,
                    easing: EasingKind::Linear,
                    follow: None,
                },
                Cue {
                    id: "c2".into(),
                    name: "Cue 2".into(),
                    number: 2.0,
                    scene_id: None,
                    overrides: SparseChannels::default(),
                    fade_in: Duration::from_secs(1),
                    fade_behavior: FadeBehavior::Fade,
                    easing: EasingKind::Linear,
                    follow: None,
                },
            ],
            loop_to_index: Some(0),
        }
    }

    #[test]
    fn next_index_loops_back_when_configured() {
        let list = sample_list();
        assert_eq!(list.next_index(0), Some(1));
        assert_eq!(list.next_index(1), Some(0));
    }

    #[test]
    fn previous_index_stops_at_the_start() {
        let list = sample_list();
        assert_eq!(list.previous_index(0), None);
        assert_eq!(list.previous_index(1), Some(0));
    }

    #[test]
    fn lookup_by_name_and_number() {
        let list = sample_list();
        assert_eq!(list.index_of_name("Cue 2").unwrap(), 1);
        assert_eq!(list.index_of_number(1.0).unwrap(), 0);
        assert!(list.index_of_name("missing").is_err());
    }
}
