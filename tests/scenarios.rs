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

//! End-to-end scenarios exercising the DMX, fade, and playback engines
//! together through the public API, the way a real session would drive them.

use std::sync::Arc;
use std::time::Duration;

use lumen_core::bus::{Bus, Message, Topic};
use lumen_core::dmx::{DmxConfig, DmxEngine};
use lumen_core::easing::EasingKind;
use lumen_core::fade::{ChannelTarget, FadeEngine};
use lumen_core::playback::cue::{Cue, CueList, FadeBehavior, SparseChannels};
use lumen_core::playback::storage::{InMemorySceneStore, Scene, SceneStore};
use lumen_core::playback::PlaybackEngine;

async fn simulated_engine() -> (Arc<Bus>, DmxEngine) {
    let bus = Arc::new(Bus::new());
    let dmx = DmxEngine::start(
        DmxConfig {
            enabled: false,
            ..Default::default()
        },
        bus.clone(),
    )
    .await
    .expect("engine should start in simulation mode");
    (bus, dmx)
}

#[tokio::test]
async fn setting_a_channel_clamps_and_publishes_a_frame() {
    let (bus, dmx) = simulated_engine().await;
    let mut sub = bus.subscribe(Topic::DmxFrame, "", 8).await;

    dmx.set_channel(1, 1, 255).await.unwrap();
    dmx.force_immediate_transmission().await;

    let msg = sub.receiver.recv().await.expect("a frame should be published");
    match msg {
        Message::DmxFrame { universe, channels } => {
            assert_eq!(universe, 1);
            assert_eq!(channels[0], 255);
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn out_of_range_reads_and_writes_are_rejected() {
    let (_bus, dmx) = simulated_engine().await;
    assert!(dmx.set_channel(0, 1, 10).await.is_err());
    assert!(dmx.set_channel(1, 0, 10).await.is_err());
    assert!(dmx.set_channel(1, 513, 10).await.is_err());
    assert!(dmx.set_channel(9, 1, 10).await.is_err());
}

#[tokio::test]
async fn fading_two_channels_converges_to_their_targets() {
    let (_bus, dmx) = simulated_engine().await;
    let fade = FadeEngine::start(dmx.clone()).await;

    dmx.set_channel(1, 1, 0).await.unwrap();
    dmx.set_channel(1, 2, 255).await.unwrap();

    fade.fade_channels(
        &[
            ChannelTarget {
                universe: 1,
                channel: 1,
                value: 255,
            },
            ChannelTarget {
                universe: 1,
                channel: 2,
                value: 0,
            },
        ],
        Duration::from_millis(150),
        EasingKind::Linear,
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(220)).await;

    assert_eq!(dmx.get_channel(1, 1).await.unwrap(), 255);
    assert_eq!(dmx.get_channel(1, 2).await.unwrap(), 0);
}

#[tokio::test]
async fn a_second_fade_takes_over_a_channel_mid_flight() {
    let (_bus, dmx) = simulated_engine().await;
    let fade = FadeEngine::start(dmx.clone()).await;

    dmx.set_channel(1, 10, 0).await.unwrap();
    fade.fade_channels(
        &[ChannelTarget {
            universe: 1,
            channel: 10,
            value: 255,
        }],
        Duration::from_secs(2),
        EasingKind::Linear,
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    // Take over mid-flight with an instant snap to a different target.
    fade.snap_channels(&[ChannelTarget {
        universe: 1,
        channel: 10,
        value: 10,
    }])
    .await
    .unwrap();

    assert_eq!(dmx.get_channel(1, 10).await.unwrap(), 10);

    // The original fade must not keep running and overwrite the snap.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(dmx.get_channel(1, 10).await.unwrap(), 10);
}

async fn playback_harness() -> (Arc<Bus>, DmxEngine, PlaybackEngine) {
    let (bus, dmx) = simulated_engine().await;
    let fade = FadeEngine::start(dmx.clone()).await;
    let scenes = Arc::new(InMemorySceneStore::default());
    scenes.put_scene(Scene {
        id: "wash-warm".into(),
        name: "Warm Wash".into(),
        values: vec![(1, 1, 180), (1, 2, 120)],
    });
    scenes.put_scene(Scene {
        id: "wash-cold".into(),
        name: "Cold Wash".into(),
        values: vec![(1, 1, 20), (1, 2, 220)],
    });
    let scenes: Arc<dyn SceneStore> = scenes;
    let playback = PlaybackEngine::new(fade, dmx.clone(), bus.clone(), scenes);
    (bus, dmx, playback)
}

#[tokio::test]
async fn cue_list_playback_walks_cues_in_order_with_wraparound() {
    let (_bus, dmx, playback) = playback_harness().await;

    let cues = vec![
        Cue {
            id: "c1".into(),
            name: "Warm".into(),
            number: 1.0,
            scene_id: Some("wash-warm".into()),
            overrides: SparseChannels::default(),
            fade_in: Duration::from_millis(0),
            fade_behavior: FadeBehavior::Snap,
            easing: EasingKind::Linear,
            follow: None,
        },
        Cue {
            id: "c2".into(),
            name: "Cold".into(),
            number: 2.0,
            scene_id: Some("wash-cold".into()),
            overrides: SparseChannels::default(),
            fade_in: Duration::from_millis(0),
            fade_behavior: FadeBehavior::Snap,
            easing: EasingKind::Linear,
            follow: None,
        },
    ];
    playback
        .register_cue_list(CueList {
            id: "act-1".into(),
            name: "Act One".into(),
            cues,
            loop_to_index: Some(0),
        })
        .await;

    playback.start_cue_list("act-1").await.unwrap();
    assert_eq!(dmx.get_channel(1, 1).await.unwrap(), 180);

    playback.next_cue("act-1").await.unwrap();
    assert_eq!(dmx.get_channel(1, 1).await.unwrap(), 20);

    // Wraps back to the first cue per the configured loop target.
    playback.next_cue("act-1").await.unwrap();
    assert_eq!(dmx.get_channel(1, 1).await.unwrap(), 180);
}

#[tokio::test]
async fn a_cue_with_a_fade_interpolates_before_settling() {
    let (_bus, dmx, playback) = playback_harness().await;

    let cue = Cue {
        id: "c1".into(),
        name: "Slow Warm".into(),
        number: 1.0,
        scene_id: Some("wash-warm".into()),
        overrides: SparseChannels::default(),
        fade_in: Duration::from_millis(150),
        fade_behavior: FadeBehavior::Fade,
        easing: EasingKind::Linear,
        follow: None,
    };
    playback
        .register_cue_list(CueList {
            id: "act-1".into(),
            name: "Act One".into(),
            cues: vec![cue],
            loop_to_index: None,
        })
        .await;

    dmx.set_channel(1, 1, 0).await.unwrap();
    playback.start_cue_list("act-1").await.unwrap();

    tokio::time::sleep(Duration::from_millis(230)).await;
    assert_eq!(dmx.get_channel(1, 1).await.unwrap(), 180);

    let status = playback.get_playback_state("act-1").await.unwrap();
    assert_eq!(status.current_cue_name.as_deref(), Some("Slow Warm"));
}
