//! Local scheduler integration tests
//!
//! Beat grid placement, late-start catch-up and cancellation, on paused
//! tokio time with a recording audio trigger.

use crate::helpers::*;
use approx::assert_relative_eq;
use std::sync::Arc;
use std::time::Duration;
use syncbeat::client::{PlayerSettings, SharedClockEstimate, SystemAudioClock};
use syncbeat::prelude::*;
use syncbeat::{AudioClock, LocalBeatPlayer, LookAheadScheduler, RuntimeClock, StartPlan};

struct Rig {
    player: LocalBeatPlayer,
    trigger: Arc<RecordingTrigger>,
    audio: SystemAudioClock,
    clock: RuntimeClock,
}

fn rig() -> Rig {
    let clock = RuntimeClock::anchored_at(TEST_EPOCH_MS);
    let audio = SystemAudioClock::new();
    let trigger = Arc::new(RecordingTrigger::default());
    let player = LocalBeatPlayer::new(
        PlayerSettings::default(),
        SharedClockEstimate::new(Arc::new(clock)),
        Arc::new(audio),
        trigger.clone(),
    );
    Rig {
        player,
        trigger,
        audio,
        clock,
    }
}

fn state(bpm: u32, numerator: u32, phase: Phase) -> MetronomeState {
    MetronomeState {
        bpm,
        time_signature: TimeSignature::new(numerator, 4),
        accent_first: true,
        phase,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_120_bpm_grid_from_start_instant() {
    let rig = rig();
    let start = rig.clock.now_ms() + 3_500;
    let t = rig.audio.now() + 3.5;

    rig.player
        .on_config_broadcast(state(120, 4, Phase::Preparing { start_instant: start }));
    // The Playing broadcast for the same instant must not re-arm.
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    rig.player.on_config_broadcast(state(
        120,
        4,
        Phase::Playing {
            start_instant: start,
            current_beat: 1,
        },
    ));
    tokio::time::sleep(Duration::from_millis(2_100)).await;

    let hits = rig.trigger.hits();
    assert_eq!(hits.len(), 5);
    let expected = [
        (true, t),
        (false, t + 0.5),
        (false, t + 1.0),
        (false, t + 1.5),
        (true, t + 2.0),
    ];
    for ((_, accent, at), (want_accent, want_at)) in hits.iter().zip(expected) {
        assert_eq!(*accent, want_accent);
        assert_relative_eq!(*at, want_at, epsilon = GRID_EPSILON_SECS);
    }
}

#[tokio::test(start_paused = true)]
async fn test_late_start_catches_up_to_current_beat() {
    let rig = rig();
    let start = rig.clock.now_ms() - 2_300;

    rig.player.on_config_broadcast(state(
        120,
        4,
        Phase::Playing {
            start_instant: start,
            current_beat: 1,
        },
    ));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(rig.player.is_running());
    assert_eq!(rig.player.current_beat(), 1);
    let hits = rig.trigger.hits();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].1);
}

#[test]
fn test_catch_up_plan_for_late_broadcasts() {
    let now = TEST_EPOCH_MS as f64;
    assert_eq!(
        StartPlan::for_start(TEST_EPOCH_MS - 2_300, now, 120, 4),
        StartPlan::CatchUp {
            beat: 1,
            elapsed_ms: 2_300.0
        }
    );
    assert!(matches!(
        StartPlan::for_start(TEST_EPOCH_MS - 1_200, now, 120, 4),
        StartPlan::CatchUp { beat: 3, .. }
    ));
    assert!(matches!(
        StartPlan::for_start(TEST_EPOCH_MS - 1_200, now, 120, 3),
        StartPlan::CatchUp { beat: 3, .. }
    ));
    assert!(matches!(
        StartPlan::for_start(TEST_EPOCH_MS, now, 120, 4),
        StartPlan::CatchUp { beat: 1, .. }
    ));
    assert_eq!(
        StartPlan::for_start(TEST_EPOCH_MS + 750, now, 120, 4),
        StartPlan::Delayed { delay_ms: 750.0 }
    );
}

#[test]
fn test_look_ahead_commits_only_inside_window() {
    let mut scheduler = LookAheadScheduler::new(0.1);
    scheduler.start(10.0, 1, 120, 4, true);

    assert!(scheduler.poll(9.85).is_empty());
    let due = scheduler.poll(9.95);
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].beat, 1);
    assert!(due[0].is_accent);

    // A stalled poll commits everything it missed, in order.
    let due = scheduler.poll(11.45);
    let beats: Vec<u32> = due.iter().map(|b| b.beat).collect();
    assert_eq!(beats, vec![2, 3, 4]);
    assert_relative_eq!(due[2].time, 11.5, epsilon = GRID_EPSILON_SECS);
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_playback_fires_nothing_more() {
    let rig = rig();
    let start = rig.clock.now_ms() + 100;
    rig.player.on_config_broadcast(state(
        180,
        3,
        Phase::Playing {
            start_instant: start,
            current_beat: 1,
        },
    ));
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let fired = rig.trigger.hits().len();
    assert!(fired >= 3);

    rig.player.on_config_broadcast(state(180, 3, Phase::Idle));
    tokio::time::sleep(Duration::from_millis(5_000)).await;

    assert_eq!(rig.trigger.hits().len(), fired);
    assert_eq!(rig.player.current_beat(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_accent_and_sound_apply_live() {
    let rig = rig();
    let start = rig.clock.now_ms() + 200;
    let playing = Phase::Playing {
        start_instant: start,
        current_beat: 1,
    };
    rig.player.on_config_broadcast(state(120, 2, playing));
    tokio::time::sleep(Duration::from_millis(1_050)).await;

    let mut quiet = state(120, 2, playing);
    quiet.accent_first = false;
    quiet.sound = SoundId::Beep;
    rig.player.on_config_broadcast(quiet);
    rig.trigger.clear();
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    let hits = rig.trigger.hits();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|(sound, accent, _)| *sound == SoundId::Beep && !accent));
}
