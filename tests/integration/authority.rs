//! Beat authority integration tests
//!
//! Phase lifecycle, master-only control, start idempotence and the
//! stop-mutate-restart sequence, driven through the public authority API.

use crate::helpers::*;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use syncbeat::prelude::*;
use syncbeat::server::{AuthoritySettings, Broadcaster};
use syncbeat::{BeatAuthority, BeatDelivery, ConnectionId, RuntimeClock, ServerMessage, SharedBeatConfig, StartMode};
use syncbeat::protocol::Join;

fn config_with(bpm: u32, numerator: u32) -> SharedBeatConfig {
    SharedBeatConfig {
        bpm,
        time_signature: TimeSignature::new(numerator, 4),
        ..Default::default()
    }
}

fn states(messages: &[ServerMessage]) -> Vec<MetronomeState> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::MetronomeState(state) => Some(state.clone()),
            _ => None,
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Start then stop always lands in Idle with no beat, for any tempo and meter.
    #[test]
    fn prop_start_then_stop_is_idle(bpm in 40u32..=240, numerator in 1u32..=16) {
        let mut h = detached_authority(AuthoritySettings::default(), config_with(bpm, numerator));

        h.authority.request_start(Role::Master).unwrap();
        prop_assert!(h.authority.phase().is_preparing());

        h.authority.request_stop(Role::Master).unwrap();
        prop_assert_eq!(h.authority.phase(), Phase::Idle);
        prop_assert_eq!(h.authority.phase().current_beat(), 0);
        prop_assert_eq!(h.authority.pending_timer(), None);

        let last = states(&drain(&mut h.fanout)).pop().unwrap();
        prop_assert_eq!(last.phase, Phase::Idle);
        prop_assert_eq!(last.bpm, bpm);
    }

    /// Start then stop in legacy immediate mode too.
    #[test]
    fn prop_immediate_start_then_stop_is_idle(bpm in 40u32..=240, numerator in 1u32..=16) {
        let settings = AuthoritySettings {
            start_mode: StartMode::Immediate,
            beat_delivery: BeatDelivery::AuthorityTicks,
            ..Default::default()
        };
        let mut h = detached_authority(settings, config_with(bpm, numerator));

        h.authority.request_start(Role::Master).unwrap();
        prop_assert!(h.authority.phase().is_playing());
        h.authority.request_stop(Role::Master).unwrap();
        prop_assert_eq!(h.authority.phase(), Phase::Idle);
        prop_assert_eq!(h.authority.pending_timer(), None);
    }
}

#[test]
fn test_non_master_cannot_start() {
    for role in [Role::Follower, Role::Admin] {
        let mut h = detached_authority(AuthoritySettings::default(), SharedBeatConfig::default());

        let err = h.authority.request_start(role).unwrap_err();
        assert!(matches!(err, syncbeat::core::Error::Unauthorized { .. }));
        assert_eq!(h.authority.phase(), Phase::Idle);
        assert!(drain(&mut h.fanout).is_empty());
    }
}

#[test]
fn test_non_master_cannot_stop_or_update() {
    let mut h = detached_authority(AuthoritySettings::default(), SharedBeatConfig::default());
    let start = h.authority.request_start(Role::Master).unwrap();
    drain(&mut h.fanout);

    assert!(h.authority.request_stop(Role::Follower).is_err());
    assert!(h
        .authority
        .request_update(Role::Admin, &ConfigPatch::default().bpm(90))
        .is_err());

    assert_eq!(h.authority.phase().start_instant(), Some(start));
    assert_eq!(h.authority.config().bpm, 120);
    assert!(drain(&mut h.fanout).is_empty());
}

#[test]
fn test_invalid_update_changes_nothing() {
    let mut h = detached_authority(AuthoritySettings::default(), SharedBeatConfig::default());
    let before = h.authority.snapshot();

    for patch in [
        ConfigPatch::default().bpm(39),
        ConfigPatch::default().bpm(241),
        ConfigPatch::default().time_signature("17/4"),
        ConfigPatch {
            sound_type: Some("cowbell".into()),
            ..Default::default()
        },
    ] {
        let err = h.authority.request_update(Role::Master, &patch).unwrap_err();
        assert!(err.is_invalid_config(), "{err}");
    }

    assert_eq!(h.authority.snapshot(), before);
    assert!(drain(&mut h.fanout).is_empty());
}

#[test]
fn test_double_start_returns_same_instant() {
    let mut h = detached_authority(AuthoritySettings::default(), SharedBeatConfig::default());

    let first = h.authority.request_start(Role::Master).unwrap();
    let timer = h.authority.pending_timer();
    h.clock.advance(40);
    let second = h.authority.request_start(Role::Master).unwrap();

    assert_eq!(first, second);
    assert_eq!(h.authority.pending_timer(), timer);
    assert_eq!(states(&drain(&mut h.fanout)).len(), 1);
}

#[test]
fn test_start_instant_includes_countdown_and_buffer() {
    let mut h = detached_authority(AuthoritySettings::default(), SharedBeatConfig::default());
    h.authority.join(
        ConnectionId::from("slow"),
        Join {
            name: "Slow".into(),
            role: Role::Follower,
            latency: 400.0,
            clock_offset: 0.0,
        },
    );

    let start = h.authority.request_start(Role::Master).unwrap();
    // 3s countdown + max(2 x 400ms, 500ms)
    assert_eq!(start, TEST_EPOCH_MS + 3_000 + 800);
}

#[test]
fn test_timer_moves_preparing_to_playing() {
    let mut h = detached_authority(AuthoritySettings::default(), SharedBeatConfig::default());
    let start = h.authority.request_start(Role::Master).unwrap();
    let generation = h.authority.pending_timer().unwrap();

    h.clock.set(start);
    h.authority.on_timer(generation);

    assert_eq!(
        h.authority.phase(),
        Phase::Playing {
            start_instant: start,
            current_beat: 1
        }
    );
    let broadcast = states(&drain(&mut h.fanout));
    assert_eq!(broadcast.len(), 2);
    assert!(broadcast[0].phase.is_preparing());
    assert!(broadcast[1].phase.is_playing());
}

#[test]
fn test_stale_timer_after_stop_is_ignored() {
    let mut h = detached_authority(AuthoritySettings::default(), SharedBeatConfig::default());
    h.authority.request_start(Role::Master).unwrap();
    let generation = h.authority.pending_timer().unwrap();
    h.authority.request_stop(Role::Master).unwrap();

    h.authority.on_timer(generation);
    assert_eq!(h.authority.phase(), Phase::Idle);
}

#[test]
fn test_update_while_playing_restarts_once() {
    let mut h = detached_authority(AuthoritySettings::default(), SharedBeatConfig::default());
    let start = h.authority.request_start(Role::Master).unwrap();
    let old_timer = h.authority.pending_timer().unwrap();
    h.clock.set(start);
    h.authority.on_timer(old_timer);
    drain(&mut h.fanout);

    h.clock.advance(2_000);
    let state = h
        .authority
        .request_update(Role::Master, &ConfigPatch::default().bpm(90))
        .unwrap();

    assert_eq!(state.bpm, 90);
    assert!(state.phase.is_preparing());
    let new_start = state.phase.start_instant().unwrap();
    assert!(new_start > start + 2_000);

    let new_timer = h.authority.pending_timer().unwrap();
    assert_ne!(new_timer, old_timer);
    h.authority.on_timer(old_timer);
    assert!(h.authority.phase().is_preparing());

    let broadcast = states(&drain(&mut h.fanout));
    assert_eq!(broadcast.len(), 1);
    assert_eq!(broadcast[0].bpm, 90);
}

#[test]
fn test_update_while_idle_does_not_start() {
    let mut h = detached_authority(AuthoritySettings::default(), SharedBeatConfig::default());
    let state = h
        .authority
        .request_update(
            Role::Master,
            &ConfigPatch::default().time_signature("7/8").sound(SoundId::Wood),
        )
        .unwrap();

    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.beats_per_measure(), 7);
    assert_eq!(state.sound, SoundId::Wood);
    assert_eq!(h.authority.pending_timer(), None);
}

/// Tick mode on a spawned authority: after a tempo change no beat at the old
/// period is ever emitted.
#[tokio::test(start_paused = true)]
async fn test_tick_mode_update_leaves_no_dangling_timer() {
    let clock: Arc<dyn WallClock> = Arc::new(RuntimeClock::anchored_at(TEST_EPOCH_MS));
    let broadcaster = Broadcaster::new(1024, Arc::clone(&clock));
    let mut fanout = broadcaster.subscribe();
    let settings = AuthoritySettings {
        beat_delivery: BeatDelivery::AuthorityTicks,
        ..Default::default()
    };
    let (handle, _task) =
        BeatAuthority::new(settings, SharedBeatConfig::default(), broadcaster).spawn();

    let master = ConnectionId::from("master");
    handle
        .join(
            &master,
            Join {
                name: "Ana".into(),
                role: Role::Master,
                latency: 0.0,
                clock_offset: 0.0,
            },
        )
        .await
        .unwrap();

    let first_start = handle.request_start(&master).await.unwrap();
    tokio::time::sleep(Duration::from_millis((first_start - TEST_EPOCH_MS) as u64 + 1_600)).await;

    let restarted = handle
        .request_update(&master, ConfigPatch::default().bpm(60))
        .await
        .unwrap();
    let second_start = restarted.phase.start_instant().unwrap();
    tokio::time::sleep(Duration::from_millis(
        (second_start - clock.now_ms()) as u64 + 3_500,
    ))
    .await;
    handle.shutdown().unwrap();

    let beats: Vec<BeatEvent> = drain(&mut fanout)
        .into_iter()
        .filter_map(|m| match m {
            ServerMessage::BeatEvent(beat) => Some(beat),
            _ => None,
        })
        .collect();

    let (before, after): (Vec<&BeatEvent>, Vec<&BeatEvent>) = beats
        .iter()
        .partition(|b| b.server_timestamp < second_start);
    assert_eq!(before.len(), 4);
    assert!(before.iter().all(|b| b.server_timestamp < first_start + 2_000));

    assert_eq!(after.len(), 4);
    assert_eq!(after[0].server_timestamp, second_start);
    assert!(after[0].is_accent);
    for pair in after.windows(2) {
        assert_eq!(pair[1].server_timestamp - pair[0].server_timestamp, 1_000);
    }
}
