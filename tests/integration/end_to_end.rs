//! End-to-end tests over localhost TCP
//!
//! A real authority and real clients on wall-clock time. Assertions on
//! timing are loose; the exact timing properties live in the scheduler and
//! authority tests.

use crate::helpers::*;
use approx::assert_relative_eq;
use std::time::Duration;
use syncbeat::client::ClientError;
use syncbeat::prelude::*;
use syncbeat::{PresetDraft, ServerConfig};

fn quick_start() -> ServerConfig {
    ServerConfig {
        countdown_seconds: 0,
        min_latency_buffer_ms: 300,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_master_drives_followers() {
    let server = TestServer::start(quick_start()).await;

    let mut master = connect(server.addr, "Ana", Role::Master).await;
    let initial = next_state(&mut master.events, Phase::is_idle).await;
    assert_eq!(initial.bpm, 120);

    let mut follower = connect(server.addr, "Ben", Role::Follower).await;
    next_state(&mut follower.events, Phase::is_idle).await;
    let joined = next_matching(&mut master.events, |e| match e {
        ClientEvent::ParticipantJoined(session) => Some(session),
        _ => None,
    })
    .await;
    assert_eq!(joined.name, "Ben");
    assert_eq!(joined.role, Role::Follower);

    // Followers are refused, and only they hear about it.
    follower.client.start_metronome().unwrap();
    let refusal = next_matching(&mut follower.events, |e| match e {
        ClientEvent::Rejected(message) => Some(message),
        _ => None,
    })
    .await;
    assert!(refusal.contains("master"), "{refusal}");

    master.client.update(ConfigPatch::default().bpm(240)).unwrap();
    next_state(&mut follower.events, Phase::is_idle).await;

    master.client.start_metronome().unwrap();
    let preparing_master = next_state(&mut master.events, Phase::is_preparing).await;
    let preparing_follower = next_state(&mut follower.events, Phase::is_preparing).await;
    assert_eq!(
        preparing_master.start_instant(),
        preparing_follower.start_instant()
    );
    assert_eq!(preparing_follower.bpm, 240);

    let playing = next_state(&mut follower.events, Phase::is_playing).await;
    assert_eq!(playing.start_instant(), preparing_master.start_instant());
    assert_eq!(playing.phase.current_beat(), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    for participant in [&master, &follower] {
        let hits = participant.trigger.hits();
        assert!(hits.len() >= 2, "only {} beats", hits.len());
        assert!(hits[0].1, "first beat must be accented");
        assert!(participant.client.player().is_running());
    }

    master.client.stop_metronome().unwrap();
    next_state(&mut follower.events, Phase::is_idle).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!follower.client.player().is_running());
    let settled = follower.trigger.hits().len();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(follower.trigger.hits().len(), settled);

    let participants = server.authority.participants().await.unwrap();
    assert_eq!(participants.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readiness_and_disconnect_notices() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut master = connect(server.addr, "Ana", Role::Master).await;
    next_state(&mut master.events, Phase::is_idle).await;
    let mut follower = connect(server.addr, "Ben", Role::Follower).await;

    let follower_id = next_matching(&mut master.events, |e| match e {
        ClientEvent::ParticipantJoined(session) => Some(session.id),
        _ => None,
    })
    .await;

    follower.client.ready().unwrap();
    let notice = next_matching(&mut master.events, |e| match e {
        ClientEvent::ParticipantReady(notice) => Some(notice),
        _ => None,
    })
    .await;
    assert_eq!(notice.client_id, follower_id);
    assert_eq!(notice.name, "Ben");

    follower.client.shutdown().await;
    assert!(!follower.client.is_connected());
    assert!(matches!(
        follower.client.start_metronome(),
        Err(ClientError::TransportUnavailable)
    ));

    let left = next_matching(&mut master.events, |e| match e {
        ClientEvent::ParticipantLeft(id) => Some(id),
        _ => None,
    })
    .await;
    assert_eq!(left, follower_id);

    let gone = next_matching(&mut follower.events, |e| match e {
        ClientEvent::Disconnected { reason } => Some(reason),
        _ => None,
    })
    .await;
    assert_eq!(gone.as_deref(), Some("client shut down"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_loopback_clock_sync() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut client = connect(server.addr, "Ana", Role::Follower).await;

    let estimate = next_matching(&mut client.events, |e| match e {
        ClientEvent::Connected(estimate) => Some(estimate),
        _ => None,
    })
    .await;
    assert_eq!(estimate.samples, 3);
    assert!(estimate.latency_ms >= 0.0);
    assert!(estimate.latency_ms < LOOPBACK_TOLERANCE_MS);
    assert!(estimate.offset_ms.abs() < LOOPBACK_TOLERANCE_MS);

    // The initial state is sent once the login has been registered.
    next_state(&mut client.events, Phase::is_idle).await;

    let session = server
        .authority
        .participants()
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert_relative_eq!(session.latency, estimate.latency_ms, epsilon = 1e-9);
    assert_relative_eq!(session.clock_offset, estimate.offset_ms, epsilon = 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_preset_changes_are_echoed() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut client = connect(server.addr, "Ana", Role::Follower).await;
    next_state(&mut client.events, Phase::is_idle).await;

    let created = server
        .presets
        .create(PresetDraft::new("Waltz", 90, TimeSignature::new(3, 4)))
        .unwrap();
    let echoed = next_matching(&mut client.events, |e| match e {
        ClientEvent::PresetCreated(preset) => Some(preset),
        _ => None,
    })
    .await;
    assert_eq!(echoed, created);

    server.presets.delete(&created.id).unwrap();
    let deleted = next_matching(&mut client.events, |e| match e {
        ClientEvent::PresetDeleted(id) => Some(id),
        _ => None,
    })
    .await;
    assert_eq!(deleted, created.id);

    // Presets never touch the shared beat state.
    let state = server.authority.snapshot().await.unwrap();
    assert_eq!(state.bpm, 120);
    assert_eq!(state.phase, Phase::Idle);
}
