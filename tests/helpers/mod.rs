//! Test helpers and fixtures for syncbeat integration tests
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `GRID_EPSILON_SECS` (1e-6): Scheduled audio times on an exact grid
//! - `OFFSET_TOLERANCE_MS` (1.0): Clock offset over a simulated symmetric link
//! - `LOOPBACK_TOLERANCE_MS` (50.0): Real localhost measurements

#![allow(dead_code)]

pub mod tolerances;

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use syncbeat::prelude::*;
use syncbeat::server::{Broadcaster, Outbound};
use syncbeat::{AuthorityHandle, BeatAuthority, ManualClock, PresetNotifier, ServerMessage};
use syncbeat::server::AuthoritySettings;
use syncbeat::SharedBeatConfig;
use tokio::sync::{broadcast, mpsc};

pub use tolerances::*;

/// Authority clock start for detached tests.
pub const TEST_EPOCH_MS: i64 = 1_700_000_000_000;

/// Audio trigger that records `(sound, is_accent, at)`.
#[derive(Default)]
pub struct RecordingTrigger {
    hits: Mutex<Vec<(SoundId, bool, f64)>>,
}

impl RecordingTrigger {
    pub fn hits(&self) -> Vec<(SoundId, bool, f64)> {
        self.hits.lock().clone()
    }

    pub fn clear(&self) {
        self.hits.lock().clear();
    }
}

impl AudioTrigger for RecordingTrigger {
    fn play(&self, sound: SoundId, is_accent: bool, at: f64) {
        self.hits.lock().push((sound, is_accent, at));
    }
}

/// A `BeatAuthority` that is not spawned: commands are plain method calls,
/// timers are recorded but never fire on their own.
pub struct DetachedAuthority {
    pub authority: BeatAuthority,
    pub clock: ManualClock,
    pub fanout: broadcast::Receiver<Outbound>,
}

pub fn detached_authority(settings: AuthoritySettings, initial: SharedBeatConfig) -> DetachedAuthority {
    let clock = ManualClock::new(TEST_EPOCH_MS);
    let broadcaster = Broadcaster::new(1024, Arc::new(clock.clone()));
    let fanout = broadcaster.subscribe();
    DetachedAuthority {
        authority: BeatAuthority::new(settings, initial, broadcaster),
        clock,
        fanout,
    }
}

/// Every message published so far, in order.
pub fn drain(fanout: &mut broadcast::Receiver<Outbound>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(outbound) = fanout.try_recv() {
        out.push(outbound.envelope.message.clone());
    }
    out
}

/// A bound authority on an ephemeral localhost port, running on its own task.
pub struct TestServer {
    pub addr: SocketAddr,
    pub authority: AuthorityHandle,
    pub presets: PresetNotifier,
    task: tokio::task::JoinHandle<syncbeat::server::Result<()>>,
}

impl TestServer {
    pub async fn start(config: ServerConfig) -> TestServer {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..config
        };
        let server = BeatServer::bind(config).await.expect("bind test server");
        let addr = server.local_addr().unwrap();
        let authority = server.authority();
        let presets = server.presets();
        let task = tokio::spawn(server.run());
        TestServer {
            addr,
            authority,
            presets,
            task,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Fast-probing client config for localhost.
pub fn client_config(addr: SocketAddr, name: &str, role: Role) -> ClientConfig {
    ClientConfig::new(addr.to_string(), name, role)
        .with_probe_count(3)
        .with_probe_interval(Duration::from_millis(5))
        .with_probe_timeout(Duration::from_millis(1_000))
}

pub struct TestClient {
    pub client: SyncClient,
    pub events: mpsc::Receiver<ClientEvent>,
    pub trigger: Arc<RecordingTrigger>,
}

pub async fn connect(addr: SocketAddr, name: &str, role: Role) -> TestClient {
    let trigger = Arc::new(RecordingTrigger::default());
    let (client, events) = SyncClient::connect(
        client_config(addr, name, role),
        ClientRuntime::new(trigger.clone()),
    )
    .await
    .expect("client connect");
    TestClient {
        client,
        events,
        trigger,
    }
}

/// Wait for the first event accepted by `pick`, skipping the rest.
pub async fn next_matching<T>(
    events: &mut mpsc::Receiver<ClientEvent>,
    mut pick: impl FnMut(ClientEvent) -> Option<T>,
) -> T {
    let wait = async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if let Some(found) = pick(event) {
                return found;
            }
        }
    };
    tokio::time::timeout(Duration::from_millis(EVENT_TIMEOUT_MS), wait)
        .await
        .expect("timed out waiting for event")
}

/// Wait for a `metronome_state` whose phase satisfies `want`.
pub async fn next_state(
    events: &mut mpsc::Receiver<ClientEvent>,
    want: impl Fn(&Phase) -> bool,
) -> MetronomeState {
    next_matching(events, |event| match event {
        ClientEvent::State(state) if want(&state.phase) => Some(state),
        _ => None,
    })
    .await
}
