//! # Syncbeat - Networked Metronome
//!
//! One master drives a shared beat that many independently clocked
//! participants hear in phase.
//!
//! ## Architecture
//!
//! Syncbeat is an umbrella crate over:
//! - **syncbeat-core** - Beat config, phase FSM, clock-offset math, look-ahead scheduler
//! - **syncbeat-protocol** - `{type, payload, timestamp}` envelope over length-prefixed TCP frames
//! - **syncbeat-server** - Beat authority, connection registry, broadcast fabric, preset notices
//! - **syncbeat-client** - Clock sync estimator, local beat player, login sequence
//!
//! ## Quick Start
//!
//! ```ignore
//! use syncbeat::prelude::*;
//!
//! // Authority
//! let server = BeatServer::bind(ServerConfig::default()).await?;
//! tokio::spawn(server.run());
//!
//! // Participant
//! let config = ClientConfig::new("127.0.0.1:3000", "Ana", Role::Master);
//! let (client, mut events) = SyncClient::connect(config, ClientRuntime::new(trigger)).await?;
//! client.update(ConfigPatch::default().bpm(96))?;
//! client.start_metronome()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Server and client
//! - `server` - Beat authority
//! - `client` - Participant side

mod error;
pub use error::{Error, Result};

/// Re-export of syncbeat-core for direct access
pub use syncbeat_core as core;

/// Re-export of syncbeat-protocol for direct access
pub use syncbeat_protocol as protocol;

pub use syncbeat_core::{
    // Config
    ConfigPatch,
    SharedBeatConfig,
    SoundId,

    // Sessions
    ConnectionId,
    ParticipantSession,
    Role,

    // Presets
    Preset,
    PresetDraft,
    PresetUpdate,

    // Timing
    BeatEvent,
    ClockEstimate,
    LookAheadScheduler,
    Phase,
    StartPlan,
    TimeSignature,

    // Clocks
    ManualClock,
    SystemClock,
    WallClock,
};

pub use syncbeat_protocol::{ClientMessage, Envelope, MetronomeState, RuntimeClock, ServerMessage};

#[cfg(feature = "server")]
pub use syncbeat_server as server;

#[cfg(feature = "server")]
pub use syncbeat_server::{
    AuthorityHandle, BeatAuthority, BeatDelivery, BeatServer, PresetNotifier, PresetStore,
    ServerConfig, StartMode,
};

#[cfg(feature = "client")]
pub use syncbeat_client as client;

#[cfg(feature = "client")]
pub use syncbeat_client::{
    AudioClock, AudioTrigger, ClientConfig, ClientEvent, ClientRuntime, LocalBeatPlayer,
    SyncClient,
};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Error, Result};

    pub use crate::{
        BeatEvent, ConfigPatch, MetronomeState, Phase, Role, SoundId, TimeSignature, WallClock,
    };

    #[cfg(feature = "server")]
    pub use crate::{BeatServer, ServerConfig};

    #[cfg(feature = "client")]
    pub use crate::{AudioTrigger, ClientConfig, ClientEvent, ClientRuntime, SyncClient};
}
