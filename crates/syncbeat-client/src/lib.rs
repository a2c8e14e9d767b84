//! # Syncbeat Client
//!
//! Participant side of a syncbeat session:
//!
//! - [`ClockSyncEstimator`] measures latency and clock offset against the
//!   authority with ping/pong probes.
//! - [`LocalBeatPlayer`] turns a broadcast start instant into audio triggers
//!   on a look-ahead schedule, independent of the network once armed.
//! - [`SyncClient`] runs the login sequence and the background connection
//!   loop, and surfaces notifications as [`ClientEvent`]s.
//!
//! ```ignore
//! use syncbeat_client::{ClientConfig, ClientRuntime, SyncClient};
//! use syncbeat_core::Role;
//!
//! let config = ClientConfig::new("127.0.0.1:3000", "Ana", Role::Master);
//! let (client, mut events) = SyncClient::connect(config, ClientRuntime::new(trigger)).await?;
//! client.start_metronome()?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod config;
mod connection;
pub mod error;
mod player;
mod sync;

pub use config::ClientConfig;
pub use connection::{ClientEvent, ClientRuntime, SyncClient};
pub use error::{ClientError, Result};
pub use player::{AudioClock, AudioTrigger, LocalBeatPlayer, PlayerSettings, SystemAudioClock};
pub use sync::{ClockSyncEstimator, ProbeTransport, SharedClockEstimate};
