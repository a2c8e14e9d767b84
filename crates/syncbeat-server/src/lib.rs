//! # Syncbeat Server
//!
//! The beat authority: one process that owns the shared tempo, meter and
//! phase, decides when a synchronized start happens, and fans state out to
//! every connected client.
//!
//! ```ignore
//! use syncbeat_server::{BeatServer, ServerConfig};
//!
//! let server = BeatServer::bind(ServerConfig::default()).await?;
//! server.run().await?;
//! ```
//!
//! Control commands (start, stop, update) are accepted only from `master`
//! participants. Preset CRUD lives beside the authority in
//! [`PresetNotifier`] and never touches beat state.

mod authority;
mod broadcast;
pub mod config;
pub mod error;
mod presets;
mod registry;
mod server;

pub use authority::{AuthorityCommand, AuthorityHandle, AuthoritySettings, BeatAuthority, TimerSlot};
pub use broadcast::{Broadcaster, Outbound, Target};
pub use config::{BeatDelivery, ServerConfig, StartMode};
pub use error::{Result, ServerError};
pub use presets::{InMemoryPresetStore, PresetNotifier, PresetStore};
pub use registry::ConnectionRegistry;
pub use server::BeatServer;
