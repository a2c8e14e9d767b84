//! Authority configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use syncbeat_core::{DEFAULT_COUNTDOWN_SECONDS, MAX_COUNTDOWN_SECONDS};
use syncbeat_protocol::DEFAULT_MAX_FRAME_BYTES;

use crate::error::{Result, ServerError};

/// How beats reach the participants once playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeatDelivery {
    /// Clients schedule beats locally from the broadcast start instant.
    #[default]
    ClientScheduled,
    /// The authority also emits a `beat_event` per tick.
    AuthorityTicks,
}

/// How a start request enters `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    /// Idle -> Preparing -> Playing after countdown plus latency buffer.
    #[default]
    Countdown,
    /// Idle -> Playing with a short fixed lead.
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Initial countdown for the shared config.
    pub countdown_seconds: u32,
    /// Lower bound of the latency buffer added to every countdown.
    pub min_latency_buffer_ms: u64,
    pub beat_delivery: BeatDelivery,
    pub start_mode: StartMode,
    /// Lead before the first beat in [`StartMode::Immediate`].
    pub immediate_lead_ms: u64,
    pub max_frame_bytes: usize,
    /// Capacity of the fan-out channel.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            countdown_seconds: DEFAULT_COUNTDOWN_SECONDS,
            min_latency_buffer_ms: 500,
            beat_delivery: BeatDelivery::default(),
            start_mode: StartMode::default(),
            immediate_lead_ms: 200,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            event_capacity: 256,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.countdown_seconds > MAX_COUNTDOWN_SECONDS {
            return Err(ServerError::Config(format!(
                "countdown_seconds must be at most {MAX_COUNTDOWN_SECONDS}"
            )));
        }
        if self.max_frame_bytes < 1024 {
            return Err(ServerError::Config(
                "max_frame_bytes must be at least 1024".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ServerError::Config(
                "event_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}
