//! Error types for syncbeat-core.

use crate::session::Role;
use thiserror::Error;

/// Error type for syncbeat-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unauthorized: role '{role}' may not control the metronome, only the master can")]
    Unauthorized { role: Role },

    #[error("Invalid tempo: {0}. Must be between 40 and 240 BPM")]
    InvalidTempo(u32),

    #[error("Invalid time signature: '{0}'. Expected N/D with N in 1..=16")]
    InvalidTimeSignature(String),

    #[error("Unknown sound: '{0}'. Expected one of click, beep, wood")]
    UnknownSound(String),

    #[error("Invalid countdown: {0}s. Must be at most 60 seconds")]
    InvalidCountdown(u32),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True for every error that rejects a configuration value.
    pub fn is_invalid_config(&self) -> bool {
        !matches!(self, Error::Unauthorized { .. })
    }
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
