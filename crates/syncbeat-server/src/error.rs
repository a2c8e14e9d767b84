//! Error types for the beat authority

use syncbeat_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] syncbeat_core::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Beat authority has shut down")]
    AuthorityClosed,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Preset with id '{0}' not found")]
    PresetNotFound(String),
}

impl ServerError {
    /// Message sent back to the client that caused the error.
    pub fn client_message(&self) -> String {
        match self {
            ServerError::Core(e) => e.to_string(),
            ServerError::AuthorityClosed => "Server is shutting down".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<toml::de::Error> for ServerError {
    fn from(e: toml::de::Error) -> Self {
        ServerError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
