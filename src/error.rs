//! Centralized error type for the syncbeat umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] syncbeat_core::Error),

    #[error("Protocol: {0}")]
    Protocol(#[from] syncbeat_protocol::ProtocolError),

    #[cfg(feature = "server")]
    #[error("Server: {0}")]
    Server(#[from] syncbeat_server::ServerError),

    #[cfg(feature = "client")]
    #[error("Client: {0}")]
    Client(#[from] syncbeat_client::ClientError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Authorization or validation refusal of a single command.
    pub fn is_rejection(&self) -> bool {
        match self {
            Error::Core(e) => matches!(e, syncbeat_core::Error::Unauthorized { .. }) || e.is_invalid_config(),
            #[cfg(feature = "server")]
            Error::Server(syncbeat_server::ServerError::Core(e)) => {
                matches!(e, syncbeat_core::Error::Unauthorized { .. }) || e.is_invalid_config()
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
