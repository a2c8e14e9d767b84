use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Core(#[from] syncbeat_core::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] syncbeat_protocol::ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sync probe unanswered after {timeout_ms}ms")]
    ProbeTimeout { timeout_ms: u64 },

    #[error("No open connection to the authority")]
    TransportUnavailable,

    #[error("Invalid client config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
