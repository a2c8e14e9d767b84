//! Wire protocol between the beat authority and its participants.
//!
//! Messages travel as `{type, payload, timestamp}` JSON envelopes inside
//! length-prefixed TCP frames.
//!
//! ```ignore
//! use syncbeat_protocol::{ClientMessage, Envelope, MessageTransport, Ping};
//!
//! let (mut reader, mut writer) = MessageTransport::connect("127.0.0.1:3000", 65536).await?.split();
//! writer.send(&Envelope::new(ClientMessage::Ping(Ping { timestamp: 0.0 }), 0)).await?;
//! ```

mod clock;
pub use clock::RuntimeClock;

pub mod error;
pub use error::{ProtocolError, Result};

mod envelope;
pub use envelope::Envelope;

pub mod message;
pub use message::{
    ClientMessage, DisconnectNotice, Empty, ErrorNotice, Join, Ping, Pong, PresetRemoved,
    ReadyNotice, ServerMessage,
};

mod state;
pub use state::MetronomeState;

mod transport;
pub use transport::{
    FrameReader, FrameWriter, MessageTransport, TransportListener, DEFAULT_MAX_FRAME_BYTES,
};
