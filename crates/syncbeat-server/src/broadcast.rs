//! Fan-out of server messages to connection tasks.

use std::sync::Arc;
use syncbeat_core::{ConnectionId, WallClock};
use syncbeat_protocol::{Envelope, ServerMessage};
use tokio::sync::broadcast;

/// Which connections receive an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    AllExcept(ConnectionId),
    Only(ConnectionId),
}

impl Target {
    #[inline]
    pub fn includes(&self, id: &ConnectionId) -> bool {
        match self {
            Target::All => true,
            Target::AllExcept(excluded) => excluded != id,
            Target::Only(only) => only == id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Outbound {
    pub target: Target,
    pub envelope: Arc<Envelope<ServerMessage>>,
}

/// Sending never blocks. A receiver that falls behind skips to the newest frames.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<Outbound>,
    clock: Arc<dyn WallClock>,
}

impl Broadcaster {
    pub fn new(capacity: usize, clock: Arc<dyn WallClock>) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, clock }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.tx.subscribe()
    }

    pub fn clock(&self) -> &Arc<dyn WallClock> {
        &self.clock
    }

    /// Stamp and publish. Returns the number of subscribed connection tasks.
    pub fn send(&self, target: Target, message: ServerMessage) -> usize {
        let kind = message.kind();
        let envelope = Arc::new(Envelope::new(message, self.clock.now_ms()));
        match self.tx.send(Outbound { target, envelope }) {
            Ok(receivers) => {
                tracing::debug!("Broadcast {} to {} subscriber(s)", kind, receivers);
                receivers
            }
            Err(_) => {
                tracing::debug!("Broadcast {} dropped, no subscribers", kind);
                0
            }
        }
    }

    pub fn to_all(&self, message: ServerMessage) -> usize {
        self.send(Target::All, message)
    }

    pub fn to_others(&self, id: &ConnectionId, message: ServerMessage) -> usize {
        self.send(Target::AllExcept(id.clone()), message)
    }

    pub fn to_one(&self, id: &ConnectionId, message: ServerMessage) -> usize {
        self.send(Target::Only(id.clone()), message)
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
