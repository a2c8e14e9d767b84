//! TCP front end of the authority.
//!
//! Each accepted connection gets a uuid, a reader loop that forwards control
//! commands to the authority, and a writer task that merges direct replies
//! with the broadcast fan-out.

use std::net::SocketAddr;
use std::sync::Arc;
use syncbeat_core::{ConnectionId, WallClock};
use syncbeat_protocol::{
    ClientMessage, Envelope, FrameReader, FrameWriter, MessageTransport, Pong, ProtocolError,
    RuntimeClock, ServerMessage, TransportListener,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use crate::authority::{AuthorityHandle, BeatAuthority};
use crate::broadcast::{Broadcaster, Outbound};
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::presets::{InMemoryPresetStore, PresetNotifier, PresetStore};

pub struct BeatServer {
    listener: TransportListener,
    authority: AuthorityHandle,
    broadcaster: Broadcaster,
    presets: PresetNotifier,
    clock: Arc<dyn WallClock>,
}

impl BeatServer {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        Self::bind_with_clock(config, Arc::new(RuntimeClock::new())).await
    }

    pub async fn bind_with_clock(config: ServerConfig, clock: Arc<dyn WallClock>) -> Result<Self> {
        let store: Arc<dyn PresetStore> = Arc::new(InMemoryPresetStore::new(Arc::clone(&clock)));
        Self::bind_with_store(config, clock, store).await
    }

    pub async fn bind_with_store(
        config: ServerConfig,
        clock: Arc<dyn WallClock>,
        store: Arc<dyn PresetStore>,
    ) -> Result<Self> {
        config.validate()?;
        let listener = TransportListener::bind(config.bind_addr, config.max_frame_bytes).await?;
        let broadcaster = Broadcaster::new(config.event_capacity, Arc::clone(&clock));
        let (authority, _authority_task) =
            BeatAuthority::from_config(&config, broadcaster.clone()).spawn();
        let presets = PresetNotifier::new(store, broadcaster.clone());

        tracing::info!(
            "Beat server listening on {} ({:?}, {:?})",
            listener.local_addr()?,
            config.start_mode,
            config.beat_delivery
        );

        Ok(Self {
            listener,
            authority,
            broadcaster,
            presets,
            clock,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn authority(&self) -> AuthorityHandle {
        self.authority.clone()
    }

    pub fn presets(&self) -> PresetNotifier {
        self.presets.clone()
    }

    /// Accept connections until the listener fails.
    pub async fn run(self) -> Result<()> {
        loop {
            let (transport, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(ProtocolError::Io(e)) if is_transient_accept_error(&e) => {
                    tracing::warn!("Accept failed: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let id = ConnectionId::new(uuid::Uuid::new_v4().to_string());
            tracing::info!("Connection {} from {}", id, addr);
            let connection = Connection {
                id,
                authority: self.authority.clone(),
                clock: Arc::clone(&self.clock),
            };
            let fanout = self.broadcaster.subscribe();
            tokio::spawn(connection.serve(transport, fanout));
        }
    }

    /// Run until `shutdown` resolves. Dropping the server stops the authority.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                tracing::info!("Beat server shutting down");
                Ok(())
            }
        }
    }
}

impl Drop for BeatServer {
    fn drop(&mut self) {
        self.authority.shutdown().ok();
    }
}

fn is_transient_accept_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::Interrupted
    )
}

struct Connection {
    id: ConnectionId,
    authority: AuthorityHandle,
    clock: Arc<dyn WallClock>,
}

impl Connection {
    async fn serve(self, transport: MessageTransport, fanout: broadcast::Receiver<Outbound>) {
        let (reader, writer) = transport.split();
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_loop(
            self.id.clone(),
            Arc::clone(&self.clock),
            writer,
            direct_rx,
            fanout,
        ));

        if let Err(e) = self.read_loop(reader, &direct_tx).await {
            tracing::warn!("Connection {} closed with error: {}", self.id, e);
        }

        drop(direct_tx);
        self.authority.disconnect(&self.id).ok();
        if writer_task.await.is_err() {
            tracing::debug!("Writer for {} did not finish cleanly", self.id);
        }
        tracing::info!("Connection {} closed", self.id);
    }

    async fn read_loop(
        &self,
        mut reader: FrameReader<OwnedReadHalf>,
        direct: &mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<()> {
        loop {
            let envelope: Envelope<ClientMessage> = match reader.recv().await {
                Ok(envelope) => envelope,
                Err(e) if e.is_disconnect() => return Ok(()),
                Err(ProtocolError::Json(e)) => {
                    tracing::warn!("Malformed message from {}: {}", self.id, e);
                    let _ = direct.send(ServerMessage::error(format!("Malformed message: {e}")));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let received_at = self.clock.now_ms() as f64;
            tracing::debug!("{} <- {}", self.id, envelope.message.kind());

            if let Some(reply) = self.dispatch(envelope.message, received_at).await? {
                if direct.send(reply).is_err() {
                    return Ok(());
                }
            }
        }
    }

    /// Returns the message to send back to this connection only, if any.
    async fn dispatch(&self, message: ClientMessage, received_at: f64) -> Result<Option<ServerMessage>> {
        let outcome = match message {
            ClientMessage::Ping(ping) => {
                return Ok(Some(ServerMessage::Pong(Pong {
                    client_send_time: ping.timestamp,
                    server_receive_time: received_at,
                    server_send_time: self.clock.now_ms() as f64,
                })));
            }
            ClientMessage::UserConnected(join) => self.authority.join(&self.id, join).await.map(|_| ()),
            ClientMessage::ClientReady(_) => self.authority.ready(&self.id),
            ClientMessage::MetronomeStart(_) => self.authority.request_start(&self.id).await.map(|_| ()),
            ClientMessage::MetronomeStop(_) => self.authority.request_stop(&self.id).await,
            ClientMessage::MetronomeUpdate(patch) => {
                self.authority.request_update(&self.id, patch).await.map(|_| ())
            }
        };

        match outcome {
            Ok(()) => Ok(None),
            Err(ServerError::AuthorityClosed) => Err(ServerError::AuthorityClosed),
            Err(e) => {
                tracing::warn!("Command from {} rejected: {}", self.id, e);
                Ok(Some(ServerMessage::error(e.client_message())))
            }
        }
    }
}

async fn write_loop(
    id: ConnectionId,
    clock: Arc<dyn WallClock>,
    mut writer: FrameWriter<OwnedWriteHalf>,
    mut direct: mpsc::UnboundedReceiver<ServerMessage>,
    mut fanout: broadcast::Receiver<Outbound>,
) {
    loop {
        let sent = tokio::select! {
            reply = direct.recv() => match reply {
                Some(message) => writer.send(&Envelope::new(message, clock.now_ms())).await,
                None => break,
            },
            out = fanout.recv() => match out {
                Ok(out) if out.target.includes(&id) => writer.send(out.envelope.as_ref()).await,
                Ok(_) => Ok(()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Connection {} lagged, skipped {} message(s)", id, skipped);
                    Ok(())
                }
                Err(RecvError::Closed) => break,
            },
        };
        if let Err(e) = sent {
            if !e.is_disconnect() {
                tracing::warn!("Send to {} failed: {}", id, e);
            }
            break;
        }
    }
    writer.shutdown().await.ok();
}
