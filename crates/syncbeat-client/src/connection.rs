//! Participant connection.
//!
//! [`SyncClient::connect`] opens the link, measures the clock against the
//! authority, logs in with the estimate, then hands the link to a background
//! loop. The loop feeds `metronome_state` broadcasts to the
//! [`LocalBeatPlayer`] and forwards every notification as a [`ClientEvent`].

use std::sync::Arc;
use std::time::Duration;
use syncbeat_core::{
    AtomicFlag, BeatEvent, ClockEstimate, ConfigPatch, ConnectionId, ParticipantSession, Preset,
    WallClock,
};
use syncbeat_protocol::{
    ClientMessage, Empty, Envelope, FrameReader, FrameWriter, Join, MessageTransport,
    MetronomeState, Ping, Pong, ProtocolError, ReadyNotice, RuntimeClock, ServerMessage,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::player::{AudioClock, AudioTrigger, LocalBeatPlayer, PlayerSettings, SystemAudioClock};
use crate::sync::{ClockSyncEstimator, ProbeTransport, SharedClockEstimate};

type Inbound = std::result::Result<ServerMessage, ProtocolError>;

/// Notifications surfaced to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Login sent with this estimate.
    Connected(ClockEstimate),
    State(MetronomeState),
    ParticipantJoined(ParticipantSession),
    ParticipantReady(ReadyNotice),
    ParticipantLeft(ConnectionId),
    /// Per-tick beat from an authority running in tick mode.
    Beat(BeatEvent),
    /// A command of ours was refused.
    Rejected(String),
    PresetCreated(Preset),
    PresetUpdated(Preset),
    PresetDeleted(String),
    Disconnected { reason: Option<String> },
}

/// Time sources and audio output for a connection.
pub struct ClientRuntime {
    pub clock: Arc<dyn WallClock>,
    pub audio: Arc<dyn AudioClock>,
    pub trigger: Arc<dyn AudioTrigger>,
}

impl ClientRuntime {
    pub fn new(trigger: Arc<dyn AudioTrigger>) -> Self {
        Self {
            clock: Arc::new(RuntimeClock::new()),
            audio: Arc::new(SystemAudioClock::new()),
            trigger,
        }
    }
}

pub struct SyncClient {
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    connected: Arc<AtomicFlag>,
    estimate: SharedClockEstimate,
    player: LocalBeatPlayer,
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl SyncClient {
    /// Connect to `config.server_addr`, sync clocks and log in.
    pub async fn connect(
        config: ClientConfig,
        runtime: ClientRuntime,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        config.validate()?;
        let transport = MessageTransport::connect(config.server_addr.as_str(), config.max_frame_bytes).await?;
        Self::start(transport, config, runtime).await
    }

    /// Same as [`connect`](Self::connect) over an already open transport.
    pub async fn start(
        transport: MessageTransport,
        config: ClientConfig,
        runtime: ClientRuntime,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let (reader, mut writer) = transport.split();
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_loop(reader, inbound_tx));

        let estimator = ClockSyncEstimator::new(
            Arc::clone(&runtime.clock),
            config.probe_timeout,
            config.probe_interval,
        );
        let mut deferred = Vec::new();
        let estimate = {
            let mut probe = LinkProbe {
                writer: &mut writer,
                inbound: &mut inbound_rx,
                deferred: &mut deferred,
                clock: runtime.clock.as_ref(),
            };
            estimator.measure(&mut probe, config.probe_count).await
        };

        let shared = SharedClockEstimate::new(Arc::clone(&runtime.clock));
        shared.store(&estimate);

        let login = ClientMessage::UserConnected(Join {
            name: config.name.clone(),
            role: config.role,
            latency: estimate.latency_ms,
            clock_offset: estimate.offset_ms,
        });
        if let Err(e) = writer
            .send(&Envelope::new(login, runtime.clock.now_ms()))
            .await
        {
            reader_task.abort();
            return Err(e.into());
        }
        tracing::info!("Logged in as {} ({})", config.name, config.role);

        let player = LocalBeatPlayer::new(
            PlayerSettings {
                look_ahead: config.look_ahead,
                poll_interval: config.poll_interval,
            },
            shared.clone(),
            runtime.audio,
            runtime.trigger,
        );

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let connected = Arc::new(AtomicFlag::new(true));

        emit_event(&event_tx, ClientEvent::Connected(estimate));
        let link = Link {
            writer,
            inbound: inbound_rx,
            reader_task,
            clock: runtime.clock,
            player: player.clone(),
            connected: Arc::clone(&connected),
        };
        let task = tokio::spawn(link.run(deferred, cmd_rx, event_tx, shutdown_rx));

        let client = Self {
            cmd_tx,
            connected,
            estimate: shared,
            player,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        Ok((client, event_rx))
    }

    pub fn start_metronome(&self) -> Result<()> {
        self.send(ClientMessage::MetronomeStart(Empty {}))
    }

    pub fn stop_metronome(&self) -> Result<()> {
        self.send(ClientMessage::MetronomeStop(Empty {}))
    }

    pub fn update(&self, patch: ConfigPatch) -> Result<()> {
        self.send(ClientMessage::MetronomeUpdate(patch))
    }

    pub fn ready(&self) -> Result<()> {
        self.send(ClientMessage::ClientReady(Empty {}))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    pub fn clock_estimate(&self) -> &SharedClockEstimate {
        &self.estimate
    }

    pub fn player(&self) -> &LocalBeatPlayer {
        &self.player
    }

    /// Last `metronome_state` received.
    pub fn state(&self) -> Option<Arc<MetronomeState>> {
        self.player.last_state()
    }

    /// Close the link and stop local playback.
    pub async fn shutdown(&mut self) {
        tracing::debug!("Client shutdown requested");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Connection loop ended with join error: {}", e),
                Err(_) => {
                    tracing::warn!("Connection loop did not exit in time, aborting");
                    task.abort();
                }
            }
        }
        self.player.stop();
        self.connected.set(false);
    }

    fn send(&self, message: ClientMessage) -> Result<()> {
        if !self.connected.get() {
            tracing::warn!("Dropping {}: not connected", message.kind());
            return Err(ClientError::TransportUnavailable);
        }
        self.cmd_tx.send(message).map_err(|e| {
            tracing::warn!("Dropping {}: connection loop gone", e.0.kind());
            ClientError::TransportUnavailable
        })
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("connected", &self.is_connected())
            .field("estimate", &self.estimate)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.player.stop();
    }
}

/// Probe leg used during login, before the background loop owns the link.
/// Anything other than a pong is kept for the loop to replay.
struct LinkProbe<'a> {
    writer: &'a mut FrameWriter<OwnedWriteHalf>,
    inbound: &'a mut mpsc::UnboundedReceiver<Inbound>,
    deferred: &'a mut Vec<ServerMessage>,
    clock: &'a dyn WallClock,
}

impl ProbeTransport for LinkProbe<'_> {
    async fn send_ping(&mut self, client_send_time: f64) -> Result<()> {
        let ping = ClientMessage::Ping(Ping {
            timestamp: client_send_time,
        });
        let envelope = Envelope::new(ping, self.clock.now_ms());
        Ok(self.writer.send(&envelope).await?)
    }

    async fn recv_pong(&mut self) -> Result<Pong> {
        loop {
            match self.inbound.recv().await {
                Some(Ok(ServerMessage::Pong(pong))) => return Ok(pong),
                Some(Ok(other)) => self.deferred.push(other),
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ProtocolError::ConnectionClosed.into()),
            }
        }
    }
}

/// Decodes frames off the socket. Kept on its own task so receiving is
/// never cancelled halfway through a frame.
async fn read_loop(mut reader: FrameReader<OwnedReadHalf>, inbound: mpsc::UnboundedSender<Inbound>) {
    loop {
        let result = reader.recv::<ServerMessage>().await;
        let done = match &result {
            Ok(_) => false,
            Err(ProtocolError::Json(e)) => {
                tracing::warn!("Ignoring undecodable message: {}", e);
                continue;
            }
            Err(_) => true,
        };
        if inbound.send(result.map(Envelope::into_message)).is_err() || done {
            return;
        }
    }
}

struct Link {
    writer: FrameWriter<OwnedWriteHalf>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    reader_task: JoinHandle<()>,
    clock: Arc<dyn WallClock>,
    player: LocalBeatPlayer,
    connected: Arc<AtomicFlag>,
}

impl Link {
    async fn run(
        mut self,
        deferred: Vec<ServerMessage>,
        mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
        event_tx: mpsc::Sender<ClientEvent>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        for message in deferred {
            self.dispatch(message, &event_tx);
        }

        let reason = loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(message) => {
                        tracing::debug!("-> {}", message.kind());
                        let envelope = Envelope::new(message, self.clock.now_ms());
                        if let Err(e) = self.writer.send(&envelope).await {
                            break Some(format!("send failed: {e}"));
                        }
                    }
                    None => break Some("client dropped".to_string()),
                },
                _ = &mut shutdown_rx => break Some("client shut down".to_string()),
                incoming = self.inbound.recv() => match incoming {
                    Some(Ok(message)) => self.dispatch(message, &event_tx),
                    Some(Err(e)) if e.is_disconnect() => break None,
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                },
            }
        };

        self.connected.set(false);
        self.reader_task.abort();
        self.writer.shutdown().await.ok();
        tracing::info!(
            "Disconnected from authority{}",
            reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
        );
        if event_tx.send(ClientEvent::Disconnected { reason }).await.is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }

    fn dispatch(&self, message: ServerMessage, event_tx: &mpsc::Sender<ClientEvent>) {
        tracing::debug!("<- {}", message.kind());
        let event = match message {
            ServerMessage::MetronomeState(state) => {
                self.player.on_config_broadcast(state.clone());
                ClientEvent::State(state)
            }
            ServerMessage::Pong(_) => return,
            ServerMessage::UserConnected(session) => ClientEvent::ParticipantJoined(session),
            ServerMessage::ClientReady(notice) => ClientEvent::ParticipantReady(notice),
            ServerMessage::UserDisconnected(notice) => ClientEvent::ParticipantLeft(notice.client_id),
            ServerMessage::BeatEvent(beat) => ClientEvent::Beat(beat),
            ServerMessage::Error(notice) => {
                tracing::warn!("Authority rejected a command: {}", notice.message);
                ClientEvent::Rejected(notice.message)
            }
            ServerMessage::PresetCreated(preset) => ClientEvent::PresetCreated(preset),
            ServerMessage::PresetUpdated(preset) => ClientEvent::PresetUpdated(preset),
            ServerMessage::PresetDeleted(removed) => ClientEvent::PresetDeleted(removed.id),
        };
        emit_event(event_tx, event);
    }
}

/// Never blocks the loop: a full channel drops the event.
fn emit_event(event_tx: &mpsc::Sender<ClientEvent>, event: ClientEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            tracing::warn!("Event channel full, dropping {:?}", std::mem::discriminant(&dropped));
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!("Event receiver dropped");
        }
    }
}
