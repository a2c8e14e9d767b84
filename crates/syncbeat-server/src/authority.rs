//! Beat authority actor.
//!
//! [`BeatAuthority`] owns the shared beat config, the phase FSM and the
//! connection registry. Once spawned it runs on a single tokio task and
//! processes [`AuthorityCommand`]s one at a time, so no state is shared.
//! Every start, stop and update goes through one [`TimerSlot`], which cancels
//! the previous timer before arming a new one.

use std::sync::Arc;
use std::time::Duration;
use syncbeat_core::{
    BeatFsm, BeatTicker, ConfigPatch, ConnectionId, ParticipantSession, Phase, PhaseEvent, Role,
    SharedBeatConfig, TransitionResult, WallClock,
};
use syncbeat_protocol::{DisconnectNotice, Join, MetronomeState, ReadyNotice, ServerMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::broadcast::Broadcaster;
use crate::config::{BeatDelivery, ServerConfig, StartMode};
use crate::error::{Result, ServerError};
use crate::registry::ConnectionRegistry;

/// Scheduling knobs taken from [`ServerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthoritySettings {
    pub min_latency_buffer_ms: u64,
    pub start_mode: StartMode,
    pub beat_delivery: BeatDelivery,
    pub immediate_lead_ms: u64,
}

impl Default for AuthoritySettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for AuthoritySettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            min_latency_buffer_ms: config.min_latency_buffer_ms,
            start_mode: config.start_mode,
            beat_delivery: config.beat_delivery,
            immediate_lead_ms: config.immediate_lead_ms,
        }
    }
}

pub enum AuthorityCommand {
    Join {
        id: ConnectionId,
        join: Join,
        reply: oneshot::Sender<ParticipantSession>,
    },
    Ready {
        id: ConnectionId,
    },
    Disconnect {
        id: ConnectionId,
    },
    Start {
        id: ConnectionId,
        reply: oneshot::Sender<syncbeat_core::Result<i64>>,
    },
    Stop {
        id: ConnectionId,
        reply: oneshot::Sender<syncbeat_core::Result<()>>,
    },
    Update {
        id: ConnectionId,
        patch: ConfigPatch,
        reply: oneshot::Sender<syncbeat_core::Result<MetronomeState>>,
    },
    Snapshot {
        reply: oneshot::Sender<MetronomeState>,
    },
    Participants {
        reply: oneshot::Sender<Vec<ParticipantSession>>,
    },
    TimerFired {
        generation: u64,
    },
    Shutdown,
}

/// At most one pending timer.
///
/// Each arm or cancel bumps the generation; a firing that carries an older
/// generation is stale and ignored even if its task was not aborted in time.
pub struct TimerSlot {
    generation: u64,
    armed: bool,
    pending: Option<JoinHandle<()>>,
    mailbox: Option<mpsc::WeakUnboundedSender<AuthorityCommand>>,
}

impl TimerSlot {
    fn detached() -> Self {
        Self {
            generation: 0,
            armed: false,
            pending: None,
            mailbox: None,
        }
    }

    fn attach(&mut self, mailbox: mpsc::WeakUnboundedSender<AuthorityCommand>) {
        self.mailbox = Some(mailbox);
    }

    pub fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.armed = false;
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }

    /// Cancel, then arm a firing after `delay`. Returns the new generation.
    pub fn arm(&mut self, delay: Duration) -> u64 {
        self.cancel();
        let generation = self.generation;
        self.armed = true;
        if let Some(mailbox) = self.mailbox.clone() {
            self.pending = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(tx) = mailbox.upgrade() {
                    let _ = tx.send(AuthorityCommand::TimerFired { generation });
                }
            }));
        }
        generation
    }

    /// Consume a firing. False when stale.
    fn fire(&mut self, generation: u64) -> bool {
        if self.armed && generation == self.generation {
            self.armed = false;
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn pending(&self) -> Option<u64> {
        self.armed.then_some(self.generation)
    }
}

pub struct BeatAuthority {
    settings: AuthoritySettings,
    config: SharedBeatConfig,
    fsm: BeatFsm,
    registry: ConnectionRegistry,
    broadcaster: Broadcaster,
    clock: Arc<dyn WallClock>,
    timer: TimerSlot,
    ticker: Option<BeatTicker>,
}

impl BeatAuthority {
    pub fn new(settings: AuthoritySettings, initial: SharedBeatConfig, broadcaster: Broadcaster) -> Self {
        let clock = Arc::clone(broadcaster.clock());
        let mut config = initial;
        config.phase = Phase::Idle;
        Self {
            settings,
            config,
            fsm: BeatFsm::new(),
            registry: ConnectionRegistry::new(),
            broadcaster,
            clock,
            timer: TimerSlot::detached(),
            ticker: None,
        }
    }

    pub fn from_config(server: &ServerConfig, broadcaster: Broadcaster) -> Self {
        let initial = SharedBeatConfig {
            countdown_seconds: server.countdown_seconds,
            ..Default::default()
        };
        Self::new(AuthoritySettings::from(server), initial, broadcaster)
    }

    /// Move onto a dedicated task. Timers start firing from here on.
    pub fn spawn(mut self) -> (AuthorityHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.timer.attach(tx.downgrade());
        let task = tokio::spawn(self.run(rx));
        (AuthorityHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<AuthorityCommand>) {
        tracing::info!("Beat authority started");
        while let Some(command) = rx.recv().await {
            if !self.handle(command) {
                break;
            }
        }
        self.timer.cancel();
        tracing::info!("Beat authority stopped");
    }

    fn handle(&mut self, command: AuthorityCommand) -> bool {
        match command {
            AuthorityCommand::Join { id, join, reply } => {
                let _ = reply.send(self.join(id, join));
            }
            AuthorityCommand::Ready { id } => {
                self.ready(&id);
            }
            AuthorityCommand::Disconnect { id } => {
                self.disconnect(&id);
            }
            AuthorityCommand::Start { id, reply } => {
                let role = self.role_of(&id);
                let _ = reply.send(self.request_start(role));
            }
            AuthorityCommand::Stop { id, reply } => {
                let role = self.role_of(&id);
                let _ = reply.send(self.request_stop(role));
            }
            AuthorityCommand::Update { id, patch, reply } => {
                let role = self.role_of(&id);
                let _ = reply.send(self.request_update(role, &patch));
            }
            AuthorityCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            AuthorityCommand::Participants { reply } => {
                let _ = reply.send(self.registry.participants());
            }
            AuthorityCommand::TimerFired { generation } => self.on_timer(generation),
            AuthorityCommand::Shutdown => return false,
        }
        true
    }

    pub fn snapshot(&self) -> MetronomeState {
        MetronomeState::from(&self.config)
    }

    pub fn config(&self) -> &SharedBeatConfig {
        &self.config
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.fsm.phase()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Generation of the armed timer, if any.
    pub fn pending_timer(&self) -> Option<u64> {
        self.timer.pending()
    }

    /// Connections that have not completed the handshake have no control rights.
    pub fn role_of(&self, id: &ConnectionId) -> Role {
        self.registry.role_of(id).unwrap_or_default()
    }

    /// Register, send the current state to the newcomer, announce it to the rest.
    pub fn join(&mut self, id: ConnectionId, join: Join) -> ParticipantSession {
        let now = self.clock.now_ms();
        let session = self
            .registry
            .register(
                id.clone(),
                join.name,
                join.role,
                join.latency,
                join.clock_offset,
                now,
            )
            .clone();

        tracing::info!(
            "{} joined as {} (latency {:.1}ms, offset {:.1}ms)",
            session.name,
            session.role,
            session.latency,
            session.clock_offset
        );
        self.broadcaster
            .to_one(&id, ServerMessage::MetronomeState(self.snapshot()));
        self.broadcaster
            .to_others(&id, ServerMessage::UserConnected(session.clone()));
        session
    }

    pub fn ready(&mut self, id: &ConnectionId) -> bool {
        let Some(session) = self.registry.mark_ready(id) else {
            tracing::warn!("Ready signal from unregistered connection {}", id);
            return false;
        };
        let notice = ReadyNotice {
            client_id: id.clone(),
            name: session.name.clone(),
        };
        tracing::debug!("{} is ready", notice.name);
        self.broadcaster.to_all(ServerMessage::ClientReady(notice));
        true
    }

    pub fn disconnect(&mut self, id: &ConnectionId) -> Option<ParticipantSession> {
        let session = self.registry.unregister(id)?;
        tracing::info!("{} disconnected", session.name);
        self.broadcaster
            .to_others(id, ServerMessage::UserDisconnected(DisconnectNotice {
                client_id: id.clone(),
            }));
        Some(session)
    }

    /// Returns the start instant, which is the existing one if already active.
    pub fn request_start(&mut self, role: Role) -> syncbeat_core::Result<i64> {
        if let Err(e) = role.authorize() {
            tracing::warn!("Rejected start from {}", role);
            return Err(e);
        }
        if let Some(start_instant) = self.fsm.phase().start_instant() {
            tracing::debug!("Start requested while active, keeping {}", start_instant);
            return Ok(start_instant);
        }
        let now = self.clock.now_ms();
        let start_instant = self.begin_start(now);
        self.broadcast_state();
        Ok(start_instant)
    }

    pub fn request_stop(&mut self, role: Role) -> syncbeat_core::Result<()> {
        if let Err(e) = role.authorize() {
            tracing::warn!("Rejected stop from {}", role);
            return Err(e);
        }
        if self.halt() {
            tracing::info!("Metronome stopped");
            self.broadcast_state();
        }
        Ok(())
    }

    /// Stop, merge, restart if it was playing. One broadcast once settled.
    pub fn request_update(
        &mut self,
        role: Role,
        patch: &ConfigPatch,
    ) -> syncbeat_core::Result<MetronomeState> {
        if let Err(e) = role.authorize() {
            tracing::warn!("Rejected update from {}", role);
            return Err(e);
        }
        let now = self.clock.now_ms();
        let mut next = self.config.clone();
        if let Err(e) = next.apply(patch, now) {
            tracing::warn!("Rejected update: {}", e);
            return Err(e);
        }

        let was_playing = self.fsm.phase().is_playing();
        if was_playing {
            self.halt();
        }
        next.phase = self.fsm.phase();
        self.config = next;
        if was_playing {
            let start_instant = self.begin_start(now);
            tracing::info!("Restarted at {} BPM toward {}", self.config.bpm, start_instant);
        }
        self.broadcast_state();
        Ok(self.snapshot())
    }

    pub fn on_timer(&mut self, generation: u64) {
        if !self.timer.fire(generation) {
            tracing::debug!("Ignoring stale timer {}", generation);
            return;
        }
        let now = self.clock.now_ms();
        match self.fsm.phase() {
            Phase::Preparing { start_instant } => {
                self.fsm.transition(PhaseEvent::StartReached);
                self.sync_phase(now);
                tracing::info!("Playing at {} BPM", self.config.bpm);
                self.broadcast_state();
                if self.settings.beat_delivery == BeatDelivery::AuthorityTicks {
                    self.ticker = Some(self.new_ticker(start_instant));
                    self.fire_tick(now);
                }
            }
            Phase::Playing { .. } => self.fire_tick(now),
            Phase::Idle => {}
        }
    }

    fn new_ticker(&self, start_instant: i64) -> BeatTicker {
        BeatTicker::new(
            start_instant,
            self.config.bpm,
            self.config.beats_per_measure(),
            self.config.accent_first,
        )
    }

    /// Idle -> active without broadcasting. Returns the start instant.
    fn begin_start(&mut self, now: i64) -> i64 {
        match self.settings.start_mode {
            StartMode::Countdown => {
                let countdown_ms = self.config.countdown_seconds as f64 * 1000.0;
                let buffer_ms = (self.registry.max_latency() * 2.0)
                    .max(self.settings.min_latency_buffer_ms as f64);
                let start_instant = now + (countdown_ms + buffer_ms).ceil() as i64;

                self.fsm.transition(PhaseEvent::Prepare { start_instant });
                self.sync_phase(now);
                self.timer.arm(delay_until(start_instant, now));
                tracing::info!(
                    "Start armed for {} (countdown {}ms, buffer {:.0}ms)",
                    start_instant,
                    countdown_ms,
                    buffer_ms
                );
                start_instant
            }
            StartMode::Immediate => {
                let start_instant = now + self.settings.immediate_lead_ms as i64;
                self.fsm.transition(PhaseEvent::PlayNow { start_instant });
                self.sync_phase(now);
                if self.settings.beat_delivery == BeatDelivery::AuthorityTicks {
                    self.ticker = Some(self.new_ticker(start_instant));
                    self.timer.arm(delay_until(start_instant, now));
                }
                tracing::info!("Playing at {} BPM from {}", self.config.bpm, start_instant);
                start_instant
            }
        }
    }

    /// Cancel timers and return to Idle without broadcasting. False if already idle.
    fn halt(&mut self) -> bool {
        self.timer.cancel();
        self.ticker = None;
        match self.fsm.transition(PhaseEvent::Stop) {
            TransitionResult::PhaseChanged(_) => {
                self.sync_phase(self.clock.now_ms());
                true
            }
            _ => false,
        }
    }

    fn fire_tick(&mut self, now: i64) {
        let beats_per_measure = self.config.beats_per_measure();
        let Some(ticker) = self.ticker.as_mut() else {
            return;
        };
        if ticker.beats_fired() > 0 {
            self.fsm
                .transition(PhaseEvent::Advance { beats_per_measure });
        }
        let event = ticker.fire(now);
        let next_deadline = ticker.next_deadline();
        self.config.phase = self.fsm.phase();

        self.broadcaster.to_all(ServerMessage::BeatEvent(event));
        self.timer.arm(delay_until(next_deadline, now));
    }

    fn sync_phase(&mut self, now: i64) {
        self.config.phase = self.fsm.phase();
        self.config.updated_at = now;
    }

    fn broadcast_state(&self) {
        self.broadcaster
            .to_all(ServerMessage::MetronomeState(self.snapshot()));
    }
}

fn delay_until(deadline: i64, now: i64) -> Duration {
    Duration::from_millis(deadline.saturating_sub(now).max(0) as u64)
}

/// Cloneable front door to the authority task.
#[derive(Clone, Debug)]
pub struct AuthorityHandle {
    tx: mpsc::UnboundedSender<AuthorityCommand>,
}

impl AuthorityHandle {
    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> AuthorityCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .map_err(|_| ServerError::AuthorityClosed)?;
        rx.await.map_err(|_| ServerError::AuthorityClosed)
    }

    fn post(&self, command: AuthorityCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| ServerError::AuthorityClosed)
    }

    pub async fn join(&self, id: &ConnectionId, join: Join) -> Result<ParticipantSession> {
        self.call(|reply| AuthorityCommand::Join {
            id: id.clone(),
            join,
            reply,
        })
        .await
    }

    pub fn ready(&self, id: &ConnectionId) -> Result<()> {
        self.post(AuthorityCommand::Ready { id: id.clone() })
    }

    pub fn disconnect(&self, id: &ConnectionId) -> Result<()> {
        self.post(AuthorityCommand::Disconnect { id: id.clone() })
    }

    pub async fn request_start(&self, id: &ConnectionId) -> Result<i64> {
        Ok(self
            .call(|reply| AuthorityCommand::Start {
                id: id.clone(),
                reply,
            })
            .await??)
    }

    pub async fn request_stop(&self, id: &ConnectionId) -> Result<()> {
        Ok(self
            .call(|reply| AuthorityCommand::Stop {
                id: id.clone(),
                reply,
            })
            .await??)
    }

    pub async fn request_update(&self, id: &ConnectionId, patch: ConfigPatch) -> Result<MetronomeState> {
        Ok(self
            .call(|reply| AuthorityCommand::Update {
                id: id.clone(),
                patch,
                reply,
            })
            .await??)
    }

    pub async fn snapshot(&self) -> Result<MetronomeState> {
        self.call(|reply| AuthorityCommand::Snapshot { reply }).await
    }

    pub async fn participants(&self) -> Result<Vec<ParticipantSession>> {
        self.call(|reply| AuthorityCommand::Participants { reply })
            .await
    }

    pub fn shutdown(&self) -> Result<()> {
        self.post(AuthorityCommand::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
