//! Live participant sessions, owned by the authority actor.

use std::collections::HashMap;
use syncbeat_core::{ConnectionId, ParticipantSession, Role};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<ConnectionId, ParticipantSession>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the session for `id`. Readiness starts false.
    pub fn register(
        &mut self,
        id: ConnectionId,
        name: impl Into<String>,
        role: Role,
        latency_ms: f64,
        clock_offset_ms: f64,
        connected_at: i64,
    ) -> &ParticipantSession {
        let session = ParticipantSession::new(id.clone(), name, role, latency_ms, connected_at)
            .with_clock_offset(clock_offset_ms);
        if self.sessions.insert(id.clone(), session).is_some() {
            tracing::debug!("Re-registered connection {}", id);
        }
        &self.sessions[&id]
    }

    pub fn mark_ready(&mut self, id: &ConnectionId) -> Option<&ParticipantSession> {
        let session = self.sessions.get_mut(id)?;
        session.is_ready = true;
        Some(session)
    }

    pub fn unregister(&mut self, id: &ConnectionId) -> Option<ParticipantSession> {
        self.sessions.remove(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&ParticipantSession> {
        self.sessions.get(id)
    }

    /// Role of `id`, if it has completed the handshake.
    pub fn role_of(&self, id: &ConnectionId) -> Option<Role> {
        self.sessions.get(id).map(|s| s.role)
    }

    /// Largest latency among live sessions; 0 when empty.
    pub fn max_latency(&self) -> f64 {
        self.sessions
            .values()
            .map(|s| s.latency)
            .fold(0.0, f64::max)
    }

    /// Sessions ordered by connection time.
    pub fn participants(&self) -> Vec<ParticipantSession> {
        let mut all: Vec<_> = self.sessions.values().cloned().collect();
        all.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
