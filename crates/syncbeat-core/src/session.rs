//! Participant identity and roles.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Opaque per-connection identifier assigned by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Participant role. Only [`Role::Master`] may mutate the shared beat config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    #[default]
    Follower,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Follower => "follower",
            Role::Admin => "admin",
        }
    }

    #[inline]
    pub fn can_control(&self) -> bool {
        matches!(self, Role::Master)
    }

    /// Gate for control commands.
    pub fn authorize(self) -> Result<()> {
        if self.can_control() {
            Ok(())
        } else {
            Err(Error::Unauthorized { role: self })
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" => Ok(Role::Master),
            "follower" => Ok(Role::Follower),
            "admin" => Ok(Role::Admin),
            other => Err(Error::InvalidConfig(format!("unknown role '{other}'"))),
        }
    }
}

/// One live connection as tracked by the authority.
///
/// Created on the connect handshake, mutated on re-measurement or a readiness
/// signal, dropped on disconnect. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSession {
    pub id: ConnectionId,
    pub name: String,
    pub role: Role,
    /// Most recent latency estimate reported by the client (ms, >= 0).
    pub latency: f64,
    /// Authority clock minus client clock (ms).
    #[serde(default)]
    pub clock_offset: f64,
    pub is_ready: bool,
    /// Epoch ms on the authority clock.
    pub connected_at: i64,
}

impl ParticipantSession {
    pub fn new(
        id: ConnectionId,
        name: impl Into<String>,
        role: Role,
        latency_ms: f64,
        connected_at: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            latency: sanitize_latency(latency_ms),
            clock_offset: 0.0,
            is_ready: false,
            connected_at,
        }
    }

    pub fn with_clock_offset(mut self, offset_ms: f64) -> Self {
        self.clock_offset = if offset_ms.is_finite() { offset_ms } else { 0.0 };
        self
    }
}

/// Negative or non-finite latency reports are treated as unmeasured.
pub fn sanitize_latency(latency_ms: f64) -> f64 {
    if latency_ms.is_finite() && latency_ms > 0.0 {
        latency_ms
    } else {
        0.0
    }
}
