//! Participant-side configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use syncbeat_core::Role;
use syncbeat_protocol::DEFAULT_MAX_FRAME_BYTES;

use crate::error::{ClientError, Result};

pub const DEFAULT_PROBE_COUNT: usize = 5;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_LOOK_AHEAD: Duration = Duration::from_millis(100);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);
pub const DEFAULT_EVENT_CAPACITY: usize = 64;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_addr: String,
    pub name: String,
    pub role: Role,
    /// Ping/pong rounds per connect.
    pub probe_count: usize,
    pub probe_timeout: Duration,
    /// Pause between probes so they do not queue behind each other.
    pub probe_interval: Duration,
    pub look_ahead: Duration,
    pub poll_interval: Duration,
    pub max_frame_bytes: usize,
    pub event_capacity: usize,
    pub shutdown_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3000".to_string(),
            name: "Anonymous".to_string(),
            role: Role::Follower,
            probe_count: DEFAULT_PROBE_COUNT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            look_ahead: DEFAULT_LOOK_AHEAD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(server_addr: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            server_addr: server_addr.into(),
            name: name.into(),
            role,
            ..Default::default()
        }
    }

    pub fn with_probe_count(mut self, probe_count: usize) -> Self {
        self.probe_count = probe_count;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_look_ahead(mut self, look_ahead: Duration) -> Self {
        self.look_ahead = look_ahead;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ClientError::Config("name must not be empty".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ClientError::Config("poll_interval must be non-zero".into()));
        }
        if self.look_ahead < self.poll_interval {
            return Err(ClientError::Config(format!(
                "look_ahead ({:?}) shorter than poll_interval ({:?}) would miss beats",
                self.look_ahead, self.poll_interval
            )));
        }
        if self.probe_timeout.is_zero() {
            return Err(ClientError::Config("probe_timeout must be non-zero".into()));
        }
        if self.max_frame_bytes < 1024 {
            return Err(ClientError::Config(format!(
                "max_frame_bytes too small: {}",
                self.max_frame_bytes
            )));
        }
        Ok(())
    }
}
