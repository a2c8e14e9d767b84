//! Message types carried inside the envelope.
//!
//! Both enums are adjacently tagged: `type` holds the snake_case message name
//! and `payload` holds the camelCase body.

use serde::{Deserialize, Serialize};
use syncbeat_core::{BeatEvent, ConfigPatch, ConnectionId, ParticipantSession, Preset, Role};

use crate::state::MetronomeState;

/// Empty `{}` payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    /// Client send instant `T1` (client clock, ms).
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    pub client_send_time: f64,
    pub server_receive_time: f64,
    pub server_send_time: f64,
}

/// Login handshake sent once the clock estimate is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Join {
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub latency: f64,
    #[serde(default)]
    pub clock_offset: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyNotice {
    pub client_id: ConnectionId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectNotice {
    pub client_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetRemoved {
    pub id: String,
}

/// Client to authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping(Ping),
    UserConnected(Join),
    ClientReady(Empty),
    MetronomeStart(Empty),
    MetronomeStop(Empty),
    MetronomeUpdate(ConfigPatch),
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Ping(_) => "ping",
            ClientMessage::UserConnected(_) => "user_connected",
            ClientMessage::ClientReady(_) => "client_ready",
            ClientMessage::MetronomeStart(_) => "metronome_start",
            ClientMessage::MetronomeStop(_) => "metronome_stop",
            ClientMessage::MetronomeUpdate(_) => "metronome_update",
        }
    }
}

/// Authority to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong(Pong),
    MetronomeState(MetronomeState),
    UserConnected(ParticipantSession),
    ClientReady(ReadyNotice),
    UserDisconnected(DisconnectNotice),
    BeatEvent(BeatEvent),
    Error(ErrorNotice),
    PresetCreated(Preset),
    PresetUpdated(Preset),
    PresetDeleted(PresetRemoved),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorNotice {
            message: message.into(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Pong(_) => "pong",
            ServerMessage::MetronomeState(_) => "metronome_state",
            ServerMessage::UserConnected(_) => "user_connected",
            ServerMessage::ClientReady(_) => "client_ready",
            ServerMessage::UserDisconnected(_) => "user_disconnected",
            ServerMessage::BeatEvent(_) => "beat_event",
            ServerMessage::Error(_) => "error",
            ServerMessage::PresetCreated(_) => "preset_created",
            ServerMessage::PresetUpdated(_) => "preset_updated",
            ServerMessage::PresetDeleted(_) => "preset_deleted",
        }
    }
}
