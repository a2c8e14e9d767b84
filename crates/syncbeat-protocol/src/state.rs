//! `metronome_state` payload.
//!
//! On the wire the lifecycle is flattened into `isPlaying`, `isPreparing`,
//! `startTime` and `currentBeat`. Decoding folds them back into a [`Phase`]
//! and rejects combinations no phase can produce.

use serde::{Deserialize, Serialize};
use syncbeat_core::{Phase, SharedBeatConfig, SoundId, TimeSignature};

/// Full snapshot of the shared beat config as broadcast to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireState", try_from = "WireState")]
pub struct MetronomeState {
    pub bpm: u32,
    pub time_signature: TimeSignature,
    pub accent_first: bool,
    pub sound: SoundId,
    pub countdown_seconds: u32,
    pub phase: Phase,
    /// Epoch ms of the last mutation.
    pub updated_at: i64,
}

impl MetronomeState {
    #[inline]
    pub fn beats_per_measure(&self) -> u32 {
        self.time_signature.beats_per_measure()
    }

    #[inline]
    pub fn start_instant(&self) -> Option<i64> {
        self.phase.start_instant()
    }
}

impl From<&SharedBeatConfig> for MetronomeState {
    fn from(config: &SharedBeatConfig) -> Self {
        Self {
            bpm: config.bpm,
            time_signature: config.time_signature,
            accent_first: config.accent_first,
            sound: config.sound,
            countdown_seconds: config.countdown_seconds,
            phase: config.phase,
            updated_at: config.updated_at,
        }
    }
}

impl Default for MetronomeState {
    fn default() -> Self {
        Self::from(&SharedBeatConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireState {
    bpm: u32,
    time_signature: TimeSignature,
    accent_first: bool,
    sound_type: SoundId,
    countdown_seconds: u32,
    timestamp: i64,
    is_playing: bool,
    is_preparing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_time: Option<i64>,
    #[serde(default)]
    current_beat: u32,
}

impl From<MetronomeState> for WireState {
    fn from(state: MetronomeState) -> Self {
        Self {
            bpm: state.bpm,
            time_signature: state.time_signature,
            accent_first: state.accent_first,
            sound_type: state.sound,
            countdown_seconds: state.countdown_seconds,
            timestamp: state.updated_at,
            is_playing: state.phase.is_playing(),
            is_preparing: state.phase.is_preparing(),
            start_time: state.phase.start_instant(),
            current_beat: state.phase.current_beat(),
        }
    }
}

impl TryFrom<WireState> for MetronomeState {
    type Error = String;

    fn try_from(wire: WireState) -> Result<Self, Self::Error> {
        let phase = match (wire.is_playing, wire.is_preparing, wire.start_time) {
            (true, true, _) => return Err("state cannot be both playing and preparing".into()),
            (false, true, Some(start_instant)) => Phase::Preparing { start_instant },
            (true, false, Some(start_instant)) => Phase::Playing {
                start_instant,
                current_beat: wire.current_beat.max(1),
            },
            (false, false, _) => Phase::Idle,
            (_, _, None) => return Err("active state requires startTime".into()),
        };
        Ok(Self {
            bpm: wire.bpm,
            time_signature: wire.time_signature,
            accent_first: wire.accent_first,
            sound: wire.sound_type,
            countdown_seconds: wire.countdown_seconds,
            phase,
            updated_at: wire.timestamp,
        })
    }
}
