//! Shared beat configuration owned by the authority.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::transport::{Phase, TimeSignature};
use crate::{Error, Result};

pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 240;
pub const DEFAULT_BPM: u32 = 120;
pub const DEFAULT_COUNTDOWN_SECONDS: u32 = 3;
pub const MAX_COUNTDOWN_SECONDS: u32 = 60;

/// Sound played on each beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundId {
    #[default]
    Click,
    Beep,
    Wood,
}

impl SoundId {
    pub const ALL: [SoundId; 3] = [SoundId::Click, SoundId::Beep, SoundId::Wood];

    pub fn as_str(&self) -> &'static str {
        match self {
            SoundId::Click => "click",
            SoundId::Beep => "beep",
            SoundId::Wood => "wood",
        }
    }

    /// Playback gain for accented and normal beats.
    #[inline]
    pub fn gain(&self, is_accent: bool) -> f32 {
        if is_accent {
            1.0
        } else {
            0.6
        }
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoundId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SoundId::ALL
            .into_iter()
            .find(|sound| sound.as_str() == s)
            .ok_or_else(|| Error::UnknownSound(s.to_string()))
    }
}

/// Field-level update sent by the master. Absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accent_first: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_seconds: Option<u32>,
}

impl ConfigPatch {
    pub fn bpm(mut self, bpm: u32) -> Self {
        self.bpm = Some(bpm);
        self
    }

    pub fn time_signature(mut self, signature: impl Into<String>) -> Self {
        self.time_signature = Some(signature.into());
        self
    }

    pub fn accent_first(mut self, accent_first: bool) -> Self {
        self.accent_first = Some(accent_first);
        self
    }

    pub fn sound(mut self, sound: SoundId) -> Self {
        self.sound_type = Some(sound.as_str().to_string());
        self
    }

    pub fn countdown_seconds(mut self, seconds: u32) -> Self {
        self.countdown_seconds = Some(seconds);
        self
    }
}

/// The single process-wide beat configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedBeatConfig {
    pub bpm: u32,
    pub time_signature: TimeSignature,
    pub accent_first: bool,
    pub sound: SoundId,
    pub countdown_seconds: u32,
    pub phase: Phase,
    /// Epoch ms of the last mutation (authority clock).
    pub updated_at: i64,
}

impl Default for SharedBeatConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            accent_first: true,
            sound: SoundId::Click,
            countdown_seconds: DEFAULT_COUNTDOWN_SECONDS,
            phase: Phase::Idle,
            updated_at: 0,
        }
    }
}

impl SharedBeatConfig {
    pub fn validate(&self) -> Result<()> {
        validate_bpm(self.bpm)?;
        self.time_signature.validate()?;
        validate_countdown(self.countdown_seconds)
    }

    #[inline]
    pub fn beats_per_measure(&self) -> u32 {
        self.time_signature.beats_per_measure()
    }

    #[inline]
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm as f64
    }

    #[inline]
    pub fn beat_period_ms(&self) -> f64 {
        60_000.0 / self.bpm as f64
    }

    #[inline]
    pub fn is_accent(&self, beat: u32) -> bool {
        beat == 1 && self.accent_first
    }

    /// Validate every field of `patch`, then merge it. Nothing changes on error.
    pub fn apply(&mut self, patch: &ConfigPatch, now_ms: i64) -> Result<()> {
        if let Some(bpm) = patch.bpm {
            validate_bpm(bpm)?;
        }
        let time_signature = patch
            .time_signature
            .as_deref()
            .map(str::parse::<TimeSignature>)
            .transpose()?;
        let sound = patch
            .sound_type
            .as_deref()
            .map(str::parse::<SoundId>)
            .transpose()?;
        if let Some(seconds) = patch.countdown_seconds {
            validate_countdown(seconds)?;
        }

        if let Some(bpm) = patch.bpm {
            self.bpm = bpm;
        }
        if let Some(time_signature) = time_signature {
            self.time_signature = time_signature;
        }
        if let Some(accent_first) = patch.accent_first {
            self.accent_first = accent_first;
        }
        if let Some(sound) = sound {
            self.sound = sound;
        }
        if let Some(seconds) = patch.countdown_seconds {
            self.countdown_seconds = seconds;
        }
        self.updated_at = now_ms;
        Ok(())
    }
}

pub fn validate_bpm(bpm: u32) -> Result<()> {
    if (MIN_BPM..=MAX_BPM).contains(&bpm) {
        Ok(())
    } else {
        Err(Error::InvalidTempo(bpm))
    }
}

fn validate_countdown(seconds: u32) -> Result<()> {
    if seconds <= MAX_COUNTDOWN_SECONDS {
        Ok(())
    } else {
        Err(Error::InvalidCountdown(seconds))
    }
}
