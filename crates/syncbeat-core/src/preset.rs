//! Saved tempo/meter/sound presets.

use serde::{Deserialize, Serialize};

use crate::config::{validate_bpm, SoundId};
use crate::transport::TimeSignature;
use crate::{Error, Result};

pub const MAX_PRESET_NAME_LEN: usize = 100;

fn default_note_value() -> u32 {
    4
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub bpm: u32,
    pub beats_per_measure: u32,
    #[serde(default = "default_note_value")]
    pub note_value: u32,
    #[serde(default)]
    pub sound_type: SoundId,
    #[serde(default)]
    pub is_favorite: bool,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
}

impl Preset {
    pub fn time_signature(&self) -> TimeSignature {
        TimeSignature::new(self.beats_per_measure, self.note_value)
    }
}

/// Fields supplied when creating a preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetDraft {
    pub name: String,
    pub bpm: u32,
    pub beats_per_measure: u32,
    #[serde(default = "default_note_value")]
    pub note_value: u32,
    #[serde(default)]
    pub sound_type: SoundId,
    #[serde(default)]
    pub is_favorite: bool,
}

impl PresetDraft {
    pub fn new(name: impl Into<String>, bpm: u32, time_signature: TimeSignature) -> Self {
        Self {
            name: name.into(),
            bpm,
            beats_per_measure: time_signature.numerator,
            note_value: time_signature.denominator,
            sound_type: SoundId::default(),
            is_favorite: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_bpm(self.bpm)?;
        TimeSignature::new(self.beats_per_measure, self.note_value).validate()
    }

    pub fn into_preset(self, id: String, now_ms: i64) -> Preset {
        Preset {
            id,
            name: self.name,
            bpm: self.bpm,
            beats_per_measure: self.beats_per_measure,
            note_value: self.note_value,
            sound_type: self.sound_type,
            is_favorite: self.is_favorite,
            created_at: now_ms,
            updated_at: now_ms,
        }
    }
}

/// Partial preset update. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresetUpdate {
    pub name: Option<String>,
    pub bpm: Option<u32>,
    pub beats_per_measure: Option<u32>,
    pub note_value: Option<u32>,
    pub sound_type: Option<SoundId>,
    pub is_favorite: Option<bool>,
}

impl PresetUpdate {
    /// Validate against `preset`, then merge.
    pub fn apply_to(&self, preset: &mut Preset, now_ms: i64) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(bpm) = self.bpm {
            validate_bpm(bpm)?;
        }
        let beats = self.beats_per_measure.unwrap_or(preset.beats_per_measure);
        let note = self.note_value.unwrap_or(preset.note_value);
        TimeSignature::new(beats, note).validate()?;

        if let Some(name) = &self.name {
            preset.name = name.clone();
        }
        if let Some(bpm) = self.bpm {
            preset.bpm = bpm;
        }
        preset.beats_per_measure = beats;
        preset.note_value = note;
        if let Some(sound) = self.sound_type {
            preset.sound_type = sound;
        }
        if let Some(favorite) = self.is_favorite {
            preset.is_favorite = favorite;
        }
        preset.updated_at = now_ms;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_PRESET_NAME_LEN {
        return Err(Error::InvalidConfig(format!(
            "preset name must be 1..={MAX_PRESET_NAME_LEN} characters"
        )));
    }
    Ok(())
}
