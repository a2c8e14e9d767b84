//! Runtime-free kernel of the shared beat.
//!
//! # Primary API
//!
//! - [`SharedBeatConfig`] / [`ConfigPatch`]: the authority-owned beat configuration
//! - [`BeatFsm`] / [`Phase`]: Idle, Preparing, Playing lifecycle
//! - [`ClockEstimate`]: NTP-style latency and offset aggregation
//! - [`LookAheadScheduler`] / [`StartPlan`]: client-side beat scheduling
//! - [`ParticipantSession`] / [`Role`]: connection identity and write authority
//!
//! Nothing here spawns tasks or touches the network; the server and client
//! crates drive these types from tokio.

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{
    validate_bpm, ConfigPatch, SharedBeatConfig, SoundId, DEFAULT_BPM, DEFAULT_COUNTDOWN_SECONDS,
    MAX_BPM, MAX_COUNTDOWN_SECONDS, MIN_BPM,
};

pub mod preset;
pub use preset::{Preset, PresetDraft, PresetUpdate, MAX_PRESET_NAME_LEN};

pub mod session;
pub use session::{sanitize_latency, ConnectionId, ParticipantSession, Role};

pub mod transport;
pub use transport::{
    beat_period_ms, beats_elapsed, catch_up_beat, is_accent, next_beat, ordinal_for_index,
    seconds_per_beat, BeatEvent, BeatFsm, BeatTicker, ClockEstimate, ClockSample,
    LookAheadScheduler, ManualClock, Phase, PhaseEvent, ScheduledBeat, StartPlan, SystemClock,
    TimeSignature, TransitionResult, WallClock, DEFAULT_LOOK_AHEAD_SECS, MAX_BEATS_PER_MEASURE,
    MAX_DENOMINATOR,
};

pub(crate) mod lockfree;
pub use lockfree::{AtomicDouble, AtomicFlag};
