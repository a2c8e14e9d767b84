pub(crate) mod clock;
pub(crate) mod fsm;
pub(crate) mod meter;
pub(crate) mod metronome;
pub(crate) mod scheduler;

pub use clock::{ClockEstimate, ClockSample, ManualClock, SystemClock, WallClock};
pub use fsm::{next_beat, BeatFsm, Phase, PhaseEvent, TransitionResult};
pub use meter::{TimeSignature, MAX_BEATS_PER_MEASURE, MAX_DENOMINATOR};
pub use metronome::{
    beat_period_ms, beats_elapsed, catch_up_beat, is_accent, ordinal_for_index, seconds_per_beat,
    BeatEvent, BeatTicker,
};
pub use scheduler::{LookAheadScheduler, ScheduledBeat, StartPlan, DEFAULT_LOOK_AHEAD_SECS};
