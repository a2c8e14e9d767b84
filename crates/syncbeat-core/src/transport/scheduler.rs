//! Look-ahead beat scheduler.
//!
//! A coarse poll (tens of ms) commits every beat that falls inside the
//! look-ahead window to the audio clock, which then triggers it precisely.
//! Times here are audio-clock seconds, not wall-clock milliseconds.

use super::metronome::{beats_elapsed, catch_up_beat, is_accent, seconds_per_beat};

pub const DEFAULT_LOOK_AHEAD_SECS: f64 = 0.1;

/// How to begin local playback for a broadcast start instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartPlan {
    /// Start instant is still ahead: begin at beat 1 after `delay_ms`.
    Delayed { delay_ms: f64 },
    /// Start instant already passed: begin now at `beat`.
    CatchUp { beat: u32, elapsed_ms: f64 },
}

impl StartPlan {
    /// `server_now_ms` is the local estimate of authority time.
    pub fn for_start(start_instant: i64, server_now_ms: f64, bpm: u32, beats_per_measure: u32) -> Self {
        let delay_ms = start_instant as f64 - server_now_ms;
        if delay_ms > 0.0 {
            StartPlan::Delayed { delay_ms }
        } else {
            let elapsed_ms = -delay_ms;
            StartPlan::CatchUp {
                beat: catch_up_beat(elapsed_ms, bpm, beats_per_measure),
                elapsed_ms,
            }
        }
    }

    /// Whole beats already elapsed; zero for a delayed start.
    pub fn beats_missed(&self, bpm: u32) -> u64 {
        match *self {
            StartPlan::Delayed { .. } => 0,
            StartPlan::CatchUp { elapsed_ms, .. } => beats_elapsed(elapsed_ms, bpm),
        }
    }
}

/// A trigger committed to the audio clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBeat {
    pub beat: u32,
    pub is_accent: bool,
    /// Audio-clock seconds.
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Grid {
    seconds_per_beat: f64,
    beats_per_measure: u32,
    accent_first: bool,
}

#[derive(Debug, Clone)]
pub struct LookAheadScheduler {
    look_ahead: f64,
    grid: Grid,
    next_beat_time: f64,
    next_beat: u32,
    current_beat: u32,
    running: bool,
}

impl LookAheadScheduler {
    pub fn new(look_ahead_secs: f64) -> Self {
        Self {
            look_ahead: look_ahead_secs.max(0.0),
            grid: Grid {
                seconds_per_beat: seconds_per_beat(120),
                beats_per_measure: 4,
                accent_first: true,
            },
            next_beat_time: 0.0,
            next_beat: 1,
            current_beat: 1,
            running: false,
        }
    }

    /// Begin scheduling with `first_beat` due at audio time `first_beat_time`.
    pub fn start(
        &mut self,
        first_beat_time: f64,
        first_beat: u32,
        bpm: u32,
        beats_per_measure: u32,
        accent_first: bool,
    ) {
        let beats_per_measure = beats_per_measure.max(1);
        self.grid = Grid {
            seconds_per_beat: seconds_per_beat(bpm),
            beats_per_measure,
            accent_first,
        };
        self.next_beat_time = first_beat_time;
        self.next_beat = first_beat.clamp(1, beats_per_measure);
        self.current_beat = self.next_beat;
        self.running = true;
    }

    /// Halt without emitting anything further; the ordinal returns to 1.
    pub fn stop(&mut self) {
        self.running = false;
        self.next_beat = 1;
        self.current_beat = 1;
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Ordinal of the most recently committed beat, for display.
    #[inline]
    pub fn current_beat(&self) -> u32 {
        self.current_beat
    }

    /// Takes effect from the next committed beat.
    pub fn set_accent_first(&mut self, accent_first: bool) {
        self.grid.accent_first = accent_first;
    }

    /// Commit every beat with `time < now + look_ahead`.
    pub fn poll(&mut self, now: f64) -> Vec<ScheduledBeat> {
        let mut due = Vec::new();
        self.poll_into(now, &mut due);
        due
    }

    pub fn poll_into(&mut self, now: f64, out: &mut Vec<ScheduledBeat>) {
        if !self.running {
            return;
        }
        let horizon = now + self.look_ahead;
        while self.next_beat_time < horizon {
            let beat = self.next_beat;
            out.push(ScheduledBeat {
                beat,
                is_accent: is_accent(beat, self.grid.accent_first),
                time: self.next_beat_time,
            });
            self.current_beat = beat;
            self.next_beat_time += self.grid.seconds_per_beat;
            self.next_beat = if beat >= self.grid.beats_per_measure {
                1
            } else {
                beat + 1
            };
        }
    }
}

impl Default for LookAheadScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_LOOK_AHEAD_SECS)
    }
}
