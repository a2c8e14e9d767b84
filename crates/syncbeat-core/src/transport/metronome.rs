//! Beat grid arithmetic shared by the authority ticker and the client scheduler.

use serde::{Deserialize, Serialize};

#[inline]
pub fn seconds_per_beat(bpm: u32) -> f64 {
    60.0 / bpm.max(1) as f64
}

#[inline]
pub fn beat_period_ms(bpm: u32) -> f64 {
    seconds_per_beat(bpm) * 1000.0
}

#[inline]
pub fn is_accent(beat: u32, accent_first: bool) -> bool {
    beat == 1 && accent_first
}

/// Whole beat periods elapsed since the start instant. Negative elapsed time counts as zero.
pub fn beats_elapsed(elapsed_ms: f64, bpm: u32) -> u64 {
    if !elapsed_ms.is_finite() || elapsed_ms <= 0.0 {
        return 0;
    }
    (elapsed_ms / beat_period_ms(bpm)).floor() as u64
}

/// Beat ordinal for the `index`-th beat after the start instant (0-based).
#[inline]
pub fn ordinal_for_index(index: u64, beats_per_measure: u32) -> u32 {
    (index % beats_per_measure.max(1) as u64) as u32 + 1
}

/// Ordinal to resume at when the start instant is `elapsed_ms` in the past.
#[inline]
pub fn catch_up_beat(elapsed_ms: f64, bpm: u32, beats_per_measure: u32) -> u32 {
    ordinal_for_index(beats_elapsed(elapsed_ms, bpm), beats_per_measure)
}

/// One beat as emitted by the authority in per-tick delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatEvent {
    pub beat_number: u32,
    pub is_accent: bool,
    /// Epoch ms at emission.
    pub server_timestamp: i64,
    /// Intended trigger instant in seconds.
    pub scheduled_time: f64,
}

/// Deadline bookkeeping for the authority's per-tick beat emitter.
///
/// Deadlines are computed from the start instant rather than accumulated, so
/// timer lateness does not drift the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatTicker {
    start_instant: i64,
    period_ms: f64,
    beats_per_measure: u32,
    accent_first: bool,
    index: u64,
}

impl BeatTicker {
    pub fn new(start_instant: i64, bpm: u32, beats_per_measure: u32, accent_first: bool) -> Self {
        Self {
            start_instant,
            period_ms: beat_period_ms(bpm),
            beats_per_measure: beats_per_measure.max(1),
            accent_first,
            index: 0,
        }
    }

    /// Epoch ms at which the next beat is due.
    pub fn next_deadline(&self) -> i64 {
        self.start_instant + (self.index as f64 * self.period_ms).round() as i64
    }

    pub fn next_beat(&self) -> u32 {
        ordinal_for_index(self.index, self.beats_per_measure)
    }

    #[inline]
    pub fn beats_fired(&self) -> u64 {
        self.index
    }

    /// Emit the due beat and advance.
    pub fn fire(&mut self, now_ms: i64) -> BeatEvent {
        let beat = self.next_beat();
        let deadline = self.next_deadline();
        self.index += 1;
        BeatEvent {
            beat_number: beat,
            is_accent: is_accent(beat, self.accent_first),
            server_timestamp: now_ms,
            scheduled_time: deadline as f64 / 1000.0,
        }
    }
}
