//! Beat lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of the shared beat.
///
/// Start instants are epoch milliseconds on the authority clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Phase {
    #[default]
    Idle,
    Preparing {
        start_instant: i64,
    },
    Playing {
        start_instant: i64,
        current_beat: u32,
    },
}

impl Phase {
    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self, Phase::Idle)
    }

    #[inline]
    pub fn is_preparing(&self) -> bool {
        matches!(self, Phase::Preparing { .. })
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        matches!(self, Phase::Playing { .. })
    }

    pub fn start_instant(&self) -> Option<i64> {
        match *self {
            Phase::Idle => None,
            Phase::Preparing { start_instant } | Phase::Playing { start_instant, .. } => {
                Some(start_instant)
            }
        }
    }

    /// 0 unless playing.
    pub fn current_beat(&self) -> u32 {
        match *self {
            Phase::Playing { current_beat, .. } => current_beat,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Arm a countdown toward `start_instant` (Idle -> Preparing).
    Prepare { start_instant: i64 },
    /// The armed start instant arrived (Preparing -> Playing).
    StartReached,
    /// Skip the countdown (Idle -> Playing).
    PlayNow { start_instant: i64 },
    /// Move to the next beat ordinal, wrapping after `beats_per_measure`.
    Advance { beats_per_measure: u32 },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    None,
    PhaseChanged(Phase),
    /// A start was requested while a start is already pending or running.
    AlreadyActive { start_instant: i64 },
    BeatAdvanced(u32),
}

#[derive(Debug, Clone, Default)]
pub struct BeatFsm {
    phase: Phase,
}

impl BeatFsm {
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn transition(&mut self, event: PhaseEvent) -> TransitionResult {
        use PhaseEvent::*;

        match event {
            Prepare { start_instant } => match self.phase {
                Phase::Idle => self.enter(Phase::Preparing { start_instant }),
                Phase::Preparing { start_instant } | Phase::Playing { start_instant, .. } => {
                    TransitionResult::AlreadyActive { start_instant }
                }
            },

            StartReached => match self.phase {
                Phase::Preparing { start_instant } => self.enter(Phase::Playing {
                    start_instant,
                    current_beat: 1,
                }),
                _ => TransitionResult::None,
            },

            PlayNow { start_instant } => match self.phase {
                Phase::Idle => self.enter(Phase::Playing {
                    start_instant,
                    current_beat: 1,
                }),
                Phase::Preparing { start_instant } | Phase::Playing { start_instant, .. } => {
                    TransitionResult::AlreadyActive { start_instant }
                }
            },

            Advance { beats_per_measure } => match self.phase {
                Phase::Playing {
                    start_instant,
                    current_beat,
                } => {
                    let next = next_beat(current_beat, beats_per_measure);
                    self.phase = Phase::Playing {
                        start_instant,
                        current_beat: next,
                    };
                    TransitionResult::BeatAdvanced(next)
                }
                _ => TransitionResult::None,
            },

            Stop => match self.phase {
                Phase::Idle => TransitionResult::None,
                _ => self.enter(Phase::Idle),
            },
        }
    }

    fn enter(&mut self, phase: Phase) -> TransitionResult {
        self.phase = phase;
        TransitionResult::PhaseChanged(phase)
    }
}

/// 1-based ordinal wrap: `beats_per_measure` is followed by 1.
#[inline]
pub fn next_beat(current: u32, beats_per_measure: u32) -> u32 {
    if current >= beats_per_measure.max(1) {
        1
    } else {
        current + 1
    }
}
