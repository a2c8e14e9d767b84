//! Local beat player.
//!
//! Turns a broadcast start instant plus tempo into audio triggers with no
//! further network traffic. A one-shot timer waits for the start instant,
//! then a poll task feeds the [`LookAheadScheduler`] and hands every
//! committed beat to the [`AudioTrigger`] ahead of time.
//!
//! All scheduler state sits behind one mutex together with a generation
//! counter. The poll task re-checks the generation under the lock before it
//! triggers, so a stop that takes the lock first is always observed. The
//! task only holds a weak reference; dropping the last player handle ends
//! playback.

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use syncbeat_core::{LookAheadScheduler, ScheduledBeat, SoundId, StartPlan};
use syncbeat_protocol::MetronomeState;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::sync::SharedClockEstimate;

/// Opaque sound output. `at` is on the [`AudioClock`] timeline.
pub trait AudioTrigger: Send + Sync {
    fn play(&self, sound: SoundId, is_accent: bool, at: f64);
}

/// Monotonic audio timeline in seconds.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Seconds since construction, driven by `tokio::time`.
#[derive(Debug, Clone, Copy)]
pub struct SystemAudioClock {
    origin: Instant,
}

impl SystemAudioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemAudioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemAudioClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSettings {
    pub look_ahead: Duration,
    pub poll_interval: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            look_ahead: crate::config::DEFAULT_LOOK_AHEAD,
            poll_interval: crate::config::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What the running schedule was armed for. A broadcast that matches needs
/// no re-arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Armed {
    start_instant: i64,
    bpm: u32,
    beats_per_measure: u32,
}

struct PlayerState {
    scheduler: LookAheadScheduler,
    generation: u64,
    armed: Option<Armed>,
    sound: SoundId,
    task: Option<JoinHandle<()>>,
    due: Vec<ScheduledBeat>,
}

impl PlayerState {
    /// Abort whatever is pending and invalidate in-flight polls.
    fn cancel(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.armed = None;
        self.scheduler.stop();
        self.generation
    }
}

impl Drop for PlayerState {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Inner {
    state: Mutex<PlayerState>,
    settings: PlayerSettings,
    estimate: SharedClockEstimate,
    audio: Arc<dyn AudioClock>,
    trigger: Arc<dyn AudioTrigger>,
    last_state: ArcSwapOption<MetronomeState>,
    beat_tx: watch::Sender<u32>,
}

/// Cloneable handle; all clones drive the same schedule.
#[derive(Clone)]
pub struct LocalBeatPlayer {
    inner: Arc<Inner>,
}

impl LocalBeatPlayer {
    pub fn new(
        settings: PlayerSettings,
        estimate: SharedClockEstimate,
        audio: Arc<dyn AudioClock>,
        trigger: Arc<dyn AudioTrigger>,
    ) -> Self {
        let (beat_tx, _) = watch::channel(0);
        let state = PlayerState {
            scheduler: LookAheadScheduler::new(settings.look_ahead.as_secs_f64()),
            generation: 0,
            armed: None,
            sound: SoundId::default(),
            task: None,
            due: Vec::new(),
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                settings,
                estimate,
                audio,
                trigger,
                last_state: ArcSwapOption::empty(),
                beat_tx,
            }),
        }
    }

    /// Ordinal of the latest triggered beat, counting from 1.
    ///
    /// 0 means nothing is sounding yet: idle, or waiting for the start instant.
    pub fn subscribe_beats(&self) -> watch::Receiver<u32> {
        self.inner.beat_tx.subscribe()
    }

    pub fn current_beat(&self) -> u32 {
        *self.inner.beat_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().scheduler.is_running()
    }

    /// True while waiting for the start instant or playing.
    pub fn is_armed(&self) -> bool {
        self.inner.state.lock().armed.is_some()
    }

    pub fn last_state(&self) -> Option<Arc<MetronomeState>> {
        self.inner.last_state.load_full()
    }

    /// React to a `metronome_state` broadcast.
    pub fn on_config_broadcast(&self, config: MetronomeState) {
        let config = Arc::new(config);
        self.inner.last_state.store(Some(Arc::clone(&config)));

        let mut state = self.inner.state.lock();
        state.sound = config.sound;
        state.scheduler.set_accent_first(config.accent_first);

        let Some(start_instant) = config.start_instant() else {
            if state.armed.is_some() {
                state.cancel();
                self.inner.beat_tx.send_replace(0);
                tracing::info!("Local playback stopped");
            }
            return;
        };

        let wanted = Armed {
            start_instant,
            bpm: config.bpm,
            beats_per_measure: config.beats_per_measure(),
        };
        if state.armed == Some(wanted) {
            return;
        }

        let generation = state.cancel();
        state.armed = Some(wanted);
        self.inner.beat_tx.send_replace(0);

        let server_now = self.inner.estimate.server_time();
        let plan = StartPlan::for_start(start_instant, server_now, wanted.bpm, wanted.beats_per_measure);
        let audio_now = self.inner.audio.now();
        let accent_first = config.accent_first;

        let (first_beat, first_beat_time, wake_after) = match plan {
            StartPlan::Delayed { delay_ms } => {
                let delay = Duration::from_secs_f64(delay_ms / 1000.0);
                tracing::debug!("Local start in {:.0}ms", delay_ms);
                (
                    1,
                    audio_now + delay.as_secs_f64(),
                    delay.saturating_sub(self.inner.settings.look_ahead),
                )
            }
            StartPlan::CatchUp { beat, elapsed_ms } => {
                tracing::warn!(
                    "Start instant passed {:.0}ms ago ({} beats missed), joining at beat {}",
                    elapsed_ms,
                    plan.beats_missed(wanted.bpm),
                    beat
                );
                (beat, audio_now, Duration::ZERO)
            }
        };

        let player = Arc::downgrade(&self.inner);
        let poll_interval = self.inner.settings.poll_interval;
        state.task = Some(tokio::spawn(async move {
            if !wake_after.is_zero() {
                tokio::time::sleep(wake_after).await;
            }
            {
                let Some(inner) = player.upgrade() else {
                    return;
                };
                let mut state = inner.state.lock();
                if state.generation != generation {
                    return;
                }
                state.scheduler.start(
                    first_beat_time,
                    first_beat,
                    wanted.bpm,
                    wanted.beats_per_measure,
                    accent_first,
                );
            }
            tracing::info!("Local playback at {} BPM from beat {}", wanted.bpm, first_beat);
            poll_loop(player, generation, poll_interval).await;
        }));
    }

    /// Cancel any pending start or running schedule. Idempotent.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if state.armed.is_some() || state.task.is_some() {
            state.cancel();
            self.inner.beat_tx.send_replace(0);
        }
    }
}

impl std::fmt::Debug for LocalBeatPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBeatPlayer")
            .field("running", &self.is_running())
            .field("current_beat", &self.current_beat())
            .finish()
    }
}

async fn poll_loop(player: Weak<Inner>, generation: u64, poll_interval: Duration) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = player.upgrade() else {
            return;
        };
        let mut state = inner.state.lock();
        if state.generation != generation {
            return;
        }
        let now = inner.audio.now();
        let PlayerState {
            scheduler, due, sound, ..
        } = &mut *state;
        due.clear();
        scheduler.poll_into(now, due);
        for beat in due.iter() {
            inner.trigger.play(*sound, beat.is_accent, beat.time);
            inner.beat_tx.send_replace(beat.beat);
        }
    }
}
