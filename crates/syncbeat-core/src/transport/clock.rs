//! Wall clocks and NTP-style offset estimation.
//!
//! A probe round records four instants:
//! - `T1` client send (client clock)
//! - `T2` authority receive (authority clock)
//! - `T3` authority reply send (authority clock)
//! - `T4` client receive (client clock)
//!
//! Round trip is `T4 - T1`, one-way latency is half of it, and the offset is
//! `((T2 - T1) + (T3 - T4)) / 2`. A positive offset means the authority clock
//! is ahead of the client.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of epoch milliseconds.
pub trait WallClock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Operating system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests and simulations. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::Release);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::AcqRel);
    }
}

impl WallClock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}

impl<C: WallClock + ?Sized> WallClock for Arc<C> {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

/// One completed probe round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
    pub client_send: f64,
    pub server_receive: f64,
    pub server_send: f64,
    pub client_receive: f64,
}

impl ClockSample {
    pub fn new(client_send: f64, server_receive: f64, server_send: f64, client_receive: f64) -> Self {
        Self {
            client_send,
            server_receive,
            server_send,
            client_receive,
        }
    }

    #[inline]
    pub fn round_trip(&self) -> f64 {
        self.client_receive - self.client_send
    }

    /// Assumes a symmetric path.
    #[inline]
    pub fn latency(&self) -> f64 {
        self.round_trip() / 2.0
    }

    #[inline]
    pub fn offset(&self) -> f64 {
        ((self.server_receive - self.client_send) + (self.server_send - self.client_receive)) / 2.0
    }

    fn is_usable(&self) -> bool {
        self.round_trip().is_finite() && self.round_trip() >= 0.0 && self.offset().is_finite()
    }
}

/// Smoothed latency and offset for one client, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockEstimate {
    pub latency_ms: f64,
    pub offset_ms: f64,
    /// Number of samples that contributed.
    pub samples: usize,
}

impl ClockEstimate {
    /// Arithmetic mean over the usable samples. No samples yields `(0, 0)`.
    pub fn aggregate(samples: &[ClockSample]) -> Self {
        let (latency, offset, count) = samples
            .iter()
            .filter(|s| s.is_usable())
            .fold((0.0, 0.0, 0usize), |(l, o, n), s| {
                (l + s.latency(), o + s.offset(), n + 1)
            });

        if count == 0 {
            return Self::default();
        }
        Self {
            latency_ms: latency / count as f64,
            offset_ms: offset / count as f64,
            samples: count,
        }
    }

    #[inline]
    pub fn is_synchronized(&self) -> bool {
        self.samples > 0
    }

    /// Authority time corresponding to a local wall-clock reading.
    #[inline]
    pub fn server_time(&self, local_now_ms: f64) -> f64 {
        local_now_ms + self.offset_ms
    }
}
