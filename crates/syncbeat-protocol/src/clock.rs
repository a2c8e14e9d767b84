//! Wall clock driven by the tokio time source.

use std::time::{SystemTime, UNIX_EPOCH};
use syncbeat_core::WallClock;
use tokio::time::Instant;

/// Epoch milliseconds that advance with `tokio::time`.
///
/// Anchored to the system clock once at construction. Timers armed with
/// `tokio::time::sleep` and instants read from this clock share one time
/// base, including under a paused test runtime.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeClock {
    anchor_ms: i64,
    anchor: Instant,
}

impl RuntimeClock {
    pub fn new() -> Self {
        let anchor_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self::anchored_at(anchor_ms)
    }

    /// Start reading `anchor_ms` now.
    pub fn anchored_at(anchor_ms: i64) -> Self {
        Self {
            anchor_ms,
            anchor: Instant::now(),
        }
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for RuntimeClock {
    fn now_ms(&self) -> i64 {
        self.anchor_ms + self.anchor.elapsed().as_millis() as i64
    }
}
