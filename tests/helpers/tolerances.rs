//! Tolerance levels for timing assertions.

/// Audio-clock arithmetic on exact grids (seconds).
pub const GRID_EPSILON_SECS: f64 = 1e-6;

/// Offset estimates over a symmetric simulated link (ms).
pub const OFFSET_TOLERANCE_MS: f64 = 1.0;

/// Real localhost round trips (ms).
pub const LOOPBACK_TOLERANCE_MS: f64 = 50.0;

/// Upper bound for waiting on a network event in real time.
pub const EVENT_TIMEOUT_MS: u64 = 5_000;
