//! Clock sync integration tests
//!
//! Runs the estimator against simulated links with controlled delay and
//! clock skew.

use crate::helpers::*;
use approx::assert_relative_eq;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use syncbeat::client::{ClockSyncEstimator, ProbeTransport, Result, SharedClockEstimate};
use syncbeat::protocol::Pong;
use syncbeat::{ManualClock, WallClock};

/// Per-round `(uplink_ms, downlink_ms)` delays. The authority clock runs
/// `skew_ms` ahead of the client clock and answers instantly.
struct Link {
    clock: ManualClock,
    skew_ms: i64,
    delays: VecDeque<(i64, i64)>,
    in_flight: Option<(Pong, i64)>,
}

impl Link {
    fn new(clock: ManualClock, skew_ms: i64, delays: impl IntoIterator<Item = (i64, i64)>) -> Self {
        Self {
            clock,
            skew_ms,
            delays: delays.into_iter().collect(),
            in_flight: None,
        }
    }
}

impl ProbeTransport for Link {
    async fn send_ping(&mut self, client_send_time: f64) -> Result<()> {
        let (up, down) = self.delays.pop_front().unwrap_or((0, 0));
        self.clock.advance(up);
        let server_now = (self.clock.now_ms() + self.skew_ms) as f64;
        self.in_flight = Some((
            Pong {
                client_send_time,
                server_receive_time: server_now,
                server_send_time: server_now,
            },
            down,
        ));
        Ok(())
    }

    async fn recv_pong(&mut self) -> Result<Pong> {
        let (pong, down) = self.in_flight.take().expect("pong without ping");
        self.clock.advance(down);
        Ok(pong)
    }
}

fn estimator(clock: &ManualClock) -> ClockSyncEstimator {
    ClockSyncEstimator::new(
        Arc::new(clock.clone()),
        Duration::from_secs(5),
        Duration::from_millis(100),
    )
}

#[tokio::test(start_paused = true)]
async fn test_symmetric_delay_identical_clocks() {
    let clock = ManualClock::new(TEST_EPOCH_MS);
    let delays = [(12, 12), (30, 30), (8, 8), (21, 21), (15, 15)];
    let mut link = Link::new(clock.clone(), 0, delays);

    let estimate = estimator(&clock).measure(&mut link, 5).await;

    assert_eq!(estimate.samples, 5);
    assert_relative_eq!(estimate.offset_ms, 0.0, epsilon = OFFSET_TOLERANCE_MS);
    // Mean one-way delay is 17.2ms, which is half the mean RTT.
    assert_relative_eq!(estimate.latency_ms, 17.2, epsilon = 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_symmetric_delay_with_skew() {
    let clock = ManualClock::new(TEST_EPOCH_MS);
    let mut link = Link::new(clock.clone(), -1_250, [(40, 40); 5]);

    let estimate = estimator(&clock).measure(&mut link, 5).await;
    assert_relative_eq!(estimate.offset_ms, -1_250.0, epsilon = OFFSET_TOLERANCE_MS);
    assert_relative_eq!(estimate.latency_ms, 40.0, epsilon = 1e-9);
}

/// One-way = RTT/2 is an accepted approximation: an asymmetric path shows up
/// as offset error of half the asymmetry.
#[tokio::test(start_paused = true)]
async fn test_asymmetric_path_biases_offset() {
    let clock = ManualClock::new(TEST_EPOCH_MS);
    let mut link = Link::new(clock.clone(), 0, [(50, 10); 5]);

    let estimate = estimator(&clock).measure(&mut link, 5).await;
    assert_relative_eq!(estimate.latency_ms, 30.0, epsilon = 1e-9);
    assert_relative_eq!(estimate.offset_ms, 20.0, epsilon = 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_probe_interval_spaces_rounds() {
    let clock = ManualClock::new(TEST_EPOCH_MS);
    let mut link = Link::new(clock.clone(), 0, [(1, 1); 4]);
    let started = tokio::time::Instant::now();

    estimator(&clock).measure(&mut link, 4).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(310));
}

#[test]
fn test_server_time_applies_offset() {
    let clock = ManualClock::new(TEST_EPOCH_MS);
    let shared = SharedClockEstimate::new(Arc::new(clock.clone()));
    shared.store(&syncbeat::ClockEstimate {
        latency_ms: 20.0,
        offset_ms: 480.0,
        samples: 5,
    });
    assert_eq!(shared.server_time(), (TEST_EPOCH_MS + 480) as f64);
}
