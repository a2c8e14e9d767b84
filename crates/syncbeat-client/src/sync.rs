//! Clock sync estimator.
//!
//! Runs a batch of ping/pong probes against the authority and reduces them to
//! one latency and offset estimate. A probe that goes unanswered is dropped
//! from the batch; the batch itself never fails.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use syncbeat_core::{AtomicDouble, AtomicFlag, ClockEstimate, ClockSample, WallClock};
use syncbeat_protocol::Pong;

use crate::error::{ClientError, Result};

/// The request/response leg a probe travels over.
pub trait ProbeTransport: Send {
    /// Send a ping stamped with the local send instant.
    fn send_ping(&mut self, client_send_time: f64) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next pong.
    fn recv_pong(&mut self) -> impl Future<Output = Result<Pong>> + Send;
}

pub struct ClockSyncEstimator {
    clock: Arc<dyn WallClock>,
    probe_timeout: Duration,
    probe_interval: Duration,
}

impl ClockSyncEstimator {
    pub fn new(clock: Arc<dyn WallClock>, probe_timeout: Duration, probe_interval: Duration) -> Self {
        Self {
            clock,
            probe_timeout,
            probe_interval,
        }
    }

    /// Probe `sample_count` times and average the answered rounds.
    ///
    /// Zero answered rounds yields latency 0 and offset 0. A transport
    /// failure ends the batch early with whatever was collected.
    pub async fn measure<T: ProbeTransport>(&self, transport: &mut T, sample_count: usize) -> ClockEstimate {
        let mut samples = Vec::with_capacity(sample_count);

        for round in 0..sample_count {
            if round > 0 && !self.probe_interval.is_zero() {
                tokio::time::sleep(self.probe_interval).await;
            }
            match self.probe(transport).await {
                Ok(sample) => samples.push(sample),
                Err(e @ ClientError::ProbeTimeout { .. }) => {
                    tracing::warn!("Probe {} discarded: {}", round + 1, e);
                }
                Err(e) => {
                    tracing::warn!("Probing stopped after {} round(s): {}", round, e);
                    break;
                }
            }
        }

        let estimate = ClockEstimate::aggregate(&samples);
        tracing::info!(
            "Clock sync: latency {:.1}ms, offset {:.1}ms ({}/{} samples)",
            estimate.latency_ms,
            estimate.offset_ms,
            estimate.samples,
            sample_count
        );
        estimate
    }

    async fn probe<T: ProbeTransport>(&self, transport: &mut T) -> Result<ClockSample> {
        let t1 = self.clock.now_ms() as f64;
        transport.send_ping(t1).await?;

        let matched = async {
            loop {
                let pong = transport.recv_pong().await?;
                if pong.client_send_time == t1 {
                    return Ok::<_, ClientError>(pong);
                }
                tracing::debug!("Dropping pong for an earlier probe ({})", pong.client_send_time);
            }
        };
        let pong = tokio::time::timeout(self.probe_timeout, matched)
            .await
            .map_err(|_| ClientError::ProbeTimeout {
                timeout_ms: self.probe_timeout.as_millis() as u64,
            })??;
        let t4 = self.clock.now_ms() as f64;

        Ok(ClockSample::new(
            t1,
            pong.server_receive_time,
            pong.server_send_time,
            t4,
        ))
    }
}

/// Latest estimate, readable from the scheduler without locking.
#[derive(Clone)]
pub struct SharedClockEstimate {
    latency_ms: Arc<AtomicDouble>,
    offset_ms: Arc<AtomicDouble>,
    synchronized: Arc<AtomicFlag>,
    clock: Arc<dyn WallClock>,
}

impl SharedClockEstimate {
    pub fn new(clock: Arc<dyn WallClock>) -> Self {
        Self {
            latency_ms: Arc::new(AtomicDouble::new(0.0)),
            offset_ms: Arc::new(AtomicDouble::new(0.0)),
            synchronized: Arc::new(AtomicFlag::new(false)),
            clock,
        }
    }

    pub fn store(&self, estimate: &ClockEstimate) {
        self.latency_ms.set(estimate.latency_ms);
        self.offset_ms.set(estimate.offset_ms);
        self.synchronized.set(estimate.is_synchronized());
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms.get()
    }

    pub fn offset_ms(&self) -> f64 {
        self.offset_ms.get()
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized.get()
    }

    /// Local wall clock plus offset: the authority's clock as seen from here.
    pub fn server_time(&self) -> f64 {
        self.clock.now_ms() as f64 + self.offset_ms()
    }
}

impl std::fmt::Debug for SharedClockEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedClockEstimate")
            .field("latency_ms", &self.latency_ms())
            .field("offset_ms", &self.offset_ms())
            .field("synchronized", &self.is_synchronized())
            .finish()
    }
}
