//! Roofwatch Request Pacer
//! Copyright (c) 2026 Mamy Ratsimbazafy
//! Licensed and distributed under either of
//!   * MIT license (license terms at the root of the package or at http://opensource.org/licenses/MIT).
//!   * Apache v2 license (license terms at the root of the package or at http://www.apache.org/licenses/LICENSE-2.0).
//! at your option. This file may not be copied, modified, or distributed except according to those terms.

//! roofwatch-internals/request-pacer
//! Spaces out sequential calls to an external service and runs each call exactly once.
//!
//! Calls are never retried: the services this is used against do not guarantee
//! idempotency on writes, and a failed read is reported rather than repeated.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time;

/// Custom error for the pacer
#[derive(Debug, Error)]
pub enum PacerError {
    #[error("request failed: {0}")]
    RequestFailed(#[source] anyhow::Error),
}

impl PacerError {
    /// Unwrap into the underlying request error.
    pub fn into_inner(self) -> anyhow::Error {
        match self {
            PacerError::RequestFailed(e) => e,
        }
    }
}

/// Serializes requests and enforces a minimum, jittered spacing between their start times.
///
/// # Examples
///
/// At most ~3 requests per second:
/// ```ignore
/// let pacer = RequestPacer::with_qps_limit(3);
/// let body = pacer.run_once(|| async { fetch().await }).await?;
/// ```
#[derive(Clone, Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    jitter_factor: f64,
    last_start: Arc<Mutex<Option<Instant>>>,
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(350),
            jitter_factor: 0.5,
            last_start: Arc::new(Mutex::new(None)),
        }
    }
}

impl RequestPacer {
    /// Create a pacer with a fixed minimum interval between request starts
    pub fn with_min_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            ..Default::default()
        }
    }

    /// Create a pacer allowing at most `qps_limit` request starts per second
    pub fn with_qps_limit(qps_limit: u64) -> Self {
        let qps_limit = qps_limit.max(1);
        Self::with_min_interval(Duration::from_millis(1000 / qps_limit))
    }

    /// Override the jitter factor (0.0 disables jitter)
    pub fn jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for this request's slot, then execute `f` exactly once.
    ///
    /// The slot lock is held until `f` resolves, so two requests never overlap.
    pub async fn run_once<T, F, Fut>(&self, f: F) -> Result<T, PacerError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
    {
        let mut last_start = self.last_start.lock().await;

        if let Some(previous) = *last_start {
            let spacing = self.apply_jitter(self.min_interval);
            let elapsed = previous.elapsed();
            if elapsed < spacing {
                time::sleep(spacing - elapsed).await;
            }
        }

        *last_start = Some(Instant::now());
        f().await.map_err(PacerError::RequestFailed)
    }

    /// Apply jitter to the delay
    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 {
            return delay;
        }

        let jitter_ms = (delay.as_millis() as f64 * self.jitter_factor) as u64;
        let rand_jitter = rand::thread_rng().gen_range(0..=jitter_ms);

        Duration::from_millis(delay.as_millis() as u64 + rand_jitter)
    }
}
