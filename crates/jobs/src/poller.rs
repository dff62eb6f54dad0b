//! Remote job status polling.
//!
//! One network call type exists at this boundary: fetch the status of a
//! remote job by its external reference. The poller repeats that call on a
//! fixed interval until the remote side stops processing or the wall-clock
//! budget runs out.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Reply of the remote status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub processing: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed status reply: {0}")]
    Decode(String),
}

/// The status-endpoint transport, supplied by the HTTP layer.
pub trait StatusProbe: Send + Sync {
    fn status(&self, external_ref: &str) -> Result<RemoteStatus, ProbeError>;
}

/// Polling cadence and budget.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between status checks.
    pub interval: Duration,
    /// Total wall-clock budget; defaults to three intervals when unset.
    pub budget: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            budget: None,
        }
    }
}

impl PollerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn effective_budget(&self) -> Duration {
        self.budget.unwrap_or(self.interval * 3)
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    /// The remote job settled but reported a failure.
    #[error("remote job failed: {0}")]
    Remote(String),
    /// Still processing when the budget ran out.
    #[error("remote job still processing after {elapsed_ms}ms")]
    TimedOut { elapsed_ms: u64 },
    /// Transport or decode failure; not retried by the poller.
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Polls one external job reference to completion.
#[derive(Clone)]
pub struct StatusPoller {
    probe: Arc<dyn StatusProbe>,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(probe: Arc<dyn StatusProbe>, config: PollerConfig) -> Self {
        Self { probe, config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Poll until the remote job stops processing.
    ///
    /// Resolves with the remote side's optional message. A transport or
    /// decode failure rejects immediately; a job still processing past the
    /// budget rejects with a timeout. Blocks the calling thread between
    /// polls, so run this on a dedicated worker.
    pub fn await_outcome(&self, external_ref: &str) -> Result<Option<String>, PollError> {
        let budget = self.config.effective_budget();
        let started = Instant::now();

        loop {
            let status = self.probe.status(external_ref)?;
            let elapsed = started.elapsed();

            if !status.processing {
                return match status.error {
                    None => {
                        info!(
                            external_ref,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "remote job settled"
                        );
                        Ok(status.message)
                    }
                    Some(error) => {
                        warn!(
                            external_ref,
                            elapsed_ms = elapsed.as_millis() as u64,
                            error = %error,
                            "remote job settled with failure"
                        );
                        Err(PollError::Remote(error))
                    }
                };
            }

            if elapsed >= budget {
                warn!(
                    external_ref,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "gave up waiting for remote job"
                );
                return Err(PollError::TimedOut {
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }

            debug!(external_ref, "remote job still processing");
            thread::sleep(self.config.interval);
        }
    }
}
