//! The persisted job record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldsync_core::{CorrelationId, DomainError, DomainResult, JobId};

use crate::handlers::StatusHandlerKind;

/// Job execution status.
///
/// Valid transitions: `Queued -> Running -> Finished | Error`, plus the
/// forgiveness edge `Error -> Running` while the retry cap allows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Persisted, waiting for capacity.
    Queued,
    /// Admitted; a poll worker owns it until the remote system settles.
    Running,
    /// Remote system reported success.
    Finished,
    /// Remote failure, poll timeout, or exhausted retries.
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Error)
    }

    /// Non-terminal: the job still counts against the correlation-id
    /// de-duplication check.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Job family. One family is supported; anything else is forced to `Error`
/// by the dispatch loop rather than crashing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A job running on the remote backend, tracked via its status endpoint.
    Remote,
    /// Unrecognized family (e.g. written by a newer client version).
    Custom(String),
}

/// One tracked unit of remote work.
///
/// Serializable end to end so it can live in the durable store and travel
/// over the notification bus; the status handler is carried as a closed
/// enum rather than a function so the record stays plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    /// Caller tag naming the triggering operation (e.g. `"postInvMoves"`).
    pub sub_kind: String,
    pub status: JobStatus,
    pub handler: StatusHandlerKind,
    /// Incremented on each forgiveness cycle, never on the failure itself.
    pub error_count: u32,
    pub correlation_id: Option<CorrelationId>,
    /// Identifier of the job on the remote system; known only after the
    /// triggering call succeeded.
    pub external_ref: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a queued remote job.
    pub fn remote(sub_kind: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind: JobKind::Remote,
            sub_kind: sub_kind.into(),
            status: JobStatus::Queued,
            handler: StatusHandlerKind::Noop,
            error_count: 0,
            correlation_id: None,
            external_ref: None,
            message: None,
            error: None,
            created_at: now,
            modified_at: now,
            finished_at: None,
        }
    }

    pub fn with_handler(mut self, handler: StatusHandlerKind) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_correlation(mut self, correlation: CorrelationId) -> Self {
        self.correlation_id = Some(correlation);
        self
    }

    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    /// Queue-time validation. The document-mirror handler is unusable
    /// without a correlated document, so that combination is rejected up
    /// front instead of degrading silently at dispatch time.
    pub fn validate(&self) -> DomainResult<()> {
        if self.handler == StatusHandlerKind::DocumentMirror && self.correlation_id.is_none() {
            return Err(DomainError::validation(format!(
                "job {}: document_mirror handler requires a correlation id",
                self.id
            )));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    /// `Queued -> Running`.
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.touch();
    }

    /// `Running -> Finished`. Sets `finished_at`; the only transition that
    /// does.
    pub fn mark_finished(&mut self, message: Option<String>) {
        self.status = JobStatus::Finished;
        self.message = message;
        self.finished_at = Some(Utc::now());
        self.touch();
    }

    /// `Running -> Error`. Mirrors the failure text into both terminal
    /// fields.
    pub fn mark_errored(&mut self, error: impl Into<String>) {
        let text = error.into();
        self.status = JobStatus::Error;
        self.message = Some(text.clone());
        self.error = Some(text);
        self.touch();
    }

    /// Forgiveness edge: move an `Error` record back to `Running` for
    /// another attempt, charging one unit against the retry cap. Returns
    /// false (and leaves the record untouched) once the cap is reached or
    /// when the record is not in `Error`.
    pub fn forgive(&mut self, retry_cap: u32) -> bool {
        if self.status != JobStatus::Error || self.error_count >= retry_cap {
            return false;
        }
        self.error_count += 1;
        self.status = JobStatus::Running;
        self.message = None;
        self.error = None;
        self.finished_at = None;
        self.touch();
        true
    }
}
