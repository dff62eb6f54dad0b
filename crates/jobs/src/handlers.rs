//! Status handlers.
//!
//! A job record carries *which* side effect to run on each status change,
//! but must stay plain serializable data. The handler is therefore a closed
//! enum dispatched here; an unknown name fails deserialization of the
//! record itself, so a bad registration is caught when the job is built,
//! not inside the dispatch loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fieldsync_core::{CorrelationId, JobId};

use crate::record::{JobRecord, JobStatus};

/// Named status handler carried by a job record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusHandlerKind {
    /// No side effect.
    #[default]
    Noop,
    /// Mirror the job status onto the correlated source document.
    DocumentMirror,
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("job {0} carries no correlation id for document mirroring")]
    MissingCorrelation(JobId),
    #[error("document flag update failed: {0}")]
    Flags(String),
}

/// The externally-owned document the mirror handler writes markers onto.
pub trait DocumentFlags: Send + Sync {
    fn mark_processing(&self, doc: &CorrelationId) -> Result<(), HandlerError>;
    fn mark_posted(&self, doc: &CorrelationId, message: Option<&str>) -> Result<(), HandlerError>;
    fn mark_error(&self, doc: &CorrelationId, error: &str) -> Result<(), HandlerError>;
}

/// `DocumentFlags` that does nothing, for managers without a document store.
#[derive(Debug, Default)]
pub struct NoopFlags;

impl DocumentFlags for NoopFlags {
    fn mark_processing(&self, _doc: &CorrelationId) -> Result<(), HandlerError> {
        Ok(())
    }

    fn mark_posted(&self, _doc: &CorrelationId, _message: Option<&str>) -> Result<(), HandlerError> {
        Ok(())
    }

    fn mark_error(&self, _doc: &CorrelationId, _error: &str) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Dispatches a record's handler against its current status.
#[derive(Clone)]
pub struct StatusHandlers {
    flags: Arc<dyn DocumentFlags>,
}

impl StatusHandlers {
    pub fn new(flags: Arc<dyn DocumentFlags>) -> Self {
        Self { flags }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopFlags))
    }

    /// Run the handler for one status publication. The caller owns the
    /// policy for failures; this only reports them.
    pub fn run(&self, record: &JobRecord) -> Result<(), HandlerError> {
        match record.handler {
            StatusHandlerKind::Noop => Ok(()),
            StatusHandlerKind::DocumentMirror => {
                let doc = record
                    .correlation_id
                    .as_ref()
                    .ok_or(HandlerError::MissingCorrelation(record.id))?;
                match record.status {
                    JobStatus::Queued => self.flags.mark_processing(doc),
                    JobStatus::Running => Ok(()),
                    JobStatus::Finished => self.flags.mark_posted(doc, record.message.as_deref()),
                    JobStatus::Error => self
                        .flags
                        .mark_error(doc, record.error.as_deref().unwrap_or("job failed")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::record::JobRecord;

    /// Records every marker call for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingFlags {
        pub calls: Mutex<Vec<String>>,
    }

    impl DocumentFlags for RecordingFlags {
        fn mark_processing(&self, doc: &CorrelationId) -> Result<(), HandlerError> {
            self.calls.lock().unwrap().push(format!("processing:{doc}"));
            Ok(())
        }

        fn mark_posted(
            &self,
            doc: &CorrelationId,
            message: Option<&str>,
        ) -> Result<(), HandlerError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("posted:{doc}:{}", message.unwrap_or("-")));
            Ok(())
        }

        fn mark_error(&self, doc: &CorrelationId, error: &str) -> Result<(), HandlerError> {
            self.calls.lock().unwrap().push(format!("error:{doc}:{error}"));
            Ok(())
        }
    }

    fn mirror_job() -> JobRecord {
        JobRecord::remote("postInvMoves")
            .with_handler(StatusHandlerKind::DocumentMirror)
            .with_correlation("doc-1".into())
    }

    #[test]
    fn noop_handler_touches_nothing() {
        let flags = Arc::new(RecordingFlags::default());
        let handlers = StatusHandlers::new(flags.clone());

        let mut job = JobRecord::remote("postInvMoves");
        handlers.run(&job).unwrap();
        job.mark_running();
        job.mark_finished(None);
        handlers.run(&job).unwrap();

        assert!(flags.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn mirror_marks_each_stage_on_the_document() {
        let flags = Arc::new(RecordingFlags::default());
        let handlers = StatusHandlers::new(flags.clone());

        let mut job = mirror_job();
        handlers.run(&job).unwrap();

        job.mark_running();
        handlers.run(&job).unwrap();

        job.mark_finished(Some("posted upstream".into()));
        handlers.run(&job).unwrap();

        let calls = flags.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                "processing:doc-1".to_string(),
                "posted:doc-1:posted upstream".to_string(),
            ]
        );
    }

    #[test]
    fn mirror_reports_the_error_text() {
        let flags = Arc::new(RecordingFlags::default());
        let handlers = StatusHandlers::new(flags.clone());

        let mut job = mirror_job();
        job.mark_running();
        job.mark_errored("remote rejected it");
        handlers.run(&job).unwrap();

        assert_eq!(
            *flags.calls.lock().unwrap(),
            vec!["error:doc-1:remote rejected it".to_string()]
        );
    }

    #[test]
    fn mirror_without_correlation_is_an_error() {
        let handlers = StatusHandlers::noop();
        let mut job = JobRecord::remote("postInvMoves");
        job.handler = StatusHandlerKind::DocumentMirror;

        assert!(matches!(
            handlers.run(&job),
            Err(HandlerError::MissingCorrelation(_))
        ));
    }
}
