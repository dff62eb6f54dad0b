//! Posting markers mirrored onto local documents.
//!
//! The document-mirror status handler writes these as a job progresses, so
//! the UI can show a document as in-flight, posted, or failed without
//! knowing anything about jobs.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use fieldsync_core::CorrelationId;
use fieldsync_jobs::{DocumentFlags, HandlerError};

/// Posting state of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingMarker {
    Processing,
    Posted { message: Option<String> },
    Error { error: String },
}

/// In-memory marker store keyed by document id.
#[derive(Debug, Default)]
pub struct InMemoryDocumentFlags {
    markers: RwLock<HashMap<String, PostingMarker>>,
}

impl InMemoryDocumentFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self, doc: &CorrelationId) -> Option<PostingMarker> {
        self.markers
            .read()
            .ok()
            .and_then(|m| m.get(doc.as_str()).cloned())
    }

    fn set(&self, doc: &CorrelationId, marker: PostingMarker) -> Result<(), HandlerError> {
        let mut markers = self
            .markers
            .write()
            .map_err(|_| HandlerError::Flags("marker store poisoned".into()))?;
        markers.insert(doc.as_str().to_owned(), marker);
        Ok(())
    }
}

impl DocumentFlags for InMemoryDocumentFlags {
    fn mark_processing(&self, doc: &CorrelationId) -> Result<(), HandlerError> {
        self.set(doc, PostingMarker::Processing)
    }

    fn mark_posted(&self, doc: &CorrelationId, message: Option<&str>) -> Result<(), HandlerError> {
        self.set(
            doc,
            PostingMarker::Posted {
                message: message.map(str::to_owned),
            },
        )
    }

    fn mark_error(&self, doc: &CorrelationId, error: &str) -> Result<(), HandlerError> {
        self.set(
            doc,
            PostingMarker::Error {
                error: error.to_owned(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_overwrite_as_the_job_progresses() {
        let flags = InMemoryDocumentFlags::new();
        let doc: CorrelationId = "doc-1".into();

        flags.mark_processing(&doc).unwrap();
        assert_eq!(flags.marker(&doc), Some(PostingMarker::Processing));

        flags.mark_posted(&doc, Some("posted")).unwrap();
        assert_eq!(
            flags.marker(&doc),
            Some(PostingMarker::Posted {
                message: Some("posted".into())
            })
        );
    }

    #[test]
    fn error_marker_carries_the_text() {
        let flags = InMemoryDocumentFlags::new();
        let doc: CorrelationId = "doc-2".into();

        flags.mark_error(&doc, "rejected").unwrap();
        assert_eq!(
            flags.marker(&doc),
            Some(PostingMarker::Error {
                error: "rejected".into()
            })
        );
    }
}
