//! `fieldsync-core` — shared identifiers and the domain error model.
//!
//! Pure domain primitives only; no storage, transport, or runtime concerns.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{CorrelationId, JobId};
