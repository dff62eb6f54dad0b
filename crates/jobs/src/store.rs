//! Durable store boundary for job records.
//!
//! The real client keeps these in the device-local document database; the
//! manager only depends on this trait. Implementations must support lookup
//! by status and by correlation id (secondary indexes on the real store).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use fieldsync_core::{CorrelationId, JobId};

use crate::record::{JobRecord, JobStatus};

/// Keyed record store with the two secondary lookups the manager needs.
pub trait JobStore: Send + Sync {
    fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Insert or replace. Every caller publishes the record on the bus
    /// right after a successful save.
    fn save(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Up to `limit` records in `status`, oldest first.
    fn find_by_status(&self, status: JobStatus, limit: usize)
    -> Result<Vec<JobRecord>, StoreError>;

    /// The non-terminal record for a correlation id, if any. At most one
    /// should exist (best-effort invariant, checked at creation time).
    fn find_active_by_correlation(
        &self,
        correlation: &CorrelationId,
    ) -> Result<Option<JobRecord>, StoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,
    #[error("storage error: {0}")]
    Storage(String),
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        (**self).get(id)
    }

    fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        (**self).save(record)
    }

    fn find_by_status(
        &self,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        (**self).find_by_status(status, limit)
    }

    fn find_active_by_correlation(
        &self,
        correlation: &CorrelationId,
    ) -> Result<Option<JobRecord>, StoreError> {
        (**self).find_active_by_correlation(correlation)
    }
}

/// In-memory store for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|j| j.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStore for InMemoryJobStore {
    fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(jobs.get(&id).cloned())
    }

    fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::Poisoned)?;
        jobs.insert(record.id, record.clone());
        Ok(())
    }

    fn find_by_status(
        &self,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::Poisoned)?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();

        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    fn find_active_by_correlation(
        &self,
        correlation: &CorrelationId,
    ) -> Result<Option<JobRecord>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(jobs
            .values()
            .find(|j| j.status.is_active() && j.correlation_id.as_ref() == Some(correlation))
            .cloned())
    }
}
