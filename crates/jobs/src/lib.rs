//! `fieldsync-jobs` — durable asynchronous job tracking.
//!
//! Tracks long-running jobs triggered on a remote system: persists a state
//! machine per job, bounds concurrency, pauses intake while offline or
//! stopped, retries failures up to a cap, de-duplicates creation by
//! correlation id, and notifies waiters exactly once of the terminal
//! outcome. Every status write goes to the durable store first and is then
//! fed to the manager's internal work queue, which drives the state
//! machine, and broadcast on the notification bus for external waiters.

pub mod handlers;
pub mod manager;
pub mod poller;
pub mod record;
pub mod store;


pub use handlers::{DocumentFlags, HandlerError, NoopFlags, StatusHandlerKind, StatusHandlers};
pub use manager::{JobError, JobHandle, JobManager, JobManagerConfig, JobOutcome};
pub use poller::{PollError, PollerConfig, ProbeError, RemoteStatus, StatusPoller, StatusProbe};
pub use record::{JobKind, JobRecord, JobStatus};
pub use store::{InMemoryJobStore, JobStore, StoreError};
