//! The job manager: intake, capacity control, and the dispatch loop.
//!
//! Every status write is persisted to the durable store first and then fed
//! to two places: the manager's internal work queue (single consumer, the
//! dispatch loop, which is what drives the state machine forward) and the
//! notification bus (fan-out to external observers). Callers waiting on a
//! specific job hold their own filtered bus subscriptions, established
//! before the first publication so a same-instant terminal transition
//! cannot be missed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use fieldsync_core::{CorrelationId, DomainError, JobId};
use fieldsync_events::Bus;

use crate::handlers::{DocumentFlags, StatusHandlerKind, StatusHandlers};
use crate::poller::{PollerConfig, StatusPoller, StatusProbe};
use crate::record::{JobKind, JobRecord, JobStatus};
use crate::store::{JobStore, StoreError};

const UNKNOWN_FAMILY_ERROR: &str = "unknown job family";

/// Manager tuning knobs.
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Maximum jobs concurrently in `Running` at the manager's accounting.
    pub concurrency: usize,
    /// Forgiveness cycles allowed before an `Error` job is permanent.
    pub retry_cap: u32,
    /// Cadence/budget for the remote status poller.
    pub poll: PollerConfig,
    /// Dispatch loop receive tick (shutdown responsiveness).
    pub tick: Duration,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            retry_cap: 3,
            poll: PollerConfig::default(),
            tick: Duration::from_millis(50),
        }
    }
}

impl JobManagerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_retry_cap(mut self, retry_cap: u32) -> Self {
        self.retry_cap = retry_cap;
        self
    }

    pub fn with_poll(mut self, poll: PollerConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("triggering call failed: {0}")]
    Trigger(anyhow::Error),
    #[error("job {id} failed: {error}")]
    Failed { id: JobId, error: String },
    #[error("timed out waiting for job {id} to settle")]
    WaitTimeout { id: JobId },
}

/// Successful terminal outcome of a waited-on job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub id: JobId,
    pub message: Option<String>,
}

/// Deferred-activation handle returned by the create/queue API.
///
/// `start` performs the persist+publish; a no-op handle (returned when an
/// active job already exists for the correlation id) does nothing.
pub struct JobHandle {
    inner: Option<Box<dyn FnOnce() -> Result<(), JobError> + Send>>,
}

impl JobHandle {
    fn deferred(f: impl FnOnce() -> Result<(), JobError> + Send + 'static) -> Self {
        Self {
            inner: Some(Box::new(f)),
        }
    }

    pub fn noop() -> Self {
        Self { inner: None }
    }

    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    /// Activate the job. Consumes the handle; a handle starts at most once.
    pub fn start(mut self) -> Result<(), JobError> {
        match self.inner.take() {
            Some(f) => f(),
            None => Ok(()),
        }
    }
}

impl core::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobHandle")
            .field("noop", &self.is_noop())
            .finish()
    }
}

/// Mutable manager state. One mutex owns all of it; mutations never hold
/// the lock across store or bus calls.
///
/// Both sets are keyed by job id so the accounting stays honest under
/// duplicate dispatches: `in_flight` holds only jobs that passed the
/// admission gate, `polling` only jobs with a live poll worker.
#[derive(Debug)]
struct ManagerState {
    running: bool,
    offline: bool,
    in_flight: HashSet<JobId>,
    polling: HashSet<JobId>,
}

/// Durable asynchronous job manager.
pub struct JobManager<S, B>
where
    S: JobStore + 'static,
    B: Bus<JobRecord> + 'static,
{
    config: JobManagerConfig,
    store: Arc<S>,
    bus: Arc<B>,
    poller: StatusPoller,
    handlers: StatusHandlers,
    state: Mutex<ManagerState>,
    work: mpsc::Sender<JobRecord>,
    shutdown: mpsc::Sender<()>,
    dispatch: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<S, B> JobManager<S, B>
where
    S: JobStore + 'static,
    B: Bus<JobRecord> + 'static,
{
    /// Build the manager and spawn its dispatch thread.
    ///
    /// The dispatch loop is the sole consumer of the internal work queue;
    /// the bus carries only outbound notifications. The manager starts
    /// stopped and online; call `start`.
    pub fn spawn(
        config: JobManagerConfig,
        store: Arc<S>,
        bus: Arc<B>,
        probe: Arc<dyn StatusProbe>,
        flags: Arc<dyn DocumentFlags>,
    ) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (work_tx, work_rx) = mpsc::channel::<JobRecord>();
        let poller = StatusPoller::new(probe, config.poll.clone());

        let manager = Arc::new(Self {
            config,
            store,
            bus,
            poller,
            handlers: StatusHandlers::new(flags),
            state: Mutex::new(ManagerState {
                running: false,
                offline: false,
                in_flight: HashSet::new(),
                polling: HashSet::new(),
            }),
            work: work_tx,
            shutdown: shutdown_tx,
            dispatch: Mutex::new(None),
        });

        let dispatcher = Arc::clone(&manager);
        let join = thread::Builder::new()
            .name("job-dispatch".to_string())
            .spawn(move || dispatch_loop(&dispatcher, &work_rx, &shutdown_rx))
            .expect("failed to spawn job dispatch thread");
        *manager.dispatch.lock().unwrap() = Some(join);

        manager
    }

    /// Begin acting on publications and resume work left over from a
    /// previous process: top up with the full cap, running jobs first, so an
    /// unclean shutdown looks like the job made no progress since its last
    /// persisted write.
    pub fn start(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.running {
                return;
            }
            state.running = true;
        }
        info!("job manager started");
        self.top_up(self.config.concurrency, true);
    }

    /// Withhold new dispatch actions. In-flight polls keep going and will
    /// still persist and publish their outcome.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.running = false;
        info!("job manager stopped");
    }

    /// Feed the network-reachability signal. Going back online tops up with
    /// whatever capacity is free, running jobs first, so work forgiven or
    /// interrupted while offline is re-polled without a restart.
    pub fn set_offline(&self, offline: bool) {
        let reconnected_capacity = {
            let mut state = self.state.lock().unwrap();
            let was_offline = state.offline;
            state.offline = offline;
            if was_offline && !offline {
                Some(self.config.concurrency.saturating_sub(state.in_flight.len()))
            } else {
                None
            }
        };

        if offline {
            info!("network lost; pausing job intake");
        } else if let Some(free) = reconnected_capacity {
            info!(free, "network restored; resuming job intake");
            self.top_up(free, true);
        }
    }

    /// Forward a reachability stream (`true` = offline) into `set_offline`.
    /// The watcher thread ends when the sending side is dropped.
    pub fn watch_reachability(self: Arc<Self>, signal: mpsc::Receiver<bool>) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("reachability-watch".to_string())
            .spawn(move || {
                while let Ok(offline) = signal.recv() {
                    self.set_offline(offline);
                }
            })
            .expect("failed to spawn reachability watcher thread")
    }

    /// Re-admit up to `n` jobs by feeding their stored records, unchanged,
    /// back to the dispatch loop. With `include_running`, interrupted
    /// `Running` jobs go first and `Queued` records fill the remainder.
    pub fn top_up(&self, n: usize, include_running: bool) {
        if n == 0 {
            return;
        }

        let mut batch = Vec::new();
        if include_running {
            match self.store.find_by_status(JobStatus::Running, n) {
                Ok(records) => batch.extend(records),
                Err(e) => error!(error = %e, "top-up query for running jobs failed"),
            }
        }
        if batch.len() < n {
            match self.store.find_by_status(JobStatus::Queued, n - batch.len()) {
                Ok(records) => batch.extend(records),
                Err(e) => error!(error = %e, "top-up query for queued jobs failed"),
            }
        }

        debug!(count = batch.len(), include_running, "topping up");
        for record in batch {
            self.dispatch(record);
        }
    }

    /// Persist + publish, fire and forget.
    pub fn queue(&self, record: JobRecord) -> Result<(), JobError> {
        record.validate()?;
        self.persist_and_publish(&record)
    }

    /// Persist + publish, then block until the first terminal publication
    /// for this job. Resolves exactly once: `Finished` yields the outcome,
    /// `Error` fails with the record's error text. The subscription is
    /// established before anything is published so a same-instant terminal
    /// transition cannot slip past the waiter.
    pub fn queue_and_wait(
        &self,
        record: JobRecord,
        deadline: Duration,
    ) -> Result<JobOutcome, JobError> {
        record.validate()?;
        let id = record.id;
        let subscription = self.bus.subscribe();
        self.persist_and_publish(&record)?;

        let terminal = subscription
            .recv_where(deadline, |r: &JobRecord| r.id == id && r.status.is_terminal())
            .map_err(|_| JobError::WaitTimeout { id })?;

        if terminal.status == JobStatus::Finished {
            Ok(JobOutcome {
                id,
                message: terminal.message,
            })
        } else {
            Err(JobError::Failed {
                id,
                error: terminal.error.unwrap_or_else(|| "job failed".to_string()),
            })
        }
    }

    /// Validate now, activate later: the returned handle performs the
    /// persist+publish when `start` is invoked, letting the caller register
    /// its own listeners first.
    pub fn queue_and_get_handle(self: &Arc<Self>, record: JobRecord) -> Result<JobHandle, JobError> {
        record.validate()?;
        let manager = Arc::clone(self);
        Ok(JobHandle::deferred(move || {
            manager.persist_and_publish(&record)
        }))
    }

    /// The composite used by business call sites: de-duplicate by
    /// correlation id, run the triggering call, and queue a job tracking
    /// the remote reference extracted from its reply.
    ///
    /// De-duplication is check-then-act against the store (no transaction);
    /// two racing calls for the same correlation id can both create a job.
    /// When an active job exists the trigger is not invoked and a no-op
    /// handle comes back.
    pub fn create_remote_job<F>(
        self: &Arc<Self>,
        sub_kind: impl Into<String>,
        correlation: CorrelationId,
        handler: StatusHandlerKind,
        trigger: F,
    ) -> Result<JobHandle, JobError>
    where
        F: FnOnce() -> Result<String, anyhow::Error>,
    {
        if let Some(existing) = self.store.find_active_by_correlation(&correlation)? {
            info!(
                correlation = %correlation,
                existing = %existing.id,
                "active job exists for correlation; skipping duplicate"
            );
            return Ok(JobHandle::noop());
        }

        let external_ref = trigger().map_err(JobError::Trigger)?;
        let record = JobRecord::remote(sub_kind)
            .with_handler(handler)
            .with_correlation(correlation)
            .with_external_ref(external_ref);
        self.queue_and_get_handle(record)
    }

    /// Stop the dispatch thread and wait for it.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.dispatch.lock().unwrap().take() {
            let _ = join.join();
        }
    }

    fn persist_and_publish(&self, record: &JobRecord) -> Result<(), JobError> {
        self.store.save(record)?;
        self.dispatch(record.clone());
        // Not transactional with the save: a failed publish is repaired by
        // the next top-up from the store.
        if let Err(e) = self.bus.publish(record.clone()) {
            warn!(job_id = %record.id, error = ?e, "publish after persist failed");
        }
        Ok(())
    }

    /// Hand one record to the dispatch loop.
    pub(crate) fn dispatch(&self, record: JobRecord) {
        if let Err(e) = self.work.send(record) {
            warn!(job_id = %e.0.id, "dispatch queue closed; record dropped");
        }
    }

    /// One dispatch cycle for one record off the work queue. Failures are
    /// contained here; one bad job never stops the loop.
    fn handle_record(&self, record: JobRecord) {
        let paused = {
            let state = self.state.lock().unwrap();
            !state.running || state.offline
        };

        if paused {
            match record.status {
                // Left untouched; a later top-up re-admits them.
                JobStatus::Queued | JobStatus::Running => return,
                JobStatus::Error if record.error_count < self.config.retry_cap => {
                    let mut record = record;
                    if record.forgive(self.config.retry_cap) {
                        debug!(job_id = %record.id, error_count = record.error_count, "forgiving failed job");
                        // The failed poll has ended; the forgiven job needs
                        // a fresh one once re-admitted.
                        self.state.lock().unwrap().polling.remove(&record.id);
                        if let Err(e) = self.persist_and_publish(&record) {
                            error!(job_id = %record.id, error = %e, "failed to persist forgiveness");
                        }
                    }
                    return;
                }
                // Terminal outcomes still settle below even while paused.
                _ => {}
            }
        }

        // Handler failures are logged and swallowed by policy: the job's
        // persisted status is the poller's to decide, not the handler's.
        if let Err(e) = self.handlers.run(&record) {
            warn!(job_id = %record.id, error = %e, "status handler failed; job status unchanged");
        }

        // Reload so a write that raced the dispatch is observed.
        let current = match self.store.get(record.id) {
            Ok(Some(r)) => r,
            Ok(None) => record,
            Err(e) => {
                error!(job_id = %record.id, error = %e, "reload after handler failed");
                return;
            }
        };

        if current.status.is_terminal() {
            let free = {
                let mut state = self.state.lock().unwrap();
                state.polling.remove(&current.id);
                // Only a job that actually passed the admission gate frees
                // a slot; removal is idempotent under duplicate terminals.
                state.in_flight.remove(&current.id);
                self.config.concurrency.saturating_sub(state.in_flight.len())
            };
            self.top_up(free, false);
        }

        match current.kind {
            JobKind::Remote => self.continue_remote(current),
            JobKind::Custom(_) => self.fail_unknown_family(current),
        }
    }

    /// Defensive fallback: unexpected families are failed, not dispatched,
    /// so one bad record cannot wedge the loop.
    fn fail_unknown_family(&self, mut record: JobRecord) {
        if record.status.is_terminal() {
            return;
        }
        warn!(job_id = %record.id, kind = ?record.kind, "unknown job family");
        record.mark_errored(UNKNOWN_FAMILY_ERROR);
        if let Err(e) = self.persist_and_publish(&record) {
            error!(job_id = %record.id, error = %e, "failed to fail unknown-family job");
        }
    }

    /// The remote-job sub-state-machine.
    fn continue_remote(&self, record: JobRecord) {
        match record.status {
            JobStatus::Queued => {
                let admitted = {
                    let mut state = self.state.lock().unwrap();
                    state.in_flight.len() < self.config.concurrency
                        && state.in_flight.insert(record.id)
                };
                if !admitted {
                    debug!(job_id = %record.id, "at capacity; job stays queued");
                    return;
                }

                let mut record = record;
                record.mark_running();
                debug!(job_id = %record.id, sub_kind = %record.sub_kind, "job admitted");
                if let Err(e) = self.persist_and_publish(&record) {
                    error!(job_id = %record.id, error = %e, "failed to persist admission");
                    self.state.lock().unwrap().in_flight.remove(&record.id);
                }
                // The Running continuation is re-entered via the work item
                // just enqueued.
            }
            JobStatus::Running => self.spawn_poll(record),
            JobStatus::Finished | JobStatus::Error => {}
        }
    }

    /// Run the status poll for one job on its own worker thread. The worker
    /// outlives `stop`; its outcome is persisted and published regardless.
    ///
    /// At most one worker per job: duplicate `Running` dispatches (racing
    /// top-ups, reconnect re-admission while a poll is live) are dropped
    /// here.
    fn spawn_poll(&self, record: JobRecord) {
        let Some(external_ref) = record.external_ref.clone() else {
            warn!(job_id = %record.id, "running job has no external reference");
            let mut record = record;
            record.mark_errored("job has no external reference");
            if let Err(e) = self.persist_and_publish(&record) {
                error!(job_id = %record.id, error = %e, "failed to fail unreferenced job");
            }
            return;
        };

        let id = record.id;
        {
            let mut state = self.state.lock().unwrap();
            if !state.polling.insert(id) {
                debug!(job_id = %id, "poll already in flight");
                return;
            }
        }

        let store = Arc::clone(&self.store);
        let bus = Arc::clone(&self.bus);
        let work = self.work.clone();
        let poller = self.poller.clone();
        let mut record = record;

        let spawned = thread::Builder::new()
            .name(format!("job-poll-{}", record.id))
            .spawn(move || {
                match poller.await_outcome(&external_ref) {
                    Ok(message) => record.mark_finished(message),
                    Err(e) => record.mark_errored(e.to_string()),
                }

                if let Err(e) = store.save(&record) {
                    error!(job_id = %record.id, error = %e, "failed to persist poll outcome");
                    return;
                }
                if work.send(record.clone()).is_err() {
                    warn!(job_id = %record.id, "dispatch queue closed; outcome not settled");
                }
                if let Err(e) = bus.publish(record.clone()) {
                    warn!(job_id = %record.id, error = ?e, "failed to publish poll outcome");
                }
            });
        if let Err(e) = spawned {
            error!(error = %e, "failed to spawn poll worker thread");
            self.state.lock().unwrap().polling.remove(&id);
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }
}

fn dispatch_loop<S, B>(
    manager: &Arc<JobManager<S, B>>,
    work_rx: &mpsc::Receiver<JobRecord>,
    shutdown_rx: &mpsc::Receiver<()>,
) where
    S: JobStore + 'static,
    B: Bus<JobRecord> + 'static,
{
    debug!("dispatch loop running");
    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match work_rx.recv_timeout(manager.config.tick) {
            Ok(record) => manager.handle_record(record),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("dispatch loop ended");
}
