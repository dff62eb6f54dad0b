//! Publish/subscribe abstraction (mechanics only).
//!
//! The bus distributes values; it never stores them. Persistence always
//! happens *before* publication, so a lost publication can be repaired by
//! republishing from the store. Delivery is at-most-once per active
//! subscriber and there is no replay: subscribe before you publish anything
//! you intend to observe.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

/// A subscription to a value stream.
///
/// Each subscription receives its own copy of every value published after
/// the subscription was established (broadcast semantics). Designed for
/// single-threaded consumption.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next value is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Receive without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a value.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Block until a value matching `pred` arrives, or the deadline passes.
    ///
    /// Non-matching values are consumed and discarded — use a dedicated
    /// subscription for filtered waits.
    pub fn recv_where<F>(&self, deadline: Duration, mut pred: F) -> Result<M, RecvTimeoutError>
    where
        F: FnMut(&M) -> bool,
    {
        let started = Instant::now();
        loop {
            let remaining = deadline
                .checked_sub(started.elapsed())
                .ok_or(RecvTimeoutError::Timeout)?;
            let value = self.receiver.recv_timeout(remaining)?;
            if pred(&value) {
                return Ok(value);
            }
        }
    }
}

/// Domain-agnostic notification bus.
///
/// Implementations must be safe to publish to from multiple threads.
/// `publish` failures are surfaced to the caller; since values are always
/// persisted first, republishing after a failure is safe.
pub trait Bus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, value: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> Bus<M> for Arc<B>
where
    B: Bus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, value: M) -> Result<(), Self::Error> {
        (**self).publish(value)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
