//! In-process fan-out bus.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{Bus, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    /// Publish failed because the subscriber list lock was poisoned.
    #[error("bus subscriber list poisoned")]
    Poisoned,
}

/// In-memory broadcast bus.
///
/// Fan-out is best effort: subscribers whose receiving end has been dropped
/// are pruned on the next publish. Values published before `subscribe` are
/// never delivered to that subscription.
#[derive(Debug)]
pub struct InMemoryBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryBus<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for InMemoryBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> Bus<M> for InMemoryBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, value: M) -> Result<(), Self::Error> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| InMemoryBusError::Poisoned)?;

        subs.retain(|tx| tx.send(value.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn every_subscriber_sees_every_value() {
        let bus = InMemoryBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(1_u32).unwrap();
        bus.publish(2_u32).unwrap();

        assert_eq!(a.recv().unwrap(), 1);
        assert_eq!(a.recv().unwrap(), 2);
        assert_eq!(b.recv().unwrap(), 1);
        assert_eq!(b.recv().unwrap(), 2);
    }

    #[test]
    fn subscription_misses_values_published_before_it() {
        let bus = InMemoryBus::new();
        bus.publish("early").unwrap();

        let late = bus.subscribe();
        bus.publish("late").unwrap();

        assert_eq!(late.recv().unwrap(), "late");
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_do_not_block_publish() {
        let bus = InMemoryBus::new();
        drop(bus.subscribe());

        bus.publish(7_u8).unwrap();

        let live = bus.subscribe();
        bus.publish(8_u8).unwrap();
        assert_eq!(live.recv().unwrap(), 8);
    }

    #[test]
    fn recv_timeout_expires_on_a_quiet_bus() {
        let bus: InMemoryBus<u32> = InMemoryBus::new();
        let sub = bus.subscribe();

        assert!(sub.recv_timeout(Duration::from_millis(20)).is_err());

        bus.publish(5).unwrap();
        assert_eq!(sub.recv_timeout(Duration::from_secs(1)).unwrap(), 5);
    }

    #[test]
    fn recv_where_skips_non_matching_values() {
        let bus = InMemoryBus::new();
        let sub = bus.subscribe();

        bus.publish(1_u32).unwrap();
        bus.publish(2_u32).unwrap();
        bus.publish(3_u32).unwrap();

        let hit = sub
            .recv_where(Duration::from_secs(1), |v| *v == 3)
            .unwrap();
        assert_eq!(hit, 3);
    }

    #[test]
    fn recv_where_times_out_without_a_match() {
        let bus = InMemoryBus::new();
        let sub = bus.subscribe();
        bus.publish(1_u32).unwrap();

        let miss = sub.recv_where(Duration::from_millis(20), |v| *v == 9);
        assert!(miss.is_err());
    }
}
