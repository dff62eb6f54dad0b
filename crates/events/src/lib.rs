//! `fieldsync-events` — notification bus primitive.
//!
//! A broadcast channel with multiple independent subscribers: every
//! published value reaches all currently-active subscribers, and a
//! subscription only sees values published after it was established.

pub mod bus;
pub mod in_memory_bus;

pub use bus::{Bus, Subscription};
pub use in_memory_bus::InMemoryBus;
