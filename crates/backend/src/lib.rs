//! `fieldsync-backend` — domain plumbing around the job manager.
//!
//! Document shapes for the backend-triggering postings, the REST-call
//! boundary, the business call sites that create tracked jobs, local
//! posting markers, and settings storage.

pub mod calls;
pub mod client;
pub mod docs;
pub mod flags;
pub mod settings;

pub use calls::{POST_INV_MOVES, POST_SALES_ORDER, POST_SHIPMENT};
pub use client::{BackendClient, ClientError, TriggerReply};
pub use docs::{DocumentId, InventoryMovesDoc, MoveLine, OrderLine, SalesOrderDoc, ShipmentDoc};
pub use flags::{InMemoryDocumentFlags, PostingMarker};
pub use settings::{InMemorySettings, SettingsError, SettingsStore};
