//! Document shapes for the postings that trigger remote jobs.
//!
//! These mirror the shapes kept in the device-local document store; only
//! the fields the call sites need are modeled here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldsync_core::CorrelationId;

/// Identifier of a locally-stored business document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Jobs created for a document are de-duplicated by the document's id.
impl From<&DocumentId> for CorrelationId {
    fn from(value: &DocumentId) -> Self {
        CorrelationId::new(value.0.clone())
    }
}

/// One stock movement line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveLine {
    pub line_no: u32,
    pub item: String,
    pub quantity: i64,
    pub from_location: String,
    pub to_location: String,
}

/// Inventory movement posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMovesDoc {
    pub id: DocumentId,
    pub lines: Vec<MoveLine>,
    pub created_at: DateTime<Utc>,
}

/// One order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub item: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// Sales order posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderDoc {
    pub id: DocumentId,
    pub customer: String,
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
}

/// Shipment posting, referencing the order it fulfills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentDoc {
    pub id: DocumentId,
    pub order_id: DocumentId,
    pub carrier: String,
    pub created_at: DateTime<Utc>,
}
