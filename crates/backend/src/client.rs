//! REST-call boundary toward the business backend.
//!
//! The concrete implementation lives in the HTTP/auth layer; this crate
//! only needs the reply to carry the reference of the job the call
//! triggered on the remote system.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::docs::{InventoryMovesDoc, SalesOrderDoc, ShipmentDoc};

/// Reply of a job-triggering call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerReply {
    /// Identifier of the job on the remote system.
    pub job_ref: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("backend returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed reply: {0}")]
    Decode(String),
}

/// Job-triggering calls against the backend.
pub trait BackendClient: Send + Sync {
    fn post_inventory_moves(&self, doc: &InventoryMovesDoc) -> Result<TriggerReply, ClientError>;

    fn post_sales_order(&self, doc: &SalesOrderDoc) -> Result<TriggerReply, ClientError>;

    fn post_shipment(&self, doc: &ShipmentDoc) -> Result<TriggerReply, ClientError>;
}
