//! Business call sites that trigger backend jobs and track them locally.
//!
//! Each posting runs its REST call through `create_remote_job`, so an
//! already-tracked document is never posted twice, and returns a handle the
//! caller activates once its own listeners are in place. The tracked jobs
//! all carry the document-mirror handler so posting progress shows up on
//! the document itself.

use std::sync::Arc;

use fieldsync_events::Bus;
use fieldsync_jobs::{JobError, JobHandle, JobManager, JobRecord, JobStore, StatusHandlerKind};

use crate::client::BackendClient;
use crate::docs::{InventoryMovesDoc, SalesOrderDoc, ShipmentDoc};

/// Job sub-kind for inventory movement postings.
pub const POST_INV_MOVES: &str = "postInvMoves";
/// Job sub-kind for sales order postings.
pub const POST_SALES_ORDER: &str = "postSalesOrder";
/// Job sub-kind for shipment postings.
pub const POST_SHIPMENT: &str = "postShipment";

/// Post an inventory movement document and track the triggered job.
pub fn post_inventory_moves<S, B>(
    manager: &Arc<JobManager<S, B>>,
    client: &dyn BackendClient,
    doc: &InventoryMovesDoc,
) -> Result<JobHandle, JobError>
where
    S: JobStore + 'static,
    B: Bus<JobRecord> + 'static,
{
    manager.create_remote_job(
        POST_INV_MOVES,
        (&doc.id).into(),
        StatusHandlerKind::DocumentMirror,
        || {
            let reply = client
                .post_inventory_moves(doc)
                .map_err(anyhow::Error::from)?;
            Ok(reply.job_ref)
        },
    )
}

/// Post a sales order document and track the triggered job.
pub fn post_sales_order<S, B>(
    manager: &Arc<JobManager<S, B>>,
    client: &dyn BackendClient,
    doc: &SalesOrderDoc,
) -> Result<JobHandle, JobError>
where
    S: JobStore + 'static,
    B: Bus<JobRecord> + 'static,
{
    manager.create_remote_job(
        POST_SALES_ORDER,
        (&doc.id).into(),
        StatusHandlerKind::DocumentMirror,
        || {
            let reply = client.post_sales_order(doc).map_err(anyhow::Error::from)?;
            Ok(reply.job_ref)
        },
    )
}

/// Post a shipment document and track the triggered job.
pub fn post_shipment<S, B>(
    manager: &Arc<JobManager<S, B>>,
    client: &dyn BackendClient,
    doc: &ShipmentDoc,
) -> Result<JobHandle, JobError>
where
    S: JobStore + 'static,
    B: Bus<JobRecord> + 'static,
{
    manager.create_remote_job(
        POST_SHIPMENT,
        (&doc.id).into(),
        StatusHandlerKind::DocumentMirror,
        || {
            let reply = client.post_shipment(doc).map_err(anyhow::Error::from)?;
            Ok(reply.job_ref)
        },
    )
}
