//! Printable invoices and work orders.
//!
//! A document is built in two stages: the entity graph is resolved from the
//! store and laid out as styled text lines, then the lines are rendered to an
//! A4 PDF. Only the second stage needs the `pdf` capability.

pub mod layout;
#[cfg(feature = "pdf")]
mod pdf;

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tokio::task;
use tracing::{info, warn};

use crate::business_info;
use crate::capabilities::Capabilities;
use crate::customers::{self, Customer};
use crate::db::{write_atomic, Store};
use crate::equipment::{self, Equipment};
use crate::invoices::{self, Invoice, InvoiceItem};
use crate::work_orders::{self, WorkOrder};
use crate::{time, AppError, AppResult};

pub use layout::{Line, LineStyle};

pub const DOCUMENT_NOT_FOUND: &str = "DOCUMENT/NOT_FOUND";

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceGraph {
    pub invoice: Invoice,
    pub work_order: Option<WorkOrder>,
    pub customer: Option<Customer>,
    pub equipment: Option<Equipment>,
    pub items: Vec<InvoiceItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkOrderGraph {
    pub work_order: WorkOrder,
    pub customer: Option<Customer>,
    pub equipment: Option<Equipment>,
}

fn document_not_found(kind: &str, id: i64) -> AppError {
    AppError::new(DOCUMENT_NOT_FOUND, format!("{kind} {id} not found"))
        .with_context("id", id.to_string())
}

async fn customer_and_equipment(
    pool: &SqlitePool,
    wo: &WorkOrder,
) -> AppResult<(Option<Customer>, Option<Equipment>)> {
    let customer = match wo.customer_id {
        Some(id) => customers::find(pool, id).await?,
        None => None,
    };
    let equipment = match wo.equipment_id {
        Some(id) => equipment::find(pool, id).await?,
        None => None,
    };
    Ok((customer, equipment))
}

pub async fn load_invoice_graph(pool: &SqlitePool, id: i64) -> AppResult<InvoiceGraph> {
    let invoice = invoices::find(pool, id)
        .await?
        .ok_or_else(|| document_not_found("invoice", id))?;
    let work_order = match invoice.work_order_id {
        Some(wo_id) => work_orders::find(pool, wo_id).await?,
        None => None,
    };
    let (customer, equipment) = match &work_order {
        Some(wo) => customer_and_equipment(pool, wo).await?,
        None => (None, None),
    };
    let items = invoices::items(pool, id).await?;
    Ok(InvoiceGraph {
        invoice,
        work_order,
        customer,
        equipment,
        items,
    })
}

pub async fn load_work_order_graph(pool: &SqlitePool, id: i64) -> AppResult<WorkOrderGraph> {
    let work_order = work_orders::find(pool, id)
        .await?
        .ok_or_else(|| document_not_found("work order", id))?;
    let (customer, equipment) = customer_and_equipment(pool, &work_order).await?;
    Ok(WorkOrderGraph {
        work_order,
        customer,
        equipment,
    })
}

#[cfg(feature = "pdf")]
fn render_bytes(title: &str, lines: &[Line]) -> AppResult<Vec<u8>> {
    pdf::render(title, lines)
}

#[cfg(not(feature = "pdf"))]
fn render_bytes(_title: &str, _lines: &[Line]) -> AppResult<Vec<u8>> {
    Err(AppError::capability_missing("pdf"))
}

async fn write_pdf(title: String, lines: Vec<Line>, out: &Path) -> AppResult<()> {
    let path = out.to_path_buf();
    task::spawn_blocking(move || -> AppResult<()> {
        let bytes = render_bytes(&title, &lines)?;
        write_atomic(&path, &bytes)?;
        Ok(())
    })
    .await
    .map_err(|err| {
        AppError::new("DOCUMENT/TASK", "PDF writer task panicked")
            .with_context("error", err.to_string())
    })?
    .map_err(|err| err.with_context("path", out.display().to_string()))
}

pub async fn render_invoice_pdf(
    store: &Store,
    caps: Capabilities,
    id: i64,
    out: &Path,
) -> AppResult<PathBuf> {
    caps.require_pdf()?;
    let graph = load_invoice_graph(store.pool(), id).await?;
    let info = business_info::get(store.pool()).await?;
    let lines = layout::invoice_lines(&info, &graph, &time::today_iso());
    write_pdf(format!("Invoice #{id}"), lines, out).await?;
    info!(target: "repairdesk", event = "document_written", kind = "invoice", id, path = %out.display());
    Ok(out.to_path_buf())
}

pub async fn render_work_order_pdf(
    store: &Store,
    caps: Capabilities,
    id: i64,
    out: &Path,
) -> AppResult<PathBuf> {
    caps.require_pdf()?;
    let graph = load_work_order_graph(store.pool(), id).await?;
    let info = business_info::get(store.pool()).await?;
    let lines = layout::work_order_lines(&info, &graph);
    write_pdf(format!("Work Order #{id}"), lines, out).await?;
    info!(target: "repairdesk", event = "document_written", kind = "work_order", id, path = %out.display());
    Ok(out.to_path_buf())
}

/// One `invoice_<id>.pdf` per invoice into `dir`, optionally filtered by
/// status. A failing invoice is logged and skipped.
pub async fn export_invoice_pdfs(
    store: &Store,
    caps: Capabilities,
    dir: &Path,
    status: Option<&str>,
) -> AppResult<Vec<PathBuf>> {
    caps.require_pdf()?;
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for invoice in invoices::list(store.pool(), status).await? {
        let out = dir.join(format!("invoice_{}.pdf", invoice.id));
        match render_invoice_pdf(store, caps, invoice.id, &out).await {
            Ok(path) => written.push(path),
            Err(err) => warn!(
                target: "repairdesk",
                event = "document_skipped",
                id = invoice.id,
                code = %err.code(),
                error = %err
            ),
        }
    }
    info!(target: "repairdesk", event = "documents_exported", count = written.len(), dir = %dir.display());
    Ok(written)
}
