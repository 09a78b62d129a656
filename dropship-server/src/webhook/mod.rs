//! Supplier webhook ingestion and reconciliation

mod envelope;
mod handler;
pub mod signature;
mod status_map;

pub use envelope::{OrderUpdate, WebhookEnvelope, WebhookEvent};
pub use handler::{WebhookIngestor, WebhookJob, WebhookOutcome};
pub use status_map::map_supplier_status;
