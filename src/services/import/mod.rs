//! Excel ingestion engine: layout sniffing, cell normalization, row
//! extraction, and reconciliation against the trainee registry.

pub mod cells;
pub mod cleanup;
pub mod layout;
pub mod reconcile;
pub mod row;
