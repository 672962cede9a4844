//! Predefined jobs.
//!
//! - **reconcile**: per-index interval reconciliation against the event queue

pub mod reconcile;

pub use reconcile::{create_reconcile_job, outcome_output, run_reconcile, ReconcileJobConfig};
