//! Reconciles a persisted package catalog against externally published
//! URL lists, plus bounded community-curated custom collections.

pub mod config;
pub mod error;
pub mod reconcile;
pub mod sources;
pub mod store;
pub mod utils;

pub use error::{ReconcileError, StoreError};
pub use reconcile::{Orchestrator, PassReport, Sources};
