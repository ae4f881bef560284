//! List reconciliation engine.
//!
//! Leaves first: [`canonical`] identity keys, the [`deny_list`] filter, the
//! [`differ`], the catalog [`reconciler`], the bounded [`collections`]
//! reconciler and the [`orchestrator`] sequencing a full pass.

pub mod canonical;
pub mod collections;
pub mod deny_list;
pub mod differ;
pub mod orchestrator;
pub mod reconciler;


pub use canonical::{canonicalize, dedup_canonical, CanonicalKey};
pub use collections::{
    reconcile_collection, truncate_members, CollectionSummary, DEFAULT_MAX_COLLECTION_MEMBERS,
};
pub use differ::{diff, Diff};
pub use orchestrator::{CollectionOutcome, MainListOutcome, Orchestrator, PassReport, Sources};
pub use reconciler::{apply_diff, purge_denied, reconcile_lists, ReconcileSummary};
