//! Persistence contract for the package catalog and custom collections.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{StoreError, StoreResult};
use crate::sources::CollectionDescriptor;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// How far downstream processing of a package has progressed
///
/// Reconciliation only ever writes [`ProcessingStage::Reconciliation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    Reconciliation,
    Ingestion,
    Analysis,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Reconciliation => "reconciliation",
            ProcessingStage::Ingestion => "ingestion",
            ProcessingStage::Analysis => "analysis",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStage {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reconciliation" => Ok(ProcessingStage::Reconciliation),
            "ingestion" => Ok(ProcessingStage::Ingestion),
            "analysis" => Ok(ProcessingStage::Analysis),
            other => Err(StoreError::InvalidData(format!(
                "unknown processing stage '{}'",
                other
            ))),
        }
    }
}

/// A persisted package, keyed by the canonical form of its URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub url: Url,
    pub stage: ProcessingStage,
    pub created_at: DateTime<Utc>,
}

/// A persisted custom collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub badge: Option<String>,
    /// Where the collection's member list is published; the upsert key
    pub url: Url,
}

/// Backing store for the catalog and collection memberships
///
/// Implementations do not fold case when matching URLs for deletion; callers
/// pass the representative URL they read back from the store.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Snapshot of every persisted package URL.
    async fn list_package_urls(&self) -> StoreResult<Vec<Url>>;

    /// Inserts one record per URL with the given stage.
    ///
    /// Fails with [`StoreError::DuplicateIdentity`] if any URL is already
    /// present under canonical comparison.
    async fn insert_packages(&self, urls: &[Url], stage: ProcessingStage) -> StoreResult<()>;

    /// Deletes the record whose stored URL equals `url` exactly. Returns the
    /// number of removed records.
    async fn delete_package(&self, url: &Url) -> StoreResult<usize>;

    async fn find_or_create_collection(
        &self,
        descriptor: &CollectionDescriptor,
    ) -> StoreResult<CollectionRecord>;

    async fn collection_members(&self, collection_id: i64) -> StoreResult<Vec<Url>>;

    /// Removes `to_delete` then adds `to_add` to one collection's membership.
    async fn reconcile_membership(
        &self,
        collection_id: i64,
        to_add: &[Url],
        to_delete: &[Url],
    ) -> StoreResult<()>;
}

pub(crate) fn parse_stored_url(raw: &str) -> StoreResult<Url> {
    Url::parse(raw).map_err(|e| StoreError::InvalidData(format!("stored URL '{}': {}", raw, e)))
}
