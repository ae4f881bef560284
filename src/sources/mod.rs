//! Collaborators that supply the externally published lists.
//!
//! The orchestrator only sees these traits. Transport, authentication and
//! decoding are the implementation's business; [`http::HttpSources`] is the
//! one used in production.

pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

pub use http::{FetcherConfig, HttpSources};

/// A URL that must never be present in the active catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeniedEntry {
    pub package_url: Url,
}

/// A known custom collection as published in the collection registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub badge: Option<String>,
    /// Location of the collection's member list
    pub url: Url,
}

/// Supplies the main list of candidate package URLs
#[async_trait]
pub trait PackageListSource: Send + Sync {
    async fn fetch_package_list(&self) -> Result<Vec<Url>>;
}

/// Supplies the deny list
#[async_trait]
pub trait DenyListSource: Send + Sync {
    async fn fetch_deny_list(&self) -> Result<Vec<DeniedEntry>>;
}

/// Supplies the registry of custom collections
#[async_trait]
pub trait CollectionRegistrySource: Send + Sync {
    async fn fetch_collection_registry(&self) -> Result<Vec<CollectionDescriptor>>;
}

/// Supplies the raw, untruncated member list of one collection
#[async_trait]
pub trait CollectionMemberSource: Send + Sync {
    async fn fetch_collection_members(&self, source: &Url) -> Result<Vec<Url>>;
}
