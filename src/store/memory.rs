use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::trace;
use url::Url;

use super::{CatalogStore, CollectionRecord, PackageRecord, ProcessingStage};
use crate::error::{StoreError, StoreResult};
use crate::reconcile::canonical::{canonicalize, CanonicalKey};
use crate::sources::CollectionDescriptor;

#[derive(Debug, Default)]
struct State {
    packages: HashMap<CanonicalKey, PackageRecord>,
    collections: Vec<CollectionRecord>,
    members: HashMap<i64, Vec<Url>>,
    next_collection_id: i64,
    inserts: usize,
    deletes: usize,
}

/// In-process [`CatalogStore`]
///
/// Enforces the same canonical uniqueness as the SQLite store and counts
/// writes, which makes it useful for idempotence checks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with packages at the given stage.
    pub fn with_packages(urls: &[Url], stage: ProcessingStage) -> Self {
        let mut state = State::default();
        for url in urls {
            state.packages.insert(
                canonicalize(url),
                PackageRecord {
                    url: url.clone(),
                    stage,
                    created_at: Utc::now(),
                },
            );
        }
        Self {
            state: Mutex::new(state),
        }
    }

    pub async fn package(&self, url: &Url) -> Option<PackageRecord> {
        self.state.lock().await.packages.get(&canonicalize(url)).cloned()
    }

    pub async fn collections(&self) -> Vec<CollectionRecord> {
        self.state.lock().await.collections.clone()
    }

    /// Total package inserts and deletes applied so far.
    pub async fn write_counts(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.inserts, state.deletes)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_package_urls(&self) -> StoreResult<Vec<Url>> {
        let state = self.state.lock().await;
        let mut urls: Vec<Url> = state.packages.values().map(|p| p.url.clone()).collect();
        urls.sort();
        Ok(urls)
    }

    async fn insert_packages(&self, urls: &[Url], stage: ProcessingStage) -> StoreResult<()> {
        let mut state = self.state.lock().await;

        // All-or-nothing, matching the transactional SQLite batch.
        let mut batch = HashMap::with_capacity(urls.len());
        for url in urls {
            let key = canonicalize(url);
            if state.packages.contains_key(&key) || batch.contains_key(&key) {
                return Err(StoreError::DuplicateIdentity(url.to_string()));
            }
            batch.insert(
                key,
                PackageRecord {
                    url: url.clone(),
                    stage,
                    created_at: Utc::now(),
                },
            );
        }

        state.inserts += batch.len();
        state.packages.extend(batch);
        trace!("Inserted {} packages", urls.len());
        Ok(())
    }

    async fn delete_package(&self, url: &Url) -> StoreResult<usize> {
        let mut state = self.state.lock().await;
        let key = canonicalize(url);
        let exact = state.packages.get(&key).is_some_and(|record| record.url == *url);
        if !exact {
            return Ok(0);
        }
        state.packages.remove(&key);
        state.deletes += 1;
        Ok(1)
    }

    async fn find_or_create_collection(
        &self,
        descriptor: &CollectionDescriptor,
    ) -> StoreResult<CollectionRecord> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.collections.iter_mut().find(|c| c.url == descriptor.url) {
            existing.name = descriptor.name.clone();
            existing.description = descriptor.description.clone();
            existing.badge = descriptor.badge.clone();
            return Ok(existing.clone());
        }

        state.next_collection_id += 1;
        let record = CollectionRecord {
            id: state.next_collection_id,
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            badge: descriptor.badge.clone(),
            url: descriptor.url.clone(),
        };
        state.collections.push(record.clone());
        Ok(record)
    }

    async fn collection_members(&self, collection_id: i64) -> StoreResult<Vec<Url>> {
        let state = self.state.lock().await;
        if !state.collections.iter().any(|c| c.id == collection_id) {
            return Err(StoreError::CollectionNotFound(collection_id));
        }
        Ok(state.members.get(&collection_id).cloned().unwrap_or_default())
    }

    async fn reconcile_membership(
        &self,
        collection_id: i64,
        to_add: &[Url],
        to_delete: &[Url],
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.collections.iter().any(|c| c.id == collection_id) {
            return Err(StoreError::CollectionNotFound(collection_id));
        }

        let mut members = state.members.get(&collection_id).cloned().unwrap_or_default();
        members.retain(|m| !to_delete.contains(m));
        for url in to_add {
            let key = canonicalize(url);
            if members.iter().any(|m| canonicalize(m) == key) {
                return Err(StoreError::DuplicateIdentity(url.to_string()));
            }
            members.push(url.clone());
        }
        state.members.insert(collection_id, members);
        Ok(())
    }
}
