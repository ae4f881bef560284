use tracing::{info, instrument, warn};
use url::Url;

use super::canonical::dedup_canonical;
use super::differ::diff;
use crate::error::ReconcileError;
use crate::sources::CollectionDescriptor;
use crate::store::{CatalogStore, CollectionRecord};

/// Upper bound on members ingested from one collection's source list
pub const DEFAULT_MAX_COLLECTION_MEMBERS: usize = 50;

/// Result of reconciling one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub collection: CollectionRecord,
    pub members: usize,
    pub added: usize,
    pub deleted: usize,
}

/// Keeps the first `max` URLs of an untrusted list, in order
///
/// Oversized lists are capped rather than rejected.
pub fn truncate_members(mut urls: Vec<Url>, max: usize) -> Vec<Url> {
    if urls.len() > max {
        warn!(
            "Collection list has {} entries, truncating to {}",
            urls.len(),
            max
        );
        urls.truncate(max);
    }
    urls
}

/// Reconciles one collection's membership against `incoming`
///
/// `incoming` must already be truncated. The collection is found or created
/// by its source URL first. Only this collection's membership is written;
/// the main catalog and other collections are untouched.
#[instrument(skip_all, fields(collection = %descriptor.name, incoming = incoming.len()))]
pub async fn reconcile_collection(
    store: &dyn CatalogStore,
    descriptor: &CollectionDescriptor,
    incoming: &[Url],
) -> Result<CollectionSummary, ReconcileError> {
    let collection = store.find_or_create_collection(descriptor).await?;
    let current = store.collection_members(collection.id).await?;
    let incoming = dedup_canonical(incoming.iter().cloned());

    let diff = diff(&incoming, &current);
    let to_add: Vec<Url> = diff.to_add.into_iter().collect();
    let to_delete: Vec<Url> = diff.to_delete.into_iter().collect();

    if !to_add.is_empty() || !to_delete.is_empty() {
        store
            .reconcile_membership(collection.id, &to_add, &to_delete)
            .await?;
    }

    info!(
        "Collection '{}': {} members, {} added, {} removed",
        collection.name,
        incoming.len(),
        to_add.len(),
        to_delete.len()
    );

    Ok(CollectionSummary {
        collection,
        members: incoming.len(),
        added: to_add.len(),
        deleted: to_delete.len(),
    })
}
