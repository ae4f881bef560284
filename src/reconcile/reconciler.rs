use tracing::{debug, info, instrument};
use url::Url;

use super::deny_list;
use super::differ::{diff, Diff};
use crate::error::ReconcileError;
use crate::store::{CatalogStore, ProcessingStage};

/// Counts of writes applied by one reconciliation step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub deleted: usize,
}

/// Applies a diff to the main catalog
///
/// Deletes run first so that a URL whose case changed upstream is removed
/// before its new spelling is inserted under the same canonical key. New
/// identities are inserted as one batch at [`ProcessingStage::Reconciliation`];
/// a collision fails the step instead of being merged.
pub async fn apply_diff(
    store: &dyn CatalogStore,
    diff: &Diff,
) -> Result<ReconcileSummary, ReconcileError> {
    let mut summary = ReconcileSummary::default();

    for url in &diff.to_delete {
        debug!("Deleting package: {}", url);
        summary.deleted += store.delete_package(url).await?;
    }

    if !diff.to_add.is_empty() {
        let to_add: Vec<Url> = diff.to_add.iter().cloned().collect();
        store
            .insert_packages(&to_add, ProcessingStage::Reconciliation)
            .await?;
        summary.added = to_add.len();
    }

    Ok(summary)
}

/// Brings the persisted catalog (`target`) in line with `source`
#[instrument(skip_all, fields(source = source.len(), target = target.len()))]
pub async fn reconcile_lists(
    store: &dyn CatalogStore,
    source: &[Url],
    target: &[Url],
) -> Result<ReconcileSummary, ReconcileError> {
    let diff = diff(source, target);
    info!(
        "Catalog diff: {} to add, {} to delete",
        diff.to_add.len(),
        diff.to_delete.len()
    );
    if diff.is_empty() {
        return Ok(ReconcileSummary::default());
    }
    apply_diff(store, &diff).await
}

/// Deletes every persisted package the deny list covers
///
/// The denied set is decided by [`deny_list::apply`], the same contract the
/// reconciliation pass uses.
#[instrument(skip_all, fields(deny_list = deny.len()))]
pub async fn purge_denied(store: &dyn CatalogStore, deny: &[Url]) -> Result<usize, ReconcileError> {
    let current = store.list_package_urls().await?;
    let denied = deny_list::denied_subset(&current, deny);

    let mut deleted = 0;
    for url in &denied {
        info!("Removing denied package: {}", url);
        deleted += store.delete_package(url).await?;
    }
    info!("Purged {} denied packages", deleted);
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;

    fn urls(list: &[&str]) -> Vec<Url> {
        list.iter().map(|s| Url::parse(s).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_reconcile_adds_and_deletes() {
        let store = MemoryStore::with_packages(
            &urls(&["https://x/a", "https://x/d"]),
            ProcessingStage::Analysis,
        );
        let current = store.list_package_urls().await.unwrap();

        let summary = reconcile_lists(&store, &urls(&["https://x/a", "https://x/c"]), &current)
            .await
            .unwrap();
        assert_eq!(summary, ReconcileSummary { added: 1, deleted: 1 });
        assert_eq!(
            store.list_package_urls().await.unwrap(),
            urls(&["https://x/a", "https://x/c"])
        );

        let added = store.package(&urls(&["https://x/c"])[0]).await.unwrap();
        assert_eq!(added.stage, ProcessingStage::Reconciliation);
        // Existing records keep their stage.
        let kept = store.package(&urls(&["https://x/a"])[0]).await.unwrap();
        assert_eq!(kept.stage, ProcessingStage::Analysis);
    }

    #[tokio::test]
    async fn test_case_change_converges() {
        let store =
            MemoryStore::with_packages(&urls(&["https://x/repo"]), ProcessingStage::Analysis);
        let current = store.list_package_urls().await.unwrap();

        reconcile_lists(&store, &urls(&["https://x/Repo"]), &current)
            .await
            .unwrap();
        assert_eq!(store.list_package_urls().await.unwrap(), urls(&["https://x/Repo"]));
    }

    #[tokio::test]
    async fn test_insert_race_surfaces_as_failure() {
        let store = MemoryStore::with_packages(&urls(&["https://x/a"]), ProcessingStage::Analysis);
        // A stale snapshot that does not know about the concurrent writer.
        let err = reconcile_lists(&store, &urls(&["https://x/a"]), &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Persistence(StoreError::DuplicateIdentity(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_denied_uses_canonical_comparison() {
        let store = MemoryStore::with_packages(
            &urls(&["https://x/Bad", "https://x/good"]),
            ProcessingStage::Analysis,
        );
        let deleted = purge_denied(&store, &urls(&["https://x/bad"])).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.list_package_urls().await.unwrap(), urls(&["https://x/good"]));
    }
}
