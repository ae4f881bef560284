use futures::future::try_join3;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use url::Url;

use super::collections::{
    reconcile_collection, truncate_members, CollectionSummary, DEFAULT_MAX_COLLECTION_MEMBERS,
};
use super::deny_list;
use super::reconciler::{reconcile_lists, ReconcileSummary};
use crate::error::ReconcileError;
use crate::sources::{
    CollectionDescriptor, CollectionMemberSource, CollectionRegistrySource, DenyListSource,
    HttpSources, PackageListSource,
};
use crate::store::CatalogStore;
use crate::utils::benchmarking::{time_operation, PassTimer};

/// The list collaborators the orchestrator draws from
#[derive(Clone)]
pub struct Sources {
    pub packages: Arc<dyn PackageListSource>,
    pub deny_list: Arc<dyn DenyListSource>,
    pub registry: Arc<dyn CollectionRegistrySource>,
    pub members: Arc<dyn CollectionMemberSource>,
}

impl Sources {
    /// Uses one HTTP client for every list.
    pub fn from_http(http: HttpSources) -> Self {
        let http = Arc::new(http);
        Self {
            packages: http.clone(),
            deny_list: http.clone(),
            registry: http.clone(),
            members: http,
        }
    }
}

/// Outcome of the main-list phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainListOutcome {
    /// Source list after deny-list filtering; the authoritative full list
    pub processed_list: Vec<Url>,
    pub summary: ReconcileSummary,
}

/// Outcome of one collection in the collection phase
#[derive(Debug)]
pub struct CollectionOutcome {
    pub name: String,
    pub source: Url,
    pub result: Result<CollectionSummary, ReconcileError>,
}

/// Everything one pass did
#[derive(Debug)]
pub struct PassReport {
    pub main: MainListOutcome,
    pub collections: Vec<CollectionOutcome>,
    /// Set when the collection registry itself could not be fetched
    pub registry_error: Option<ReconcileError>,
}

impl PassReport {
    pub fn processed_list(&self) -> &[Url] {
        &self.main.processed_list
    }

    pub fn failed_collections(&self) -> impl Iterator<Item = &CollectionOutcome> {
        self.collections.iter().filter(|c| c.result.is_err())
    }
}

/// Runs reconciliation passes over the main catalog and custom collections
pub struct Orchestrator {
    sources: Sources,
    store: Arc<dyn CatalogStore>,
    timer: PassTimer,
    max_collection_members: usize,
}

impl Orchestrator {
    pub fn new(sources: Sources, store: Arc<dyn CatalogStore>, timer: PassTimer) -> Self {
        Self {
            sources,
            store,
            timer,
            max_collection_members: DEFAULT_MAX_COLLECTION_MEMBERS,
        }
    }

    pub fn with_max_collection_members(mut self, max: usize) -> Self {
        self.max_collection_members = max;
        self
    }

    pub fn timer(&self) -> &PassTimer {
        &self.timer
    }

    /// One full pass: main list, then each custom collection
    ///
    /// Only a main-list failure makes this return `Err`. Collection failures,
    /// including a failed registry fetch, are recorded in the report.
    #[instrument(skip(self))]
    pub async fn run_pass(&self) -> Result<PassReport, ReconcileError> {
        info!("Starting reconciliation pass");
        self.timer.reset().await;

        let main = time_operation(&self.timer, "reconcile_main", None, self.reconcile_main_list())
            .await
            .map_err(|e| {
                error!("Main list reconciliation failed: {}", e);
                e
            })?;

        let (collections, registry_error) =
            match time_operation(&self.timer, "collections", None, self.reconcile_collections())
                .await
            {
                Ok(outcomes) => (outcomes, None),
                Err(e) => {
                    warn!("Skipping custom collections: {}", e);
                    (Vec::new(), Some(e))
                }
            };

        let report = PassReport {
            main,
            collections,
            registry_error,
        };
        info!(
            "Reconciliation pass complete: {} added, {} deleted, {} collections ({} failed)",
            report.main.summary.added,
            report.main.summary.deleted,
            report.collections.len(),
            report.failed_collections().count()
        );
        info!("Pass timings:\n{}", self.timer.generate_report().await);
        Ok(report)
    }

    /// Fetches the three lists concurrently, filters, diffs and applies
    ///
    /// Any fetch failure aborts before anything is written.
    #[instrument(skip(self))]
    pub async fn reconcile_main_list(&self) -> Result<MainListOutcome, ReconcileError> {
        let fetch_source = async {
            self.sources
                .packages
                .fetch_package_list()
                .await
                .map_err(|e| ReconcileError::fetch("package list", e))
        };
        let fetch_deny = async {
            self.sources
                .deny_list
                .fetch_deny_list()
                .await
                .map(|entries| entries.into_iter().map(|e| e.package_url).collect::<Vec<_>>())
                .map_err(|e| ReconcileError::fetch("deny list", e))
        };
        let fetch_current = async {
            self.store
                .list_package_urls()
                .await
                .map_err(|e| ReconcileError::fetch("current package list", e.into()))
        };

        let (source, deny, current) = time_operation(
            &self.timer,
            "fetch_lists",
            Some("reconcile_main"),
            try_join3(fetch_source, fetch_deny, fetch_current),
        )
        .await?;
        info!(
            "Fetched lists: {} source, {} denied, {} current",
            source.len(),
            deny.len(),
            current.len()
        );

        let processed_list = deny_list::apply(&source, &deny);
        let summary = time_operation(
            &self.timer,
            "apply_diff",
            Some("reconcile_main"),
            reconcile_lists(self.store.as_ref(), &processed_list, &current),
        )
        .await?;

        Ok(MainListOutcome {
            processed_list,
            summary,
        })
    }

    /// Reconciles every registered collection, one at a time
    ///
    /// Returns `Err` only when the registry fetch fails. A failing collection
    /// is recorded and the loop moves on.
    #[instrument(skip(self))]
    pub async fn reconcile_collections(&self) -> Result<Vec<CollectionOutcome>, ReconcileError> {
        let registry = self
            .sources
            .registry
            .fetch_collection_registry()
            .await
            .map_err(|e| ReconcileError::fetch("collection registry", e))?;
        info!("Reconciling {} custom collections", registry.len());

        let mut outcomes = Vec::with_capacity(registry.len());
        for descriptor in registry {
            let name = format!("collection:{}", descriptor.url);
            let result = time_operation(
                &self.timer,
                &name,
                Some("collections"),
                self.reconcile_one(&descriptor),
            )
            .await;

            if let Err(e) = &result {
                warn!("Collection '{}' failed: {}", descriptor.name, e);
            }
            outcomes.push(CollectionOutcome {
                name: descriptor.name,
                source: descriptor.url,
                result,
            });
        }
        Ok(outcomes)
    }

    async fn reconcile_one(
        &self,
        descriptor: &CollectionDescriptor,
    ) -> Result<CollectionSummary, ReconcileError> {
        let members = self
            .sources
            .members
            .fetch_collection_members(&descriptor.url)
            .await
            .map_err(|e| ReconcileError::fetch("collection members", e))?;
        let members = truncate_members(members, self.max_collection_members);
        reconcile_collection(self.store.as_ref(), descriptor, &members).await
    }
}
