use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::reconcile::DEFAULT_MAX_COLLECTION_MEMBERS;
use crate::sources::http::{
    DEFAULT_COLLECTIONS_URL, DEFAULT_DENY_LIST_URL, DEFAULT_PACKAGE_LIST_URL,
};
use crate::sources::FetcherConfig;

/// Environment variables with this prefix override file settings,
/// e.g. `RECONCILER__DATABASE_PATH`.
pub const ENV_PREFIX: &str = "RECONCILER";

/// Settings for one reconciliation run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Published list of package URLs
    pub package_list_url: String,

    /// Published deny list
    pub deny_list_url: String,

    /// Published registry of custom collections
    pub custom_collections_url: String,

    /// SQLite database holding the catalog
    pub database_path: String,

    /// Members ingested per collection; longer lists are truncated
    pub max_collection_members: usize,

    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,

    /// Bearer token for the list host
    pub github_token: Option<String>,

    /// Write logs to a timestamped file here instead of stdout
    pub log_dir: Option<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            package_list_url: DEFAULT_PACKAGE_LIST_URL.to_string(),
            deny_list_url: DEFAULT_DENY_LIST_URL.to_string(),
            custom_collections_url: DEFAULT_COLLECTIONS_URL.to_string(),
            database_path: "catalog.sqlite3".to_string(),
            max_collection_members: DEFAULT_MAX_COLLECTION_MEMBERS,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: "CatalogReconciler/1.0".to_string(),
            github_token: None,
            log_dir: None,
        }
    }
}

impl ReconcilerConfig {
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig::new()
            .with_package_list_url(&self.package_list_url)
            .with_deny_list_url(&self.deny_list_url)
            .with_collections_url(&self.custom_collections_url)
            .with_user_agent(&self.user_agent)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_connection_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_github_token(self.github_token.clone())
    }
}

/// Loads the configuration: defaults, then the optional file, then
/// environment overrides
pub fn load_config(path: Option<&Path>) -> Result<ReconcilerConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        info!("Loading config from {}", path.display());
        builder = builder.add_source(File::from(path).required(true));
    }
    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<ReconcilerConfig>()
        .context("Failed to deserialize config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.max_collection_members, 50);
        assert_eq!(config.database_path, "catalog.sqlite3");
        assert!(config.github_token.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "database_path = \"/tmp/other.sqlite3\"\nmax_collection_members = 10\n"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.database_path, "/tmp/other.sqlite3");
        assert_eq!(config.max_collection_members, 10);
        assert_eq!(config.package_list_url, DEFAULT_PACKAGE_LIST_URL);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/reconciler.toml"))).is_err());
    }

    #[test]
    fn test_fetcher_config_carries_timeouts() {
        let config = ReconcilerConfig {
            request_timeout_secs: 5,
            ..Default::default()
        };
        assert_eq!(config.fetcher_config().request_timeout, Duration::from_secs(5));
    }
}
