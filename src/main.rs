use anyhow::{Context, Result};
use catalog_reconciler::config::{load_config, ReconcilerConfig};
use catalog_reconciler::reconcile::purge_denied;
use catalog_reconciler::sources::{DenyListSource, HttpSources};
use catalog_reconciler::store::SqliteStore;
use catalog_reconciler::utils::benchmarking::PassTimer;
use catalog_reconciler::utils::logger::init_logger;
use catalog_reconciler::{Orchestrator, Sources};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    name = "catalog-reconciler",
    version,
    about = "Reconcile the package catalog against the published lists"
)]
struct Cli {
    /// Configuration file (TOML); environment variables prefixed
    /// RECONCILER__ override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to a timestamped file in this directory
    #[arg(long)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one reconciliation pass
    Reconcile,
    /// Delete every persisted package that is on the deny list
    PurgeDenied,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.log_dir.is_some() {
        config.log_dir = cli.log_dir;
    }
    init_logger(config.log_dir.as_deref())?;

    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("Failed to open database {}", config.database_path))?,
    );
    let http = HttpSources::new(config.fetcher_config())?;

    match cli.command {
        Command::Reconcile => reconcile(&config, http, store).await,
        Command::PurgeDenied => purge(http, store).await,
    }
}

async fn reconcile(
    config: &ReconcilerConfig,
    http: HttpSources,
    store: Arc<SqliteStore>,
) -> Result<()> {
    let orchestrator = Orchestrator::new(Sources::from_http(http), store, PassTimer::new())
        .with_max_collection_members(config.max_collection_members);

    let report = match orchestrator.run_pass().await {
        Ok(report) => report,
        Err(e) => {
            error!("Reconciliation pass failed: {}", e);
            return Err(e.into());
        }
    };

    println!(
        "Catalog: {} packages, {} added, {} deleted",
        report.processed_list().len(),
        report.main.summary.added,
        report.main.summary.deleted
    );
    if let Some(e) = &report.registry_error {
        println!("warning: custom collections skipped: {}", e);
    }
    for outcome in &report.collections {
        match &outcome.result {
            Ok(summary) => println!(
                "Collection '{}': {} members, {} added, {} removed",
                outcome.name, summary.members, summary.added, summary.deleted
            ),
            Err(e) => println!(
                "warning: collection '{}' ({}) failed: {}",
                outcome.name, outcome.source, e
            ),
        }
    }
    Ok(())
}

async fn purge(http: HttpSources, store: Arc<SqliteStore>) -> Result<()> {
    let deny: Vec<_> = http
        .fetch_deny_list()
        .await
        .context("Failed to fetch deny list")?
        .into_iter()
        .map(|entry| entry.package_url)
        .collect();

    let deleted = purge_denied(store.as_ref(), &deny).await?;
    info!("Purge complete");
    println!("Deleted {} denied packages", deleted);
    Ok(())
}
