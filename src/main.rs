mod backoff;
mod catalog;
mod config;
mod feed;
mod http;
mod metrics;
mod reconcile;
mod report;
mod shopify;
mod sku;

use catalog::{PaginationError, build_index};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{ConfigError, ShopConfig, SyncConfig};
use eyre::{Result, WrapErr};
use feed::FeedError;
use reconcile::{Reconciler, Summary};
use report::{CatalogStats, FeedStats, RunReport};
use shopify::ShopifyClient;
use std::{fs::File, path::PathBuf, process::ExitCode};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "stocksync", version, about = "Sync supplier stock levels into Shopify")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile the supplier feed against the catalog and set stock levels.
    Sync {
        /// Write the full run report as JSON (overrides SYNC_REPORT_PATH).
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Write the catalog's SKU to inventory item mapping as CSV.
    ExportMapping {
        #[arg(long, short, default_value = "inventory_mapping.csv")]
        output: PathBuf,
    },
    /// List the store's locations to find SHOPIFY_LOCATION_ID.
    Locations,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Sync { report: None });

    tokio::select! {
        result = run(command) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(target: "stocksync", "{err:#}");
                if nothing_applied(&err) {
                    warn!(target: "stocksync", "no stock levels were changed");
                }
                ExitCode::from(exit_status(&err))
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!(target: "stocksync", "interrupted; updates already applied are kept");
            ExitCode::from(130)
        }
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Sync { report } => sync(report).await,
        Command::ExportMapping { output } => export_mapping(output).await,
        Command::Locations => locations().await,
    }
}

async fn sync(report_override: Option<PathBuf>) -> Result<()> {
    let config = SyncConfig::from_env()?;
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(
        target: "stocksync.sync",
        %run_id,
        store = %config.shop.store,
        location = %config.location_id,
        mode = ?config.reconcile.mode,
        "sync started"
    );

    let client = ShopifyClient::new(&config.shop)
        .with_reference_document(format!("gid://stocksync/Run/{run_id}"));
    let feed = feed::fetch_feed(client.http(), &config.feed)
        .await
        .wrap_err("loading supplier feed")?;
    let index = build_index(&client, &config.catalog)
        .await
        .wrap_err("building catalog index")?;
    if index.is_empty() {
        warn!(target: "stocksync.catalog", "catalog has no SKUs; every supplier row will be reported as not found");
    }

    let outcomes = Reconciler::new(&client, &index, &config.location_id, &config.reconcile)
        .run(&feed.rows)
        .await;
    let summary = Summary::from_outcomes(&outcomes);
    info!(
        target: "stocksync.sync",
        %run_id,
        records = summary.total(),
        updated = summary.updated,
        not_found = summary.not_found,
        invalid = summary.invalid,
        failed = summary.failed,
        "sync finished"
    );
    println!("{summary}");

    if let Some(path) = report_override.or(config.report_path) {
        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            location_id: config.location_id.clone(),
            mode: config.reconcile.mode,
            feed: FeedStats::of(&feed),
            catalog: CatalogStats::of(&index),
            summary,
            outcomes,
        };
        match report.write_to(&path) {
            Ok(()) => info!(target: "stocksync.sync", path = %path.display(), "report written"),
            Err(err) => {
                warn!(target: "stocksync.sync", path = %path.display(), error = %err, "report not written")
            }
        }
    }
    Ok(())
}

async fn export_mapping(output: PathBuf) -> Result<()> {
    let shop = ShopConfig::from_env()?;
    let options = config::catalog_options_from_env()?;
    let client = ShopifyClient::new(&shop);
    let index = build_index(&client, &options)
        .await
        .wrap_err("building catalog index")?;

    let file = File::create(&output)
        .wrap_err_with(|| format!("creating {}", output.display()))?;
    let written = report::write_mapping(&index, file)
        .wrap_err_with(|| format!("writing {}", output.display()))?;
    info!(target: "stocksync.catalog", path = %output.display(), rows = written, "mapping exported");
    println!("{written} items written to {}", output.display());
    Ok(())
}

async fn locations() -> Result<()> {
    let shop = ShopConfig::from_env()?;
    let client = ShopifyClient::new(&shop);
    let locations = client
        .list_locations()
        .await
        .wrap_err("listing locations")?;
    println!("{} locations", locations.len());
    for location in locations {
        let status = if location.is_active { "" } else { " (inactive)" };
        println!("- {}{status}", location.name);
        println!("  GID:       {}", location.id);
        println!("  Legacy ID: {}", location.legacy_resource_id);
    }
    Ok(())
}

/// 2 for bad configuration, 1 for any other fatal error.
fn exit_status(err: &eyre::Report) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() {
        2
    } else {
        1
    }
}

/// Feed and catalog failures abort before the first inventory write.
fn nothing_applied(err: &eyre::Report) -> bool {
    err.downcast_ref::<FeedError>().is_some() || err.downcast_ref::<PaginationError>().is_some()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
