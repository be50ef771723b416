//! Tagtypes Daemon - Main entry point
//!
//! Warms the tag definition cache and serves lookups: one-shot listing
//! and inspection modes, plus a watch mode that keeps the cache fresh.

mod config;
mod fetch;
mod manager;
mod store;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fetch::GithubFetcher;
use manager::TagTypesManager;
use store::JsonFileStore;

#[derive(Parser, Debug)]
#[command(name = "tagtypesd")]
#[command(about = "OpenDisplay tag definition cache manager")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tagtypes.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// List all known tag definitions and exit
    #[arg(long)]
    list: bool,

    /// Show one tag definition by type ID and exit
    #[arg(long)]
    show: Option<u16>,

    /// Force a refresh from the remote repository and exit
    #[arg(long)]
    refresh: bool,

    /// Keep running, re-checking cache freshness periodically
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Tagtypes v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;

    let store = Arc::new(JsonFileStore::new(PathBuf::from(&config.storage.dir)));
    let fetcher = Arc::new(GithubFetcher::new(config.remote.api_url.clone())?);
    let manager = Arc::new(TagTypesManager::new(
        store,
        fetcher,
        PathBuf::from(&config.storage.legacy_file),
    ));

    if args.refresh {
        // refresh() does not need a warm table; warming first could
        // trigger a second full fetch through the staleness check
        if manager.refresh().await {
            println!("Refreshed {} tag definitions", manager.count());
        } else {
            println!(
                "Refresh failed, keeping {} cached definitions",
                manager.count()
            );
        }
        return Ok(());
    }

    if let Some(type_id) = args.show {
        match manager.get_record(type_id).await {
            Ok(tag) => {
                println!("Tag type {} - {}", tag.type_id, tag.name);
                println!("  version:  {}", tag.version);
                println!("  size:     {}x{}", tag.width, tag.height);
                println!("  bpp:      {}", tag.bpp);
                println!("  colors:   {}", tag.color_table.keys().cloned().collect::<Vec<_>>().join(", "));
                if !tag.content_ids.is_empty() {
                    println!(
                        "  contents: {}",
                        tag.content_ids
                            .iter()
                            .map(|id| id.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
            }
            Err(e) => println!("{}", e),
        }
        return Ok(());
    }

    manager.ensure_loaded().await;

    if args.list {
        let mut records: Vec<_> = manager.all_records().into_values().collect();
        records.sort_by_key(|tag| tag.type_id);
        println!("{} tag definitions:", records.len());
        for tag in records {
            let (width, height) = tag.dimensions();
            println!("  {:>3}  {:<28} {}x{}", tag.type_id, tag.name, width, height);
        }
        return Ok(());
    }

    if args.watch {
        let interval = std::time::Duration::from_secs(config.daemon.refresh_interval_secs);
        info!(
            interval_secs = config.daemon.refresh_interval_secs,
            "Watching tag definition cache"
        );
        loop {
            tokio::time::sleep(interval).await;
            manager.ensure_loaded().await;
        }
    }

    println!(
        "{} tag definitions cached (last update: {})",
        manager.count(),
        manager
            .last_update()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );

    Ok(())
}
