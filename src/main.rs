//! Crawl-Collector main entry point
//!
//! This is the command-line interface for the incremental crawl collector.

use anyhow::Context;
use clap::Parser;
use crawl_collector::config::{load_config_with_hash, Config, FetcherConfig};
use crawl_collector::events::{LoggingListener, StatsListener};
use crawl_collector::output::{load_statistics, print_statistics};
use crawl_collector::storage::{ledger_path, RetryPolicy};
use crawl_collector::{Coordinator, CrawlStatus, SqliteLedger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Crawl-Collector: incremental crawl state tracking
///
/// Crawl-Collector visits the configured start references, decides for each
/// one whether it is new, modified, unchanged, deleted or in error, and
/// records the verdict in a ledger so the next session only does
/// incremental work.
#[derive(Parser, Debug)]
#[command(name = "crawl-collector")]
#[command(version)]
#[command(about = "Incremental crawl collector", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted session (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh session, ignoring any interrupted one
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the ledger and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, config_hash, cli.fresh, cli.quiet).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_collector=info,warn"),
            1 => EnvFilter::new("crawl_collector=debug,info"),
            2 => EnvFilter::new("crawl_collector=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn limit(value: i64) -> String {
    if value < 0 {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Crawl-Collector Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Id: {}", config.crawler.id);
    println!("  Workers: {}", config.crawler.num_threads);
    println!("  Work dir: {}", config.crawler.work_dir.display());
    println!("  Ledger: {}", ledger_path(&config.crawler.work_dir).display());
    println!("  Max documents: {}", limit(config.crawler.max_documents));
    println!("  Max depth: {}", limit(config.crawler.max_depth));
    println!("  Orphans strategy: {}", config.crawler.orphans_strategy);
    println!("  Metadata fast path: {}", config.crawler.metadata_fast_path);
    let stop_on: Vec<_> = config
        .crawler
        .stop_on_exceptions
        .iter()
        .map(|k| k.as_str())
        .collect();
    println!(
        "  Stop on: {}",
        if stop_on.is_empty() {
            "-".to_string()
        } else {
            stop_on.join(", ")
        }
    );

    println!("\nFetcher:");
    match &config.fetcher {
        FetcherConfig::File => println!("  Local files"),
        FetcherConfig::Http {
            user_agent,
            timeout_secs,
        } => println!("  HTTP ({}, {}s timeout)", user_agent, timeout_secs),
    }

    println!("\nFilters:");
    println!("  Reference: {}", config.filters.reference.len());
    println!("  Metadata: {}", config.filters.metadata.len());
    println!("  Document: {}", config.filters.document.len());

    println!("\nStart References ({}):", config.start_references.len());
    for reference in &config.start_references {
        println!("  - {}", reference);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the ledger
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = ledger_path(&config.crawler.work_dir);
    println!("Ledger: {}\n", path.display());

    if !path.exists() {
        anyhow::bail!("No ledger found at {}", path.display());
    }

    let ledger = SqliteLedger::open(&path, &config.crawler.id, RetryPolicy::default())
        .context("Failed to open ledger")?;
    let stats = load_statistics(&ledger).context("Failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    fresh: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh session (ignoring interrupted state)");
    } else {
        tracing::info!("Starting session (will resume if an interrupted one exists)");
    }
    tracing::info!(
        "Crawler {}: {} start references, {} workers",
        config.crawler.id,
        config.start_references.len(),
        config.crawler.num_threads
    );

    let stats = Arc::new(StatsListener::new());
    let coordinator = Coordinator::new(config, config_hash)?
        .fresh(fresh)
        .with_listener(Arc::new(LoggingListener))
        .with_listener(stats.clone());

    // Ctrl-C requests a graceful stop; in-flight references complete
    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after in-flight references");
            stop.stop();
        }
    });

    let summary = match coordinator.run().await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    if !quiet {
        println!();
        stats.print_summary();
        println!();
        println!(
            "Session {} {} in {:.1?} ({} orphans, {} removed, {} spoiled removed, {} new)",
            summary.session_id,
            summary.state,
            summary.elapsed,
            summary.orphans,
            summary.orphans_removed,
            summary.spoiled_deleted,
            summary.count(CrawlStatus::New)
        );
    }

    summary.into_result()?;
    tracing::info!("Crawl completed successfully");
    Ok(())
}
