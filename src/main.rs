//! Skein main entry point
//!
//! This is the command-line interface for the Skein distributed crawler.

use anyhow::Context;
use clap::Parser;
use skein::config::{apply_env_overrides, compute_config_hash, parse_config, validate, Config};
use skein::crawler::{crawl, CrawlReport};
use skein::normalize;
use skein::output::{load_statistics, print_statistics};
use skein::storage::{SessionStatus, SqliteStore};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Skein: a distributed web crawler
///
/// Any number of Skein processes pointed at the same database and session
/// name cooperate on one crawl. A process that dies mid-fetch loses nothing:
/// its leased URLs return to the frontier once their leases expire.
#[derive(Parser, Debug)]
#[command(name = "skein")]
#[command(version)]
#[command(about = "A distributed, polite web crawler", long_about = None)]
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

    /// Reset the session (claims, frontier, documents) before crawling
    #[arg(long)]
    fresh: bool,

    /// Additional seed URL; may be repeated
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics of the session and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load(&cli.config, &cli.seeds, !cli.stats)?;
    tracing::debug!("Configuration loaded (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Reads the config file, appends command-line seeds, applies environment
/// overrides and validates the result
///
/// Statistics only need the store settings, so validation is optional.
fn load(path: &Path, extra_seeds: &[String], validated: bool) -> anyhow::Result<(Config, String)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let mut config = parse_config(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    config.seeds.extend(extra_seeds.iter().cloned());
    apply_env_overrides(&mut config);

    if validated {
        validate(&config).context("Invalid configuration")?;
    }

    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("skein=info,warn"),
            1 => EnvFilter::new("skein=debug,info"),
            2 => EnvFilter::new("skein=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Skein Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    println!("  Max depth: {}", crawler.max_depth);
    println!("  Concurrency: {}", crawler.concurrency);
    println!("  Per-host interval: {}ms", crawler.per_host_interval_ms);
    println!(
        "  Retries: {} (backoff {}ms..{}ms)",
        crawler.max_retries, crawler.retry_backoff_base_ms, crawler.retry_backoff_cap_ms
    );
    println!(
        "  Timeouts: fetch {}ms, lease {}ms",
        crawler.fetch_timeout_ms, crawler.lease_timeout_ms
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nStore:");
    println!("  Database: {}", config.store.database_path);
    println!("  Session: {}", config.store.session);

    let scope = &config.scope;
    println!("\nScope:");
    println!("  Stay on seed hosts: {}", scope.stay_on_seed_hosts);
    if !scope.allow.is_empty() {
        println!("  Allow: {}", scope.allow.join(", "));
    }
    if !scope.deny.is_empty() {
        println!("  Deny: {}", scope.deny.join(", "));
    }

    println!("\nSeeds ({}):", config.seeds.len());
    let mut usable = 0;
    for raw in &config.seeds {
        match normalize(raw, None) {
            Ok(url) => {
                usable += 1;
                println!("  - {}", url);
            }
            Err(e) => println!("  ! {} ({})", raw, e),
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed URLs", usable);
}

/// Handles the --stats mode: shows statistics of the configured session
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.store.database_path);

    let store = SqliteStore::open(Path::new(&config.store.database_path))
        .context("Failed to open the coordination store")?;
    let stats = load_statistics(&store, &config.store.session)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl of session '{}'", config.store.session);
    } else {
        tracing::info!(
            "Joining session '{}' (resumes if it already exists)",
            config.store.session
        );
    }
    tracing::info!(
        "{} seed URLs, {} workers",
        config.seeds.len(),
        config.crawler.concurrency
    );

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            signal.cancel();
        }
    });

    let report = crawl(config, &config_hash, fresh, cancel)
        .await
        .context("Crawl failed")?;
    print_report(&report);

    Ok(())
}

fn print_report(report: &CrawlReport) {
    let outcome = match report.status {
        SessionStatus::Completed => "completed",
        SessionStatus::Interrupted => "interrupted (run again to resume)",
        SessionStatus::Running => "running",
    };

    println!("\nSession '{}' {}", report.session_name, outcome);
    println!("  Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    println!("  Seeds enqueued: {}", report.seeds_enqueued);
    println!("  Fetched: {}", report.stats.fetched);
    println!("  Completed: {}", report.stats.completed);
    println!("  Dropped: {}", report.stats.dropped);
    println!("  Requeued: {}", report.stats.requeued);
    println!("  Links enqueued: {}", report.stats.links_enqueued);
    println!("  Hosts: {}", report.hosts_seen);
}
