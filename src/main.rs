//! zbze-harvest main entry point
//!
//! This is the command-line interface for the zbze harvester.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zbze_harvest::config::{load_config_with_hash, Config, SourceConfig};
use zbze_harvest::crawler::{HarvestRun, HttpFetcher, YearOverrides};
use zbze_harvest::output::{load_statistics, print_run_summary, print_statistics};
use zbze_harvest::HarvestError;

/// zbze-harvest: a bounded-domain web and feed harvester
///
/// Harvests articles, feed entries and PDF archives from a fixed set of
/// configured sources into JSON-lines logs, keyed SQLite stores and asset
/// directories. Re-running a source updates records in place.
#[derive(Parser, Debug)]
#[command(name = "zbze-harvest")]
#[command(version)]
#[command(about = "A bounded-domain web and feed harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Sources to harvest (default: all configured sources)
    #[arg(value_name = "SOURCE")]
    sources: Vec<String>,

    /// First archive year, overriding the config file
    #[arg(long, value_name = "YEAR")]
    start_year: Option<i32>,

    /// Last archive year, overriding the config file
    #[arg(long, value_name = "YEAR")]
    end_year: Option<i32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be requested without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the outputs and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    fn year_overrides(&self) -> YearOverrides {
        YearOverrides {
            start: self.start_year,
            end: self.end_year,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let sources = select_sources(&config, &cli.sources)?;

    if cli.dry_run {
        handle_dry_run(&config, &sources, cli.year_overrides())
    } else if cli.stats {
        handle_stats(&config, &sources)
    } else {
        handle_harvest(&config, &sources, &config_hash, cli.year_overrides()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("zbze_harvest=info,warn"),
            1 => EnvFilter::new("zbze_harvest=debug,info"),
            2 => EnvFilter::new("zbze_harvest=trace,debug"),
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

/// Resolves source names from the command line, keeping config order when
/// none are given
fn select_sources<'a>(
    config: &'a Config,
    names: &[String],
) -> anyhow::Result<Vec<&'a SourceConfig>> {
    if names.is_empty() {
        return Ok(config.sources.iter().collect());
    }

    names
        .iter()
        .map(|name| {
            config
                .source(name)
                .ok_or_else(|| anyhow::Error::from(HarvestError::UnknownSource(name.clone())))
        })
        .collect()
}

/// Handles the --dry-run mode: validates config and shows what would be requested
fn handle_dry_run(
    config: &Config,
    sources: &[&SourceConfig],
    years: YearOverrides,
) -> anyhow::Result<()> {
    println!("=== zbze-harvest Dry Run ===\n");

    println!("Harvester Configuration:");
    println!("  Data directory: {}", config.harvester.data_dir.display());
    println!("  Request delay: {}ms", config.harvester.request_delay);
    println!(
        "  Max concurrent requests: {}",
        config.harvester.max_concurrent_requests
    );
    println!("  Max retries: {}", config.harvester.max_retries);
    println!("  Obey robots.txt: {}", config.harvester.obey_robots);
    println!("  Overwrite assets: {}", config.harvester.overwrite_assets);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    for source in sources {
        println!(
            "\n{} ({}) -> {}",
            source.name(),
            source.kind(),
            config.harvester.source_dir(source.name()).display()
        );

        match source {
            SourceConfig::Crawl(crawl) => {
                println!("  Allowed domains: {}", crawl.allowed_domains.join(", "));
                println!("  Rules: {}", crawl.rules.len());
                println!("  Fields: {}", crawl.fields.len());
                for seed in &crawl.start_urls {
                    println!("    * {}", seed);
                }
            }
            SourceConfig::Feed(feed) => {
                for url in feed.feed_urls() {
                    println!("    * {}", url);
                }
            }
            SourceConfig::Archive(archive) => {
                let range = archive.year_range(years.start, years.end)?;
                println!("  Years: {}-{}", range.start, range.end);
                for year in range.years() {
                    println!("    * {}", archive.year_url(year));
                }
            }
        }
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the outputs
fn handle_stats(config: &Config, sources: &[&SourceConfig]) -> anyhow::Result<()> {
    let stats = sources
        .iter()
        .map(|source| load_statistics(&config.harvester, source, 5))
        .collect::<Result<Vec<_>, _>>()?;

    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation, one source after another
async fn handle_harvest(
    config: &Config,
    sources: &[&SourceConfig],
    config_hash: &str,
    years: YearOverrides,
) -> anyhow::Result<()> {
    let fetcher = Arc::new(
        HttpFetcher::new(&config.user_agent, &config.harvester)
            .context("Failed to build HTTP client")?,
    );

    for source in sources {
        let mut run = HarvestRun::new(
            source,
            &config.harvester,
            fetcher.clone(),
            config_hash,
            years,
        )
        .with_context(|| format!("Failed to prepare source '{}'", source.name()))?;

        let outcome = tokio::select! {
            result = run.run() => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        match outcome {
            Some(result) => {
                let summary =
                    result.with_context(|| format!("Source '{}' failed", source.name()))?;
                print_run_summary(&summary);
            }
            None => {
                let summary = run.mark_interrupted()?;
                print_run_summary(&summary);
                anyhow::bail!("Interrupted");
            }
        }
    }

    Ok(())
}
