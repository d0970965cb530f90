//! hedgeflow CLI: run the decision pipeline and inspect the data cache.
//!
//! Commands:
//! - `run`: analyze one ticker and print the decision as JSON
//! - `cache status`: entries and size per record kind

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use hedgeflow_core::data::JsonCache;
use hedgeflow_runner::request::{DEFAULT_INITIAL_CAPITAL, DEFAULT_NUM_OF_NEWS};
use hedgeflow_runner::{run_pipeline, Decision, PipelineConfig, PipelineContext, Portfolio, RunRequest};

#[derive(Parser)]
#[command(name = "hedgeflow", about = "hedgeflow: multi-stage trading decision pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one ticker and print the trading decision.
    Run {
        /// Ticker symbol (e.g., AAPL).
        #[arg(long)]
        ticker: String,

        /// Start date (YYYY-MM-DD). Defaults to 90 days before the end date.
        #[arg(long)]
        start_date: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end_date: Option<String>,

        /// Starting cash.
        #[arg(long, default_value_t = DEFAULT_INITIAL_CAPITAL)]
        initial_capital: f64,

        /// Shares already held.
        #[arg(long, default_value_t = 0.0)]
        initial_position: f64,

        /// Log every stage's reasoning.
        #[arg(long, default_value_t = false)]
        show_reasoning: bool,

        /// Number of news articles to score (1-100).
        #[arg(long, default_value_t = DEFAULT_NUM_OF_NEWS)]
        num_of_news: u32,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cache directory. Overrides the config file.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Directory of saved news files. Overrides the config file.
        #[arg(long)]
        news_dir: Option<PathBuf>,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report entry counts and sizes per record kind.
    Status {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cache directory. Overrides the config file.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            ticker,
            start_date,
            end_date,
            initial_capital,
            initial_position,
            show_reasoning,
            num_of_news,
            config,
            cache_dir,
            news_dir,
        } => {
            let mut pipeline_config = load_config(config.as_deref())?;
            if let Some(dir) = cache_dir {
                pipeline_config.cache_dir = dir;
            }
            if news_dir.is_some() {
                pipeline_config.news_dir = news_dir;
            }
            init_logging(&pipeline_config.log_filter);

            if ticker.trim().is_empty() {
                bail!("--ticker must not be empty");
            }
            let mut request = RunRequest::new(ticker)
                .with_dates(start_date.as_deref(), end_date.as_deref());
            request.portfolio = Portfolio {
                cash: initial_capital,
                stock: initial_position,
            };
            request.show_reasoning = show_reasoning;
            request.num_of_news = num_of_news;

            let ctx = PipelineContext::from_config(pipeline_config)?;
            let decision = run_pipeline(&request, Arc::new(ctx))?;
            print_decision(&decision)
        }
        Commands::Cache { action } => match action {
            CacheAction::Status { config, cache_dir } => {
                let pipeline_config = load_config(config.as_deref())?;
                init_logging(&pipeline_config.log_filter);
                let dir = cache_dir.unwrap_or(pipeline_config.cache_dir);
                run_cache_status(&dir)
            }
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_file(p)
            .with_context(|| format!("loading config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

/// `RUST_LOG` wins over the configured filter.
fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_decision(decision: &Decision) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(decision)?);
    if !decision.degraded_stages.is_empty() {
        eprintln!(
            "WARNING: degraded stages: {}",
            decision.degraded_stages.join(", ")
        );
    }
    for gap in &decision.data_gaps {
        eprintln!("WARNING: no {gap} available; decided without it");
    }
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let rows = JsonCache::new(cache_dir).status();
    let total_entries: usize = rows.iter().map(|r| r.entries).sum();
    if total_entries == 0 {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }
    let total_size: u64 = rows.iter().map(|r| r.bytes).sum();

    println!("Cache: {}", cache_dir.display());
    println!("Entries: {total_entries}");
    println!("Total size: {}", format_size(total_size));
    println!();
    println!("{:<22} {:>8} {:>10}", "Kind", "Entries", "Size");
    println!("{}", "-".repeat(42));
    for row in &rows {
        println!(
            "{:<22} {:>8} {:>10}",
            row.kind.as_str(),
            row.entries,
            format_size(row.bytes)
        );
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
