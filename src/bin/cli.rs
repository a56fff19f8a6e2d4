//! Harvester CLI
//!
//! Local execution entry point. Credentials come from the environment
//! (`REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET`, `REDDIT_USER_AGENT`), which
//! may be seeded from a `.env` file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use harvester::{
    error::{AppError, Result},
    models::{Config, Credentials},
    pipeline,
    services::{QuerySynthesizer, TraversalPlan},
};

/// Forum post harvester
#[derive(Parser, Debug)]
#[command(
    name = "harvester",
    version,
    about = "Collect scrubbed forum posts into an append-only gzip JSONL log"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "harvester.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every query and append matching posts to the log
    Crawl {
        /// Output file (default: today's path from the config template)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Earliest creation date to keep, YYYY-MM-DD
        #[arg(long)]
        cutoff: Option<String>,

        /// Maximum results per query
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the queries a crawl would issue, in order
    Queries,

    /// Validate the configuration file
    Validate,

    /// Check record integrity of an existing log
    Verify {
        /// Log file to check
        path: PathBuf,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Command::Crawl {
            output,
            cutoff,
            limit,
        } => {
            if let Some(cutoff) = cutoff {
                config.search.cutoff_date = cutoff;
            }
            if let Some(limit) = limit {
                config.search.limit_per_query = limit;
            }
            config.validate()?;

            let credentials = Credentials::from_env()?;
            let output = output.unwrap_or_else(|| config.output.path_for_today());
            log::info!("Harvester starting, writing to {}", output.display());

            let summary = pipeline::run_crawl(&config, credentials, &output)?;
            log::info!(
                "Crawl complete: {} saved, {} queries, {} before cutoff, {} duplicates, {} malformed",
                summary.saved,
                summary.queries_issued,
                summary.dropped_before_cutoff,
                summary.dropped_duplicates,
                summary.malformed_skipped
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Queries => {
            config.validate()?;
            let plan = TraversalPlan::from_config(&config)?;
            let synthesizer = QuerySynthesizer::new(config.vocabulary.excludes.clone());
            for (term, age) in plan.cells() {
                println!("{}", synthesizer.build(term, age)?);
            }
            log::info!("{} queries against {}", plan.cell_count(), plan.forum_set);
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "Config OK: {} terms, {} age tokens, {} excludes",
                config.vocabulary.terms.len(),
                config.vocabulary.ages.len(),
                config.vocabulary.excludes.len()
            );

            match Credentials::from_env() {
                Ok(_) => log::info!("Credentials present"),
                Err(e) => log::warn!("{}", e),
            }
        }

        Command::Verify { path } => {
            let report = pipeline::verify_log(&path)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                return Err(AppError::integrity(format!(
                    "{} records in {} have mismatched content hashes",
                    report.hash_mismatches.len(),
                    path.display()
                )));
            }
        }
    }

    Ok(())
}
