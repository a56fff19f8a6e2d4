// src/pipeline/crawl.rs

//! Post acquisition pipeline: traverse, sanitize, append.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::{Config, Credentials};
use crate::services::{
    QuerySynthesizer, RedditSearch, Sanitizer, SearchApi, SearchTraverser, Sleeper,
    TraversalPlan, TraversalStats,
};
use crate::storage::{DurableAppendLog, RecordSink};

/// Body characters shown per saved record in the progress log.
const PREVIEW_CHARS: usize = 120;

/// Outcome of a completed crawl.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub saved: usize,
    pub queries_issued: usize,
    pub retries: usize,
    pub dropped_before_cutoff: usize,
    pub dropped_duplicates: usize,
    pub malformed_skipped: usize,
    pub output: String,
}

impl CrawlSummary {
    fn new(
        started_at: DateTime<Utc>,
        saved: usize,
        stats: &TraversalStats,
        output: String,
    ) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            saved,
            queries_issued: stats.queries_issued,
            retries: stats.retries,
            dropped_before_cutoff: stats.dropped_before_cutoff,
            dropped_duplicates: stats.dropped_duplicates,
            malformed_skipped: stats.malformed_skipped,
            output,
        }
    }
}

/// Drive one traversal to completion, persisting every post it yields.
///
/// Search failures and sink I/O errors abort the run; malformed items are
/// skipped by the traversal and only show up in the summary.
pub fn run_crawler<A: SearchApi, S: Sleeper>(
    traverser: &SearchTraverser<A, S>,
    sanitizer: &Sanitizer,
    sink: &mut dyn RecordSink,
) -> Result<CrawlSummary> {
    let started_at = Utc::now();
    let plan = traverser.plan();
    log::info!(
        "Crawling {} queries ({} terms x {} ages) in {}",
        plan.cell_count(),
        plan.terms.len(),
        plan.ages.len(),
        plan.forum_set
    );

    let mut traversal = traverser.traverse();
    let mut saved = 0;

    while let Some(next) = traversal.next() {
        let outcome = next.and_then(|matched| {
            let record = sanitizer.sanitize(matched);
            sink.append_record(&record)?;
            Ok(record)
        });

        match outcome {
            Ok(record) => {
                saved += 1;
                log::info!("{} {}", saved, record.preview(PREVIEW_CHARS));
            }
            Err(e) => {
                log::error!(
                    "Crawl aborted after {} saved records ({} queries): {}",
                    saved,
                    traversal.stats().queries_issued,
                    e
                );
                return Err(e);
            }
        }
    }

    let summary = CrawlSummary::new(started_at, saved, traversal.stats(), sink.location());
    log::info!("Saved {} records to {}", summary.saved, summary.output);
    if summary.malformed_skipped > 0 {
        log::warn!("Skipped {} malformed items", summary.malformed_skipped);
    }
    Ok(summary)
}

/// Build the production collaborators from configuration and run a crawl.
pub fn run_crawl(config: &Config, credentials: Credentials, output: &Path) -> Result<CrawlSummary> {
    config.validate()?;

    let plan = TraversalPlan::from_config(config)?;
    let api = RedditSearch::new(&config.search, credentials)?;
    let synthesizer = QuerySynthesizer::new(config.vocabulary.excludes.clone());
    let traverser = SearchTraverser::new(api, synthesizer, plan);
    let sanitizer = Sanitizer::new()?;

    let mut log = DurableAppendLog::new(output);
    let stale = log.remove_stale_staging()?;
    if stale > 0 {
        log::warn!("Removed {} staging files from an interrupted run", stale);
    }

    run_crawler(&traverser, &sanitizer, &mut log)
}
