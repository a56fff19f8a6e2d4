//! Pipeline entry points for harvester operations.
//!
//! - `run_crawl`: Search, scrub and append posts to the day's log
//! - `verify_log`: Re-read a log and check every record's content hash

pub mod crawl;
pub mod verify;

pub use crawl::{CrawlSummary, run_crawl, run_crawler};
pub use verify::{VerifyReport, verify_log};
