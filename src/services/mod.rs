//! Service layer for the harvester.
//!
//! This module contains the acquisition logic:
//! - Query construction (`QuerySynthesizer`)
//! - Search API access (`SearchApi`, `RedditSearch`)
//! - In-run duplicate suppression (`Deduplicator`)
//! - Rate-limited cross-product traversal (`SearchTraverser`)
//! - PII redaction and record construction (`PrivacyScrubber`, `Sanitizer`)

mod dedup;
mod query;
mod sanitize;
mod scrub;
mod search;
mod traverse;

pub use dedup::Deduplicator;
pub use query::QuerySynthesizer;
pub use sanitize::Sanitizer;
pub use scrub::{EMAIL_TOKEN, HANDLE_TOKEN, PHONE_TOKEN, PrivacyScrubber, URL_TOKEN};
pub use search::{RedditSearch, SearchApi, SearchRequest};
pub use traverse::{
    SearchTraverser, Sleeper, ThreadSleeper, Traversal, TraversalPlan, TraversalStats,
};

#[cfg(test)]
pub(crate) use traverse::tests as fakes;
