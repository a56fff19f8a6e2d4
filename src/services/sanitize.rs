// src/services/sanitize.rs

//! Turns a matched post into the record that gets persisted.

use crate::error::Result;
use crate::models::{MatchedPost, SCHEMA_VERSION, SanitizedRecord};
use crate::services::scrub::PrivacyScrubber;
use crate::utils::hash::content_hash;

/// Scrubs text fields and stamps bookkeeping onto each record.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    scrubber: PrivacyScrubber,
}

impl Sanitizer {
    pub fn new() -> Result<Self> {
        Ok(Self::with_scrubber(PrivacyScrubber::new()?))
    }

    pub fn with_scrubber(scrubber: PrivacyScrubber) -> Self {
        Self { scrubber }
    }

    /// Build the persisted record. The hash covers the scrubbed text only.
    pub fn sanitize(&self, matched: MatchedPost) -> SanitizedRecord {
        let MatchedPost {
            post,
            matched_term,
            matched_age_token,
        } = matched;

        let title = self.scrubber.scrub(&post.title);
        let body = self.scrubber.scrub(&post.body);
        let content_hash = content_hash(&title, &body);

        SanitizedRecord {
            id: post.id,
            forum: post.forum,
            title,
            body,
            created_at: post.created_at,
            permalink: post.permalink,
            score: post.score,
            reply_count: post.reply_count,
            matched_term,
            matched_age_token,
            schema_version: SCHEMA_VERSION,
            content_hash,
        }
    }
}
