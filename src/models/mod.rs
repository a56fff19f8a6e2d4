// src/models/mod.rs

//! Domain models for the harvester.
//!
//! This module contains the configuration surface and the post types that
//! flow through the acquisition pipeline.

mod config;
mod post;

// Re-export all public types
pub use config::{
    Config, Credentials, MIN_QUERY_DELAY_MS, OutputConfig, RetryConfig, SearchConfig,
    VocabularyConfig, parse_cutoff,
};
pub use post::{MatchedPost, RawPost, SCHEMA_VERSION, SanitizedRecord};
