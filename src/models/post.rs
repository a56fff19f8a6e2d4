//! Post data structures, from raw search result to persisted record.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};

/// Shape version written into every persisted record.
pub const SCHEMA_VERSION: u32 = 1;

/// A post as returned by the search API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawPost {
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    /// Self-text; link posts and deleted bodies come back null
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,

    /// Unix timestamp in seconds
    pub created_at: f64,

    pub permalink: String,

    pub forum: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub score: i64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub reply_count: i64,
}

impl RawPost {
    /// Interpret one search result item, failing if a required field is missing.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(AppError::malformed)
    }
}

/// A post together with the query cell that found it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPost {
    pub post: RawPost,
    pub matched_term: String,
    pub matched_age_token: String,
}

/// The persisted unit: scrubbed text plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedRecord {
    pub id: String,
    pub forum: String,
    pub title: String,
    pub body: String,
    pub created_at: f64,
    pub permalink: String,
    pub score: i64,
    pub reply_count: i64,
    pub matched_term: String,
    pub matched_age_token: String,
    pub schema_version: u32,
    pub content_hash: String,
}

impl SanitizedRecord {
    /// One-line console preview: forum, title and the start of the body.
    pub fn preview(&self, max_chars: usize) -> String {
        let flat = self.body.replace('\n', " ");
        let mut preview: String = flat.chars().take(max_chars).collect();
        if flat.chars().count() > max_chars {
            preview.push_str("...");
        }
        format!("{} {} {}", self.forum, self.title, preview)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
