// src/error.rs

//! Unified error handling for the harvester.

use std::fmt;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Regex compilation failed
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Search API call failed; `status` is set when the server answered
    #[error("Search failed for {query}: {message}")]
    Search {
        query: String,
        status: Option<u16>,
        message: String,
    },

    /// A single search result item could not be interpreted
    #[error("Malformed item: {0}")]
    MalformedItem(String),

    /// A persisted record does not match its content hash
    #[error("Integrity error: {0}")]
    Integrity(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a search error with the query that failed.
    pub fn search(query: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Search {
            query: query.into(),
            status: None,
            message: message.to_string(),
        }
    }

    /// Create a search error for a non-success HTTP response.
    pub fn search_status(
        query: impl Into<String>,
        status: u16,
        message: impl fmt::Display,
    ) -> Self {
        Self::Search {
            query: query.into(),
            status: Some(status),
            message: message.to_string(),
        }
    }

    /// Create a malformed item error.
    pub fn malformed(message: impl fmt::Display) -> Self {
        Self::MalformedItem(message.to_string())
    }

    /// Create an integrity error.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    /// Whether the same request may succeed on retry: timeouts, connection
    /// failures, rate limiting (429) and server errors (5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Search {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
