// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::blocking::{Client, Response};

use crate::error::Result;
use crate::models::SearchConfig;

/// Longest response body echoed back inside an error message.
const ERROR_BODY_LIMIT: usize = 300;

/// Create a configured blocking HTTP client.
pub fn create_client(config: &SearchConfig, user_agent: &str) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Describe a non-success response as `HTTP <status>: <body prefix>`.
pub fn describe_failure(response: Response) -> String {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    format!("HTTP {status}: {}", body.trim())
}
