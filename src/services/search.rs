// src/services/search.rs

//! Search API boundary and the Reddit implementation.
//!
//! The traverser only sees [`SearchApi`]: one call per query, returning the
//! result items with pagination already resolved. Items are handed over as
//! untyped JSON in [`RawPost`](crate::models::RawPost) field naming so that a
//! single malformed item can be skipped without failing the whole query.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Credentials, SearchConfig};
use crate::utils::http;

/// Largest page the listing endpoint serves.
const MAX_PAGE_SIZE: usize = 100;

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Results come back newest first.
const SORT_ORDER: &str = "new";

/// One bounded search against a forum set.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub scope: &'a str,
    pub limit: usize,
}

/// A paginated search service.
pub trait SearchApi {
    /// Run one query and return at most `request.limit` items.
    fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<Value>>;
}

impl<T: SearchApi + ?Sized> SearchApi for &T {
    fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<Value>> {
        (**self).search(request)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    #[serde(default)]
    data: Value,
}

/// Reddit search over the OAuth API using app-only credentials.
pub struct RedditSearch {
    client: Client,
    credentials: Credentials,
    auth_url: Url,
    api_base: Url,
    token: RefCell<Option<AccessToken>>,
}

impl RedditSearch {
    pub fn new(config: &SearchConfig, credentials: Credentials) -> Result<Self> {
        let client = http::create_client(config, &credentials.user_agent)?;
        Ok(Self {
            client,
            credentials,
            auth_url: Url::parse(&config.auth_url)?,
            api_base: Url::parse(&config.api_base)?,
            token: RefCell::new(None),
        })
    }

    /// Return a cached bearer token, fetching a new one when missing or stale.
    fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.borrow().as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        log::debug!("Requesting access token from {}", self.auth_url);
        let response = self
            .client
            .post(self.auth_url.clone())
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::search_status(
                "<auth>",
                status.as_u16(),
                http::describe_failure(response),
            ));
        }

        let body: TokenResponse = response.json()?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let value = body.access_token;
        *self.token.borrow_mut() = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    fn search_url(&self, scope: &str) -> String {
        format!(
            "{}/r/{}/search",
            self.api_base.as_str().trim_end_matches('/'),
            scope
        )
    }

    fn fetch_page(
        &self,
        request: &SearchRequest<'_>,
        page_size: usize,
        after: Option<&str>,
    ) -> Result<ListingData> {
        let token = self.access_token()?;
        let page_size = page_size.to_string();
        let mut params = vec![
            ("q", request.query),
            ("sort", SORT_ORDER),
            ("t", "all"),
            ("restrict_sr", "true"),
            ("raw_json", "1"),
            ("limit", page_size.as_str()),
        ];
        if let Some(cursor) = after {
            params.push(("after", cursor));
        }

        let response = self
            .client
            .get(self.search_url(request.scope))
            .bearer_auth(token)
            .query(&params)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::search_status(
                request.query,
                status.as_u16(),
                http::describe_failure(response),
            ));
        }

        let listing: Listing = response
            .json()
            .map_err(|e| AppError::search(request.query, format!("unreadable listing: {e}")))?;
        Ok(listing.data)
    }
}

impl SearchApi for RedditSearch {
    fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut after: Option<String> = None;

        while items.len() < request.limit {
            let page_size = (request.limit - items.len()).min(MAX_PAGE_SIZE);
            let page = self.fetch_page(request, page_size, after.as_deref())?;
            if page.children.is_empty() {
                break;
            }

            items.extend(
                page.children
                    .iter()
                    .take(request.limit - items.len())
                    .map(|child| normalize_item(&child.data)),
            );

            match page.after {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        log::debug!("Query {} returned {} items", request.query, items.len());
        Ok(items)
    }
}

/// Rename Reddit listing fields to the [`RawPost`](crate::models::RawPost) names.
fn normalize_item(data: &Value) -> Value {
    let field = |name: &str| data.get(name).cloned().unwrap_or(Value::Null);
    json!({
        "id": field("id"),
        "title": field("title"),
        "body": field("selftext"),
        "created_at": field("created_utc"),
        "permalink": field("permalink"),
        "forum": field("subreddit"),
        "score": field("score"),
        "reply_count": field("num_comments"),
    })
}
