//! Application configuration structures.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Smallest gap allowed between two search queries.
pub const MIN_QUERY_DELAY_MS: u64 = 1100;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search API and traversal settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Query vocabularies
    #[serde(default)]
    pub vocabulary: VocabularyConfig,

    /// Output log location
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, using defaults only when the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Err(AppError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("Config {} not found. Using defaults.", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Validate configuration values before any query is issued.
    pub fn validate(&self) -> Result<()> {
        if self.search.forum_set.trim().is_empty() {
            return Err(AppError::validation("search.forum_set is empty"));
        }
        if self.search.limit_per_query == 0 {
            return Err(AppError::validation("search.limit_per_query must be > 0"));
        }
        if self.search.timeout_secs == 0 {
            return Err(AppError::validation("search.timeout_secs must be > 0"));
        }
        if self.search.query_delay_ms < MIN_QUERY_DELAY_MS {
            return Err(AppError::validation(format!(
                "search.query_delay_ms must be >= {MIN_QUERY_DELAY_MS}"
            )));
        }
        let retry = &self.search.retry;
        if retry.max_attempts == 0 {
            return Err(AppError::validation(
                "search.retry.max_attempts must be >= 1",
            ));
        }
        if retry.initial_backoff_ms < MIN_QUERY_DELAY_MS {
            return Err(AppError::validation(format!(
                "search.retry.initial_backoff_ms must be >= {MIN_QUERY_DELAY_MS}"
            )));
        }
        if retry.max_backoff_ms < retry.initial_backoff_ms {
            return Err(AppError::validation(
                "search.retry.max_backoff_ms must be >= initial_backoff_ms",
            ));
        }
        self.search.cutoff_timestamp()?;

        check_vocabulary("vocabulary.terms", &self.vocabulary.terms, false)?;
        check_vocabulary("vocabulary.ages", &self.vocabulary.ages, false)?;
        check_vocabulary("vocabulary.excludes", &self.vocabulary.excludes, true)?;

        if !self.output.path_template.ends_with(".jsonl.gz") {
            log::warn!(
                "output.path_template {} does not end with .jsonl.gz",
                self.output.path_template
            );
        }
        Ok(())
    }
}

fn check_vocabulary(name: &str, words: &[String], allow_empty: bool) -> Result<()> {
    if words.is_empty() && !allow_empty {
        return Err(AppError::validation(format!("{name} is empty")));
    }
    if let Some(pos) = words.iter().position(|w| w.trim().is_empty()) {
        return Err(AppError::validation(format!(
            "{name}[{pos}] is blank"
        )));
    }
    Ok(())
}

/// Search API and traversal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Forum set searched by every query (e.g. "Parenting+Mommit")
    #[serde(default = "defaults::forum_set")]
    pub forum_set: String,

    /// Maximum results taken from each query
    #[serde(default = "defaults::limit_per_query")]
    pub limit_per_query: usize,

    /// Earliest post date kept, inclusive (YYYY-MM-DD, UTC midnight)
    #[serde(default = "defaults::cutoff_date")]
    pub cutoff_date: String,

    /// Delay between successive queries in milliseconds
    #[serde(default = "defaults::query_delay")]
    pub query_delay_ms: u64,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// OAuth token endpoint
    #[serde(default = "defaults::auth_url")]
    pub auth_url: String,

    /// Base URL for authenticated API calls
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// Retry policy for failed queries
    #[serde(default)]
    pub retry: RetryConfig,
}

impl SearchConfig {
    /// Cutoff as a unix timestamp (seconds).
    pub fn cutoff_timestamp(&self) -> Result<f64> {
        parse_cutoff(&self.cutoff_date)
    }

    pub fn query_delay(&self) -> Duration {
        Duration::from_millis(self.query_delay_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            forum_set: defaults::forum_set(),
            limit_per_query: defaults::limit_per_query(),
            cutoff_date: defaults::cutoff_date(),
            query_delay_ms: defaults::query_delay(),
            timeout_secs: defaults::timeout(),
            auth_url: defaults::auth_url(),
            api_base: defaults::api_base(),
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded exponential backoff for search calls.
///
/// `max_attempts = 1` means a failed query is fatal on the first error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "defaults::max_backoff")]
    pub max_backoff_ms: u64,
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let backoff = self.initial_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(backoff.min(self.max_backoff_ms))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            initial_backoff_ms: defaults::initial_backoff(),
            max_backoff_ms: defaults::max_backoff(),
        }
    }
}

/// Search vocabularies for the term × age cross-product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyConfig {
    /// Injury/event keywords
    #[serde(default = "defaults::terms")]
    pub terms: Vec<String>,

    /// Age tokens
    #[serde(default = "defaults::ages")]
    pub ages: Vec<String>,

    /// Words negated in every query
    #[serde(default = "defaults::excludes")]
    pub excludes: Vec<String>,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            terms: defaults::terms(),
            ages: defaults::ages(),
            excludes: defaults::excludes(),
        }
    }
}

/// Output log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output path; `{date}` is replaced with the UTC run date (YYYYMMDD)
    #[serde(default = "defaults::path_template")]
    pub path_template: String,
}

impl OutputConfig {
    /// Resolve the template for today's run.
    pub fn path_for_today(&self) -> PathBuf {
        self.path_for_stamp(&Utc::now().format("%Y%m%d").to_string())
    }

    pub fn path_for_stamp(&self, stamp: &str) -> PathBuf {
        PathBuf::from(self.path_template.replace("{date}", stamp))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path_template: defaults::path_template(),
        }
    }
}

/// API credentials and client identity, read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl Credentials {
    pub const CLIENT_ID_VAR: &'static str = "REDDIT_CLIENT_ID";
    pub const CLIENT_SECRET_VAR: &'static str = "REDDIT_CLIENT_SECRET";
    pub const USER_AGENT_VAR: &'static str = "REDDIT_USER_AGENT";

    /// Read credentials from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary lookup; missing or blank values fail.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::config(format!("{key} is not set")))
        };
        Ok(Self {
            client_id: get(Self::CLIENT_ID_VAR)?,
            client_secret: get(Self::CLIENT_SECRET_VAR)?,
            user_agent: get(Self::USER_AGENT_VAR)?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Parse an ISO date into the unix timestamp of its UTC midnight.
pub fn parse_cutoff(date: &str) -> Result<f64> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| AppError::validation(format!("invalid cutoff date '{date}': {e}")))?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::validation(format!("invalid cutoff date '{date}'")))?;
    Ok(midnight.and_utc().timestamp() as f64)
}

mod defaults {
    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // Search defaults
    pub fn forum_set() -> String {
        "Parenting".into()
    }
    pub fn limit_per_query() -> usize {
        10
    }
    pub fn cutoff_date() -> String {
        "2025-08-01".into()
    }
    pub fn query_delay() -> u64 {
        super::MIN_QUERY_DELAY_MS
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn auth_url() -> String {
        "https://www.reddit.com/api/v1/access_token".into()
    }
    pub fn api_base() -> String {
        "https://oauth.reddit.com".into()
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        1
    }
    pub fn initial_backoff() -> u64 {
        2000
    }
    pub fn max_backoff() -> u64 {
        60_000
    }

    // Vocabulary defaults
    pub fn terms() -> Vec<String> {
        words(&[
            "fell",
            "fall",
            "slipped",
            "hit head",
            "burn",
            "scald",
            "choked",
            "swallowed",
            "poison",
            "detergent pod",
            "button battery",
            "magnet",
            "stitches",
            "fracture",
            "cut",
            "concussion",
            "bumped head",
            "ER",
            "A&E",
            "ED",
        ])
    }
    pub fn ages() -> Vec<String> {
        words(&[
            "baby",
            "infant",
            "newborn",
            "toddler",
            "1yo",
            "2 yo",
            "3 yo",
            "18 months",
            "LO",
            "DD",
            "DS",
        ])
    }
    pub fn excludes() -> Vec<String> {
        words(&["lawyer", "insurance", "workout", "sports", "MLB", "NFL"])
    }

    // Output defaults
    pub fn path_template() -> String {
        "data/raw/reddit_child_injury_{date}.jsonl.gz".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_vocabularies() {
        let mut config = Config::default();
        config.vocabulary.terms.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.vocabulary.ages = vec!["baby".into(), "  ".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_allows_no_excludes() {
        let mut config = Config::default();
        config.vocabulary.excludes.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_delay_and_zero_limit() {
        let mut config = Config::default();
        config.search.query_delay_ms = 500;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.limit_per_query = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_backoff_below_query_delay() {
        let mut config = Config::default();
        config.search.retry.initial_backoff_ms = 100;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.retry.max_backoff_ms = MIN_QUERY_DELAY_MS;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.retry.initial_backoff_ms = MIN_QUERY_DELAY_MS;
        config.search.retry.max_backoff_ms = MIN_QUERY_DELAY_MS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_or_default_uses_defaults_only_for_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config::load_or_default(tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.search.forum_set, "Parenting");
    }

    #[test]
    fn load_or_default_rejects_unparseable_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("harvester.toml");
        fs::write(
            &path,
            "[search]\nforum_set = \"Mommit\"\nlimit_per_query = \"ten\"\n",
        )
        .unwrap();

        let err = Config::load_or_default(&path).unwrap_err();
        assert!(matches!(err, AppError::Toml(_)));
    }

    #[test]
    fn validate_rejects_bad_cutoff() {
        let mut config = Config::default();
        config.search.cutoff_date = "01/08/2025".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn cutoff_is_utc_midnight() {
        assert_eq!(parse_cutoff("2024-01-01").unwrap(), 1_704_067_200.0);
        assert_eq!(parse_cutoff("1970-01-01").unwrap(), 0.0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [search]
            forum_set = "Parenting+Mommit"

            [vocabulary]
            terms = ["fell"]
            "#,
        )
        .unwrap();
        assert_eq!(config.search.forum_set, "Parenting+Mommit");
        assert_eq!(config.search.query_delay_ms, MIN_QUERY_DELAY_MS);
        assert_eq!(config.vocabulary.terms, vec!["fell".to_string()]);
        assert_eq!(config.vocabulary.ages.len(), 11);
    }

    #[test]
    fn path_template_uses_run_stamp() {
        let output = OutputConfig::default();
        assert_eq!(
            output.path_for_stamp("20250801"),
            PathBuf::from("data/raw/reddit_child_injury_20250801.jsonl.gz")
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        };
        assert_eq!(retry.backoff_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_for_attempt(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_for_attempt(3), Duration::from_millis(350));
    }

    #[test]
    fn credentials_require_every_variable() {
        let full = |key: &str| match key {
            "REDDIT_CLIENT_ID" => Some("id".to_string()),
            "REDDIT_CLIENT_SECRET" => Some("secret".to_string()),
            "REDDIT_USER_AGENT" => Some("harvester/0.1".to_string()),
            _ => None,
        };
        let creds = Credentials::from_lookup(full).unwrap();
        assert_eq!(creds.user_agent, "harvester/0.1");
        assert!(!format!("{creds:?}").contains("secret\""));

        let missing_secret = |key: &str| match key {
            "REDDIT_CLIENT_SECRET" => Some(" ".to_string()),
            other => full(other),
        };
        assert!(matches!(
            Credentials::from_lookup(missing_secret),
            Err(AppError::Config(_))
        ));
    }
}
