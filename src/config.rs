//! Runtime configuration for fetching, classification and truncation.
//!
//! Configuration is read from an optional YAML file. Every field has a
//! default, so an empty file (or no file at all) yields a working setup:
//!
//! ```yaml
//! max_retries: 3
//! base_delay_secs: 1.0
//! proxies:
//!   - http://127.0.0.1:8080
//! classifier:
//!   endpoint: https://api-inference.huggingface.co/models/ProsusAI/finbert
//! truncation:
//!   unit: words
//!   length: 300
//! ```

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::error::ConfigError;
use crate::scrapers::fetcher::FetchPolicy;

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

const DEFAULT_REFERERS: &[&str] = &[
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://duckduckgo.com/",
];

/// Top-level configuration consumed by the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Total HTTP attempts per URL.
    pub max_retries: u32,
    /// First backoff delay; doubles after every failed attempt.
    pub base_delay_secs: f64,
    pub pacing_min_secs: f64,
    pub pacing_max_secs: f64,
    pub request_timeout_secs: u64,
    pub user_agents: Vec<String>,
    pub proxies: Vec<String>,
    pub referers: Vec<String>,
    pub accept_language: String,
    pub classifier: ClassifierConfig,
    pub truncation: TruncationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 1.0,
            pacing_min_secs: 1.0,
            pacing_max_secs: 5.0,
            request_timeout_secs: 10,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            proxies: Vec::new(),
            referers: DEFAULT_REFERERS.iter().map(|s| s.to_string()).collect(),
            accept_language: "en-US,en;q=0.9".to_string(),
            classifier: ClassifierConfig::default(),
            truncation: TruncationConfig::default(),
        }
    }
}

/// Where and how to reach the sentiment model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoint: String,
    /// Name of the environment variable holding a bearer token.
    pub api_token_env: String,
    pub max_retries: usize,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api-inference.huggingface.co/models/ProsusAI/finbert".to_string(),
            api_token_env: "HF_API_TOKEN".to_string(),
            max_retries: 2,
            timeout_secs: 30,
        }
    }
}

impl ClassifierConfig {
    pub fn api_token(&self) -> Option<String> {
        std::env::var(&self.api_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationUnit {
    Chars,
    /// Whitespace-delimited words, a closer proxy for model token limits.
    Words,
}

/// How classifier input is shortened before it reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TruncationConfig {
    pub unit: TruncationUnit,
    pub length: usize,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            unit: TruncationUnit::Chars,
            length: 512,
        }
    }
}

impl TruncationConfig {
    /// Shorten `text` to at most `length` units.
    pub fn apply<'a>(&self, text: &'a str) -> &'a str {
        match self.unit {
            TruncationUnit::Chars => match text.char_indices().nth(self.length) {
                Some((idx, _)) => &text[..idx],
                None => text,
            },
            TruncationUnit::Words => {
                let mut words = 0;
                let mut in_word = false;
                for (idx, c) in text.char_indices() {
                    if c.is_whitespace() {
                        in_word = false;
                    } else if !in_word {
                        if words == self.length {
                            return text[..idx].trim_end();
                        }
                        words += 1;
                        in_word = true;
                    }
                }
                text
            }
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| ConfigError::Read {
                        path: path.to_string(),
                        source,
                    })?;
                Self::from_yaml(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        debug!(?config, "Loaded pipeline configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_delay_secs.is_finite() && self.base_delay_secs > 0.0) {
            return Err(ConfigError::Invalid(
                "base_delay_secs must be greater than zero".into(),
            ));
        }
        if !(self.pacing_min_secs >= 0.0 && self.pacing_min_secs <= self.pacing_max_secs) {
            return Err(ConfigError::Invalid(format!(
                "pacing range [{}, {}] is not valid",
                self.pacing_min_secs, self.pacing_max_secs
            )));
        }
        if !self.pacing_max_secs.is_finite() {
            return Err(ConfigError::Invalid("pacing_max_secs must be finite".into()));
        }
        if self.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "user_agents must contain at least one entry".into(),
            ));
        }
        if self.referers.iter().all(|r| r.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "referers must contain at least one entry".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.truncation.length == 0 {
            return Err(ConfigError::Invalid(
                "truncation.length must be greater than zero".into(),
            ));
        }
        for proxy in &self.proxies {
            Url::parse(proxy)
                .map_err(|e| ConfigError::Invalid(format!("proxy '{proxy}' is not a URL: {e}")))?;
        }
        Url::parse(&self.classifier.endpoint).map_err(|e| {
            ConfigError::Invalid(format!(
                "classifier endpoint '{}' is not a URL: {e}",
                self.classifier.endpoint
            ))
        })?;
        Ok(())
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs_f64(self.base_delay_secs),
            pacing_min: Duration::from_secs_f64(self.pacing_min_secs),
            pacing_max: Duration::from_secs_f64(self.pacing_max_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
