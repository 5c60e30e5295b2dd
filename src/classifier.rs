//! Sentiment classification of sentence groups.
//!
//! The model itself is an external capability behind [`SentimentModel`].
//! [`SentimentClassifier`] wraps any model, truncates its input, and turns
//! the raw per-class scores into a [`SentimentResult`] with a fixed schema.
//!
//! # Architecture
//!
//! - [`SentimentModel`]: text in, per-class `{label, score}` entries out
//! - [`HttpSentimentModel`]: a Hugging Face style text-classification endpoint
//! - [`RetryModel`]: decorator adding bounded exponential backoff to any model
//! - [`SentimentClassifier`]: truncation, normalization and label derivation

use std::fmt;
use std::time::{Duration, Instant};

use rand::{Rng, rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::config::{ClassifierConfig, TruncationConfig};
use crate::error::{ClassificationError, ModelError};
use crate::models::{ClassProbabilities, SentimentResult, numeric_label};
use crate::scrapers::fetcher::pause;
use crate::utils::truncate_for_log;

/// One class score as returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub label: String,
    pub score: f64,
}

/// External sentiment model.
///
/// Implementors return one entry per class, in the model's own order.
/// Scores are not required to sum to 1. Once `cancel` fires, implementors
/// should stop waiting and return [`ModelError::Cancelled`].
pub trait SentimentModel {
    async fn predict(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ClassScore>, ModelError>;
}

/// Client for a text-classification inference endpoint.
///
/// Sends `{"inputs": text, "parameters": {"top_k": null}}` so the endpoint
/// returns every class rather than only the best one.
#[derive(Debug, Clone)]
pub struct HttpSentimentModel {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<ClassScore>>),
    Flat(Vec<ClassScore>),
    Error { error: String },
}

impl HttpSentimentModel {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_token: config.api_token(),
        })
    }
}

impl SentimentModel for HttpSentimentModel {
    #[instrument(level = "debug", skip_all)]
    async fn predict(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ClassScore>, ModelError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ModelError::Cancelled),
            result = self.request(text) => result,
        }
    }
}

impl HttpSentimentModel {
    async fn request(&self, text: &str) -> Result<Vec<ClassScore>, ModelError> {
        let t0 = Instant::now();
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "inputs": text, "parameters": { "top_k": null } }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(
            status = status.as_u16(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Model endpoint responded"
        );
        if !status.is_success() {
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }
        parse_inference_response(&body)
    }
}

fn parse_inference_response(body: &str) -> Result<Vec<ClassScore>, ModelError> {
    let parsed: InferenceResponse = serde_json::from_str(body).map_err(|e| {
        ModelError::Other(format!(
            "unrecognized model response ({e}): {}",
            truncate_for_log(body, 200)
        ))
    })?;
    match parsed {
        InferenceResponse::Nested(mut batches) => Ok(if batches.is_empty() {
            Vec::new()
        } else {
            batches.swap_remove(0)
        }),
        InferenceResponse::Flat(scores) => Ok(scores),
        InferenceResponse::Error { error } => Err(ModelError::Remote(error)),
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`SentimentModel`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryModel<M> {
    inner: M,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<M: SentimentModel> RetryModel<M> {
    /// Create a new retry wrapper around an existing [`SentimentModel`].
    ///
    /// # Arguments
    ///
    /// * `inner` - The model to wrap
    /// * `max_retries` - Retries after the first failed call (2 by default)
    /// * `base_delay` - Delay before the first retry, doubled each time
    ///
    /// # Example
    ///
    /// ```ignore
    /// let model = HttpSentimentModel::new(&config.classifier)?;
    /// let model = RetryModel::new(model, 2, Duration::from_secs(1));
    /// ```
    pub fn new(inner: M, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl<M> fmt::Debug for RetryModel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryModel")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<M: SentimentModel> SentimentModel for RetryModel<M> {
    #[instrument(level = "debug", skip_all)]
    async fn predict(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ClassScore>, ModelError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
            match self.inner.predict(text, cancel).await {
                Ok(scores) => return Ok(scores),
                Err(ModelError::Cancelled) => return Err(ModelError::Cancelled),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis(),
                            error = %e,
                            "predict() exhausted retries"
                        );
                        return Err(e);
                    }

                    let factor = 1u32.checked_shl((attempt - 1) as u32).unwrap_or(u32::MAX);
                    let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "predict() attempt failed; backing off"
                    );
                    if !pause(delay, cancel).await {
                        debug!(attempt, "predict() cancelled during backoff");
                        return Err(ModelError::Cancelled);
                    }
                }
            }
        }
    }
}

/// Adapter turning raw model output into a [`SentimentResult`].
#[derive(Debug)]
pub struct SentimentClassifier<M> {
    model: M,
    truncation: TruncationConfig,
}

impl<M: SentimentModel> SentimentClassifier<M> {
    pub fn new(model: M, truncation: TruncationConfig) -> Self {
        Self { model, truncation }
    }

    #[cfg(test)]
    pub(crate) fn model(&self) -> &M {
        &self.model
    }

    /// Classify `text`, truncated per the configured policy.
    pub async fn classify(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<SentimentResult, ClassificationError> {
        let input = self.truncation.apply(text);
        let scores = self.model.predict(input, cancel).await?;
        normalize(&scores)
    }
}

/// Build a [`SentimentResult`] from per-class scores.
///
/// The overall label is the highest-scoring entry; ties go to the entry the
/// model listed first. All three classes must be present.
pub fn normalize(scores: &[ClassScore]) -> Result<SentimentResult, ClassificationError> {
    let mut best: Option<&ClassScore> = None;
    for entry in scores {
        if !(entry.score.is_finite() && (0.0..=1.0).contains(&entry.score)) {
            return Err(ClassificationError::InvalidScore {
                label: entry.label.clone(),
                score: entry.score,
            });
        }
        if best.is_none_or(|b| entry.score > b.score) {
            best = Some(entry);
        }
    }
    let best = best.ok_or(ClassificationError::EmptyResponse)?;

    let prob = |class: &'static str| {
        scores
            .iter()
            .find(|e| e.label.to_lowercase() == class)
            .map(|e| e.score)
            .ok_or(ClassificationError::MissingClass(class))
    };
    let probs = ClassProbabilities {
        positive: prob("positive")?,
        neutral: prob("neutral")?,
        negative: prob("negative")?,
    };

    Ok(SentimentResult {
        label: best.label.clone(),
        score: best.score,
        numeric_label: numeric_label(&best.label),
        probs,
    })
}
