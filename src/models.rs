//! Data models flowing through the dataset pipeline.
//!
//! Each value is produced by one stage and handed to the next:
//! - [`FetchResult`]: outcome of fetching one URL
//! - [`SentenceGroup`]: a "case" of one to three consecutive sentences
//! - [`SentimentResult`]: normalized classifier output for one case
//! - [`DatasetRecord`]: one row of the output dataset

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Outcome of fetching a single URL.
///
/// A failed fetch is a value, never an error: `html` is `None` and
/// `attempts` counts how many requests were issued before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Raw HTML body of the successful response.
    pub html: Option<String>,
    pub succeeded: bool,
    /// Number of HTTP attempts made.
    pub attempts: u32,
}

impl FetchResult {
    pub fn success(html: String, attempts: u32) -> Self {
        Self {
            html: Some(html),
            succeeded: true,
            attempts,
        }
    }

    pub fn failure(attempts: u32) -> Self {
        Self {
            html: None,
            succeeded: false,
            attempts,
        }
    }
}

/// One to three consecutive sentences treated as a single classification unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceGroup {
    /// Joined, trimmed sentence text. Never empty.
    pub text: String,
    /// Indices of the source sentences consumed by this group.
    pub sentences: Range<usize>,
}

/// Per-class probabilities in a fixed three-class schema.
///
/// Values come straight from the classifier and are not required to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

/// Normalized classifier output for one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    /// Label of the highest-scoring class, as the classifier spelled it.
    pub label: String,
    pub score: f64,
    pub numeric_label: i8,
    pub probs: ClassProbabilities,
}

/// Map a sentiment label to its numeric polarity.
///
/// `1` for "positive", `-1` for "negative", `0` for anything else.
/// Matching ignores case.
pub fn numeric_label(label: &str) -> i8 {
    if label.eq_ignore_ascii_case("positive") {
        1
    } else if label.eq_ignore_ascii_case("negative") {
        -1
    } else {
        0
    }
}

/// One row of the output dataset.
///
/// Field order matches the persisted column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub url: String,
    pub date: Option<String>,
    pub case_text: String,
    pub label: String,
    pub score: f64,
    pub positive_prob: f64,
    pub neutral_prob: f64,
    pub negative_prob: f64,
    pub numeric_label: i8,
}

impl DatasetRecord {
    /// Assemble a record for a classified case. `numeric_label` is taken from
    /// `result`, which derives it from `label`.
    pub fn new(url: &str, date: Option<&str>, case_text: String, result: SentimentResult) -> Self {
        Self {
            url: url.to_string(),
            date: date.map(str::to_string),
            case_text,
            label: result.label,
            score: result.score,
            positive_prob: result.probs.positive,
            neutral_prob: result.probs.neutral,
            negative_prob: result.probs.negative,
            numeric_label: result.numeric_label,
        }
    }
}
