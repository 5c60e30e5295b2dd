//! Error types for every stage of the dataset pipeline.
//!
//! Expected per-URL and per-segment failures travel as values
//! ([`FetchError`] inside a failed fetch, [`ClassificationError`] for a
//! skipped segment). Only [`PipelineError`] stops a run.

use std::io;

use thiserror::Error;

/// A single failed HTTP attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transport(e.to_string())
    }
}

/// Failure reported by the external sentiment model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model reported an error: {0}")]
    Remote(String),
    #[error("model call cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Failure of the classifier adapter for one piece of text.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("classifier returned no class scores")]
    EmptyResponse,
    #[error("classifier response is missing the '{0}' class")]
    MissingClass(&'static str),
    #[error("classifier returned invalid score {score} for '{label}'")]
    InvalidScore { label: String, score: f64 },
}

/// Fatal preconditions of a run. Raised before any network activity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no URLs were supplied")]
    NoUrls,
    #[error("URL entry {index} is blank")]
    BlankUrl { index: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("input table has no '{0}' column")]
    MissingColumn(&'static str),
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to finish CSV buffer: {0}")]
    Buffer(String),
}

/// Failure of a relabel pass over an existing dataset table.
#[derive(Debug, Error)]
pub enum RelabelError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

impl From<csv::Error> for RelabelError {
    fn from(e: csv::Error) -> Self {
        RelabelError::Input(InputError::Csv(e))
    }
}
