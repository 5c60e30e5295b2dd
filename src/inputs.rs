//! Loading the URL list produced by upstream discovery.
//!
//! Two formats are accepted:
//! - `.csv` files with a header row containing a `url` column
//! - anything else as plain text, one URL per line (`#` starts a comment)
//!
//! Blank cells and lines are dropped and duplicates removed, keeping the
//! first occurrence so input order is preserved.

use std::path::Path;

use itertools::Itertools;
use tracing::{info, instrument};

use crate::error::InputError;

/// Read URLs from `path`.
#[instrument(level = "info")]
pub async fn load_urls(path: &str) -> Result<Vec<String>, InputError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let is_csv = Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    let urls = if is_csv {
        urls_from_csv(&raw)?
    } else {
        urls_from_lines(&raw)
    };
    info!(count = urls.len(), "Loaded URLs");
    Ok(urls)
}

pub fn urls_from_csv(raw: &str) -> Result<Vec<String>, InputError> {
    let mut reader = csv::Reader::from_reader(raw.as_bytes());
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == "url")
        .ok_or(InputError::MissingColumn("url"))?;

    let mut urls = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(url) = row.get(column) {
            urls.push(url.trim().to_string());
        }
    }
    Ok(clean(urls))
}

pub fn urls_from_lines(raw: &str) -> Vec<String> {
    clean(
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#'))
            .map(str::to_string)
            .collect(),
    )
}

fn clean(urls: Vec<String>) -> Vec<String> {
    urls.into_iter()
        .filter(|u| !u.is_empty())
        .unique()
        .collect()
}
