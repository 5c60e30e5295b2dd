//! CSV output of the dataset table.
//!
//! Columns, in order:
//! `url, date, case_text, label, score, positive_prob, neutral_prob, negative_prob, numeric_label`.
//! An absent date is written as an empty cell.

use tokio::fs;
use tracing::{info, instrument};

use crate::error::OutputError;
use crate::models::DatasetRecord;

const HEADER: [&str; 9] = [
    "url",
    "date",
    "case_text",
    "label",
    "score",
    "positive_prob",
    "neutral_prob",
    "negative_prob",
    "numeric_label",
];

/// Render records as CSV text with a header row, even when empty.
pub fn to_csv(records: &[DatasetRecord]) -> Result<String, OutputError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| OutputError::Buffer(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| OutputError::Buffer(e.to_string()))
}

/// Write the dataset table to `path`.
#[instrument(level = "info", skip_all, fields(%path))]
pub async fn write_dataset(records: &[DatasetRecord], path: &str) -> Result<(), OutputError> {
    let csv = to_csv(records)?;
    fs::write(path, csv).await?;
    info!(records = records.len(), "Wrote CSV dataset");
    Ok(())
}
