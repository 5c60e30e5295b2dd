//! JSON output of a finished run.
//!
//! ```json
//! {
//!   "generated_at": "2025-05-06T12:00:00+00:00",
//!   "record_count": 2,
//!   "stats": { "urls_total": 3, ... },
//!   "records": [ { "url": "...", "case_text": "...", ... } ]
//! }
//! ```

use chrono::Utc;
use serde::Serialize;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::OutputError;
use crate::models::DatasetRecord;
use crate::pipeline::RunStats;

#[derive(Debug, Serialize)]
struct DatasetDocument<'a> {
    generated_at: String,
    record_count: usize,
    stats: &'a RunStats,
    records: &'a [DatasetRecord],
}

/// Render records and run statistics as a pretty-printed JSON document,
/// stamped with the current UTC time.
pub fn to_json(records: &[DatasetRecord], stats: &RunStats) -> Result<String, OutputError> {
    let document = DatasetDocument {
        generated_at: Utc::now().to_rfc3339(),
        record_count: records.len(),
        stats,
        records,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Write the dataset and run statistics as a JSON document at `path`.
#[instrument(level = "info", skip_all, fields(%path))]
pub async fn write_dataset(
    records: &[DatasetRecord],
    stats: &RunStats,
    path: &str,
) -> Result<(), OutputError> {
    let json = to_json(records, stats)?;
    fs::write(path, json).await?;
    info!(records = records.len(), "Wrote JSON dataset");
    Ok(())
}
