//! Re-score an existing dataset table.
//!
//! Reads a CSV with a `case_text` column, classifies every non-blank case
//! and writes a copy with the classification columns replaced (or appended
//! when the input lacks them). Rows that are blank or fail classification
//! keep their other columns and get empty classification cells. After
//! cancellation the remaining rows are copied through the same way.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::classifier::{SentimentClassifier, SentimentModel};
use crate::error::{InputError, OutputError, RelabelError};
use crate::models::SentimentResult;
use crate::utils::truncate_for_log;

const CLASSIFICATION_COLUMNS: [&str; 6] = [
    "label",
    "score",
    "numeric_label",
    "positive_prob",
    "neutral_prob",
    "negative_prob",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelabelStats {
    pub rows: usize,
    pub relabeled: usize,
    pub blank: usize,
    pub failed: usize,
    pub cancelled: bool,
}

fn cells(result: Option<&SentimentResult>) -> [String; 6] {
    match result {
        Some(r) => [
            r.label.clone(),
            r.score.to_string(),
            r.numeric_label.to_string(),
            r.probs.positive.to_string(),
            r.probs.neutral.to_string(),
            r.probs.negative.to_string(),
        ],
        None => Default::default(),
    }
}

/// Relabel the CSV text in `raw`, returning the rewritten CSV text.
pub async fn relabel_csv<M: SentimentModel>(
    classifier: &SentimentClassifier<M>,
    raw: &str,
    cancel: &CancellationToken,
) -> Result<(String, RelabelStats), RelabelError> {
    let mut reader = csv::Reader::from_reader(raw.as_bytes());
    let mut headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let text_column = headers
        .iter()
        .position(|h| h == "case_text")
        .ok_or(InputError::MissingColumn("case_text"))?;

    let mut targets = Vec::with_capacity(CLASSIFICATION_COLUMNS.len());
    for name in CLASSIFICATION_COLUMNS {
        let existing = headers.iter().position(|h| h == name);
        let idx = existing.unwrap_or_else(|| {
            headers.push(name.to_string());
            headers.len() - 1
        });
        targets.push(idx);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers)?;
    let mut stats = RelabelStats::default();

    for (idx, row) in reader.records().enumerate() {
        let row = row?;
        stats.rows += 1;
        let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
        fields.resize(headers.len(), String::new());

        let text = fields[text_column].trim().to_string();
        let result = if text.is_empty() {
            stats.blank += 1;
            None
        } else if stats.cancelled || cancel.is_cancelled() {
            if !stats.cancelled {
                warn!(row = idx, "Relabel cancelled; remaining rows keep empty cells");
                stats.cancelled = true;
            }
            stats.failed += 1;
            None
        } else {
            match classifier.classify(&text, cancel).await {
                Ok(result) => {
                    stats.relabeled += 1;
                    Some(result)
                }
                Err(e) => {
                    warn!(row = idx, error = %e, case = %truncate_for_log(&text, 120), "Failed to relabel row");
                    stats.failed += 1;
                    None
                }
            }
        };

        for (target, value) in targets.iter().zip(cells(result.as_ref())) {
            fields[*target] = value;
        }
        writer.write_record(&fields)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| OutputError::Buffer(e.to_string()))?;
    let out = String::from_utf8(bytes).map_err(|e| OutputError::Buffer(e.to_string()))?;
    Ok((out, stats))
}

/// Relabel the dataset at `input` and write the result to `output`.
#[instrument(level = "info", skip_all, fields(%input, %output))]
pub async fn relabel_file<M: SentimentModel>(
    classifier: &SentimentClassifier<M>,
    input: &str,
    output: &str,
    cancel: &CancellationToken,
) -> Result<RelabelStats, RelabelError> {
    let raw = tokio::fs::read_to_string(input)
        .await
        .map_err(InputError::from)?;
    let (csv, stats) = relabel_csv(classifier, &raw, cancel).await?;
    tokio::fs::write(output, csv)
        .await
        .map_err(OutputError::from)?;
    info!(
        rows = stats.rows,
        relabeled = stats.relabeled,
        blank = stats.blank,
        failed = stats.failed,
        cancelled = stats.cancelled,
        "Relabeled dataset"
    );
    Ok(stats)
}
