//! Small helpers for logging and output validation.

use std::error::Error;
use std::path::Path;

use tokio::fs;
use tracing::{info, instrument, warn};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to the nearest
/// character boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Ensure the directory that will hold `file_path` exists and is writable.
///
/// Creates the directory if needed, then writes and removes a write-check file.
/// Called before a run starts so a bad output path fails fast instead of
/// after every article has been fetched.
#[instrument(level = "info", skip_all, fields(path = %file_path))]
pub async fn ensure_writable_parent(file_path: &str) -> Result<(), Box<dyn Error>> {
    let dir = match Path::new(file_path).parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    fs::create_dir_all(&dir).await?;
    // A hidden empty file next to the output; removed again straight away.
    let check_path = dir.join(".news_sentiment_dataset.write-check");
    fs::write(&check_path, b"").await?;
    if let Err(e) = fs::remove_file(&check_path).await {
        warn!(path = %check_path.display(), error = %e, "Could not remove write-check file");
    }
    info!(dir = %dir.display(), "Output directory is writable");
    Ok(())
}
