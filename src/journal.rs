//! Append-only journal of terminal per-item failures.
//!
//! One JSON object per line. The journal exists for operator triage only; it
//! is not a retry queue and never deduplicates, so repeated failures across
//! runs accumulate. Recording is best-effort: a journal that cannot be
//! written must not take the pipeline down with it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// One journaled failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Identity of the failed item, e.g. `thread/wsg/101` or a file path.
    pub item_key: String,
    /// Snapshot of the item's upstream payload at failure time.
    pub payload: serde_json::Value,
    /// Human-readable failure description.
    pub error: String,
    pub recorded_at: DateTime<Utc>,
}

/// Single-writer handle to the journal file.
#[derive(Debug)]
pub struct ErrorJournal {
    path: PathBuf,
    // Serializes appends so concurrent jobs never interleave lines.
    writer: Mutex<()>,
}

impl ErrorJournal {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: Mutex::new(()),
        }
    }

    /// Append one record. Never fails: journal I/O errors are logged and
    /// swallowed so the owning job can carry on.
    pub async fn record(&self, item_key: &str, payload: serde_json::Value, error: &str) {
        let record = JournalRecord {
            item_key: item_key.to_string(),
            payload,
            error: error.to_string(),
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.append(&record).await {
            warn!(item_key, "Failed to write journal entry: {e:#}");
        }
    }

    async fn append(&self, record: &JournalRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.writer.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Read all journal records back (operator tooling and tests).
///
/// # Errors
///
/// Returns an error if the file exists but a line fails to decode.
pub async fn read_all(path: &Path) -> anyhow::Result<Vec<JournalRecord>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_appends_without_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = ErrorJournal::new(&path);

        journal
            .record("thread/wsg/101", serde_json::json!({"no": 101}), "decode failed")
            .await;
        journal
            .record("thread/wsg/101", serde_json::json!({"no": 101}), "decode failed")
            .await;

        let records = read_all(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].item_key, "thread/wsg/101");
        assert_eq!(records[0].payload["no"], 101);
    }

    #[tokio::test]
    async fn test_record_swallows_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        // The journal's parent "directory" is a regular file, so every append
        // fails. record() must return normally anyway.
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"in the way").await.unwrap();
        let journal = ErrorJournal::new(&blocker.join("journal.jsonl"));

        journal
            .record("thread/wsg/101", serde_json::json!({"no": 101}), "decode failed")
            .await;
    }

    #[tokio::test]
    async fn test_read_all_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let records = read_all(&dir.path().join("nope.jsonl")).await.unwrap();
        assert!(records.is_empty());
    }
}
