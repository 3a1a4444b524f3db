//! Single-attachment download with bounded retries and escalating timeouts.
//!
//! Failures are values, not errors: the fetch returns `Completed` or
//! `Failed` and never propagates, so one bad file cannot unwind its siblings.
//! The body is staged in a `.part` sibling and renamed into place only once
//! fully written - a half-written final file is never observable, and the
//! byte-size completeness check stays trustworthy.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::journal::ErrorJournal;

/// Retry behavior for one attachment transfer.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Timeout for the first attempt.
    pub timeout_base: Duration,
    /// Added per attempt, so slow links get more time instead of failing
    /// identically on every retry.
    pub timeout_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            timeout_base: Duration::from_secs(5),
            timeout_step: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    fn attempt_timeout(&self, attempt: u32) -> Duration {
        self.timeout_base + self.timeout_step * attempt
    }
}

/// Terminal result of one attachment transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Completed,
    Failed(String),
}

impl FetchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Download `url` to `dest`, expecting `expected_size` bytes.
///
/// Transient failures (timeout, connection loss, 5xx, 429, a body shorter or
/// longer than reported) retry up to `policy.max_retries` attempts with
/// escalating per-attempt timeouts; other 4xx fail immediately. A terminal
/// failure writes one journal entry keyed by the destination path. A transfer
/// whose byte count never matches `expected_size` is `Failed`: the file stays
/// on disk but below size parity, so it remains pending for the next run.
pub async fn fetch_attachment(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    expected_size: u64,
    policy: RetryPolicy,
    journal: &ErrorJournal,
) -> FetchOutcome {
    if let Some(parent) = dest.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            let reason = format!("failed to create destination directory: {e}");
            journal_failure(journal, url, dest, expected_size, &reason).await;
            return FetchOutcome::Failed(reason);
        }
    }

    let mut last_error = String::new();
    for attempt in 0..policy.max_retries {
        match attempt_transfer(client, url, dest, policy.attempt_timeout(attempt)).await {
            Ok(written) if written == expected_size => {
                debug!(url, dest = %dest.display(), attempt, "Attachment downloaded");
                return FetchOutcome::Completed;
            }
            Ok(written) => {
                // Truncated (or padded) body; the file stays in place but off
                // size parity, so it is still classified pending. Retry in
                // case the origin served a short body transiently.
                last_error = format!(
                    "size mismatch: wrote {written} bytes, upstream reported {expected_size}"
                );
                warn!(
                    url,
                    dest = %dest.display(),
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    "Attachment transfer failed: {last_error}"
                );
            }
            Err(e) => {
                last_error = e.reason;
                warn!(
                    url,
                    dest = %dest.display(),
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    "Attachment transfer failed: {last_error}"
                );
                if !e.transient {
                    journal_failure(journal, url, dest, expected_size, &last_error).await;
                    return FetchOutcome::Failed(last_error);
                }
            }
        }
    }

    let reason = format!("retries exhausted after {} attempts: {last_error}", policy.max_retries);
    journal_failure(journal, url, dest, expected_size, &reason).await;
    FetchOutcome::Failed(reason)
}

struct TransferError {
    reason: String,
    transient: bool,
}

impl TransferError {
    fn transient(reason: String) -> Self {
        Self {
            reason,
            transient: true,
        }
    }

    fn terminal(reason: String) -> Self {
        Self {
            reason,
            transient: false,
        }
    }
}

/// One attempt: GET, read the full body under `timeout`, stage to `.part`,
/// rename into place. Returns the byte count written.
async fn attempt_transfer(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<u64, TransferError> {
    let transfer = async {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| TransferError::transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TransferError::transient(format!("upstream status {status}")));
        }
        if !status.is_success() {
            return Err(TransferError::terminal(format!("upstream status {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransferError::transient(format!("body read failed: {e}")))?;
        Ok(body)
    };

    let body = match tokio::time::timeout(timeout, transfer).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(TransferError::transient(format!(
                "attempt timed out after {}s",
                timeout.as_secs_f64()
            )))
        }
    };

    let part = part_path(dest);
    tokio::fs::write(&part, &body)
        .await
        .map_err(|e| TransferError::terminal(format!("failed to write staging file: {e}")))?;
    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| TransferError::terminal(format!("failed to move file into place: {e}")))?;

    Ok(body.len() as u64)
}

fn part_path(dest: &Path) -> std::path::PathBuf {
    let mut name = dest.file_name().map_or_else(
        || std::ffi::OsString::from("download"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".part");
    dest.with_file_name(name)
}

async fn journal_failure(
    journal: &ErrorJournal,
    url: &str,
    dest: &Path,
    expected_size: u64,
    reason: &str,
) {
    journal
        .record(
            &dest.display().to_string(),
            serde_json::json!({
                "source_url": url,
                "expected_byte_size": expected_size,
            }),
            reason,
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_escalates_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempt_timeout(0), Duration::from_secs(5));
        assert_eq!(policy.attempt_timeout(1), Duration::from_secs(8));
        assert_eq!(policy.attempt_timeout(4), Duration::from_secs(17));
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/data/media/wsg/comfy/123.webm")),
            Path::new("/data/media/wsg/comfy/123.webm.part")
        );
    }
}
