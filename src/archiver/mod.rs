//! The archival pipeline: per-thread jobs over a bounded worker pool.
//!
//! Each job owns a disjoint destination (its thread's text log, its file's
//! path), so jobs run concurrently without coordination. Failures never
//! unwind past the owning job; the supervisor only sees per-job outcome
//! counts. One bad thread never aborts the batch.

pub mod image;
pub mod text_log;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chan::{CatalogThread, ChanClient, FetchError};
use crate::config::Config;
use crate::journal::ErrorJournal;
use crate::paths;
use crate::selection::{RemovedThread, SelectionStore};

use image::{FetchOutcome, RetryPolicy};

/// Terminal status of one thread job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Text log current and every pending attachment succeeded.
    Complete,
    /// At least one attachment or the text log failed; resolved by re-running
    /// later, since failed files never reach byte-size parity.
    PartialFailure,
    /// The thread 404'd upstream and was dropped from the selection.
    Vanished,
    /// Detail fetch failed (decode or transport); journaled and skipped.
    Skipped,
}

/// Per-thread accumulator returned from each job and summed by the
/// supervisor. No global mutable counters.
#[derive(Debug, Clone)]
pub struct ThreadOutcome {
    pub thread_no: u64,
    pub status: ThreadStatus,
    pub downloaded: usize,
    pub skipped_existing: usize,
    pub failed: usize,
}

impl ThreadOutcome {
    fn new(thread_no: u64, status: ThreadStatus) -> Self {
        Self {
            thread_no,
            status,
            downloaded: 0,
            skipped_existing: 0,
            failed: 0,
        }
    }
}

/// Aggregate counts for one board run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub threads_complete: usize,
    pub threads_partial: usize,
    pub threads_vanished: usize,
    pub threads_skipped: usize,
    pub downloaded: usize,
    pub skipped_existing: usize,
    pub failed: usize,
}

impl RunSummary {
    fn absorb(&mut self, outcome: &ThreadOutcome) {
        match outcome.status {
            ThreadStatus::Complete => self.threads_complete += 1,
            ThreadStatus::PartialFailure => self.threads_partial += 1,
            ThreadStatus::Vanished => self.threads_vanished += 1,
            ThreadStatus::Skipped => self.threads_skipped += 1,
        }
        self.downloaded += outcome.downloaded;
        self.skipped_existing += outcome.skipped_existing;
        self.failed += outcome.failed;
    }
}

/// Result of refreshing one board's selection against its live catalog.
#[derive(Debug)]
pub struct CatalogDiff {
    /// All live threads, for the (external) selection front end.
    pub candidates: Vec<CatalogThread>,
    /// Previously selected threads that vanished upstream.
    pub removed: Vec<RemovedThread>,
}

/// Drives catalog refresh, text-log materialization and attachment downloads
/// for the selected threads of a board.
#[derive(Clone)]
pub struct Archiver {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    client: ChanClient,
    selection: Arc<SelectionStore>,
    journal: Arc<ErrorJournal>,
    thread_permits: Arc<Semaphore>,
    download_permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Archiver {
    pub fn new(
        config: Config,
        client: ChanClient,
        selection: Arc<SelectionStore>,
        journal: Arc<ErrorJournal>,
        cancel: CancellationToken,
    ) -> Self {
        let thread_permits = Arc::new(Semaphore::new(config.thread_concurrency));
        let download_permits = Arc::new(Semaphore::new(config.download_concurrency));
        Self {
            inner: Arc::new(Inner {
                config,
                client,
                selection,
                journal,
                thread_permits,
                download_permits,
                cancel,
            }),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.inner.config.max_retries,
            timeout_base: self.inner.config.attempt_timeout_base,
            timeout_step: self.inner.config.attempt_timeout_step,
        }
    }

    /// Fetch the board's live catalog and reconcile the persisted selection
    /// against it, dropping vanished threads and refreshing kept metadata.
    ///
    /// # Errors
    ///
    /// A malformed catalog (`Parse`) aborts only this board's selection/diff
    /// step; the caller proceeds with the existing selection.
    pub async fn refresh_selection(&self, board: &str) -> Result<CatalogDiff, FetchError> {
        let candidates = self.inner.client.fetch_catalog(board).await?;
        let removed = self.inner.selection.reconcile(board, &candidates).await;
        for gone in &removed {
            warn!(
                board,
                thread = gone.no,
                slug = gone.semantic_url.as_deref().unwrap_or(""),
                "404: selected thread no longer in catalog; dropped from selection"
            );
        }
        Ok(CatalogDiff { candidates, removed })
    }

    /// Archive every selected thread of a board and return aggregate counts.
    ///
    /// The supervisor blocks until all jobs drain; that join is the only
    /// synchronization barrier. Cancellation stops new enqueues and lets
    /// in-flight jobs finish.
    pub async fn archive_board(&self, board: &str) -> RunSummary {
        let selected = self.inner.selection.selection_for(board).await;
        info!(board, threads = selected.len(), "Archiving selected threads");

        let mut jobs = JoinSet::new();
        for thread in selected {
            if self.inner.cancel.is_cancelled() {
                info!(board, "Cancelled; not enqueueing further threads");
                break;
            }
            // Wait for a worker slot, but give up the wait on cancellation so
            // in-flight jobs drain without new ones starting. A closed pool
            // semaphore (unreachable; it is never closed) degrades the same
            // way - remaining threads stay selected for the next run.
            let permit = tokio::select! {
                () = self.inner.cancel.cancelled() => {
                    info!(board, "Cancelled while waiting for a worker slot");
                    break;
                }
                permit = self.inner.thread_permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        error!(board, "Worker pool unavailable; not enqueueing further threads");
                        break;
                    }
                },
            };
            let this = self.clone();
            let board = board.to_string();
            jobs.spawn(async move {
                let _permit = permit;
                this.archive_thread(&board, thread).await
            });
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(outcome) => {
                    debug!(
                        board,
                        thread = outcome.thread_no,
                        status = ?outcome.status,
                        downloaded = outcome.downloaded,
                        skipped = outcome.skipped_existing,
                        failed = outcome.failed,
                        "Thread job finished"
                    );
                    summary.absorb(&outcome);
                }
                Err(e) => {
                    error!(board, "Thread job panicked: {e}");
                    summary.threads_skipped += 1;
                }
            }
        }
        summary
    }

    /// One thread job: detail fetch, text-log decision, attachment
    /// classification and dispatch.
    async fn archive_thread(&self, board: &str, thread: CatalogThread) -> ThreadOutcome {
        let no = thread.no;
        let posts = match self.inner.client.fetch_thread(board, no).await {
            Ok(posts) => posts,
            Err(FetchError::NotFound) => {
                self.inner.selection.remove_thread(board, no).await;
                warn!(
                    board,
                    thread = no,
                    slug = thread.semantic_url.as_deref().unwrap_or(""),
                    "404: thread vanished upstream; dropped from selection"
                );
                return ThreadOutcome::new(no, ThreadStatus::Vanished);
            }
            Err(e) => {
                let snapshot = serde_json::to_value(&thread).unwrap_or(serde_json::Value::Null);
                self.inner
                    .journal
                    .record(&format!("thread/{board}/{no}"), snapshot, &e.to_string())
                    .await;
                warn!(board, thread = no, "Skipping thread, detail fetch failed: {e}");
                return ThreadOutcome::new(no, ThreadStatus::Skipped);
            }
        };

        let slug = paths::thread_slug(
            posts[0]
                .semantic_url
                .as_deref()
                .or(thread.semantic_url.as_deref()),
        );
        let mut outcome = ThreadOutcome::new(no, ThreadStatus::Complete);
        let data_dir = &self.inner.config.data_dir;

        // Text log, only when stale.
        let artifact = paths::text_log_path(data_dir, board, &slug, no);
        if text_log::is_stale(&artifact, text_log::newest_post_time(&posts)) {
            if let Err(e) = text_log::write_text_log(data_dir, board, &slug, no, &posts).await {
                let snapshot = serde_json::to_value(&thread).unwrap_or(serde_json::Value::Null);
                self.inner
                    .journal
                    .record(&artifact.display().to_string(), snapshot, &format!("{e:#}"))
                    .await;
                outcome.failed += 1;
            }
        } else {
            debug!(board, thread = no, "Text log up to date");
        }

        // Pull any files under the old naming scheme forward before deciding
        // what is already complete.
        let media_dir = paths::media_dir(data_dir, board, &slug);
        if let Err(e) = paths::migrate_legacy_media(&media_dir, &posts).await {
            warn!(board, thread = no, "Legacy media migration failed: {e}");
        }

        // Classify attachments: byte-size parity at the deterministic path
        // means complete, anything else is pending.
        let mut pending = Vec::new();
        for post in &posts {
            let Some(attachment) = post.attachment() else {
                continue;
            };
            let dest = media_dir.join(paths::media_file_name(&attachment));
            if is_complete(&dest, attachment.expected_byte_size) {
                outcome.skipped_existing += 1;
            } else {
                pending.push((attachment, dest));
            }
        }

        if pending.is_empty() {
            debug!(
                board,
                thread = no,
                existing = outcome.skipped_existing,
                "No attachment work"
            );
            if outcome.failed > 0 {
                outcome.status = ThreadStatus::PartialFailure;
            }
            return outcome;
        }

        // Dispatch pending downloads, individually isolated.
        let policy = self.retry_policy();
        let mut curtailed = false;
        let mut downloads = JoinSet::new();
        for (attachment, dest) in pending {
            if self.inner.cancel.is_cancelled() {
                curtailed = true;
                break;
            }
            let permit = tokio::select! {
                () = self.inner.cancel.cancelled() => {
                    curtailed = true;
                    break;
                }
                permit = self.inner.download_permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        error!(board, thread = no, "Download pool unavailable; leaving rest pending");
                        curtailed = true;
                        break;
                    }
                },
            };
            let url = self.inner.client.attachment_url(board, &attachment);
            let this = self.clone();
            downloads.spawn(async move {
                let _permit = permit;
                image::fetch_attachment(
                    this.inner.client.http(),
                    &url,
                    &dest,
                    attachment.expected_byte_size,
                    policy,
                    &this.inner.journal,
                )
                .await
            });
        }

        while let Some(joined) = downloads.join_next().await {
            match joined {
                Ok(FetchOutcome::Completed) => outcome.downloaded += 1,
                Ok(FetchOutcome::Failed(_)) => outcome.failed += 1,
                Err(e) => {
                    error!(board, thread = no, "Download job panicked: {e}");
                    outcome.failed += 1;
                }
            }
        }

        outcome.status = if outcome.failed == 0 && !curtailed {
            ThreadStatus::Complete
        } else {
            ThreadStatus::PartialFailure
        };
        outcome
    }
}

/// The weak completeness check: a file is complete iff it exists at its
/// deterministic path with exactly the upstream-reported size. No checksum.
fn is_complete(dest: &Path, expected_size: u64) -> bool {
    std::fs::metadata(dest).is_ok_and(|m| m.is_file() && m.len() == expected_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_complete_requires_exact_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("123.webm");
        std::fs::write(&path, b"12345").unwrap();

        assert!(is_complete(&path, 5));
        assert!(!is_complete(&path, 4));
        assert!(!is_complete(&path, 6));
        assert!(!is_complete(&dir.path().join("missing.webm"), 5));
    }

    #[test]
    fn test_summary_absorbs_outcomes() {
        let mut summary = RunSummary::default();
        let mut ok = ThreadOutcome::new(1, ThreadStatus::Complete);
        ok.downloaded = 2;
        ok.skipped_existing = 3;
        let mut bad = ThreadOutcome::new(2, ThreadStatus::PartialFailure);
        bad.failed = 1;

        summary.absorb(&ok);
        summary.absorb(&bad);
        summary.absorb(&ThreadOutcome::new(3, ThreadStatus::Vanished));

        assert_eq!(summary.threads_complete, 1);
        assert_eq!(summary.threads_partial, 1);
        assert_eq!(summary.threads_vanished, 1);
        assert_eq!(summary.downloaded, 2);
        assert_eq!(summary.skipped_existing, 3);
        assert_eq!(summary.failed, 1);
    }
}
