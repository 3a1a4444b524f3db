//! Persisted operator selection: which threads of which boards to archive.
//!
//! The whole mapping lives in one JSON file and is always rewritten in full
//! (temp file + rename) so a crash mid-save can never leave a half-written
//! state behind. All mutation goes through one store value guarded by an
//! async mutex; concurrent jobs never interleave partial writes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chan::CatalogThread;

/// Board acronym -> selected threads, with enough catalog metadata to render
/// candidates to the operator without a fresh fetch.
pub type SelectionMap = BTreeMap<String, Vec<CatalogThread>>;

/// Errors reading or writing the selection file.
///
/// These are the only fatal errors in the pipeline: if the persisted
/// selection cannot be read or written, the run cannot proceed safely.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access selection file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("selection file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A selection entry dropped because its thread vanished upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedThread {
    pub no: u64,
    pub semantic_url: Option<String>,
}

/// Durable store for the per-board thread selection.
#[derive(Debug)]
pub struct SelectionStore {
    path: PathBuf,
    state: Mutex<SelectionMap>,
}

impl SelectionStore {
    /// Load the persisted selection, or start empty if nothing was saved yet.
    ///
    /// A missing file is the normal first-run case, never an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let state = match tokio::fs::read(path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SelectionMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    /// Boards that currently have at least one selected thread.
    pub async fn boards(&self) -> Vec<String> {
        self.state.lock().await.keys().cloned().collect()
    }

    /// The selected threads for one board (empty if none).
    pub async fn selection_for(&self, board: &str) -> Vec<CatalogThread> {
        self.state
            .lock()
            .await
            .get(board)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace one board's selection, leaving other boards untouched.
    pub async fn replace(&self, board: &str, threads: Vec<CatalogThread>) {
        self.state.lock().await.insert(board.to_string(), threads);
    }

    /// Drop a single thread from a board's selection (used when a detail
    /// fetch 404s mid-run). Returns whether the thread was present.
    pub async fn remove_thread(&self, board: &str, no: u64) -> bool {
        let mut state = self.state.lock().await;
        let Some(threads) = state.get_mut(board) else {
            return false;
        };
        let before = threads.len();
        threads.retain(|t| t.no != no);
        before != threads.len()
    }

    /// Reconcile one board's selection against a freshly fetched catalog.
    ///
    /// Threads absent from `live` are dropped and reported exactly once;
    /// threads still live have their stored metadata refreshed from the
    /// catalog record.
    pub async fn reconcile(&self, board: &str, live: &[CatalogThread]) -> Vec<RemovedThread> {
        let live_by_no: BTreeMap<u64, &CatalogThread> = live.iter().map(|t| (t.no, t)).collect();
        let mut state = self.state.lock().await;
        let Some(threads) = state.get_mut(board) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        let mut seen = BTreeSet::new();
        threads.retain(|t| {
            // A duplicated entry (possible after hand-edits) reports once.
            if !seen.insert(t.no) {
                return false;
            }
            if live_by_no.contains_key(&t.no) {
                true
            } else {
                removed.push(RemovedThread {
                    no: t.no,
                    semantic_url: t.semantic_url.clone(),
                });
                false
            }
        });
        for thread in threads.iter_mut() {
            if let Some(fresh) = live_by_no.get(&thread.no) {
                *thread = (*fresh).clone();
            }
        }
        if !removed.is_empty() {
            debug!(board, removed = removed.len(), "Reconciled selection against catalog");
        }
        removed
    }

    /// Persist the full mapping atomically (write temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written; this is fatal to the
    /// run since losing the selection would silently stop archival.
    pub async fn save(&self) -> Result<(), StoreError> {
        let state = self.state.lock().await;
        let raw = serde_json::to_vec_pretty(&*state).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        drop(state);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &raw)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;
        info!(path = %self.path.display(), "Selection saved");
        Ok(())
    }
}

/// Decision returned by a selection front end (interactive or scripted).
///
/// The core never talks to a UI; it hands out candidates and previous
/// selection, and takes back one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionDecision {
    /// Replace the board's selection with the threads carrying these ids.
    Update(BTreeSet<u64>),
    /// Keep the previous selection as-is (headless runs use this).
    Unchanged,
    /// Stop before persisting anything.
    Abort,
}

/// Apply a front-end decision to produce the board's new selection.
///
/// `Update` resolves ids against the live candidates (ids not present in the
/// catalog are ignored - they cannot be archived anyway). Returns `None` for
/// `Abort`.
#[must_use]
pub fn apply_decision(
    candidates: &[CatalogThread],
    previous: &[CatalogThread],
    decision: &SelectionDecision,
) -> Option<Vec<CatalogThread>> {
    match decision {
        SelectionDecision::Update(ids) => Some(
            candidates
                .iter()
                .filter(|t| ids.contains(&t.no))
                .cloned()
                .collect(),
        ),
        SelectionDecision::Unchanged => Some(previous.to_vec()),
        SelectionDecision::Abort => None,
    }
}
