//! Deterministic destination paths for everything the pipeline writes.
//!
//! All naming lives here so the "is this file already complete" check and the
//! writer can never disagree. The media naming scheme is versioned: the
//! current scheme is `{file_id}{ext}` under `media/{board}/{slug}/`, and the
//! single older scheme (`{post_no}_{filename}{ext}`) is handled by an
//! explicit one-time migration pass rather than probed on every run.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::chan::{Attachment, Post};

/// Fallback slug for threads whose opening post carries no semantic url.
const FALLBACK_SLUG: &str = "thread";

/// Filesystem-safe slug for a thread.
///
/// Semantic urls are slug-shaped upstream already; this guards against
/// hand-edited selection files and keeps path traversal out.
#[must_use]
pub fn thread_slug(semantic_url: Option<&str>) -> String {
    let slug: String = semantic_url
        .unwrap_or(FALLBACK_SLUG)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Directory holding one thread's attachment files.
#[must_use]
pub fn media_dir(data_dir: &Path, board: &str, slug: &str) -> PathBuf {
    data_dir.join("media").join(board).join(slug)
}

/// Current (v2) media file name: upload-time file id plus extension.
#[must_use]
pub fn media_file_name(attachment: &Attachment) -> String {
    format!("{}{}", attachment.file_id, attachment.extension)
}

/// Text-log artifact path for one thread.
#[must_use]
pub fn text_log_path(data_dir: &Path, board: &str, slug: &str, no: u64) -> PathBuf {
    data_dir
        .join("text")
        .join(board)
        .join(format!("{slug}_{no}.htm"))
}

/// Raw thread-payload snapshot path, written beside the text log.
#[must_use]
pub fn thread_snapshot_path(data_dir: &Path, board: &str, slug: &str, no: u64) -> PathBuf {
    data_dir
        .join("text")
        .join(board)
        .join(format!("{slug}_{no}.json"))
}

/// One-time migration of a thread directory from the v1 media naming scheme
/// (`{post_no}_{filename}{ext}`) to the current one. Returns how many files
/// were moved. A no-op when the directory does not exist or the current name
/// is already taken.
///
/// # Errors
///
/// Returns an error only for directory-level I/O failures; a single file
/// that cannot be renamed is logged and skipped.
pub async fn migrate_legacy_media(dir: &Path, posts: &[Post]) -> std::io::Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut migrated = 0;
    for post in posts {
        let Some(attachment) = post.attachment() else {
            continue;
        };
        let legacy = dir.join(format!(
            "{}_{}{}",
            post.no, attachment.original_filename, attachment.extension
        ));
        let current = dir.join(media_file_name(&attachment));
        if !legacy.is_file() || current.exists() {
            continue;
        }
        match tokio::fs::rename(&legacy, &current).await {
            Ok(()) => {
                migrated += 1;
            }
            Err(e) => {
                warn!(
                    from = %legacy.display(),
                    to = %current.display(),
                    "Failed to migrate legacy media file: {e}"
                );
            }
        }
    }
    if migrated > 0 {
        info!(dir = %dir.display(), migrated, "Migrated legacy media file names");
    }
    Ok(migrated)
}
