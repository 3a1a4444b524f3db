//! Per-thread text-log artifact.
//!
//! One `.htm` file per thread, rebuilt wholesale from the full post list, plus
//! a raw `.json` snapshot of the payload on the same schedule. Rewrites happen
//! only when the artifact is missing or stale relative to the newest post, so
//! repeated runs over an unchanged thread are a no-op here.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use tracing::debug;

use crate::chan::{Post, ThreadPayload};
use crate::paths;
use crate::render::format_post;

/// Stylesheet preamble written ahead of the post fragments. Both relative
/// locations are referenced so the artifact renders from either the board
/// directory or a flat export.
const STYLE_PREAMBLE: &str = concat!(
    "<link rel=\"stylesheet\" type=\"text/css\" href=\"4chan.css\" />\n",
    "<link rel=\"stylesheet\" type=\"text/css\" href=\"../4chan.css\" />\n",
);

/// Whether the artifact must be (re)written.
///
/// True when the artifact is missing or its mtime is at or before the newest
/// post's timestamp. Equal timestamps rewrite: a post landing in the same
/// second as the last write must not be dropped.
#[must_use]
pub fn is_stale(artifact: &Path, newest_post_time: i64) -> bool {
    let Ok(metadata) = std::fs::metadata(artifact) else {
        return true;
    };
    let Ok(modified) = metadata.modified() else {
        return true;
    };
    let mtime_secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    mtime_secs <= newest_post_time
}

/// The newest post timestamp in a thread (posts arrive in original order,
/// but this does not assume it).
#[must_use]
pub fn newest_post_time(posts: &[Post]) -> i64 {
    posts.iter().map(|p| p.time).max().unwrap_or(0)
}

/// Render and write the thread's text log, replacing any prior version.
///
/// Returns the artifact path. Fragments are concatenated in original post
/// order.
///
/// # Errors
///
/// Returns an error on local I/O failure; the caller treats that as fatal to
/// this thread only.
pub async fn write_text_log(
    data_dir: &Path,
    board: &str,
    slug: &str,
    no: u64,
    posts: &[Post],
) -> Result<PathBuf> {
    let artifact = paths::text_log_path(data_dir, board, slug, no);
    let parent = artifact
        .parent()
        .context("text log path has no parent directory")?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("Failed to create text directory: {}", parent.display()))?;

    let mut html = String::from(STYLE_PREAMBLE);
    for post in posts {
        html.push_str(&format_post(post));
    }
    tokio::fs::write(&artifact, html.as_bytes())
        .await
        .with_context(|| format!("Failed to write text log: {}", artifact.display()))?;

    let snapshot = paths::thread_snapshot_path(data_dir, board, slug, no);
    let payload = ThreadPayload {
        posts: posts.to_vec(),
    };
    tokio::fs::write(&snapshot, serde_json::to_vec(&payload)?)
        .await
        .with_context(|| format!("Failed to write thread snapshot: {}", snapshot.display()))?;

    debug!(board, thread = no, path = %artifact.display(), "Wrote text log");
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(no: u64, time: i64) -> Post {
        Post {
            no,
            name: Some("Anonymous".to_string()),
            sub: None,
            time,
            com: Some(format!("post {no}")),
            tim: None,
            filename: None,
            ext: None,
            fsize: None,
            semantic_url: None,
        }
    }

    #[test]
    fn test_missing_artifact_is_stale() {
        assert!(is_stale(Path::new("/definitely/not/here.htm"), 0));
    }

    #[tokio::test]
    async fn test_fresh_artifact_is_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        let posts = vec![post(1, 1_600_000_000), post(2, 1_600_000_050)];
        let artifact = write_text_log(dir.path(), "wsg", "comfy", 1, &posts)
            .await
            .unwrap();

        // Newest post predates the file we just wrote.
        assert!(!is_stale(&artifact, newest_post_time(&posts)));
        // A post from the future makes it stale again.
        let now = chrono::Utc::now().timestamp();
        assert!(is_stale(&artifact, now + 3600));
    }

    #[tokio::test]
    async fn test_fragments_in_original_post_order() {
        let dir = tempfile::tempdir().unwrap();
        let posts = vec![post(10, 100), post(11, 90), post(12, 110)];
        let artifact = write_text_log(dir.path(), "wsg", "comfy", 10, &posts)
            .await
            .unwrap();

        let html = tokio::fs::read_to_string(&artifact).await.unwrap();
        let p10 = html.find("id='p10'").unwrap();
        let p11 = html.find("id='p11'").unwrap();
        let p12 = html.find("id='p12'").unwrap();
        assert!(p10 < p11 && p11 < p12);
        assert!(html.starts_with("<link rel=\"stylesheet\""));

        // Snapshot written alongside.
        assert!(dir.path().join("text/wsg/comfy_10.json").is_file());
    }

    #[test]
    fn test_newest_post_time() {
        assert_eq!(newest_post_time(&[post(1, 5), post(2, 9), post(3, 7)]), 9);
        assert_eq!(newest_post_time(&[]), 0);
    }
}
