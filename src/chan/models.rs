//! Wire models for the imageboard read-only JSON API.
//!
//! Deserialization doubles as the field allow-list: anything outside the
//! declared fields is dropped at decode time. Several fields are genuinely
//! optional upstream (subject, author, comment, attachment metadata), so they
//! are `Option` here rather than defaulted to empty strings.

use serde::{Deserialize, Serialize};

/// One page of a board catalog, as served by `{board}/catalog.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPage {
    #[serde(default)]
    pub page: u32,
    pub threads: Vec<CatalogThread>,
}

/// A thread summary from the board catalog.
///
/// Identity is `(board, no)`; the board is carried by context, not the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogThread {
    /// Numeric thread id, unique within a board.
    pub no: u64,
    /// Author display name of the opening post.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Thread subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Opening post comment body (HTML as served upstream).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub com: Option<String>,
    /// File id of the opening post attachment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tim: Option<u64>,
    /// Creation time, unix seconds.
    pub time: i64,
    /// Upstream archived flag (0/1 on the wire).
    #[serde(default)]
    pub archived: u8,
    /// Human-readable per-thread identifier, distinct from `no`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl CatalogThread {
    /// Whether the thread has been archived upstream (read-only, about to 404).
    pub fn is_archived_upstream(&self) -> bool {
        self.archived != 0
    }
}

/// Thread detail payload from `{board}/thread/{no}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadPayload {
    pub posts: Vec<Post>,
}

/// A single post within a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub no: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Post time, unix seconds.
    pub time: i64,
    /// Comment body, HTML as served upstream. Absent on image-only posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub com: Option<String>,
    /// Upload-time file id. Present only on posts with an attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tim: Option<u64>,
    /// Original filename without extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// File extension including the leading dot, e.g. ".webm".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    /// Attachment size in bytes as reported upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsize: Option<u64>,
    /// Only present on the opening post.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_url: Option<String>,
}

/// Attachment metadata derived from a post's file fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_id: u64,
    pub original_filename: String,
    pub extension: String,
    pub expected_byte_size: u64,
}

impl Post {
    /// The post's attachment, if the upstream payload carried complete file
    /// metadata. Posts with partial file fields (deleted uploads) yield `None`.
    pub fn attachment(&self) -> Option<Attachment> {
        let file_id = self.tim?;
        let extension = self.ext.clone()?;
        let expected_byte_size = self.fsize?;
        Some(Attachment {
            file_id,
            original_filename: self.filename.clone().unwrap_or_default(),
            extension,
            expected_byte_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_thread_drops_unknown_fields() {
        let raw = r#"{
            "no": 570368,
            "sticky": 1,
            "closed": 1,
            "now": "12/31/18(Mon)17:05:48",
            "name": "Anonymous",
            "sub": "Welcome to /po/!",
            "com": "Papercraft and origami",
            "time": 1546293948,
            "semantic_url": "welcome-to-po",
            "replies": 2,
            "images": 2,
            "fsize": 516657
        }"#;
        let thread: CatalogThread = serde_json::from_str(raw).unwrap();
        assert_eq!(thread.no, 570_368);
        assert_eq!(thread.semantic_url.as_deref(), Some("welcome-to-po"));
        assert!(!thread.is_archived_upstream());

        // Round-tripping keeps only allow-listed fields
        let trimmed = serde_json::to_value(&thread).unwrap();
        assert!(trimmed.get("sticky").is_none());
        assert!(trimmed.get("replies").is_none());
    }

    #[test]
    fn test_attachment_requires_all_file_fields() {
        let mut post = Post {
            no: 1,
            name: None,
            sub: None,
            time: 0,
            com: None,
            tim: Some(1_546_293_948_883),
            filename: Some("yotsuba".to_string()),
            ext: Some(".png".to_string()),
            fsize: Some(516_657),
            semantic_url: None,
        };
        let att = post.attachment().unwrap();
        assert_eq!(att.file_id, 1_546_293_948_883);
        assert_eq!(att.extension, ".png");
        assert_eq!(att.expected_byte_size, 516_657);

        post.fsize = None;
        assert!(post.attachment().is_none());
    }

    #[test]
    fn test_optional_fields_distinguish_absent_from_empty() {
        let raw = r#"{"no": 2, "time": 100, "com": ""}"#;
        let post: Post = serde_json::from_str(raw).unwrap();
        assert_eq!(post.com.as_deref(), Some(""));

        let raw = r#"{"no": 3, "time": 100}"#;
        let post: Post = serde_json::from_str(raw).unwrap();
        assert!(post.com.is_none());
    }
}
