//! Read-only client for the imageboard JSON API.
//!
//! There is exactly one content origin today: an API host serving board
//! catalogs and thread details, and a media host serving attachment blobs.
//! Both hosts are configurable so tests can point them at a mock server.

pub mod models;

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

pub use models::{Attachment, CatalogPage, CatalogThread, Post, ThreadPayload};

use crate::config::Config;

/// Errors from upstream fetches, classified for retry decisions.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The item no longer exists upstream (HTTP 404).
    #[error("not found upstream")]
    NotFound,
    /// The payload was not valid JSON or lacked the expected shape.
    #[error("malformed payload: {0}")]
    Parse(String),
    /// A non-404 error status.
    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),
    /// Connection-level failure (reset, refused, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    /// Whether a retry has any chance of succeeding.
    ///
    /// 5xx and 429 are treated as transient, as are timeouts and connection
    /// failures. Other 4xx and malformed payloads are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotFound | Self::Parse(_) => false,
            Self::Status(status) => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            // Transport errors are connection-level (reset, refused, timeout)
            // and always worth another attempt.
            Self::Transport(_) => true,
        }
    }
}

const USER_AGENT: &str = concat!("chan-thread-archiver/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the catalog, thread-detail and media endpoints.
#[derive(Debug, Clone)]
pub struct ChanClient {
    http: reqwest::Client,
    api_base: String,
    media_base: String,
}

impl ChanClient {
    /// Build a client from configuration.
    ///
    /// No overall request timeout is set here; attachment downloads apply
    /// their own escalating per-attempt timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            media_base: config.media_base.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch a board's live catalog and flatten its pages into one list.
    ///
    /// # Errors
    ///
    /// `Parse` for payloads that are not the expected pages-of-threads shape;
    /// callers do not retry this — a malformed catalog aborts only the
    /// selection/diff step for that board.
    pub async fn fetch_catalog(&self, board: &str) -> Result<Vec<CatalogThread>, FetchError> {
        let url = format!("{}/{board}/catalog.json", self.api_base);
        let body = self.get_checked(&url).await?;
        let pages: Vec<CatalogPage> =
            serde_json::from_slice(&body).map_err(|e| FetchError::Parse(e.to_string()))?;
        let threads: Vec<CatalogThread> = pages.into_iter().flat_map(|p| p.threads).collect();
        debug!(board, count = threads.len(), "Fetched catalog");
        Ok(threads)
    }

    /// Fetch the full post list for one thread.
    ///
    /// # Errors
    ///
    /// `NotFound` when the thread has 404'd upstream; `Parse` when the payload
    /// decodes but carries no posts (the opening post is always present in a
    /// well-formed payload).
    pub async fn fetch_thread(&self, board: &str, no: u64) -> Result<Vec<Post>, FetchError> {
        let url = format!("{}/{board}/thread/{no}.json", self.api_base);
        let body = self.get_checked(&url).await?;
        let payload: ThreadPayload =
            serde_json::from_slice(&body).map_err(|e| FetchError::Parse(e.to_string()))?;
        if payload.posts.is_empty() {
            return Err(FetchError::Parse("thread payload contained no posts".to_string()));
        }
        Ok(payload.posts)
    }

    /// URL of an attachment blob on the media host.
    pub fn attachment_url(&self, board: &str, attachment: &Attachment) -> String {
        format!(
            "{}/{board}/{}{}",
            self.media_base, attachment.file_id, attachment.extension
        )
    }

    /// The shared HTTP client, for attachment downloads.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn get_checked(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
