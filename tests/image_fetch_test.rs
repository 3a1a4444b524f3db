//! Retry behavior of single-attachment downloads.

use std::time::Duration;

use chan_thread_archiver::archiver::image::{fetch_attachment, RetryPolicy};
use chan_thread_archiver::journal::{self, ErrorJournal};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        timeout_base: Duration::from_millis(500),
        timeout_step: Duration::from_millis(250),
    }
}

struct Harness {
    server: MockServer,
    client: reqwest::Client,
    journal_path: std::path::PathBuf,
    journal: ErrorJournal,
    temp: TempDir,
}

async fn setup() -> Harness {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let journal_path = temp.path().join("journal.jsonl");
    Harness {
        server: MockServer::start().await,
        client: reqwest::Client::new(),
        journal: ErrorJournal::new(&journal_path),
        journal_path,
        temp,
    }
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let h = setup().await;
    // Two 500s, then the real body: k = 2 < max_retries = 5.
    Mock::given(method("GET"))
        .and(path("/wsg/111.webm"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wsg/111.webm"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1000]))
        .mount(&h.server)
        .await;

    let dest = h.temp.path().join("media/111.webm");
    let outcome = fetch_attachment(
        &h.client,
        &format!("{}/wsg/111.webm", h.server.uri()),
        &dest,
        1000,
        fast_policy(5),
        &h.journal,
    )
    .await;

    assert!(outcome.is_completed());
    assert_eq!(request_count(&h.server).await, 3);
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 1000);

    // Only terminal failures are journaled.
    let records = journal::read_all(&h.journal_path).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_retries_exhausted_after_max_attempts() {
    let h = setup().await;
    Mock::given(method("GET"))
        .and(path("/wsg/111.webm"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;

    let dest = h.temp.path().join("media/111.webm");
    let outcome = fetch_attachment(
        &h.client,
        &format!("{}/wsg/111.webm", h.server.uri()),
        &dest,
        1000,
        fast_policy(5),
        &h.journal,
    )
    .await;

    assert!(!outcome.is_completed());
    // Exactly max_retries attempts, then give up.
    assert_eq!(request_count(&h.server).await, 5);
    assert!(!dest.exists());

    // Exactly one journal entry, keyed by the destination file.
    let records = journal::read_all(&h.journal_path).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].item_key, dest.display().to_string());
    assert_eq!(records[0].payload["expected_byte_size"], 1000);
}

#[tokio::test]
async fn test_short_body_is_failed_not_completed() {
    let h = setup().await;
    // Upstream reports 1000 bytes but always serves 900.
    Mock::given(method("GET"))
        .and(path("/wsg/111.webm"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 900]))
        .mount(&h.server)
        .await;

    let dest = h.temp.path().join("media/111.webm");
    let outcome = fetch_attachment(
        &h.client,
        &format!("{}/wsg/111.webm", h.server.uri()),
        &dest,
        1000,
        fast_policy(3),
        &h.journal,
    )
    .await;

    assert!(!outcome.is_completed());
    // A short body is treated as transient, so every attempt is used.
    assert_eq!(request_count(&h.server).await, 3);

    // The file stays on disk below size parity: a later run retries it.
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 900);

    let records = journal::read_all(&h.journal_path).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].error.contains("size mismatch"));
}

#[tokio::test]
async fn test_non_retryable_status_fails_immediately() {
    let h = setup().await;
    Mock::given(method("GET"))
        .and(path("/wsg/111.webm"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&h.server)
        .await;

    let dest = h.temp.path().join("media/111.webm");
    let outcome = fetch_attachment(
        &h.client,
        &format!("{}/wsg/111.webm", h.server.uri()),
        &dest,
        1000,
        fast_policy(5),
        &h.journal,
    )
    .await;

    assert!(!outcome.is_completed());
    assert_eq!(request_count(&h.server).await, 1, "4xx must not retry");
    let records = journal::read_all(&h.journal_path).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let h = setup().await;
    Mock::given(method("GET"))
        .and(path("/wsg/111.webm"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wsg/111.webm"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
        .mount(&h.server)
        .await;

    let dest = h.temp.path().join("media/111.webm");
    let outcome = fetch_attachment(
        &h.client,
        &format!("{}/wsg/111.webm", h.server.uri()),
        &dest,
        64,
        fast_policy(5),
        &h.journal,
    )
    .await;

    assert!(outcome.is_completed());
    assert_eq!(request_count(&h.server).await, 2);
}

#[tokio::test]
async fn test_slow_source_times_out_then_escalation_succeeds() {
    let h = setup().await;
    // First response is slower than the base timeout; the retry's escalated
    // timeout accommodates it.
    Mock::given(method("GET"))
        .and(path("/wsg/111.webm"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![7u8; 16])
                .set_delay(Duration::from_millis(700)),
        )
        .mount(&h.server)
        .await;

    let dest = h.temp.path().join("media/111.webm");
    let policy = RetryPolicy {
        max_retries: 3,
        timeout_base: Duration::from_millis(400),
        timeout_step: Duration::from_millis(600),
    };
    let outcome = fetch_attachment(
        &h.client,
        &format!("{}/wsg/111.webm", h.server.uri()),
        &dest,
        16,
        policy,
        &h.journal,
    )
    .await;

    assert!(outcome.is_completed());
    assert!(request_count(&h.server).await >= 2);
    let records = journal::read_all(&h.journal_path).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_no_part_file_left_behind_on_success() {
    let h = setup().await;
    Mock::given(method("GET"))
        .and(path("/wsg/111.webm"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 32]))
        .mount(&h.server)
        .await;

    let dest = h.temp.path().join("media/111.webm");
    let outcome = fetch_attachment(
        &h.client,
        &format!("{}/wsg/111.webm", h.server.uri()),
        &dest,
        32,
        fast_policy(5),
        &h.journal,
    )
    .await;

    assert!(outcome.is_completed());
    assert!(dest.is_file());
    assert!(!h.temp.path().join("media/111.webm.part").exists());
}
