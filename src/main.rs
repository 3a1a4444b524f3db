use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chan_thread_archiver::archiver::Archiver;
use chan_thread_archiver::boards::{boards_for_origin, load_boards};
use chan_thread_archiver::chan::{ChanClient, FetchError};
use chan_thread_archiver::config::Config;
use chan_thread_archiver::journal::ErrorJournal;
use chan_thread_archiver::selection::{apply_decision, SelectionDecision, SelectionStore};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting chan-thread-archiver");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Failed to create data directory: {}", config.data_dir.display()))?;

    let boards = load_boards(&config.boards_file)
        .await
        .context("Failed to load boards file")?;
    let board_list = boards_for_origin(&boards, &config.origin_key);
    info!(origin = %config.origin_key, boards = ?board_list, "Configuration loaded");

    // The selection file is the only state whose loss is fatal.
    let selection = Arc::new(
        SelectionStore::load(&config.selection_file)
            .await
            .context("Failed to load persisted selection")?,
    );
    let journal = Arc::new(ErrorJournal::new(&config.journal_file));
    let client = ChanClient::new(&config).context("Failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let archiver = Archiver::new(
        config.clone(),
        client,
        Arc::clone(&selection),
        Arc::clone(&journal),
        cancel.clone(),
    );

    // Selection phase: diff each board's catalog against the persisted
    // selection. This run is headless, so the decision seam keeps whatever
    // survives reconciliation; an interactive front end would return Update.
    for board in &board_list {
        if cancel.is_cancelled() {
            break;
        }
        match archiver.refresh_selection(board).await {
            Ok(diff) => {
                let previous = selection.selection_for(board).await;
                let decision = SelectionDecision::Unchanged;
                match apply_decision(&diff.candidates, &previous, &decision) {
                    Some(updated) => {
                        // Boards nobody ever selected from stay out of the file.
                        if !updated.is_empty() || !previous.is_empty() {
                            selection.replace(board, updated).await;
                        }
                    }
                    None => {
                        info!("Selection aborted before persisting; exiting");
                        return Ok(());
                    }
                }
            }
            Err(FetchError::Parse(reason)) => {
                // A malformed catalog aborts only this board's diff step.
                warn!(board, "Catalog payload malformed, keeping prior selection: {reason}");
            }
            Err(e) => {
                warn!(board, "Catalog fetch failed, keeping prior selection: {e}");
            }
        }
    }
    selection
        .save()
        .await
        .context("Failed to persist selection after reconciliation")?;

    // Archival phase: only boards with a selection do any work.
    for board in selection.boards().await {
        if cancel.is_cancelled() {
            break;
        }
        let summary = archiver.archive_board(&board).await;
        info!(
            board,
            complete = summary.threads_complete,
            partial = summary.threads_partial,
            vanished = summary.threads_vanished,
            skipped = summary.threads_skipped,
            downloaded = summary.downloaded,
            already_present = summary.skipped_existing,
            failed = summary.failed,
            "Board run finished"
        );
    }

    // Flush selection edits made mid-run (404'd threads) before exit, even
    // when interrupted - no completed work or selection edits are lost.
    selection
        .save()
        .await
        .context("Failed to persist selection at shutdown")?;

    info!("Done");
    Ok(())
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Interrupt received; finishing in-flight jobs");
        cancel.cancel();
    });
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chan_thread_archiver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
