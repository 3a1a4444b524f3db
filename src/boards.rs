//! Operator board list.
//!
//! A JSON file mapping origin name to board acronyms. When missing, a sample
//! is written for the operator to edit; the sample is also returned so a
//! first run still does something sensible.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

pub type BoardMap = BTreeMap<String, Vec<String>>;

fn sample() -> BoardMap {
    BoardMap::from([(
        "4chan".to_string(),
        vec!["wsg".to_string(), "biz".to_string(), "gd".to_string()],
    )])
}

/// The boards configured under one origin key.
///
/// The file is keyed by origin so an operator can park lists for other
/// origins in it, but a run archives exactly one origin - the one whose API
/// and media hosts are configured. Unknown keys are left alone; a missing
/// key archives nothing and warns.
#[must_use]
pub fn boards_for_origin(map: &BoardMap, origin: &str) -> Vec<String> {
    match map.get(origin) {
        Some(boards) => boards.clone(),
        None => {
            warn!(origin, "No entry for this origin in the boards file");
            Vec::new()
        }
    }
}

/// Load the board list, generating a sample file if none exists.
///
/// # Errors
///
/// Returns an error if an existing file cannot be read or decoded, or if the
/// sample cannot be written.
pub async fn load_boards(path: &Path) -> Result<BoardMap> {
    match tokio::fs::read(path).await {
        Ok(raw) => serde_json::from_slice(&raw)
            .with_context(|| format!("Boards file is corrupt: {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let boards = sample();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, serde_json::to_vec_pretty(&boards)?)
                .await
                .with_context(|| format!("Failed to write sample boards file: {}", path.display()))?;
            warn!(
                path = %path.display(),
                "Missing boards file; a sample has been generated - edit it to pick your boards"
            );
            Ok(boards)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read boards file: {}", path.display())),
    }
}
