//! JSON snapshot persistence.
//!
//! The ledger keeps its whole dataset in one JSON file. Loading yields a
//! [`LedgerSnapshot`]; saving replaces the file atomically by writing a
//! temporary file next to it and renaming it over the target.

use crate::models::{IncomingDispute, LedgerSnapshot};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// File-backed snapshot store.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Create a store for the given data file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. A missing file yields an empty snapshot.
    pub async fn load(&self) -> Result<LedgerSnapshot> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            warn!(
                "Data file {} does not exist, starting from an empty snapshot",
                self.path.display()
            );
            return Ok(LedgerSnapshot::default());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read data file: {}", self.path.display()))?;

        let mut snapshot: LedgerSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse data file: {}", self.path.display()))?;
        snapshot.normalize();

        debug!(
            "Loaded {} loans, {} dispute histories, {} interactions",
            snapshot.loans.len(),
            snapshot.disputes.len(),
            snapshot.user_interactions.len()
        );
        Ok(snapshot)
    }

    /// Persist the snapshot, replacing the data file atomically.
    pub async fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, json.as_bytes()))
            .await
            .context("Snapshot writer task failed")??;

        info!("Snapshot saved to {}", self.path.display());
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(contents)
        .context("Failed to write temporary snapshot")?;
    file.as_file()
        .sync_all()
        .context("Failed to flush temporary snapshot")?;
    file.persist(path)
        .with_context(|| format!("Failed to replace data file: {}", path.display()))?;

    Ok(())
}

/// Read a batch of disputes from a JSON array file.
pub async fn load_dispute_batch(path: &Path) -> Result<Vec<IncomingDispute>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read dispute batch: {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse dispute batch: {}", path.display()))
}
