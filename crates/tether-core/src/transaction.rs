//! Transaction marker bracketing the mutating window of an update.
//!
//! Only the presence of the marker matters for status classification. Its
//! body records who started the update, for operators inspecting a root
//! that was left mid-update.

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMarker {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub config_uri: String,
}

impl TransactionMarker {
    pub fn new(config_uri: impl Into<String>) -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
            config_uri: config_uri.into(),
        }
    }

    pub fn is_pending(path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    /// Write the marker. An existing marker from an interrupted run is replaced.
    pub fn begin(&self, path: &Path) -> anyhow::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Marker path has no parent: {}", path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        let bytes = serde_json::to_vec_pretty(self).context("Failed to serialize marker")?;
        fs::write(path, bytes)
            .with_context(|| format!("Failed to write transaction marker: {}", path.display()))
    }

    pub fn end(path: &Path) -> anyhow::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(anyhow::Error::new(err).context(format!(
                "Failed to remove transaction marker: {}",
                path.display()
            ))),
        }
    }

    /// Read the marker body. An unreadable body still means "pending".
    pub fn read(path: &Path) -> anyhow::Result<Option<Self>> {
        if !Self::is_pending(path) {
            return Ok(None);
        }
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read transaction marker: {}", path.display()))?;
        let marker = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse transaction marker: {}", path.display()))?;
        Ok(Some(marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_end_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("install/transaction.json");
        assert!(!TransactionMarker::is_pending(&path));

        let marker = TransactionMarker::new("catalog:primary?version=v1");
        marker.begin(&path).unwrap();
        assert!(TransactionMarker::is_pending(&path));
        assert_eq!(TransactionMarker::read(&path).unwrap(), Some(marker));

        TransactionMarker::end(&path).unwrap();
        assert!(!TransactionMarker::is_pending(&path));
        TransactionMarker::end(&path).unwrap();
    }

    #[test]
    fn garbage_marker_is_still_pending() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("transaction.json");
        fs::write(&path, "").unwrap();

        assert!(TransactionMarker::is_pending(&path));
        assert!(TransactionMarker::read(&path).is_err());
    }
}
