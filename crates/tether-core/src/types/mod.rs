//! Shared core types used across the engine and its frontends.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of an installation root against its config spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStatus {
    /// Installed snapshot matches the config spec.
    UpToDate,
    /// No configuration manifest at the root.
    Missing,
    /// A configuration exists but was deployed from something else.
    Different,
    /// On-disk state cannot be trusted (interrupted update, bad metadata).
    Invalid,
}

impl ConfigStatus {
    pub fn needs_update(self) -> bool {
        !matches!(self, ConfigStatus::UpToDate)
    }
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfigStatus::UpToDate => "up to date",
            ConfigStatus::Missing => "missing",
            ConfigStatus::Different => "different",
            ConfigStatus::Invalid => "invalid",
        };
        f.write_str(label)
    }
}
