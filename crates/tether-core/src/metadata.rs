//! Deploy metadata written next to an installed config.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::descriptor::Identity;

/// Generation of the on-disk layout rules.
///
/// Bump whenever the layout or the files written during a deploy change;
/// installs stamped with another generation are redeployed.
pub const DEPLOY_GENERATION: u32 = 3;

/// Record of what was deployed to an installation root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployMetadata {
    pub deploy_generation: u32,
    pub config_descriptor: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_descriptor: Option<Identity>,
}

impl DeployMetadata {
    /// Metadata for a deploy performed by this engine generation.
    pub fn current(config: Identity, core: Option<Identity>) -> Self {
        Self {
            deploy_generation: DEPLOY_GENERATION,
            config_descriptor: config,
            core_descriptor: core,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read deploy metadata: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse deploy metadata: {}", path.display()))
    }

    /// Save atomically (tmp + rename).
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Metadata path has no parent: {}", path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        let bytes =
            serde_json::to_vec_pretty(self).context("Failed to serialize deploy metadata")?;
        let tmp_path = parent.join(format!(".{}.tmp", std::process::id()));
        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write tmp metadata: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to rename tmp metadata: {}", tmp_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("core/deploy_info.json");
        let metadata = DeployMetadata::current(
            Identity::new("git").with("path", "repo").with("version", "v1"),
            Some(Identity::new("path").with("path", "/core")),
        );

        metadata.save(&path).unwrap();
        assert_eq!(DeployMetadata::load(&path).unwrap(), metadata);
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn rejects_wrong_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("deploy_info.json");

        fs::write(&path, r#"{"deploy_generation": "three", "config_descriptor": {}}"#).unwrap();
        assert!(DeployMetadata::load(&path).is_err());

        fs::write(&path, r#"{"config_descriptor": {"type": "path"}}"#).unwrap();
        assert!(DeployMetadata::load(&path).is_err());

        fs::write(&path, "not json").unwrap();
        assert!(DeployMetadata::load(&path).is_err());
    }

    #[test]
    fn tolerates_extra_fields_and_missing_core() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("deploy_info.json");
        fs::write(
            &path,
            r#"{"deploy_generation": 2, "config_descriptor": {"type": "path", "path": "/c"}, "note": "x"}"#,
        )
        .unwrap();

        let metadata = DeployMetadata::load(&path).unwrap();
        assert_eq!(metadata.deploy_generation, 2);
        assert_eq!(metadata.core_descriptor, None);
    }
}
