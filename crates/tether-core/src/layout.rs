//! On-disk layout of an installation root.
//!
//! ```text
//! <root>/
//!   config/                         deployed config bundle
//!     info.toml                     manifest ("a config exists here")
//!     core/
//!       deploy_info.json            engine metadata (generation + identity)
//!       install_location.toml
//!       site.toml
//!       pipeline_configuration.toml
//!       roots.toml
//!       interpreter.cfg
//!     launchers/*.toml
//!   install/
//!     core/                         installed core runtime
//!     transaction.json              marker, present while an update runs
//!     config.backup/<stamp>/config
//!     core.backup/<stamp>/
//!   launch                          launcher script
//! ```

use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "info.toml";
pub const METADATA_FILE: &str = "deploy_info.json";
pub const TRANSACTION_FILE: &str = "transaction.json";
pub const CORE_API_FILE: &str = "core_api.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config_dir().join(MANIFEST_FILE)
    }

    /// Engine-owned files inside the config tree.
    pub fn config_core_dir(&self) -> PathBuf {
        self.config_dir().join("core")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.config_core_dir().join(METADATA_FILE)
    }

    pub fn install_location_path(&self) -> PathBuf {
        self.config_core_dir().join("install_location.toml")
    }

    pub fn site_path(&self) -> PathBuf {
        self.config_core_dir().join("site.toml")
    }

    pub fn pipeline_config_path(&self) -> PathBuf {
        self.config_core_dir().join("pipeline_configuration.toml")
    }

    pub fn roots_path(&self) -> PathBuf {
        self.config_core_dir().join("roots.toml")
    }

    pub fn interpreter_path(&self) -> PathBuf {
        self.config_core_dir().join("interpreter.cfg")
    }

    pub fn launchers_dir(&self) -> PathBuf {
        self.config_dir().join("launchers")
    }

    pub fn install_dir(&self) -> PathBuf {
        self.root.join("install")
    }

    pub fn core_dir(&self) -> PathBuf {
        self.install_dir().join("core")
    }

    pub fn transaction_path(&self) -> PathBuf {
        self.install_dir().join(TRANSACTION_FILE)
    }

    pub fn config_backup_root(&self) -> PathBuf {
        self.install_dir().join("config.backup")
    }

    pub fn core_backup_root(&self) -> PathBuf {
        self.install_dir().join("core.backup")
    }

    pub fn launcher_script_path(&self) -> PathBuf {
        self.root.join("launch")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_is_outside_backed_up_trees() {
        let layout = InstallLayout::new("/srv/site");
        let marker = layout.transaction_path();
        assert!(!marker.starts_with(layout.config_dir()));
        assert!(!marker.starts_with(layout.core_dir()));
    }

    #[test]
    fn metadata_travels_with_config() {
        let layout = InstallLayout::new("/srv/site");
        assert!(layout.metadata_path().starts_with(layout.config_dir()));
        assert_eq!(
            layout.manifest_path(),
            PathBuf::from("/srv/site/config/info.toml")
        );
    }
}
