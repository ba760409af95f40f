//! Launcher layer for the software a configuration drives.
//!
//! Provides abstraction for per-target launch code with support for:
//! - Scanning the local machine for installed versions
//! - Building the command line and environment for a launch
//! - Manifest-backed launchers discovered from `config/launchers/*.toml`

mod manifest;
mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

pub use manifest::{LauncherManifest, ManifestLauncher, SoftwareEntry};
pub use registry::LauncherRegistry;

/// Environment variable naming the installation root a launch runs against.
pub const ENV_CONFIG_ROOT: &str = "TETHER_CONFIG_ROOT";
/// Environment variable naming the launcher target.
pub const ENV_ENGINE: &str = "TETHER_ENGINE";
/// Environment variable naming a file to open once the software is up.
pub const ENV_FILE_TO_OPEN: &str = "TETHER_FILE_TO_OPEN";

/// An installed version of a piece of software.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftwareVersion {
    pub version: String,
    pub display_name: String,
    pub path: PathBuf,
    pub icon: Option<PathBuf>,
}

/// What to execute, and with which environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LaunchInformation {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub environment: BTreeMap<String, String>,
}

/// Launch code for one target.
pub trait SoftwareLauncher: fmt::Debug + Send + Sync {
    /// Target name used for lookups.
    fn name(&self) -> &str;

    /// Human-readable name.
    fn display_name(&self) -> &str {
        self.name()
    }

    /// Installed versions, optionally restricted to `versions`.
    fn scan_software(&self, versions: Option<&[String]>) -> anyhow::Result<Vec<SoftwareVersion>>;

    /// Prepare launching `exec_path` with `args`, optionally opening a file.
    fn prepare_launch(
        &self,
        exec_path: &Path,
        args: &[String],
        file_to_open: Option<&Path>,
    ) -> anyhow::Result<LaunchInformation>;
}
