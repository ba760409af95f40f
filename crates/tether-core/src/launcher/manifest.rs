//! Launchers described by a TOML manifest.
//!
//! ```toml
//! display_name = "Maya"
//! icon = "/studio/icons/maya.png"
//! args = ["-nosplash"]
//!
//! [[software]]
//! version = "2024"
//! paths = ["/usr/autodesk/maya2024/bin/maya", "/Applications/Autodesk/maya2024/Maya.app"]
//!
//! [environment]
//! MAYA_DISABLE_CLIC_IPM = "1"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{
    ENV_CONFIG_ROOT, ENV_ENGINE, ENV_FILE_TO_OPEN, LaunchInformation, SoftwareLauncher,
    SoftwareVersion,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LauncherManifest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub icon: Option<PathBuf>,
    /// Arguments placed before the caller's.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub software: Vec<SoftwareEntry>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Candidate install locations of one version, first existing path wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoftwareEntry {
    pub version: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ManifestLauncher {
    name: String,
    display_name: String,
    manifest: LauncherManifest,
    config_root: PathBuf,
}

impl ManifestLauncher {
    pub fn new(name: impl Into<String>, manifest: LauncherManifest, config_root: PathBuf) -> Self {
        let name = name.into();
        let display_name = manifest.display_name.clone().unwrap_or_else(|| name.clone());
        Self {
            name,
            display_name,
            manifest,
            config_root,
        }
    }

    /// Load `<name>.toml`; the file stem is the target name.
    pub fn load(path: &Path, config_root: &Path) -> anyhow::Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("Launcher manifest has no name: {}", path.display()))?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read launcher manifest: {}", path.display()))?;
        let manifest: LauncherManifest = toml::from_str(&content)
            .with_context(|| format!("Failed to parse launcher manifest: {}", path.display()))?;
        Ok(Self::new(name, manifest, config_root.to_path_buf()))
    }

    pub fn manifest(&self) -> &LauncherManifest {
        &self.manifest
    }
}

impl SoftwareLauncher for ManifestLauncher {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn scan_software(&self, versions: Option<&[String]>) -> anyhow::Result<Vec<SoftwareVersion>> {
        let found = self
            .manifest
            .software
            .iter()
            .filter(|entry| versions.is_none_or(|wanted| wanted.contains(&entry.version)))
            .filter_map(|entry| {
                let path = entry.paths.iter().find(|p| p.exists())?;
                Some(SoftwareVersion {
                    version: entry.version.clone(),
                    display_name: format!("{} {}", self.display_name, entry.version),
                    path: path.clone(),
                    icon: self.manifest.icon.clone(),
                })
            })
            .collect::<Vec<_>>();

        tracing::debug!(launcher = %self.name, found = found.len(), "scanned software");
        Ok(found)
    }

    fn prepare_launch(
        &self,
        exec_path: &Path,
        args: &[String],
        file_to_open: Option<&Path>,
    ) -> anyhow::Result<LaunchInformation> {
        let mut environment = self.manifest.environment.clone();
        environment.insert(
            ENV_CONFIG_ROOT.to_string(),
            self.config_root.display().to_string(),
        );
        environment.insert(ENV_ENGINE.to_string(), self.name.clone());
        if let Some(file) = file_to_open {
            environment.insert(ENV_FILE_TO_OPEN.to_string(), file.display().to_string());
        }

        Ok(LaunchInformation {
            path: exec_path.to_path_buf(),
            args: self
                .manifest
                .args
                .iter()
                .chain(args)
                .cloned()
                .collect(),
            environment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher(software_dir: &Path) -> ManifestLauncher {
        let toml = format!(
            r#"
display_name = "Nuke"
args = ["--safe"]

[[software]]
version = "14.0"
paths = ["{missing}", "{present}"]

[[software]]
version = "15.0"
paths = ["{missing}"]

[environment]
NUKE_PATH = "/studio/nuke"
"#,
            missing = software_dir.join("missing").display(),
            present = software_dir.join("nuke14").display(),
        );
        let manifest: LauncherManifest = toml::from_str(&toml).unwrap();
        ManifestLauncher::new("nuke", manifest, PathBuf::from("/srv/site"))
    }

    #[test]
    fn scan_finds_first_existing_path() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("nuke14"), "").unwrap();
        let launcher = launcher(tmp.path());

        let found = launcher.scan_software(None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version, "14.0");
        assert_eq!(found[0].display_name, "Nuke 14.0");
        assert_eq!(found[0].path, tmp.path().join("nuke14"));

        let filtered = launcher.scan_software(Some(&["15.0".to_string()])).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn prepare_launch_injects_environment() {
        let tmp = tempfile::tempdir().unwrap();
        let launcher = launcher(tmp.path());

        let info = launcher
            .prepare_launch(
                Path::new("/opt/nuke"),
                &["-x".to_string()],
                Some(Path::new("/shots/a.nk")),
            )
            .unwrap();
        assert_eq!(info.path, PathBuf::from("/opt/nuke"));
        assert_eq!(info.args, vec!["--safe".to_string(), "-x".to_string()]);
        assert_eq!(info.environment[ENV_CONFIG_ROOT], "/srv/site");
        assert_eq!(info.environment[ENV_ENGINE], "nuke");
        assert_eq!(info.environment[ENV_FILE_TO_OPEN], "/shots/a.nk");
        assert_eq!(info.environment["NUKE_PATH"], "/studio/nuke");

        let info = launcher.prepare_launch(Path::new("/opt/nuke"), &[], None).unwrap();
        assert!(!info.environment.contains_key(ENV_FILE_TO_OPEN));
    }

    #[test]
    fn unknown_manifest_keys_are_rejected() {
        assert!(toml::from_str::<LauncherManifest>("executable = \"/bin/x\"").is_err());
    }
}
