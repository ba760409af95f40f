//! Filesystem operations performed by an update.
//!
//! The engine decides *when* each step runs; an [`ArtifactWriter`] knows
//! *how* to carry it out against an installation root.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::descriptor::{Descriptor, Identity};
use crate::fs::{copy_tree, hash_tree, move_dir, remove_path};
use crate::layout::InstallLayout;
use crate::metadata::DeployMetadata;
use crate::roots::StorageRoots;
use crate::transaction::TransactionMarker;

/// Locations a previous install was moved to.
///
/// `None` means there was nothing to move.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupPaths {
    pub config: Option<PathBuf>,
    pub core: Option<PathBuf>,
}

impl BackupPaths {
    /// Both the config and the core were backed up.
    pub fn is_complete(&self) -> bool {
        self.config.is_some() && self.core.is_some()
    }

    /// Directories to delete once the backup is no longer needed.
    pub fn cleanup_targets(&self) -> Vec<PathBuf> {
        let config_stamp_dir = self
            .config
            .as_deref()
            .map(|p| p.parent().map(Path::to_path_buf).unwrap_or_else(|| p.to_path_buf()));
        config_stamp_dir
            .into_iter()
            .chain(self.core.clone())
            .collect()
    }
}

impl fmt::Display for BackupPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |p: &Option<PathBuf>| {
            p.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        write!(f, "config: {}, core: {}", show(&self.config), show(&self.core))
    }
}

/// Pipeline settings recorded in `pipeline_configuration.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_config_id: Option<u64>,
    #[serde(default)]
    pub bundle_cache_fallback_paths: Vec<PathBuf>,
}

/// Low-level operations on an installation root.
pub trait ArtifactWriter: fmt::Debug + Send {
    fn layout(&self) -> &InstallLayout;

    fn is_transaction_pending(&self) -> bool;

    fn begin_transaction(&self, config_uri: &str) -> anyhow::Result<()>;

    fn end_transaction(&self) -> anyhow::Result<()>;

    /// Move `config/` and `install/core/` into fresh backup locations.
    ///
    /// With `undo_on_error`, a partial move is rolled back before the
    /// error is returned.
    fn move_to_backup(&self, undo_on_error: bool) -> anyhow::Result<BackupPaths>;

    fn scaffold(&self) -> anyhow::Result<()>;

    /// Copy a fetched config bundle into `config/`.
    fn write_config(&self, config_local: &Path) -> anyhow::Result<()>;

    fn write_manifest_and_metadata(
        &self,
        config: &dyn Descriptor,
        metadata: &DeployMetadata,
    ) -> anyhow::Result<()>;

    /// Install location, site, pipeline configuration and storage roots.
    fn write_environment_files(
        &self,
        config: &dyn Descriptor,
        pipeline: &PipelineMeta,
    ) -> anyhow::Result<()>;

    /// Copy a fetched core into `install/core/` and verify the copy.
    fn install_core(&self, core_local: &Path) -> anyhow::Result<()>;

    /// Launch script and interpreter file.
    fn regenerate_launcher_artifacts(&self) -> anyhow::Result<()>;

    /// Copy a complete backup back into place.
    fn restore_backup(&self, backup: &BackupPaths) -> anyhow::Result<()>;

    fn remove_backup(&self, path: &Path) -> anyhow::Result<()>;

    fn metadata_file_path(&self) -> PathBuf {
        self.layout().metadata_path()
    }

    fn manifest_path(&self) -> PathBuf {
        self.layout().manifest_path()
    }
}

#[derive(Debug, Serialize)]
struct InstallLocationFile<'a> {
    path: &'a Path,
}

#[derive(Debug, Serialize)]
struct SiteFile {
    config_uri: String,
}

#[derive(Debug, Serialize)]
struct PipelineConfigurationFile<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plugin_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pipeline_config_id: Option<u64>,
    bundle_cache_fallback_paths: &'a [PathBuf],
    source_descriptor: &'a Identity,
}

/// [`ArtifactWriter`] operating directly on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsArtifactWriter {
    layout: InstallLayout,
    interpreter: Option<PathBuf>,
}

impl FsArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: InstallLayout::new(root),
            interpreter: None,
        }
    }

    /// Executable recorded in `interpreter.cfg`. Defaults to the running binary.
    pub fn with_interpreter(mut self, interpreter: PathBuf) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    fn interpreter(&self) -> anyhow::Result<PathBuf> {
        match &self.interpreter {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe().context("Failed to locate the running executable"),
        }
    }

    fn write_toml<T: Serialize>(path: &Path, header: &str, value: &T) -> anyhow::Result<()> {
        let body = toml::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {}", path.display()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(path, format!("{}\n{}", header, body))
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

const GENERATED_HEADER: &str = "# Generated by tether. Rewritten on every update.\n";

/// A path under `backup_root` named after the current time that does not exist yet.
fn fresh_backup_path(backup_root: &Path) -> anyhow::Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    for attempt in 0u32..1000 {
        let name = if attempt == 0 {
            stamp.clone()
        } else {
            format!("{}_{}", stamp, attempt)
        };
        let candidate = backup_root.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    anyhow::bail!(
        "Failed to allocate a backup directory under {}",
        backup_root.display()
    )
}

/// Drop a backup stamp directory left empty by a failed move.
///
/// A directory that still holds anything is kept: after a failed move it is
/// the only complete copy.
fn remove_empty_dir(dir: &Path) {
    match fs::remove_dir(dir) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("Keeping backup directory {}: {}", dir.display(), err),
    }
}

/// Quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

impl ArtifactWriter for FsArtifactWriter {
    fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    fn is_transaction_pending(&self) -> bool {
        TransactionMarker::is_pending(&self.layout.transaction_path())
    }

    fn begin_transaction(&self, config_uri: &str) -> anyhow::Result<()> {
        TransactionMarker::new(config_uri).begin(&self.layout.transaction_path())
    }

    fn end_transaction(&self) -> anyhow::Result<()> {
        TransactionMarker::end(&self.layout.transaction_path())
    }

    fn move_to_backup(&self, undo_on_error: bool) -> anyhow::Result<BackupPaths> {
        let config_dir = self.layout.config_dir();
        let core_dir = self.layout.core_dir();

        // Both destinations are picked before anything moves.
        let config_stamp = if config_dir.exists() {
            Some(fresh_backup_path(&self.layout.config_backup_root())?)
        } else {
            None
        };
        let core_dest = if core_dir.exists() {
            Some(fresh_backup_path(&self.layout.core_backup_root())?)
        } else {
            None
        };
        let mut backup = BackupPaths::default();

        if let Some(stamp_dir) = config_stamp {
            let dest = stamp_dir.join("config");
            if let Err(err) = move_dir(&config_dir, &dest) {
                remove_empty_dir(&stamp_dir);
                return Err(err.context("Failed to back up config"));
            }
            tracing::debug!(from = %config_dir.display(), to = %dest.display(), "moved config");
            backup.config = Some(dest);
        }

        if let Some(dest) = core_dest {
            if let Err(err) = move_dir(&core_dir, &dest) {
                if let Some(config_backup) = backup.config.as_ref().filter(|_| undo_on_error) {
                    move_dir(config_backup, &config_dir).with_context(|| {
                        format!(
                            "Failed to undo config backup; previous config is in {}",
                            config_backup.display()
                        )
                    })?;
                    if let Some(stamp_dir) = config_backup.parent() {
                        remove_empty_dir(stamp_dir);
                    }
                }
                return Err(err.context("Failed to back up core"));
            }
            tracing::debug!(from = %core_dir.display(), to = %dest.display(), "moved core");
            backup.core = Some(dest);
        }

        Ok(backup)
    }

    fn scaffold(&self) -> anyhow::Result<()> {
        for dir in [
            self.layout.config_dir(),
            self.layout.config_core_dir(),
            self.layout.install_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    fn write_config(&self, config_local: &Path) -> anyhow::Result<()> {
        copy_tree(config_local, &self.layout.config_dir()).with_context(|| {
            format!("Failed to copy config from {}", config_local.display())
        })
    }

    fn write_manifest_and_metadata(
        &self,
        config: &dyn Descriptor,
        metadata: &DeployMetadata,
    ) -> anyhow::Result<()> {
        let manifest = self.manifest_path();
        if !manifest.is_file() {
            tracing::debug!(uri = %config.uri(), "config ships no manifest, writing one");
            let content = format!(
                "# Written by tether: the deployed config did not ship a manifest.\n\
                 source = {}\n",
                toml::Value::String(config.uri())
            );
            fs::write(&manifest, content)
                .with_context(|| format!("Failed to write manifest: {}", manifest.display()))?;
        }
        metadata.save(&self.metadata_file_path())
    }

    fn write_environment_files(
        &self,
        config: &dyn Descriptor,
        pipeline: &PipelineMeta,
    ) -> anyhow::Result<()> {
        Self::write_toml(
            &self.layout.install_location_path(),
            GENERATED_HEADER,
            &InstallLocationFile {
                path: self.layout.root(),
            },
        )?;
        Self::write_toml(
            &self.layout.site_path(),
            GENERATED_HEADER,
            &SiteFile {
                config_uri: config.uri(),
            },
        )?;
        Self::write_toml(
            &self.layout.pipeline_config_path(),
            GENERATED_HEADER,
            &PipelineConfigurationFile {
                project_id: pipeline.project_id,
                plugin_id: pipeline.plugin_id.as_deref(),
                pipeline_config_id: pipeline.pipeline_config_id,
                bundle_cache_fallback_paths: &pipeline.bundle_cache_fallback_paths,
                source_descriptor: config.identity(),
            },
        )?;

        let config_dir = self.layout.config_dir();
        if StorageRoots::defined(&config_dir) {
            let roots = StorageRoots::load(&config_dir)?;
            roots.write()?;
            tracing::debug!(
                default = roots.default_name().unwrap_or("-"),
                "rewrote storage roots"
            );
        }
        Ok(())
    }

    fn install_core(&self, core_local: &Path) -> anyhow::Result<()> {
        let core_dir = self.layout.core_dir();
        remove_path(&core_dir)?;
        copy_tree(core_local, &core_dir)
            .with_context(|| format!("Failed to copy core from {}", core_local.display()))?;

        let expected = hash_tree(core_local)?;
        let actual = hash_tree(&core_dir)?;
        if expected != actual {
            anyhow::bail!(
                "Installed core at {} does not match {} (hash {} != {})",
                core_dir.display(),
                core_local.display(),
                actual,
                expected
            );
        }
        Ok(())
    }

    fn regenerate_launcher_artifacts(&self) -> anyhow::Result<()> {
        let interpreter = self.interpreter()?;
        let interpreter_path = self.layout.interpreter_path();
        fs::create_dir_all(self.layout.config_core_dir()).with_context(|| {
            format!(
                "Failed to create directory: {}",
                self.layout.config_core_dir().display()
            )
        })?;
        fs::write(&interpreter_path, format!("{}\n", interpreter.display())).with_context(
            || format!("Failed to write interpreter file: {}", interpreter_path.display()),
        )?;

        let root = shell_quote(&self.layout.root().display().to_string());
        let script = format!(
            "#!/bin/sh\n\
             # Generated by tether. Rewritten on every update.\n\
             TETHER_ROOT={root}\n\
             exec \"$(cat \"$TETHER_ROOT/config/core/interpreter.cfg\")\" \
             launch --root \"$TETHER_ROOT\" \"$@\"\n"
        );
        let script_path = self.layout.launcher_script_path();
        fs::write(&script_path, script).with_context(|| {
            format!("Failed to write launch script: {}", script_path.display())
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755)).with_context(
                || format!("Failed to make {} executable", script_path.display()),
            )?;
        }
        Ok(())
    }

    fn restore_backup(&self, backup: &BackupPaths) -> anyhow::Result<()> {
        let (Some(config), Some(core)) = (&backup.config, &backup.core) else {
            anyhow::bail!("Backup is incomplete ({}), cannot restore", backup);
        };
        copy_tree(config, &self.layout.config_dir())
            .with_context(|| format!("Failed to restore config from {}", config.display()))?;
        copy_tree(core, &self.layout.core_dir())
            .with_context(|| format!("Failed to restore core from {}", core.display()))?;
        Ok(())
    }

    fn remove_backup(&self, path: &Path) -> anyhow::Result<()> {
        remove_path(path)
    }
}
