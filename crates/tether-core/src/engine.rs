//! Reconciliation of an installation root against a [`ConfigSpec`].
//!
//! [`ReconciliationEngine::status`] classifies what is on disk without
//! touching it. [`ReconciliationEngine::update`] replaces the installed
//! config and core inside a transaction:
//!
//! 1. set the transaction marker
//! 2. move the current config and core to a backup
//! 3. scaffold, fetch, check compatibility, write the new state
//! 4. on failure stow the partial install and restore the backup
//! 5. on success delete the backup
//! 6. regenerate launcher artifacts and clear the marker
//!
//! A root whose marker is still set after `update` returns needs another
//! update before it can be trusted.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use thiserror::Error;

use crate::cache::BundleCache;
use crate::compat::{self, CompatibilityError};
use crate::descriptor::Identity;
use crate::fs::hash_tree;
use crate::layout::InstallLayout;
use crate::metadata::{DEPLOY_GENERATION, DeployMetadata};
use crate::spec::{ConfigSpec, CoreSource, ResolvedCore};
use crate::transaction::TransactionMarker;
use crate::types::ConfigStatus;
use crate::writer::{ArtifactWriter, BackupPaths, FsArtifactWriter, PipelineMeta};

/// Failures reported by [`UpdateOutcome::into_result`].
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Could not back up the current installation, nothing was changed: {reason}")]
    BackupFailed { reason: String },

    #[error("Installation at {root} could not be updated or restored: {reason}")]
    Unrecoverable { root: PathBuf, reason: String },

    #[error(transparent)]
    Compatibility(#[from] CompatibilityError),
}

/// What a successful install put on disk.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub config_uri: String,
    pub config: Identity,
    pub core_uri: String,
    pub core: Identity,
    pub core_source: String,
}

/// Result of [`ReconciliationEngine::update`].
#[must_use = "an update can fail without returning Err; inspect the outcome"]
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The new config and core are installed.
    Updated(UpdateReport),
    /// Install failed; the previous config and core were put back.
    RecoveredToPrevious {
        error: anyhow::Error,
        stowed: BackupPaths,
        backup: BackupPaths,
    },
    /// Install failed and nothing could be put back. The marker stays set.
    Unrecoverable {
        error: anyhow::Error,
        stowed: Option<BackupPaths>,
        backup: Option<BackupPaths>,
    },
    /// The current install could not be moved aside. The marker stays set.
    BackupFailed { error: anyhow::Error },
}

impl UpdateOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }

    /// `Err` only when the root was left unusable or untouched by a failure.
    ///
    /// A recovered install keeps working on the previous version, so it is
    /// passed through as `Ok`.
    pub fn into_result(self, root: &Path) -> Result<Self, UpdateError> {
        match self {
            UpdateOutcome::Updated(_) | UpdateOutcome::RecoveredToPrevious { .. } => Ok(self),
            UpdateOutcome::BackupFailed { error } => Err(UpdateError::BackupFailed {
                reason: format!("{:#}", error),
            }),
            UpdateOutcome::Unrecoverable { error, .. } => {
                match error.downcast_ref::<CompatibilityError>() {
                    Some(compat) => Err(UpdateError::Compatibility(compat.clone())),
                    None => Err(UpdateError::Unrecoverable {
                        root: root.to_path_buf(),
                        reason: format!("{:#}", error),
                    }),
                }
            }
        }
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOutcome::Updated(report) => write!(
                f,
                "updated to {} (core {}, {})",
                report.config_uri, report.core_uri, report.core_source
            ),
            UpdateOutcome::RecoveredToPrevious { error, backup, .. } => write!(
                f,
                "update failed, previous install restored from {}: {:#}",
                backup, error
            ),
            UpdateOutcome::Unrecoverable { error, .. } => {
                write!(f, "update failed and could not be recovered: {:#}", error)
            }
            UpdateOutcome::BackupFailed { error } => {
                write!(f, "backup failed, update not attempted: {:#}", error)
            }
        }
    }
}

/// Read-only snapshot of an installation root, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub root: PathBuf,
    pub status: ConfigStatus,
    pub metadata: Option<DeployMetadata>,
    pub marker: Option<TransactionMarker>,
    pub config_hash: Option<String>,
    pub core_hash: Option<String>,
    pub backups: Vec<PathBuf>,
}

pub struct ReconciliationEngine {
    spec: ConfigSpec,
    cache: BundleCache,
    writer: Box<dyn ArtifactWriter>,
    pipeline: PipelineMeta,
    span: tracing::Span,
}

impl fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("root", &self.layout().root())
            .field("config", &self.spec.config().uri())
            .finish()
    }
}

impl ReconciliationEngine {
    pub fn new(spec: ConfigSpec, cache: BundleCache, writer: Box<dyn ArtifactWriter>) -> Self {
        let span = tracing::info_span!(
            "tether",
            root = %writer.layout().root().display()
        );
        Self {
            spec,
            cache,
            writer,
            pipeline: PipelineMeta::default(),
            span,
        }
    }

    /// Engine writing straight to `root` on the local filesystem.
    pub fn for_root(root: impl Into<PathBuf>, spec: ConfigSpec, cache: BundleCache) -> Self {
        Self::new(spec, cache, Box::new(FsArtifactWriter::new(root)))
    }

    pub fn with_pipeline(mut self, pipeline: PipelineMeta) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn spec(&self) -> &ConfigSpec {
        &self.spec
    }

    pub fn layout(&self) -> &InstallLayout {
        self.writer.layout()
    }

    pub fn cache(&self) -> &BundleCache {
        &self.cache
    }

    /// Classify the installation root. Never modifies it.
    pub fn status(&self) -> ConfigStatus {
        let _enter = self.span.enter();
        let status = self.classify();
        tracing::debug!(%status, "checked installation");
        status
    }

    fn classify(&self) -> ConfigStatus {
        if !self.writer.manifest_path().exists() {
            return ConfigStatus::Missing;
        }
        if self.writer.is_transaction_pending() {
            tracing::debug!("previous update did not complete");
            return ConfigStatus::Invalid;
        }

        let metadata_path = self.writer.metadata_file_path();
        if !metadata_path.exists() {
            tracing::debug!(path = %metadata_path.display(), "no deploy metadata");
            return ConfigStatus::Invalid;
        }
        let metadata = match DeployMetadata::load(&metadata_path) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!("Ignoring unreadable deploy metadata: {:#}", err);
                return ConfigStatus::Invalid;
            }
        };

        if metadata.deploy_generation != DEPLOY_GENERATION {
            tracing::debug!(
                expected = DEPLOY_GENERATION,
                found = metadata.deploy_generation,
                "deployed by another generation"
            );
            return ConfigStatus::Different;
        }

        let wanted = self.spec.config().identity();
        if &metadata.config_descriptor != wanted {
            tracing::debug!(
                installed = %metadata.config_descriptor,
                wanted = %wanted,
                "installed config differs"
            );
            return ConfigStatus::Different;
        }

        if !self.spec.config().is_immutable() {
            tracing::debug!("config is not pinned, forcing a rebuild");
            return ConfigStatus::Different;
        }

        ConfigStatus::UpToDate
    }

    /// Bring the installation root in line with the spec.
    pub fn update(&mut self) -> UpdateOutcome {
        let span = self.span.clone();
        let _enter = span.enter();

        let config_uri = self.spec.config().uri();
        tracing::info!(uri = %config_uri, "updating configuration");

        if let Err(error) = self.writer.begin_transaction(&config_uri) {
            tracing::error!("Failed to start transaction: {:#}", error);
            return UpdateOutcome::BackupFailed { error };
        }

        let backup = match self.writer.move_to_backup(true) {
            Ok(backup) => backup,
            Err(error) => {
                tracing::error!(
                    "Failed to back up the current installation, keeping it: {:#}",
                    error
                );
                return UpdateOutcome::BackupFailed { error };
            }
        };
        tracing::debug!(%backup, "backed up current installation");

        let outcome = match self.install() {
            Ok(report) => {
                self.remove_backup(&backup);
                UpdateOutcome::Updated(report)
            }
            Err(error) => match self.recover(error, backup) {
                Ok(outcome) => outcome,
                Err(outcome) => return outcome,
            },
        };

        if let Err(error) = self.writer.regenerate_launcher_artifacts() {
            tracing::error!("Failed to write launcher artifacts: {:#}", error);
            return UpdateOutcome::Unrecoverable {
                error,
                stowed: None,
                backup: None,
            };
        }
        if let Err(error) = self.writer.end_transaction() {
            tracing::error!("Failed to clear transaction marker: {:#}", error);
            return UpdateOutcome::Unrecoverable {
                error,
                stowed: None,
                backup: None,
            };
        }

        if let UpdateOutcome::Updated(report) = &outcome {
            tracing::info!(config = %report.config_uri, core = %report.core_uri, "update complete");
        }
        outcome
    }

    /// Scaffold, fetch, gate and write. Any error here is recoverable.
    fn install(&mut self) -> anyhow::Result<UpdateReport> {
        self.writer.scaffold()?;

        self.cache.refresh();
        let config = std::sync::Arc::clone(self.spec.config());
        let config_local = self.cache.ensure_local(config.as_ref())?;
        let core = self.spec.resolve_core(&config_local)?;
        let core_local = self.cache.ensure_local(core.descriptor.as_ref())?;

        log_core_information(&core, &core_local);
        compat::check_compatible(config.identity(), core.descriptor.as_ref())?;

        self.writer.write_config(&config_local)?;
        let metadata = DeployMetadata::current(
            config.identity().clone(),
            Some(core.descriptor.identity().clone()),
        );
        self.writer
            .write_manifest_and_metadata(config.as_ref(), &metadata)?;
        self.writer
            .write_environment_files(config.as_ref(), &self.pipeline)?;
        self.writer.install_core(&core_local)?;

        Ok(UpdateReport {
            config_uri: config.uri(),
            config: config.identity().clone(),
            core_uri: core.descriptor.uri(),
            core: core.descriptor.identity().clone(),
            core_source: core.source.to_string(),
        })
    }

    /// Stow the faulty install and put the backup back.
    ///
    /// `Err` carries a terminal outcome: launcher artifacts are not
    /// regenerated and the marker stays set.
    fn recover(
        &self,
        error: anyhow::Error,
        backup: BackupPaths,
    ) -> Result<UpdateOutcome, UpdateOutcome> {
        let uri = self.spec.config().uri();
        tracing::debug!("Install of {} failed: {:?}", uri, error);

        let stowed = match self.writer.move_to_backup(false) {
            Ok(stowed) => stowed,
            Err(stow_error) => {
                tracing::error!(
                    "Failed to install {}: {:#}. Could not move the partial install aside: {:#}",
                    uri,
                    error,
                    stow_error
                );
                return Err(UpdateOutcome::Unrecoverable {
                    error,
                    stowed: None,
                    backup: Some(backup),
                });
            }
        };

        if !backup.is_complete() {
            tracing::error!(
                %stowed,
                "Failed to install {}: {:#}. No previous install to fall back to",
                uri,
                error
            );
            return Err(UpdateOutcome::Unrecoverable {
                error,
                stowed: Some(stowed),
                backup: Some(backup),
            });
        }

        tracing::error!(
            %stowed,
            %backup,
            "Failed to install {}, continuing with the previous version: {:#}",
            uri,
            error
        );
        if let Err(restore_error) = self.writer.restore_backup(&backup) {
            tracing::error!("Failed to restore previous install: {:#}", restore_error);
            return Err(UpdateOutcome::Unrecoverable {
                error: error.context(format!("{:#}", restore_error)),
                stowed: Some(stowed),
                backup: Some(backup),
            });
        }
        tracing::debug!("previous install restored");

        Ok(UpdateOutcome::RecoveredToPrevious {
            error,
            stowed,
            backup,
        })
    }

    fn remove_backup(&self, backup: &BackupPaths) {
        for path in backup.cleanup_targets() {
            match self.writer.remove_backup(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed backup"),
                Err(err) => tracing::warn!(
                    "Failed to clean up backup folder '{}': {:#}",
                    path.display(),
                    err
                ),
            }
        }
    }

    /// Status plus what the root holds, without modifying it.
    pub fn inspect(&self) -> Inspection {
        let layout = self.layout();
        let status = self.status();
        let _enter = self.span.enter();

        let metadata = DeployMetadata::load(&layout.metadata_path()).ok();
        let marker = TransactionMarker::read(&layout.transaction_path())
            .unwrap_or_else(|err| {
                tracing::warn!("Unreadable transaction marker: {:#}", err);
                None
            });
        let hash_if_dir = |path: PathBuf| path.is_dir().then(|| hash_tree(&path).ok()).flatten();
        let backups = [layout.config_backup_root(), layout.core_backup_root()]
            .iter()
            .filter_map(|dir| fs::read_dir(dir).ok())
            .flat_map(|entries| entries.filter_map(Result::ok).map(|e| e.path()))
            .collect();

        Inspection {
            root: layout.root().to_path_buf(),
            status,
            metadata,
            marker,
            config_hash: hash_if_dir(layout.config_dir()),
            core_hash: hash_if_dir(layout.core_dir()),
            backups,
        }
    }
}

fn log_core_information(core: &ResolvedCore, core_local: &Path) {
    match core.source {
        CoreSource::Default => tracing::debug!(
            core = %core.descriptor.uri(),
            "config does not declare a core, using the default core"
        ),
        source => tracing::debug!(core = %core.descriptor.uri(), %source, "resolved core"),
    }

    let features_path = core_local.join("core").join("features.toml");
    if !features_path.is_file() {
        tracing::debug!("core does not report features");
        return;
    }
    match read_features(&features_path) {
        Ok(features) => tracing::debug!(?features, "core features"),
        Err(err) => tracing::warn!(
            "Core {} could not report its features: {:#}",
            core.descriptor.uri(),
            err
        ),
    }
}

fn read_features(path: &Path) -> anyhow::Result<toml::Table> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_failures_surface_as_compatibility_errors() {
        let error = anyhow::Error::new(CompatibilityError::CoreTooOld {
            required: "v0.18.120".into(),
            found: "v0.18.100".into(),
        })
        .context("while installing");
        let outcome = UpdateOutcome::Unrecoverable {
            error,
            stowed: None,
            backup: None,
        };
        let err = outcome.into_result(Path::new("/r")).unwrap_err();
        assert!(matches!(err, UpdateError::Compatibility(CompatibilityError::CoreTooOld { .. })));
    }

    #[test]
    fn recovered_outcome_is_ok() {
        let outcome = UpdateOutcome::RecoveredToPrevious {
            error: anyhow::anyhow!("disk full"),
            stowed: BackupPaths::default(),
            backup: BackupPaths::default(),
        };
        assert!(!outcome.is_updated());
        assert!(outcome.into_result(Path::new("/r")).is_ok());
    }

    #[test]
    fn backup_failure_is_an_error() {
        let outcome = UpdateOutcome::BackupFailed {
            error: anyhow::anyhow!("permission denied"),
        };
        let err = outcome.into_result(Path::new("/r")).unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }
}
