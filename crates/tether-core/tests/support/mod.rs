#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use tether_core::cache::BundleCache;
use tether_core::descriptor::{Descriptor, DescriptorResolver};
use tether_core::engine::ReconciliationEngine;
use tether_core::layout::InstallLayout;
use tether_core::metadata::DeployMetadata;
use tether_core::spec::ConfigSpec;
use tether_core::writer::{ArtifactWriter, BackupPaths, FsArtifactWriter, PipelineMeta};

pub const INTERPRETER: &str = "/usr/local/bin/tether";

/// A scratch site: installation root, bundle cache and catalog mirror.
pub struct Site {
    pub tmp: TempDir,
    pub root: PathBuf,
    pub cache_dir: PathBuf,
    pub catalog_dir: PathBuf,
}

impl Site {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("site");
        let cache_dir = tmp.path().join("cache");
        let catalog_dir = tmp.path().join("catalog");
        fs::create_dir_all(&catalog_dir).unwrap();
        Self {
            tmp,
            root,
            cache_dir,
            catalog_dir,
        }
    }

    pub fn layout(&self) -> InstallLayout {
        InstallLayout::new(self.root.clone())
    }

    pub fn resolver(&self) -> DescriptorResolver {
        DescriptorResolver::new(Some(self.catalog_dir.clone()))
    }

    pub fn descriptor(&self, location: &str) -> std::sync::Arc<dyn Descriptor> {
        self.resolver().resolve_str(location).unwrap()
    }

    /// Publish `<name>/<version>.zip` to the catalog mirror.
    pub fn publish(&self, name: &str, version: &str, files: &[(&str, &str)]) {
        let path = self.catalog_dir.join(name).join(format!("{}.zip", version));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    /// Publish a config bundle whose files mention `label`.
    pub fn publish_config(&self, version: &str, label: &str) {
        let settings = format!("label = \"{}\"\n", label);
        self.publish(
            "primary",
            version,
            &[
                ("info.toml", "display_name = \"Primary\"\n"),
                ("env/project.toml", settings.as_str()),
                ("hooks/startup.toml", "enabled = true\n"),
            ],
        );
    }

    /// Publish a core runtime reporting `version`.
    pub fn publish_core(&self, version: &str) {
        let version_file = format!("{}\n", version);
        self.publish(
            "core",
            version,
            &[
                ("VERSION", version_file.as_str()),
                ("core/features.toml", "bootstrap.lean_config.version = 1\n"),
                ("bin/runtime", "#!/bin/sh\n"),
            ],
        );
    }

    pub fn spec(&self, config: &str, core: &str) -> ConfigSpec {
        ConfigSpec::new(self.descriptor(config), self.resolver()).with_core(self.descriptor(core))
    }

    pub fn writer(&self) -> FsArtifactWriter {
        FsArtifactWriter::new(self.root.clone()).with_interpreter(PathBuf::from(INTERPRETER))
    }

    pub fn engine(&self, spec: ConfigSpec) -> ReconciliationEngine {
        self.engine_with_writer(spec, Box::new(self.writer()))
    }

    pub fn engine_with_writer(
        &self,
        spec: ConfigSpec,
        writer: Box<dyn ArtifactWriter>,
    ) -> ReconciliationEngine {
        ReconciliationEngine::new(spec, BundleCache::new(self.cache_dir.clone()), writer)
    }

    /// Engine whose writer fails at `step`.
    pub fn failing_engine(&self, spec: ConfigSpec, step: Step) -> ReconciliationEngine {
        self.engine_with_writer(
            spec,
            Box::new(FailingWriter {
                inner: self.writer(),
                step,
            }),
        )
    }

    pub fn backup_entries(&self) -> Vec<PathBuf> {
        let layout = self.layout();
        [layout.config_backup_root(), layout.core_backup_root()]
            .iter()
            .filter_map(|dir| fs::read_dir(dir).ok())
            .flat_map(|entries| entries.map(|e| e.unwrap().path()))
            .collect()
    }
}

/// Content fingerprint of the installed config and core trees.
pub fn snapshot(layout: &InstallLayout) -> (String, String) {
    (
        tether_core::fs::hash_tree(&layout.config_dir()).unwrap(),
        tether_core::fs::hash_tree(&layout.core_dir()).unwrap(),
    )
}

pub fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    BeginTransaction,
    MoveToBackup,
    WriteConfig,
    InstallCore,
    RegenerateLauncherArtifacts,
    EndTransaction,
}

/// Writer that fails at one step and otherwise writes to disk.
#[derive(Debug)]
pub struct FailingWriter {
    inner: FsArtifactWriter,
    step: Step,
}

impl FailingWriter {
    fn check(&self, step: Step) -> anyhow::Result<()> {
        if self.step == step {
            anyhow::bail!("injected failure at {:?}", step);
        }
        Ok(())
    }
}

impl ArtifactWriter for FailingWriter {
    fn layout(&self) -> &InstallLayout {
        self.inner.layout()
    }

    fn is_transaction_pending(&self) -> bool {
        self.inner.is_transaction_pending()
    }

    fn begin_transaction(&self, config_uri: &str) -> anyhow::Result<()> {
        self.check(Step::BeginTransaction)?;
        self.inner.begin_transaction(config_uri)
    }

    fn end_transaction(&self) -> anyhow::Result<()> {
        self.check(Step::EndTransaction)?;
        self.inner.end_transaction()
    }

    fn move_to_backup(&self, undo_on_error: bool) -> anyhow::Result<BackupPaths> {
        // Only the first, undoable move is the backup; stowing must still work.
        if undo_on_error {
            self.check(Step::MoveToBackup)?;
        }
        self.inner.move_to_backup(undo_on_error)
    }

    fn scaffold(&self) -> anyhow::Result<()> {
        self.inner.scaffold()
    }

    fn write_config(&self, config_local: &Path) -> anyhow::Result<()> {
        self.check(Step::WriteConfig)?;
        self.inner.write_config(config_local)
    }

    fn write_manifest_and_metadata(
        &self,
        config: &dyn Descriptor,
        metadata: &DeployMetadata,
    ) -> anyhow::Result<()> {
        self.inner.write_manifest_and_metadata(config, metadata)
    }

    fn write_environment_files(
        &self,
        config: &dyn Descriptor,
        pipeline: &PipelineMeta,
    ) -> anyhow::Result<()> {
        self.inner.write_environment_files(config, pipeline)
    }

    fn install_core(&self, core_local: &Path) -> anyhow::Result<()> {
        // Fail after a partial copy so there is something to stow.
        if self.step == Step::InstallCore {
            write_file(&self.layout().core_dir().join("partial"), "x");
        }
        self.check(Step::InstallCore)?;
        self.inner.install_core(core_local)
    }

    fn regenerate_launcher_artifacts(&self) -> anyhow::Result<()> {
        self.check(Step::RegenerateLauncherArtifacts)?;
        self.inner.regenerate_launcher_artifacts()
    }

    fn restore_backup(&self, backup: &BackupPaths) -> anyhow::Result<()> {
        self.inner.restore_backup(backup)
    }

    fn remove_backup(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.remove_backup(path)
    }
}
