//! Launcher registry keyed by target name.

use std::path::Path;

use anyhow::Context;

use super::{ManifestLauncher, SoftwareLauncher};

#[derive(Debug, Default)]
pub struct LauncherRegistry {
    launchers: Vec<Box<dyn SoftwareLauncher>>,
}

impl LauncherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated from every `*.toml` manifest in `dir`.
    ///
    /// A missing directory yields an empty registry.
    pub fn discover(dir: &Path, config_root: &Path) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        if !dir.is_dir() {
            return Ok(registry);
        }

        let mut manifests = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read launcher directory: {}", dir.display()))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
            .collect::<Vec<_>>();
        manifests.sort();

        for path in manifests {
            let launcher = ManifestLauncher::load(&path, config_root)?;
            tracing::debug!(name = launcher.name(), path = %path.display(), "loaded launcher");
            registry.register(Box::new(launcher));
        }
        Ok(registry)
    }

    /// Register a launcher, replacing any with the same name.
    pub fn register(&mut self, launcher: Box<dyn SoftwareLauncher>) {
        self.launchers.retain(|l| l.name() != launcher.name());
        self.launchers.push(launcher);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SoftwareLauncher> {
        self.launchers
            .iter()
            .find(|l| l.name() == name)
            .map(|l| l.as_ref())
    }

    pub fn all(&self) -> &[Box<dyn SoftwareLauncher>] {
        &self.launchers
    }

    pub fn names(&self) -> Vec<&str> {
        self.launchers.iter().map(|l| l.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.launchers.is_empty()
    }
}
