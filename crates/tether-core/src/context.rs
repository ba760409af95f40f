//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};

use crate::cache::BundleCache;
use crate::config::{ConfigStore, TetherConfig};
use crate::descriptor::DescriptorResolver;
use crate::engine::ReconciliationEngine;
use crate::launcher::LauncherRegistry;
use crate::layout::InstallLayout;
use crate::spec::ConfigSpec;
use crate::writer::FsArtifactWriter;

/// Unified application context for dependency injection.
///
/// Built once from a loaded tether.toml; frontends ask it for the engine
/// and its collaborators instead of wiring them by hand.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: TetherConfig,
    cache_dir: PathBuf,
}

impl AppContext {
    /// Create a context; the cache directory falls back to the user cache.
    pub fn new(config: TetherConfig) -> anyhow::Result<Self> {
        let cache_dir = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => BundleCache::default_root()?,
        };
        Ok(Self { config, cache_dir })
    }

    /// Create context with an explicit cache directory (for testing).
    pub fn with_cache_dir(config: TetherConfig, cache_dir: PathBuf) -> Self {
        Self { config, cache_dir }
    }

    pub fn from_store(store: &ConfigStore) -> anyhow::Result<Self> {
        Self::new(store.load()?)
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn layout(&self) -> InstallLayout {
        InstallLayout::new(self.config.root.clone())
    }

    pub fn resolver(&self) -> DescriptorResolver {
        DescriptorResolver::new(self.config.catalog_dir.clone())
    }

    pub fn bundle_cache(&self) -> BundleCache {
        BundleCache::new(self.cache_dir.clone())
            .with_fallback_roots(self.config.pipeline.bundle_cache_fallback_paths.clone())
    }

    /// Resolve the configured locations into a spec.
    pub fn config_spec(&self) -> anyhow::Result<ConfigSpec> {
        let resolver = self.resolver();
        let config = resolver.resolve(&self.config.config_locator()?)?;
        let mut spec = ConfigSpec::new(config, resolver.clone());
        if let Some(locator) = self.config.core_locator()? {
            spec = spec.with_core(resolver.resolve(&locator)?);
        }
        if let Some(locator) = self.config.default_core_locator()? {
            spec = spec.with_default_core(resolver.resolve(&locator)?);
        }
        Ok(spec)
    }

    pub fn writer(&self) -> FsArtifactWriter {
        FsArtifactWriter::new(self.config.root.clone())
    }

    pub fn engine(&self) -> anyhow::Result<ReconciliationEngine> {
        Ok(ReconciliationEngine::new(
            self.config_spec()?,
            self.bundle_cache(),
            Box::new(self.writer()),
        )
        .with_pipeline(self.config.pipeline.clone()))
    }

    /// Launchers shipped by the installed config.
    pub fn launcher_registry(&self) -> anyhow::Result<LauncherRegistry> {
        LauncherRegistry::discover(&self.layout().launchers_dir(), self.root())
    }
}
