//! Local bundle cache keyed by descriptor identity.
//!
//! Layout: `<root>/<type>/<identity-hash>/`. Immutable artifacts found on
//! disk are reused across runs. Mutable ones are fetched again once per
//! session; [`BundleCache::refresh`] starts a new session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::descriptor::{Descriptor, Identity};
use crate::fs::{remove_path, unique_sibling_path};

#[derive(Debug)]
pub struct BundleCache {
    root: PathBuf,
    fallback_roots: Vec<PathBuf>,
    fetched: HashMap<Identity, PathBuf>,
}

impl BundleCache {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            fallback_roots: Vec::new(),
            fetched: HashMap::new(),
        }
    }

    /// Read-only caches consulted for immutable artifacts before fetching.
    pub fn with_fallback_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.fallback_roots = roots;
        self
    }

    /// Default cache root.
    ///
    /// - Linux: `$XDG_CACHE_HOME/tether/bundles` (fallback `~/.cache/tether/bundles`)
    /// - macOS: `~/Library/Caches/tether/bundles`
    /// - Windows: `%LOCALAPPDATA%\tether\bundles`
    pub fn default_root() -> anyhow::Result<PathBuf> {
        let base = dirs::cache_dir()
            .or_else(dirs::data_local_dir)
            .ok_or_else(|| anyhow::anyhow!("Cannot determine cache directory"))?;
        Ok(base.join("tether").join("bundles"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fallback_roots(&self) -> &[PathBuf] {
        &self.fallback_roots
    }

    fn entry_path(root: &Path, identity: &Identity) -> PathBuf {
        root.join(identity.kind()).join(identity.cache_key())
    }

    /// Where `descriptor` lives locally, if it is already usable.
    pub fn local_path(&self, descriptor: &dyn Descriptor) -> Option<PathBuf> {
        let identity = descriptor.identity();
        if let Some(path) = self.fetched.get(identity) {
            return path.is_dir().then(|| path.clone());
        }
        if !descriptor.is_immutable() {
            return None;
        }
        std::iter::once(&self.root)
            .chain(self.fallback_roots.iter())
            .map(|root| Self::entry_path(root, identity))
            .find(|path| path.is_dir())
    }

    /// Make sure `descriptor` is present locally and return its path.
    pub fn ensure_local(&mut self, descriptor: &dyn Descriptor) -> anyhow::Result<PathBuf> {
        if let Some(path) = self.local_path(descriptor) {
            tracing::debug!(uri = %descriptor.uri(), path = %path.display(), "bundle cache hit");
            self.fetched
                .insert(descriptor.identity().clone(), path.clone());
            return Ok(path);
        }

        let target = Self::entry_path(&self.root, descriptor.identity());
        let parent = target
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Cache entry has no parent: {}", target.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;

        let staging = unique_sibling_path(&target, "fetch")?;
        if let Err(err) = descriptor.materialize(&staging) {
            let _ = remove_path(&staging);
            return Err(err.context(format!("Failed to fetch {}", descriptor.uri())));
        }

        remove_path(&target)?;
        std::fs::rename(&staging, &target).with_context(|| {
            format!(
                "Failed to move fetched bundle {} into {}",
                staging.display(),
                target.display()
            )
        })?;

        tracing::info!(uri = %descriptor.uri(), path = %target.display(), "fetched bundle");
        self.fetched
            .insert(descriptor.identity().clone(), target.clone());
        Ok(target)
    }

    /// Forget this session's fetches so mutable artifacts are fetched again.
    pub fn refresh(&mut self) {
        self.fetched.clear();
    }
}
