//! Descriptors: identities of versioned artifacts and how to fetch them.
//!
//! A descriptor only knows *what* an artifact is and how to materialize it
//! into a directory. Where it lives locally is the business of
//! [`BundleCache`](crate::cache::BundleCache).

mod catalog;
mod git;
mod identity;
mod locator;
mod path;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use catalog::CatalogDescriptor;
pub use git::GitDescriptor;
pub use identity::Identity;
pub use locator::Locator;
pub use path::PathDescriptor;

/// A versioned artifact that can be fetched into a local directory.
pub trait Descriptor: fmt::Debug + Send + Sync {
    /// Structural identity used for equality against deploy metadata.
    fn identity(&self) -> &Identity;

    /// Whether the remote content is fixed for this identity.
    ///
    /// Floating references (local paths, branches, "latest") return false.
    fn is_immutable(&self) -> bool;

    /// Version label of the artifact, when it has one.
    fn version(&self) -> Option<&str> {
        None
    }

    /// Human-readable location, for diagnostics.
    fn uri(&self) -> String;

    /// Write the artifact's content into `dest`, which does not exist yet.
    fn materialize(&self, dest: &Path) -> anyhow::Result<()>;
}

/// Builds descriptors from location specifiers.
#[derive(Debug, Clone, Default)]
pub struct DescriptorResolver {
    catalog_dir: Option<PathBuf>,
}

impl DescriptorResolver {
    pub fn new(catalog_dir: Option<PathBuf>) -> Self {
        Self { catalog_dir }
    }

    pub fn catalog_dir(&self) -> Option<&Path> {
        self.catalog_dir.as_deref()
    }

    pub fn resolve_str(&self, source: &str) -> anyhow::Result<Arc<dyn Descriptor>> {
        let locator = Locator::parse(source)?;
        self.resolve(&locator)
    }

    pub fn resolve(&self, locator: &Locator) -> anyhow::Result<Arc<dyn Descriptor>> {
        match locator {
            Locator::Path { path } => Ok(Arc::new(PathDescriptor::new(path.clone()))),
            Locator::Git {
                repo,
                reference,
                pinned,
            } => Ok(Arc::new(GitDescriptor::new(
                repo.clone(),
                reference.clone(),
                *pinned,
            ))),
            Locator::Catalog { name, id, version } => {
                let catalog_dir = self.catalog_dir.as_deref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Location '{}' needs a catalog directory (set catalog_dir in tether.toml)",
                        locator
                    )
                })?;
                let descriptor =
                    CatalogDescriptor::resolve(catalog_dir, name, *id, version.as_deref())?;
                Ok(Arc::new(descriptor))
            }
        }
    }
}
