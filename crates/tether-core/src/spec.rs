//! What an installation root should contain: a config bundle plus the core
//! runtime it runs on.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use crate::descriptor::{Descriptor, DescriptorResolver};
use crate::layout::CORE_API_FILE;

/// Where the core for a config came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreSource {
    /// Pinned by the caller next to the config.
    Explicit,
    /// Declared by the bundle in `core/core_api.toml`.
    Declared,
    /// Nothing declared; the configured default core.
    Default,
}

impl fmt::Display for CoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CoreSource::Explicit => "explicit",
            CoreSource::Declared => "declared by config",
            CoreSource::Default => "default",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedCore {
    pub descriptor: Arc<dyn Descriptor>,
    pub source: CoreSource,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CoreApiFile {
    location: String,
}

/// Desired state of an installation root.
///
/// Two specs are equal when their descriptor identities are, wherever
/// the descriptors point on disk.
#[derive(Debug, Clone)]
pub struct ConfigSpec {
    config: Arc<dyn Descriptor>,
    core: Option<Arc<dyn Descriptor>>,
    default_core: Option<Arc<dyn Descriptor>>,
    resolver: DescriptorResolver,
}

impl ConfigSpec {
    pub fn new(config: Arc<dyn Descriptor>, resolver: DescriptorResolver) -> Self {
        Self {
            config,
            core: None,
            default_core: None,
            resolver,
        }
    }

    pub fn with_core(mut self, core: Arc<dyn Descriptor>) -> Self {
        self.core = Some(core);
        self
    }

    pub fn with_default_core(mut self, core: Arc<dyn Descriptor>) -> Self {
        self.default_core = Some(core);
        self
    }

    pub fn config(&self) -> &Arc<dyn Descriptor> {
        &self.config
    }

    pub fn core(&self) -> Option<&Arc<dyn Descriptor>> {
        self.core.as_ref()
    }

    pub fn default_core(&self) -> Option<&Arc<dyn Descriptor>> {
        self.default_core.as_ref()
    }

    /// Core descriptor declared by a fetched config bundle, if any.
    pub fn declared_core(
        &self,
        config_local: &Path,
    ) -> anyhow::Result<Option<Arc<dyn Descriptor>>> {
        let path = config_local.join("core").join(CORE_API_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read core declaration: {}", path.display()))?;
        let declared: CoreApiFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse core declaration: {}", path.display()))?;
        let descriptor = self
            .resolver
            .resolve_str(&declared.location)
            .with_context(|| format!("Invalid core location in {}", path.display()))?;
        Ok(Some(descriptor))
    }

    /// Pick the core to install next to the fetched config at `config_local`.
    pub fn resolve_core(&self, config_local: &Path) -> anyhow::Result<ResolvedCore> {
        if let Some(core) = &self.core {
            return Ok(ResolvedCore {
                descriptor: Arc::clone(core),
                source: CoreSource::Explicit,
            });
        }
        if let Some(descriptor) = self.declared_core(config_local)? {
            return Ok(ResolvedCore {
                descriptor,
                source: CoreSource::Declared,
            });
        }
        if let Some(core) = &self.default_core {
            return Ok(ResolvedCore {
                descriptor: Arc::clone(core),
                source: CoreSource::Default,
            });
        }
        anyhow::bail!(
            "Config {} does not declare a core in core/{} and no default core is configured",
            self.config.uri(),
            CORE_API_FILE
        )
    }
}

impl PartialEq for ConfigSpec {
    fn eq(&self, other: &Self) -> bool {
        let core_identity = |spec: &Self| spec.core.as_ref().map(|c| c.identity().clone());
        self.config.identity() == other.config.identity()
            && core_identity(self) == core_identity(other)
    }
}

impl Eq for ConfigSpec {}
