//! Configuration schema for tether.toml

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::descriptor::Locator;
use crate::writer::PipelineMeta;

/// Root configuration structure for tether.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    /// Installation root
    pub root: PathBuf,

    /// Config bundle location, e.g. "catalog:primary?version=v1.4.0"
    pub config: String,

    /// Core location pinned next to the config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<String>,

    /// Core used when the bundle declares none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_core: Option<String>,

    /// Bundle cache root (defaults to the user cache directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Local catalog mirror used by `catalog:` locations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_dir: Option<PathBuf>,

    #[serde(default)]
    pub pipeline: PipelineMeta,
}

impl TetherConfig {
    pub fn new(root: PathBuf, config: impl Into<String>) -> Self {
        Self {
            root,
            config: config.into(),
            core: None,
            default_core: None,
            cache_dir: None,
            catalog_dir: None,
            pipeline: PipelineMeta::default(),
        }
    }

    pub fn config_locator(&self) -> anyhow::Result<Locator> {
        Locator::parse(&self.config).context("Invalid `config` location")
    }

    pub fn core_locator(&self) -> anyhow::Result<Option<Locator>> {
        self.core
            .as_deref()
            .map(Locator::parse)
            .transpose()
            .context("Invalid `core` location")
    }

    pub fn default_core_locator(&self) -> anyhow::Result<Option<Locator>> {
        self.default_core
            .as_deref()
            .map(Locator::parse)
            .transpose()
            .context("Invalid `default_core` location")
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.root.as_os_str().is_empty() {
            anyhow::bail!("`root` must not be empty");
        }
        let locators = [
            Some(self.config_locator()?),
            self.core_locator()?,
            self.default_core_locator()?,
        ];
        let needs_catalog = locators
            .iter()
            .flatten()
            .any(|l| matches!(l, Locator::Catalog { .. }));
        if needs_catalog && self.catalog_dir.is_none() {
            anyhow::bail!("`catalog_dir` is required when a catalog: location is used");
        }
        Ok(())
    }
}
