//! Compatibility gate between config bundles and core runtimes.

use thiserror::Error;

use crate::descriptor::{Descriptor, Identity};

/// Oldest core able to boot configs uploaded to the catalog by id.
pub const CATALOG_MIN_CORE_VERSION: &str = "v0.18.120";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompatibilityError {
    #[error(
        "Configurations uploaded to the catalog must use core version {required} or later, \
         but the resolved core is {found}. Check core/core_api.toml in the configuration."
    )]
    CoreTooOld { required: String, found: String },

    #[error("Cannot verify core compatibility: core {uri} has no usable version ({reason})")]
    UnknownCoreVersion { uri: String, reason: String },
}

/// Parse a version label such as `v0.18.120`, `1.4` or `2`.
///
/// A leading `v` is dropped and missing minor/patch components are zero.
pub fn parse_version(label: &str) -> anyhow::Result<semver::Version> {
    let trimmed = label.trim();
    let raw = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let core = raw.split(['-', '+']).next().unwrap_or_default();
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, &raw[core.len()..]),
        2 => format!("{}.0{}", core, &raw[core.len()..]),
        _ => raw.to_string(),
    };
    semver::Version::parse(&padded)
        .map_err(|e| anyhow::anyhow!("Invalid version '{}': {}", label, e))
}

/// Whether `core` is older than `min_version`.
pub fn core_version_less_than(core: &dyn Descriptor, min_version: &str) -> anyhow::Result<bool> {
    let label = core
        .version()
        .ok_or_else(|| anyhow::anyhow!("Core {} does not declare a version", core.uri()))?;
    Ok(parse_version(label)? < parse_version(min_version)?)
}

/// Only catalog configs addressed by id need a minimum core.
pub fn requires_min_core(config: &Identity) -> bool {
    config.kind() == "catalog" && config.contains("id")
}

/// Reject config/core pairs that cannot work together.
pub fn check_compatible(
    config: &Identity,
    core: &dyn Descriptor,
) -> Result<(), CompatibilityError> {
    if !requires_min_core(config) {
        return Ok(());
    }

    match core_version_less_than(core, CATALOG_MIN_CORE_VERSION) {
        Ok(false) => Ok(()),
        Ok(true) => Err(CompatibilityError::CoreTooOld {
            required: CATALOG_MIN_CORE_VERSION.to_string(),
            found: core.version().unwrap_or_default().to_string(),
        }),
        Err(err) => Err(CompatibilityError::UnknownCoreVersion {
            uri: core.uri(),
            reason: err.to_string(),
        }),
    }
}
