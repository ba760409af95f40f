//! Catalog archive descriptor.
//!
//! The catalog mirror is a directory laid out as `<name>/<version>.zip`.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{Descriptor, Identity};
use crate::compat::parse_version;

/// A zipped bundle published to the catalog.
///
/// Pinned to a version it is immutable. Without a version it floats to the
/// newest archive present when resolved.
#[derive(Debug, Clone)]
pub struct CatalogDescriptor {
    name: String,
    id: Option<u64>,
    pinned: bool,
    version: String,
    archive: PathBuf,
    identity: Identity,
}

impl CatalogDescriptor {
    pub fn resolve(
        catalog_dir: &Path,
        name: &str,
        id: Option<u64>,
        version: Option<&str>,
    ) -> anyhow::Result<Self> {
        let bundle_dir = catalog_dir.join(name);
        let resolved = match version {
            Some(v) => v.to_string(),
            None => latest_version(&bundle_dir)?,
        };
        let archive = bundle_dir.join(format!("{}.zip", resolved));
        if !archive.is_file() {
            anyhow::bail!(
                "Catalog bundle '{}' has no version {} ({} not found)",
                name,
                resolved,
                archive.display()
            );
        }

        let mut identity = Identity::new("catalog").with("name", name);
        if let Some(id) = id {
            identity = identity.with("id", id.to_string());
        }
        if let Some(v) = version {
            identity = identity.with("version", v);
        }

        Ok(Self {
            name: name.to_string(),
            id,
            pinned: version.is_some(),
            version: resolved,
            archive,
            identity,
        })
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }
}

impl Descriptor for CatalogDescriptor {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn is_immutable(&self) -> bool {
        self.pinned
    }

    fn version(&self) -> Option<&str> {
        Some(&self.version)
    }

    fn uri(&self) -> String {
        let mut uri = format!("catalog:{}", self.name);
        let mut sep = '?';
        if let Some(id) = self.id {
            uri.push_str(&format!("{}id={}", sep, id));
            sep = '&';
        }
        if self.pinned {
            uri.push_str(&format!("{}version={}", sep, self.version));
        }
        uri
    }

    fn materialize(&self, dest: &Path) -> anyhow::Result<()> {
        let file = fs::File::open(&self.archive)
            .with_context(|| format!("Failed to open archive: {}", self.archive.display()))?;
        let mut archive = zip::ZipArchive::new(file)
            .with_context(|| format!("Failed to read zip archive: {}", self.archive.display()))?;
        fs::create_dir_all(dest)
            .with_context(|| format!("Failed to create extract directory: {}", dest.display()))?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read zip entry {}", i))?;

            // Entries escaping the destination are skipped.
            let Some(relative) = entry.enclosed_name() else {
                continue;
            };
            let outpath = dest.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&outpath).with_context(|| {
                    format!("Failed to create directory: {}", outpath.display())
                })?;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create parent directory: {}", parent.display())
                })?;
            }
            let mut buffer = Vec::new();
            entry
                .read_to_end(&mut buffer)
                .with_context(|| format!("Failed to read zip entry: {}", entry.name()))?;
            fs::write(&outpath, &buffer)
                .with_context(|| format!("Failed to write file: {}", outpath.display()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    fs::set_permissions(&outpath, fs::Permissions::from_mode(mode)).ok();
                }
            }
        }

        Ok(())
    }
}

fn latest_version(bundle_dir: &Path) -> anyhow::Result<String> {
    let entries = fs::read_dir(bundle_dir)
        .with_context(|| format!("Catalog bundle not found: {}", bundle_dir.display()))?;

    let mut best: Option<(semver::Version, String)> = None;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to read dir entry: {}", bundle_dir.display()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("zip") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(parsed) = parse_version(stem) else {
            tracing::debug!(archive = %path.display(), "skipping archive with unparsable version");
            continue;
        };
        if best.as_ref().is_none_or(|(current, _)| parsed > *current) {
            best = Some((parsed, stem.to_string()));
        }
    }

    best.map(|(_, label)| label).ok_or_else(|| {
        anyhow::anyhow!(
            "No versioned archives found in catalog bundle {}",
            bundle_dir.display()
        )
    })
}
