//! Storage roots declared by a config in `core/roots.toml`.
//!
//! ```toml
//! [work]
//! linux_path = "/studio/work"
//! mac_path = "/Volumes/work"
//! windows_path = 'W:\work'
//! default = true
//!
//! [textures]
//! linux_path = "/studio/textures"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Root used as default when none is flagged and there are several.
pub const LEGACY_DEFAULT_STORAGE_NAME: &str = "primary";

/// Location of the roots file relative to a config directory.
pub const STORAGE_ROOTS_FILE: &str = "core/roots.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRoot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows_path: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_storage_id: Option<u64>,
}

impl StorageRoot {
    /// Path for the running platform.
    pub fn current_os_path(&self) -> Option<PathBuf> {
        let raw = if cfg!(windows) {
            self.windows_path.as_deref()
        } else if cfg!(target_os = "macos") {
            self.mac_path.as_deref()
        } else {
            self.linux_path.as_deref()
        };
        raw.map(PathBuf::from)
    }

    fn normalized(&self) -> Self {
        Self {
            linux_path: self.linux_path.as_deref().and_then(|p| normalize(p, '/')),
            mac_path: self.mac_path.as_deref().and_then(|p| normalize(p, '/')),
            windows_path: self.windows_path.as_deref().and_then(|p| normalize(p, '\\')),
            default: self.default,
            local_storage_id: self.local_storage_id,
        }
    }
}

/// Trim whitespace and trailing separators; empty paths become `None`.
fn normalize(path: &str, separator: char) -> Option<String> {
    let swapped: String = path
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' { separator } else { c })
        .collect();
    let trimmed = swapped.trim_end_matches(separator);
    if trimmed.is_empty() {
        // A bare root ("/") must survive trimming.
        return (!swapped.is_empty()).then(|| separator.to_string());
    }
    Some(trimmed.to_string())
}

#[derive(Debug, Clone)]
pub struct StorageRoots {
    roots_file: PathBuf,
    roots: BTreeMap<String, StorageRoot>,
    default_name: Option<String>,
}

impl StorageRoots {
    /// Whether `config_dir` declares storage roots.
    pub fn defined(config_dir: &Path) -> bool {
        config_dir.join(STORAGE_ROOTS_FILE).is_file()
    }

    pub fn load(config_dir: &Path) -> anyhow::Result<Self> {
        let roots_file = config_dir.join(STORAGE_ROOTS_FILE);
        let content = fs::read_to_string(&roots_file).with_context(|| {
            format!(
                "Storage roots file is missing or unreadable: {}",
                roots_file.display()
            )
        })?;
        let raw: BTreeMap<String, StorageRoot> = toml::from_str(&content).with_context(|| {
            format!("Storage roots file is corrupt: {}", roots_file.display())
        })?;

        let roots: BTreeMap<String, StorageRoot> = raw
            .into_iter()
            .map(|(name, root)| (name, root.normalized()))
            .collect();
        let default_name = pick_default(&roots);

        Ok(Self {
            roots_file,
            roots,
            default_name,
        })
    }

    pub fn roots_file(&self) -> &Path {
        &self.roots_file
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&StorageRoot> {
        self.roots.get(name)
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Default root's path for the running platform.
    pub fn default_path(&self) -> Option<PathBuf> {
        self.default_name
            .as_deref()
            .and_then(|name| self.roots.get(name))
            .and_then(StorageRoot::current_os_path)
    }

    /// Rewrite the roots file in normalized form with a generated header.
    pub fn write(&self) -> anyhow::Result<()> {
        let body = toml::to_string_pretty(&self.roots).context("Failed to serialize roots")?;
        let content = format!(
            "# This file was auto generated by tether.\n\
             # Please do not modify by hand as it may be overwritten at any point.\n\n\
             {}\n# End of file.\n",
            body
        );
        fs::write(&self.roots_file, content)
            .with_context(|| format!("Failed to write roots file: {}", self.roots_file.display()))
    }
}

fn pick_default(roots: &BTreeMap<String, StorageRoot>) -> Option<String> {
    if let Some((name, _)) = roots.iter().find(|(_, root)| root.default) {
        return Some(name.clone());
    }
    if roots.len() == 1 {
        return roots.keys().next().cloned();
    }
    roots
        .contains_key(LEGACY_DEFAULT_STORAGE_NAME)
        .then(|| LEGACY_DEFAULT_STORAGE_NAME.to_string())
}
