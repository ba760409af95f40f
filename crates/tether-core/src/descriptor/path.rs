//! Local directory descriptor.

use std::path::{Path, PathBuf};

use super::{Descriptor, Identity};
use crate::fs::copy_tree;

/// A directory on local disk, read in place.
///
/// Its content can change at any time without the identity changing, so it
/// is never immutable.
#[derive(Debug, Clone)]
pub struct PathDescriptor {
    path: PathBuf,
    identity: Identity,
}

impl PathDescriptor {
    pub fn new(path: PathBuf) -> Self {
        let identity = Identity::new("path").with("path", path.to_string_lossy());
        Self { path, identity }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Descriptor for PathDescriptor {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn is_immutable(&self) -> bool {
        false
    }

    fn uri(&self) -> String {
        format!("path:{}", self.path.display())
    }

    fn materialize(&self, dest: &Path) -> anyhow::Result<()> {
        copy_tree(&self.path, dest)
    }
}
