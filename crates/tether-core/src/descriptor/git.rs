//! Git repository descriptor.

use std::path::Path;

use anyhow::Context;
use git2::Repository;
use git2::build::CheckoutBuilder;

use super::{Descriptor, Identity};

/// A git repository checked out at a tag or a branch.
///
/// Tags are treated as immutable; branches move, so they are not.
#[derive(Debug, Clone)]
pub struct GitDescriptor {
    repo: String,
    reference: String,
    pinned: bool,
    identity: Identity,
}

impl GitDescriptor {
    pub fn new(repo: String, reference: String, pinned: bool) -> Self {
        let identity = if pinned {
            Identity::new("git")
                .with("path", repo.as_str())
                .with("version", reference.as_str())
        } else {
            Identity::new("git_branch")
                .with("path", repo.as_str())
                .with("branch", reference.as_str())
        };
        Self {
            repo,
            reference,
            pinned,
            identity,
        }
    }

    fn candidate_refs(&self) -> [String; 2] {
        let qualified = if self.pinned {
            format!("refs/tags/{}", self.reference)
        } else {
            format!("refs/remotes/origin/{}", self.reference)
        };
        [qualified, self.reference.clone()]
    }

    fn checkout(&self, repo: &Repository) -> anyhow::Result<String> {
        let object = self
            .candidate_refs()
            .iter()
            .find_map(|spec| repo.revparse_single(spec).ok())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Reference '{}' not found in repository {}",
                    self.reference,
                    self.repo
                )
            })?;
        let commit = object
            .peel_to_commit()
            .with_context(|| format!("Reference '{}' is not a commit", self.reference))?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.checkout_tree(commit.as_object(), Some(&mut checkout))
            .with_context(|| format!("Failed to check out '{}'", self.reference))?;
        repo.set_head_detached(commit.id())?;
        Ok(commit.id().to_string())
    }
}

impl Descriptor for GitDescriptor {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn is_immutable(&self) -> bool {
        self.pinned
    }

    fn version(&self) -> Option<&str> {
        self.pinned.then_some(self.reference.as_str())
    }

    fn uri(&self) -> String {
        if self.pinned {
            format!("git:{}@{}", self.repo, self.reference)
        } else {
            format!("git-branch:{}@{}", self.repo, self.reference)
        }
    }

    fn materialize(&self, dest: &Path) -> anyhow::Result<()> {
        let repo = Repository::clone(&self.repo, dest)
            .with_context(|| format!("Failed to clone {}", self.repo))?;
        let commit = self.checkout(&repo)?;
        drop(repo);

        tracing::debug!(repo = %self.repo, reference = %self.reference, %commit, "checked out");
        std::fs::remove_dir_all(dest.join(".git"))
            .with_context(|| format!("Failed to strip .git from {}", dest.display()))?;
        Ok(())
    }
}
