//! Location specifiers for descriptors.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// Parsed location specifier of a config bundle or core runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locator {
    /// Local directory, read in place on every fetch.
    Path { path: PathBuf },
    /// Git repository at a tag (`pinned`) or a branch.
    Git {
        repo: String,
        reference: String,
        pinned: bool,
    },
    /// Archive from the catalog mirror.
    Catalog {
        name: String,
        id: Option<u64>,
        version: Option<String>,
    },
}

impl Locator {
    /// Parse a location specifier.
    ///
    /// Supports formats:
    /// - `path:/abs/or/relative/dir`
    /// - `git:https://host/org/repo.git@v1.2.3`
    /// - `git-branch:https://host/org/repo.git@main`
    /// - `catalog:name`
    /// - `catalog:name?id=42&version=v1.2.3`
    pub fn parse(source: &str) -> anyhow::Result<Self> {
        let source = source.trim();
        let (scheme, rest) = source.split_once(':').ok_or_else(|| {
            anyhow::anyhow!(
                "Location '{}' is missing a scheme (path:, git:, git-branch:, catalog:)",
                source
            )
        })?;

        match scheme {
            "path" => {
                if rest.is_empty() {
                    anyhow::bail!("Location '{}' is missing a path", source);
                }
                Ok(Self::Path {
                    path: PathBuf::from(rest),
                })
            }
            "git" | "git-branch" => {
                let (repo, reference) = Self::split_reference(rest).ok_or_else(|| {
                    anyhow::anyhow!("Location '{}' must end with @<reference>", source)
                })?;
                Self::validate_repo(repo)?;
                Ok(Self::Git {
                    repo: repo.to_string(),
                    reference: reference.to_string(),
                    pinned: scheme == "git",
                })
            }
            "catalog" => Self::parse_catalog(source),
            other => anyhow::bail!("Unsupported location scheme '{}' in '{}'", other, source),
        }
    }

    /// Split `repo@ref` at the last `@` so scp-style `git@host:` prefixes survive.
    fn split_reference(rest: &str) -> Option<(&str, &str)> {
        let (repo, reference) = rest.rsplit_once('@')?;
        if repo.is_empty() || reference.is_empty() || reference.contains(':') {
            return None;
        }
        Some((repo, reference))
    }

    fn validate_repo(repo: &str) -> anyhow::Result<()> {
        if repo.contains("://") {
            Url::parse(repo)
                .map_err(|e| anyhow::anyhow!("Invalid repository URL '{}': {}", repo, e))?;
        }
        Ok(())
    }

    fn parse_catalog(source: &str) -> anyhow::Result<Self> {
        let url = Url::parse(source)
            .map_err(|e| anyhow::anyhow!("Invalid catalog location '{}': {}", source, e))?;
        let name = url.path().trim_matches('/').to_string();
        if name.is_empty() {
            anyhow::bail!("Catalog location '{}' is missing a bundle name", source);
        }

        let mut id = None;
        let mut version = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "id" => {
                    let parsed = value.parse::<u64>().map_err(|_| {
                        anyhow::anyhow!("Catalog id must be an integer in '{}'", source)
                    })?;
                    id = Some(parsed);
                }
                "version" => version = Some(value.into_owned()),
                other => anyhow::bail!("Unknown catalog parameter '{}' in '{}'", other, source),
            }
        }

        Ok(Self::Catalog { name, id, version })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Path { path } => write!(f, "path:{}", path.display()),
            Locator::Git {
                repo,
                reference,
                pinned: true,
            } => write!(f, "git:{}@{}", repo, reference),
            Locator::Git {
                repo, reference, ..
            } => write!(f, "git-branch:{}@{}", repo, reference),
            Locator::Catalog { name, id, version } => {
                write!(f, "catalog:{}", name)?;
                let mut sep = '?';
                if let Some(id) = id {
                    write!(f, "{}id={}", sep, id)?;
                    sep = '&';
                }
                if let Some(version) = version {
                    write!(f, "{}version={}", sep, version)?;
                }
                Ok(())
            }
        }
    }
}
