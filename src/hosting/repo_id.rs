use crate::hosting::ProviderKind;
use core::fmt::{Display, Formatter};
use regex::Regex;
use std::sync::LazyLock;

/// `https://github.com/OWNER/REPO` with an optional trailing slash and nothing else
static GITHUB_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https://github\.com/([\w.\-]+)/([\w.\-]+)/?$").expect("invalid regex"));

/// `https://gitlab.com/OWNER/REPO` with an optional trailing slash and nothing else
static GITLAB_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https://gitlab\.com/([\w.\-]+)/([\w.\-]+)/?$").expect("invalid regex"));

/// `https://gitlab.com/GROUP/SUBGROUP/.../PROJECT`
static GITLAB_SUBGROUP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https://gitlab\.com/[\w.\-]+(?:/[\w.\-]+){2,}/?$").expect("invalid regex"));

/// Normalized `owner/repo` identifier of a hosted repository
///
/// The path is lowercased and carries no trailing slash, so identifiers compare equal regardless
/// of how the URL was capitalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId {
    provider: ProviderKind,
    path: String,
}

/// Outcome of parsing a source-code URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The URL names a single repository
    Found(RepoId),

    /// The URL is well formed but cannot be queried in bulk (GitLab sub-group projects)
    Unverifiable,

    /// The URL does not have the expected shape
    NotExtractable,
}

impl RepoId {
    /// Build an identifier from an `owner/repo` path
    #[must_use]
    pub fn new(provider: ProviderKind, path: &str) -> Self {
        Self {
            provider,
            path: normalize(path),
        }
    }

    /// Parse a repository URL for the given provider
    #[must_use]
    pub fn extract(provider: ProviderKind, url: &str) -> Extraction {
        let pattern = match provider {
            ProviderKind::GitHub => &GITHUB_URL,
            ProviderKind::GitLab => &GITLAB_URL,
        };

        if let Some(caps) = pattern.captures(url) {
            let (Some(owner), Some(repo)) = (caps.get(1), caps.get(2)) else {
                return Extraction::NotExtractable;
            };
            return Extraction::Found(Self::new(provider, &format!("{}/{}", owner.as_str(), repo.as_str())));
        }

        // `/-/` separates a GitLab project path from its sub-pages
        if provider == ProviderKind::GitLab && GITLAB_SUBGROUP_URL.is_match(url) && !url.split('/').any(|segment| segment == "-") {
            return Extraction::Unverifiable;
        }

        Extraction::NotExtractable
    }

    /// Normalized `owner/repo` path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Display for RepoId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.path)
    }
}

fn normalize(path: &str) -> String {
    path.trim_end_matches('/').to_lowercase()
}
