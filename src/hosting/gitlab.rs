use crate::Result;
use crate::hosting::github::Connection;
use crate::hosting::repo_metadata::parse_iso_date;
use crate::hosting::{Batch, ParsedBatch, Provider, ProviderKind, Release, RepoId, RepoMetadata, RepoUpdate, UnreadableEntry};
use core::fmt::Write;
use ohno::bail;
use serde::Deserialize;
use std::collections::HashSet;
use url::Url;

const LOG_TARGET: &str = "    gitlab";

/// Record fields filled in from GitLab; it exposes no per-month commit counts
pub const GITLAB_FIELDS: &[&str] = &["stargazers_count", "updated_at", "archived", "current_release"];

const PROJECT_FRAGMENT: &str = "fragment ProjectDetails on Project {
  fullPath
  starCount
  archived
  releases(first: 1, sort: RELEASED_AT_DESC) {
    edges { node { tagName releasedAt } }
  }
  repository {
    tree {
      lastCommit { committedDate }
    }
  }
}";

/// GitLab GraphQL provider
///
/// A batch becomes one document with an aliased `project(fullPath:)` lookup per repository.
#[derive(Debug, Clone)]
pub struct GitLabProvider {
    endpoint: Url,
}

impl GitLabProvider {
    #[must_use]
    pub const fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }
}

/// Turn a project path into a legal GraphQL alias
///
/// Anything outside `[A-Za-z0-9_]` becomes `_`, and aliases that would be empty or start with a
/// digit get a `p` prefix.
#[must_use]
pub fn sanitize_alias(path: &str) -> String {
    let alias: String = path.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
    if alias.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        format!("p{alias}")
    } else {
        alias
    }
}

/// One alias per repository in the batch, unique within the batch
fn batch_aliases(batch: &Batch) -> Vec<(String, &RepoId)> {
    let mut used = HashSet::new();
    batch
        .ids()
        .iter()
        .map(|id| {
            let base = sanitize_alias(id.path());
            let mut alias = base.clone();
            let mut n = 2;
            while !used.insert(alias.clone()) {
                alias = format!("{base}_{n}");
                n += 1;
            }
            (alias, id)
        })
        .collect()
}

impl Provider for GitLabProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn target_fields(&self) -> &'static [&'static str] {
        GITLAB_FIELDS
    }

    fn build_batch_query(&self, batch: &Batch) -> String {
        let mut query = format!("{PROJECT_FRAGMENT}\n\n{{\n");
        for (alias, id) in batch_aliases(batch) {
            let _ = writeln!(query, "  {alias}: project(fullPath: \"{}\") {{ ...ProjectDetails }}", id.path());
        }
        query.push('}');
        query
    }

    fn parse_response(&self, batch: &Batch, data: &serde_json::Value) -> Result<ParsedBatch> {
        let Some(projects) = data.as_object() else {
            bail!("unexpected GitLab response for batch {}: data is not an object", batch.label());
        };

        let mut parsed = ParsedBatch::default();
        for (alias, id) in batch_aliases(batch) {
            let Some(value) = projects.get(&alias).filter(|v| !v.is_null()) else {
                log::debug!(target: LOG_TARGET, "No project returned for {id}");
                continue;
            };

            let project = match Project::deserialize(value) {
                Ok(project) => project,
                Err(e) => {
                    log::debug!(target: LOG_TARGET, "Unreadable project entry '{alias}': {value}");
                    parsed.unreadable.push(UnreadableEntry {
                        id: Some(id.clone()),
                        message: format!("unexpected GitLab project data for {id}: {e}"),
                    });
                    continue;
                }
            };

            let source = project
                .full_path
                .as_deref()
                .map_or_else(|| id.path().to_string(), |p| format!("https://gitlab.com/{p}"));

            parsed.updates.push(RepoUpdate {
                source,
                id: Some(id.clone()),
                metadata: project.into_metadata(),
            });
        }

        Ok(parsed)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Project {
    full_path: Option<String>,
    star_count: Option<u64>,

    // Nullable in the GitLab schema
    archived: Option<bool>,
    releases: Option<Connection<ReleaseNode>>,
    repository: Option<Repository>,
}

impl Project {
    fn into_metadata(self) -> RepoMetadata {
        let updated_at = self
            .repository
            .and_then(|r| r.tree)
            .and_then(|t| t.last_commit)
            .and_then(|c| c.committed_date)
            .as_deref()
            .and_then(parse_iso_date);

        let current_release = self
            .releases
            .and_then(|c| c.edges.into_iter().find_map(|e| e.node))
            .and_then(|node| {
                Some(Release {
                    published_at: node.released_at.as_deref().and_then(parse_iso_date)?,
                    tag: node.tag_name.unwrap_or_default(),
                })
            });

        RepoMetadata {
            stargazers_count: self.star_count.unwrap_or_default(),
            updated_at,
            archived: self.archived.unwrap_or_default(),
            current_release,
            commit_history: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseNode {
    tag_name: Option<String>,
    released_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    tree: Option<Tree>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tree {
    last_commit: Option<LastCommit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastCommit {
    committed_date: Option<String>,
}
