use crate::Result;
use crate::hosting::repo_metadata::parse_iso_date;
use crate::hosting::{
    Batch, CommitHistory, Extraction, ParsedBatch, Provider, ProviderKind, Release, RepoId, RepoMetadata, RepoUpdate, UnreadableEntry,
    YearMonth,
};
use chrono::NaiveDate;
use core::fmt::Write;
use ohno::IntoAppError;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

const LOG_TARGET: &str = "    github";

/// Record fields filled in from GitHub
pub const GITHUB_FIELDS: &[&str] = &["stargazers_count", "updated_at", "archived", "current_release", "commit_history"];

/// GitHub GraphQL provider
///
/// A batch becomes one repository search naming every repository with `repo:` qualifiers. The
/// default branch's commit counts for the trailing `fetch_months` months are requested as aliased
/// `history` connections.
#[derive(Debug, Clone)]
pub struct GitHubProvider {
    endpoint: Url,
    months: Vec<YearMonth>,
}

impl GitHubProvider {
    #[must_use]
    pub fn new(endpoint: Url, today: NaiveDate, fetch_months: u32) -> Self {
        let current = YearMonth::from_date(today);
        let months = (0..fetch_months).filter_map(|i| current.minus_months(i)).collect();
        Self { endpoint, months }
    }

    fn history_fields(&self) -> String {
        self.months.iter().fold(String::new(), |mut out, month| {
            let _ = write!(
                out,
                "\n              {}: history(since: \"{}\", until: \"{}\") {{ totalCount }}",
                month.alias(),
                month.start_timestamp(),
                month.end_timestamp()
            );
            out
        })
    }
}

impl Provider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn target_fields(&self) -> &'static [&'static str] {
        GITHUB_FIELDS
    }

    fn build_batch_query(&self, batch: &Batch) -> String {
        let repos = batch.ids().iter().map(|id| format!("repo:{id}")).collect::<Vec<_>>().join(" ");

        format!(
            r#"{{
  search(type: REPOSITORY, query: "fork:true {repos}", first: {first}) {{
    repos: edges {{
      repo: node {{
        ... on Repository {{
          url
          stargazerCount
          isArchived
          releases(first: 1, orderBy: {{field: CREATED_AT, direction: DESC}}) {{
            edges {{ node {{ tagName publishedAt }} }}
          }}
          defaultBranchRef {{
            target {{
              ... on Commit {{
              committedDate{history}
              }}
            }}
          }}
        }}
      }}
    }}
  }}
}}"#,
            first = batch.len(),
            history = self.history_fields(),
        )
    }

    fn parse_response(&self, batch: &Batch, data: &serde_json::Value) -> Result<ParsedBatch> {
        let response =
            SearchData::deserialize(data).into_app_err_with(|| format!("unexpected GitHub search response for batch {}", batch.label()))?;

        let mut parsed = ParsedBatch::default();
        for (position, edge) in response.search.repos.iter().enumerate() {
            let mut repo = match SearchEdge::deserialize(edge) {
                Ok(SearchEdge { repo: Some(repo) }) => repo,
                Ok(SearchEdge { repo: None }) => continue,
                Err(e) => {
                    let url = edge.pointer("/repo/url").and_then(serde_json::Value::as_str);
                    log::debug!(target: LOG_TARGET, "Unreadable search result {}: {edge}", position + 1);
                    parsed.unreadable.push(UnreadableEntry {
                        id: url.and_then(|u| self.identify(u)),
                        message: format!(
                            "unexpected GitHub repository data for {}: {e}",
                            url.map_or_else(|| format!("search result {}", position + 1), str::to_string)
                        ),
                    });
                    continue;
                }
            };

            let Some(url) = repo.url.take() else {
                log::debug!(target: LOG_TARGET, "Skipping search result without a URL");
                continue;
            };
            parsed.updates.push(self.to_update(url, repo));
        }

        Ok(parsed)
    }
}

impl GitHubProvider {
    fn identify(&self, url: &str) -> Option<RepoId> {
        match self.extract_identifier(url) {
            Extraction::Found(id) => Some(id),
            Extraction::Unverifiable | Extraction::NotExtractable => None,
        }
    }

    fn to_update(&self, url: String, repo: RepoNode) -> RepoUpdate {
        let id = self.identify(&url);

        let target = repo.default_branch_ref.and_then(|r| r.target);
        let updated_at = target.as_ref().and_then(|t| t.committed_date.as_deref()).and_then(parse_iso_date);

        let commit_history = target.map(|t| {
            self.months
                .iter()
                .filter_map(|month| {
                    let count = t.months.get(&month.alias())?.get("totalCount")?.as_u64()?;
                    Some((*month, count))
                })
                .collect::<CommitHistory>()
        });

        let current_release = repo
            .releases
            .and_then(|c| c.edges.into_iter().find_map(|e| e.node))
            .and_then(|node| {
                Some(Release {
                    published_at: node.published_at.as_deref().and_then(parse_iso_date)?,
                    tag: node.tag_name,
                })
            });

        RepoUpdate {
            source: url,
            id,
            metadata: RepoMetadata {
                stargazers_count: repo.stargazer_count.unwrap_or_default(),
                updated_at,
                archived: repo.is_archived.unwrap_or_default(),
                current_release,
                commit_history,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: Search,
}

#[derive(Debug, Deserialize)]
struct Search {
    // Edges are read one at a time so a bad entry only costs itself
    #[serde(default)]
    repos: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchEdge {
    repo: Option<RepoNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoNode {
    url: Option<String>,
    stargazer_count: Option<u64>,
    is_archived: Option<bool>,
    releases: Option<Connection<ReleaseNode>>,
    default_branch_ref: Option<BranchRef>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct Connection<T> {
    #[serde(default)]
    pub(crate) edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Edge<T> {
    pub(crate) node: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseNode {
    tag_name: String,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    target: Option<CommitTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitTarget {
    committed_date: Option<String>,
    #[serde(flatten)]
    months: HashMap<String, serde_json::Value>,
}
