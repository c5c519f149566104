//! Metadata enrichment from code-hosting services.
//!
//! Records whose `source_code_url` points at GitHub or GitLab are grouped into batches and
//! queried through each service's GraphQL API. Responses are matched back to the records that
//! asked for them, and the fetched star counts, activity dates, releases and monthly commit
//! counts are written into those records.

mod batch;
mod client;
mod commit_history;
mod enricher;
mod error_log;
mod github;
mod gitlab;
mod provider;
mod provider_kind;
mod reconcile;
mod repo_id;
mod repo_metadata;
mod retry;
mod year_month;

pub use batch::{Batch, plan_batches};
pub use client::{HttpTransport, PostOutcome, RateLimitInfo, Transport, extract_rate_limit_from_headers};
pub use commit_history::CommitHistory;
pub use enricher::{Credentials, EnrichOptions, Enricher, RunReport};
pub use error_log::{ErrorKind, ErrorLog, RunError};
pub use github::{GITHUB_FIELDS, GitHubProvider};
pub use gitlab::{GITLAB_FIELDS, GitLabProvider, sanitize_alias};
pub use provider::{ParsedBatch, Provider, RepoUpdate, UnreadableEntry};
pub use provider_kind::ProviderKind;
pub use reconcile::{RecordIndex, Reconciliation, reconcile};
pub use repo_id::{Extraction, RepoId};
pub use repo_metadata::{Release, RepoMetadata, parse_iso_date};
pub use retry::{BatchRunner, MAX_BACKOFF, MAX_SPLIT_DEPTH, PauseReason, RETRYABLE_STATUS_CODES, RetryPolicy, Sleeper, TokioSleeper};
pub use year_month::YearMonth;
