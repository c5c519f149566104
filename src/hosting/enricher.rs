use crate::Result;
use crate::catalog::{RecordStore, StoredRecord};
use crate::config::Config;
use crate::hosting::{
    BatchRunner, ErrorKind, ErrorLog, Extraction, GitHubProvider, GitLabProvider, PauseReason, Provider, RecordIndex, RepoId,
    RetryPolicy, RunError, Sleeper, Transport, YearMonth, plan_batches, reconcile,
};
use chrono::NaiveDate;
use core::fmt::{Debug, Formatter};
use core::time::Duration;
use ohno::IntoAppError;
use std::collections::HashSet;
use url::Url;

/// Log target for the enricher
const LOG_TARGET: &str = "  enricher";

/// API tokens, one per provider
///
/// A provider without a token is skipped.
#[derive(Clone, Default)]
pub struct Credentials {
    pub github: Option<String>,
    pub gitlab: Option<String>,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("github", &self.github.as_ref().map(|_| "<redacted>"))
            .field("gitlab", &self.gitlab.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Settings for one enrichment run
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub metadata_only_missing: bool,
    pub commit_history_fetch_months: u32,
    pub commit_history_clean_months: u32,
    pub batch_size_github: usize,
    pub batch_size_gitlab: usize,
    pub retry: RetryPolicy,
    pub github_endpoint: Url,
    pub gitlab_endpoint: Url,
}

impl EnrichOptions {
    /// Derive run settings from a validated configuration
    ///
    /// # Errors
    ///
    /// Fails if an endpoint URL or the sleep time is unusable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_sleep = Duration::try_from_secs_f64(config.sleep_time).into_app_err_with(|| format!("invalid sleep_time {}", config.sleep_time))?;

        Ok(Self {
            metadata_only_missing: config.metadata_only_missing,
            commit_history_fetch_months: config.commit_history_fetch_months,
            commit_history_clean_months: config.commit_history_clean_months,
            batch_size_github: config.batch_size_github,
            batch_size_gitlab: config.batch_size_gitlab,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_sleep,
            },
            github_endpoint: Url::parse(&config.github_api_url).into_app_err_with(|| format!("invalid github_api_url '{}'", config.github_api_url))?,
            gitlab_endpoint: Url::parse(&config.gitlab_api_url).into_app_err_with(|| format!("invalid gitlab_api_url '{}'", config.gitlab_api_url))?,
        })
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Every non-fatal problem, in the order it happened
    pub errors: Vec<RunError>,

    /// Distinct repositories that were queued for querying
    pub considered: usize,

    /// Records rewritten with fresh metadata
    pub updated: usize,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Enriches catalog records with metadata from GitHub and GitLab
#[derive(Debug)]
pub struct Enricher<T, S> {
    options: EnrichOptions,
    credentials: Credentials,
    transport: T,
    sleeper: S,
    today: NaiveDate,
}

/// Mutable state shared by the batches of one provider
struct Progress<'a> {
    store: &'a RecordStore,
    records: &'a mut [StoredRecord],
    updated: &'a mut HashSet<usize>,
}

impl<T: Transport, S: Sleeper> Enricher<T, S> {
    #[must_use]
    pub const fn new(options: EnrichOptions, credentials: Credentials, transport: T, sleeper: S, today: NaiveDate) -> Self {
        Self {
            options,
            credentials,
            transport,
            sleeper,
            today,
        }
    }

    /// The sleeper pacing this enricher's requests
    #[must_use]
    pub const fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Query every eligible record in the store and write the results back
    ///
    /// GitHub is processed before GitLab. Each record is saved as soon as its batch is answered,
    /// so an aborted run keeps everything enriched up to that point.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read, or if GraphQL rejects a whole batch.
    pub async fn run(&self, store: &RecordStore) -> Result<RunReport> {
        let mut records = store.load_all()?;
        log::info!(target: LOG_TARGET, "Loaded {} records from {}", records.len(), store.dir());

        let mut errors = ErrorLog::new();
        let mut updated = HashSet::new();
        let mut progress = Progress {
            store,
            records: &mut records,
            updated: &mut updated,
        };

        let github = GitHubProvider::new(self.options.github_endpoint.clone(), self.today, self.options.commit_history_fetch_months);
        let gitlab = GitLabProvider::new(self.options.gitlab_endpoint.clone());

        let mut considered = self
            .enrich_with(&github, self.credentials.github.as_deref(), self.options.batch_size_github, &mut progress, &mut errors)
            .await?;
        considered += self
            .enrich_with(&gitlab, self.credentials.gitlab.as_deref(), self.options.batch_size_gitlab, &mut progress, &mut errors)
            .await?;

        log::info!(
            target: LOG_TARGET,
            "Updated {} records from {considered} repositories, {} errors",
            updated.len(),
            errors.len()
        );

        Ok(RunReport {
            errors: errors.into_vec(),
            considered,
            updated: updated.len(),
        })
    }

    async fn enrich_with<P: Provider>(
        &self,
        provider: &P,
        token: Option<&str>,
        batch_size: usize,
        progress: &mut Progress<'_>,
        errors: &mut ErrorLog,
    ) -> Result<usize> {
        let kind = provider.kind();
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            log::warn!(target: LOG_TARGET, "No {kind} token provided, skipping {kind} repositories");
            return Ok(0);
        };

        // Step 1: pick the records this provider is responsible for
        let (index, ids) = self.eligible(provider, progress.records, errors);
        if ids.is_empty() {
            log::info!(target: LOG_TARGET, "No {kind} repositories to process");
            return Ok(0);
        }

        // Step 2: plan and run the batches
        let batches = plan_batches(ids, batch_size);
        let considered = index.len();
        let total = batches.len();
        log::info!(target: LOG_TARGET, "Processing {considered} {kind} repositories in {total} batches");

        let runner = BatchRunner::new(&self.transport, &self.sleeper, token, self.options.retry);
        let current = YearMonth::from_date(self.today);

        for (i, batch) in batches.into_iter().enumerate() {
            if i > 0 {
                self.sleeper.sleep(self.options.retry.base_sleep, PauseReason::BatchPacing).await;
            }

            log::info!(target: LOG_TARGET, "Processing {kind} batch {}/{total} ({} repositories)", i + 1, batch.len());

            // Step 3: reconcile every answered chunk and persist what it touched
            runner
                .run(provider, batch, errors, |chunk, data, errors| {
                    let parsed = match provider.parse_response(chunk, &data) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            errors.record(ErrorKind::Request, format!("batch {}: {e}", chunk.label()));
                            return;
                        }
                    };

                    for entry in &parsed.unreadable {
                        errors.record(ErrorKind::Request, format!("batch {}: {}", chunk.label(), entry.message));
                    }

                    // An unreadable answer was still an answer, so it is not also reported as missing
                    let requested: Vec<RepoId> = chunk.ids().iter().filter(|id| !parsed.is_unreadable(id)).cloned().collect();
                    let result = reconcile(&index, &requested, parsed.updates);
                    result.record_errors(&index, errors);

                    for (position, metadata) in result.matched {
                        let Some(stored) = progress.records.get_mut(position) else {
                            continue;
                        };

                        metadata.apply_to(&mut stored.record, current, self.options.commit_history_clean_months);
                        match progress.store.save(stored) {
                            Ok(()) => {
                                let _ = progress.updated.insert(position);
                            }
                            Err(e) => {
                                let url = stored.record.source_code_url().unwrap_or_else(|| stored.record.name());
                                errors.record(ErrorKind::Persist, format!("could not write record for {url}: {e}"));
                            }
                        }
                    }
                })
                .await?;
        }

        Ok(considered)
    }

    /// Identifiers to query for `provider`, and the records behind each
    fn eligible<P: Provider>(&self, provider: &P, records: &[StoredRecord], errors: &mut ErrorLog) -> (RecordIndex, Vec<RepoId>) {
        let mut index = RecordIndex::new();
        let mut ids = Vec::new();

        for (position, stored) in records.iter().enumerate() {
            let Some(url) = stored.record.source_code_url() else {
                continue;
            };

            if !provider.detect(url) {
                continue;
            }

            if self.options.metadata_only_missing && provider.target_fields().iter().all(|field| stored.record.has_field(field)) {
                continue;
            }

            match provider.extract_identifier(url) {
                Extraction::Found(id) => {
                    index.insert(id.clone(), position, url);
                    ids.push(id);
                }
                Extraction::Unverifiable => {
                    log::info!(target: LOG_TARGET, "Skipping {url}: repositories in sub-groups cannot be verified");
                }
                Extraction::NotExtractable => {
                    errors.record(ErrorKind::Extraction, format!("failed to extract repo identifier from {url}"));
                }
            }
        }

        (index, ids)
    }
}
