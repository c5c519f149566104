//! Retry, backoff and adaptive batch splitting.
//!
//! A batch is posted once. A transient failure (rate limiting, gateway errors, dropped
//! connections) is retried after an exponential backoff: first unchanged, then split into
//! progressively smaller chunks, until single-repository requests either succeed or run out of
//! attempts. The work is driven from an explicit stack so chunks are handled depth-first in order.

use crate::Result;
use crate::hosting::{Batch, ErrorKind, ErrorLog, PostOutcome, Provider, Transport};
use core::time::Duration;
use ohno::bail;

const LOG_TARGET: &str = "     retry";

/// HTTP statuses treated as transient
pub const RETRYABLE_STATUS_CODES: [u16; 4] = [429, 502, 503, 504];

/// Bound on how many times a batch may be split below the original
pub const MAX_SPLIT_DEPTH: usize = 32;

/// Longest single backoff, whatever the attempt number
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Why the runner is pausing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Waiting before retrying a transient failure
    Backoff,

    /// Spacing out the chunks of a split batch
    SplitPacing,

    /// Spacing out top-level batches
    BatchPacing,
}

/// Awaitable pause, so tests can observe the schedule without waiting it out
pub trait Sleeper {
    fn sleep(&self, duration: Duration, reason: PauseReason) -> impl Future<Output = ()> + Send;
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration, reason: PauseReason) {
        log::debug!(target: LOG_TARGET, "Sleeping {:.1}s ({reason:?})", duration.as_secs_f64());
        tokio::time::sleep(duration).await;
    }
}

/// Retry settings shared by every batch of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,

    /// Pause between batches and between split chunks, and the backoff unit
    pub base_sleep: Duration,
}

impl RetryPolicy {
    /// Backoff before retrying a request that failed on `attempt`: `base × 2^(attempt-1)`,
    /// capped at [`MAX_BACKOFF`]
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_sleep.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Number of chunks a batch is split into after failing on `attempt`
    #[must_use]
    pub fn split_parts(attempt: u32, len: usize) -> usize {
        let factor = 1_usize.checked_shl(attempt.saturating_sub(1)).unwrap_or(usize::MAX);
        factor.min(len)
    }
}

/// A pending request on the work stack
#[derive(Debug)]
struct WorkItem {
    batch: Batch,
    attempt: u32,
    depth: usize,

    /// Pause before posting, used for every chunk of a split but the first
    pace_before: bool,
}

/// How a response is handled
enum Classified {
    Data(serde_json::Value),
    Rejected(String),
    GraphQlErrors(Vec<String>),
    Transient { description: String, details: String },
}

/// Executes batches against one provider with retry and splitting
#[derive(Debug)]
pub struct BatchRunner<'a, T, S> {
    transport: &'a T,
    sleeper: &'a S,
    token: &'a str,
    policy: RetryPolicy,
}

impl<'a, T: Transport, S: Sleeper> BatchRunner<'a, T, S> {
    #[must_use]
    pub const fn new(transport: &'a T, sleeper: &'a S, token: &'a str, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            token,
            policy,
        }
    }

    /// Run one top-level batch to completion
    ///
    /// `on_data` receives the `data` member of every successful response, once per chunk that
    /// was actually answered. A batch that was split is never itself passed to `on_data`.
    /// Non-fatal problems are recorded in `errors`.
    ///
    /// # Errors
    ///
    /// Fails when GraphQL reports errors for a whole, unsplit batch, which points at a broken
    /// query or a bad token rather than a bad repository.
    pub async fn run<P, F>(&self, provider: &P, batch: Batch, errors: &mut ErrorLog, mut on_data: F) -> Result<()>
    where
        P: Provider,
        F: FnMut(&Batch, serde_json::Value, &mut ErrorLog),
    {
        let mut stack = vec![WorkItem {
            batch,
            attempt: 1,
            depth: 0,
            pace_before: false,
        }];

        while let Some(item) = stack.pop() {
            if item.pace_before {
                self.sleeper.sleep(self.policy.base_sleep, PauseReason::SplitPacing).await;
            }

            let label = item.batch.label();
            log::debug!(
                target: LOG_TARGET,
                "Posting {} batch {label} ({} repositories, attempt {})",
                provider.kind(),
                item.batch.len(),
                item.attempt
            );

            let query = provider.build_batch_query(&item.batch);
            log::trace!(target: LOG_TARGET, "Query for batch {label}:\n{query}");

            let outcome = self.transport.post(provider.endpoint(), self.token, &query).await;
            match classify(outcome, label) {
                Classified::Data(data) => on_data(&item.batch, data, errors),
                Classified::Rejected(message) => errors.record(ErrorKind::Request, message),
                Classified::GraphQlErrors(messages) => {
                    for message in &messages {
                        errors.record(ErrorKind::GraphQl, format!("batch {label}: {message}"));
                    }

                    // A planned batch is fatal on its first answer whatever its size, so a schema or
                    // token problem aborts even with a batch size of 1. Only a lone repository that is
                    // being re-posted after transient failures is recorded and skipped.
                    if item.depth == 0 && (item.batch.len() > 1 || item.attempt == 1) {
                        bail!("GraphQL errors for {} batch {label}: {}", provider.kind(), messages.join("; "));
                    }
                }
                Classified::Transient { description, details } => {
                    self.handle_transient(item, &description, &details, &mut stack, errors).await;
                }
            }
        }

        Ok(())
    }

    async fn handle_transient(&self, item: WorkItem, description: &str, details: &str, stack: &mut Vec<WorkItem>, errors: &mut ErrorLog) {
        let max_retries = self.policy.max_retries;
        let label = item.batch.label().to_string();

        if item.attempt > max_retries {
            let mut message = format!("batch {label}: GraphQL request failed with {description} after {max_retries} retries");
            if !details.is_empty() {
                message.push_str(" - ");
                message.push_str(details);
            }
            errors.record(ErrorKind::TransientExhausted, message);
            return;
        }

        let backoff = self.policy.backoff(item.attempt);
        log::warn!(
            target: LOG_TARGET,
            "GraphQL request for batch {label} failed with {description} (attempt {}/{max_retries}), waiting {:.1}s",
            item.attempt,
            backoff.as_secs_f64()
        );
        self.sleeper.sleep(backoff, PauseReason::Backoff).await;

        if item.attempt == 1 {
            stack.push(WorkItem {
                attempt: 2,
                pace_before: false,
                ..item
            });
            return;
        }

        if item.batch.len() > 1 && item.depth < MAX_SPLIT_DEPTH {
            let parts = RetryPolicy::split_parts(item.attempt, item.batch.len());
            log::info!(target: LOG_TARGET, "Splitting batch {label} into {parts} smaller chunks (attempt {})", item.attempt);

            let chunks = item.batch.split(parts);
            for (i, chunk) in chunks.into_iter().enumerate().rev() {
                stack.push(WorkItem {
                    batch: chunk,
                    attempt: item.attempt,
                    depth: item.depth + 1,
                    pace_before: i > 0,
                });
            }
            return;
        }

        if item.batch.len() == 1 {
            log::error!(target: LOG_TARGET, "Single repository batch {label} failed on attempt {}", item.attempt);
        }

        if item.attempt < max_retries {
            stack.push(WorkItem {
                attempt: item.attempt + 1,
                pace_before: false,
                ..item
            });
            return;
        }

        match item.batch.ids() {
            [id] => errors.record(
                ErrorKind::PermanentItem,
                format!("failed to fetch metadata for repository {id} after {max_retries} attempts"),
            ),
            ids => errors.record(
                ErrorKind::TransientExhausted,
                format!(
                    "batch {label}: giving up on {} repositories after {} attempts ({description})",
                    ids.len(),
                    item.attempt
                ),
            ),
        }
    }
}

fn classify(outcome: PostOutcome, label: &str) -> Classified {
    match outcome {
        PostOutcome::Failed {
            retryable: true,
            description,
            details,
        } => Classified::Transient { description, details },

        PostOutcome::Failed {
            retryable: false,
            description,
            details,
        } => Classified::Rejected(format!("batch {label}: {description} - {details}")),

        PostOutcome::Response { status, .. } if RETRYABLE_STATUS_CODES.contains(&status) => Classified::Transient {
            description: format!("status {status}"),
            details: String::new(),
        },

        PostOutcome::Response { status, .. } if status != 200 => {
            Classified::Rejected(format!("batch {label}: GraphQL request failed with status {status}"))
        }

        PostOutcome::Response { body, .. } => classify_body(&body, label),
    }
}

fn classify_body(body: &str, label: &str) -> Classified {
    let mut json: serde_json::Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(e) => return Classified::Rejected(format!("batch {label}: invalid JSON response - {e}")),
    };

    if let Some(errors) = json.get("errors").and_then(serde_json::Value::as_array)
        && !errors.is_empty()
    {
        let messages = errors
            .iter()
            .map(|e| e.get("message").and_then(serde_json::Value::as_str).map_or_else(|| e.to_string(), str::to_string))
            .collect();
        return Classified::GraphQlErrors(messages);
    }

    match json.get_mut("data").map(serde_json::Value::take) {
        Some(data) if !data.is_null() => Classified::Data(data),
        _ => Classified::Rejected(format!("batch {label}: response has no data")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::{GitLabProvider, ProviderKind, RepoId};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use url::Url;

    #[derive(Debug, Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<PostOutcome>>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(responses: impl IntoIterator<Item = PostOutcome>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                queries: Mutex::default(),
            }
        }

        fn posts(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    impl Transport for ScriptedTransport {
        async fn post(&self, _endpoint: &Url, _token: &str, query: &str) -> PostOutcome {
            self.queries.lock().unwrap().push(query.to_string());
            self.responses.lock().unwrap().pop_front().unwrap_or_else(|| status(503))
        }
    }

    #[derive(Debug, Default)]
    struct RecordingSleeper {
        pauses: Mutex<Vec<(Duration, PauseReason)>>,
    }

    impl RecordingSleeper {
        fn pauses(&self) -> Vec<(Duration, PauseReason)> {
            self.pauses.lock().unwrap().clone()
        }
    }

    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration, reason: PauseReason) {
            self.pauses.lock().unwrap().push((duration, reason));
        }
    }

    fn status(status: u16) -> PostOutcome {
        PostOutcome::Response {
            status,
            body: String::new(),
            rate_limit: None,
        }
    }

    fn ok(body: &str) -> PostOutcome {
        PostOutcome::Response {
            status: 200,
            body: body.to_string(),
            rate_limit: None,
        }
    }

    fn provider() -> GitLabProvider {
        GitLabProvider::new(Url::parse("https://gitlab.example/api/graphql").unwrap())
    }

    fn batch(n: usize) -> Batch {
        Batch::new("1", (0..n).map(|i| RepoId::new(ProviderKind::GitLab, &format!("group/p{i}"))).collect())
    }

    const POLICY: RetryPolicy = RetryPolicy {
        max_retries: 3,
        base_sleep: Duration::from_secs(5),
    };

    async fn run(transport: &ScriptedTransport, sleeper: &RecordingSleeper, batch: Batch) -> (Result<()>, ErrorLog, Vec<(String, usize)>) {
        let runner = BatchRunner::new(transport, sleeper, "token", POLICY);
        let mut errors = ErrorLog::new();
        let mut answered = Vec::new();
        let result = runner
            .run(&provider(), batch, &mut errors, |b, _, _| answered.push((b.label().to_string(), b.len())))
            .await;
        (result, errors, answered)
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(POLICY.backoff(1), Duration::from_secs(5));
        assert_eq!(POLICY.backoff(2), Duration::from_secs(10));
        assert_eq!(POLICY.backoff(3), Duration::from_secs(20));
        assert_eq!(POLICY.backoff(10), Duration::from_secs(2560));
        assert_eq!(POLICY.backoff(11), MAX_BACKOFF);
        assert_eq!(POLICY.backoff(200), MAX_BACKOFF);

        let long = RetryPolicy {
            max_retries: 3,
            base_sleep: Duration::from_secs(2 * 60 * 60),
        };
        assert_eq!(long.backoff(1), MAX_BACKOFF);
    }

    #[test]
    fn test_split_parts() {
        assert_eq!(RetryPolicy::split_parts(2, 25), 2);
        assert_eq!(RetryPolicy::split_parts(3, 25), 4);
        assert_eq!(RetryPolicy::split_parts(3, 3), 3);
        assert_eq!(RetryPolicy::split_parts(100, 7), 7);
    }

    #[tokio::test]
    async fn test_success_first_time() {
        let transport = ScriptedTransport::new([ok(r#"{"data": {}}"#)]);
        let sleeper = RecordingSleeper::default();

        let (result, errors, answered) = run(&transport, &sleeper, batch(3)).await;
        result.unwrap();
        assert!(errors.is_empty());
        assert_eq!(answered, [("1".to_string(), 3)]);
        assert!(sleeper.pauses().is_empty());
    }

    #[tokio::test]
    async fn test_two_transient_failures_then_success() {
        let transport = ScriptedTransport::new([status(503), status(503), ok(r#"{"data": {}}"#)]);
        let sleeper = RecordingSleeper::default();

        let (result, errors, answered) = run(&transport, &sleeper, batch(1)).await;
        result.unwrap();
        assert!(errors.is_empty());
        assert_eq!(answered.len(), 1);
        assert_eq!(transport.posts(), 3);
        assert_eq!(
            sleeper.pauses(),
            [
                (Duration::from_secs(5), PauseReason::Backoff),
                (Duration::from_secs(10), PauseReason::Backoff)
            ]
        );
    }

    #[tokio::test]
    async fn test_single_repository_gives_up() {
        let transport = ScriptedTransport::new([]);
        let sleeper = RecordingSleeper::default();

        let (result, errors, answered) = run(&transport, &sleeper, batch(1)).await;
        result.unwrap();
        assert!(answered.is_empty());
        assert_eq!(transport.posts(), 3);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.count(ErrorKind::PermanentItem), 1);
        assert_eq!(
            errors.iter().next().unwrap().message,
            "failed to fetch metadata for repository group/p0 after 3 attempts"
        );
    }

    #[tokio::test]
    async fn test_split_after_second_failure() {
        let transport = ScriptedTransport::new([status(502), status(429), ok(r#"{"data": {}}"#), ok(r#"{"data": {}}"#)]);
        let sleeper = RecordingSleeper::default();

        let (result, errors, answered) = run(&transport, &sleeper, batch(4)).await;
        result.unwrap();
        assert!(errors.is_empty());
        assert_eq!(answered, [("1a".to_string(), 2), ("1b".to_string(), 2)]);
        assert_eq!(
            sleeper.pauses(),
            [
                (Duration::from_secs(5), PauseReason::Backoff),
                (Duration::from_secs(10), PauseReason::Backoff),
                (Duration::from_secs(5), PauseReason::SplitPacing)
            ]
        );
    }

    #[tokio::test]
    async fn test_persistent_failure_reports_every_repository_once() {
        let transport = ScriptedTransport::new([]);
        let sleeper = RecordingSleeper::default();

        let (result, errors, answered) = run(&transport, &sleeper, batch(5)).await;
        result.unwrap();
        assert!(answered.is_empty());

        let mut failed: Vec<_> = errors
            .iter()
            .filter(|e| e.kind == ErrorKind::PermanentItem)
            .map(|e| e.message.clone())
            .collect();
        failed.sort();
        let mut expected: Vec<_> = (0..5)
            .map(|i| format!("failed to fetch metadata for repository group/p{i} after 3 attempts"))
            .collect();
        expected.sort();
        assert_eq!(failed, expected);
        assert_eq!(errors.len(), 5);
    }

    #[tokio::test]
    async fn test_non_retryable_status_is_recorded_once() {
        let transport = ScriptedTransport::new([status(401)]);
        let sleeper = RecordingSleeper::default();

        let (result, errors, answered) = run(&transport, &sleeper, batch(2)).await;
        result.unwrap();
        assert!(answered.is_empty());
        assert_eq!(transport.posts(), 1);
        assert_eq!(errors.count(ErrorKind::Request), 1);
        assert_eq!(errors.iter().next().unwrap().message, "batch 1: GraphQL request failed with status 401");
        assert!(sleeper.pauses().is_empty());
    }

    #[tokio::test]
    async fn test_failed_transport_classification() {
        let transport = ScriptedTransport::new([
            PostOutcome::Failed {
                retryable: true,
                description: "timeout".to_string(),
                details: "operation timed out".to_string(),
            },
            PostOutcome::Failed {
                retryable: false,
                description: "decode error".to_string(),
                details: "bad".to_string(),
            },
        ]);
        let sleeper = RecordingSleeper::default();

        let (result, errors, _) = run(&transport, &sleeper, batch(2)).await;
        result.unwrap();
        assert_eq!(transport.posts(), 2);
        assert_eq!(errors.count(ErrorKind::Request), 1);
        assert_eq!(sleeper.pauses().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_when_retries_disabled() {
        let transport = ScriptedTransport::new([]);
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy {
            max_retries: 0,
            ..POLICY
        };

        let runner = BatchRunner::new(&transport, &sleeper, "token", policy);
        let mut errors = ErrorLog::new();
        runner.run(&provider(), batch(2), &mut errors, |_, _, _| {}).await.unwrap();

        assert_eq!(transport.posts(), 1);
        assert_eq!(errors.count(ErrorKind::TransientExhausted), 1);
        assert_eq!(
            errors.iter().next().unwrap().message,
            "batch 1: GraphQL request failed with status 503 after 0 retries"
        );
    }

    #[tokio::test]
    async fn test_graphql_errors_on_whole_batch_are_fatal() {
        let transport = ScriptedTransport::new([ok(r#"{"errors": [{"message": "Field 'x' doesn't exist"}]}"#)]);
        let sleeper = RecordingSleeper::default();

        let (result, errors, _) = run(&transport, &sleeper, batch(3)).await;
        let _ = result.unwrap_err();
        assert_eq!(errors.count(ErrorKind::GraphQl), 1);
    }

    #[tokio::test]
    async fn test_graphql_errors_on_single_repository_batch_are_fatal() {
        let transport = ScriptedTransport::new([ok(r#"{"errors": [{"message": "Bad credentials"}]}"#)]);
        let sleeper = RecordingSleeper::default();

        let (result, errors, answered) = run(&transport, &sleeper, batch(1)).await;
        let _ = result.unwrap_err();
        assert!(answered.is_empty());
        assert_eq!(transport.posts(), 1);
        assert_eq!(errors.count(ErrorKind::GraphQl), 1);
    }

    #[tokio::test]
    async fn test_graphql_errors_on_retried_repository_are_recorded() {
        let transport = ScriptedTransport::new([status(503), ok(r#"{"data": null, "errors": [{"message": "a"}, {"message": "b"}]}"#)]);
        let sleeper = RecordingSleeper::default();

        let (result, errors, answered) = run(&transport, &sleeper, batch(1)).await;
        result.unwrap();
        assert!(answered.is_empty());
        assert_eq!(transport.posts(), 2);
        let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["batch 1: a", "batch 1: b"]);
    }

    #[tokio::test]
    async fn test_graphql_errors_in_split_chunk_are_recorded() {
        let transport = ScriptedTransport::new([
            status(503),
            status(503),
            ok(r#"{"errors": [{"message": "not allowed"}]}"#),
            ok(r#"{"data": {}}"#),
        ]);
        let sleeper = RecordingSleeper::default();

        let (result, errors, answered) = run(&transport, &sleeper, batch(2)).await;
        result.unwrap();
        assert_eq!(answered, [("1b".to_string(), 1)]);
        let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["batch 1a: not allowed"]);
    }

    #[tokio::test]
    async fn test_invalid_json_and_missing_data() {
        let transport = ScriptedTransport::new([ok("<html>"), ok(r#"{"data": null}"#)]);
        let sleeper = RecordingSleeper::default();

        let (_, errors, _) = run(&transport, &sleeper, batch(1)).await;
        assert_eq!(errors.count(ErrorKind::Request), 1);

        let (_, errors, _) = run(&transport, &sleeper, batch(1)).await;
        assert_eq!(errors.iter().next().unwrap().message, "batch 1: response has no data");
    }
}
