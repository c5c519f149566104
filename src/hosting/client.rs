//! GraphQL transport
//!
//! Minimal HTTP layer that posts a GraphQL document and classifies what came back, leaving all
//! retry decisions to the caller.

use crate::Result;
use core::fmt::{Display, Formatter};
use core::time::Duration;
use reqwest::header::HeaderMap;
use url::Url;

const LOG_TARGET: &str = "    client";

/// Rate-limit counters reported by the hosting service
///
/// GitHub sends `x-ratelimit-*` headers; GitLab sends `ratelimit-*` and names the used count
/// `ratelimit-observed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitInfo {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub used: Option<u64>,
    pub reset: Option<u64>,
}

impl Display for RateLimitInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        fn field(v: Option<u64>) -> String {
            v.map_or_else(|| "-".to_string(), |v| v.to_string())
        }

        write!(
            f,
            "{}/{}/{}/{}",
            field(self.limit),
            field(self.remaining),
            field(self.used),
            field(self.reset)
        )
    }
}

/// What a single POST produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// The server answered, with any status
    Response {
        status: u16,
        body: String,
        rate_limit: Option<RateLimitInfo>,
    },

    /// No usable answer was received
    Failed {
        /// Whether the failure is worth retrying (timeouts, dropped connections, truncated bodies)
        retryable: bool,

        /// Short classification, e.g. `timeout`
        description: String,

        /// Full error text
        details: String,
    },
}

/// Posts GraphQL documents to an endpoint
pub trait Transport {
    fn post(&self, endpoint: &Url, token: &str, query: &str) -> impl Future<Output = PostOutcome> + Send;
}

/// [`Transport`] over a real HTTP client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("catalog-meta/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn post(&self, endpoint: &Url, token: &str, query: &str) -> PostOutcome {
        let request = self
            .client
            .post(endpoint.clone())
            .bearer_auth(token)
            .json(&serde_json::json!({ "query": query }));

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status().as_u16();
        let rate_limit = extract_rate_limit_from_headers(response.headers());
        if let Some(info) = rate_limit {
            log::debug!(target: LOG_TARGET, "Rate limit (Limit/Remain/Used/Reset): {info}");
        }

        match response.text().await {
            Ok(body) => PostOutcome::Response { status, body, rate_limit },
            Err(e) => classify_error(&e),
        }
    }
}

fn classify_error(e: &reqwest::Error) -> PostOutcome {
    let (retryable, description) = if e.is_timeout() {
        (true, "timeout")
    } else if e.is_connect() {
        (true, "connection error")
    } else if e.is_body() {
        (true, "body error")
    } else if e.is_request() {
        (true, "request error")
    } else if e.is_decode() {
        (false, "decode error")
    } else {
        (false, "HTTP client error")
    };

    PostOutcome::Failed {
        retryable,
        description: description.to_string(),
        details: format!("{e:#}"),
    }
}

/// Extract rate limit counters from response headers
///
/// Returns `None` when the response carries none of them.
#[must_use]
pub fn extract_rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let read = |primary: &str, fallback: &str| {
        headers
            .get(primary)
            .or_else(|| headers.get(fallback))
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    };

    let info = RateLimitInfo {
        limit: read("x-ratelimit-limit", "ratelimit-limit"),
        remaining: read("x-ratelimit-remaining", "ratelimit-remaining"),
        used: read("x-ratelimit-used", "ratelimit-observed"),
        reset: read("x-ratelimit-reset", "ratelimit-reset"),
    };

    (info != RateLimitInfo::default()).then_some(info)
}
