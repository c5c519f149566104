use core::fmt::{Display, Formatter};
use strum::Display as StrumDisplay;

const LOG_TARGET: &str = "    errors";

/// Category of a problem recorded during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// A source-code URL for a known provider could not be parsed
    Extraction,

    /// A request was rejected, or its response was unusable
    Request,

    /// GraphQL reported errors for a request
    #[strum(serialize = "graphql")]
    GraphQl,

    /// A batch kept failing transiently until retries ran out
    TransientExhausted,

    /// A single repository could not be fetched after every retry
    PermanentItem,

    /// A response entry and the catalog disagree
    DataConsistency,

    /// A record could not be written back
    Persist,
}

/// A problem recorded during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub kind: ErrorKind,
    pub message: String,
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Problems accumulated over one run, in the order they happened
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    errors: Vec<RunError>,
}

impl ErrorLog {
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Record a problem, logging it immediately
    pub fn record(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let message = message.into();
        log::error!(target: LOG_TARGET, "{message}");
        self.errors.push(RunError { kind, message });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunError> {
        self.errors.iter()
    }

    /// Number of recorded problems of one kind
    #[must_use]
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<RunError> {
        self.errors
    }
}
