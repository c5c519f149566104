use crate::Result;
use crate::hosting::{Batch, Extraction, ProviderKind, RepoId, RepoMetadata};
use url::Url;

/// Metadata for one repository found in a batch response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUpdate {
    /// How the response named the repository (its URL or path)
    pub source: String,

    /// Normalized identifier, or `None` when `source` could not be parsed
    pub id: Option<RepoId>,

    pub metadata: RepoMetadata,
}

/// A response entry that was present but could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableEntry {
    /// Repository the entry was returned for, when it could be told
    pub id: Option<RepoId>,

    pub message: String,
}

/// Everything one batch response said, entry by entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBatch {
    pub updates: Vec<RepoUpdate>,
    pub unreadable: Vec<UnreadableEntry>,
}

impl ParsedBatch {
    /// Requested identifiers the response answered with something unreadable
    #[must_use]
    pub fn is_unreadable(&self, id: &RepoId) -> bool {
        self.unreadable.iter().any(|entry| entry.id.as_ref() == Some(id))
    }
}

/// A code-hosting service queried in bulk through GraphQL
pub trait Provider {
    fn kind(&self) -> ProviderKind;

    /// GraphQL endpoint queries are posted to
    fn endpoint(&self) -> &Url;

    /// Record fields this provider fills in
    fn target_fields(&self) -> &'static [&'static str];

    /// Whether the URL points at this provider's host
    fn detect(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|u| u.host_str() == Some(self.kind().host()))
    }

    /// Parse a repository URL into a normalized identifier
    fn extract_identifier(&self, url: &str) -> Extraction {
        RepoId::extract(self.kind(), url)
    }

    /// Build the single GraphQL document covering every repository in the batch
    fn build_batch_query(&self, batch: &Batch) -> String;

    /// Turn the `data` member of a successful response into per-repository updates
    ///
    /// An entry that cannot be read is set aside in [`ParsedBatch::unreadable`] without
    /// affecting its siblings.
    ///
    /// # Errors
    ///
    /// Fails if the data as a whole does not have the shape the query asked for.
    fn parse_response(&self, batch: &Batch, data: &serde_json::Value) -> Result<ParsedBatch>;
}
