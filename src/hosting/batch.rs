use crate::hosting::RepoId;
use std::collections::HashSet;

/// Repositories queried together in one round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    label: String,
    ids: Vec<RepoId>,
}

impl Batch {
    #[must_use]
    pub fn new(label: impl Into<String>, ids: Vec<RepoId>) -> Self {
        Self { label: label.into(), ids }
    }

    /// Human-readable name used in logs and error messages, e.g. `3` or `3b`
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn ids(&self) -> &[RepoId] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Cut into `parts` contiguous chunks whose sizes differ by at most one
    ///
    /// Asking for more parts than there are repositories yields single-repository chunks. Chunk
    /// labels extend this batch's label with `a`, `b`, ... (or `.1`, `.2`, ... past 26 chunks).
    #[must_use]
    pub fn split(&self, parts: usize) -> Vec<Self> {
        let parts = parts.clamp(1, self.ids.len().max(1));
        let base = self.ids.len() / parts;
        let extra = self.ids.len() % parts;

        let mut chunks = Vec::with_capacity(parts);
        let mut rest = self.ids.as_slice();
        for i in 0..parts {
            let size = if i < extra { base + 1 } else { base };
            let (head, tail) = rest.split_at(size.min(rest.len()));
            rest = tail;
            chunks.push(Self::new(chunk_label(&self.label, i, parts), head.to_vec()));
        }

        chunks
    }
}

fn chunk_label(parent: &str, index: usize, parts: usize) -> String {
    match u8::try_from(index) {
        Ok(i) if parts <= 26 => format!("{parent}{}", char::from(b'a' + i)),
        _ => format!("{parent}.{}", index + 1),
    }
}

/// Partition identifiers into batches of at most `batch_size`, dropping duplicates
///
/// The first occurrence of each identifier keeps its position. Batches are labelled `1`, `2`, ...
#[must_use]
pub fn plan_batches(ids: impl IntoIterator<Item = RepoId>, batch_size: usize) -> Vec<Batch> {
    let mut seen = HashSet::new();
    let unique: Vec<_> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();

    unique
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(i, chunk)| Batch::new((i + 1).to_string(), chunk.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::ProviderKind;

    fn ids(n: usize) -> Vec<RepoId> {
        (0..n).map(|i| RepoId::new(ProviderKind::GitHub, &format!("owner/repo{i}"))).collect()
    }

    #[test]
    fn test_plan_batches_sizes_and_labels() {
        let batches = plan_batches(ids(7), 3);
        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        let labels: Vec<_> = batches.iter().map(Batch::label).collect();
        assert_eq!(sizes, [3, 3, 1]);
        assert_eq!(labels, ["1", "2", "3"]);
    }

    #[test]
    fn test_plan_batches_deduplicates_in_order() {
        let mut input = ids(3);
        input.insert(1, RepoId::new(ProviderKind::GitHub, "OWNER/repo2"));
        let batches = plan_batches(input, 10);
        let paths: Vec<_> = batches[0].ids().iter().map(RepoId::path).collect();
        assert_eq!(paths, ["owner/repo0", "owner/repo2", "owner/repo1"]);
    }

    #[test]
    fn test_plan_batches_empty() {
        assert!(plan_batches(Vec::new(), 5).is_empty());
    }

    #[test]
    fn test_split_is_near_equal_and_lossless() {
        for len in 1..=20 {
            for parts in 1..=8 {
                let batch = Batch::new("7", ids(len));
                let chunks = batch.split(parts);

                let rejoined: Vec<_> = chunks.iter().flat_map(|c| c.ids().iter().cloned()).collect();
                assert_eq!(rejoined, batch.ids(), "len {len} parts {parts}");
                assert_eq!(chunks.len(), parts.min(len));

                let max = chunks.iter().map(Batch::len).max().unwrap();
                let min = chunks.iter().map(Batch::len).min().unwrap();
                assert!(max - min <= 1);
                assert!(min >= 1);
            }
        }
    }

    #[test]
    fn test_split_labels() {
        let chunks = Batch::new("3", ids(4)).split(2);
        assert_eq!(chunks[0].label(), "3a");
        assert_eq!(chunks[1].label(), "3b");

        let nested = chunks[1].split(2);
        assert_eq!(nested[1].label(), "3bb");

        let many = Batch::new("1", ids(30)).split(30);
        assert_eq!(many[29].label(), "1.30");
    }
}
