//! Scraper-adapter interfaces.
//!
//! Ownership model:
//! - `PostingSource` is the core-facing interface adapters implement; fetching
//!   and parsing per site stay on the adapter side.
//! - `SourceCursor` is owned by the caller between fetches and interpreted only
//!   by the source that produced it.

use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::data::RawPosting;
use crate::errors::PipelineError;
use crate::types::SourceId;

/// JSON-lines file adapter.
pub mod jsonl;

pub use jsonl::JsonLinesPostingSource;

/// Source-owned incremental fetch position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceCursor {
    /// Latest scrape time produced by the source so far.
    pub last_seen: DateTime<Utc>,
    /// Opaque position token used to continue incremental fetches.
    pub revision: u64,
}

/// Result of a single fetch call.
///
/// Pass the returned `cursor` back into the next fetch to continue paging.
#[derive(Clone, Debug)]
pub struct SourceSnapshot {
    /// Raw postings returned by the fetch.
    pub postings: Vec<RawPosting>,
    /// Next cursor to pass into a future fetch.
    pub cursor: SourceCursor,
}

/// Scraper-adapter interface.
///
/// For a fixed backing state and cursor, fetch output should be deterministic.
/// Failures are reported as `SourceUnavailable` and never abort other sources.
pub trait PostingSource: Send + Sync {
    /// Stable source identifier, stamped onto yielded postings whose `source`
    /// is blank. Relaying adapters keep each posting's origin source.
    fn id(&self) -> &str;
    /// Fetch up to `limit` postings after `cursor`.
    fn fetch(
        &self,
        cursor: Option<&SourceCursor>,
        limit: Option<usize>,
    ) -> Result<SourceSnapshot, PipelineError>;
}

/// Next cursor after returning `postings` from position `start`.
pub(crate) fn advance_cursor(
    previous: Option<&SourceCursor>,
    start: usize,
    postings: &[RawPosting],
) -> SourceCursor {
    let last_seen = postings
        .iter()
        .map(|posting| posting.scraped_at)
        .chain(previous.map(|cursor| cursor.last_seen))
        .max()
        .unwrap_or_default();
    SourceCursor {
        last_seen,
        revision: (start + postings.len()) as u64,
    }
}

/// In-memory append-only source for tests and embedding.
#[derive(Debug)]
pub struct InMemoryPostingSource {
    id: SourceId,
    postings: RwLock<Vec<RawPosting>>,
}

impl InMemoryPostingSource {
    /// Create a source from prebuilt postings.
    pub fn new(id: impl Into<SourceId>, postings: Vec<RawPosting>) -> Self {
        Self {
            id: id.into(),
            postings: RwLock::new(postings),
        }
    }

    /// Append a posting; it is returned by the next fetch past the current end.
    pub fn push(&self, posting: RawPosting) {
        self.postings
            .write()
            .expect("in-memory source poisoned")
            .push(posting);
    }

    /// Number of postings held.
    pub fn len(&self) -> usize {
        self.postings.read().expect("in-memory source poisoned").len()
    }

    /// Returns `true` when the source holds no postings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PostingSource for InMemoryPostingSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch(
        &self,
        cursor: Option<&SourceCursor>,
        limit: Option<usize>,
    ) -> Result<SourceSnapshot, PipelineError> {
        let postings = self.postings.read().expect("in-memory source poisoned");
        let total = postings.len();
        let start = cursor
            .map(|cursor| cursor.revision as usize)
            .unwrap_or(0)
            .min(total);
        let max = limit.unwrap_or(total);
        let page: Vec<RawPosting> = postings[start..].iter().take(max).cloned().collect();
        let cursor = advance_cursor(cursor, start, &page);
        Ok(SourceSnapshot {
            postings: page,
            cursor,
        })
    }
}
