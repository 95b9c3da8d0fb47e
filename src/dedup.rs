//! Posting deduplication.
//!
//! Raw observations resolve to a canonical posting by, in order: an already
//! seen `(source, native id)`, an already seen URL, the exact posting key, then
//! a fuzzy title match within the same normalized company. All writes go
//! through one `RwLock`, so concurrent ingestion of the same key serializes and
//! never creates two postings.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{DedupConfig, StatusConfig};
use crate::constants::dedup::POSTING_KEY_SEPARATOR;
use crate::data::{CanonicalPosting, PostingStatus, RawPosting, RawPostingId};
use crate::errors::PipelineError;
use crate::types::PostingKey;
use crate::utils::{canonical_company, canonical_title, normalize_key_fragment, posting_key};

/// How an ingested observation was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestDisposition {
    /// A new canonical posting was created.
    Created,
    /// The observation joined an existing posting.
    Merged,
    /// The observation was already known; only last-seen moved.
    Refreshed,
}

/// Result of ingesting one raw posting.
#[derive(Clone, Debug, PartialEq)]
pub struct IngestOutcome {
    /// Canonical posting after the ingest.
    pub posting: CanonicalPosting,
    /// What happened.
    pub disposition: IngestDisposition,
}

/// Per-batch ingest summary. Rejected records never reach the index.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Accepted observations in input order.
    pub outcomes: Vec<IngestOutcome>,
    /// Rejected observations with their errors.
    pub rejected: Vec<(RawPostingId, PipelineError)>,
}

impl BatchReport {
    /// Number of outcomes with the given disposition.
    pub fn count(&self, disposition: IngestDisposition) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.disposition == disposition)
            .count()
    }

    /// Distinct posting keys touched by the batch, in first-touch order.
    pub fn touched_keys(&self) -> Vec<PostingKey> {
        let mut seen: IndexMap<&str, ()> = IndexMap::new();
        for outcome in &self.outcomes {
            seen.insert(outcome.posting.key.as_str(), ());
        }
        seen.into_keys().map(str::to_string).collect()
    }
}

/// Thread-safe canonical posting index.
pub struct Deduplicator {
    config: DedupConfig,
    status: StatusConfig,
    index: RwLock<DedupIndex>,
}

#[derive(Default)]
struct DedupIndex {
    postings: IndexMap<PostingKey, CanonicalPosting>,
    by_raw_id: FxHashMap<RawPostingId, PostingKey>,
    by_url: FxHashMap<String, PostingKey>,
    /// Posting keys per normalized company, in creation order.
    by_company: FxHashMap<String, Vec<PostingKey>>,
}

impl Deduplicator {
    /// Create an empty deduplicator.
    pub fn new(config: DedupConfig, status: StatusConfig) -> Self {
        Self {
            config,
            status,
            index: RwLock::new(DedupIndex::default()),
        }
    }

    /// Seed the index with previously persisted postings.
    pub fn restore<I>(&self, postings: I)
    where
        I: IntoIterator<Item = CanonicalPosting>,
    {
        let mut index = self.index.write().expect("dedup index poisoned");
        let mut restored = 0usize;
        for posting in postings {
            index.insert(posting);
            restored += 1;
        }
        debug!(restored, "dedup index restored");
    }

    /// Map one raw posting onto the canonical index.
    pub fn ingest(&self, raw: RawPosting) -> Result<IngestOutcome, PipelineError> {
        let company = canonical_company(&raw.company);
        let title = canonical_title(&raw.title);
        let company_fragment = normalize_key_fragment(&company);
        let title_fragment = normalize_key_fragment(&title);
        if company_fragment.is_empty() {
            return Err(malformed(&raw, "company"));
        }
        if title_fragment.is_empty() {
            return Err(malformed(&raw, "title"));
        }
        let key = posting_key(&company, &title);
        let id = raw.id();

        let mut index = self.index.write().expect("dedup index poisoned");

        if let Some(existing) = index.by_raw_id.get(&id).cloned()
            && let Some(posting) = index.postings.get_mut(&existing)
        {
            if raw.scraped_at > posting.last_seen {
                posting.last_seen = raw.scraped_at;
            }
            posting.status = PostingStatus::Active;
            debug!(raw_id = %id, key = %existing, "known observation refreshed");
            return Ok(IngestOutcome {
                posting: posting.clone(),
                disposition: IngestDisposition::Refreshed,
            });
        }

        let target = raw
            .url
            .as_deref()
            .map(str::trim)
            .and_then(|url| index.by_url.get(url).cloned())
            .or_else(|| index.postings.contains_key(&key).then(|| key.clone()))
            .or_else(|| {
                index.fuzzy_match(
                    &company_fragment,
                    &title_fragment,
                    self.config.title_similarity_threshold,
                )
            });

        match target {
            Some(existing) => {
                let posting = index.merge(&existing, raw)?;
                debug!(key = %existing, incoming = %key, "observation merged");
                Ok(IngestOutcome {
                    posting,
                    disposition: IngestDisposition::Merged,
                })
            }
            None => {
                let posting = new_posting(key, company, title, raw);
                debug!(key = %posting.key, "posting created");
                index.insert(posting.clone());
                Ok(IngestOutcome {
                    posting,
                    disposition: IngestDisposition::Created,
                })
            }
        }
    }

    /// Ingest many raw postings, isolating per-record failures.
    pub fn ingest_batch<I>(&self, raws: I) -> BatchReport
    where
        I: IntoIterator<Item = RawPosting>,
    {
        let mut report = BatchReport::default();
        for raw in raws {
            let id = raw.id();
            match self.ingest(raw) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(err) => {
                    warn!(raw_id = %id, error = %err, "raw posting rejected");
                    report.rejected.push((id, err));
                }
            }
        }
        report
    }

    /// Re-infer every posting's status at `now`; returns postings whose status changed.
    pub fn refresh_statuses(&self, now: DateTime<Utc>) -> Vec<CanonicalPosting> {
        let mut index = self.index.write().expect("dedup index poisoned");
        let mut changed = Vec::new();
        for posting in index.postings.values_mut() {
            let status = PostingStatus::infer(posting.last_seen, now, &self.status);
            if status != posting.status {
                posting.status = status;
                changed.push(posting.clone());
            }
        }
        info!(changed = changed.len(), "posting statuses refreshed");
        changed
    }

    /// Canonical posting by key.
    pub fn get(&self, key: &str) -> Option<CanonicalPosting> {
        let index = self.index.read().expect("dedup index poisoned");
        index.postings.get(key).cloned()
    }

    /// Point-in-time copy of all postings in creation order.
    pub fn snapshot(&self) -> Vec<CanonicalPosting> {
        let index = self.index.read().expect("dedup index poisoned");
        index.postings.values().cloned().collect()
    }

    /// Number of canonical postings.
    pub fn len(&self) -> usize {
        self.index.read().expect("dedup index poisoned").postings.len()
    }

    /// Returns `true` when no posting has been ingested.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DedupIndex {
    fn insert(&mut self, posting: CanonicalPosting) {
        let key = posting.key.clone();
        for id in &posting.provenance {
            self.by_raw_id.insert(id.clone(), key.clone());
        }
        for url in &posting.urls {
            self.by_url.entry(url.clone()).or_insert_with(|| key.clone());
        }
        let company = key
            .split_once(POSTING_KEY_SEPARATOR)
            .map(|(company, _)| company.to_string())
            .unwrap_or_default();
        let keys = self.by_company.entry(company).or_default();
        if !keys.contains(&key) {
            keys.push(key.clone());
        }
        self.postings.insert(key, posting);
    }

    fn fuzzy_match(&self, company: &str, title: &str, threshold: f64) -> Option<PostingKey> {
        let candidates = self.by_company.get(company)?;
        let mut best: Option<(&PostingKey, f64)> = None;
        for key in candidates {
            let Some((_, existing_title)) = key.split_once(POSTING_KEY_SEPARATOR) else {
                continue;
            };
            let score = strsim::normalized_damerau_levenshtein(existing_title, title);
            if score >= threshold && best.is_none_or(|(_, current)| score > current) {
                best = Some((key, score));
            }
        }
        best.map(|(key, _)| key.clone())
    }

    fn merge(&mut self, key: &str, raw: RawPosting) -> Result<CanonicalPosting, PipelineError> {
        let id = raw.id();
        let url = raw.url.as_deref().map(str::trim).filter(|url| !url.is_empty());
        let posting = self
            .postings
            .get_mut(key)
            .ok_or_else(|| PipelineError::Store(format!("posting '{key}' vanished from index")))?;

        if !posting.has_contribution(&id) {
            posting.provenance.push(id.clone());
        }
        if let Some(url) = url
            && !posting.urls.iter().any(|existing| existing == url)
        {
            posting.urls.push(url.to_string());
        }
        posting.first_seen = posting
            .first_seen
            .min(raw.observed_at())
            .min(raw.scraped_at);
        if raw.scraped_at >= posting.latest_scraped_at {
            posting.latest_title = raw.title;
            posting.latest_body = raw.body;
            posting.latest_scraped_at = raw.scraped_at;
        }
        posting.last_seen = posting.last_seen.max(raw.scraped_at);
        posting.status = PostingStatus::Active;
        let merged = posting.clone();

        self.by_raw_id.insert(id, key.to_string());
        if let Some(url) = url {
            self.by_url
                .entry(url.to_string())
                .or_insert_with(|| key.to_string());
        }
        Ok(merged)
    }
}

fn new_posting(key: PostingKey, company: String, title: String, raw: RawPosting) -> CanonicalPosting {
    let first_seen = raw.observed_at().min(raw.scraped_at);
    let urls = raw
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| vec![url.to_string()])
        .unwrap_or_default();
    CanonicalPosting {
        key,
        company,
        title,
        provenance: vec![raw.id()],
        urls,
        first_seen,
        last_seen: raw.scraped_at,
        status: PostingStatus::Active,
        latest_title: raw.title,
        latest_body: raw.body,
        latest_scraped_at: raw.scraped_at,
    }
}

fn malformed(raw: &RawPosting, field: &'static str) -> PipelineError {
    PipelineError::MalformedInput {
        source_id: raw.source.clone(),
        native_id: raw.native_id.clone(),
        field,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    fn raw(source: &str, id: &str, company: &str, title: &str, day: u32) -> RawPosting {
        RawPosting {
            source: source.to_string(),
            native_id: id.to_string(),
            company: company.to_string(),
            title: title.to_string(),
            body: format!("{title} at {company}"),
            posted_at: None,
            scraped_at: at(day),
            url: None,
        }
    }

    fn dedup() -> Deduplicator {
        Deduplicator::new(DedupConfig::default(), StatusConfig::default())
    }

    #[test]
    fn reingesting_same_observation_is_idempotent() {
        let dedup = dedup();
        let first = dedup.ingest(raw("greenhouse", "1", "Acme", "Engineer", 1)).unwrap();
        let again = dedup.ingest(raw("greenhouse", "1", "Acme", "Engineer", 1)).unwrap();
        assert_eq!(first.disposition, IngestDisposition::Created);
        assert_eq!(again.disposition, IngestDisposition::Refreshed);
        assert_eq!(again.posting, first.posting);
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn refresh_moves_last_seen_without_replacing_text() {
        let dedup = dedup();
        dedup.ingest(raw("lever", "7", "Acme", "Engineer", 1)).unwrap();
        let mut later = raw("lever", "7", "Acme", "Engineer", 9);
        later.body = "rewritten body".into();
        let outcome = dedup.ingest(later).unwrap();
        assert_eq!(outcome.disposition, IngestDisposition::Refreshed);
        assert_eq!(outcome.posting.last_seen, at(9));
        assert_eq!(outcome.posting.first_seen, at(1));
        assert_eq!(outcome.posting.latest_body, "Engineer at Acme");
        assert_eq!(outcome.posting.provenance.len(), 1);
    }

    #[test]
    fn cross_source_observations_merge() {
        let dedup = dedup();
        dedup
            .ingest(raw("greenhouse", "a1", "Acme, Inc.", "Sr. Backend Engineer", 2))
            .unwrap();
        let merged = dedup
            .ingest(raw("linkedin", "99", "ACME", "Senior Backend Engineer", 3))
            .unwrap();
        assert_eq!(merged.disposition, IngestDisposition::Merged);
        assert_eq!(merged.posting.key, "acme::senior backend engineer");
        assert_eq!(merged.posting.provenance.len(), 2);
        assert_eq!(merged.posting.latest_body, "Senior Backend Engineer at ACME");
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn near_identical_titles_merge_fuzzily() {
        let dedup = dedup();
        dedup
            .ingest(raw("a", "1", "Globex", "Senior Software Engineer", 1))
            .unwrap();
        let outcome = dedup
            .ingest(raw("b", "2", "Globex", "Senior Sofware Engineer", 2))
            .unwrap();
        assert_eq!(outcome.disposition, IngestDisposition::Merged);
        assert_eq!(outcome.posting.key, "globex::senior software engineer");
    }

    #[test]
    fn same_title_at_different_companies_stays_separate() {
        let dedup = dedup();
        dedup.ingest(raw("a", "1", "Globex", "Data Engineer", 1)).unwrap();
        dedup.ingest(raw("a", "2", "Initech", "Data Engineer", 1)).unwrap();
        dedup.ingest(raw("a", "3", "Globex", "Product Manager", 1)).unwrap();
        assert_eq!(dedup.len(), 3);
    }

    #[test]
    fn blank_fields_are_rejected_before_indexing() {
        let dedup = dedup();
        let err = dedup.ingest(raw("a", "1", "Acme", "   ", 1)).unwrap_err();
        match err {
            PipelineError::MalformedInput { field, native_id, .. } => {
                assert_eq!(field, "title");
                assert_eq!(native_id, "1");
            }
            other => panic!("unexpected error: {other}"),
        }
        let err = dedup.ingest(raw("a", "2", "", "Engineer", 1)).unwrap_err();
        assert!(err.is_per_record());
        assert!(dedup.is_empty());
    }

    #[test]
    fn shared_url_identifies_the_posting() {
        let dedup = dedup();
        let mut first = raw("board", "1", "Acme", "Platform Engineer", 1);
        first.url = Some("https://jobs.acme.test/42".into());
        let mut second = raw("aggregator", "x", "Acme Corporation", "Infra Person", 2);
        second.url = Some(" https://jobs.acme.test/42 ".into());
        dedup.ingest(first).unwrap();
        let outcome = dedup.ingest(second).unwrap();
        assert_eq!(outcome.disposition, IngestDisposition::Merged);
        assert_eq!(outcome.posting.key, "acme::platform engineer");
        assert_eq!(outcome.posting.urls, vec!["https://jobs.acme.test/42"]);
    }

    #[test]
    fn first_and_last_seen_span_contributions() {
        let dedup = dedup();
        let mut early = raw("a", "1", "Acme", "Engineer", 5);
        early.posted_at = Some(at(2));
        dedup.ingest(raw("b", "1", "Acme", "Engineer", 4)).unwrap();
        dedup.ingest(early).unwrap();
        let outcome = dedup.ingest(raw("c", "1", "Acme", "Engineer", 8)).unwrap();
        assert_eq!(outcome.posting.first_seen, at(2));
        assert_eq!(outcome.posting.last_seen, at(8));
        assert_eq!(outcome.posting.latest_scraped_at, at(8));
    }

    #[test]
    fn concurrent_ingest_of_one_key_creates_one_posting() {
        let dedup = dedup();
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let dedup = &dedup;
                scope.spawn(move || {
                    dedup
                        .ingest(raw("src", &worker.to_string(), "Acme", "Engineer", 1))
                        .unwrap();
                });
            }
        });
        let snapshot = dedup.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].provenance.len(), 8);
    }

    #[test]
    fn batch_isolates_rejections() {
        let dedup = dedup();
        let report = dedup.ingest_batch(vec![
            raw("a", "1", "Acme", "Engineer", 1),
            raw("a", "2", "", "Engineer", 1),
            raw("b", "3", "Acme", "Engineer", 2),
            raw("a", "1", "Acme", "Engineer", 3),
        ]);
        assert_eq!(report.count(IngestDisposition::Created), 1);
        assert_eq!(report.count(IngestDisposition::Merged), 1);
        assert_eq!(report.count(IngestDisposition::Refreshed), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0.native_id, "2");
        assert_eq!(report.touched_keys(), vec!["acme::engineer".to_string()]);
    }

    #[test]
    fn statuses_follow_last_seen_age() {
        let dedup = dedup();
        dedup.ingest(raw("a", "1", "Acme", "Engineer", 1)).unwrap();
        dedup.ingest(raw("a", "2", "Globex", "Engineer", 1)).unwrap();
        dedup.ingest(raw("a", "3", "Initech", "Engineer", 1)).unwrap();
        dedup.ingest(raw("a", "2", "Globex", "Engineer", 20)).unwrap();

        let changed = dedup.refresh_statuses(at(1) + Duration::days(50));
        assert_eq!(changed.len(), 3);
        assert_eq!(dedup.get("acme::engineer").unwrap().status, PostingStatus::Closed);
        assert_eq!(dedup.get("globex::engineer").unwrap().status, PostingStatus::Stale);

        dedup.ingest(raw("a", "1", "Acme", "Engineer", 30)).unwrap();
        assert_eq!(dedup.get("acme::engineer").unwrap().status, PostingStatus::Active);
    }

    #[test]
    fn restored_index_keeps_identity() {
        let original = dedup();
        let mut first = raw("a", "1", "Acme", "Engineer", 1);
        first.url = Some("https://acme.test/1".into());
        original.ingest(first).unwrap();

        let restored = dedup();
        restored.restore(original.snapshot());
        let mut by_url = raw("z", "9", "Someone Else", "Other", 2);
        by_url.url = Some("https://acme.test/1".into());
        assert_eq!(
            restored.ingest(raw("a", "1", "Acme", "Engineer", 3)).unwrap().disposition,
            IngestDisposition::Refreshed
        );
        assert_eq!(
            restored.ingest(by_url).unwrap().disposition,
            IngestDisposition::Merged
        );
        assert_eq!(restored.len(), 1);
    }
}
