//! End-to-end orchestration: dedup, parallel extraction, persistence, and the
//! aggregate/detect entry points used for reporting.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::data::{
    CanonicalPosting, EmergingSignal, PostingRecord, RawPosting, SalaryRange, TrendBucket,
};
use crate::dedup::{BatchReport, Deduplicator};
use crate::emerging;
use crate::errors::PipelineError;
use crate::metrics::{SourceCoverage, source_coverage};
use crate::salary::SalaryExtractor;
use crate::skills::SkillExtractor;
use crate::store::{InMemoryPostingStore, PostingStore};
use crate::taxonomy::Taxonomy;
use crate::trends::{self, Dimension, TimeRange, WindowSpec};

/// Outcome of one `process_batch` call.
#[derive(Debug, Default)]
pub struct ProcessReport {
    /// Per-record dedup outcomes and rejections.
    pub batch: BatchReport,
    /// Postings whose text was (re-)extracted.
    pub extracted: usize,
    /// Records written to the store.
    pub stored: usize,
    /// Set when the cancel flag stopped the batch early.
    pub cancelled: bool,
}

/// Normalization and analysis pipeline bound to one taxonomy and store.
pub struct Pipeline {
    config: PipelineConfig,
    taxonomy: Arc<Taxonomy>,
    dedup: Deduplicator,
    skills: SkillExtractor,
    salary: SalaryExtractor,
    store: Arc<dyn PostingStore>,
    window: WindowSpec,
    commit: Mutex<()>,
}

impl Pipeline {
    /// Build a pipeline and restore the dedup index from `store`.
    pub fn new(
        config: PipelineConfig,
        taxonomy: Arc<Taxonomy>,
        store: Arc<dyn PostingStore>,
    ) -> Result<Self, PipelineError> {
        let config = config.validated()?;
        let window = config.trends.window_spec()?;
        let skills = SkillExtractor::new(Arc::clone(&taxonomy), config.skills.clone());
        let salary = SalaryExtractor::new(taxonomy.salary(), config.salary.clone())?;
        let dedup = Deduplicator::new(config.dedup.clone(), config.status.clone());
        let existing = store.scan(&TimeRange::all())?;
        dedup.restore(existing.into_iter().map(|record| record.posting));
        info!(
            taxonomy = taxonomy.version(),
            postings = dedup.len(),
            "pipeline ready"
        );
        Ok(Self {
            config,
            taxonomy,
            dedup,
            skills,
            salary,
            store,
            window,
            commit: Mutex::new(()),
        })
    }

    /// Build a pipeline loading the taxonomy named by `config.taxonomy_path`
    /// (the built-in taxonomy when unset).
    pub fn from_config(
        config: PipelineConfig,
        store: Arc<dyn PostingStore>,
    ) -> Result<Self, PipelineError> {
        let taxonomy = match &config.taxonomy_path {
            Some(path) => Taxonomy::load(path)?,
            None => Taxonomy::builtin()?,
        };
        Self::new(config, Arc::new(taxonomy), store)
    }

    /// Pipeline over the built-in taxonomy and a fresh in-memory store.
    pub fn in_memory(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::from_config(config, Arc::new(InMemoryPostingStore::new()))
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Taxonomy used for extraction.
    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Deduplicator holding the canonical index.
    pub fn deduplicator(&self) -> &Deduplicator {
        &self.dedup
    }

    /// Window specification used for aggregation.
    pub fn window(&self) -> &WindowSpec {
        &self.window
    }

    /// Ingest, extract, and persist a batch.
    pub fn process_batch<I>(&self, raws: I) -> Result<ProcessReport, PipelineError>
    where
        I: IntoIterator<Item = RawPosting>,
    {
        self.process_batch_until(raws, &AtomicBool::new(false))
    }

    /// Like [`Pipeline::process_batch`], checking `cancel` between records.
    ///
    /// Records ingested before cancellation are still extracted and stored.
    pub fn process_batch_until<I>(
        &self,
        raws: I,
        cancel: &AtomicBool,
    ) -> Result<ProcessReport, PipelineError>
    where
        I: IntoIterator<Item = RawPosting>,
    {
        let mut report = ProcessReport::default();
        for raw in raws {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                break;
            }
            let id = raw.id();
            match self.dedup.ingest(raw) {
                Ok(outcome) => report.batch.outcomes.push(outcome),
                Err(err) => {
                    warn!(raw_id = %id, error = %err, "raw posting rejected");
                    report.batch.rejected.push((id, err));
                }
            }
        }

        // Commits are serialized and read canonical state under the lock.
        let _commit = self.commit.lock().expect("pipeline commit lock poisoned");
        let postings: Vec<CanonicalPosting> = report
            .batch
            .touched_keys()
            .iter()
            .filter_map(|key| self.dedup.get(key))
            .collect();

        let mut reusable: Vec<PostingRecord> = Vec::new();
        let mut pending: Vec<(CanonicalPosting, Option<PostingRecord>)> = Vec::new();
        for posting in postings {
            match self.store.get(&posting.key)? {
                Some(existing)
                    if existing.posting.extraction_text() == posting.extraction_text() =>
                {
                    reusable.push(PostingRecord {
                        posting,
                        skills: existing.skills,
                        salary: existing.salary,
                    });
                }
                existing => pending.push((posting, existing)),
            }
        }

        let extracted: Vec<PostingRecord> = pending
            .into_par_iter()
            .map(|(posting, existing)| {
                let text = posting.extraction_text();
                let skills = self.skills.extract(&text);
                let salary = self.salary.extract(&text);
                let salary = SalaryRange::merge(
                    existing.and_then(|record| record.salary),
                    salary,
                );
                PostingRecord {
                    posting,
                    skills,
                    salary,
                }
            })
            .collect();
        report.extracted = extracted.len();

        let mut records = reusable;
        records.extend(extracted);
        report.stored = records.len();
        self.store.put_all(records)?;

        info!(
            accepted = report.batch.outcomes.len(),
            rejected = report.batch.rejected.len(),
            extracted = report.extracted,
            stored = report.stored,
            cancelled = report.cancelled,
            "batch processed"
        );
        Ok(report)
    }

    /// Re-infer posting statuses at `now` and persist changes.
    pub fn refresh_statuses(&self, now: DateTime<Utc>) -> Result<usize, PipelineError> {
        let _commit = self.commit.lock().expect("pipeline commit lock poisoned");
        let changed = self.dedup.refresh_statuses(now);
        let mut updated = 0usize;
        for posting in changed {
            if let Some(mut record) = self.store.get(&posting.key)? {
                record.posting = posting;
                self.store.put(record)?;
                updated += 1;
            }
        }
        debug!(updated, "stored statuses refreshed");
        Ok(updated)
    }

    /// Persisted records first seen inside `range`.
    pub fn records(&self, range: &TimeRange) -> Result<Vec<PostingRecord>, PipelineError> {
        self.store.scan(range)
    }

    /// Trend buckets for `dimension` over `range`.
    ///
    /// History before `range` is read so the first bucket has a baseline.
    pub fn aggregate(
        &self,
        dimension: Dimension,
        range: &TimeRange,
    ) -> Result<Vec<TrendBucket>, PipelineError> {
        let history = TimeRange::new(DateTime::<Utc>::MIN_UTC, range.end())?;
        let records = self.store.scan(&history)?;
        Ok(trends::aggregate(&records, dimension, &self.window, range).collect())
    }

    /// Emerging values of `dimension` over `range`.
    pub fn detect_emerging(
        &self,
        dimension: Dimension,
        range: &TimeRange,
    ) -> Result<Vec<EmergingSignal>, PipelineError> {
        let buckets = self.aggregate(dimension, range)?;
        Ok(emerging::detect_emerging(buckets, &self.config.emerging))
    }

    /// Source coverage over every stored record.
    pub fn coverage(&self) -> Result<Option<SourceCoverage>, PipelineError> {
        Ok(source_coverage(&self.store.scan(&TimeRange::all())?))
    }
}
