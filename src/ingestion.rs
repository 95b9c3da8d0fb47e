use crate::data::RawPosting;
use crate::errors::PipelineError;
use crate::pipeline::{Pipeline, ProcessReport};
use crate::source::{PostingSource, SourceCursor, SourceSnapshot};
use crate::types::SourceId;
use std::collections::{HashMap, VecDeque};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Fans refreshes out to every registered source and interleaves the results.
pub struct IngestionManager {
    sources: Vec<SourceState>,
    fetch_limit: Option<usize>,
}

#[derive(Clone, Debug, Default)]
/// Last-refresh telemetry captured per source.
pub struct SourceRefreshStats {
    /// Duration of the most recent refresh in milliseconds.
    pub last_refresh_ms: u128,
    /// Number of postings returned by the most recent refresh.
    pub last_posting_count: usize,
    /// Throughput estimate from the most recent refresh.
    pub last_postings_per_sec: f64,
    /// Last refresh error message, if any.
    pub last_error: Option<String>,
    /// Total refresh failures seen for this source.
    pub error_count: u64,
    /// Postings returned across every successful refresh.
    pub total_postings: u64,
}

struct SourceState {
    source: Box<dyn PostingSource + 'static>,
    cursor: Option<SourceCursor>,
    stats: SourceRefreshStats,
}

type FetchResult = (Result<SourceSnapshot, PipelineError>, Duration);

impl IngestionManager {
    /// Create a manager fetching at most `fetch_limit` postings per source and refresh.
    pub fn new(fetch_limit: Option<usize>) -> Self {
        Self {
            sources: Vec::new(),
            fetch_limit,
        }
    }

    /// Register a source; it starts from the beginning unless a cursor is loaded.
    pub fn register_source(&mut self, source: Box<dyn PostingSource + 'static>) {
        self.sources.push(SourceState {
            source,
            cursor: None,
            stats: SourceRefreshStats::default(),
        });
    }

    /// Returns `true` when at least one source is registered.
    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Load persisted per-source cursors. Unknown source ids are ignored.
    pub fn load_cursors(&mut self, cursors: &[(SourceId, SourceCursor)]) {
        if cursors.is_empty() {
            return;
        }
        let map: HashMap<&str, &SourceCursor> = cursors
            .iter()
            .map(|(id, cursor)| (id.as_str(), cursor))
            .collect();
        for state in &mut self.sources {
            if let Some(cursor) = map.get(state.source.id()) {
                state.cursor = Some((*cursor).clone());
            }
        }
    }

    /// Snapshot current per-source cursors.
    pub fn snapshot_cursors(&self) -> Vec<(SourceId, SourceCursor)> {
        self.sources
            .iter()
            .filter_map(|state| {
                state
                    .cursor
                    .as_ref()
                    .map(|cursor| (state.source.id().to_string(), cursor.clone()))
            })
            .collect()
    }

    /// Return latest refresh telemetry for each registered source.
    pub fn source_refresh_stats(&self) -> Vec<(SourceId, SourceRefreshStats)> {
        self.sources
            .iter()
            .map(|state| (state.source.id().to_string(), state.stats.clone()))
            .collect()
    }

    /// Fetch from every source concurrently and return new postings.
    ///
    /// Postings with a blank `source` take the id of the source that produced
    /// them; a non-blank `source` is kept as delivered. Postings are
    /// interleaved round-robin in registration order. A failing or panicking
    /// source is recorded in its stats and contributes nothing; its cursor
    /// does not move.
    pub fn refresh_all(&mut self) -> Vec<RawPosting> {
        let (batch, cursors) = self.fetch_staged();
        self.commit_cursors(cursors);
        batch
    }

    /// Refresh every source and feed the new postings through `pipeline`.
    ///
    /// Source cursors advance only after the pipeline commits the batch, so a
    /// failed commit re-delivers the same postings on the next refresh.
    pub fn refresh_into(&mut self, pipeline: &Pipeline) -> Result<ProcessReport, PipelineError> {
        let (batch, cursors) = self.fetch_staged();
        let report = pipeline.process_batch(batch)?;
        self.commit_cursors(cursors);
        Ok(report)
    }

    fn commit_cursors(&mut self, cursors: Vec<(usize, SourceCursor)>) {
        for (idx, cursor) in cursors {
            self.sources[idx].cursor = Some(cursor);
        }
    }

    /// Fetch every source, returning the interleaved batch and the cursors
    /// each successful source would advance to.
    fn fetch_staged(&mut self) -> (Vec<RawPosting>, Vec<(usize, SourceCursor)>) {
        let mut results: Vec<Option<FetchResult>> = Vec::with_capacity(self.sources.len());
        results.resize_with(self.sources.len(), || None);
        let fetch_limit = self.fetch_limit;
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.sources.len());
            for (idx, state) in self.sources.iter().enumerate() {
                let source = &state.source;
                let cursor = state.cursor.clone();
                handles.push((
                    idx,
                    scope.spawn(move || {
                        let start = Instant::now();
                        let result = source.fetch(cursor.as_ref(), fetch_limit);
                        (result, start.elapsed())
                    }),
                ));
            }
            for (idx, handle) in handles {
                let result = match handle.join() {
                    Ok((result, elapsed)) => {
                        debug!(
                            source_id = %self.sources[idx].source.id(),
                            refresh_ms = elapsed.as_millis(),
                            "source refresh completed"
                        );
                        (result, elapsed)
                    }
                    Err(_) => (
                        Err(PipelineError::SourceUnavailable {
                            source_id: self.sources[idx].source.id().to_string(),
                            reason: "source refresh thread panicked".into(),
                        }),
                        Duration::from_secs(0),
                    ),
                };
                results[idx] = Some(result);
            }
        });

        let mut buffers: Vec<VecDeque<RawPosting>> = Vec::with_capacity(self.sources.len());
        let mut staged = Vec::with_capacity(self.sources.len());
        for (idx, result) in results.into_iter().enumerate() {
            let state = &mut self.sources[idx];
            let Some((result, elapsed)) = result else {
                buffers.push(VecDeque::new());
                continue;
            };
            match result {
                Ok(SourceSnapshot { postings, cursor }) => {
                    let posting_count = postings.len();
                    let seconds = elapsed.as_secs_f64();
                    let per_sec = if seconds > 0.0 {
                        posting_count as f64 / seconds
                    } else {
                        0.0
                    };
                    let stats = &mut state.stats;
                    stats.last_refresh_ms = elapsed.as_millis();
                    stats.last_posting_count = posting_count;
                    stats.last_postings_per_sec = per_sec;
                    stats.last_error = None;
                    stats.total_postings = stats.total_postings.saturating_add(posting_count as u64);
                    debug!(
                        source_id = %state.source.id(),
                        posting_count,
                        postings_per_sec = per_sec,
                        "source refresh fetched postings"
                    );
                    let source_id = state.source.id().to_string();
                    buffers.push(
                        postings
                            .into_iter()
                            .map(|mut posting| {
                                if posting.source.trim().is_empty() {
                                    posting.source = source_id.clone();
                                }
                                posting
                            })
                            .collect(),
                    );
                    staged.push((idx, cursor));
                }
                Err(err) => {
                    let stats = &mut state.stats;
                    stats.last_refresh_ms = elapsed.as_millis();
                    stats.last_posting_count = 0;
                    stats.last_postings_per_sec = 0.0;
                    stats.last_error = Some(err.to_string());
                    stats.error_count = stats.error_count.saturating_add(1);
                    warn!(
                        source_id = %state.source.id(),
                        error = %err,
                        "source refresh failed"
                    );
                    buffers.push(VecDeque::new());
                }
            }
        }

        let mut batch = Vec::with_capacity(buffers.iter().map(VecDeque::len).sum());
        let mut any_remaining = true;
        while any_remaining {
            any_remaining = false;
            for buffer in buffers.iter_mut() {
                if let Some(posting) = buffer.pop_front() {
                    batch.push(posting);
                    any_remaining = true;
                }
            }
        }
        (batch, staged)
    }
}
