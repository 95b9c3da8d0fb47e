use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::PostingRecord;
use crate::types::SourceId;

/// Source coverage and duplication summary over canonical records.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceCoverage {
    /// Canonical postings inspected.
    pub postings: usize,
    /// Raw observations across all postings (provenance entries).
    pub observations: usize,
    /// Postings seen through more than one source.
    pub multi_source_postings: usize,
    /// Share of observations that were duplicates: `1 - postings / observations`.
    pub duplicate_ratio: f64,
    /// Largest per-source share of observations.
    pub max_share: f64,
    /// Largest over smallest per-source observation count.
    pub skew_ratio: f64,
    /// Per-source breakdown, largest first.
    pub per_source: Vec<SourceShare>,
}

/// Per-source contribution to the canonical dataset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceShare {
    /// Source id.
    pub source: SourceId,
    /// Observations contributed by this source.
    pub observations: usize,
    /// Postings this source contributed to.
    pub postings: usize,
    /// Postings only this source saw.
    pub exclusive_postings: usize,
    /// Share of all observations.
    pub share: f64,
}

#[derive(Default)]
struct SourceTally {
    observations: usize,
    postings: usize,
    exclusive: usize,
}

/// Compute coverage metrics from persisted records; `None` when empty.
pub fn source_coverage(records: &[PostingRecord]) -> Option<SourceCoverage> {
    if records.is_empty() {
        return None;
    }
    let mut tallies: BTreeMap<SourceId, SourceTally> = BTreeMap::new();
    let mut observations = 0usize;
    let mut multi_source_postings = 0usize;
    for record in records {
        let provenance = &record.posting.provenance;
        observations += provenance.len();
        let mut sources: Vec<&str> = provenance.iter().map(|id| id.source.as_str()).collect();
        for source in &sources {
            tallies.entry((*source).to_string()).or_default().observations += 1;
        }
        sources.sort_unstable();
        sources.dedup();
        if sources.len() > 1 {
            multi_source_postings += 1;
        }
        for source in &sources {
            let tally = tallies.entry((*source).to_string()).or_default();
            tally.postings += 1;
            if sources.len() == 1 {
                tally.exclusive += 1;
            }
        }
    }

    let postings = records.len();
    let duplicate_ratio = if observations == 0 {
        0.0
    } else {
        1.0 - postings as f64 / observations as f64
    };
    let min = tallies.values().map(|tally| tally.observations).min().unwrap_or(0);
    let max = tallies.values().map(|tally| tally.observations).max().unwrap_or(0);
    let share = |count: usize| {
        if observations == 0 {
            0.0
        } else {
            count as f64 / observations as f64
        }
    };
    let mut per_source: Vec<SourceShare> = tallies
        .into_iter()
        .map(|(source, tally)| SourceShare {
            source,
            observations: tally.observations,
            postings: tally.postings,
            exclusive_postings: tally.exclusive,
            share: share(tally.observations),
        })
        .collect();
    per_source.sort_by(|a, b| {
        b.observations
            .cmp(&a.observations)
            .then_with(|| a.source.cmp(&b.source))
    });

    Some(SourceCoverage {
        postings,
        observations,
        multi_source_postings,
        duplicate_ratio,
        max_share: share(max),
        skew_ratio: if min == 0 {
            f64::INFINITY
        } else {
            max as f64 / min as f64
        },
        per_source,
    })
}
