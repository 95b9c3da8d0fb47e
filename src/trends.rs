//! Windowed trend aggregation over persisted posting records.
//!
//! Windows are fixed-size and aligned to a configurable epoch, so the same
//! timestamp always lands in the same window regardless of the query range.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::constants::trends::{DEFAULT_WINDOW_DAYS, DEFAULT_WINDOW_EPOCH_SECS, SKILL_PAIR_SEPARATOR};
use crate::data::{PostingRecord, TimeWindow, TrendBucket};
use crate::errors::PipelineError;
use crate::types::DimensionValue;
use crate::utils::normalize_key_fragment;

/// Half-open query range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Build a range; `end` before `start` is a configuration error.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, PipelineError> {
        if end < start {
            return Err(PipelineError::Configuration(format!(
                "time range end {end} precedes start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The widest representable range.
    pub fn all() -> Self {
        Self {
            start: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
        }
    }

    /// Inclusive start.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns `true` when `at` is inside the range.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }

    /// Returns `true` for a zero-length range.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Fixed-size windows aligned to `epoch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSpec {
    size_secs: i64,
    epoch: DateTime<Utc>,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            size_secs: DEFAULT_WINDOW_DAYS * 86_400,
            epoch: DateTime::<Utc>::from_timestamp(DEFAULT_WINDOW_EPOCH_SECS, 0).unwrap_or_default(),
        }
    }
}

impl WindowSpec {
    /// Windows of `size` (whole seconds, at least one) starting at `epoch + n * size`.
    pub fn new(size: Duration, epoch: DateTime<Utc>) -> Result<Self, PipelineError> {
        let size_secs = size.num_seconds();
        if size_secs < 1 {
            return Err(PipelineError::Configuration(format!(
                "window size must be at least one second, got {size}"
            )));
        }
        Ok(Self { size_secs, epoch })
    }

    /// Window length.
    pub fn size(&self) -> Duration {
        Duration::seconds(self.size_secs)
    }

    /// Alignment epoch.
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Index of the window containing `at` (negative before the epoch).
    pub fn window_index(&self, at: DateTime<Utc>) -> i64 {
        let delta = at - self.epoch;
        let mut secs = delta.num_seconds();
        if delta.subsec_nanos() < 0 {
            secs -= 1;
        }
        secs.div_euclid(self.size_secs)
    }

    /// Window with the given index.
    pub fn window_at(&self, index: i64) -> TimeWindow {
        TimeWindow {
            start: self.boundary(index),
            end: self.boundary(index.saturating_add(1)),
        }
    }

    /// Window containing `at`.
    pub fn window_of(&self, at: DateTime<Utc>) -> TimeWindow {
        self.window_at(self.window_index(at))
    }

    fn boundary(&self, index: i64) -> DateTime<Utc> {
        self.size_secs
            .checked_mul(index)
            .and_then(Duration::try_seconds)
            .and_then(|offset| self.epoch.checked_add_signed(offset))
            .unwrap_or(if index < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            })
    }
}

/// Attribute postings are grouped by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Canonical skill name.
    Skill,
    /// Normalized canonical title.
    Role,
    /// Normalized canonical company.
    Company,
    /// Two co-occurring skills, `"a + b"` with `a < b`.
    SkillPair,
}

impl Dimension {
    /// Distinct values `record` carries for this dimension.
    pub fn values(&self, record: &PostingRecord) -> Vec<DimensionValue> {
        match self {
            Dimension::Skill => {
                let mut names: Vec<DimensionValue> =
                    record.skills.iter().map(|tag| tag.name.clone()).collect();
                names.sort();
                names.dedup();
                names
            }
            Dimension::Role => vec![normalize_key_fragment(&record.posting.title)],
            Dimension::Company => vec![normalize_key_fragment(&record.posting.company)],
            Dimension::SkillPair => {
                let mut names: Vec<&str> = record.skills.iter().map(|tag| tag.name.as_str()).collect();
                names.sort_unstable();
                names.dedup();
                let mut pairs = Vec::new();
                for (idx, first) in names.iter().enumerate() {
                    for second in &names[idx + 1..] {
                        pairs.push(format!("{first}{SKILL_PAIR_SEPARATOR}{second}"));
                    }
                }
                pairs
            }
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Skill => "skill",
            Dimension::Role => "role",
            Dimension::Company => "company",
            Dimension::SkillPair => "skill_pair",
        };
        f.write_str(name)
    }
}

impl FromStr for Dimension {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "skill" | "skills" => Ok(Dimension::Skill),
            "role" | "title" => Ok(Dimension::Role),
            "company" => Ok(Dimension::Company),
            "skill_pair" | "pair" => Ok(Dimension::SkillPair),
            other => Err(PipelineError::Configuration(format!(
                "unknown trend dimension '{other}'"
            ))),
        }
    }
}

/// Per-value window counts plus the first window the value ever appeared in.
#[derive(Clone, Debug)]
struct ValueHistory {
    value: DimensionValue,
    counts: BTreeMap<i64, u64>,
    first_index: i64,
    emit_from: i64,
}

/// Lazy bucket sequence ordered by window start, then value.
#[derive(Clone, Debug)]
pub struct TrendSeries {
    window: WindowSpec,
    histories: Vec<ValueHistory>,
    current: i64,
    last: i64,
    cursor: usize,
}

impl TrendSeries {
    fn empty(window: WindowSpec) -> Self {
        Self {
            window,
            histories: Vec::new(),
            current: 0,
            last: -1,
            cursor: 0,
        }
    }

    fn bucket(&self, history: &ValueHistory, index: i64) -> TrendBucket {
        let count = history.counts.get(&index).copied().unwrap_or(0);
        let velocity = (index != history.first_index).then(|| {
            let previous = history
                .counts
                .get(&(index - 1))
                .copied()
                .unwrap_or(0);
            count as i64 - previous as i64
        });
        TrendBucket {
            value: history.value.clone(),
            window: self.window.window_at(index),
            count,
            velocity,
        }
    }
}

impl Iterator for TrendSeries {
    type Item = TrendBucket;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current <= self.last {
            while self.cursor < self.histories.len() {
                let history = &self.histories[self.cursor];
                self.cursor += 1;
                if history.emit_from <= self.current {
                    return Some(self.bucket(history, self.current));
                }
            }
            self.current += 1;
            self.cursor = 0;
        }
        None
    }
}

/// Bucket `records` by window and `dimension` over `range`.
///
/// Counts are distinct postings whose first-seen falls in a window. A value's
/// windows run from its first non-empty window (or the range start, if later)
/// to the range end, capped at the last window holding any record. Records
/// before the range still count toward velocity baselines.
pub fn aggregate<'a, I>(
    records: I,
    dimension: Dimension,
    window: &WindowSpec,
    range: &TimeRange,
) -> TrendSeries
where
    I: IntoIterator<Item = &'a PostingRecord>,
{
    if range.is_empty() {
        return TrendSeries::empty(*window);
    }

    let mut seen_keys: FxHashSet<&str> = FxHashSet::default();
    let mut per_value: BTreeMap<DimensionValue, BTreeMap<i64, u64>> = BTreeMap::new();
    let mut data_last: Option<i64> = None;
    for record in records {
        if !seen_keys.insert(record.key().as_str()) {
            continue;
        }
        let index = window.window_index(record.posting.first_seen);
        data_last = Some(data_last.map_or(index, |last| last.max(index)));
        for value in dimension.values(record) {
            *per_value.entry(value).or_default().entry(index).or_insert(0) += 1;
        }
    }
    let Some(data_last) = data_last else {
        return TrendSeries::empty(*window);
    };

    let range_first = window.window_index(range.start());
    let range_last = window.window_index(range.end() - Duration::nanoseconds(1));
    let last = range_last.min(data_last);

    let histories: Vec<ValueHistory> = per_value
        .into_iter()
        .filter_map(|(value, counts)| {
            let first_index = *counts.keys().next()?;
            let emit_from = first_index.max(range_first);
            (emit_from <= last).then_some(ValueHistory {
                value,
                counts,
                first_index,
                emit_from,
            })
        })
        .collect();
    let Some(current) = histories.iter().map(|history| history.emit_from).min() else {
        return TrendSeries::empty(*window);
    };

    TrendSeries {
        window: *window,
        histories,
        current,
        last,
        cursor: 0,
    }
}
