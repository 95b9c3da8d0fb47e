use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StatusConfig;
pub use crate::types::{
    CompanyName, CurrencyCode, DimensionValue, NativeId, PostingKey, RoleTitle, SkillName,
    SourceId,
};

/// Identity of one raw observation: the source plus its native posting id.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub struct RawPostingId {
    /// Source that produced the observation.
    pub source: SourceId,
    /// Posting id assigned by that source.
    pub native_id: NativeId,
}

impl std::fmt::Display for RawPostingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source, self.native_id)
    }
}

/// A job posting exactly as delivered by a scraper adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    /// Source identifier (adapter name). Blank means the delivering adapter.
    #[serde(default)]
    pub source: SourceId,
    /// Source-native posting id.
    pub native_id: NativeId,
    /// Company name as scraped.
    pub company: String,
    /// Title as scraped.
    pub title: String,
    /// Free-text body.
    #[serde(default)]
    pub body: String,
    /// Publication time reported by the source, when available.
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    /// Time the adapter fetched this observation.
    pub scraped_at: DateTime<Utc>,
    /// Source URL, when the adapter has one.
    #[serde(default)]
    pub url: Option<String>,
}

impl RawPosting {
    /// Identity of this observation.
    pub fn id(&self) -> RawPostingId {
        RawPostingId {
            source: self.source.clone(),
            native_id: self.native_id.clone(),
        }
    }

    /// Time used for first-seen accounting: publication time, else scrape time.
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.posted_at.unwrap_or(self.scraped_at)
    }
}

/// Inferred lifecycle status of a canonical posting.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
#[serde(rename_all = "snake_case")]
pub enum PostingStatus {
    /// Seen recently.
    Active,
    /// Not re-observed for a while; may still be open.
    Stale,
    /// Not re-observed for long enough to be presumed closed.
    Closed,
}

impl PostingStatus {
    /// Infer status from the age of the last observation.
    ///
    /// Closure is never observed directly; it is presumed from silence.
    pub fn infer(last_seen: DateTime<Utc>, now: DateTime<Utc>, config: &StatusConfig) -> Self {
        // Thresholds beyond the representable range never elapse.
        let threshold = |days: i64| Duration::try_days(days).unwrap_or(Duration::MAX);
        let age = now - last_seen;
        if age < threshold(config.stale_after_days) {
            PostingStatus::Active
        } else if age < threshold(config.closed_after_days) {
            PostingStatus::Stale
        } else {
            PostingStatus::Closed
        }
    }
}

/// Deduplicated logical job posting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPosting {
    /// Stable posting key (normalized company + title).
    pub key: PostingKey,
    /// Canonical company name.
    pub company: CompanyName,
    /// Canonical title.
    pub title: RoleTitle,
    /// Contributing raw observations in arrival order (never empty, no duplicates).
    pub provenance: Vec<RawPostingId>,
    /// Source URLs seen for this posting.
    pub urls: Vec<String>,
    /// Earliest observation time across contributions.
    pub first_seen: DateTime<Utc>,
    /// Latest scrape time across contributions.
    pub last_seen: DateTime<Utc>,
    /// Inferred lifecycle status.
    pub status: PostingStatus,
    /// Title of the most recently scraped contribution, as scraped.
    pub latest_title: String,
    /// Body of the most recently scraped contribution.
    pub latest_body: String,
    /// Scrape time of the contribution that supplied `latest_title`/`latest_body`.
    pub latest_scraped_at: DateTime<Utc>,
}

impl CanonicalPosting {
    /// Text handed to the extractors: latest title followed by latest body.
    pub fn extraction_text(&self) -> String {
        if self.latest_body.is_empty() {
            return self.latest_title.clone();
        }
        format!("{}\n{}", self.latest_title, self.latest_body)
    }

    /// Returns `true` when `id` already contributed to this posting.
    pub fn has_contribution(&self, id: &RawPostingId) -> bool {
        self.provenance.iter().any(|existing| existing == id)
    }
}

/// Broad grouping of canonical skills.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    /// Programming and query languages.
    Language,
    /// Libraries and application frameworks.
    Framework,
    /// Databases, platforms, infrastructure, and other tooling.
    Tool,
    /// Practices and interpersonal skills.
    SoftSkill,
}

/// A canonical skill found in posting text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub struct SkillTag {
    /// Canonical skill name.
    pub name: SkillName,
    /// Skill category from the taxonomy.
    pub category: SkillCategory,
    /// 1.0 for exact alias matches, lower for fuzzy matches.
    pub confidence: f32,
    /// Text span that matched, as it appears in the source text.
    pub matched: String,
    /// Byte offset where the match starts.
    pub span_start: usize,
    /// Byte offset where the match ends (exclusive).
    pub span_end: usize,
}

/// Pay period of a salary range.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
#[serde(rename_all = "snake_case")]
pub enum SalaryPeriod {
    /// Annual compensation.
    Year,
    /// Hourly compensation.
    Hour,
}

/// Normalized compensation range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub struct SalaryRange {
    /// Lower bound (equal to `max` for single figures).
    pub min: f64,
    /// Upper bound.
    pub max: f64,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
    /// Pay period.
    pub period: SalaryPeriod,
    /// Whether the figure was presented as an estimate.
    pub is_estimated: bool,
}

impl SalaryRange {
    /// Merge a re-extracted range into an existing one.
    ///
    /// Explicit figures override estimated ones; otherwise the newer value wins.
    pub fn merge(existing: Option<SalaryRange>, incoming: Option<SalaryRange>) -> Option<SalaryRange> {
        match (existing, incoming) {
            (None, incoming) => incoming,
            (existing, None) => existing,
            (Some(existing), Some(incoming)) => {
                if incoming.is_estimated && !existing.is_estimated {
                    Some(existing)
                } else {
                    Some(incoming)
                }
            }
        }
    }
}

/// Canonical posting plus its extracted skills and salary, as persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostingRecord {
    /// The deduplicated posting.
    pub posting: CanonicalPosting,
    /// Extracted skills, sorted by name, unique per name.
    pub skills: Vec<SkillTag>,
    /// Extracted salary, if any.
    pub salary: Option<SalaryRange>,
}

impl PostingRecord {
    /// Posting key of the wrapped posting.
    pub fn key(&self) -> &PostingKey {
        &self.posting.key
    }
}

/// Half-open time window `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Returns `true` when `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Count and velocity of one dimension value in one window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendBucket {
    /// Dimension value (skill, role, company, or skill pair).
    pub value: DimensionValue,
    /// Window covered by this bucket.
    pub window: TimeWindow,
    /// Distinct postings first seen in the window carrying `value`.
    pub count: u64,
    /// Change versus the previous window; `None` for the first observed window.
    pub velocity: Option<i64>,
}

/// A dimension value flagged as emerging.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergingSignal {
    /// Flagged dimension value.
    pub value: DimensionValue,
    /// Relative growth over the lookback: `(latest - first) / max(first, 1)`.
    pub growth_rate: f64,
    /// Span of the inspected lookback windows.
    pub window: TimeWindow,
    /// Count in the most recent window.
    pub latest_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_follows_observation_age() {
        let last_seen = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let config = StatusConfig::default();
        let at = |days: i64| last_seen + Duration::days(days);
        assert_eq!(PostingStatus::infer(last_seen, at(1), &config), PostingStatus::Active);
        assert_eq!(
            PostingStatus::infer(last_seen, at(config.stale_after_days), &config),
            PostingStatus::Stale
        );
        assert_eq!(
            PostingStatus::infer(last_seen, at(config.closed_after_days), &config),
            PostingStatus::Closed
        );
    }

    #[test]
    fn unrepresentable_thresholds_never_elapse() {
        let last_seen = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let now = last_seen + Duration::days(3_650);
        let stale_only = StatusConfig {
            stale_after_days: 30,
            closed_after_days: i64::MAX,
        };
        assert_eq!(
            PostingStatus::infer(last_seen, now, &stale_only),
            PostingStatus::Stale
        );
        let never = StatusConfig {
            stale_after_days: i64::MAX,
            closed_after_days: i64::MAX,
        };
        assert_eq!(
            PostingStatus::infer(last_seen, now, &never),
            PostingStatus::Active
        );
    }
}
