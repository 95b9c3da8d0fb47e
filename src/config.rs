use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{dedup, salary, skills, status, trends};
use crate::errors::PipelineError;
use crate::trends::WindowSpec;
use crate::types::CurrencyCode;

/// Controls how raw postings are merged into canonical postings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Normalized title similarity in `[0, 1]` above which two postings of the
    /// same normalized company are treated as duplicates.
    pub title_similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_similarity_threshold: dedup::DEFAULT_TITLE_SIMILARITY,
        }
    }
}

/// Controls status inference from last-seen age.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Days without re-observation before a posting becomes stale.
    pub stale_after_days: i64,
    /// Days without re-observation before a posting is presumed closed.
    pub closed_after_days: i64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            stale_after_days: status::DEFAULT_STALE_AFTER_DAYS,
            closed_after_days: status::DEFAULT_CLOSED_AFTER_DAYS,
        }
    }
}

/// Skill matching thresholds. All fuzzy heuristics are tunable here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillMatchConfig {
    /// Longest alias n-gram (in tokens) tried for exact matches.
    pub max_ngram: usize,
    /// Enables fuzzy matching for spans without an exact match.
    pub fuzzy_enabled: bool,
    /// Maximum edit distance for fuzzy matches.
    pub fuzzy_max_edits: usize,
    /// Minimum `1 - edits / len` for fuzzy matches.
    pub fuzzy_min_similarity: f64,
    /// Minimum span length (characters) eligible for fuzzy matching.
    pub fuzzy_min_chars: usize,
    /// Require fuzzy candidates to share the alias's first character.
    pub fuzzy_require_same_initial: bool,
}

impl Default for SkillMatchConfig {
    fn default() -> Self {
        Self {
            max_ngram: skills::DEFAULT_MAX_NGRAM,
            fuzzy_enabled: true,
            fuzzy_max_edits: skills::DEFAULT_FUZZY_MAX_EDITS,
            fuzzy_min_similarity: skills::DEFAULT_FUZZY_MIN_SIMILARITY,
            fuzzy_min_chars: skills::DEFAULT_FUZZY_MIN_CHARS,
            fuzzy_require_same_initial: true,
        }
    }
}

/// Salary extraction defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SalaryConfig {
    /// Currency assumed when a phrase names none.
    pub default_currency: CurrencyCode,
    /// Max byte distance from a compensation keyword for figures without
    /// any currency, `k`, or period marker.
    pub keyword_window: usize,
}

impl Default for SalaryConfig {
    fn default() -> Self {
        Self {
            default_currency: salary::DEFAULT_CURRENCY.to_string(),
            keyword_window: salary::DEFAULT_KEYWORD_WINDOW,
        }
    }
}

/// Time windowing used by trend aggregation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Window length in days.
    pub window_days: i64,
    /// Fixed alignment epoch; windows start at `epoch + n * window`.
    pub epoch: DateTime<Utc>,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_days: trends::DEFAULT_WINDOW_DAYS,
            epoch: DateTime::<Utc>::from_timestamp(trends::DEFAULT_WINDOW_EPOCH_SECS, 0)
                .unwrap_or_default(),
        }
    }
}

impl TrendConfig {
    /// Window specification for aggregation.
    pub fn window_spec(&self) -> Result<WindowSpec, PipelineError> {
        let size = Duration::try_days(self.window_days).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "trends.window_days is out of range, got {}",
                self.window_days
            ))
        })?;
        WindowSpec::new(size, self.epoch)
    }
}

/// Thresholds for emerging-value detection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergingConfig {
    /// Number of trailing windows inspected per value.
    pub lookback_windows: usize,
    /// Consecutive trailing windows with positive velocity required.
    pub min_positive_streak: usize,
    /// Minimum count in the latest window.
    pub min_count: u64,
    /// Minimum `(latest - first) / max(first, 1)` across the lookback.
    pub min_growth_rate: f64,
}

impl Default for EmergingConfig {
    fn default() -> Self {
        Self {
            lookback_windows: trends::DEFAULT_LOOKBACK_WINDOWS,
            min_positive_streak: trends::DEFAULT_MIN_POSITIVE_STREAK,
            min_count: trends::DEFAULT_MIN_COUNT,
            min_growth_rate: trends::DEFAULT_MIN_GROWTH_RATE,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Optional taxonomy file; the built-in taxonomy is used when absent.
    pub taxonomy_path: Option<PathBuf>,
    /// Deduplication thresholds.
    pub dedup: DedupConfig,
    /// Status inference thresholds.
    pub status: StatusConfig,
    /// Skill matching thresholds.
    pub skills: SkillMatchConfig,
    /// Salary defaults.
    pub salary: SalaryConfig,
    /// Trend windowing.
    pub trends: TrendConfig,
    /// Emerging detection thresholds.
    pub emerging: EmergingConfig,
}

impl PipelineConfig {
    /// Parse a JSON configuration document; missing fields take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig = serde_json::from_str(raw)?;
        config.validated()
    }

    /// Validate thresholds and return the config unchanged when consistent.
    pub fn validated(self) -> Result<Self, PipelineError> {
        let threshold = self.dedup.title_similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::Configuration(format!(
                "dedup.title_similarity_threshold must be within [0, 1], got {threshold}"
            )));
        }
        if self.status.stale_after_days <= 0
            || self.status.closed_after_days < self.status.stale_after_days
        {
            return Err(PipelineError::Configuration(
                "status thresholds must satisfy 0 < stale_after_days <= closed_after_days".into(),
            ));
        }
        if Duration::try_days(self.status.closed_after_days).is_none() {
            return Err(PipelineError::Configuration(format!(
                "status.closed_after_days is out of range, got {}",
                self.status.closed_after_days
            )));
        }
        if self.skills.max_ngram == 0 {
            return Err(PipelineError::Configuration(
                "skills.max_ngram must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.skills.fuzzy_min_similarity) {
            return Err(PipelineError::Configuration(
                "skills.fuzzy_min_similarity must be within [0, 1]".into(),
            ));
        }
        if self.salary.default_currency.len() != 3
            || !self
                .salary
                .default_currency
                .chars()
                .all(|ch| ch.is_ascii_uppercase())
        {
            return Err(PipelineError::Configuration(format!(
                "salary.default_currency must be an ISO 4217 code, got '{}'",
                self.salary.default_currency
            )));
        }
        if self.trends.window_days <= 0 {
            return Err(PipelineError::Configuration(
                "trends.window_days must be positive".into(),
            ));
        }
        self.trends.window_spec()?;
        if self.emerging.lookback_windows < 2 {
            return Err(PipelineError::Configuration(
                "emerging.lookback_windows must be at least 2".into(),
            ));
        }
        if self.emerging.min_positive_streak > self.emerging.lookback_windows {
            return Err(PipelineError::Configuration(
                "emerging.min_positive_streak cannot exceed lookback_windows".into(),
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(PipelineConfig::default().validated().is_ok());
    }

    #[test]
    fn json_overrides_merge_with_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{"salary": {"default_currency": "EUR"}, "emerging": {"min_count": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.salary.default_currency, "EUR");
        assert_eq!(config.emerging.min_count, 3);
        assert_eq!(
            config.emerging.lookback_windows,
            trends::DEFAULT_LOOKBACK_WINDOWS
        );
        assert_eq!(config.trends.window_days, 7);
    }

    #[test]
    fn rejects_out_of_range_similarity() {
        let mut config = PipelineConfig::default();
        config.dedup.title_similarity_threshold = 1.5;
        assert!(matches!(
            config.validated(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_lowercase_currency() {
        let err = PipelineConfig::from_json_str(r#"{"salary": {"default_currency": "usd"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("ISO 4217"));
    }

    #[test]
    fn huge_day_counts_are_configuration_errors() {
        let err = PipelineConfig::from_json_str(r#"{"trends": {"window_days": 9223372036854775807}}"#)
            .unwrap_err();
        assert!(
            matches!(err, PipelineError::Configuration(msg) if msg.contains("trends.window_days"))
        );

        let err = PipelineConfig::from_json_str(
            r#"{"status": {"stale_after_days": 14, "closed_after_days": 9223372036854775807}}"#,
        )
        .unwrap_err();
        assert!(
            matches!(err, PipelineError::Configuration(msg) if msg.contains("closed_after_days"))
        );

        let config = TrendConfig {
            window_days: i64::MAX,
            ..TrendConfig::default()
        };
        assert!(matches!(
            config.window_spec(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn default_epoch_is_a_monday() {
        use chrono::{Datelike, Weekday};
        assert_eq!(TrendConfig::default().epoch.weekday(), Weekday::Mon);
    }
}
