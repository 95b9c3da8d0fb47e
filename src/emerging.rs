//! Emerging-value detection over trend buckets.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::EmergingConfig;
use crate::data::{EmergingSignal, TimeWindow, TrendBucket};
use crate::types::DimensionValue;

/// Flag values whose recent windows show sustained, sufficient growth.
///
/// For each value the last `lookback_windows` buckets (by window start) are
/// inspected. A value is flagged when its trailing run of positive velocities
/// is at least `min_positive_streak`, its latest count reaches `min_count`, and
/// `(latest - first) / max(first, 1)` reaches `min_growth_rate`. Values with
/// fewer than two buckets are never flagged.
///
/// Signals are ranked by growth rate (descending), then latest count
/// (descending), then value.
pub fn detect_emerging<I>(buckets: I, config: &EmergingConfig) -> Vec<EmergingSignal>
where
    I: IntoIterator<Item = TrendBucket>,
{
    let mut by_value: BTreeMap<DimensionValue, Vec<TrendBucket>> = BTreeMap::new();
    for bucket in buckets {
        by_value.entry(bucket.value.clone()).or_default().push(bucket);
    }

    let mut signals = Vec::new();
    for (value, mut history) in by_value {
        history.sort_by_key(|bucket| bucket.window.start);
        let lookback = config.lookback_windows.max(2).min(history.len());
        if lookback < 2 {
            continue;
        }
        let recent = &history[history.len() - lookback..];
        let (Some(first), Some(latest)) = (recent.first(), recent.last()) else {
            continue;
        };

        let streak = recent
            .iter()
            .rev()
            .take_while(|bucket| bucket.velocity.is_some_and(|velocity| velocity > 0))
            .count();
        if streak < config.min_positive_streak || latest.count < config.min_count {
            continue;
        }
        let growth_rate =
            (latest.count as f64 - first.count as f64) / first.count.max(1) as f64;
        if growth_rate < config.min_growth_rate {
            continue;
        }
        debug!(value = %value, growth_rate, latest_count = latest.count, streak, "emerging value");
        signals.push(EmergingSignal {
            value,
            growth_rate,
            window: TimeWindow {
                start: first.window.start,
                end: latest.window.end,
            },
            latest_count: latest.count,
        });
    }

    signals.sort_by(|a, b| {
        b.growth_rate
            .total_cmp(&a.growth_rate)
            .then_with(|| b.latest_count.cmp(&a.latest_count))
            .then_with(|| a.value.cmp(&b.value))
    });
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::weeks(n)
    }

    fn history(value: &str, counts: &[u64]) -> Vec<TrendBucket> {
        counts
            .iter()
            .enumerate()
            .map(|(idx, count)| TrendBucket {
                value: value.to_string(),
                window: TimeWindow {
                    start: start(idx as i64),
                    end: start(idx as i64 + 1),
                },
                count: *count,
                velocity: (idx > 0).then(|| *count as i64 - counts[idx - 1] as i64),
            })
            .collect()
    }

    #[test]
    fn sustained_growth_is_flagged() {
        let signals = detect_emerging(history("rust", &[2, 3, 9, 20]), &EmergingConfig::default());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].value, "rust");
        assert_eq!(signals[0].growth_rate, 9.0);
        assert_eq!(signals[0].latest_count, 20);
        assert_eq!(signals[0].window.start, start(0));
        assert_eq!(signals[0].window.end, start(4));
    }

    #[test]
    fn flat_or_falling_history_is_not_flagged() {
        let config = EmergingConfig::default();
        assert!(detect_emerging(history("cobol", &[1, 1, 2, 1]), &config).is_empty());
        assert!(detect_emerging(history("perl", &[10, 8, 6, 4]), &config).is_empty());
    }

    #[test]
    fn small_counts_are_not_flagged() {
        assert!(
            detect_emerging(history("zig", &[0, 1, 2, 4]), &EmergingConfig::default()).is_empty()
        );
    }

    #[test]
    fn only_the_lookback_is_inspected() {
        // An early dip outside the last four windows does not break the streak.
        let signals = detect_emerging(
            history("rust", &[9, 1, 2, 5, 11]),
            &EmergingConfig::default(),
        );
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].growth_rate, 10.0);
    }

    #[test]
    fn ranking_prefers_growth_then_count_then_value() {
        let mut buckets = history("kafka", &[1, 2, 3, 6]);
        buckets.extend(history("spark", &[2, 4, 8, 16]));
        buckets.extend(history("dbt", &[2, 4, 8, 16]));
        buckets.extend(history("airflow", &[3, 6, 12, 24]));
        let ranked: Vec<String> = detect_emerging(buckets, &EmergingConfig::default())
            .into_iter()
            .map(|signal| signal.value)
            .collect();
        assert_eq!(ranked, vec!["airflow", "dbt", "spark", "kafka"]);
    }

    #[test]
    fn single_window_and_empty_input_yield_nothing() {
        let config = EmergingConfig::default();
        assert!(detect_emerging(Vec::new(), &config).is_empty());
        assert!(detect_emerging(history("rust", &[50]), &config).is_empty());
    }

    #[test]
    fn input_order_does_not_matter() {
        let mut buckets = history("rust", &[2, 3, 9, 20]);
        buckets.reverse();
        let signals = detect_emerging(buckets, &EmergingConfig::default());
        assert_eq!(signals.len(), 1);
    }
}
