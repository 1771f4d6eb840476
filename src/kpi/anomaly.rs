//! Per-period anomaly detection.
//!
//! Each period's value is scored against the mean and standard deviation of
//! the remaining periods (leave-one-out). A constant series never alarms:
//! every value equals its leave-one-out mean. A value deviating from an
//! otherwise-constant series has an unbounded score and is always severe.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;

use super::PeriodBucket;

/// Anomaly severity band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Deviation between the threshold and `threshold * severe_multiplier`.
    Moderate,
    /// Deviation beyond `threshold * severe_multiplier`, or off-scale.
    Severe,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Moderate => write!(f, "moderate"),
            Severity::Severe => write!(f, "severe"),
        }
    }
}

/// A flagged period value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Metric the deviation was observed in.
    pub metric: String,
    /// Period bucket the deviation was observed at.
    pub period: NaiveDate,
    /// The observed value.
    pub observed: f64,
    /// Lower bound of the expected range.
    pub expected_low: f64,
    /// Upper bound of the expected range.
    pub expected_high: f64,
    /// Deviation score in standard deviations. `None` when the remaining
    /// periods are constant and the score is unbounded.
    pub score: Option<f64>,
    /// Severity band.
    pub severity: Severity,
}

const EPSILON: f64 = 1e-9;

/// Detect anomalies across every metric's per-period series.
pub fn detect(periods: &[PeriodBucket], config: &AnalysisConfig) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    for metric in metric_names(periods) {
        let series: Vec<(NaiveDate, f64)> = periods
            .iter()
            .filter_map(|bucket| bucket.metrics.get(&metric).map(|v| (bucket.period, *v)))
            .collect();

        if series.len() < config.min_series_points {
            continue;
        }

        for (i, (period, value)) in series.iter().enumerate() {
            let rest: Vec<f64> = series
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, (_, v))| *v)
                .collect();

            let mean = rest.iter().sum::<f64>() / rest.len() as f64;
            let variance =
                rest.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / rest.len() as f64;
            let std_dev = variance.sqrt();

            if std_dev < EPSILON {
                if (value - mean).abs() < EPSILON {
                    continue;
                }
                anomalies.push(Anomaly {
                    metric: metric.clone(),
                    period: *period,
                    observed: *value,
                    expected_low: mean,
                    expected_high: mean,
                    score: None,
                    severity: Severity::Severe,
                });
                continue;
            }

            let score = (value - mean).abs() / std_dev;
            if score <= config.anomaly_threshold {
                continue;
            }

            let severity = if score > config.anomaly_threshold * config.severe_multiplier {
                Severity::Severe
            } else {
                Severity::Moderate
            };
            let margin = config.anomaly_threshold * std_dev;
            anomalies.push(Anomaly {
                metric: metric.clone(),
                period: *period,
                observed: *value,
                expected_low: mean - margin,
                expected_high: mean + margin,
                score: Some(score),
                severity,
            });
        }
    }

    anomalies.sort_by(|a, b| a.metric.cmp(&b.metric).then(a.period.cmp(&b.period)));
    anomalies
}

fn metric_names(periods: &[PeriodBucket]) -> Vec<String> {
    let mut names = std::collections::BTreeSet::new();
    for bucket in periods {
        for name in bucket.metrics.keys() {
            names.insert(name.clone());
        }
    }
    names.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn buckets(metric: &str, values: &[f64]) -> Vec<PeriodBucket> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut metrics = BTreeMap::new();
                metrics.insert(metric.to_string(), *v);
                PeriodBucket {
                    period: date(i as u32 + 1),
                    metrics,
                }
            })
            .collect()
    }

    #[test]
    fn test_constant_series_never_alarms() {
        let periods = buckets("ctr", &[3.0, 3.0, 3.0, 3.0]);
        assert!(detect(&periods, &AnalysisConfig::default()).is_empty());
    }

    #[test]
    fn test_spike_in_short_series_is_severe() {
        // The CTR scenario: [3%, 3%, 30%] flags day 3
        let periods = buckets("ctr", &[3.0, 3.0, 30.0]);
        let anomalies = detect(&periods, &AnalysisConfig::default());

        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.period, date(3));
        assert_eq!(anomaly.observed, 30.0);
        assert_eq!(anomaly.severity, Severity::Severe);
        assert_eq!(anomaly.score, None);
        assert_eq!(anomaly.expected_low, 3.0);
        assert_eq!(anomaly.expected_high, 3.0);
    }

    #[test]
    fn test_moderate_band() {
        // Noisy baseline so the leave-one-out deviation lands between
        // threshold and threshold * severe_multiplier
        let periods = buckets(
            "clicks",
            &[10.0, 11.0, 9.0, 10.0, 11.0, 9.0, 10.0, 11.0, 9.0, 10.0, 11.94],
        );
        let anomalies = detect(&periods, &AnalysisConfig::default());

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].period, date(11));
        assert_eq!(anomalies[0].severity, Severity::Moderate);
        let score = anomalies[0].score.unwrap();
        assert!(score > 2.0 && score <= 3.0, "score was {}", score);
    }

    #[test]
    fn test_far_spike_in_noisy_series_is_severe() {
        let periods = buckets("clicks", &[10.0, 12.0, 8.0, 11.0, 9.0, 10.0, 18.0]);
        let anomalies = detect(&periods, &AnalysisConfig::default());

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].period, date(7));
        assert_eq!(anomalies[0].severity, Severity::Severe);
        assert!(anomalies[0].score.unwrap() > 3.0);
    }

    #[test]
    fn test_series_below_minimum_points_is_skipped() {
        let periods = buckets("clicks", &[1.0, 100.0]);
        assert!(detect(&periods, &AnalysisConfig::default()).is_empty());
    }

    #[test]
    fn test_within_threshold_is_quiet() {
        let periods = buckets("spend", &[10.0, 11.0, 9.0, 10.5, 9.5]);
        assert!(detect(&periods, &AnalysisConfig::default()).is_empty());
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let mut periods = buckets("b_metric", &[1.0, 1.0, 50.0]);
        for (bucket, v) in periods.iter_mut().zip([2.0, 2.0, 80.0]) {
            bucket.metrics.insert("a_metric".to_string(), v);
        }
        let anomalies = detect(&periods, &AnalysisConfig::default());
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].metric, "a_metric");
        assert_eq!(anomalies[1].metric, "b_metric");
    }
}
