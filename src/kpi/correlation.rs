//! Pairwise correlation over per-period metric series.
//!
//! Coefficients are reported only for pairs sharing enough periods and
//! whose |r| clears the configured cutoff. Correlation output never feeds
//! anomaly severity.

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;

use super::PeriodBucket;

/// Correlation strength label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationStrength {
    Moderate,
    Strong,
}

impl std::fmt::Display for CorrelationStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrelationStrength::Moderate => write!(f, "moderate"),
            CorrelationStrength::Strong => write!(f, "strong"),
        }
    }
}

/// A reported metric pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub metric_a: String,
    pub metric_b: String,
    /// Pearson coefficient over the shared periods.
    pub coefficient: f64,
    pub strength: CorrelationStrength,
    /// Number of shared periods the coefficient was computed over.
    pub points: usize,
}

/// Compute reportable correlations across every pair of per-period series.
pub fn compute(periods: &[PeriodBucket], config: &AnalysisConfig) -> Vec<CorrelationPair> {
    let names: Vec<String> = {
        let mut set = std::collections::BTreeSet::new();
        for bucket in periods {
            for name in bucket.metrics.keys() {
                set.insert(name.clone());
            }
        }
        set.into_iter().collect()
    };

    let mut pairs = Vec::new();
    for (i, a) in names.iter().enumerate() {
        for b in names.iter().skip(i + 1) {
            let shared: Vec<(f64, f64)> = periods
                .iter()
                .filter_map(|bucket| {
                    match (bucket.metrics.get(a), bucket.metrics.get(b)) {
                        (Some(x), Some(y)) => Some((*x, *y)),
                        _ => None,
                    }
                })
                .collect();

            if shared.len() < config.min_correlation_points {
                continue;
            }
            let Some(r) = pearson(&shared) else {
                continue;
            };
            if r.abs() <= config.correlation_cutoff {
                continue;
            }

            let strength = if r.abs() > config.strong_correlation_cutoff {
                CorrelationStrength::Strong
            } else {
                CorrelationStrength::Moderate
            };
            pairs.push(CorrelationPair {
                metric_a: a.clone(),
                metric_b: b.clone(),
                coefficient: r,
                strength,
                points: shared.len(),
            });
        }
    }

    pairs.sort_by(|x, y| {
        y.coefficient
            .abs()
            .partial_cmp(&x.coefficient.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| x.metric_a.cmp(&y.metric_a))
            .then_with(|| x.metric_b.cmp(&y.metric_b))
    });
    pairs.truncate(config.max_correlation_pairs);
    pairs
}

/// Pearson coefficient; `None` when either series is constant.
fn pearson(points: &[(f64, f64)]) -> Option<f64> {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}
