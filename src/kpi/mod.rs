//! KPI engine: aggregate and per-period metrics, anomaly detection, and
//! correlation analysis over a normalized [`Dataset`].
//!
//! [`KpiEngine::compute`] is a pure function of the dataset and the
//! configured thresholds. Results are recomputed wholesale on every run;
//! all collections iterate in a deterministic order so repeated runs over
//! the same dataset produce identical output.

mod anomaly;
mod correlation;

pub use anomaly::{Anomaly, Severity};
pub use correlation::{CorrelationPair, CorrelationStrength};

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::dataset::Dataset;
use crate::error::{AnalysisError, AnalysisResult};

/// Ratio metric table: name, numerator column, denominator column, scale.
const RATIO_METRICS: &[(&str, &str, &str, f64)] = &[
    ("ctr", "clicks", "impressions", 100.0),
    ("cpc", "spend", "clicks", 1.0),
    ("cpm", "spend", "impressions", 1000.0),
    ("conversion_rate", "conversions", "clicks", 100.0),
    ("cpa", "spend", "conversions", 1.0),
    ("roas", "revenue", "spend", 1.0),
    ("engagement_rate", "engagements", "impressions", 100.0),
];

/// Whether a column name is one of the derived ratio metrics. Ratio columns
/// are never summed; their aggregates are recomputed from operand totals.
fn is_ratio_name(name: &str) -> bool {
    RATIO_METRICS.iter().any(|(n, _, _, _)| *n == name)
}

/// Strip the aggregate prefix and period-change suffix from a KpiSet key,
/// leaving the underlying metric name ("total_clicks" -> "clicks",
/// "ctr_period_change_pct" -> "ctr").
pub fn metric_base_name(name: &str) -> &str {
    let name = name.strip_suffix("_period_change_pct").unwrap_or(name);
    for prefix in ["total_", "avg_", "max_", "min_", "overall_"] {
        if let Some(stripped) = name.strip_prefix(prefix) {
            return stripped;
        }
    }
    name
}

/// A computed metric value. Ratios whose operands are absent or whose
/// denominator is zero are `Unavailable` - present in the KpiSet, omitted
/// from the narrative context, never NaN or infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    Available(f64),
    Unavailable,
}

impl MetricValue {
    /// The numeric value, if available.
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Available(v) => Some(*v),
            MetricValue::Unavailable => None,
        }
    }

    /// Whether the metric was computable.
    pub fn is_available(&self) -> bool {
        matches!(self, MetricValue::Available(_))
    }
}

/// Per-period (calendar-day) metric values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBucket {
    pub period: NaiveDate,
    /// Metric name -> value for this period. Ratio entries are present
    /// only when computable for the period.
    pub metrics: BTreeMap<String, f64>,
}

/// Dataset shape statistics carried alongside the metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub columns: usize,
    pub numeric_columns: usize,
    pub categorical_columns: usize,
    pub date_columns: usize,
    pub missing_cells: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

/// The computed metric set: whole-dataset metrics plus per-period buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSet {
    /// Metric name -> value over the whole dataset. Deterministic order.
    pub overall: BTreeMap<String, MetricValue>,
    /// Daily buckets in chronological order. Empty when the dataset has no
    /// usable date column.
    pub periods: Vec<PeriodBucket>,
    pub summary: DatasetSummary,
}

impl KpiSet {
    /// Value of an available overall metric.
    pub fn available(&self, name: &str) -> Option<f64> {
        self.overall.get(name).and_then(MetricValue::value)
    }

    /// Iterator over available overall metrics.
    pub fn available_metrics(&self) -> impl Iterator<Item = (&str, f64)> {
        self.overall
            .iter()
            .filter_map(|(name, value)| value.value().map(|v| (name.as_str(), v)))
    }

    /// Count of available overall metrics.
    pub fn computable_count(&self) -> usize {
        self.overall.values().filter(|v| v.is_available()).count()
    }
}

/// The full KPI engine output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub kpis: KpiSet,
    pub anomalies: Vec<Anomaly>,
    pub correlations: Vec<CorrelationPair>,
}

/// KPI engine over a fixed configuration.
#[derive(Debug, Clone)]
pub struct KpiEngine {
    config: AnalysisConfig,
}

impl KpiEngine {
    /// Create an engine with the given thresholds.
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Compute the full analysis for a dataset.
    ///
    /// Pure: no side effects beyond logging. Fails with
    /// [`AnalysisError::InsufficientData`] when the dataset has no rows or
    /// no numeric columns.
    pub fn compute(&self, dataset: &Dataset) -> AnalysisResult<Analysis> {
        if dataset.is_empty() {
            return Err(AnalysisError::InsufficientData {
                reason: "dataset has no rows".to_string(),
            });
        }

        let numeric: Vec<String> = dataset
            .numeric_columns()
            .into_iter()
            .map(String::from)
            .collect();
        if numeric.is_empty() {
            return Err(AnalysisError::InsufficientData {
                reason: "no numeric columns".to_string(),
            });
        }

        let mut overall = BTreeMap::new();
        self.aggregate_metrics(dataset, &numeric, &mut overall);
        self.ratio_metrics(dataset, &mut overall);

        let periods = self.period_buckets(dataset, &numeric);
        self.period_comparison(&periods, &mut overall);

        let anomalies = anomaly::detect(&periods, &self.config);
        let correlations = correlation::compute(&periods, &self.config);
        let summary = summarize(dataset, &periods);

        info!(
            metrics = overall.len(),
            periods = periods.len(),
            anomalies = anomalies.len(),
            correlations = correlations.len(),
            "KPI computation complete"
        );

        Ok(Analysis {
            kpis: KpiSet {
                overall,
                periods,
                summary,
            },
            anomalies,
            correlations,
        })
    }

    /// total/avg/max/min per numeric column. Ratio columns get no total:
    /// summed percentages are meaningless.
    fn aggregate_metrics(
        &self,
        dataset: &Dataset,
        numeric: &[String],
        overall: &mut BTreeMap<String, MetricValue>,
    ) {
        for name in numeric {
            let Some(series) = dataset.numeric_series(name) else {
                continue;
            };
            let values: Vec<f64> = series.into_iter().flatten().collect();
            if values.is_empty() {
                continue;
            }
            let sum: f64 = values.iter().sum();
            let avg = sum / values.len() as f64;
            let max = values.iter().cloned().fold(f64::MIN, f64::max);
            let min = values.iter().cloned().fold(f64::MAX, f64::min);

            if !is_ratio_name(name) {
                overall.insert(format!("total_{name}"), MetricValue::Available(sum));
            }
            overall.insert(format!("avg_{name}"), MetricValue::Available(avg));
            overall.insert(format!("max_{name}"), MetricValue::Available(max));
            overall.insert(format!("min_{name}"), MetricValue::Available(min));
        }
    }

    /// Whole-dataset ratio metrics from operand totals. A ratio whose
    /// operand columns are both absent is omitted; one with a missing
    /// operand or a zero denominator is Unavailable.
    fn ratio_metrics(&self, dataset: &Dataset, overall: &mut BTreeMap<String, MetricValue>) {
        for (name, numerator, denominator, scale) in RATIO_METRICS {
            let num_total = column_total(dataset, numerator);
            let den_total = column_total(dataset, denominator);
            if num_total.is_none() && den_total.is_none() {
                continue;
            }

            let key = format!("overall_{name}");
            let value = match (num_total, den_total) {
                (Some(num), Some(den)) if den != 0.0 => {
                    MetricValue::Available(num / den * scale)
                }
                _ => MetricValue::Unavailable,
            };
            if !value.is_available() {
                debug!(metric = %key, "Ratio metric unavailable");
            }
            overall.insert(key, value);
        }
    }

    /// Group records into daily buckets and compute per-bucket sums and
    /// ratio metrics.
    fn period_buckets(&self, dataset: &Dataset, numeric: &[String]) -> Vec<PeriodBucket> {
        let Some(date_column) = dataset.date_columns().first().map(|s| s.to_string()) else {
            debug!("No date column; skipping period bucketing");
            return Vec::new();
        };
        let Some(dates) = dataset.date_series(&date_column) else {
            return Vec::new();
        };

        let mut groups: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for (row, date) in dates.iter().enumerate() {
            if let Some(d) = date {
                groups.entry(*d).or_default().push(row);
            }
        }

        let summable: Vec<&String> = numeric.iter().filter(|n| !is_ratio_name(n)).collect();

        groups
            .into_iter()
            .map(|(period, rows)| {
                let mut metrics = BTreeMap::new();
                for name in &summable {
                    if let Some(idx) = dataset.column_index(name) {
                        let mut sum = 0.0;
                        let mut seen = false;
                        for &row in &rows {
                            if let Some(v) =
                                dataset.rows()[row].get(idx).and_then(|v| v.as_number())
                            {
                                sum += v;
                                seen = true;
                            }
                        }
                        if seen {
                            metrics.insert((*name).clone(), sum);
                        }
                    }
                }
                for (name, numerator, denominator, scale) in RATIO_METRICS {
                    if let (Some(num), Some(den)) =
                        (metrics.get(*numerator), metrics.get(*denominator))
                    {
                        if *den != 0.0 {
                            let value = num / den * scale;
                            metrics.insert(name.to_string(), value);
                        }
                    }
                }
                PeriodBucket { period, metrics }
            })
            .collect()
    }

    /// Split the date range at its midpoint and record the percent change
    /// of each metric between the halves as `<metric>_period_change_pct`.
    fn period_comparison(
        &self,
        periods: &[PeriodBucket],
        overall: &mut BTreeMap<String, MetricValue>,
    ) {
        let (Some(first), Some(last)) = (periods.first(), periods.last()) else {
            return;
        };
        let range_days = (last.period - first.period).num_days();
        if range_days < 2 {
            debug!("Insufficient date range for period comparison");
            return;
        }
        let midpoint = first.period + chrono::Duration::days(range_days / 2);

        let half_sums = |pred: &dyn Fn(NaiveDate) -> bool| -> BTreeMap<String, f64> {
            let mut sums: BTreeMap<String, f64> = BTreeMap::new();
            for bucket in periods.iter().filter(|b| pred(b.period)) {
                for (name, value) in &bucket.metrics {
                    if !is_ratio_name(name) {
                        *sums.entry(name.clone()).or_default() += value;
                    }
                }
            }
            sums
        };
        let first_half = half_sums(&|d| d < midpoint);
        let second_half = half_sums(&|d| d >= midpoint);

        for (name, p1) in &first_half {
            let Some(p2) = second_half.get(name) else {
                continue;
            };
            let change = if *p1 > 0.0 {
                (p2 - p1) / p1 * 100.0
            } else if *p2 > 0.0 {
                100.0
            } else {
                0.0
            };
            overall.insert(
                format!("{name}_period_change_pct"),
                MetricValue::Available(change),
            );
        }

        // Ratio changes come from per-half ratios of operand sums, not from
        // summed percentages.
        for (name, numerator, denominator, scale) in RATIO_METRICS {
            let ratio_of = |sums: &BTreeMap<String, f64>| -> Option<f64> {
                let num = sums.get(*numerator)?;
                let den = sums.get(*denominator)?;
                (*den != 0.0).then(|| num / den * scale)
            };
            if let (Some(r1), Some(r2)) = (ratio_of(&first_half), ratio_of(&second_half)) {
                if r1 != 0.0 {
                    overall.insert(
                        format!("{name}_period_change_pct"),
                        MetricValue::Available((r2 - r1) / r1 * 100.0),
                    );
                }
            }
        }
    }
}

fn column_total(dataset: &Dataset, name: &str) -> Option<f64> {
    let series = dataset.numeric_series(name)?;
    let values: Vec<f64> = series.into_iter().flatten().collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum())
}

fn summarize(dataset: &Dataset, periods: &[PeriodBucket]) -> DatasetSummary {
    DatasetSummary {
        rows: dataset.len(),
        columns: dataset.columns().len(),
        numeric_columns: dataset.numeric_columns().len(),
        categorical_columns: dataset.categorical_columns().len(),
        date_columns: dataset.date_columns().len(),
        missing_cells: dataset.missing_cells(),
        date_range: match (periods.first(), periods.last()) {
            (Some(first), Some(last)) => Some((first.period, last.period)),
            _ => None,
        },
    }
}
