//! Transformer: date parsing, missing-value handling, and derived per-row
//! ratio metrics.
//!
//! The transformer never drops rows. Unparseable date cells become
//! explicit missing values; missing cells are filled per column type
//! (numeric -> median, date -> forward/backward fill, text -> mode).

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::dataset::{ColumnType, Dataset, Value};

/// Column-name keywords that indicate a date column.
const DATE_KEYWORDS: &[&str] = &[
    "date",
    "timestamp",
    "created_at",
    "updated_at",
    "start_date",
    "end_date",
    "datetime",
];

/// Keywords that must never be treated as dates even if their cells parse.
const EXCLUDE_KEYWORDS: &[&str] = &[
    "spend",
    "revenue",
    "cost",
    "price",
    "amount",
    "clicks",
    "impressions",
    "conversions",
    "traffic",
    "visitors",
    "temp",
    "temperature",
    "rate",
    "ctr",
    "cpc",
    "cpm",
];

/// Date formats accepted, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// A derived ratio metric: numerator, denominator, optional scale factor.
const DERIVED_METRICS: &[(&str, &str, &str, f64)] = &[
    ("ctr", "clicks", "impressions", 100.0),
    ("cpc", "spend", "clicks", 1.0),
    ("cpm", "spend", "impressions", 1000.0),
    ("conversion_rate", "conversions", "clicks", 100.0),
    ("cpa", "spend", "conversions", 1.0),
    ("roas", "revenue", "spend", 1.0),
    ("engagement_rate", "engagements", "impressions", 100.0),
];

/// Outcome of the transform stage.
#[derive(Debug, Clone)]
pub struct TransformSummary {
    pub dataset: Dataset,
    /// Columns parsed as dates.
    pub date_columns: Vec<String>,
    /// Count of missing cells filled.
    pub filled_cells: usize,
    /// Derived metric columns added.
    pub derived_columns: Vec<String>,
}

/// Run the full transform stage: parse dates, fill missing values, derive
/// ratio metrics, and re-infer column types.
pub fn transform(mut dataset: Dataset) -> TransformSummary {
    let date_columns = detect_date_columns(&dataset);
    for name in &date_columns {
        parse_date_column(&mut dataset, name);
    }

    let filled_cells = fill_missing(&mut dataset);
    let derived_columns = derive_metrics(&mut dataset);
    dataset.infer_column_types();

    info!(
        date_columns = date_columns.len(),
        filled_cells,
        derived = derived_columns.len(),
        "Transform stage complete"
    );

    TransformSummary {
        dataset,
        date_columns,
        filled_cells,
        derived_columns,
    }
}

/// Detect columns that likely contain dates, by name keyword with a
/// metric-keyword exclusion list.
pub fn detect_date_columns(dataset: &Dataset) -> Vec<String> {
    let mut detected = Vec::new();
    for column in dataset.columns() {
        let name = column.name.as_str();
        if EXCLUDE_KEYWORDS.iter().any(|kw| name.contains(kw)) {
            continue;
        }
        if column.ty == ColumnType::Numeric {
            continue;
        }
        if DATE_KEYWORDS.iter().any(|kw| name.contains(kw)) {
            detected.push(column.name.clone());
        }
    }
    detected
}

/// Parse one text cell as a calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(d);
        }
    }
    // Timestamps: RFC 3339 or "YYYY-MM-DD HH:MM:SS", truncated to the date
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    None
}

fn parse_date_column(dataset: &mut Dataset, name: &str) {
    let Some(idx) = dataset.column_index(name) else {
        return;
    };
    let mut parsed = 0usize;
    for row in 0..dataset.len() {
        let replacement = match dataset.rows()[row].get(idx) {
            Some(Value::Text(s)) => match parse_date(s) {
                Some(d) => {
                    parsed += 1;
                    Some(Value::Date(d))
                }
                None => Some(Value::Missing),
            },
            // Dates never arrive as bare numbers in these sources
            Some(Value::Number(_)) => Some(Value::Missing),
            _ => None,
        };
        if let Some(value) = replacement {
            dataset.set_value(row, idx, value);
        }
    }
    dataset.set_column_type(name, ColumnType::Date);
    debug!(column = name, parsed, "Parsed date column");
}

/// Fill missing values per column type. Returns the number of filled cells.
pub fn fill_missing(dataset: &mut Dataset) -> usize {
    let mut filled = 0usize;
    let columns: Vec<(usize, ColumnType, String)> = dataset
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.ty, c.name.clone()))
        .collect();

    for (idx, ty, name) in columns {
        let missing: Vec<usize> = (0..dataset.len())
            .filter(|&row| {
                dataset.rows()[row]
                    .get(idx)
                    .map(Value::is_missing)
                    .unwrap_or(false)
            })
            .collect();
        if missing.is_empty() {
            continue;
        }

        match ty {
            ColumnType::Numeric => {
                if let Some(median) = column_median(dataset, idx) {
                    for row in &missing {
                        dataset.set_value(*row, idx, Value::Number(median));
                        filled += 1;
                    }
                    debug!(column = %name, median, "Filled numeric column with median");
                }
            }
            ColumnType::Date => {
                filled += fill_dates(dataset, idx);
            }
            ColumnType::Categorical | ColumnType::Text => {
                let fill = column_mode(dataset, idx).unwrap_or_else(|| "unknown".to_string());
                for row in &missing {
                    dataset.set_value(*row, idx, Value::Text(fill.clone()));
                    filled += 1;
                }
            }
        }
    }
    filled
}

fn column_median(dataset: &Dataset, idx: usize) -> Option<f64> {
    let mut values: Vec<f64> = dataset
        .rows()
        .iter()
        .filter_map(|r| r.get(idx).and_then(Value::as_number))
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

fn column_mode(dataset: &Dataset, idx: usize) -> Option<String> {
    let mut counts: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
    for record in dataset.rows() {
        if let Some(Value::Text(s)) = record.get(idx) {
            *counts.entry(s.as_str()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(value, _)| value.to_string())
}

/// Forward-fill then backward-fill a date column.
fn fill_dates(dataset: &mut Dataset, idx: usize) -> usize {
    let mut filled = 0usize;
    let mut last: Option<NaiveDate> = None;
    for row in 0..dataset.len() {
        match dataset.rows()[row].get(idx).and_then(Value::as_date) {
            Some(d) => last = Some(d),
            None => {
                if let Some(d) = last {
                    dataset.set_value(row, idx, Value::Date(d));
                    filled += 1;
                }
            }
        }
    }
    let mut next: Option<NaiveDate> = None;
    for row in (0..dataset.len()).rev() {
        match dataset.rows()[row].get(idx).and_then(Value::as_date) {
            Some(d) => next = Some(d),
            None => {
                if let Some(d) = next {
                    dataset.set_value(row, idx, Value::Date(d));
                    filled += 1;
                }
            }
        }
    }
    filled
}

/// Add derived ratio metric columns. A cell is computed only when both
/// operands are present and the denominator is non-zero; otherwise it is
/// explicitly missing, never NaN or infinite.
pub fn derive_metrics(dataset: &mut Dataset) -> Vec<String> {
    let mut added = Vec::new();
    for (name, numerator, denominator, scale) in DERIVED_METRICS {
        if dataset.has_column(name) {
            continue;
        }
        let (Some(num), Some(den)) = (
            dataset.numeric_series(numerator),
            dataset.numeric_series(denominator),
        ) else {
            continue;
        };

        let values: Vec<Value> = num
            .iter()
            .zip(den.iter())
            .map(|(n, d)| match (n, d) {
                (Some(n), Some(d)) if *d != 0.0 => Value::Number(n / d * scale),
                _ => Value::Missing,
            })
            .collect();

        dataset.add_column(*name, ColumnType::Numeric, values);
        added.push(name.to_string());
    }
    if !added.is_empty() {
        debug!(metrics = ?added, "Derived ratio metric columns");
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ads_dataset() -> Dataset {
        let mut ds = Dataset::new(vec![
            "date".to_string(),
            "impressions".to_string(),
            "clicks".to_string(),
            "spend".to_string(),
        ]);
        ds.push_row(vec![
            Value::Text("2024-03-01".to_string()),
            Value::Number(1000.0),
            Value::Number(30.0),
            Value::Number(50.0),
        ]);
        ds.push_row(vec![
            Value::Text("2024-03-02".to_string()),
            Value::Number(1200.0),
            Value::Number(0.0),
            Value::Number(55.0),
        ]);
        ds.push_row(vec![
            Value::Text("2024-03-03".to_string()),
            Value::Number(900.0),
            Value::Missing,
            Value::Number(48.0),
        ]);
        ds.infer_column_types();
        ds
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2024-03-01"), Some(date(2024, 3, 1)));
        assert_eq!(parse_date("03/15/2024"), Some(date(2024, 3, 15)));
        assert_eq!(parse_date("2024/03/01"), Some(date(2024, 3, 1)));
        assert_eq!(
            parse_date("2024-03-01T08:30:00Z"),
            Some(date(2024, 3, 1))
        );
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_detect_date_columns_respects_exclusions() {
        let ds = Dataset::new(vec![
            "date".to_string(),
            "start_date".to_string(),
            "spend".to_string(),
            "conversion_rate".to_string(),
        ]);
        let detected = detect_date_columns(&ds);
        assert_eq!(detected, vec!["date", "start_date"]);
    }

    #[test]
    fn test_transform_parses_dates_and_fills_missing() {
        let summary = transform(ads_dataset());
        let ds = &summary.dataset;

        assert_eq!(summary.date_columns, vec!["date"]);
        assert_eq!(
            ds.value(0, "date"),
            Some(&Value::Date(date(2024, 3, 1)))
        );
        // Missing clicks filled with the column median of [30, 0]
        assert_eq!(ds.value(2, "clicks"), Some(&Value::Number(15.0)));
        assert!(summary.filled_cells >= 1);
    }

    #[test]
    fn test_derived_metrics_guard_zero_denominators() {
        let summary = transform(ads_dataset());
        let ds = &summary.dataset;

        assert!(summary.derived_columns.contains(&"ctr".to_string()));
        assert_eq!(ds.value(0, "ctr"), Some(&Value::Number(3.0)));
        // Day 2 has zero clicks: cpc must be missing, never infinite
        assert_eq!(ds.value(1, "cpc"), Some(&Value::Missing));
        // cpm = spend / impressions * 1000
        assert_eq!(ds.value(0, "cpm"), Some(&Value::Number(50.0)));
    }

    #[test]
    fn test_derived_metrics_skip_absent_operands() {
        let mut ds = Dataset::new(vec!["spend".to_string()]);
        ds.push_row(vec![Value::Number(10.0)]);
        ds.infer_column_types();

        let added = derive_metrics(&mut ds);
        assert!(added.is_empty());
        assert!(!ds.has_column("roas"));
    }

    #[test]
    fn test_fill_dates_forward_and_backward() {
        let mut ds = Dataset::new(vec!["date".to_string()]);
        ds.push_row(vec![Value::Missing]);
        ds.push_row(vec![Value::Date(date(2024, 1, 2))]);
        ds.push_row(vec![Value::Missing]);
        ds.set_column_type("date", ColumnType::Date);

        let filled = fill_missing(&mut ds);
        assert_eq!(filled, 2);
        assert_eq!(ds.value(0, "date"), Some(&Value::Date(date(2024, 1, 2))));
        assert_eq!(ds.value(2, "date"), Some(&Value::Date(date(2024, 1, 2))));
    }

    #[test]
    fn test_text_mode_fill() {
        let mut ds = Dataset::new(vec!["region".to_string()]);
        ds.push_row(vec![Value::Text("north".to_string())]);
        ds.push_row(vec![Value::Text("north".to_string())]);
        ds.push_row(vec![Value::Missing]);
        ds.infer_column_types();

        fill_missing(&mut ds);
        assert_eq!(ds.value(2, "region"), Some(&Value::Text("north".to_string())));
    }
}
