//! Tabular data model shared by every pipeline stage.
//!
//! A [`Dataset`] is an ordered collection of [`Record`]s sharing one column
//! schema. Missing values are always explicit ([`Value::Missing`]), never
//! absent: every record holds exactly one value per column.

use chrono::NaiveDate;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Numeric cell.
    Number(f64),
    /// Calendar-date cell.
    Date(NaiveDate),
    /// Free-text or categorical cell.
    Text(String),
    /// Explicitly missing cell.
    Missing,
}

impl Value {
    /// Whether this cell is missing.
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the cell, if it holds a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Date view of the cell, if it holds a date.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Text view of the cell, if it holds text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a raw string cell: empty -> Missing, numeric -> Number,
    /// otherwise Text. Dates are recognized later by the transformer,
    /// which knows which columns are date-like.
    pub fn parse(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Missing;
        }
        if let Ok(n) = trimmed.replace(',', "").parse::<f64>() {
            if n.is_finite() {
                return Value::Number(n);
            }
        }
        Value::Text(trimmed.to_string())
    }
}

/// Inferred column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// All non-missing values are numbers.
    Numeric,
    /// All non-missing values are dates.
    Date,
    /// Text with a small set of distinct values, usable as a grouping key.
    Categorical,
    /// Free text.
    Text,
}

/// A column in the dataset schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Normalized (snake_case) column name.
    pub name: String,
    /// Inferred type.
    pub ty: ColumnType,
}

/// One row of the dataset, aligned with the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Cell values, one per schema column.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Cell at the given column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

/// An ordered collection of records sharing one column schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: Vec<Record>,
}

/// Distinct-value cap below which a text column is considered categorical.
const CATEGORICAL_MAX_DISTINCT: usize = 25;

impl Dataset {
    /// Create an empty dataset with the given column names. Types start as
    /// `Text` and are refined by [`Dataset::infer_column_types`].
    pub fn new(column_names: Vec<String>) -> Self {
        let columns = column_names
            .into_iter()
            .map(|name| Column {
                name,
                ty: ColumnType::Text,
            })
            .collect();
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column schema.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Whether the schema contains a column.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// All rows.
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Row count.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row. Rows shorter than the schema are padded with
    /// `Missing`; longer rows are truncated. This keeps the one-value-per-
    /// column invariant by construction.
    pub fn push_row(&mut self, mut values: Vec<Value>) {
        values.resize(self.columns.len(), Value::Missing);
        self.rows.push(Record { values });
    }

    /// Cell at (row, column name).
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Overwrite a cell. Out-of-range coordinates are ignored.
    pub fn set_value(&mut self, row: usize, column_index: usize, value: Value) {
        if let Some(record) = self.rows.get_mut(row) {
            if let Some(cell) = record.values.get_mut(column_index) {
                *cell = value;
            }
        }
    }

    /// Append a new column with one value per existing row. Shorter value
    /// lists are padded with `Missing`.
    pub fn add_column(&mut self, name: impl Into<String>, ty: ColumnType, mut values: Vec<Value>) {
        values.resize(self.rows.len(), Value::Missing);
        self.columns.push(Column {
            name: name.into(),
            ty,
        });
        for (record, value) in self.rows.iter_mut().zip(values) {
            record.values.push(value);
        }
    }

    /// Replace a column's inferred type.
    pub fn set_column_type(&mut self, name: &str, ty: ColumnType) {
        if let Some(idx) = self.column_index(name) {
            self.columns[idx].ty = ty;
        }
    }

    /// Numeric series for a column: one entry per row, `None` where the
    /// cell is missing or non-numeric.
    pub fn numeric_series(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|r| r.get(idx).and_then(Value::as_number))
                .collect(),
        )
    }

    /// Date series for a column: one entry per row.
    pub fn date_series(&self, name: &str) -> Option<Vec<Option<NaiveDate>>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|r| r.get(idx).and_then(Value::as_date))
                .collect(),
        )
    }

    /// Names of columns inferred numeric.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.ty == ColumnType::Numeric)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Names of columns inferred as dates.
    pub fn date_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.ty == ColumnType::Date)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Names of columns usable as grouping keys.
    pub fn categorical_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.ty == ColumnType::Categorical)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Count of missing cells across the dataset.
    pub fn missing_cells(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.values.iter().filter(|v| v.is_missing()).count())
            .sum()
    }

    /// Re-infer every column's type from its current values.
    ///
    /// A column is Numeric (or Date) when every non-missing value is a
    /// number (or date). Text columns with few distinct values become
    /// Categorical; anything else stays Text. All-missing columns stay Text.
    pub fn infer_column_types(&mut self) {
        for idx in 0..self.columns.len() {
            let mut saw_any = false;
            let mut all_numeric = true;
            let mut all_dates = true;
            let mut distinct = std::collections::BTreeSet::new();

            for record in &self.rows {
                match record.get(idx) {
                    Some(Value::Missing) | None => continue,
                    Some(Value::Number(_)) => {
                        saw_any = true;
                        all_dates = false;
                    }
                    Some(Value::Date(_)) => {
                        saw_any = true;
                        all_numeric = false;
                    }
                    Some(Value::Text(s)) => {
                        saw_any = true;
                        all_numeric = false;
                        all_dates = false;
                        distinct.insert(s.clone());
                    }
                }
            }

            self.columns[idx].ty = if !saw_any {
                ColumnType::Text
            } else if all_numeric {
                ColumnType::Numeric
            } else if all_dates {
                ColumnType::Date
            } else if !distinct.is_empty() && distinct.len() <= CATEGORICAL_MAX_DISTINCT {
                ColumnType::Categorical
            } else {
                ColumnType::Text
            };
        }
    }
}

/// Normalize a raw column name to snake_case: lowercase, whitespace/dash/dot
/// runs become a single underscore, other punctuation is stripped.
pub fn normalize_column_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;
    for ch in raw.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_underscore = false;
        } else if matches!(ch, ' ' | '\t' | '-' | '.' | '_') {
            if !last_underscore && !out.is_empty() {
                out.push('_');
                last_underscore = true;
            }
        }
        // other punctuation is dropped
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
