//! Ingestor: reads structured source files and merges them into one
//! [`Dataset`] with a unified, normalized schema.
//!
//! Supported sources are CSV files and JSON files holding an array of
//! objects (or `{"data": [...]}`). Rows from every source are concatenated
//! under the union of their normalized column schemas; columns a source
//! does not carry are filled with explicit missing values.

use std::fs;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use tracing::{info, warn};

use crate::dataset::{normalize_column_name, Dataset, Value};
use crate::error::{IngestError, IngestResult};

/// Per-file ingestion stats.
#[derive(Debug, Clone)]
pub struct FileStats {
    pub filename: String,
    pub kind: FileKind,
    pub rows: usize,
    pub columns: usize,
    /// Rows skipped because they could not be parsed.
    pub parse_errors: usize,
}

/// Source file kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Json,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Csv => write!(f, "csv"),
            FileKind::Json => write!(f, "json"),
        }
    }
}

/// Result of ingesting an upload: the merged dataset plus per-file stats.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub dataset: Dataset,
    pub files: Vec<FileStats>,
}

/// Ingest every supported file in a directory.
///
/// Files are processed in name order so repeated runs over the same upload
/// produce the same dataset.
pub fn ingest_dir(dir: &Path) -> IngestResult<IngestSummary> {
    let entries = fs::read_dir(dir).map_err(|source| IngestError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| file_kind(p).is_some())
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(IngestError::NoUsableFiles {
            path: dir.display().to_string(),
        });
    }

    ingest_files(&paths)
}

/// Ingest an explicit list of files.
pub fn ingest_files(paths: &[PathBuf]) -> IngestResult<IngestSummary> {
    let mut datasets = Vec::new();
    let mut files = Vec::new();

    for path in paths {
        let kind = file_kind(path).ok_or_else(|| IngestError::Malformed {
            kind: "unknown".to_string(),
            path: path.display().to_string(),
            message: "unsupported file extension".to_string(),
        })?;

        let (dataset, parse_errors) = match kind {
            FileKind::Csv => read_csv_file(path)?,
            FileKind::Json => (read_json_file(path)?, 0),
        };

        info!(
            file = %path.display(),
            kind = %kind,
            rows = dataset.len(),
            columns = dataset.columns().len(),
            "Ingested source file"
        );

        files.push(FileStats {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            kind,
            rows: dataset.len(),
            columns: dataset.columns().len(),
            parse_errors,
        });
        datasets.push(dataset);
    }

    if datasets.is_empty() {
        return Err(IngestError::NoUsableFiles {
            path: "<file list>".to_string(),
        });
    }

    let mut dataset = merge_datasets(datasets);
    dataset.infer_column_types();

    info!(
        rows = dataset.len(),
        columns = dataset.columns().len(),
        sources = files.len(),
        "Merged ingested sources"
    );

    Ok(IngestSummary { dataset, files })
}

/// Read one CSV file. Returns the dataset plus the count of skipped rows.
pub fn read_csv_file(path: &Path) -> IngestResult<(Dataset, usize)> {
    let file = fs::File::open(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);

    let headers = rdr
        .headers()
        .map_err(|e| IngestError::Malformed {
            kind: "csv".to_string(),
            path: path.display().to_string(),
            message: e.to_string(),
        })?
        .clone();

    let mut dataset = Dataset::new(normalized_headers(headers.iter()));
    let mut parse_errors = 0usize;

    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unparseable CSV row");
                parse_errors += 1;
                continue;
            }
        };
        dataset.push_row(record.iter().map(Value::parse).collect());
    }

    Ok((dataset, parse_errors))
}

/// Read one JSON file holding an array of objects or `{"data": [...]}`.
pub fn read_json_file(path: &Path) -> IngestResult<Dataset> {
    let text = fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let parsed: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| IngestError::Malformed {
            kind: "json".to_string(),
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let records = match parsed {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::Array(items)) = map.get("data") {
                items.clone()
            } else {
                // A bare object is a single record
                vec![serde_json::Value::Object(map)]
            }
        }
        _ => {
            return Err(IngestError::Malformed {
                kind: "json".to_string(),
                path: path.display().to_string(),
                message: "expected an array of objects or {\"data\": [...]}".to_string(),
            })
        }
    };

    // Union of keys across records, in first-seen order
    let mut names: Vec<String> = Vec::new();
    for record in &records {
        if let serde_json::Value::Object(map) = record {
            for key in map.keys() {
                let normalized = normalize_column_name(key);
                if !normalized.is_empty() && !names.contains(&normalized) {
                    names.push(normalized);
                }
            }
        }
    }

    if names.is_empty() {
        return Err(IngestError::Malformed {
            kind: "json".to_string(),
            path: path.display().to_string(),
            message: "no object records found".to_string(),
        });
    }

    let mut dataset = Dataset::new(names.clone());
    for record in &records {
        let serde_json::Value::Object(map) = record else {
            continue;
        };
        let row = names
            .iter()
            .map(|name| {
                map.iter()
                    .find(|(k, _)| normalize_column_name(k) == *name)
                    .map(|(_, v)| json_cell(v))
                    .unwrap_or(Value::Missing)
            })
            .collect();
        dataset.push_row(row);
    }

    Ok(dataset)
}

/// Concatenate datasets under the union of their schemas.
pub fn merge_datasets(datasets: Vec<Dataset>) -> Dataset {
    let mut names: Vec<String> = Vec::new();
    for ds in &datasets {
        for column in ds.columns() {
            if !names.contains(&column.name) {
                names.push(column.name.clone());
            }
        }
    }

    let mut merged = Dataset::new(names.clone());
    for ds in &datasets {
        let positions: Vec<Option<usize>> = names
            .iter()
            .map(|name| ds.column_index(name))
            .collect();
        for record in ds.rows() {
            let row = positions
                .iter()
                .map(|pos| {
                    pos.and_then(|idx| record.get(idx).cloned())
                        .unwrap_or(Value::Missing)
                })
                .collect();
            merged.push_row(row);
        }
    }
    merged
}

fn normalized_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (i, header) in raw.enumerate() {
        let mut name = normalize_column_name(header);
        if name.is_empty() {
            name = format!("column_{}", i + 1);
        }
        // Disambiguate duplicate headers
        while names.contains(&name) {
            name.push_str("_2");
        }
        names.push(name);
    }
    names
}

fn json_cell(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Missing,
        serde_json::Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(Value::Number)
            .unwrap_or(Value::Missing),
        serde_json::Value::Bool(b) => Value::Text(b.to_string()),
        serde_json::Value::String(s) => Value::parse(s),
        other => Value::Text(other.to_string()),
    }
}

fn file_kind(path: &Path) -> Option<FileKind> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("csv") => Some(FileKind::Csv),
        Some("json") => Some(FileKind::Json),
        _ => None,
    }
}
