use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Narrative error: {0}")]
    Narrative(#[from] NarrativeError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Ingestion errors: unreadable or malformed source files
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {kind} file {path}: {message}")]
    Malformed {
        kind: String,
        path: String,
        message: String,
    },

    #[error("No usable data files found in {path}")]
    NoUsableFiles { path: String },
}

/// KPI engine errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Insufficient data: {reason}")]
    InsufficientData { reason: String },
}

/// Narrative collaborator errors
#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("Narrative service unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Report assembly errors
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Incomplete report: {message}")]
    IncompleteReport { message: String },
}

/// Renderer collaborator errors
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No renderer registered for format {format}")]
    NoRenderer { format: String },

    #[error("Rendering to {format} failed: {message}")]
    Failed { format: String, message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Report request not found: {request_id}")]
    RequestNotFound { request_id: String },

    #[error("Illegal status transition for {request_id}: {from} -> {to}")]
    IllegalTransition {
        request_id: String,
        from: String,
        to: String,
    },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for ingestion
pub type IngestResult<T> = Result<T, IngestError>;

/// Result type alias for the KPI engine
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Result type alias for narrative operations
pub type NarrativeResult<T> = Result<T, NarrativeError>;

/// Result type alias for rendering
pub type RenderResult<T> = Result<T, RenderError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_ingest_error_display() {
        let err = IngestError::Malformed {
            kind: "csv".to_string(),
            path: "data.csv".to_string(),
            message: "unequal row lengths".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed csv file data.csv: unequal row lengths"
        );

        let err = IngestError::NoUsableFiles {
            path: "/tmp/upload".to_string(),
        };
        assert_eq!(err.to_string(), "No usable data files found in /tmp/upload");
    }

    #[test]
    fn test_analysis_error_display() {
        let err = AnalysisError::InsufficientData {
            reason: "no numeric columns".to_string(),
        };
        assert_eq!(err.to_string(), "Insufficient data: no numeric columns");
    }

    #[test]
    fn test_narrative_error_display() {
        let err = NarrativeError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(
            err.to_string(),
            "Narrative service unavailable: server down (retries: 3)"
        );

        let err = NarrativeError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = NarrativeError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_report_error_display() {
        let err = ReportError::IncompleteReport {
            message: "no computable metrics".to_string(),
        };
        assert_eq!(err.to_string(), "Incomplete report: no computable metrics");
    }

    #[test]
    fn test_render_error_display() {
        let err = RenderError::NoRenderer {
            format: "pptx".to_string(),
        };
        assert_eq!(err.to_string(), "No renderer registered for format pptx");

        let err = RenderError::Failed {
            format: "pdf".to_string(),
            message: "writer crashed".to_string(),
        };
        assert_eq!(err.to_string(), "Rendering to pdf failed: writer crashed");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Database connection failed: failed to connect"
        );

        let err = StorageError::RequestNotFound {
            request_id: "req-123".to_string(),
        };
        assert_eq!(err.to_string(), "Report request not found: req-123");

        let err = StorageError::IllegalTransition {
            request_id: "req-123".to_string(),
            from: "done".to_string(),
            to: "processing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Illegal status transition for req-123: done -> processing"
        );
    }

    #[test]
    fn test_ingest_error_conversion_to_app_error() {
        let err = IngestError::NoUsableFiles {
            path: "uploads/abc".to_string(),
        };
        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::Ingest(_)));
    }

    #[test]
    fn test_analysis_error_conversion_to_app_error() {
        let err = AnalysisError::InsufficientData {
            reason: "empty dataset".to_string(),
        };
        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::Analysis(_)));
        assert!(app_err.to_string().contains("empty dataset"));
    }

    #[test]
    fn test_narrative_error_conversion_to_app_error() {
        let err = NarrativeError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::Narrative(_)));
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let err = StorageError::RequestNotFound {
            request_id: "test-123".to_string(),
        };
        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }
}
