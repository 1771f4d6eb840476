//! Storage layer for report-request lifecycle state.
//!
//! Every generation request is a finite-state record
//! (`queued -> processing -> done | failed`) persisted in SQLite. The
//! store is the only state shared between concurrent requests; status
//! transitions are validated and applied in a single guarded update, so
//! there is one writer at a time per request id.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::render::ReportFormat;

/// Lifecycle state of a report-generation request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Accepted, not yet picked up.
    #[default]
    Queued,
    /// A worker task is running the pipeline.
    Processing,
    /// Output is ready for download.
    Done,
    /// The pipeline aborted; `error` holds the user-visible message.
    Failed,
}

impl RequestStatus {
    /// Whether the lifecycle permits moving to `next`.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Queued, RequestStatus::Processing)
                | (RequestStatus::Queued, RequestStatus::Failed)
                | (RequestStatus::Processing, RequestStatus::Done)
                | (RequestStatus::Processing, RequestStatus::Failed)
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Queued => write!(f, "queued"),
            RequestStatus::Processing => write!(f, "processing"),
            RequestStatus::Done => write!(f, "done"),
            RequestStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(RequestStatus::Queued),
            "processing" => Ok(RequestStatus::Processing),
            "done" => Ok(RequestStatus::Done),
            "failed" => Ok(RequestStatus::Failed),
            _ => Err(format!("Unknown request status: {}", s)),
        }
    }
}

/// A report-generation request record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Unique request identifier.
    pub id: String,
    /// Upload batch the report is generated from.
    pub upload_id: String,
    /// Requested output format.
    pub format: ReportFormat,
    /// Report title.
    pub title: String,
    /// Current lifecycle state.
    pub status: RequestStatus,
    /// When the request was accepted.
    pub created_at: DateTime<Utc>,
    /// When the request reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Location of the rendered output, set when done.
    pub output_path: Option<String>,
    /// User-visible failure message, set when failed.
    pub error: Option<String>,
}

impl ReportRequest {
    /// Create a new queued request.
    pub fn new(
        upload_id: impl Into<String>,
        format: ReportFormat,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            upload_id: upload_id.into(),
            format,
            title: title.into(),
            status: RequestStatus::Queued,
            created_at: Utc::now(),
            completed_at: None,
            output_path: None,
            error: None,
        }
    }
}

/// Storage backend for request lifecycle records.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a new request.
    async fn create_request(&self, request: &ReportRequest) -> StorageResult<()>;

    /// Fetch a request by id.
    async fn get_request(&self, id: &str) -> StorageResult<Option<ReportRequest>>;

    /// All requests, newest first.
    async fn list_requests(&self) -> StorageResult<Vec<ReportRequest>>;

    /// Move a request to a new status, enforcing the lifecycle.
    async fn transition(&self, id: &str, to: RequestStatus) -> StorageResult<ReportRequest>;

    /// Terminal success: set status done with the output location.
    async fn mark_done(&self, id: &str, output_path: &str) -> StorageResult<ReportRequest>;

    /// Terminal failure: set status failed with the user-visible message.
    async fn mark_failed(&self, id: &str, error: &str) -> StorageResult<ReportRequest>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_round_trip() {
        for status in [
            RequestStatus::Queued,
            RequestStatus::Processing,
            RequestStatus::Done,
            RequestStatus::Failed,
        ] {
            let parsed: RequestStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("pending".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_lifecycle_transitions() {
        use RequestStatus::*;

        assert!(Queued.can_transition_to(Processing));
        assert!(Queued.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Done));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Queued.can_transition_to(Done));
        assert!(!Processing.can_transition_to(Queued));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn test_new_request_starts_queued() {
        let request = ReportRequest::new("upload-1", ReportFormat::Pdf, "Q1 Report");
        assert_eq!(request.status, RequestStatus::Queued);
        assert!(request.completed_at.is_none());
        assert!(request.output_path.is_none());
        assert!(request.error.is_none());
        assert!(!request.id.is_empty());
    }
}
