use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{ReportRequest, RequestStatus, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::render::ReportFormat;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply a terminal update guarded by the allowed source statuses.
    async fn guarded_update(
        &self,
        id: &str,
        to: RequestStatus,
        output_path: Option<&str>,
        error: Option<&str>,
    ) -> StorageResult<ReportRequest> {
        let completed_at = matches!(to, RequestStatus::Done | RequestStatus::Failed)
            .then(|| Utc::now().to_rfc3339());

        // The lifecycle admits at most two source statuses per target; the
        // guard and the write happen in one statement so there is a single
        // writer at a time per request id.
        let allowed = allowed_sources(to);
        let (first, second) = match allowed.as_slice() {
            [only] => (only.to_string(), only.to_string()),
            [first, second] => (first.to_string(), second.to_string()),
            _ => {
                return Err(StorageError::IllegalTransition {
                    request_id: id.to_string(),
                    from: "any".to_string(),
                    to: to.to_string(),
                })
            }
        };

        let result = sqlx::query(
            r#"
            UPDATE report_requests
            SET status = ?, completed_at = ?, output_path = ?, error = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(to.to_string())
        .bind(&completed_at)
        .bind(output_path)
        .bind(error)
        .bind(id)
        .bind(first)
        .bind(second)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing record from an illegal transition
            let current = self.get_request(id).await?;
            return match current {
                None => Err(StorageError::RequestNotFound {
                    request_id: id.to_string(),
                }),
                Some(request) => Err(StorageError::IllegalTransition {
                    request_id: id.to_string(),
                    from: request.status.to_string(),
                    to: to.to_string(),
                }),
            };
        }

        self.get_request(id).await?.ok_or(StorageError::RequestNotFound {
            request_id: id.to_string(),
        })
    }
}

/// Statuses allowed to move to `to`.
fn allowed_sources(to: RequestStatus) -> Vec<RequestStatus> {
    [
        RequestStatus::Queued,
        RequestStatus::Processing,
        RequestStatus::Done,
        RequestStatus::Failed,
    ]
    .into_iter()
    .filter(|from| from.can_transition_to(to))
    .collect()
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_request(&self, request: &ReportRequest) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO report_requests
                (id, upload_id, format, title, status, created_at, completed_at, output_path, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.id)
        .bind(&request.upload_id)
        .bind(request.format.to_string())
        .bind(&request.title)
        .bind(request.status.to_string())
        .bind(request.created_at.to_rfc3339())
        .bind(request.completed_at.map(|t| t.to_rfc3339()))
        .bind(&request.output_path)
        .bind(&request.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_request(&self, id: &str) -> StorageResult<Option<ReportRequest>> {
        let row: Option<RequestRow> = sqlx::query_as(
            r#"
            SELECT id, upload_id, format, title, status, created_at, completed_at, output_path, error
            FROM report_requests
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReportRequest::try_from).transpose()
    }

    async fn list_requests(&self) -> StorageResult<Vec<ReportRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(
            r#"
            SELECT id, upload_id, format, title, status, created_at, completed_at, output_path, error
            FROM report_requests
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReportRequest::try_from).collect()
    }

    async fn transition(&self, id: &str, to: RequestStatus) -> StorageResult<ReportRequest> {
        self.guarded_update(id, to, None, None).await
    }

    async fn mark_done(&self, id: &str, output_path: &str) -> StorageResult<ReportRequest> {
        self.guarded_update(id, RequestStatus::Done, Some(output_path), None)
            .await
    }

    async fn mark_failed(&self, id: &str, error: &str) -> StorageResult<ReportRequest> {
        self.guarded_update(id, RequestStatus::Failed, None, Some(error))
            .await
    }
}

/// Raw database row
#[derive(Debug, sqlx::FromRow)]
struct RequestRow {
    id: String,
    upload_id: String,
    format: String,
    title: String,
    status: String,
    created_at: String,
    completed_at: Option<String>,
    output_path: Option<String>,
    error: Option<String>,
}

impl TryFrom<RequestRow> for ReportRequest {
    type Error = StorageError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let format = ReportFormat::from_str(&row.format).map_err(|e| StorageError::Query {
            message: e,
        })?;
        let status = RequestStatus::from_str(&row.status).map_err(|e| StorageError::Query {
            message: e,
        })?;

        Ok(ReportRequest {
            id: row.id,
            upload_id: row.upload_id,
            format,
            title: row.title,
            status,
            created_at: parse_timestamp(&row.created_at)?,
            completed_at: row.completed_at.as_deref().map(parse_timestamp).transpose()?,
            output_path: row.output_path,
            error: row.error,
        })
    }
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Query {
            message: format!("Invalid timestamp '{}': {}", raw, e),
        })
}
