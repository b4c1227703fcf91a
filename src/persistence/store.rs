//! SQLite-based report store

use crate::persistence::{ReportStore, StoreError, StoredReport};
use crate::report::Report;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// SQLite report store
pub struct SqliteReportStore {
    pool: SqlitePool,
}

impl SqliteReportStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);

        // An in-memory database exists per connection, so keep exactly one
        let max_connections = if db_path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("iac-verify");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("reports.db");
        let db_path = db_path
            .to_str()
            .context("Database path is not valid UTF-8")?;
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                change_id TEXT PRIMARY KEY,
                revision INTEGER NOT NULL,
                body_text TEXT NOT NULL,
                comment_id TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_updated_at ON reports(updated_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn from_row(row: &SqliteRow) -> StoredReport {
        StoredReport {
            report: Report {
                change_id: row.get("change_id"),
                body_text: row.get("body_text"),
                revision: row.get::<i64, _>("revision") as u64,
            },
            comment_id: row.get("comment_id"),
            updated_at: Self::from_naive(row.get("updated_at")),
        }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait::async_trait]
impl ReportStore for SqliteReportStore {
    async fn load(&self, change_id: &str) -> Result<Option<StoredReport>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT change_id, revision, body_text, comment_id, updated_at
            FROM reports
            WHERE change_id = ?1
            "#,
        )
        .bind(change_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.as_ref().map(Self::from_row))
    }

    async fn commit(&self, report: &Report, expected_revision: u64) -> Result<(), StoreError> {
        let now = Self::to_naive(Utc::now());

        let result = (if expected_revision == 0 {
            sqlx::query(
                r#"
                INSERT INTO reports (change_id, revision, body_text, comment_id, updated_at)
                VALUES (?1, ?2, ?3, NULL, ?4)
                ON CONFLICT(change_id) DO NOTHING
                "#,
            )
            .bind(&report.change_id)
            .bind(report.revision as i64)
            .bind(&report.body_text)
            .bind(now)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE reports
                SET revision = ?1, body_text = ?2, updated_at = ?3
                WHERE change_id = ?4 AND revision = ?5
                "#,
            )
            .bind(report.revision as i64)
            .bind(&report.body_text)
            .bind(now)
            .bind(&report.change_id)
            .bind(expected_revision as i64)
            .execute(&self.pool)
            .await
        })
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                change_id: report.change_id.clone(),
                expected: expected_revision,
            });
        }

        Ok(())
    }

    async fn set_comment_id(&self, change_id: &str, comment_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE reports SET comment_id = ?1 WHERE change_id = ?2")
            .bind(comment_id)
            .bind(change_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(change_id.to_string()));
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredReport>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT change_id, revision, body_text, comment_id, updated_at
            FROM reports
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.iter().map(Self::from_row).collect())
    }
}
