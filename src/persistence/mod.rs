//! Persistence layer for change reports

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteReportStore;

use crate::report::Report;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// A report as kept by a store, with the host comment it maps onto
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReport {
    pub report: Report,

    /// Identifier of the host-side comment, once one has been created
    pub comment_id: Option<String>,

    pub updated_at: DateTime<Utc>,
}

/// Error types for report stores
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another writer committed a revision first
    #[error("Revision conflict for change '{change_id}': expected revision {expected}")]
    Conflict { change_id: String, expected: u64 },

    #[error("Report for change '{0}' not found")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Backend(String),
}

/// Trait for report store backends
///
/// `commit` is a compare-and-increment: it succeeds only when the stored
/// revision equals `expected_revision` (0 meaning "no report yet").
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    /// Load the report for a change
    async fn load(&self, change_id: &str) -> Result<Option<StoredReport>, StoreError>;

    /// Write `report` if the stored revision is still `expected_revision`
    async fn commit(&self, report: &Report, expected_revision: u64) -> Result<(), StoreError>;

    /// Remember the host comment id for a change
    async fn set_comment_id(&self, change_id: &str, comment_id: &str) -> Result<(), StoreError>;

    /// List all stored reports
    async fn list(&self) -> Result<Vec<StoredReport>, StoreError>;
}

/// In-memory report store (for testing or ephemeral use)
pub struct InMemoryReportStore {
    reports: RwLock<HashMap<String, StoredReport>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            reports: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReportStore for InMemoryReportStore {
    async fn load(&self, change_id: &str) -> Result<Option<StoredReport>, StoreError> {
        let reports = self.reports.read().await;
        Ok(reports.get(change_id).cloned())
    }

    async fn commit(&self, report: &Report, expected_revision: u64) -> Result<(), StoreError> {
        let mut reports = self.reports.write().await;
        let current = reports.get(&report.change_id).map_or(0, |r| r.report.revision);

        if current != expected_revision {
            return Err(StoreError::Conflict {
                change_id: report.change_id.clone(),
                expected: expected_revision,
            });
        }

        let comment_id = reports
            .get(&report.change_id)
            .and_then(|r| r.comment_id.clone());
        reports.insert(
            report.change_id.clone(),
            StoredReport {
                report: report.clone(),
                comment_id,
                updated_at: Utc::now(),
            },
        );

        Ok(())
    }

    async fn set_comment_id(&self, change_id: &str, comment_id: &str) -> Result<(), StoreError> {
        let mut reports = self.reports.write().await;
        match reports.get_mut(change_id) {
            Some(stored) => {
                stored.comment_id = Some(comment_id.to_string());
                Ok(())
            }
            None => Err(StoreError::NotFound(change_id.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<StoredReport>, StoreError> {
        let reports = self.reports.read().await;
        let mut all: Vec<_> = reports.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }
}
