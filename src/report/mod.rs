//! Per-change reports: rendering, storage upsert and publishing

pub mod publisher;
pub mod render;

pub use publisher::{FileReportPublisher, PublishError, ReportPublisher};
pub use render::render_report;

use crate::core::config::ReportSettings;
use crate::core::PipelineRun;
use crate::persistence::{ReportStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// The human-readable verification report for one change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub change_id: String,
    pub body_text: String,

    /// Starts at 1 and grows by one with every write
    pub revision: u64,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Gave up on report for change '{change_id}' after {attempts} conflicting writes")]
    Conflict { change_id: String, attempts: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A committed report, plus what went wrong publishing it, if anything
#[derive(Debug, Clone)]
pub struct Upserted {
    pub report: Report,
    pub publish_warning: Option<String>,
}

/// Builds report bodies from runs and upserts them per change id
pub struct ReportBuilder {
    settings: ReportSettings,
    publisher: Option<Arc<dyn ReportPublisher>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,

    /// Comments created on the host whose ids the store has not recorded yet
    unsaved_comments: Mutex<HashMap<String, String>>,
}

impl ReportBuilder {
    pub fn new(settings: ReportSettings) -> Self {
        Self {
            settings,
            publisher: None,
            locks: Mutex::new(HashMap::new()),
            unsaved_comments: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ReportPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    /// Render a run without storing it
    pub fn render(&self, run: &PipelineRun) -> String {
        render_report(run, &self.settings)
    }

    /// Create or replace the report for the run's change id
    ///
    /// Errors only when nothing was committed. Publishing problems after the
    /// commit come back as `publish_warning`.
    pub async fn upsert(
        &self,
        store: &dyn ReportStore,
        run: &PipelineRun,
    ) -> Result<Upserted, ReportError> {
        let change_id = run.context.change_id.as_str();
        let key_lock = self.key_lock(change_id).await;

        let result = {
            let _guard = key_lock.lock().await;
            self.upsert_locked(store, run).await
        };

        self.release_key(change_id, key_lock).await;
        result
    }

    async fn upsert_locked(
        &self,
        store: &dyn ReportStore,
        run: &PipelineRun,
    ) -> Result<Upserted, ReportError> {
        let change_id = &run.context.change_id;
        let body_text = self.render(run);
        let attempts = self.settings.max_conflict_retries + 1;

        for attempt in 1..=attempts {
            let existing = store.load(change_id).await?;
            let expected = existing.as_ref().map_or(0, |s| s.report.revision);
            let report = Report {
                change_id: change_id.clone(),
                body_text: body_text.clone(),
                revision: expected + 1,
            };

            match store.commit(&report, expected).await {
                Ok(()) => {
                    info!(
                        "Stored report for change {} at revision {}",
                        change_id, report.revision
                    );
                    let comment_id = existing.and_then(|s| s.comment_id);
                    let publish_warning = self.publish(store, &report, comment_id).await;
                    return Ok(Upserted {
                        report,
                        publish_warning,
                    });
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(
                        "Revision conflict for change {} (attempt {}/{})",
                        change_id, attempt, attempts
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!("Report for change {} lost {} revision races", change_id, attempts);
        Err(ReportError::Conflict {
            change_id: change_id.clone(),
            attempts,
        })
    }

    /// Push the body to the host, returning a warning on failure
    async fn publish(
        &self,
        store: &dyn ReportStore,
        report: &Report,
        stored_comment: Option<String>,
    ) -> Option<String> {
        let publisher = self.publisher.as_ref()?;
        let change_id = &report.change_id;

        let unsaved = match stored_comment {
            Some(id) => {
                if let Err(e) = publisher.update(&id, &report.body_text).await {
                    warn!("Failed to update comment {} for change {}: {}", id, change_id, e);
                    return Some(format!("Failed to update comment {}: {}", id, e));
                }
                return None;
            }
            None => self.unsaved_comments.lock().await.get(change_id).cloned(),
        };

        let comment_id = match unsaved {
            Some(id) => match publisher.update(&id, &report.body_text).await {
                Ok(()) => id,
                Err(e) => {
                    warn!("Failed to update comment {} for change {}: {}", id, change_id, e);
                    return Some(format!("Failed to update comment {}: {}", id, e));
                }
            },
            None => match publisher.create(change_id, &report.body_text).await {
                Ok(id) => {
                    self.unsaved_comments
                        .lock()
                        .await
                        .insert(change_id.clone(), id.clone());
                    id
                }
                Err(e) => {
                    warn!("Failed to publish report for change {}: {}", change_id, e);
                    return Some(format!("Failed to publish report: {}", e));
                }
            },
        };

        match self.save_comment_id(store, change_id, &comment_id).await {
            Ok(()) => {
                self.unsaved_comments.lock().await.remove(change_id);
                None
            }
            Err(e) => {
                warn!(
                    "Comment {} for change {} was published but not recorded: {}",
                    comment_id, change_id, e
                );
                Some(format!("Comment {} was published but not recorded: {}", comment_id, e))
            }
        }
    }

    async fn save_comment_id(
        &self,
        store: &dyn ReportStore,
        change_id: &str,
        comment_id: &str,
    ) -> Result<(), StoreError> {
        let attempts = self.settings.max_conflict_retries + 1;
        let mut attempt = 1;
        loop {
            match store.set_comment_id(change_id, comment_id).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    debug!(
                        "Recording comment id for change {} failed (attempt {}/{}): {}",
                        change_id, attempt, attempts, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn key_lock(&self, change_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(change_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_key(&self, change_id: &str, key_lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // Only the map and this caller hold it: nobody is waiting
        if Arc::strong_count(&key_lock) == 2 {
            locks.remove(change_id);
        }
    }
}
