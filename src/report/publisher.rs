//! Report publishers - where reports show up for reviewers

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Comment '{0}' not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Host-side target for report bodies: one comment per change, edited in place
#[async_trait]
pub trait ReportPublisher: Send + Sync {
    /// Create a comment for a change and return its id
    async fn create(&self, change_id: &str, body: &str) -> Result<String, PublishError>;

    /// Replace the body of an existing comment
    async fn update(&self, comment_id: &str, body: &str) -> Result<(), PublishError>;
}

/// Publisher that keeps one markdown file per change in a directory
#[derive(Debug, Clone)]
pub struct FileReportPublisher {
    dir: PathBuf,
}

impl FileReportPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name (and comment id) for a change
    ///
    /// A readable prefix plus a hash of the raw id, so ids that sanitize to
    /// the same prefix still get distinct files.
    pub fn file_name(change_id: &str) -> String {
        let safe: String = change_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || "-_.".contains(c) { c } else { '_' })
            .collect();
        let digest = hex::encode(Sha256::digest(change_id.as_bytes()));
        format!("{}-{}.md", safe, &digest[..12])
    }
}

#[async_trait]
impl ReportPublisher for FileReportPublisher {
    async fn create(&self, change_id: &str, body: &str) -> Result<String, PublishError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = Self::file_name(change_id);
        tokio::fs::write(self.dir.join(&name), body).await?;
        debug!("Created report file {}", name);
        Ok(name)
    }

    async fn update(&self, comment_id: &str, body: &str) -> Result<(), PublishError> {
        let path = self.dir.join(comment_id);
        if !tokio::fs::try_exists(&path).await? {
            return Err(PublishError::NotFound(comment_id.to_string()));
        }
        tokio::fs::write(&path, body).await?;
        debug!("Updated report file {}", comment_id);
        Ok(())
    }
}
