//! Run-scoped working trees

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// The directory a run's steps execute in
///
/// An isolated workspace is a fresh copy of the source tree, removed when
/// the workspace is dropped. An in-place workspace is the source itself.
#[derive(Debug)]
pub enum Workspace {
    Isolated { dir: TempDir, source: PathBuf },
    InPlace(PathBuf),
}

impl Workspace {
    /// Copy `source` into a new temporary directory
    ///
    /// The copy runs on the blocking pool.
    pub async fn isolated(source: &Path) -> Result<Self> {
        let source = source.to_path_buf();
        tokio::task::spawn_blocking(move || Self::copy_of(source))
            .await
            .context("Workspace copy task failed")?
    }

    fn copy_of(source: PathBuf) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("iac-verify-")
            .tempdir()
            .context("Failed to create workspace directory")?;

        info!(
            "Preparing workspace {} from {}",
            dir.path().display(),
            source.display()
        );
        copy_tree(&source, dir.path(), &mut Vec::new())
            .with_context(|| format!("Failed to copy {} into workspace", source.display()))?;

        Ok(Workspace::Isolated { dir, source })
    }

    pub fn in_place(source: &Path) -> Result<Self> {
        if !source.is_dir() {
            anyhow::bail!("Source tree {} is not a directory", source.display());
        }
        Ok(Workspace::InPlace(source.to_path_buf()))
    }

    pub fn path(&self) -> &Path {
        match self {
            Workspace::Isolated { dir, .. } => dir.path(),
            Workspace::InPlace(path) => path,
        }
    }

    pub fn source(&self) -> &Path {
        match self {
            Workspace::Isolated { source, .. } => source,
            Workspace::InPlace(path) => path,
        }
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self, Workspace::Isolated { .. })
    }
}

/// Recursively copy a tree, leaving out VCS metadata
///
/// Symlinks are followed and copied as their targets. `ancestors` holds the
/// canonical directories being copied, so a link back up the tree is skipped.
fn copy_tree(from: &Path, to: &Path, ancestors: &mut Vec<PathBuf>) -> Result<()> {
    let real = fs::canonicalize(from).with_context(|| format!("Failed to resolve {}", from.display()))?;
    if ancestors.contains(&real) {
        warn!("Skipping symlink loop at {}", from.display());
        return Ok(());
    }
    ancestors.push(real);

    for entry in fs::read_dir(from).with_context(|| format!("Failed to read {}", from.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }

        let path = entry.path();
        let target = to.join(&name);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if entry.file_type()?.is_symlink() => {
                warn!("Skipping dangling symlink {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
        };

        if metadata.is_dir() {
            fs::create_dir_all(&target)?;
            copy_tree(&path, &target, ancestors)?;
        } else if metadata.is_file() {
            fs::copy(&path, &target)?;
        } else {
            debug!("Skipping special file {}", path.display());
        }
    }

    ancestors.pop();
    Ok(())
}
