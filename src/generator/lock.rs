//! Cross-process run lock
//!
//! An advisory exclusive lock on a file next to the generation state.
//! Every open of the lock file is a separate lock holder, so two
//! generators in one process exclude each other the same way two
//! processes do. The lock is released when the guard is dropped or the
//! holding process exits.

use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct RunLock {
    path: PathBuf,
}

/// Held lock; dropping it releases the lock
#[derive(Debug)]
pub struct RunLockGuard {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Lock living next to `state_file`, named `<state_file>.lock`
    pub fn beside(state_file: &Path) -> Self {
        let mut name = state_file
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("generation"));
        name.push(".lock");
        Self::new(state_file.with_file_name(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock if nobody holds it; `None` when it is held elsewhere
    pub fn try_acquire(&self) -> AppResult<Option<RunLockGuard>> {
        let file = open_lock_file(&self.path).map_err(|e| self.error(e))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(RunLockGuard {
                file,
                path: self.path.clone(),
            })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(self.error(e)),
        }
    }

    /// Wait until the lock is free and take it
    pub async fn acquire(&self) -> AppResult<RunLockGuard> {
        let path = self.path.clone();
        let file = tokio::task::spawn_blocking(move || {
            let file = open_lock_file(&path)?;
            file.lock_exclusive()?;
            Ok::<_, io::Error>(file)
        })
        .await
        .map_err(|e| AppError::internal(format!("Run lock task failed: {}", e)))?
        .map_err(|e| self.error(e))?;

        Ok(RunLockGuard {
            file,
            path: self.path.clone(),
        })
    }

    fn error(&self, source: io::Error) -> AppError {
        AppError::internal(format!(
            "Cannot lock {}: {}",
            self.path.display(),
            source
        ))
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release run lock {}: {}", self.path.display(), e);
        }
    }
}
