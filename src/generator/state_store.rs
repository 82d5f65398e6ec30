//! Persisted generation progress

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::models::GenerationState;
use crate::utils::fs::write_atomic;

/// JSON file holding the [`GenerationState`] between invocations
#[derive(Debug, Clone)]
pub struct GenerationStateStore {
    path: PathBuf,
}

impl GenerationStateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state; a missing file is the initial empty state
    ///
    /// An unreadable file is also treated as empty, so the next pass
    /// starts from page 1 over the existing working document.
    pub async fn load(&self) -> AppResult<GenerationState> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No generation state at {}", self.path.display());
                return Ok(GenerationState::default());
            }
            Err(e) => return Err(AppError::state(&self.path, e.to_string())),
        };

        match serde_json::from_str(&content) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(
                    "Ignoring unreadable generation state {}: {}",
                    self.path.display(),
                    e
                );
                Ok(GenerationState::default())
            }
        }
    }

    pub async fn save(&self, state: &GenerationState) -> AppResult<()> {
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| AppError::state(&self.path, e.to_string()))?;
        write_atomic(&self.path, content)
            .await
            .map_err(|e| AppError::state(&self.path, e.to_string()))
    }
}
