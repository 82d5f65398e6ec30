use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted progress of feed generation
///
/// Transitions consume the current value and return the next one; the
/// caller decides when the result is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationState {
    /// Next page to fetch; absent when no pass is in progress
    #[serde(default)]
    pub batch_page: Option<u32>,
    #[serde(default)]
    pub generating: bool,
    /// At least one full pass completed since the last mapping change
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pass_id: Option<Uuid>,
    /// Failed fetches of the page under the cursor
    #[serde(default)]
    pub page_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationPhase {
    Idle,
    Paging,
}

impl GenerationState {
    pub fn phase(&self) -> GenerationPhase {
        match self.batch_page {
            Some(_) => GenerationPhase::Paging,
            None => GenerationPhase::Idle,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.batch_page.unwrap_or(1).max(1)
    }

    /// Begin a pass from page 1, or keep the cursor of an interrupted one
    pub fn start_pass(mut self) -> Self {
        if self.batch_page.is_none() {
            self.batch_page = Some(1);
            self.pass_id = Some(Uuid::new_v4());
        }
        if self.pass_id.is_none() {
            self.pass_id = Some(Uuid::new_v4());
        }
        self.generating = true;
        self
    }

    pub fn next_page(mut self) -> Self {
        self.batch_page = Some(self.current_page() + 1);
        self.page_attempts = 0;
        self.generating = true;
        self
    }

    /// Count a failed fetch of the current page, returning the new total
    pub fn record_page_failure(&mut self) -> u32 {
        self.page_attempts = self.page_attempts.saturating_add(1);
        self.page_attempts
    }

    /// Throw away in-flight progress and start over from page 1
    pub fn restart_pass(mut self) -> Self {
        self.batch_page = Some(1);
        self.page_attempts = 0;
        self.pass_id = Some(Uuid::new_v4());
        self.generating = true;
        self
    }

    pub fn complete_pass(mut self, now: DateTime<Utc>) -> Self {
        self.batch_page = None;
        self.page_attempts = 0;
        self.pass_id = None;
        self.generating = false;
        self.generated = true;
        self.generated_at = Some(now);
        self
    }

    /// A new mapping invalidates every hash computed so far, so the next
    /// trigger has to walk the catalog again from the first page
    pub fn mapping_changed(mut self) -> Self {
        self.batch_page = Some(1);
        self.page_attempts = 0;
        self.pass_id = None;
        self.generating = true;
        self.generated = false;
        self
    }
}
