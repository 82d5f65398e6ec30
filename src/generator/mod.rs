//! Feed generation controller
//!
//! [`FeedGenerator`] is the single entry point for schedulers and
//! operators. Triggering is idempotent: at most one invocation walks the
//! catalog at a time, across processes sharing the same state file, and
//! every invocation continues the persisted pass instead of starting a
//! new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::data_mapping::{flatten, MappingService, MappingValidation};
use crate::errors::{AppError, AppResult};
use crate::feed::FeedStorage;
use crate::models::{ColumnMapping, FlatProduct, GenerationPhase, RawProduct};
use crate::sources::ProductSource;
use crate::utils::feed_public_url;

pub mod lock;
pub mod state_store;
pub mod walker;

pub use lock::{RunLock, RunLockGuard};
pub use state_store::GenerationStateStore;
pub use walker::{AdvanceOutcome, AdvanceReport, BatchWalker, WalkerSettings};

/// What a call to [`FeedGenerator::trigger_generation`] did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// Generation is switched off in the configuration
    Disabled,
    /// No feed column is mapped yet
    NoMapping,
    /// Another invocation holds the run lock
    AlreadyRunning,
    Completed(AdvanceReport),
    Suspended(AdvanceReport),
}

/// Snapshot for status displays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationStatus {
    pub enabled: bool,
    pub phase: GenerationPhase,
    pub batch_page: Option<u32>,
    pub generating: bool,
    pub generated: bool,
    pub generated_at: Option<DateTime<Utc>>,
    pub pass_id: Option<Uuid>,
    pub mapped_columns: usize,
    /// Suggested columns the current mapping leaves out
    pub missing_suggested: Vec<String>,
    /// Catalog size reported by the source, when it could be read
    pub source_products: Option<usize>,
    /// Products in the published feed, when one exists
    pub published_products: Option<usize>,
    pub feed_url: String,
}

pub struct FeedGenerator {
    enabled: bool,
    base_url: String,
    feed_file_name: String,
    suggested_columns: Vec<String>,
    source: Arc<dyn ProductSource>,
    mappings: MappingService,
    walker: BatchWalker,
    run_lock: RunLock,
}

impl FeedGenerator {
    pub fn new(config: &Config, source: Arc<dyn ProductSource>) -> Self {
        let storage = FeedStorage::from_config(&config.storage, config.generation.feed_version());
        let states = GenerationStateStore::new(config.storage.state_file.clone());
        let walker = BatchWalker::new(
            source.clone(),
            storage,
            states,
            WalkerSettings::from_config(&config.generation),
        );

        Self {
            enabled: config.generation.enabled,
            base_url: config.web.base_url.clone(),
            feed_file_name: config.storage.feed_file_name.clone(),
            suggested_columns: config.columns.suggested.clone(),
            source,
            mappings: MappingService::from_config(config),
            walker,
            run_lock: RunLock::beside(&config.storage.state_file),
        }
    }

    pub fn storage(&self) -> &FeedStorage {
        self.walker.storage()
    }

    pub fn mappings(&self) -> &MappingService {
        &self.mappings
    }

    /// Advance the current pass; safe to call at any time
    pub async fn trigger_generation(&self) -> AppResult<TriggerOutcome> {
        if !self.enabled {
            debug!("Feed generation is disabled, nothing to do");
            return Ok(TriggerOutcome::Disabled);
        }

        let Some(_guard) = self.run_lock.try_acquire()? else {
            info!("Feed generation already running, ignoring trigger");
            return Ok(TriggerOutcome::AlreadyRunning);
        };

        // One snapshot per invocation
        let mapping = self.mappings.load().await?;
        if mapping.is_empty() {
            debug!("No columns mapped, skipping feed generation");
            return Ok(TriggerOutcome::NoMapping);
        }

        let report = self.walker.advance(&mapping).await?;
        Ok(match report.outcome {
            AdvanceOutcome::Completed { .. } => TriggerOutcome::Completed(report),
            AdvanceOutcome::Suspended { .. } => TriggerOutcome::Suspended(report),
        })
    }

    /// Invalidate in-flight progress after the mapping was edited
    ///
    /// Waits for a running invocation to finish so its cursor updates
    /// cannot overwrite the reset. The published feed stays in place.
    pub async fn on_mapping_changed(&self) -> AppResult<()> {
        let _guard = self.run_lock.acquire().await?;
        let states = self.walker.states();
        let state = states.load().await?.mapping_changed();
        states.save(&state).await?;
        info!("Column mapping changed, next trigger restarts the feed pass from page 1");
        Ok(())
    }

    /// Validate, persist and activate a new mapping
    ///
    /// Entries that address nothing in the first catalog product are
    /// dropped and reported back; structural problems reject the mapping.
    pub async fn update_mapping(&self, mapping: &ColumnMapping) -> AppResult<MappingValidation> {
        let sample = self.sample_product().await?;
        let validation = self.mappings.prepare(mapping, sample.as_ref())?;
        self.mappings.save(&validation.accepted).await?;
        self.on_mapping_changed().await?;
        Ok(validation)
    }

    /// First catalog product, flattened
    pub async fn sample_product(&self) -> AppResult<Option<FlatProduct>> {
        Ok(self
            .source
            .sample()
            .await?
            .and_then(RawProduct::from_value)
            .map(|raw| flatten(&raw)))
    }

    pub fn feed_url(&self) -> AppResult<String> {
        feed_public_url(&self.base_url, &self.feed_file_name)
            .map(|url| url.to_string())
            .map_err(|e| AppError::configuration(format!("Invalid web.base_url: {}", e)))
    }

    pub async fn status(&self) -> AppResult<GenerationStatus> {
        let state = self.walker.states().load().await?;
        let mapping = self.mappings.load().await?;
        let published_products = match self.storage().load_published().await {
            Ok(doc) => doc.map(|doc| doc.len()),
            Err(e) => {
                debug!("Published feed unreadable: {}", e);
                None
            }
        };
        let source_products = match self.source.total().await {
            Ok(total) => Some(total),
            Err(e) => {
                debug!("Product source total unavailable: {}", e);
                None
            }
        };
        let missing_suggested = self
            .suggested_columns
            .iter()
            .filter(|column| mapping.get(column).is_none())
            .cloned()
            .collect();

        Ok(GenerationStatus {
            enabled: self.enabled,
            phase: state.phase(),
            batch_page: state.batch_page,
            generating: state.generating,
            generated: state.generated,
            generated_at: state.generated_at,
            pass_id: state.pass_id,
            mapped_columns: mapping.entries().iter().filter(|e| !e.is_meta()).count(),
            missing_suggested,
            source_products,
            published_products,
            feed_url: self.feed_url()?,
        })
    }
}
