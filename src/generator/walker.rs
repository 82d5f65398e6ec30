//! Paginated walk over the product source
//!
//! One call to [`BatchWalker::advance`] resumes the pass at the persisted
//! cursor and keeps paging until the catalog is exhausted or the
//! per-invocation page guard is reached. Every processed page is saved to
//! the working document before the cursor moves past it, so an
//! interrupted invocation loses at most the page it was working on.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::GenerationConfig;
use crate::data_mapping::{flatten, DataMappingEngine};
use crate::errors::AppResult;
use crate::feed::{FeedStorage, MergeStats};
use crate::generator::state_store::GenerationStateStore;
use crate::models::{ColumnMapping, FeedDocument, GenerationState, RawProduct};
use crate::sources::ProductSource;

#[derive(Debug, Clone)]
pub struct WalkerSettings {
    pub batch_size: u32,
    /// Pause between two pages
    pub batch_delay: Duration,
    /// Pages processed by one invocation before it yields
    pub max_pages_per_run: Option<u32>,
    /// Failed fetches of one page before it is skipped
    pub max_page_attempts: u32,
}

impl WalkerSettings {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay(),
            max_pages_per_run: config.max_pages_per_run,
            max_page_attempts: config.max_page_attempts.max(1),
        }
    }
}

impl Default for WalkerSettings {
    fn default() -> Self {
        Self::from_config(&crate::config::Config::default().generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// The pass reached the end of the catalog and the feed was published
    Completed { nodes: usize },
    /// The page guard stopped the pass; `next_page` is where it resumes
    Suspended { next_page: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceReport {
    pub pass_id: Option<Uuid>,
    pub pages: u32,
    pub stats: MergeStats,
    /// The working document was unreadable and the pass restarted empty
    pub recovered: bool,
    /// Pages given up on after repeated fetch failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_pages: Vec<u32>,
    pub outcome: AdvanceOutcome,
}

pub struct BatchWalker {
    source: Arc<dyn ProductSource>,
    storage: FeedStorage,
    states: GenerationStateStore,
    settings: WalkerSettings,
}

impl BatchWalker {
    pub fn new(
        source: Arc<dyn ProductSource>,
        storage: FeedStorage,
        states: GenerationStateStore,
        settings: WalkerSettings,
    ) -> Self {
        Self {
            source,
            storage,
            states,
            settings,
        }
    }

    pub fn storage(&self) -> &FeedStorage {
        &self.storage
    }

    pub fn states(&self) -> &GenerationStateStore {
        &self.states
    }

    /// Run the current pass forward with `mapping`
    ///
    /// A page fetch error ends the invocation with the cursor left on the
    /// failed page, so the next call retries exactly that page. Once the
    /// same page has failed `max_page_attempts` times it is skipped and
    /// the pass moves on; products already in the feed from that page
    /// stay until the live-id check removes them.
    pub async fn advance(&self, mapping: &ColumnMapping) -> AppResult<AdvanceReport> {
        let started = Instant::now();
        let mut state = self.states.load().await?.start_pass();
        self.states.save(&state).await?;

        let (mut doc, recovered) = self.open_working(&mut state).await?;
        let pass = pass_label(&state);
        info!(
            "Feed pass {} resuming at page {} ({} products in working feed)",
            pass,
            state.current_page(),
            doc.len()
        );

        let mut engine = DataMappingEngine::new();
        let mut stats = MergeStats::default();
        let mut pages = 0u32;
        let mut skipped_pages = Vec::new();

        loop {
            if let Some(max) = self.settings.max_pages_per_run {
                if pages >= max {
                    let next_page = state.current_page();
                    info!(
                        "Feed pass {} suspended before page {} after {} pages in {:?}",
                        pass,
                        next_page,
                        pages,
                        started.elapsed()
                    );
                    return Ok(AdvanceReport {
                        pass_id: state.pass_id,
                        pages,
                        stats,
                        recovered,
                        skipped_pages,
                        outcome: AdvanceOutcome::Suspended { next_page },
                    });
                }
            }

            let page = state.current_page();
            let products = match self.source.list_page(page, self.settings.batch_size).await {
                Ok(products) => products,
                Err(e) => {
                    let attempts = state.record_page_failure();
                    if attempts < self.settings.max_page_attempts {
                        warn!(
                            "Feed pass {} page {} failed (attempt {}/{}): {}",
                            pass, page, attempts, self.settings.max_page_attempts, e
                        );
                        self.states.save(&state).await?;
                        return Err(e);
                    }
                    warn!(
                        "Feed pass {} skipping page {} after {} failed attempts: {}",
                        pass, page, attempts, e
                    );
                    state = state.next_page();
                    self.states.save(&state).await?;
                    skipped_pages.push(page);
                    continue;
                }
            };

            if products.is_empty() {
                break;
            }

            let count = products.len();
            let page_stats = merge_page(&mut engine, mapping, &mut doc, products);
            self.storage.save_working(&mut doc).await?;
            state = state.next_page();
            self.states.save(&state).await?;

            debug!(
                "Feed pass {} page {}: {} products, {} inserted, {} replaced, {} skipped, {} invalid",
                pass,
                page,
                count,
                page_stats.inserted,
                page_stats.replaced,
                page_stats.skipped,
                page_stats.invalid
            );
            stats.absorb(&page_stats);
            pages += 1;

            if !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        // Pruning needs the complete live set; a failure here leaves the
        // cursor on the empty page so finalize is retried
        let live_ids = self.source.list_live_ids().await?;
        stats.removed = doc.finalize(&live_ids);
        self.storage.save_working(&mut doc).await?;
        self.storage.publish().await?;

        let pass_id = state.pass_id;
        state = state.complete_pass(Utc::now());
        self.states.save(&state).await?;

        info!(
            "Feed pass {} completed in {:?}: {} inserted, {} replaced, {} skipped, {} removed, {} products",
            pass,
            started.elapsed(),
            stats.inserted,
            stats.replaced,
            stats.skipped,
            stats.removed,
            doc.len()
        );

        Ok(AdvanceReport {
            pass_id,
            pages,
            stats,
            recovered,
            skipped_pages,
            outcome: AdvanceOutcome::Completed { nodes: doc.len() },
        })
    }

    /// Load the working document, restarting the pass when it is unusable
    async fn open_working(&self, state: &mut GenerationState) -> AppResult<(FeedDocument, bool)> {
        match self.storage.load_working().await {
            Ok(Some(doc)) => Ok((doc, false)),
            Ok(None) => {
                if state.current_page() > 1 {
                    warn!(
                        "Working feed {} is missing at page {}, restarting pass",
                        self.storage.working_path().display(),
                        state.current_page()
                    );
                    *state = std::mem::take(state).restart_pass();
                    self.states.save(state).await?;
                }
                Ok((self.storage.empty_document(), false))
            }
            Err(e) if e.is_corruption() => {
                warn!("{}, discarding it and restarting pass", e);
                self.storage.discard_working().await?;
                *state = std::mem::take(state).restart_pass();
                self.states.save(state).await?;
                Ok((self.storage.empty_document(), true))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Flatten, format and merge one page of raw records
fn merge_page(
    engine: &mut DataMappingEngine,
    mapping: &ColumnMapping,
    doc: &mut FeedDocument,
    products: Vec<Value>,
) -> MergeStats {
    let mut stats = MergeStats::default();
    for value in products {
        let Some(raw) = RawProduct::from_value(value) else {
            warn!("Skipping product record that is not an object");
            stats.invalid += 1;
            continue;
        };
        let Some(id) = raw.id() else {
            warn!("Skipping product without id");
            stats.invalid += 1;
            continue;
        };

        let formatted = engine.format(mapping, &flatten(&raw));
        let outcome = doc.merge_one(&id, &formatted);
        trace!("Product {}: {:?}", id, outcome);
        stats.record(outcome);
    }
    stats
}

fn pass_label(state: &GenerationState) -> String {
    state
        .pass_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string())
}
