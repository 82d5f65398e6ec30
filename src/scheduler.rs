//! Cron-driven feed generation
//!
//! The scheduler only decides *when* to call
//! [`FeedGenerator::trigger_generation`]; all pass bookkeeping lives in
//! the generator. A suspended pass is continued on the next tick instead
//! of waiting for the next cron time.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, trace};

use crate::generator::{FeedGenerator, TriggerOutcome};

pub struct SchedulerService {
    generator: Arc<FeedGenerator>,
    schedule: Schedule,
    cron: String,
    last_run: Option<DateTime<Utc>>,
    continue_pass: bool,
}

impl SchedulerService {
    pub fn new(generator: Arc<FeedGenerator>, cron: &str) -> Result<Self> {
        let schedule = Schedule::from_str(cron)
            .with_context(|| format!("invalid cron expression '{}'", cron))?;
        Ok(Self {
            generator,
            schedule,
            cron: cron.to_string(),
            last_run: None,
            continue_pass: false,
        })
    }

    /// Run immediately once, then on every due time until `shutdown` resolves
    pub async fn start<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Starting feed scheduler (cron: {})", self.cron);
        self.run_once().await;
        self.log_next_run();

        let mut ticker = interval(Duration::from_secs(1));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    trace!("Scheduler tick at {}", now);
                    if self.continue_pass || is_due(&self.schedule, self.last_run, now) {
                        self.run_once().await;
                        if !self.continue_pass {
                            self.log_next_run();
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Feed scheduler stopping");
                    return Ok(());
                }
            }
        }
    }

    async fn run_once(&mut self) {
        self.last_run = Some(Utc::now());
        self.continue_pass = false;

        match self.generator.trigger_generation().await {
            Ok(TriggerOutcome::Completed(report)) => {
                info!(
                    "Scheduled feed generation completed ({} changes)",
                    report.stats.changed()
                );
            }
            Ok(TriggerOutcome::Suspended(report)) => {
                debug!(
                    "Scheduled feed generation suspended after {} pages, continuing",
                    report.pages
                );
                self.continue_pass = true;
            }
            Ok(outcome) => debug!("Scheduled feed generation skipped: {:?}", outcome),
            Err(e) => error!("Scheduled feed generation failed: {}", e),
        }
    }

    fn log_next_run(&self) {
        if let Some(next_time) = self.schedule.upcoming(Utc).next() {
            info!(
                "Next scheduled feed generation: {}",
                next_time.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }
}

/// Whether a cron time passed since `last_run`
pub fn is_due(schedule: &Schedule, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_run {
        Some(last_run) => schedule
            .after(&last_run)
            .next()
            .map(|next_time| now >= next_time)
            .unwrap_or(false),
        None => true,
    }
}
