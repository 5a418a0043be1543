use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::{is_valid_cron, scheduler_cron};
use crate::crawler::{CrawlPhase, Crawler, CycleOutcome};

#[derive(Debug, Default)]
struct RunCounters {
    completed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub schedule: String,
    pub completed_runs: u64,
    pub skipped_runs: u64,
    pub failed_runs: u64,
    pub phase: CrawlPhase,
    pub uptime_seconds: u64,
}

/// Fires crawl cycles on a cron schedule. Overlapping firings are turned
/// away by the crawler's run guard.
pub struct CrawlScheduler {
    scheduler: JobScheduler,
    crawler: Arc<Crawler>,
    schedule: String,
    job_id: Option<Uuid>,
    counters: Arc<RunCounters>,
    start_time: DateTime<Utc>,
}

impl CrawlScheduler {
    pub async fn new(crawler: Arc<Crawler>, schedule: &str) -> Result<Self> {
        if !is_valid_cron(schedule) {
            return Err(anyhow::anyhow!("Invalid cron expression: {}", schedule));
        }
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            crawler,
            schedule: schedule.to_string(),
            job_id: None,
            counters: Arc::new(RunCounters::default()),
            start_time: Utc::now(),
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.job_id.is_none() {
            let crawler = Arc::clone(&self.crawler);
            let counters = Arc::clone(&self.counters);

            let job = Job::new_async(scheduler_cron(&self.schedule).as_str(), move |_uuid, _l| {
                let crawler = Arc::clone(&crawler);
                let counters = Arc::clone(&counters);
                Box::pin(async move {
                    Self::execute_cycle(&crawler, &counters).await;
                })
            })?;
            self.job_id = Some(self.scheduler.add(job).await?);
        }

        self.scheduler.start().await?;
        tracing::info!(schedule = %self.schedule, "Crawl scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        tracing::info!("Crawl scheduler shutdown");
        Ok(())
    }

    /// Run a cycle outside the schedule, subject to the same guard.
    pub async fn run_now(&self) -> Result<CycleOutcome> {
        let outcome = self.crawler.run_cycle().await;
        Self::count(&self.counters, &outcome);
        Ok(outcome?)
    }

    pub fn stats(&self) -> SchedulerStats {
        let uptime = Utc::now().signed_duration_since(self.start_time);
        SchedulerStats {
            schedule: self.schedule.clone(),
            completed_runs: self.counters.completed.load(Ordering::Relaxed),
            skipped_runs: self.counters.skipped.load(Ordering::Relaxed),
            failed_runs: self.counters.failed.load(Ordering::Relaxed),
            phase: self.crawler.phase(),
            uptime_seconds: uptime.num_seconds().max(0) as u64,
        }
    }

    async fn execute_cycle(crawler: &Crawler, counters: &RunCounters) {
        let outcome = crawler.run_cycle().await;
        Self::count(counters, &outcome);

        match outcome {
            Ok(CycleOutcome::Completed(report)) => {
                tracing::debug!(?report, "Scheduled crawl cycle completed");
            }
            Ok(CycleOutcome::Skipped) => {
                tracing::debug!("Scheduled crawl cycle skipped");
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled crawl cycle failed");
            }
        }
    }

    fn count(counters: &RunCounters, outcome: &crate::Result<CycleOutcome>) {
        let counter = match outcome {
            Ok(CycleOutcome::Completed(_)) => &counters.completed,
            Ok(CycleOutcome::Skipped) => &counters.skipped,
            Err(_) => &counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
