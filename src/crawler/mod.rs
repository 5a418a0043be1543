//! One crawl cycle: select due targets, then fetch, parse and reconcile each
//! of them in turn on a single store session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::Instrument;

use crate::config::CrawlerConfig;
use crate::fetcher::PageFetcher;
use crate::models::Target;
use crate::plugins::ParserRegistry;
use crate::store::{CrawlStore, StoreSession};
use crate::Result;

pub mod guard;
pub mod pacer;
pub mod reconciler;
pub mod selector;
pub mod status;

pub use guard::{RunGuard, RunPermit};
pub use pacer::Pacer;
pub use reconciler::{ReconcilePlan, ReconcileSummary, Reconciler};
pub use selector::TargetSelector;
pub use status::StatusTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlPhase {
    Idle,
    Running,
    Fetching,
    Parsing,
    Reconciling,
    Succeeded,
    Failed,
    Pacing,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle held the guard.
    Skipped,
    Completed(CycleReport),
}

#[derive(Debug, Clone)]
pub struct CrawlerSettings {
    pub stale_threshold: Duration,
    pub pace_delay: Duration,
    pub sentinel_seller: String,
}

impl From<&CrawlerConfig> for CrawlerSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            stale_threshold: config.stale_threshold(),
            pace_delay: config.pace_delay(),
            sentinel_seller: config.sentinel_seller.clone(),
        }
    }
}

pub struct Crawler {
    store: Arc<dyn CrawlStore>,
    fetcher: Arc<dyn PageFetcher>,
    parsers: ParserRegistry,
    guard: Arc<RunGuard>,
    selector: TargetSelector,
    reconciler: Reconciler,
    status: StatusTracker,
    pacer: Pacer,
    phase: watch::Sender<CrawlPhase>,
}

/// Puts the phase back to `Idle` however the cycle ends.
struct PhaseReset<'a>(&'a watch::Sender<CrawlPhase>);

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        self.0.send_replace(CrawlPhase::Idle);
    }
}

impl Crawler {
    pub fn new(
        store: Arc<dyn CrawlStore>,
        fetcher: Arc<dyn PageFetcher>,
        parsers: ParserRegistry,
        settings: CrawlerSettings,
    ) -> Self {
        let (phase, _) = watch::channel(CrawlPhase::Idle);
        Self {
            store,
            fetcher,
            parsers,
            guard: RunGuard::new(),
            selector: TargetSelector::new(settings.stale_threshold),
            reconciler: Reconciler::new(settings.sentinel_seller),
            status: StatusTracker::new(),
            pacer: Pacer::new(settings.pace_delay),
            phase,
        }
    }

    pub fn guard(&self) -> &Arc<RunGuard> {
        &self.guard
    }

    pub fn phase(&self) -> CrawlPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CrawlPhase> {
        self.phase.subscribe()
    }

    /// Run one cycle, or return `Skipped` at once if a cycle is in flight.
    ///
    /// Per-target failures are recorded on the target and never abort the
    /// cycle. Failing to open the session or to select targets is returned
    /// to the caller; the guard is released either way.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let Some(_permit) = self.guard.try_acquire() else {
            tracing::info!("Crawl cycle already running, skipping");
            return Ok(CycleOutcome::Skipped);
        };
        let _reset = PhaseReset(&self.phase);
        let started = Instant::now();
        self.set_phase(CrawlPhase::Running);

        let mut session = self.store.begin_session().await?;
        let targets = self.selector.select_targets(session.as_mut()).await?;
        tracing::info!(selected = targets.len(), "Starting crawl cycle");

        let mut report = CycleReport {
            selected: targets.len(),
            ..CycleReport::default()
        };

        for target in &targets {
            let span = tracing::info_span!("crawl_target", target_id = %target.id, url = %target.url);
            if self.crawl_target(session.as_mut(), target).instrument(span).await {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }

            self.set_phase(CrawlPhase::Pacing);
            self.pacer.wait().await;
        }

        self.set_phase(CrawlPhase::Done);
        tracing::info!(
            selected = report.selected,
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Crawl cycle finished"
        );
        Ok(CycleOutcome::Completed(report))
    }

    /// Returns whether the target ended in SUCCESS.
    async fn crawl_target(&self, session: &mut dyn StoreSession, target: &Target) -> bool {
        match self.process_target(session, target).await {
            Ok(summary) => {
                self.set_phase(CrawlPhase::Succeeded);
                tracing::info!(
                    upserted = summary.upserted,
                    removed = summary.removed,
                    sentinel_zeroed = summary.sentinel_zeroed,
                    "Target crawled"
                );
                true
            }
            Err(e) => {
                self.set_phase(CrawlPhase::Failed);
                tracing::warn!(error = %e, kind = ?e.kind(), "Target crawl failed");
                if let Err(mark_err) = self.status.mark_error(session, target).await {
                    tracing::error!(error = %mark_err, "Failed to record target error");
                }
                false
            }
        }
    }

    async fn process_target(
        &self,
        session: &mut dyn StoreSession,
        target: &Target,
    ) -> Result<ReconcileSummary> {
        self.set_phase(CrawlPhase::Fetching);
        let page = self.fetcher.fetch(&target.url).await?;

        self.set_phase(CrawlPhase::Parsing);
        let parser = self.parsers.parser_for(target)?;
        let listings = parser.parse(&page, target)?;
        tracing::debug!(sellers = listings.len(), parser = parser.name(), "Parsed listings");

        self.set_phase(CrawlPhase::Reconciling);
        let summary = self.reconciler.reconcile(session, target, listings).await?;
        // Separate write: a failure here leaves the committed prices in place
        // and the target in ERROR, so the next cycle reconciles it again.
        self.status.mark_success(session, target).await?;
        Ok(summary)
    }

    fn set_phase(&self, phase: CrawlPhase) {
        self.phase.send_replace(phase);
    }
}
