//! Target and observation storage.
//!
//! A crawl cycle opens exactly one [`StoreSession`] through
//! [`CrawlStore::begin_session`] and drops it when the cycle ends, which
//! returns the underlying connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::crawler::reconciler::ReconcilePlan;
use crate::models::{Observation, Target, TargetStatus};
use crate::Result;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait CrawlStore: Send + Sync {
    /// Acquire the connection a whole cycle runs on.
    async fn begin_session(&self) -> Result<Box<dyn StoreSession>>;
}

#[async_trait]
pub trait StoreSession: Send {
    /// Targets that are not SUCCESS, never updated, or last updated before
    /// `stale_before`; oldest `last_update_at` first, never-updated first of all.
    async fn select_targets(&mut self, stale_before: DateTime<Utc>) -> Result<Vec<Target>>;

    async fn update_status(
        &mut self,
        target_id: &str,
        status: TargetStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn observations_for_target(&mut self, target_id: &str) -> Result<Vec<Observation>>;

    /// Apply every write in `plan` or none of them.
    async fn apply_reconciliation(&mut self, plan: &ReconcilePlan) -> Result<()>;
}
