use chrono::{DateTime, Utc};

use crate::models::{Target, TargetStatus};
use crate::store::StoreSession;
use crate::Result;

/// Records the outcome of one crawl attempt on the target row.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusTracker;

impl StatusTracker {
    pub fn new() -> Self {
        Self
    }

    pub async fn mark_success(
        &self,
        session: &mut dyn StoreSession,
        target: &Target,
    ) -> Result<DateTime<Utc>> {
        self.record(session, target, TargetStatus::Success).await
    }

    pub async fn mark_error(
        &self,
        session: &mut dyn StoreSession,
        target: &Target,
    ) -> Result<DateTime<Utc>> {
        self.record(session, target, TargetStatus::Error).await
    }

    async fn record(
        &self,
        session: &mut dyn StoreSession,
        target: &Target,
        status: TargetStatus,
    ) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        session.update_status(&target.id, status, now).await?;
        tracing::debug!(target_id = %target.id, %status, "Recorded target status");
        Ok(now)
    }
}
