use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::models::Target;
use crate::store::StoreSession;
use crate::{AppError, Result};

/// Keep the targets that need a visit, ordered oldest `last_update_at` first
/// with never-updated targets ahead of everything else.
pub fn prioritize<I>(targets: I, stale_before: DateTime<Utc>) -> Vec<Target>
where
    I: IntoIterator<Item = Target>,
{
    let mut due: Vec<Target> = targets.into_iter().filter(|t| t.is_due(stale_before)).collect();
    // None < Some(_) for Option, which puts never-run targets first.
    due.sort_by(|a, b| {
        a.last_update_at
            .cmp(&b.last_update_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    due
}

pub fn stale_cutoff(now: DateTime<Utc>, stale_threshold: Duration) -> Result<DateTime<Utc>> {
    let threshold = chrono::Duration::from_std(stale_threshold)
        .map_err(|e| AppError::Validation(format!("stale threshold out of range: {}", e)))?;
    now.checked_sub_signed(threshold).ok_or_else(|| {
        AppError::Validation(format!(
            "stale threshold of {}s reaches before the earliest timestamp",
            stale_threshold.as_secs()
        ))
    })
}

pub struct TargetSelector {
    stale_threshold: Duration,
}

impl TargetSelector {
    pub fn new(stale_threshold: Duration) -> Self {
        Self { stale_threshold }
    }

    pub async fn select_targets(&self, session: &mut dyn StoreSession) -> Result<Vec<Target>> {
        let stale_before = stale_cutoff(Utc::now(), self.stale_threshold)?;
        let targets = session.select_targets(stale_before).await?;
        tracing::debug!(count = targets.len(), %stale_before, "Selected crawl targets");
        Ok(targets)
    }
}
