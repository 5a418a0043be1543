use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use crate::models::{TargetStatus, generate_id};

/// A monitored product page plus its crawl-health metadata.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Target {
    pub id: String,
    pub product_id: String,
    pub url: String,
    pub description: Option<String>,

    // Crawl health, written only by the status tracker
    pub status: TargetStatus,
    pub last_update_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTarget {
    pub product_id: String,
    pub url: String,
    pub description: Option<String>,
}

impl Target {
    pub fn new(new_target: NewTarget) -> Self {
        Self {
            id: generate_id(),
            product_id: new_target.product_id,
            url: new_target.url,
            description: new_target.description,
            status: TargetStatus::NeverRun,
            last_update_at: None,
        }
    }

    /// Whether the target needs a visit given the staleness cutoff
    /// (`now - stale_threshold`).
    pub fn is_due(&self, stale_before: DateTime<Utc>) -> bool {
        if self.status != TargetStatus::Success {
            return true;
        }
        match self.last_update_at {
            None => true,
            Some(at) => at < stale_before,
        }
    }

    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    }
}
