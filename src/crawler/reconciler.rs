use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::{Observation, ObservedListing, Target, dedupe_listings};
use crate::store::StoreSession;
use crate::Result;

/// The writes that bring a target's stored observations in line with one scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    pub target_id: String,
    pub product_id: String,
    /// Upserted by `(product_id, seller)`; only the price is overwritten on conflict.
    pub upserts: Vec<ObservedListing>,
    /// Sellers whose rows are deleted.
    pub removals: Vec<String>,
    /// Set when the sentinel seller vanished from the page; its price becomes zero.
    pub sentinel_zeroed: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub upserted: usize,
    pub removed: usize,
    pub sentinel_zeroed: bool,
}

impl ReconcilePlan {
    pub fn summary(&self) -> ReconcileSummary {
        ReconcileSummary {
            upserted: self.upserts.len(),
            removed: self.removals.len(),
            sentinel_zeroed: self.sentinel_zeroed.is_some(),
        }
    }
}

pub struct Reconciler {
    sentinel_seller: String,
}

impl Reconciler {
    pub fn new(sentinel_seller: impl Into<String>) -> Self {
        Self {
            sentinel_seller: sentinel_seller.into(),
        }
    }

    /// Diff `observed` against the rows currently stored for `target`.
    pub fn plan(
        &self,
        target: &Target,
        observed: Vec<ObservedListing>,
        stored: &[Observation],
    ) -> ReconcilePlan {
        let upserts = dedupe_listings(observed);
        let seen: HashSet<&str> = upserts.iter().map(|l| l.seller.as_str()).collect();

        let removals = stored
            .iter()
            .filter(|row| !seen.contains(row.seller.as_str()))
            .filter(|row| row.seller != self.sentinel_seller)
            .map(|row| row.seller.clone())
            .collect();

        let sentinel_zeroed = if seen.contains(self.sentinel_seller.as_str()) {
            None
        } else {
            stored
                .iter()
                .find(|row| row.seller == self.sentinel_seller)
                .map(|row| row.seller.clone())
        };

        ReconcilePlan {
            target_id: target.id.clone(),
            product_id: target.product_id.clone(),
            upserts,
            removals,
            sentinel_zeroed,
        }
    }

    pub async fn reconcile(
        &self,
        session: &mut dyn StoreSession,
        target: &Target,
        observed: Vec<ObservedListing>,
    ) -> Result<ReconcileSummary> {
        let stored = session.observations_for_target(&target.id).await?;
        let plan = self.plan(target, observed, &stored);

        session.apply_reconciliation(&plan).await?;

        let summary = plan.summary();
        tracing::debug!(
            target_id = %target.id,
            upserted = summary.upserted,
            removed = summary.removed,
            sentinel_zeroed = summary.sentinel_zeroed,
            "Reconciled observations"
        );
        Ok(summary)
    }
}

/// Price written for the sentinel seller when it is missing from a scrape.
pub const SENTINEL_ABSENT_PRICE: Decimal = Decimal::ZERO;
