use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::{CrawlStore, StoreSession};
use crate::crawler::reconciler::{ReconcilePlan, SENTINEL_ABSENT_PRICE};
use crate::crawler::selector::prioritize;
use crate::models::{NewTarget, Observation, Target, TargetStatus};
use crate::{AppError, Result};

#[derive(Default)]
struct MemoryState {
    targets: BTreeMap<String, Target>,
    // (product_id, seller) -> row
    observations: BTreeMap<(String, String), Observation>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<MemoryState>,
    fail_sessions: AtomicBool,
    fail_select: AtomicBool,
    failing_targets: Mutex<HashSet<String>>,
    failing_status: Mutex<HashSet<(String, TargetStatus)>>,
    sessions_opened: AtomicUsize,
    sessions_released: AtomicUsize,
}

/// Process-local store with failure injection, for tests and dry runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_target(&self, new_target: NewTarget) -> Target {
        let target = Target::new(new_target);
        self.put_target(target.clone()).await;
        target
    }

    /// Insert or replace a target as-is, including its status and timestamp.
    pub async fn put_target(&self, target: Target) {
        let mut state = self.inner.state.lock().await;
        state.targets.insert(target.id.clone(), target);
    }

    pub async fn put_observation(&self, observation: Observation) {
        let mut state = self.inner.state.lock().await;
        let key = (observation.product_id.clone(), observation.seller.clone());
        state.observations.insert(key, observation);
    }

    pub async fn target(&self, target_id: &str) -> Option<Target> {
        let state = self.inner.state.lock().await;
        state.targets.get(target_id).cloned()
    }

    pub async fn observations_for_product(&self, product_id: &str) -> Vec<Observation> {
        let state = self.inner.state.lock().await;
        state
            .observations
            .values()
            .filter(|o| o.product_id == product_id)
            .cloned()
            .collect()
    }

    /// Make `begin_session` fail with a storage error.
    pub fn set_session_failure(&self, fail: bool) {
        self.inner.fail_sessions.store(fail, Ordering::SeqCst);
    }

    /// Make `select_targets` fail with a storage error.
    pub fn set_select_failure(&self, fail: bool) {
        self.inner.fail_select.store(fail, Ordering::SeqCst);
    }

    /// Make `apply_reconciliation` fail for one target.
    pub async fn fail_reconciliation_for(&self, target_id: &str) {
        let mut failing = self.inner.failing_targets.lock().await;
        failing.insert(target_id.to_string());
    }

    /// Make `update_status` fail when it writes `status` for one target.
    pub async fn fail_status_write(&self, target_id: &str, status: TargetStatus) {
        let mut failing = self.inner.failing_status.lock().await;
        failing.insert((target_id.to_string(), status));
    }

    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_released(&self) -> usize {
        self.inner.sessions_released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrawlStore for MemoryStore {
    async fn begin_session(&self) -> Result<Box<dyn StoreSession>> {
        if self.inner.fail_sessions.load(Ordering::SeqCst) {
            return Err(AppError::Storage("connection refused".to_string()));
        }
        self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemorySession {
    inner: Arc<Inner>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.inner.sessions_released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn select_targets(&mut self, stale_before: DateTime<Utc>) -> Result<Vec<Target>> {
        if self.inner.fail_select.load(Ordering::SeqCst) {
            return Err(AppError::Storage("select failed".to_string()));
        }
        let state = self.inner.state.lock().await;
        Ok(prioritize(state.targets.values().cloned(), stale_before))
    }

    async fn update_status(
        &mut self,
        target_id: &str,
        status: TargetStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let key = (target_id.to_string(), status);
        if self.inner.failing_status.lock().await.contains(&key) {
            return Err(AppError::Storage(format!(
                "status write rejected for target {}",
                target_id
            )));
        }

        let mut state = self.inner.state.lock().await;
        let target = state
            .targets
            .get_mut(target_id)
            .ok_or_else(|| AppError::Storage(format!("target {} not found", target_id)))?;
        target.status = status;
        target.last_update_at = Some(at);
        Ok(())
    }

    async fn observations_for_target(&mut self, target_id: &str) -> Result<Vec<Observation>> {
        let state = self.inner.state.lock().await;
        Ok(state
            .observations
            .values()
            .filter(|o| o.target_id == target_id)
            .cloned()
            .collect())
    }

    async fn apply_reconciliation(&mut self, plan: &ReconcilePlan) -> Result<()> {
        if self.inner.failing_targets.lock().await.contains(&plan.target_id) {
            return Err(AppError::Storage(format!(
                "write rejected for target {}",
                plan.target_id
            )));
        }

        // One lock for the whole plan keeps it all-or-nothing.
        let mut state = self.inner.state.lock().await;
        for listing in &plan.upserts {
            let key = (plan.product_id.clone(), listing.seller.clone());
            state
                .observations
                .entry(key)
                .and_modify(|row| row.price = listing.price)
                .or_insert_with(|| Observation {
                    product_id: plan.product_id.clone(),
                    seller: listing.seller.clone(),
                    price: listing.price,
                    target_id: plan.target_id.clone(),
                });
        }
        for seller in &plan.removals {
            let key = (plan.product_id.clone(), seller.clone());
            if state.observations.get(&key).is_some_and(|o| o.target_id == plan.target_id) {
                state.observations.remove(&key);
            }
        }
        if let Some(seller) = &plan.sentinel_zeroed {
            let key = (plan.product_id.clone(), seller.clone());
            if let Some(row) = state.observations.get_mut(&key) {
                row.price = SENTINEL_ABSENT_PRICE;
            }
        }
        Ok(())
    }
}
