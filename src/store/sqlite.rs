use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Connection, FromRow, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::{CrawlStore, StoreSession};
use crate::config::DatabaseConfig;
use crate::crawler::reconciler::{ReconcilePlan, SENTINEL_ABSENT_PRICE};
use crate::models::{NewTarget, Observation, Target, TargetStatus};
use crate::{AppError, Result};

const TARGET_COLUMNS: &str = "id, product_id, url, description, status, last_update_at";

#[derive(Debug, FromRow)]
struct ObservationRow {
    product_id: String,
    seller: String,
    price: String,
    target_id: String,
}

impl TryFrom<ObservationRow> for Observation {
    type Error = AppError;

    fn try_from(row: ObservationRow) -> Result<Self> {
        let price = Decimal::from_str(&row.price).map_err(|e| {
            AppError::Storage(format!(
                "invalid stored price {:?} for ({}, {}): {}",
                row.price, row.product_id, row.seller, e
            ))
        })?;
        Ok(Observation {
            product_id: row.product_id,
            seller: row.seller,
            price,
            target_id: row.target_id,
        })
    }
}

/// SQLite-backed target and observation store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = is_memory_url(&config.url);
        if !in_memory {
            ensure_parent_dir(&config.url)?;
        }

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.acquire_timeout));

        // Every connection to `:memory:` is a fresh database, so keep exactly one alive.
        let pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        tracing::debug!(url = %config.url, "Connected to SQLite");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Seed a target. Targets are otherwise created outside the crawler.
    pub async fn insert_target(&self, new_target: NewTarget) -> Result<Target> {
        let target = Target::new(new_target);
        sqlx::query(
            "INSERT INTO targets (id, product_id, url, description, status, last_update_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&target.id)
        .bind(&target.product_id)
        .bind(&target.url)
        .bind(&target.description)
        .bind(target.status)
        .bind(target.last_update_at)
        .execute(&self.pool)
        .await?;
        Ok(target)
    }

    pub async fn get_target(&self, target_id: &str) -> Result<Option<Target>> {
        let target = sqlx::query_as::<_, Target>(&format!(
            "SELECT {} FROM targets WHERE id = ?",
            TARGET_COLUMNS
        ))
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(target)
    }

    pub async fn observations_for_product(&self, product_id: &str) -> Result<Vec<Observation>> {
        let rows = sqlx::query_as::<_, ObservationRow>(
            "SELECT product_id, seller, price, target_id FROM observations \
             WHERE product_id = ? ORDER BY seller",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Observation::try_from).collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CrawlStore for SqliteStore {
    async fn begin_session(&self) -> Result<Box<dyn StoreSession>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(SqliteSession { conn }))
    }
}

/// One pooled connection, returned to the pool on drop.
pub struct SqliteSession {
    conn: PoolConnection<Sqlite>,
}

#[async_trait]
impl StoreSession for SqliteSession {
    async fn select_targets(&mut self, stale_before: DateTime<Utc>) -> Result<Vec<Target>> {
        let targets = sqlx::query_as::<_, Target>(&format!(
            "SELECT {} FROM targets \
             WHERE status <> ? OR last_update_at IS NULL OR last_update_at < ? \
             ORDER BY last_update_at IS NOT NULL, last_update_at ASC, id ASC",
            TARGET_COLUMNS
        ))
        .bind(TargetStatus::Success)
        .bind(stale_before)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(targets)
    }

    async fn update_status(
        &mut self,
        target_id: &str,
        status: TargetStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE targets SET status = ?, last_update_at = ? WHERE id = ?")
            .bind(status)
            .bind(at)
            .bind(target_id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Storage(format!("target {} not found", target_id)));
        }
        Ok(())
    }

    async fn observations_for_target(&mut self, target_id: &str) -> Result<Vec<Observation>> {
        let rows = sqlx::query_as::<_, ObservationRow>(
            "SELECT product_id, seller, price, target_id FROM observations \
             WHERE target_id = ? ORDER BY seller",
        )
        .bind(target_id)
        .fetch_all(&mut *self.conn)
        .await?;
        rows.into_iter().map(Observation::try_from).collect()
    }

    async fn apply_reconciliation(&mut self, plan: &ReconcilePlan) -> Result<()> {
        let mut tx = self.conn.begin().await?;

        for listing in &plan.upserts {
            sqlx::query(
                "INSERT INTO observations (product_id, seller, price, target_id) \
                 VALUES (?, ?, ?, ?) \
                 ON CONFLICT (product_id, seller) DO UPDATE SET price = excluded.price",
            )
            .bind(&plan.product_id)
            .bind(&listing.seller)
            .bind(listing.price.to_string())
            .bind(&plan.target_id)
            .execute(&mut *tx)
            .await?;
        }

        for seller in &plan.removals {
            sqlx::query(
                "DELETE FROM observations WHERE product_id = ? AND seller = ? AND target_id = ?",
            )
            .bind(&plan.product_id)
            .bind(seller)
            .bind(&plan.target_id)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(seller) = &plan.sentinel_zeroed {
            sqlx::query(
                "UPDATE observations SET price = ? WHERE product_id = ? AND seller = ? AND target_id = ?",
            )
            .bind(SENTINEL_ABSENT_PRICE.to_string())
            .bind(&plan.product_id)
            .bind(seller)
            .bind(&plan.target_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn ensure_parent_dir(url: &str) -> Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
