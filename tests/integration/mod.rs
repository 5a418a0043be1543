// Integration tests for Uatu Pricewatch
// These tests drive whole crawl cycles against SQLite and a mock HTTP shop.

pub mod cycle_tests;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use uatu_pricewatch::{
    config::{DatabaseConfig, FetcherConfig, ParserConfig},
    fetcher::HttpFetcher,
    models::{NewTarget, Target, TargetStatus},
    plugins::ParserRegistry,
    store::SqliteStore,
    Crawler, CrawlerSettings,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SENTINEL: &str = "Loja Oficial";

pub fn memory_db_config() -> DatabaseConfig {
    DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        acquire_timeout: 5,
    }
}

pub async fn create_test_store() -> anyhow::Result<SqliteStore> {
    let store = SqliteStore::connect(&memory_db_config()).await?;
    store.migrate().await?;
    Ok(store)
}

pub fn test_settings(pace_delay: Duration) -> CrawlerSettings {
    CrawlerSettings {
        stale_threshold: Duration::from_secs(7200),
        pace_delay,
        sentinel_seller: SENTINEL.to_string(),
    }
}

pub fn create_test_crawler(store: &SqliteStore, parsers: ParserRegistry, pace_delay: Duration) -> Arc<Crawler> {
    let fetcher = HttpFetcher::new(&FetcherConfig {
        request_timeout: 5,
        user_agent: "UatuPricewatch-Test/1.0".to_string(),
    })
    .expect("http client");

    Arc::new(Crawler::new(
        Arc::new(store.clone()),
        Arc::new(fetcher),
        parsers,
        test_settings(pace_delay),
    ))
}

pub fn default_parsers() -> ParserRegistry {
    ParserRegistry::from_config(&ParserConfig::default()).expect("default parsers")
}

pub async fn seed_target(store: &SqliteStore, product_id: &str, url: String) -> anyhow::Result<Target> {
    Ok(store
        .insert_target(NewTarget {
            product_id: product_id.to_string(),
            url,
            description: Some(format!("{} listing", product_id)),
        })
        .await?)
}

/// Overwrite a target's status and timestamp, as if an earlier cycle ran.
pub async fn set_target_state(
    store: &SqliteStore,
    target_id: &str,
    status: TargetStatus,
    last_update_at: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE targets SET status = ?, last_update_at = ? WHERE id = ?")
        .bind(status)
        .bind(last_update_at)
        .bind(target_id)
        .execute(store.pool())
        .await?;
    Ok(())
}

/// Push every target out of the staleness window.
pub async fn age_all_targets(store: &SqliteStore) -> anyhow::Result<()> {
    sqlx::query("UPDATE targets SET last_update_at = ?")
        .bind(Utc::now() - ChronoDuration::days(1))
        .execute(store.pool())
        .await?;
    Ok(())
}

pub fn offer_page(offers: &[(&str, &str)]) -> String {
    let blocks: String = offers
        .iter()
        .map(|(seller, price)| {
            format!(
                r#"<div class="offer"><span class="offer-seller">{}</span><span class="offer-price">R$ {}</span></div>"#,
                seller, price
            )
        })
        .collect();
    format!(
        r#"<html><body><h1>Produto</h1><div class="offer-list">{}</div></body></html>"#,
        blocks
    )
}

pub async fn mount_page(server: &MockServer, page_path: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(response)
        .mount(server)
        .await;
}

pub fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body)
}
