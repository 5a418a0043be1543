use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use uatu_pricewatch::fetcher::HttpFetcher;
use uatu_pricewatch::plugins::ParserRegistry;
use uatu_pricewatch::scheduler::CrawlScheduler;
use uatu_pricewatch::store::SqliteStore;
use uatu_pricewatch::utils::init_logging;
use uatu_pricewatch::{AppConfig, Crawler, CrawlerSettings};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let _log_guard = init_logging(&config.logging)?;

    info!("Starting Uatu Pricewatch...");

    let store = SqliteStore::connect(&config.database).await?;
    store.migrate().await?;

    let fetcher = HttpFetcher::new(&config.fetcher)?;
    let parsers = ParserRegistry::from_config(&config.parser)?;
    let crawler = Arc::new(Crawler::new(
        Arc::new(store.clone()),
        Arc::new(fetcher),
        parsers,
        CrawlerSettings::from(&config.crawler),
    ));

    let mut scheduler = CrawlScheduler::new(Arc::clone(&crawler), &config.crawler.schedule).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    scheduler.shutdown().await?;
    store.close().await;

    Ok(())
}
