use config::{Config, ConfigError, Environment, File};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::plugins::ParserKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub fetcher: FetcherConfig,
    pub crawler: CrawlerConfig,
    pub parser: ParserConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub request_timeout: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Cron expression the scheduler fires `run_cycle` on.
    pub schedule: String,
    pub stale_threshold_secs: u64,
    pub pace_delay_ms: u64,
    /// The operator's own storefront name. Matched exactly.
    pub sentinel_seller: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub default_kind: String,
    /// host -> parser kind
    pub host_overrides: HashMap<String, String>,
    pub offer_list: OfferListConfig,
    pub thousands_separator: char,
    pub decimal_separator: char,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferListConfig {
    pub block_selector: String,
    pub seller_selector: String,
    pub price_selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
    /// When set, logs also go to a daily rolling file in this directory.
    pub directory: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/pricewatch.db".to_string(),
            max_connections: 5,
            acquire_timeout: 30,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: 30,
            user_agent: "UatuPricewatch/0.1".to_string(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            schedule: "*/10 * * * *".to_string(),
            stale_threshold_secs: 2 * 60 * 60,
            pace_delay_ms: 5_000,
            sentinel_seller: "Loja Oficial".to_string(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            default_kind: "offer-list".to_string(),
            host_overrides: HashMap::new(),
            offer_list: OfferListConfig::default(),
            thousands_separator: '.',
            decimal_separator: ',',
        }
    }
}

impl Default for OfferListConfig {
    fn default() -> Self {
        Self {
            block_selector: "div.offer-list > div.offer".to_string(),
            seller_selector: ".offer-seller".to_string(),
            price_selector: ".offer-price".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "uatu_pricewatch=info".to_string(),
            json: false,
            directory: None,
        }
    }
}

impl CrawlerConfig {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn pace_delay(&self) -> Duration {
        Duration::from_millis(self.pace_delay_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "WATCHER_"
            .add_source(Environment::with_prefix("WATCHER").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate database configuration
        if !self.database.url.starts_with("sqlite:") {
            return Err(ConfigError::Message("Database url must be a sqlite: URL".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        // Validate fetcher configuration
        if self.fetcher.request_timeout == 0 {
            return Err(ConfigError::Message("Fetcher request_timeout must be greater than 0".into()));
        }

        // Validate crawler configuration
        if !is_valid_cron(&self.crawler.schedule) {
            return Err(ConfigError::Message("Invalid cron expression in crawler.schedule".into()));
        }

        if self.crawler.stale_threshold_secs == 0 {
            return Err(ConfigError::Message("Crawler stale_threshold_secs must be greater than 0".into()));
        }

        if self.crawler.stale_threshold_secs > MAX_STALE_THRESHOLD_SECS {
            return Err(ConfigError::Message(format!(
                "Crawler stale_threshold_secs must be at most {}",
                MAX_STALE_THRESHOLD_SECS
            )));
        }

        if self.crawler.sentinel_seller.trim().is_empty() {
            return Err(ConfigError::Message("Crawler sentinel_seller must not be empty".into()));
        }

        // Validate parser configuration
        if self.parser.thousands_separator == self.parser.decimal_separator {
            return Err(ConfigError::Message("Parser separators must differ".into()));
        }

        let kinds = std::iter::once(&self.parser.default_kind).chain(self.parser.host_overrides.values());
        for kind in kinds {
            if kind.parse::<ParserKind>().is_err() {
                return Err(ConfigError::Message(format!("Unknown parser kind: {}", kind)));
            }
        }

        let offer_list = &self.parser.offer_list;
        for selector in [&offer_list.block_selector, &offer_list.seller_selector, &offer_list.price_selector] {
            if Selector::parse(selector).is_err() {
                return Err(ConfigError::Message(format!("Invalid CSS selector: {}", selector)));
            }
        }

        Ok(())
    }
}

/// Upper bound for `crawler.stale_threshold_secs`: one year.
pub const MAX_STALE_THRESHOLD_SECS: u64 = 365 * 24 * 60 * 60;

/// Basic cron validation. Accepts the 5-field form and the 6-field form with
/// leading seconds that tokio-cron-scheduler uses.
pub fn is_valid_cron(cron_expr: &str) -> bool {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 5 && parts.len() != 6 {
        return false;
    }

    // Allow numbers, ranges, lists, wildcards, and steps
    parts.iter().all(|part| {
        part.chars().all(|c| c.is_ascii_digit() || c == '*' || c == '-' || c == ',' || c == '/')
    })
}

/// tokio-cron-scheduler wants a seconds field; prefix one onto 5-field expressions.
pub fn scheduler_cron(cron_expr: &str) -> String {
    if cron_expr.split_whitespace().count() == 5 {
        format!("0 {}", cron_expr.trim())
    } else {
        cron_expr.trim().to_string()
    }
}
