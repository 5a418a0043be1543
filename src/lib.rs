pub mod config;
pub mod crawler;
pub mod fetcher;
pub mod models;
pub mod plugins;
pub mod scheduler;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use crawler::{Crawler, CrawlerSettings, CycleOutcome, CycleReport};
pub use utils::error::{AppError, ErrorKind};

pub type Result<T> = std::result::Result<T, AppError>;
