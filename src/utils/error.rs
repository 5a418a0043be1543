use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used at the per-target boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Parse,
    Storage,
    Other,
}

impl AppError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        AppError::Parse {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Network { .. } | AppError::Http(_) => ErrorKind::Network,
            AppError::Parse { .. } => ErrorKind::Parse,
            AppError::Database(_) | AppError::Migration(_) | AppError::Storage(_) => {
                ErrorKind::Storage
            }
            _ => ErrorKind::Other,
        }
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
