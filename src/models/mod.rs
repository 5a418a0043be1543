use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod observation;
pub mod target;

// Re-exports for convenience
pub use observation::*;
pub use target::*;

/// Crawl health of a target, as persisted in `targets.status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum TargetStatus {
    #[sqlx(rename = "never_run")]
    NeverRun,
    #[sqlx(rename = "success")]
    Success,
    #[sqlx(rename = "error")]
    Error,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::NeverRun => "never_run",
            TargetStatus::Success => "success",
            TargetStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
