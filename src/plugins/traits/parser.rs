use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{ObservedListing, Target};
use crate::{AppError, Result};

/// Page-structure variants a target can be parsed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParserKind {
    OfferList,
    JsonLd,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::OfferList => "offer-list",
            ParserKind::JsonLd => "json-ld",
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParserKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offer-list" => Ok(ParserKind::OfferList),
            "json-ld" => Ok(ParserKind::JsonLd),
            other => Err(AppError::Validation(format!("unknown parser kind: {}", other))),
        }
    }
}

/// Extracts (seller, price) listings from one fetched page.
///
/// Blocks without a usable seller or price are skipped. A page that does not
/// match the expected structure at all is a parse error.
pub trait ListingParser: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> ParserKind;

    fn parse(&self, page: &str, target: &Target) -> Result<Vec<ObservedListing>>;
}
