use std::collections::HashMap;
use std::sync::Arc;

use super::parsers::{JsonLdParser, LocalePrice, OfferListParser};
use super::traits::{ListingParser, ParserKind};
use crate::config::ParserConfig;
use crate::models::Target;
use crate::{AppError, Result};

pub type ListingParserRef = Arc<dyn ListingParser>;

/// Picks the listing parser for a target: a host override when one matches,
/// otherwise the default kind.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<ParserKind, ListingParserRef>,
    default_kind: ParserKind,
    host_overrides: HashMap<String, ParserKind>,
}

impl ParserRegistry {
    pub fn new(default_kind: ParserKind) -> Self {
        Self {
            parsers: HashMap::new(),
            default_kind,
            host_overrides: HashMap::new(),
        }
    }

    /// Registry with every built-in parser, configured from `config`.
    pub fn from_config(config: &ParserConfig) -> Result<Self> {
        let prices = LocalePrice::new(config.thousands_separator, config.decimal_separator)?;
        let mut registry = Self::new(config.default_kind.parse()?);

        registry.register(Arc::new(OfferListParser::new(&config.offer_list, prices.clone())?));
        registry.register(Arc::new(JsonLdParser::new(prices)?));

        for (host, kind) in &config.host_overrides {
            registry.set_host_override(host, kind.parse()?);
        }
        Ok(registry)
    }

    /// Register a parser, replacing any previous parser of the same kind.
    pub fn register(&mut self, parser: ListingParserRef) {
        self.parsers.insert(parser.kind(), parser);
    }

    pub fn set_host_override(&mut self, host: &str, kind: ParserKind) {
        self.host_overrides.insert(host.trim().to_ascii_lowercase(), kind);
    }

    pub fn has_parser(&self, kind: ParserKind) -> bool {
        self.parsers.contains_key(&kind)
    }

    pub fn list_kinds(&self) -> Vec<ParserKind> {
        self.parsers.keys().copied().collect()
    }

    pub fn kind_for(&self, target: &Target) -> ParserKind {
        target
            .host()
            .and_then(|host| self.host_overrides.get(&host).copied())
            .unwrap_or(self.default_kind)
    }

    pub fn parser_for(&self, target: &Target) -> Result<ListingParserRef> {
        let kind = self.kind_for(target);
        self.parsers
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("Listing parser '{}' not registered", kind)))
    }
}
