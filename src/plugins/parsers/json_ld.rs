use rust_decimal::Decimal;
use scraper::{Html, Selector};
use serde_json::Value;
use std::str::FromStr;

use super::price::LocalePrice;
use crate::models::{ObservedListing, Target};
use crate::plugins::traits::{ListingParser, ParserKind};
use crate::{AppError, Result};

/// Reads schema.org `Offer` entries from `application/ld+json` scripts.
pub struct JsonLdParser {
    script_selector: Selector,
    prices: LocalePrice,
}

impl JsonLdParser {
    pub fn new(prices: LocalePrice) -> Result<Self> {
        let script_selector = Selector::parse(r#"script[type="application/ld+json"]"#)
            .map_err(|e| AppError::Internal(format!("json-ld selector: {:?}", e)))?;
        Ok(Self {
            script_selector,
            prices,
        })
    }

    fn collect_offers(&self, value: &Value, out: &mut Vec<ObservedListing>) {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.collect_offers(item, out);
                }
            }
            Value::Object(map) => {
                if has_type(value, "Offer") {
                    if let Some(listing) = self.offer_listing(value) {
                        out.push(listing);
                    }
                }
                // Product.offers, AggregateOffer.offers, @graph, ...
                for (key, child) in map {
                    if key != "seller" {
                        self.collect_offers(child, out);
                    }
                }
            }
            _ => {}
        }
    }

    fn offer_listing(&self, offer: &Value) -> Option<ObservedListing> {
        let seller = match offer.get("seller")? {
            Value::String(name) => name.trim().to_string(),
            other => other.get("name")?.as_str()?.trim().to_string(),
        };
        if seller.is_empty() {
            return None;
        }

        let price = match offer.get("price")? {
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok()?,
            // schema.org mandates `.` as the decimal mark, but shops get it wrong.
            Value::String(s) => Decimal::from_str(s.trim())
                .ok()
                .or_else(|| self.prices.parse(s))?,
            _ => return None,
        };

        Some(ObservedListing::new(seller, price))
    }
}

fn has_type(value: &Value, wanted: &str) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == wanted,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(wanted)),
        _ => false,
    }
}

impl ListingParser for JsonLdParser {
    fn name(&self) -> &str {
        "JSON-LD Offer Parser"
    }

    fn kind(&self) -> ParserKind {
        ParserKind::JsonLd
    }

    fn parse(&self, page: &str, target: &Target) -> Result<Vec<ObservedListing>> {
        let document = Html::parse_document(page);
        let scripts: Vec<String> = document
            .select(&self.script_selector)
            .map(|el| el.text().collect::<String>())
            .collect();

        if scripts.is_empty() {
            return Err(AppError::parse("no application/ld+json scripts on page"));
        }

        let mut listings = Vec::new();
        for (index, script) in scripts.iter().enumerate() {
            match serde_json::from_str::<Value>(script) {
                Ok(value) => self.collect_offers(&value, &mut listings),
                Err(e) => {
                    tracing::debug!(target_id = %target.id, index, error = %e, "Skipping malformed JSON-LD block");
                }
            }
        }

        if listings.is_empty() {
            return Err(AppError::parse("JSON-LD held no offers with a seller and a price"));
        }
        Ok(listings)
    }
}
