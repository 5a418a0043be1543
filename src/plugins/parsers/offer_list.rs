use scraper::{ElementRef, Html, Selector};

use super::price::LocalePrice;
use crate::config::OfferListConfig;
use crate::models::{ObservedListing, Target};
use crate::plugins::traits::{ListingParser, ParserKind};
use crate::{AppError, Result};

/// Marketplace offer list: one block per seller, each holding a seller element
/// and a price element.
pub struct OfferListParser {
    block_selector: Selector,
    seller_selector: Selector,
    price_selector: Selector,
    block_source: String,
    prices: LocalePrice,
}

impl OfferListParser {
    pub fn new(config: &OfferListConfig, prices: LocalePrice) -> Result<Self> {
        Ok(Self {
            block_selector: parse_selector(&config.block_selector)?,
            seller_selector: parse_selector(&config.seller_selector)?,
            price_selector: parse_selector(&config.price_selector)?,
            block_source: config.block_selector.clone(),
            prices,
        })
    }

    fn extract_seller(&self, block: &ElementRef<'_>) -> Option<String> {
        let element = block.select(&self.seller_selector).next()?;
        let text = collapse_whitespace(element.text());
        if !text.is_empty() {
            return Some(text);
        }

        // Sellers are sometimes rendered as a logo only.
        let img_selector = Selector::parse("img").ok()?;
        std::iter::once(element)
            .chain(element.select(&img_selector))
            .find_map(|el| {
                el.value()
                    .attr("alt")
                    .or_else(|| el.value().attr("title"))
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            })
    }

    fn extract_price_text(&self, block: &ElementRef<'_>) -> Option<String> {
        let element = block.select(&self.price_selector).next()?;
        Some(collapse_whitespace(element.text()))
    }
}

impl ListingParser for OfferListParser {
    fn name(&self) -> &str {
        "Offer List Parser"
    }

    fn kind(&self) -> ParserKind {
        ParserKind::OfferList
    }

    fn parse(&self, page: &str, target: &Target) -> Result<Vec<ObservedListing>> {
        let document = Html::parse_document(page);
        let blocks: Vec<ElementRef<'_>> = document.select(&self.block_selector).collect();

        if blocks.is_empty() {
            return Err(AppError::parse(format!(
                "no listing blocks matched '{}'",
                self.block_source
            )));
        }

        let mut listings = Vec::with_capacity(blocks.len());
        for (index, block) in blocks.iter().enumerate() {
            let Some(seller) = self.extract_seller(block) else {
                tracing::debug!(target_id = %target.id, index, "Skipping block without seller");
                continue;
            };
            let price = self
                .extract_price_text(block)
                .and_then(|text| self.prices.parse(&text));
            match price {
                Some(price) => listings.push(ObservedListing::new(seller, price)),
                None => {
                    tracing::debug!(target_id = %target.id, index, %seller, "Skipping block without a valid price");
                }
            }
        }

        if listings.is_empty() {
            return Err(AppError::parse(format!(
                "none of {} listing blocks held a seller and a valid price",
                blocks.len()
            )));
        }
        Ok(listings)
    }
}

fn parse_selector(source: &str) -> Result<Selector> {
    Selector::parse(source)
        .map_err(|e| AppError::Validation(format!("Invalid CSS selector '{}': {:?}", source, e)))
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
