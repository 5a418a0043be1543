use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A stored (seller, price) fact for a target's product. Unique by
/// `(product_id, seller)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Observation {
    pub product_id: String,
    pub seller: String,
    pub price: Decimal,
    pub target_id: String,
}

/// One (seller, price) pair extracted from a fetched page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservedListing {
    pub seller: String,
    pub price: Decimal,
}

impl ObservedListing {
    pub fn new(seller: impl Into<String>, price: Decimal) -> Self {
        Self {
            seller: seller.into(),
            price,
        }
    }
}

/// Collapse repeated sellers, keeping the first occurrence in page order.
pub fn dedupe_listings(listings: Vec<ObservedListing>) -> Vec<ObservedListing> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|listing| seen.insert(listing.seller.clone()))
        .collect()
}
