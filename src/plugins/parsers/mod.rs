// Listing parser implementations
pub mod json_ld;
pub mod offer_list;
pub mod price;

pub use json_ld::JsonLdParser;
pub use offer_list::OfferListParser;
pub use price::LocalePrice;
