pub mod manager;
pub mod parsers;
pub mod traits;

pub use manager::ParserRegistry;
pub use traits::{ListingParser, ParserKind};
