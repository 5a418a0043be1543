pub mod parser;

pub use parser::{ListingParser, ParserKind};
