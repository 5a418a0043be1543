pub mod error;
pub mod logging;

pub use error::{AppError, ErrorKind};
pub use logging::init_logging;
