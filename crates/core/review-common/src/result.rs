//! Result type for the Annual Review engine

use crate::error::Error;

/// Result type for the Annual Review engine
pub type Result<T> = std::result::Result<T, Error>;
