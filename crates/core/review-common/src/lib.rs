//! Common utilities and types for the Annual Review engine

pub mod config;
pub mod error;
pub mod logging;
pub mod result;
pub mod utils;

pub use error::Error;
pub use result::Result;
