//! Annual Review
//!
//! Ranking engine for a yearly community review: nominations, budgeted
//! quadratic votes and karma-tiered rankings.

pub mod config;
pub mod engine;

pub use config::CliConfig;
pub use engine::ReviewEngine;

/// Module version information
pub mod version {
    /// The current version of the Annual Review library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Re-export core components for easy access
pub mod core {
    pub use review_common as common;
    pub use review_storage as storage;
}

/// Re-export review components
pub mod systems {
    pub use review_governance as governance;
    pub use review_karma as karma;
}

#[cfg(test)]
mod tests {
    #[test]
    fn version_is_available() {
        assert!(!super::version::VERSION.is_empty());
    }
}
