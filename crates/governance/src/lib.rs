//! Annual Review governance
//!
//! The community nominates posts written in a prior year, then spends a
//! fixed per-user budget on quadratic votes to rank them. Results are split
//! by voter karma so experienced readers' judgement can lead the ranking.
//!
//! Components, leaves first:
//! - [`cost_table`]: vote-strength index to (cost, display value)
//! - [`phase`]: which phase a review year is in, derived from the clock
//! - [`repository`]: persistence of nomination and quadratic vote records
//! - [`validator`]: the per-user budget check
//! - [`store`]: the write path tying phase, eligibility and budget together
//! - [`aggregator`]: karma-tiered ranking of a review year

use serde::{Deserialize, Serialize};
use thiserror::Error;

use review_karma::KarmaError;
use review_storage::StorageError;

pub mod aggregator;
pub mod config;
pub mod cost_table;
pub mod eligibility;
pub mod nominations;
pub mod phase;
pub mod posts;
pub mod repository;
pub mod seeding;
pub mod store;
pub mod validator;
pub mod votes;

// Re-exports
pub use aggregator::{AggregateResult, Aggregator, RankScore};
pub use config::ReviewConfig;
pub use cost_table::{CostEntry, CostTable};
pub use eligibility::{Eligibility, StandardEligibility};
pub use nominations::NominationTally;
pub use phase::{PhaseClock, ReviewPhase, ReviewSchedule};
pub use posts::{PostCatalog, PostRecord, StoragePostCatalog};
pub use repository::{StorageVoteRepository, VoteRepository};
pub use store::ReviewVoteStore;
pub use validator::{BudgetCheck, BudgetSummary, QuadraticVoteValidator};
pub use votes::{NominationVote, QuadraticVote};

pub use review_karma::UserId;

/// Identifier of a post
pub type PostId = String;

/// Calendar year whose posts are under review
pub type ReviewYear = i32;

/// Key into the cost table; 0 means "no vote"
pub type VoteIndex = i32;

/// Errors raised by the review engine
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReviewError {
    /// The action is not open in the current phase of the review year
    #[error("{action} is not open for the {review_year} review (phase: {phase})")]
    Phase {
        review_year: ReviewYear,
        action: String,
        phase: String,
    },

    /// The user may not act on this post
    #[error("Not eligible: {0}")]
    NotEligible(String),

    /// The vote index is outside the cost table
    #[error("Invalid vote index: {0}")]
    InvalidVoteIndex(VoteIndex),

    /// The nomination score is outside the allowed range
    #[error("Invalid nomination score {score}, expected 0..={max}")]
    InvalidNominationScore { score: i32, max: i32 },

    /// The vote would take the user's total cost over budget
    #[error("Budget exceeded: {current_total_cost} spent, {attempted_cost} attempted, budget {budget}")]
    BudgetExceeded {
        current_total_cost: u32,
        attempted_cost: u32,
        budget: u32,
    },

    /// Ranking could not be computed because the store was unreadable
    #[error("Aggregation unavailable: {0}")]
    AggregationUnavailable(String),

    /// The cost table differs from the one the review year started with
    #[error("Cost table for the {review_year} review changed mid-cycle")]
    CostTableChanged { review_year: ReviewYear },

    /// A user or post id cannot be used as a storage key segment
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The configuration is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The vote store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// The user directory failed
    #[error("Karma error: {0}")]
    Karma(String),
}

impl ReviewError {
    /// Whether this is a rejection the caller should show to the user and
    /// let them retry, rather than an unexpected fault
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ReviewError::Phase { .. }
                | ReviewError::NotEligible(_)
                | ReviewError::InvalidVoteIndex(_)
                | ReviewError::InvalidNominationScore { .. }
                | ReviewError::BudgetExceeded { .. }
                | ReviewError::AggregationUnavailable(_)
                | ReviewError::InvalidIdentifier(_)
        )
    }
}

impl From<StorageError> for ReviewError {
    fn from(err: StorageError) -> Self {
        ReviewError::Storage(err.to_string())
    }
}

impl From<KarmaError> for ReviewError {
    fn from(err: KarmaError) -> Self {
        ReviewError::Karma(err.to_string())
    }
}

impl From<ReviewError> for review_common::Error {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::NotEligible(msg) => review_common::Error::unauthorized(msg),
            ReviewError::Configuration(msg) => review_common::Error::configuration(msg),
            ReviewError::Storage(msg) | ReviewError::Karma(msg) => {
                review_common::Error::internal(msg)
            }
            ReviewError::CostTableChanged { .. } => review_common::Error::internal(err.to_string()),
            other => review_common::Error::validation(other.to_string()),
        }
    }
}

/// Result type for review operations
pub type ReviewResult<T> = Result<T, ReviewError>;

/// Check that an id can be used as a single storage key segment
pub fn validate_id(id: &str) -> ReviewResult<()> {
    if id.is_empty() || id.starts_with('.') || id.contains('/') {
        return Err(ReviewError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("post-1").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("..").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id(".staging").is_err());
        assert!(validate_id("p.tmp-write").is_ok());
    }

    #[test]
    fn test_budget_exceeded_is_user_facing() {
        let err = ReviewError::BudgetExceeded {
            current_total_cost: 4,
            attempted_cost: 9,
            budget: 10,
        };
        assert!(err.is_user_facing());
        assert!(!ReviewError::Storage("disk full".into()).is_user_facing());

        let common: review_common::Error = err.into();
        assert!(common.is_user_facing());
    }

    #[test]
    fn test_store_faults_map_to_internal() {
        let common: review_common::Error = ReviewError::Storage("gone".into()).into();
        assert!(matches!(common, review_common::Error::Internal(_)));
    }
}
