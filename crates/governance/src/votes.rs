//! Vote records
//!
//! Both record kinds are keyed by (user, post, review year); each write by
//! the voting user replaces the previous record for that key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{cost_table::CostTable, PostId, ReviewResult, ReviewYear, UserId, VoteIndex};

/// A qualitative vote cast during the nomination phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominationVote {
    pub user_id: UserId,
    pub post_id: PostId,
    pub review_year: ReviewYear,
    /// 0 means "no opinion"; see [`crate::ReviewConfig::max_nomination_score`]
    pub score: i32,
    /// Withdrawn nominations are kept for audit and flagged here
    #[serde(default)]
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

impl NominationVote {
    pub fn new(
        user_id: impl Into<UserId>,
        post_id: impl Into<PostId>,
        review_year: ReviewYear,
        score: i32,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            post_id: post_id.into(),
            review_year,
            score,
            deleted: false,
            updated_at,
        }
    }

    /// Counted in tallies
    pub fn is_live(&self) -> bool {
        !self.deleted && self.score != 0
    }

    pub fn is_positive(&self) -> bool {
        self.is_live() && self.score > 0
    }
}

/// A budget-constrained vote cast during the review phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadraticVote {
    pub user_id: UserId,
    pub post_id: PostId,
    pub review_year: ReviewYear,
    pub vote_index: VoteIndex,
    pub updated_at: DateTime<Utc>,
}

impl QuadraticVote {
    pub fn new(
        user_id: impl Into<UserId>,
        post_id: impl Into<PostId>,
        review_year: ReviewYear,
        vote_index: VoteIndex,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            post_id: post_id.into(),
            review_year,
            vote_index,
            updated_at,
        }
    }

    pub fn cost(&self, table: &CostTable) -> ReviewResult<u32> {
        table.cost(self.vote_index)
    }

    pub fn display_value(&self, table: &CostTable) -> ReviewResult<i32> {
        table.display_value(self.vote_index)
    }
}
