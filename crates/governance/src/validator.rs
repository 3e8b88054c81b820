//! Quadratic vote budget validation
//!
//! The budget check always starts from the user's stored votes, never from
//! a client-reported running total. Callers that write afterwards must hold
//! the user's lock across check and write (see
//! [`crate::store::ReviewVoteStore`]).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    cost_table::CostTable, repository::VoteRepository, QuadraticVote, ReviewError, ReviewResult,
    ReviewYear, VoteIndex,
};

/// Outcome of a passed budget check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCheck {
    /// Cost of the user's other votes, excluding the post being changed
    pub current_total_cost: u32,
    /// Total after the proposed change
    pub new_total_cost: u32,
    pub budget: u32,
    /// Index currently stored for the post, 0 when there is none
    pub previous_index: VoteIndex,
}

impl BudgetCheck {
    /// The proposal matches what is already stored
    pub fn is_unchanged(&self, proposed_index: VoteIndex) -> bool {
        self.previous_index == proposed_index
    }
}

/// A user's spending for one review year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub spent: u32,
    pub remaining: u32,
    pub budget: u32,
    pub vote_count: usize,
    /// Sum of display values across the user's votes
    pub vote_sum: i64,
    pub vote_average: f64,
    /// An average strength beyond ±1 means the user could express the same
    /// preferences more cheaply by shifting every vote toward zero
    pub unbalanced: bool,
}

/// Enforces `sum(cost) <= budget` over one user's votes in one review year
#[derive(Debug, Clone)]
pub struct QuadraticVoteValidator {
    cost_table: CostTable,
    budget: u32,
}

impl QuadraticVoteValidator {
    pub fn new(cost_table: CostTable, budget: u32) -> Self {
        Self { cost_table, budget }
    }

    pub fn cost_table(&self) -> &CostTable {
        &self.cost_table
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Total cost of a set of votes
    pub fn total_cost<'a>(&self, votes: impl IntoIterator<Item = &'a QuadraticVote>) -> ReviewResult<u32> {
        votes
            .into_iter()
            .try_fold(0u32, |acc, v| Ok(acc.saturating_add(v.cost(&self.cost_table)?)))
    }

    /// Check a proposed vote against the user's existing votes.
    ///
    /// The existing vote on `post_id`, if any, is excluded from the current
    /// total because the proposal replaces it. Withdrawing (index 0) and
    /// re-submitting the stored index always pass.
    pub fn check(
        &self,
        existing: &[QuadraticVote],
        post_id: &str,
        proposed_index: VoteIndex,
    ) -> ReviewResult<BudgetCheck> {
        let attempted_cost = self.cost_table.cost(proposed_index)?;
        let current_total_cost =
            self.total_cost(existing.iter().filter(|v| v.post_id != post_id))?;
        let new_total_cost = current_total_cost.saturating_add(attempted_cost);

        let previous_index = existing
            .iter()
            .find(|v| v.post_id == post_id)
            .map(|v| v.vote_index)
            .unwrap_or(0);

        if proposed_index != 0 && previous_index != proposed_index && new_total_cost > self.budget {
            debug!(
                post_id,
                current_total_cost,
                attempted_cost,
                budget = self.budget,
                "quadratic vote over budget"
            );
            return Err(ReviewError::BudgetExceeded {
                current_total_cost,
                attempted_cost,
                budget: self.budget,
            });
        }

        Ok(BudgetCheck {
            current_total_cost,
            new_total_cost,
            budget: self.budget,
            previous_index,
        })
    }

    /// Load the user's votes from `repository` and run [`Self::check`].
    ///
    /// This is the check the vote store runs under the user's lock.
    pub async fn validate(
        &self,
        repository: &Arc<dyn VoteRepository>,
        user_id: &str,
        review_year: ReviewYear,
        proposed_index: VoteIndex,
        post_id: &str,
    ) -> ReviewResult<BudgetCheck> {
        let existing = repository.quadratic_votes_for_user(user_id, review_year).await?;
        self.check(&existing, post_id, proposed_index)
    }

    pub fn summarize(&self, votes: &[QuadraticVote]) -> ReviewResult<BudgetSummary> {
        let spent = self.total_cost(votes)?;
        let vote_sum = votes.iter().try_fold(0i64, |acc, v| {
            Ok::<_, ReviewError>(acc + i64::from(v.display_value(&self.cost_table)?))
        })?;
        let vote_average = if votes.is_empty() {
            0.0
        } else {
            vote_sum as f64 / votes.len() as f64
        };

        Ok(BudgetSummary {
            spent,
            remaining: self.budget.saturating_sub(spent),
            budget: self.budget,
            vote_count: votes.len(),
            vote_sum,
            vote_average,
            unbalanced: vote_average.abs() > 1.0,
        })
    }
}
