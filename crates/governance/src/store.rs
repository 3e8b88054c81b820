//! The vote write path
//!
//! [`ReviewVoteStore`] is the only component that writes vote records. Every
//! write checks, in order: identifiers, value range, phase, eligibility and,
//! for quadratic votes, the budget. A rejected write leaves storage untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use review_common::utils::Clock;

use crate::{
    config::ReviewConfig,
    eligibility::Eligibility,
    phase::{self, PhaseClock, ReviewPhase},
    repository::VoteRepository,
    seeding::seed_from_nominations,
    validate_id,
    validator::{BudgetSummary, QuadraticVoteValidator},
    NominationVote, PostId, QuadraticVote, ReviewError, ReviewResult, ReviewYear, UserId,
    VoteIndex,
};

/// Key of the per-user serialisation point
type UserLockKey = (UserId, ReviewYear);

/// Phase-gated, budget-checked access to nomination and quadratic votes
pub struct ReviewVoteStore {
    repository: Arc<dyn VoteRepository>,
    eligibility: Arc<dyn Eligibility>,
    clock: Arc<dyn Clock>,
    phases: PhaseClock,
    validator: QuadraticVoteValidator,
    max_nomination_score: i32,
    /// Held across the read-validate-write of a user's quadratic votes
    user_locks: DashMap<UserLockKey, Arc<Mutex<()>>>,
}

impl ReviewVoteStore {
    pub fn new(
        repository: Arc<dyn VoteRepository>,
        eligibility: Arc<dyn Eligibility>,
        clock: Arc<dyn Clock>,
        config: &ReviewConfig,
    ) -> ReviewResult<Self> {
        config.check()?;
        Ok(Self {
            repository,
            eligibility,
            clock,
            phases: config.phase_clock()?,
            validator: QuadraticVoteValidator::new(config.cost_table.clone(), config.budget),
            max_nomination_score: config.max_nomination_score,
            user_locks: DashMap::new(),
        })
    }

    pub fn repository(&self) -> &Arc<dyn VoteRepository> {
        &self.repository
    }

    pub fn validator(&self) -> &QuadraticVoteValidator {
        &self.validator
    }

    pub fn phases(&self) -> &PhaseClock {
        &self.phases
    }

    /// Phase of `review_year` right now
    pub fn current_phase(&self, review_year: ReviewYear) -> Option<ReviewPhase> {
        self.phases.current_phase(review_year, self.clock.now())
    }

    fn user_lock(&self, key: &UserLockKey) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the user's lock once no task holds or waits on it
    fn release_user_lock(&self, key: &UserLockKey) {
        self.user_locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.user_locks.len()
    }

    /// Create, change or withdraw (score 0) a nomination.
    ///
    /// Withdrawal soft-deletes the record. Re-submitting the stored score
    /// writes nothing.
    pub async fn upsert_nomination(
        &self,
        user_id: &str,
        post_id: &str,
        review_year: ReviewYear,
        score: i32,
    ) -> ReviewResult<()> {
        validate_id(user_id)?;
        validate_id(post_id)?;

        if !(0..=self.max_nomination_score).contains(&score) {
            return Err(ReviewError::InvalidNominationScore {
                score,
                max: self.max_nomination_score,
            });
        }

        let now = self.clock.now();
        self.phases
            .require(review_year, now, "Nominating", phase::can_nominate)
            .map_err(|e| {
                debug!(user_id, post_id, review_year, "nomination outside nomination phase");
                e
            })?;

        if score > 0 {
            // Phase was checked above, so the schedule exists.
            let schedule = self.phases.schedule(review_year).ok_or_else(|| {
                ReviewError::Configuration(format!("no schedule for {}", review_year))
            })?;
            self.eligibility
                .check_nomination(user_id, post_id, schedule)
                .await
                .map_err(|e| {
                    debug!(user_id, post_id, error = %e, "nomination rejected");
                    e
                })?;
        }

        let existing = self
            .repository
            .get_nomination(user_id, post_id, review_year)
            .await
            .map_err(|e| log_fault("get_nomination", e))?;

        let record = match existing {
            Some(current) if current.score == score && current.deleted == (score == 0) => {
                debug!(user_id, post_id, score, "nomination unchanged");
                return Ok(());
            }
            Some(mut current) => {
                current.score = score;
                current.deleted = score == 0;
                current.updated_at = now;
                current
            }
            // Withdrawing a nomination that was never cast
            None if score == 0 => return Ok(()),
            None => NominationVote::new(user_id, post_id, review_year, score, now),
        };

        self.repository
            .put_nomination(&record)
            .await
            .map_err(|e| log_fault("put_nomination", e))?;

        info!(user_id, post_id, review_year, score, "nomination recorded");
        Ok(())
    }

    /// Create, change or withdraw (index 0) a quadratic vote.
    ///
    /// Runs under the user's lock so two concurrent submissions from the
    /// same user are validated one after the other against stored state.
    pub async fn upsert_quadratic_vote(
        &self,
        user_id: &str,
        post_id: &str,
        review_year: ReviewYear,
        vote_index: VoteIndex,
    ) -> ReviewResult<()> {
        validate_id(user_id)?;
        validate_id(post_id)?;

        let now = self.clock.now();
        self.phases
            .require(review_year, now, "Voting", phase::can_vote)
            .map_err(|e| {
                debug!(user_id, post_id, review_year, "vote outside review phase");
                e
            })?;

        // Validates the index before anything is read.
        self.validator.cost_table().entry(vote_index)?;

        if vote_index != 0 {
            self.eligibility
                .check_vote(user_id, post_id, review_year)
                .await
                .map_err(|e| {
                    debug!(user_id, post_id, error = %e, "vote rejected");
                    e
                })?;
        }

        let key = (user_id.to_string(), review_year);
        let lock = self.user_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.apply_quadratic_vote(user_id, post_id, review_year, vote_index, now)
                .await
        };
        drop(lock);
        self.release_user_lock(&key);
        result
    }

    /// Read-validate-write of one quadratic vote; the caller holds the
    /// user's lock
    async fn apply_quadratic_vote(
        &self,
        user_id: &str,
        post_id: &str,
        review_year: ReviewYear,
        vote_index: VoteIndex,
        now: DateTime<Utc>,
    ) -> ReviewResult<()> {
        let record_fingerprint = self.check_cost_table(review_year).await?;

        let check = self
            .validator
            .validate(&self.repository, user_id, review_year, vote_index, post_id)
            .await
            .map_err(|e| log_fault("validate", e))?;
        if check.is_unchanged(vote_index) {
            debug!(user_id, post_id, vote_index, "quadratic vote unchanged");
            return Ok(());
        }

        if vote_index == 0 {
            self.repository
                .delete_quadratic_vote(user_id, post_id, review_year)
                .await
                .map_err(|e| log_fault("delete_quadratic_vote", e))?;
        } else {
            if let Some(fingerprint) = record_fingerprint {
                self.repository
                    .set_cost_table_fingerprint(review_year, &fingerprint)
                    .await
                    .map_err(|e| log_fault("set_cost_table_fingerprint", e))?;
            }
            let vote = QuadraticVote::new(user_id, post_id, review_year, vote_index, now);
            self.repository
                .put_quadratic_vote(&vote)
                .await
                .map_err(|e| log_fault("put_quadratic_vote", e))?;
        }

        info!(
            user_id,
            post_id,
            review_year,
            vote_index,
            total_cost = check.new_total_cost,
            "quadratic vote recorded"
        );
        Ok(())
    }

    /// The cost table may not change once a year has quadratic votes.
    ///
    /// Returns the fingerprint to record with the first accepted vote, or
    /// `None` when one is already on file.
    async fn check_cost_table(&self, review_year: ReviewYear) -> ReviewResult<Option<String>> {
        let fingerprint = self.validator.cost_table().fingerprint();
        match self
            .repository
            .cost_table_fingerprint(review_year)
            .await
            .map_err(|e| log_fault("cost_table_fingerprint", e))?
        {
            Some(recorded) if recorded == fingerprint => Ok(None),
            Some(_) => {
                error!(review_year, "cost table differs from the one recorded for this review");
                Err(ReviewError::CostTableChanged { review_year })
            }
            None => Ok(Some(fingerprint)),
        }
    }

    /// The user's quadratic votes for a review year, sorted by post id
    pub async fn get_votes_for_user(
        &self,
        user_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Vec<QuadraticVote>> {
        let mut votes = self.repository.quadratic_votes_for_user(user_id, review_year).await?;
        votes.sort_by(|a, b| a.post_id.cmp(&b.post_id));
        Ok(votes)
    }

    /// All quadratic votes on a post for a review year, sorted by user id
    pub async fn get_votes_for_post(
        &self,
        post_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Vec<QuadraticVote>> {
        validate_id(post_id)?;
        let mut votes = self.repository.quadratic_votes_for_post(post_id, review_year).await?;
        votes.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(votes)
    }

    pub async fn get_nominations_for_user(
        &self,
        user_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Vec<NominationVote>> {
        let mut nominations = self.repository.nominations_for_user(user_id, review_year).await?;
        nominations.sort_by(|a, b| a.post_id.cmp(&b.post_id));
        Ok(nominations)
    }

    pub async fn budget_summary(&self, user_id: &str, review_year: ReviewYear) -> ReviewResult<BudgetSummary> {
        let votes = self.repository.quadratic_votes_for_user(user_id, review_year).await?;
        self.validator.summarize(&votes)
    }

    /// Replace the user's quadratic votes with a proposal seeded from their
    /// nominations and return the applied indices.
    ///
    /// Lowered votes and withdrawals are written before raised ones, so every
    /// intermediate state stays within budget. Posts the user already voted
    /// on but never nominated keep their votes and their cost.
    pub async fn convert_nominations_to_votes(
        &self,
        user_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Vec<(PostId, VoteIndex)>> {
        self.phases
            .require(review_year, self.clock.now(), "Voting", phase::can_vote)?;

        let nominations = self.repository.nominations_for_user(user_id, review_year).await?;
        let existing = self.repository.quadratic_votes_for_user(user_id, review_year).await?;

        let nominated: Vec<&str> = nominations
            .iter()
            .filter(|n| n.is_live())
            .map(|n| n.post_id.as_str())
            .collect();
        let reserved = self
            .validator
            .total_cost(existing.iter().filter(|v| !nominated.contains(&v.post_id.as_str())))?;
        let allowance = self.validator.budget().saturating_sub(reserved);

        let proposal = seed_from_nominations(&nominations, self.validator.cost_table(), allowance);

        self.apply_in_cost_order(user_id, review_year, &existing, &proposal)
            .await?;

        info!(user_id, review_year, posts = proposal.len(), "seeded quadratic votes from nominations");
        Ok(proposal)
    }

    /// Shift every quadratic vote of the user toward zero by the truncated
    /// average vote strength and return the votes that changed.
    ///
    /// Nothing changes while the average strength stays within ±1. Shifted
    /// votes stop at the strongest index in the table, and votes shifted to
    /// 0 are withdrawn. The shift never raises the total cost.
    pub async fn renormalize_votes(
        &self,
        user_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Vec<(PostId, VoteIndex)>> {
        validate_id(user_id)?;
        self.phases
            .require(review_year, self.clock.now(), "Voting", phase::can_vote)?;

        let existing = self
            .repository
            .quadratic_votes_for_user(user_id, review_year)
            .await
            .map_err(|e| log_fault("quadratic_votes_for_user", e))?;

        let shift = average_shift(&existing);
        if shift == 0 {
            debug!(user_id, review_year, "votes already balanced");
            return Ok(Vec::new());
        }

        let table = self.validator.cost_table();
        let mut changes: Vec<(PostId, VoteIndex)> = existing
            .iter()
            .filter_map(|v| {
                let index = table.nearest_index(v.vote_index - shift);
                (index != v.vote_index).then(|| (v.post_id.clone(), index))
            })
            .collect();
        changes.sort();

        self.apply_in_cost_order(user_id, review_year, &existing, &changes)
            .await?;

        info!(user_id, review_year, shift, changed = changes.len(), "renormalized quadratic votes");
        Ok(changes)
    }

    /// Write `changes` cheapest-first so freed budget is available before
    /// any vote is raised
    async fn apply_in_cost_order(
        &self,
        user_id: &str,
        review_year: ReviewYear,
        existing: &[QuadraticVote],
        changes: &[(PostId, VoteIndex)],
    ) -> ReviewResult<()> {
        let current = |post_id: &str| {
            existing
                .iter()
                .find(|v| v.post_id == post_id)
                .map(|v| v.vote_index)
                .unwrap_or(0)
        };
        let table = self.validator.cost_table();
        let mut ordered = Vec::with_capacity(changes.len());
        for (post_id, index) in changes {
            let delta = i64::from(table.cost(*index)?) - i64::from(table.cost(current(post_id))?);
            ordered.push((delta, post_id.as_str(), *index));
        }
        ordered.sort_by_key(|(delta, post_id, _)| (*delta, *post_id));

        for (_, post_id, index) in ordered {
            self.upsert_quadratic_vote(user_id, post_id, review_year, index).await?;
        }
        Ok(())
    }
}

/// Truncated average vote index, or 0 while the average is within ±1
fn average_shift(votes: &[QuadraticVote]) -> VoteIndex {
    if votes.is_empty() {
        return 0;
    }
    let sum: i64 = votes.iter().map(|v| i64::from(v.vote_index)).sum();
    let average = sum as f64 / votes.len() as f64;
    if average.abs() <= 1.0 {
        0
    } else {
        average.trunc() as VoteIndex
    }
}

/// Store faults are unexpected, unlike rejections
fn log_fault(operation: &str, err: ReviewError) -> ReviewError {
    if !err.is_user_facing() {
        error!(operation, error = %err, "vote store failure");
    }
    err
}
