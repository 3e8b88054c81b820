//! Persistence of vote records
//!
//! The repository is a thin mapping from records to documents. It knows
//! nothing about phases or budgets; those rules live in
//! [`crate::store::ReviewVoteStore`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use review_storage::{JsonStorage, Storage, StorageError};

use crate::{
    validate_id, NominationVote, PostId, QuadraticVote, ReviewResult, ReviewYear, UserId,
};

/// Path constants for storage
const REVIEW_PATH: &str = "review";
const NOMINATIONS_DIR: &str = "nominations";
const QUADRATIC_DIR: &str = "quadratic";
const COST_TABLE_KEY: &str = "cost-table";

/// Record-level access to nomination and quadratic votes
#[async_trait]
pub trait VoteRepository: Send + Sync {
    async fn get_nomination(
        &self,
        user_id: &str,
        post_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Option<NominationVote>>;

    /// Insert or replace the nomination for the record's key
    async fn put_nomination(&self, vote: &NominationVote) -> ReviewResult<()>;

    async fn nominations_for_user(
        &self,
        user_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Vec<NominationVote>>;

    async fn nominations_for_year(&self, review_year: ReviewYear) -> ReviewResult<Vec<NominationVote>>;

    async fn get_quadratic_vote(
        &self,
        user_id: &str,
        post_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Option<QuadraticVote>>;

    /// Insert or replace the quadratic vote for the record's key
    async fn put_quadratic_vote(&self, vote: &QuadraticVote) -> ReviewResult<()>;

    /// Remove a quadratic vote; removing a missing vote is not an error
    async fn delete_quadratic_vote(
        &self,
        user_id: &str,
        post_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<()>;

    async fn quadratic_votes_for_user(
        &self,
        user_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Vec<QuadraticVote>>;

    async fn quadratic_votes_for_year(&self, review_year: ReviewYear) -> ReviewResult<Vec<QuadraticVote>>;

    async fn quadratic_votes_for_post(
        &self,
        post_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Vec<QuadraticVote>> {
        let mut votes = self.quadratic_votes_for_year(review_year).await?;
        votes.retain(|v| v.post_id == post_id);
        Ok(votes)
    }

    /// Fingerprint of the cost table the year's first quadratic vote used
    async fn cost_table_fingerprint(&self, review_year: ReviewYear) -> ReviewResult<Option<String>>;

    async fn set_cost_table_fingerprint(
        &self,
        review_year: ReviewYear,
        fingerprint: &str,
    ) -> ReviewResult<()>;
}

/// Vote repository over the document store.
///
/// Layout:
/// - `review/<year>/nominations/<user>/<post>`
/// - `review/<year>/quadratic/<user>/<post>`
/// - `review/<year>/cost-table`
pub struct StorageVoteRepository {
    storage: Arc<dyn Storage>,
}

impl StorageVoteRepository {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn record_key(kind: &str, review_year: ReviewYear, user_id: &str, post_id: &str) -> ReviewResult<String> {
        validate_id(user_id)?;
        validate_id(post_id)?;
        Ok(format!("{}/{}/{}/{}/{}", REVIEW_PATH, review_year, kind, user_id, post_id))
    }

    fn user_prefix(kind: &str, review_year: ReviewYear, user_id: &str) -> ReviewResult<String> {
        validate_id(user_id)?;
        Ok(format!("{}/{}/{}/{}/", REVIEW_PATH, review_year, kind, user_id))
    }

    fn year_prefix(kind: &str, review_year: ReviewYear) -> String {
        format!("{}/{}/{}/", REVIEW_PATH, review_year, kind)
    }

    /// Load every document under a prefix. Keys deleted between the listing
    /// and the read are skipped.
    async fn load_all<T: DeserializeOwned + Send>(&self, prefix: &str) -> ReviewResult<Vec<T>> {
        let keys = self.storage.list(prefix).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            match self.storage.get_json_opt::<T>(&key).await? {
                Some(record) => records.push(record),
                None => debug!(%key, "record vanished during scan"),
            }
        }
        Ok(records)
    }

    async fn load_one<T: DeserializeOwned + Send>(&self, key: &str) -> ReviewResult<Option<T>> {
        Ok(self.storage.get_json_opt::<T>(key).await?)
    }
}

#[async_trait]
impl VoteRepository for StorageVoteRepository {
    async fn get_nomination(
        &self,
        user_id: &str,
        post_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Option<NominationVote>> {
        let key = Self::record_key(NOMINATIONS_DIR, review_year, user_id, post_id)?;
        self.load_one(&key).await
    }

    async fn put_nomination(&self, vote: &NominationVote) -> ReviewResult<()> {
        let key = Self::record_key(NOMINATIONS_DIR, vote.review_year, &vote.user_id, &vote.post_id)?;
        self.storage.put_json(&key, vote).await?;
        Ok(())
    }

    async fn nominations_for_user(
        &self,
        user_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Vec<NominationVote>> {
        let prefix = Self::user_prefix(NOMINATIONS_DIR, review_year, user_id)?;
        self.load_all(&prefix).await
    }

    async fn nominations_for_year(&self, review_year: ReviewYear) -> ReviewResult<Vec<NominationVote>> {
        self.load_all(&Self::year_prefix(NOMINATIONS_DIR, review_year)).await
    }

    async fn get_quadratic_vote(
        &self,
        user_id: &str,
        post_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Option<QuadraticVote>> {
        let key = Self::record_key(QUADRATIC_DIR, review_year, user_id, post_id)?;
        self.load_one(&key).await
    }

    async fn put_quadratic_vote(&self, vote: &QuadraticVote) -> ReviewResult<()> {
        let key = Self::record_key(QUADRATIC_DIR, vote.review_year, &vote.user_id, &vote.post_id)?;
        self.storage.put_json(&key, vote).await?;
        Ok(())
    }

    async fn delete_quadratic_vote(
        &self,
        user_id: &str,
        post_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<()> {
        let key = Self::record_key(QUADRATIC_DIR, review_year, user_id, post_id)?;
        match self.storage.delete(&key).await {
            Ok(()) | Err(StorageError::KeyNotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn quadratic_votes_for_user(
        &self,
        user_id: &str,
        review_year: ReviewYear,
    ) -> ReviewResult<Vec<QuadraticVote>> {
        let prefix = Self::user_prefix(QUADRATIC_DIR, review_year, user_id)?;
        self.load_all(&prefix).await
    }

    async fn quadratic_votes_for_year(&self, review_year: ReviewYear) -> ReviewResult<Vec<QuadraticVote>> {
        self.load_all(&Self::year_prefix(QUADRATIC_DIR, review_year)).await
    }

    async fn cost_table_fingerprint(&self, review_year: ReviewYear) -> ReviewResult<Option<String>> {
        let key = format!("{}/{}/{}", REVIEW_PATH, review_year, COST_TABLE_KEY);
        self.load_one(&key).await
    }

    async fn set_cost_table_fingerprint(
        &self,
        review_year: ReviewYear,
        fingerprint: &str,
    ) -> ReviewResult<()> {
        let key = format!("{}/{}/{}", REVIEW_PATH, review_year, COST_TABLE_KEY);
        if let Some(existing) = self.load_one::<String>(&key).await? {
            if existing != fingerprint {
                warn!(review_year, "overwriting recorded cost table fingerprint");
            }
        }
        self.storage.put_json(&key, &fingerprint.to_string()).await?;
        Ok(())
    }
}

/// Convenience: ids of the distinct voters in a vote list, sorted
pub fn distinct_voters(votes: &[QuadraticVote]) -> Vec<UserId> {
    let mut users: Vec<UserId> = votes.iter().map(|v| v.user_id.clone()).collect();
    users.sort();
    users.dedup();
    users
}

/// Convenience: ids of the distinct posts in a vote list, sorted
pub fn distinct_posts(votes: &[QuadraticVote]) -> Vec<PostId> {
    let mut posts: Vec<PostId> = votes.iter().map(|v| v.post_id.clone()).collect();
    posts.sort();
    posts.dedup();
    posts
}
