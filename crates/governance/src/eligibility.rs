//! Who may nominate and vote
//!
//! The store asks an [`Eligibility`] implementation before writing. The
//! standard rules forbid voting on your own posts, require nominators to
//! have registered before the review opened, and require nominated posts to
//! come from the year under review.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use review_karma::UserDirectory;

use crate::{
    phase::ReviewSchedule, posts::PostCatalog, PostRecord, ReviewError, ReviewResult, ReviewYear,
};

#[async_trait]
pub trait Eligibility: Send + Sync {
    /// May `user_id` nominate `post_id` under `schedule`?
    async fn check_nomination(
        &self,
        user_id: &str,
        post_id: &str,
        schedule: &ReviewSchedule,
    ) -> ReviewResult<()>;

    /// May `user_id` cast a quadratic vote on `post_id`?
    async fn check_vote(&self, user_id: &str, post_id: &str, review_year: ReviewYear) -> ReviewResult<()>;
}

/// Eligibility backed by the user directory and post catalogue
pub struct StandardEligibility {
    users: Arc<dyn UserDirectory>,
    posts: Arc<dyn PostCatalog>,
    min_nomination_karma: i64,
}

impl StandardEligibility {
    pub fn new(users: Arc<dyn UserDirectory>, posts: Arc<dyn PostCatalog>, min_nomination_karma: i64) -> Self {
        Self {
            users,
            posts,
            min_nomination_karma,
        }
    }

    async fn load_post(&self, post_id: &str) -> ReviewResult<PostRecord> {
        self.posts
            .post(post_id)
            .await?
            .ok_or_else(|| ReviewError::NotEligible(format!("post {} does not exist", post_id)))
    }

    fn reject_own_post(post: &PostRecord, user_id: &str) -> ReviewResult<()> {
        if post.is_written_by(user_id) {
            debug!(user_id, post_id = %post.post_id, "rejected vote on own post");
            return Err(ReviewError::NotEligible(format!(
                "{} is an author of post {}",
                user_id, post.post_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Eligibility for StandardEligibility {
    async fn check_nomination(
        &self,
        user_id: &str,
        post_id: &str,
        schedule: &ReviewSchedule,
    ) -> ReviewResult<()> {
        let profile = self
            .users
            .profile(user_id)
            .await?
            .ok_or_else(|| ReviewError::NotEligible(format!("unknown user {}", user_id)))?;

        if profile.created_at >= schedule.nominations_start {
            return Err(ReviewError::NotEligible(format!(
                "{} registered after the {} review opened",
                user_id, schedule.review_year
            )));
        }

        if profile.karma < self.min_nomination_karma {
            return Err(ReviewError::NotEligible(format!(
                "{} has {} karma, {} required to nominate",
                user_id, profile.karma, self.min_nomination_karma
            )));
        }

        let post = self.load_post(post_id).await?;
        Self::reject_own_post(&post, user_id)?;

        if post.review_year() != schedule.review_year {
            return Err(ReviewError::NotEligible(format!(
                "post {} is from {}, not {}",
                post_id,
                post.review_year(),
                schedule.review_year
            )));
        }

        Ok(())
    }

    async fn check_vote(&self, user_id: &str, post_id: &str, _review_year: ReviewYear) -> ReviewResult<()> {
        if self.users.profile(user_id).await?.is_none() {
            return Err(ReviewError::NotEligible(format!("unknown user {}", user_id)));
        }

        let post = self.load_post(post_id).await?;
        Self::reject_own_post(&post, user_id)
    }
}
