//! Karma and voter cohorts
//!
//! Karma is a long-lived reputation score owned by the user system. The
//! review engine only reads it, once per evaluation, to split voters into
//! cohorts. Classification lives here, away from vote storage, so that a
//! threshold change never touches the vote records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use review_storage::{JsonStorage, Storage, StorageError};

/// Identifier of a user account
pub type UserId = String;

/// Storage prefix for user profiles
pub const USERS_PATH: &str = "users";

/// Errors raised while resolving user profiles
#[derive(Debug, Error)]
pub enum KarmaError {
    /// The backing store failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A profile document could not be interpreted
    #[error("Invalid profile for {0}: {1}")]
    InvalidProfile(UserId, String),
}

impl From<KarmaError> for review_common::Error {
    fn from(err: KarmaError) -> Self {
        match err {
            KarmaError::Storage(e) => e.into(),
            KarmaError::InvalidProfile(user, msg) => {
                review_common::Error::internal(format!("profile {}: {}", user, msg))
            }
        }
    }
}

/// Result type for karma operations
pub type KarmaResult<T> = Result<T, KarmaError>;

/// The parts of a user account the review engine reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub karma: i64,
    /// When the account was registered
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<UserId>, karma: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            karma,
            created_at,
        }
    }

    /// Capture the user's karma as of `taken_at`
    pub fn snapshot(&self, taken_at: DateTime<Utc>) -> KarmaSnapshot {
        KarmaSnapshot {
            user_id: self.user_id.clone(),
            karma: self.karma,
            taken_at,
        }
    }
}

/// A user's karma as read at evaluation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KarmaSnapshot {
    pub user_id: UserId,
    pub karma: i64,
    pub taken_at: DateTime<Utc>,
}

/// Voter cohort used when aggregating votes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cohort {
    /// Karma at or above the high-karma threshold
    HighKarma,
    /// Everyone else
    AllUsers,
}

/// Karma thresholds used to classify voters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KarmaTiers {
    pub high_karma_threshold: i64,
}

impl Default for KarmaTiers {
    fn default() -> Self {
        Self {
            high_karma_threshold: 1000,
        }
    }
}

impl KarmaTiers {
    pub fn new(high_karma_threshold: i64) -> Self {
        Self {
            high_karma_threshold,
        }
    }

    /// Classify a raw karma value
    pub fn classify_karma(&self, karma: i64) -> Cohort {
        if karma >= self.high_karma_threshold {
            Cohort::HighKarma
        } else {
            Cohort::AllUsers
        }
    }

    /// Classify a snapshot
    pub fn classify(&self, snapshot: &KarmaSnapshot) -> Cohort {
        self.classify_karma(snapshot.karma)
    }
}

/// Read access to user profiles
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a profile; unknown users are `Ok(None)`
    async fn profile(&self, user_id: &str) -> KarmaResult<Option<UserProfile>>;

    /// Take a karma snapshot, treating unknown users as zero karma
    async fn snapshot(&self, user_id: &str, taken_at: DateTime<Utc>) -> KarmaResult<KarmaSnapshot> {
        Ok(match self.profile(user_id).await? {
            Some(profile) => profile.snapshot(taken_at),
            None => {
                debug!(user_id, "no profile found, using zero karma");
                KarmaSnapshot {
                    user_id: user_id.to_string(),
                    karma: 0,
                    taken_at,
                }
            }
        })
    }
}

/// User directory persisted in the document store under `users/<id>`
pub struct StorageUserDirectory {
    storage: Arc<dyn Storage>,
}

impl StorageUserDirectory {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(user_id: &str) -> String {
        format!("{}/{}", USERS_PATH, user_id)
    }

    /// Create or replace a profile
    pub async fn save_profile(&self, profile: &UserProfile) -> KarmaResult<()> {
        self.storage
            .put_json(&Self::key(&profile.user_id), profile)
            .await?;
        debug!(user_id = %profile.user_id, karma = profile.karma, "saved user profile");
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for StorageUserDirectory {
    async fn profile(&self, user_id: &str) -> KarmaResult<Option<UserProfile>> {
        match self.storage.get_json_opt::<UserProfile>(&Self::key(user_id)).await {
            Ok(profile) => Ok(profile),
            Err(StorageError::DeserializationError(msg)) => {
                Err(KarmaError::InvalidProfile(user_id.to_string(), msg))
            }
            Err(e) => Err(e.into()),
        }
    }
}
