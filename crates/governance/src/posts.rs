//! Post catalogue
//!
//! Posts belong to the wider forum; the review engine only needs to know who
//! wrote a post and when it was published.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use review_storage::{JsonStorage, Storage};

use crate::{validate_id, PostId, ReviewResult, ReviewYear, UserId};

/// Storage prefix for posts
const POSTS_PATH: &str = "posts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_id: PostId,
    pub author_id: UserId,
    #[serde(default)]
    pub coauthor_ids: Vec<UserId>,
    pub posted_at: DateTime<Utc>,
}

impl PostRecord {
    pub fn new(post_id: impl Into<PostId>, author_id: impl Into<UserId>, posted_at: DateTime<Utc>) -> Self {
        Self {
            post_id: post_id.into(),
            author_id: author_id.into(),
            coauthor_ids: Vec::new(),
            posted_at,
        }
    }

    pub fn with_coauthor(mut self, coauthor_id: impl Into<UserId>) -> Self {
        self.coauthor_ids.push(coauthor_id.into());
        self
    }

    /// Author or coauthor
    pub fn is_written_by(&self, user_id: &str) -> bool {
        self.author_id == user_id || self.coauthor_ids.iter().any(|c| c == user_id)
    }

    pub fn review_year(&self) -> ReviewYear {
        self.posted_at.year()
    }
}

#[async_trait]
pub trait PostCatalog: Send + Sync {
    async fn post(&self, post_id: &str) -> ReviewResult<Option<PostRecord>>;
}

/// Post catalogue persisted under `posts/<id>`
pub struct StoragePostCatalog {
    storage: Arc<dyn Storage>,
}

impl StoragePostCatalog {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn save_post(&self, post: &PostRecord) -> ReviewResult<()> {
        validate_id(&post.post_id)?;
        self.storage
            .put_json(&format!("{}/{}", POSTS_PATH, post.post_id), post)
            .await?;
        debug!(post_id = %post.post_id, author = %post.author_id, "saved post");
        Ok(())
    }
}

#[async_trait]
impl PostCatalog for StoragePostCatalog {
    async fn post(&self, post_id: &str) -> ReviewResult<Option<PostRecord>> {
        validate_id(post_id)?;
        Ok(self
            .storage
            .get_json_opt::<PostRecord>(&format!("{}/{}", POSTS_PATH, post_id))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use review_storage::MemoryStorage;

    #[test]
    fn test_authorship() {
        let post = PostRecord::new("p1", "alice", Utc::now()).with_coauthor("bob");
        assert!(post.is_written_by("alice"));
        assert!(post.is_written_by("bob"));
        assert!(!post.is_written_by("carol"));
    }

    #[tokio::test]
    async fn test_catalog_round_trip() {
        let catalog = StoragePostCatalog::new(Arc::new(MemoryStorage::new()));
        let posted = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let post = PostRecord::new("p1", "alice", posted);

        tokio_test::assert_ok!(catalog.save_post(&post).await);
        let loaded = catalog.post("p1").await.unwrap().unwrap();
        assert_eq!(loaded, post);
        assert_eq!(loaded.review_year(), 2024);
        assert!(catalog.post("missing").await.unwrap().is_none());
    }
}
