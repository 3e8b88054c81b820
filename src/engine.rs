//! Wiring of the review components over one document store

use std::sync::Arc;

use tracing::info;

use review_common::utils::Clock;
use review_governance::{
    Aggregator, ReviewConfig, ReviewResult, ReviewVoteStore, StandardEligibility,
    StoragePostCatalog, StorageVoteRepository, VoteRepository,
};
use review_karma::StorageUserDirectory;
use review_storage::Storage;

/// All review components sharing one store, one clock and one configuration
pub struct ReviewEngine {
    pub config: ReviewConfig,
    pub users: Arc<StorageUserDirectory>,
    pub posts: Arc<StoragePostCatalog>,
    pub votes: ReviewVoteStore,
    pub aggregator: Aggregator,
}

impl ReviewEngine {
    pub fn new(storage: Arc<dyn Storage>, config: ReviewConfig, clock: Arc<dyn Clock>) -> ReviewResult<Self> {
        config.check()?;

        let users = Arc::new(StorageUserDirectory::new(storage.clone()));
        let posts = Arc::new(StoragePostCatalog::new(storage.clone()));
        let repository: Arc<dyn VoteRepository> = Arc::new(StorageVoteRepository::new(storage));

        let eligibility = Arc::new(StandardEligibility::new(
            users.clone(),
            posts.clone(),
            config.min_nomination_karma,
        ));
        let votes = ReviewVoteStore::new(repository.clone(), eligibility, clock.clone(), &config)?;
        let aggregator = Aggregator::new(repository, users.clone(), clock, &config);

        info!(
            budget = config.budget,
            high_karma_threshold = config.high_karma_threshold,
            review_years = config.schedules.len(),
            "review engine ready"
        );

        Ok(Self {
            config,
            users,
            posts,
            votes,
            aggregator,
        })
    }
}
