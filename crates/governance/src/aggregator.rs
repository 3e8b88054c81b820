//! Karma-tiered ranking of a review year
//!
//! Every quadratic vote counts towards its post's all-voter sum; votes by
//! high-karma users also count towards the high-karma sum. Posts that any
//! high-karma user voted on are ranked by the high-karma sum and placed
//! above posts ranked by the all-voter fallback.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use review_common::utils::Clock;
use review_karma::{Cohort, KarmaTiers, UserDirectory};

use crate::{
    config::ReviewConfig,
    cost_table::CostTable,
    nominations::{select_advancing, tally_nominations, NominationTally},
    repository::{distinct_voters, VoteRepository},
    PostId, QuadraticVote, ReviewError, ReviewResult, ReviewYear, UserId,
};

/// Primary sort key of a post.
///
/// Field order matters: the derived ordering puts every post with
/// high-karma votes above every post without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RankScore {
    pub has_high_karma_votes: bool,
    /// High-karma sum if `has_high_karma_votes`, otherwise the all-voter sum
    pub value: i64,
}

/// Ranking entry for one post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub post_id: PostId,
    pub review_year: ReviewYear,
    /// Display values cast by high-karma voters, highest first
    pub high_karma_votes: Vec<i32>,
    /// Every display value cast, highest first
    pub all_karma_votes: Vec<i32>,
    pub high_karma_sum: i64,
    pub all_karma_sum: i64,
    pub score: RankScore,
}

impl AggregateResult {
    fn new(post_id: PostId, review_year: ReviewYear) -> Self {
        Self {
            post_id,
            review_year,
            high_karma_votes: Vec::new(),
            all_karma_votes: Vec::new(),
            high_karma_sum: 0,
            all_karma_sum: 0,
            score: RankScore {
                has_high_karma_votes: false,
                value: 0,
            },
        }
    }

    fn finish(mut self) -> Self {
        self.high_karma_votes.sort_unstable_by(|a, b| b.cmp(a));
        self.all_karma_votes.sort_unstable_by(|a, b| b.cmp(a));
        self.high_karma_sum = self.high_karma_votes.iter().map(|v| i64::from(*v)).sum();
        self.all_karma_sum = self.all_karma_votes.iter().map(|v| i64::from(*v)).sum();
        let has_high_karma_votes = !self.high_karma_votes.is_empty();
        self.score = RankScore {
            has_high_karma_votes,
            value: if has_high_karma_votes {
                self.high_karma_sum
            } else {
                self.all_karma_sum
            },
        };
        self
    }
}

/// Descending by score, then all-voter sum; ascending by post id
fn rank_order(a: &AggregateResult, b: &AggregateResult) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.all_karma_sum.cmp(&a.all_karma_sum))
        .then_with(|| a.post_id.cmp(&b.post_id))
}

/// Rank a year's votes given each voter's cohort.
///
/// Voters missing from `cohorts` count as [`Cohort::AllUsers`]. Votes with
/// index 0 carry no opinion and are skipped.
pub fn rank_votes(
    review_year: ReviewYear,
    votes: &[QuadraticVote],
    cohorts: &HashMap<UserId, Cohort>,
    table: &CostTable,
) -> ReviewResult<Vec<AggregateResult>> {
    let mut posts: BTreeMap<&str, AggregateResult> = BTreeMap::new();

    for vote in votes.iter().filter(|v| v.vote_index != 0) {
        let value = vote.display_value(table)?;
        let entry = posts
            .entry(vote.post_id.as_str())
            .or_insert_with(|| AggregateResult::new(vote.post_id.clone(), review_year));

        entry.all_karma_votes.push(value);
        if cohorts.get(&vote.user_id) == Some(&Cohort::HighKarma) {
            entry.high_karma_votes.push(value);
        }
    }

    let mut ranking: Vec<_> = posts.into_values().map(AggregateResult::finish).collect();
    ranking.sort_by(rank_order);
    Ok(ranking)
}

struct CachedRanking {
    computed_at: Instant,
    ranking: Arc<Vec<AggregateResult>>,
}

/// Computes and caches review-year rankings
pub struct Aggregator {
    repository: Arc<dyn VoteRepository>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    cost_table: CostTable,
    tiers: KarmaTiers,
    min_positive_nominations: usize,
    cache_ttl: Duration,
    cache: RwLock<HashMap<ReviewYear, CachedRanking>>,
}

impl Aggregator {
    pub fn new(
        repository: Arc<dyn VoteRepository>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        config: &ReviewConfig,
    ) -> Self {
        Self {
            repository,
            users,
            clock,
            cost_table: config.cost_table.clone(),
            tiers: config.karma_tiers(),
            min_positive_nominations: config.min_positive_nominations,
            cache_ttl: Duration::from_secs(config.aggregate_cache_ttl_secs),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Ranking for `review_year`, served from cache while fresh.
    ///
    /// Either the full ranking is returned or
    /// [`ReviewError::AggregationUnavailable`]; never a partial list.
    pub async fn aggregate(&self, review_year: ReviewYear) -> ReviewResult<Arc<Vec<AggregateResult>>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&review_year) {
                if cached.computed_at.elapsed() < self.cache_ttl {
                    debug!(review_year, "serving cached ranking");
                    return Ok(cached.ranking.clone());
                }
            }
        }

        let ranking = Arc::new(self.compute(review_year).await?);
        self.cache.write().await.insert(
            review_year,
            CachedRanking {
                computed_at: Instant::now(),
                ranking: ranking.clone(),
            },
        );
        Ok(ranking)
    }

    /// Compute the ranking from the store, bypassing the cache
    pub async fn compute(&self, review_year: ReviewYear) -> ReviewResult<Vec<AggregateResult>> {
        let votes = self
            .repository
            .quadratic_votes_for_year(review_year)
            .await
            .map_err(|e| unavailable(review_year, e))?;

        let taken_at = self.clock.now();
        let voters = distinct_voters(&votes);
        let snapshots = try_join_all(voters.iter().map(|user_id| self.users.snapshot(user_id, taken_at)))
            .await
            .map_err(|e| unavailable(review_year, e.into()))?;

        let cohorts: HashMap<UserId, Cohort> = snapshots
            .into_iter()
            .map(|s| {
                let cohort = self.tiers.classify(&s);
                (s.user_id, cohort)
            })
            .collect();

        let ranking = rank_votes(review_year, &votes, &cohorts, &self.cost_table)
            .map_err(|e| unavailable(review_year, e))?;

        info!(
            review_year,
            votes = votes.len(),
            voters = voters.len(),
            posts = ranking.len(),
            "computed review ranking"
        );
        Ok(ranking)
    }

    /// Drop the cached ranking for `review_year`
    pub async fn invalidate(&self, review_year: ReviewYear) {
        self.cache.write().await.remove(&review_year);
    }

    /// Nomination counts per post for `review_year`, sorted by post id
    pub async fn nomination_tally(&self, review_year: ReviewYear) -> ReviewResult<Vec<NominationTally>> {
        let nominations = self
            .repository
            .nominations_for_year(review_year)
            .await
            .map_err(|e| unavailable(review_year, e))?;
        Ok(tally_nominations(&nominations))
    }

    /// Posts with enough positive nominations to be reviewed
    pub async fn advancing_posts(&self, review_year: ReviewYear) -> ReviewResult<Vec<NominationTally>> {
        let tallies = self.nomination_tally(review_year).await?;
        Ok(select_advancing(tallies, self.min_positive_nominations))
    }
}

fn unavailable(review_year: ReviewYear, err: ReviewError) -> ReviewError {
    error!(review_year, error = %err, "ranking could not be computed");
    ReviewError::AggregationUnavailable(err.to_string())
}
