use annual_review::ReviewEngine;
use review_common::utils::FixedClock;
use review_governance::{
    PostRecord, RankScore, ReviewConfig, ReviewError, ReviewPhase, ReviewSchedule,
};
use review_karma::UserProfile;
use review_storage::{FileStorage, MemoryStorage, Storage};

use chrono::{DateTime, TimeZone, Utc};
use std::error::Error;
use std::sync::Arc;
use tempfile::tempdir;

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn schedule_2024() -> ReviewSchedule {
    ReviewSchedule {
        review_year: 2024,
        nominations_start: at(2024, 12, 1),
        nominations_end: at(2024, 12, 15),
        reviews_end: at(2025, 1, 15),
    }
}

fn nominations_time() -> DateTime<Utc> {
    at(2024, 12, 5)
}

fn reviews_time() -> DateTime<Utc> {
    at(2024, 12, 20)
}

// Build an engine over `storage` with a population of users and posts
async fn setup_engine(
    storage: Arc<dyn Storage>,
    budget: u32,
    now: DateTime<Utc>,
) -> Result<(ReviewEngine, Arc<FixedClock>), Box<dyn Error>> {
    let config = ReviewConfig {
        budget,
        aggregate_cache_ttl_secs: 0,
        ..ReviewConfig::default()
    }
    .with_schedule(schedule_2024());

    let clock = Arc::new(FixedClock::new(now));
    let engine = ReviewEngine::new(storage, config, clock.clone())?;

    let joined = at(2019, 6, 1);
    for (user, karma) in [("h1", 2500), ("h2", 1200), ("l1", 40), ("l2", 300), ("writer", 5000)] {
        engine.users.save_profile(&UserProfile::new(user, karma, joined)).await?;
    }
    for post in ["P", "Q", "X", "Y", "Z"] {
        engine
            .posts
            .save_post(&PostRecord::new(post, "writer", at(2024, 3, 1)))
            .await?;
    }

    Ok((engine, clock))
}

#[tokio::test]
async fn test_budget_scenarios() -> Result<(), Box<dyn Error>> {
    let (engine, _clock) = setup_engine(Arc::new(MemoryStorage::new()), 10, reviews_time()).await?;

    // Cost 4 on X leaves 6; cost 9 on Y does not fit
    engine.votes.upsert_quadratic_vote("l1", "X", 2024, 2).await?;
    let err = engine.votes.upsert_quadratic_vote("l1", "Y", 2024, 3).await.unwrap_err();
    assert_eq!(
        err,
        ReviewError::BudgetExceeded {
            current_total_cost: 4,
            attempted_cost: 9,
            budget: 10,
        }
    );
    let votes = engine.votes.get_votes_for_user("l1", 2024).await?;
    assert_eq!(votes.len(), 1);
    assert_eq!((votes[0].post_id.as_str(), votes[0].vote_index), ("X", 2));

    // Lowering X to cost 1 frees enough for Y
    engine.votes.upsert_quadratic_vote("l1", "X", 2024, 1).await?;
    engine.votes.upsert_quadratic_vote("l1", "Y", 2024, 3).await?;

    let summary = engine.votes.budget_summary("l1", 2024).await?;
    assert_eq!(summary.spent, 10);
    assert_eq!(summary.remaining, 0);

    // Withdrawal succeeds even with the budget exhausted
    engine.votes.upsert_quadratic_vote("l1", "Z", 2024, 0).await?;
    engine.votes.upsert_quadratic_vote("l1", "Y", 2024, 0).await?;
    assert_eq!(engine.votes.budget_summary("l1", 2024).await?.spent, 1);

    Ok(())
}

#[tokio::test]
async fn test_high_karma_ranking_scenario() -> Result<(), Box<dyn Error>> {
    let (engine, _clock) = setup_engine(Arc::new(MemoryStorage::new()), 500, reviews_time()).await?;

    engine.votes.upsert_quadratic_vote("h1", "P", 2024, 3).await?;
    engine.votes.upsert_quadratic_vote("h2", "P", 2024, 2).await?;
    engine.votes.upsert_quadratic_vote("l1", "P", 2024, 1).await?;
    engine.votes.upsert_quadratic_vote("l2", "P", 2024, -1).await?;
    engine.votes.upsert_quadratic_vote("l1", "Q", 2024, 4).await?;
    engine.votes.upsert_quadratic_vote("l2", "Q", 2024, 4).await?;

    let ranking = engine.aggregator.aggregate(2024).await?;
    let ids: Vec<_> = ranking.iter().map(|r| r.post_id.as_str()).collect();

    // P's high-karma sum of 5 outranks Q's all-voter fallback of 8
    assert_eq!(ids, vec!["P", "Q"]);
    assert_eq!(ranking[0].high_karma_votes, vec![3, 2]);
    assert_eq!(ranking[0].all_karma_votes, vec![3, 2, 1, -1]);
    assert_eq!(ranking[0].all_karma_sum, 5);
    assert_eq!(ranking[1].high_karma_votes, Vec::<i32>::new());
    assert_eq!(ranking[1].score, RankScore { has_high_karma_votes: false, value: 8 });

    // Nothing written in between: identical ranking
    let again = engine.aggregator.aggregate(2024).await?;
    assert_eq!(ranking, again);

    Ok(())
}

#[tokio::test]
async fn test_phase_enforcement() -> Result<(), Box<dyn Error>> {
    let (engine, clock) = setup_engine(Arc::new(MemoryStorage::new()), 500, nominations_time()).await?;

    assert_eq!(engine.votes.current_phase(2024), Some(ReviewPhase::Nominations));
    engine.votes.upsert_nomination("l1", "P", 2024, 3).await?;

    clock.set(reviews_time());
    let err = engine.votes.upsert_nomination("l2", "P", 2024, 1).await.unwrap_err();
    assert!(matches!(err, ReviewError::Phase { .. }));
    assert!(err.is_user_facing());

    clock.set(at(2025, 1, 15));
    assert_eq!(engine.votes.current_phase(2024), Some(ReviewPhase::Closed));
    let err = engine.votes.upsert_quadratic_vote("l1", "P", 2024, 1).await.unwrap_err();
    assert!(matches!(err, ReviewError::Phase { .. }));

    Ok(())
}

#[tokio::test]
async fn test_authors_cannot_vote_on_their_posts() -> Result<(), Box<dyn Error>> {
    let (engine, clock) = setup_engine(Arc::new(MemoryStorage::new()), 500, nominations_time()).await?;

    let err = engine.votes.upsert_nomination("writer", "P", 2024, 2).await.unwrap_err();
    assert!(matches!(err, ReviewError::NotEligible(_)));

    clock.set(reviews_time());
    let err = engine.votes.upsert_quadratic_vote("writer", "P", 2024, 1).await.unwrap_err();
    assert!(matches!(err, ReviewError::NotEligible(_)));
    assert!(engine.votes.get_votes_for_post("P", 2024).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_nominations_seed_votes() -> Result<(), Box<dyn Error>> {
    let (engine, clock) = setup_engine(Arc::new(MemoryStorage::new()), 500, nominations_time()).await?;

    engine.votes.upsert_nomination("l1", "P", 2024, 4).await?;
    engine.votes.upsert_nomination("l1", "Q", 2024, 1).await?;
    engine.votes.upsert_nomination("l2", "P", 2024, 1).await?;
    engine.votes.upsert_nomination("l2", "X", 2024, 2).await?;
    engine.votes.upsert_nomination("l2", "X", 2024, 0).await?;

    let tally = engine.aggregator.nomination_tally(2024).await?;
    let counts: Vec<_> = tally.iter().map(|t| (t.post_id.as_str(), t.positive_count)).collect();
    assert_eq!(counts, vec![("P", 2), ("Q", 1)]);

    let advancing = engine.aggregator.advancing_posts(2024).await?;
    assert_eq!(advancing[0].post_id, "P");

    clock.set(reviews_time());
    let applied = engine.votes.convert_nominations_to_votes("l1", 2024).await?;
    // Q's score of 1 carries no weight; P's 4 takes the strongest vote
    assert_eq!(applied, vec![("P".to_string(), 4), ("Q".to_string(), 0)]);
    assert_eq!(engine.votes.budget_summary("l1", 2024).await?.spent, 16);

    Ok(())
}

#[tokio::test]
async fn test_file_storage_survives_restart() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;

    {
        let storage = Arc::new(FileStorage::new(dir.path().to_path_buf())?);
        let (engine, _clock) = setup_engine(storage, 500, reviews_time()).await?;
        engine.votes.upsert_quadratic_vote("h1", "P", 2024, 4).await?;
        engine.votes.upsert_quadratic_vote("h1", "Q", 2024, -2).await?;
    }

    let storage = Arc::new(FileStorage::new(dir.path().to_path_buf())?);
    let (engine, _clock) = setup_engine(storage, 500, reviews_time()).await?;

    let votes = engine.votes.get_votes_for_user("h1", 2024).await?;
    let indices: Vec<_> = votes.iter().map(|v| (v.post_id.as_str(), v.vote_index)).collect();
    assert_eq!(indices, vec![("P", 4), ("Q", -2)]);
    assert_eq!(engine.votes.budget_summary("h1", 2024).await?.spent, 20);

    Ok(())
}

#[tokio::test]
async fn test_file_storage_charges_every_post_id() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let storage = Arc::new(FileStorage::new(dir.path().to_path_buf())?);
    let (engine, _clock) = setup_engine(storage, 20, reviews_time()).await?;
    for post in ["p0.tmp-write", "p1.tmp-write"] {
        engine
            .posts
            .save_post(&PostRecord::new(post, "writer", at(2024, 3, 1)))
            .await?;
    }

    engine.votes.upsert_quadratic_vote("l1", "p0.tmp-write", 2024, 4).await?;
    let err = engine
        .votes
        .upsert_quadratic_vote("l1", "p1.tmp-write", 2024, 4)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ReviewError::BudgetExceeded {
            current_total_cost: 16,
            attempted_cost: 16,
            budget: 20,
        }
    );
    assert_eq!(engine.votes.budget_summary("l1", 2024).await?.spent, 16);
    assert_eq!(engine.votes.get_votes_for_post("p0.tmp-write", 2024).await?.len(), 1);

    // Ids that would collide with storage bookkeeping are refused outright
    let err = engine
        .votes
        .upsert_quadratic_vote("l1", ".staging", 2024, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::InvalidIdentifier(_)));

    Ok(())
}

#[tokio::test]
async fn test_renormalize_balances_votes() -> Result<(), Box<dyn Error>> {
    let (engine, _clock) = setup_engine(Arc::new(MemoryStorage::new()), 500, reviews_time()).await?;
    for (post, index) in [("P", 4), ("Q", 3), ("X", 3), ("Y", -2)] {
        engine.votes.upsert_quadratic_vote("h1", post, 2024, index).await?;
    }
    assert!(engine.votes.budget_summary("h1", 2024).await?.unbalanced);

    let changed = engine.votes.renormalize_votes("h1", 2024).await?;
    assert_eq!(
        changed,
        vec![
            ("P".to_string(), 2),
            ("Q".to_string(), 1),
            ("X".to_string(), 1),
            ("Y".to_string(), -4),
        ]
    );
    let summary = engine.votes.budget_summary("h1", 2024).await?;
    assert!(!summary.unbalanced);
    assert_eq!(summary.spent, 22);

    Ok(())
}

#[tokio::test]
async fn test_outage_yields_no_partial_ranking() -> Result<(), Box<dyn Error>> {
    let storage = Arc::new(MemoryStorage::new());
    let (engine, _clock) = setup_engine(storage.clone(), 500, reviews_time()).await?;
    engine.votes.upsert_quadratic_vote("l1", "P", 2024, 1).await?;

    storage.set_unavailable(true);
    let err = engine.aggregator.aggregate(2024).await.unwrap_err();
    assert!(matches!(err, ReviewError::AggregationUnavailable(_)));

    storage.set_unavailable(false);
    assert_eq!(engine.aggregator.aggregate(2024).await?.len(), 1);

    Ok(())
}
