use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use annual_review::{CliConfig, ReviewEngine};
use review_common::{
    config::ensure_directory,
    logging::{init_console_logging, init_logging},
    utils::{Clock, SystemClock},
};
use review_governance::{PostRecord, ReviewYear};
use review_karma::UserProfile;
use review_storage::FileStorage;

#[derive(Parser)]
#[command(author, version, about = "Annual Review ranking engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user profiles
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage the post catalogue
    Post {
        #[command(subcommand)]
        command: PostCommands,
    },
    /// Show the current phase of a review year
    Phase {
        review_year: ReviewYear,
    },
    /// Nominate a post (score 0 withdraws)
    Nominate {
        user_id: String,
        post_id: String,
        review_year: ReviewYear,
        score: i32,
    },
    /// Cast a quadratic vote (index 0 withdraws)
    Vote {
        user_id: String,
        post_id: String,
        review_year: ReviewYear,
        #[arg(allow_negative_numbers = true)]
        vote_index: i32,
    },
    /// Show a user's budget spending
    Budget {
        user_id: String,
        review_year: ReviewYear,
    },
    /// Show nomination counts
    Nominations {
        review_year: ReviewYear,
        /// Only posts that advance to the review phase
        #[arg(long)]
        advancing: bool,
    },
    /// Show the karma-tiered ranking
    Ranking {
        review_year: ReviewYear,
    },
    /// Replace a user's quadratic votes with ones seeded from their nominations
    Seed {
        user_id: String,
        review_year: ReviewYear,
    },
    /// Shift a user's votes toward zero when their average strength exceeds ±1
    Renormalize {
        user_id: String,
        review_year: ReviewYear,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register or update a user
    Add {
        user_id: String,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        karma: i64,
        /// Registration time (RFC 3339); defaults to now
        #[arg(long)]
        joined: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand)]
enum PostCommands {
    /// Register or update a post
    Add {
        post_id: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        coauthor: Vec<String>,
        /// Publication time (RFC 3339)
        #[arg(long)]
        posted: DateTime<Utc>,
    },
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::from_env().context("loading CLI configuration")?;

    match &config.log_dir {
        Some(dir) => {
            ensure_directory(dir)?;
            init_logging(dir, "review", &config.log_level)?;
        }
        None => init_console_logging(&config.log_level)?,
    }

    let review_config = config
        .load_review_config()
        .context("loading review settings")?;
    ensure_directory(&config.data_dir)?;
    let storage = Arc::new(FileStorage::new(config.data_dir.clone())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = ReviewEngine::new(storage, review_config, clock.clone())?;

    debug!(data_dir = %config.data_dir.display(), "opened review store");

    match cli.command {
        Commands::User { command } => match command {
            UserCommands::Add { user_id, karma, joined } => {
                let profile = UserProfile::new(user_id, karma, joined.unwrap_or_else(|| clock.now()));
                engine.users.save_profile(&profile).await?;
                emit(&profile)?;
            }
        },
        Commands::Post { command } => match command {
            PostCommands::Add {
                post_id,
                author,
                coauthor,
                posted,
            } => {
                let post = coauthor
                    .into_iter()
                    .fold(PostRecord::new(post_id, author, posted), PostRecord::with_coauthor);
                engine.posts.save_post(&post).await?;
                emit(&post)?;
            }
        },
        Commands::Phase { review_year } => {
            let now = clock.now();
            let phases = engine.votes.phases();
            emit(&json!({
                "review_year": review_year,
                "phase": phases.current_phase(review_year, now),
                "ends_at": phases.phase_ends_at(review_year, now),
            }))?;
        }
        Commands::Nominate {
            user_id,
            post_id,
            review_year,
            score,
        } => {
            engine
                .votes
                .upsert_nomination(&user_id, &post_id, review_year, score)
                .await?;
            emit(&engine.votes.get_nominations_for_user(&user_id, review_year).await?)?;
        }
        Commands::Vote {
            user_id,
            post_id,
            review_year,
            vote_index,
        } => {
            engine
                .votes
                .upsert_quadratic_vote(&user_id, &post_id, review_year, vote_index)
                .await?;
            emit(&engine.votes.budget_summary(&user_id, review_year).await?)?;
        }
        Commands::Budget { user_id, review_year } => {
            emit(&json!({
                "summary": engine.votes.budget_summary(&user_id, review_year).await?,
                "votes": engine.votes.get_votes_for_user(&user_id, review_year).await?,
            }))?;
        }
        Commands::Nominations {
            review_year,
            advancing,
        } => {
            let tallies = if advancing {
                engine.aggregator.advancing_posts(review_year).await?
            } else {
                engine.aggregator.nomination_tally(review_year).await?
            };
            emit(&tallies)?;
        }
        Commands::Ranking { review_year } => {
            emit(engine.aggregator.aggregate(review_year).await?.as_ref())?;
        }
        Commands::Seed { user_id, review_year } => {
            let applied = engine
                .votes
                .convert_nominations_to_votes(&user_id, review_year)
                .await?;
            emit(&applied)?;
        }
        Commands::Renormalize { user_id, review_year } => {
            let changed = engine.votes.renormalize_votes(&user_id, review_year).await?;
            emit(&json!({
                "changed": changed,
                "summary": engine.votes.budget_summary(&user_id, review_year).await?,
            }))?;
        }
    }

    Ok(())
}
