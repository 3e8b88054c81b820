//! Review engine configuration
//!
//! All values here are owned by whoever runs the review; the engine only
//! reads them. They are loaded from TOML through [`Configuration`].

use serde::{Deserialize, Serialize};

use review_common::config::Configuration;
use review_karma::KarmaTiers;

use crate::{
    cost_table::CostTable,
    phase::{PhaseClock, ReviewSchedule},
    ReviewError, ReviewResult,
};

/// Configuration for the review engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Total cost one user may spend on quadratic votes per review year
    #[serde(default = "default_budget")]
    pub budget: u32,
    /// Voters at or above this karma form the high-karma cohort
    #[serde(default = "default_high_karma_threshold")]
    pub high_karma_threshold: i64,
    /// Highest qualitative nomination score; 0 withdraws a nomination
    #[serde(default = "default_max_nomination_score")]
    pub max_nomination_score: i32,
    /// Karma required to nominate
    #[serde(default)]
    pub min_nomination_karma: i64,
    /// Positive nominations a post needs to advance to the review phase
    #[serde(default = "default_min_positive_nominations")]
    pub min_positive_nominations: usize,
    /// How long a computed ranking may be served from cache
    #[serde(default = "default_aggregate_cache_ttl_secs")]
    pub aggregate_cache_ttl_secs: u64,
    #[serde(default)]
    pub cost_table: CostTable,
    #[serde(default)]
    pub schedules: Vec<ReviewSchedule>,
}

fn default_budget() -> u32 {
    500
}

fn default_high_karma_threshold() -> i64 {
    1000
}

fn default_max_nomination_score() -> i32 {
    4
}

fn default_min_positive_nominations() -> usize {
    1
}

fn default_aggregate_cache_ttl_secs() -> u64 {
    30
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            high_karma_threshold: default_high_karma_threshold(),
            max_nomination_score: default_max_nomination_score(),
            min_nomination_karma: 0,
            min_positive_nominations: default_min_positive_nominations(),
            aggregate_cache_ttl_secs: default_aggregate_cache_ttl_secs(),
            cost_table: CostTable::default(),
            schedules: Vec::new(),
        }
    }
}

impl ReviewConfig {
    /// Check the settings that serde cannot
    pub fn check(&self) -> ReviewResult<()> {
        if self.budget == 0 {
            return Err(ReviewError::Configuration("budget must be positive".to_string()));
        }
        if self.max_nomination_score < 1 {
            return Err(ReviewError::Configuration(
                "max_nomination_score must be at least 1".to_string(),
            ));
        }
        self.phase_clock().map(|_| ())
    }

    pub fn phase_clock(&self) -> ReviewResult<PhaseClock> {
        PhaseClock::new(self.schedules.iter().cloned())
    }

    pub fn karma_tiers(&self) -> KarmaTiers {
        KarmaTiers::new(self.high_karma_threshold)
    }

    pub fn with_schedule(mut self, schedule: ReviewSchedule) -> Self {
        self.schedules.push(schedule);
        self
    }
}

impl Configuration for ReviewConfig {
    fn validate(&self) -> review_common::Result<()> {
        self.check().map_err(Into::into)
    }
}
