//! Review phases
//!
//! The phase of a review year is never stored. It is computed on demand
//! from the configured schedule and the current instant, so the phase shown
//! to users and the phase enforced on writes cannot drift apart.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ReviewError, ReviewResult, ReviewYear};

/// Phase of a review year. Transitions only move forward in time:
/// `NotStarted -> Nominations -> Reviews -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewPhase {
    NotStarted,
    Nominations,
    Reviews,
    Closed,
}

impl ReviewPhase {
    pub fn can_nominate(self) -> bool {
        can_nominate(self)
    }

    pub fn can_vote(self) -> bool {
        can_vote(self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReviewPhase::NotStarted => "NOT_STARTED",
            ReviewPhase::Nominations => "NOMINATIONS",
            ReviewPhase::Reviews => "REVIEWS",
            ReviewPhase::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ReviewPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nominations are only accepted during the nomination phase
pub fn can_nominate(phase: ReviewPhase) -> bool {
    phase == ReviewPhase::Nominations
}

/// Quadratic votes are only accepted during the review phase
pub fn can_vote(phase: ReviewPhase) -> bool {
    phase == ReviewPhase::Reviews
}

/// Phase boundaries for one review year.
///
/// Each boundary belongs to the phase it opens: at exactly
/// `nominations_end` the review phase is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSchedule {
    pub review_year: ReviewYear,
    pub nominations_start: DateTime<Utc>,
    pub nominations_end: DateTime<Utc>,
    pub reviews_end: DateTime<Utc>,
}

impl ReviewSchedule {
    pub fn validate(&self) -> ReviewResult<()> {
        if self.nominations_start >= self.nominations_end {
            return Err(ReviewError::Configuration(format!(
                "{} review: nominations must start before they end",
                self.review_year
            )));
        }
        if self.nominations_end > self.reviews_end {
            return Err(ReviewError::Configuration(format!(
                "{} review: reviews cannot end before nominations",
                self.review_year
            )));
        }
        Ok(())
    }

    pub fn phase_at(&self, now: DateTime<Utc>) -> ReviewPhase {
        if now < self.nominations_start {
            ReviewPhase::NotStarted
        } else if now < self.nominations_end {
            ReviewPhase::Nominations
        } else if now < self.reviews_end {
            ReviewPhase::Reviews
        } else {
            ReviewPhase::Closed
        }
    }

    /// When the phase active at `now` ends; `None` once closed
    pub fn phase_ends_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.phase_at(now) {
            ReviewPhase::NotStarted => Some(self.nominations_start),
            ReviewPhase::Nominations => Some(self.nominations_end),
            ReviewPhase::Reviews => Some(self.reviews_end),
            ReviewPhase::Closed => None,
        }
    }
}

/// Computes the phase of any configured review year
#[derive(Debug, Clone, Default)]
pub struct PhaseClock {
    schedules: BTreeMap<ReviewYear, ReviewSchedule>,
}

impl PhaseClock {
    pub fn new(schedules: impl IntoIterator<Item = ReviewSchedule>) -> ReviewResult<Self> {
        let mut map = BTreeMap::new();
        for schedule in schedules {
            schedule.validate()?;
            let year = schedule.review_year;
            if map.insert(year, schedule).is_some() {
                return Err(ReviewError::Configuration(format!(
                    "review year {} is scheduled twice",
                    year
                )));
            }
        }
        Ok(Self { schedules: map })
    }

    pub fn schedule(&self, review_year: ReviewYear) -> Option<&ReviewSchedule> {
        self.schedules.get(&review_year)
    }

    /// Phase of `review_year` at `now`; `None` if the year is not scheduled
    pub fn current_phase(&self, review_year: ReviewYear, now: DateTime<Utc>) -> Option<ReviewPhase> {
        self.schedule(review_year).map(|s| s.phase_at(now))
    }

    pub fn phase_ends_at(&self, review_year: ReviewYear, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule(review_year).and_then(|s| s.phase_ends_at(now))
    }

    /// Succeeds only if `allowed` accepts the current phase; the error names
    /// the action and the phase that blocked it
    pub fn require(
        &self,
        review_year: ReviewYear,
        now: DateTime<Utc>,
        action: &str,
        allowed: fn(ReviewPhase) -> bool,
    ) -> ReviewResult<ReviewPhase> {
        match self.current_phase(review_year, now) {
            Some(phase) if allowed(phase) => Ok(phase),
            Some(phase) => Err(ReviewError::Phase {
                review_year,
                action: action.to_string(),
                phase: phase.to_string(),
            }),
            None => Err(ReviewError::Phase {
                review_year,
                action: action.to_string(),
                phase: "UNSCHEDULED".to_string(),
            }),
        }
    }
}
