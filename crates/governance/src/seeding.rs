//! Seeding quadratic votes from nominations
//!
//! When the review phase opens, a user can start from their nomination
//! scores instead of an empty ballot. Scores are mapped to weights, the
//! weights are scaled to fill (but never exceed) the budget, and each post
//! gets the strongest vote whose cost fits its share.
//!
//! The weights grow steeply: a score of 1 ("a good post") earns nothing on
//! its own, while a 4 outweighs fifteen 2s.

use std::collections::BTreeMap;

use crate::{cost_table::CostTable, NominationVote, PostId, VoteIndex};

/// Upper bound on how far weights are scaled up to fill the budget
pub const MAX_SCALING: f64 = 6.0;

/// Budget weight of each nomination score, starting at score 1
const SCORE_WEIGHTS: [f64; 4] = [0.0, 1.0, 4.0, 15.0];

/// Budget weight of a nomination score; scores above the top of the scale
/// weigh as the top score
fn score_weight(score: i32) -> f64 {
    match usize::try_from(score) {
        Ok(0) | Err(_) => 0.0,
        Ok(s) => SCORE_WEIGHTS[s.min(SCORE_WEIGHTS.len()) - 1],
    }
}

/// Proposed vote index per post, sorted by post id.
///
/// Every live nomination appears in the result, possibly with index 0 when
/// its share is too small to buy any vote. The summed cost of the proposal
/// is at most `budget`.
pub fn seed_from_nominations(
    nominations: &[NominationVote],
    table: &CostTable,
    budget: u32,
) -> Vec<(PostId, VoteIndex)> {
    let live: BTreeMap<&str, i32> = nominations
        .iter()
        .filter(|n| n.is_live())
        .map(|n| (n.post_id.as_str(), n.score))
        .collect();

    let total_weight: f64 = live.values().map(|s| score_weight(*s)).sum();
    if total_weight == 0.0 {
        return live.keys().map(|p| (p.to_string(), 0)).collect();
    }

    let scaling = (f64::from(budget) / total_weight).min(MAX_SCALING);

    live.into_iter()
        .map(|(post_id, score)| {
            let share = (score_weight(score) * scaling).floor() as u32;
            (post_id.to_string(), table.strongest_affordable(share))
        })
        .collect()
}
