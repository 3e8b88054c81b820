//! Nomination counts per post
//!
//! Only posts with enough positive nominations advance to the review phase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{NominationVote, PostId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominationTally {
    pub post_id: PostId,
    /// Live nominations, whatever their score
    pub nomination_count: usize,
    /// Nominations with a score above zero
    pub positive_count: usize,
    pub score_sum: i64,
}

/// Tally live nominations per post, sorted by post id.
/// Soft-deleted records are ignored.
pub fn tally_nominations(nominations: &[NominationVote]) -> Vec<NominationTally> {
    let mut tallies: BTreeMap<&str, NominationTally> = BTreeMap::new();

    for nomination in nominations.iter().filter(|n| n.is_live()) {
        let tally = tallies
            .entry(nomination.post_id.as_str())
            .or_insert_with(|| NominationTally {
                post_id: nomination.post_id.clone(),
                nomination_count: 0,
                positive_count: 0,
                score_sum: 0,
            });
        tally.nomination_count += 1;
        if nomination.is_positive() {
            tally.positive_count += 1;
        }
        tally.score_sum += i64::from(nomination.score);
    }

    tallies.into_values().collect()
}

/// Posts with at least `min_positive` positive nominations, most nominated
/// first, ties by post id
pub fn select_advancing(tallies: Vec<NominationTally>, min_positive: usize) -> Vec<NominationTally> {
    let mut advancing: Vec<_> = tallies
        .into_iter()
        .filter(|t| t.positive_count > 0 && t.positive_count >= min_positive)
        .collect();
    advancing.sort_by(|a, b| {
        b.positive_count
            .cmp(&a.positive_count)
            .then_with(|| a.post_id.cmp(&b.post_id))
    });
    advancing
}
