//! Quadratic vote cost table
//!
//! The table is hand-curated rather than derived from a formula: changing a
//! cost changes the incentives of every voter, so each value is written out
//! and tested explicitly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ReviewError, ReviewResult, VoteIndex};

/// One row of the cost table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEntry {
    pub index: VoteIndex,
    /// Budget points spent by a vote at this strength
    pub cost: u32,
    /// Signed strength shown to voters and summed into rankings
    pub display_value: i32,
}

impl CostEntry {
    pub const fn new(index: VoteIndex, cost: u32, display_value: i32) -> Self {
        Self {
            index,
            cost,
            display_value,
        }
    }
}

/// Default table: strengths -4..=4, cost = strength squared
pub const QUADRATIC_COST_TABLE: [CostEntry; 9] = [
    CostEntry::new(-4, 16, -4),
    CostEntry::new(-3, 9, -3),
    CostEntry::new(-2, 4, -2),
    CostEntry::new(-1, 1, -1),
    CostEntry::new(0, 0, 0),
    CostEntry::new(1, 1, 1),
    CostEntry::new(2, 4, 2),
    CostEntry::new(3, 9, 3),
    CostEntry::new(4, 16, 4),
];

/// Mapping from vote index to cost and display value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CostEntry>", into = "Vec<CostEntry>")]
pub struct CostTable {
    entries: BTreeMap<VoteIndex, CostEntry>,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            entries: QUADRATIC_COST_TABLE.iter().map(|e| (e.index, *e)).collect(),
        }
    }
}

impl CostTable {
    /// Build a table, checking that
    /// - index 0 exists with cost 0 and display value 0,
    /// - no index appears twice,
    /// - display values carry the sign of their index,
    /// - cost never decreases as |index| grows on either side of 0.
    pub fn new(entries: Vec<CostEntry>) -> ReviewResult<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            if map.insert(entry.index, entry).is_some() {
                return Err(ReviewError::Configuration(format!(
                    "cost table lists index {} twice",
                    entry.index
                )));
            }
        }

        match map.get(&0) {
            Some(zero) if zero.cost == 0 && zero.display_value == 0 => {}
            _ => {
                return Err(ReviewError::Configuration(
                    "cost table must map index 0 to cost 0 and display value 0".to_string(),
                ))
            }
        }

        for entry in map.values() {
            if entry.display_value.signum() != entry.index.signum() {
                return Err(ReviewError::Configuration(format!(
                    "display value {} for index {} has the wrong sign",
                    entry.display_value, entry.index
                )));
            }
        }

        let positive: Vec<u32> = map.range(0..).map(|(_, e)| e.cost).collect();
        let negative: Vec<u32> = map.range(..=0).rev().map(|(_, e)| e.cost).collect();
        for side in [positive, negative] {
            if side.windows(2).any(|w| w[1] < w[0]) {
                return Err(ReviewError::Configuration(
                    "cost must not decrease as vote strength grows".to_string(),
                ));
            }
        }

        Ok(Self { entries: map })
    }

    /// Row for an index
    pub fn entry(&self, index: VoteIndex) -> ReviewResult<&CostEntry> {
        self.entries
            .get(&index)
            .ok_or(ReviewError::InvalidVoteIndex(index))
    }

    /// Budget cost of a vote at `index`
    pub fn cost(&self, index: VoteIndex) -> ReviewResult<u32> {
        self.entry(index).map(|e| e.cost)
    }

    /// Display value of a vote at `index`
    pub fn display_value(&self, index: VoteIndex) -> ReviewResult<i32> {
        self.entry(index).map(|e| e.display_value)
    }

    pub fn contains(&self, index: VoteIndex) -> bool {
        self.entries.contains_key(&index)
    }

    /// All indices, ascending
    pub fn indices(&self) -> impl Iterator<Item = VoteIndex> + '_ {
        self.entries.keys().copied()
    }

    /// The strongest positive index whose cost fits in `allowance`, or 0
    pub fn strongest_affordable(&self, allowance: u32) -> VoteIndex {
        self.entries
            .range(1..)
            .filter(|(_, e)| e.cost <= allowance)
            .map(|(i, _)| *i)
            .last()
            .unwrap_or(0)
    }

    /// The strongest index in the table no stronger than `index`, on the
    /// same side of 0
    pub fn nearest_index(&self, index: VoteIndex) -> VoteIndex {
        let found = if index >= 0 {
            self.entries.range(..=index).next_back()
        } else {
            self.entries.range(index..).next()
        };
        found.map(|(i, _)| *i).unwrap_or(0)
    }

    /// SHA-256 over the canonical JSON form of the table, hex encoded
    pub fn fingerprint(&self) -> String {
        let rows: Vec<CostEntry> = self.entries.values().copied().collect();
        // Serializing plain integer rows cannot fail.
        let bytes = serde_json::to_vec(&rows).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

impl TryFrom<Vec<CostEntry>> for CostTable {
    type Error = ReviewError;

    fn try_from(entries: Vec<CostEntry>) -> Result<Self, Self::Error> {
        CostTable::new(entries)
    }
}

impl From<CostTable> for Vec<CostEntry> {
    fn from(table: CostTable) -> Self {
        table.entries.into_values().collect()
    }
}
