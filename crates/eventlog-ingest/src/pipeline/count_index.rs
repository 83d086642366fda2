//! Per-event-type arrival counts over time.
//!
//! Every event type owns a counter and an ordered set. An arrival takes the
//! next id from the counter and inserts `(score, id)` into the set, where the
//! score is the receipt time in seconds. Totals are the set's cardinality;
//! range counts walk the set between two scores.
//!
//! The index is best-effort: it may undercount after a partial failure and
//! must never hold up the append log. See [`crate::Ingestor`] for how failures
//! are isolated.

use eventlog_core::Result;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Inclusive score bounds; `None` is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreRange {
    /// Lowest score counted.
    pub min: Option<i64>,
    /// Highest score counted.
    pub max: Option<i64>,
}

impl ScoreRange {
    /// Unbounded on both sides.
    pub const ALL: Self = Self {
        min: None,
        max: None,
    };

    /// Build a range from the `0 = unbounded` convention used by queries.
    pub fn from_sentinels(start: i64, end: i64) -> Self {
        Self {
            min: (start != 0).then_some(start),
            max: (end != 0).then_some(end),
        }
    }

    /// Bounds with unbounded sides widened to the full `i64` range.
    pub fn bounds(self) -> (i64, i64) {
        (self.min.unwrap_or(i64::MIN), self.max.unwrap_or(i64::MAX))
    }
}

/// Ordered-set backed arrival counter.
///
/// Implementations do their own locking; callers share them as
/// `Arc<dyn CountIndex>`.
pub trait CountIndex: Send + Sync {
    /// Human-readable backend name (used in logs).
    fn name(&self) -> &'static str;

    /// Record one arrival of `event_name` with the given score.
    ///
    /// Returns the member id assigned from the per-type counter.
    fn record_arrival(&self, event_name: &str, score: i64) -> Result<u64>;

    /// Number of arrivals recorded for `event_name`.
    fn count_total(&self, event_name: &str) -> Result<u64>;

    /// Number of arrivals whose score lies within `range`.
    fn count_range(&self, event_name: &str, range: ScoreRange) -> Result<u64>;
}

/// One event type's counter and ordered set.
#[derive(Debug, Default)]
struct OrderedSet {
    counter: u64,
    members: BTreeSet<(i64, u64)>,
}

/// Process-local [`CountIndex`] backed by a `BTreeSet` per event type.
///
/// Lost on restart; use [`SqliteCountIndex`](super::SqliteCountIndex) when
/// counts must survive.
#[derive(Debug, Default)]
pub struct MemoryCountIndex {
    sets: RwLock<HashMap<String, OrderedSet>>,
}

impl MemoryCountIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CountIndex for MemoryCountIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn record_arrival(&self, event_name: &str, score: i64) -> Result<u64> {
        let mut sets = self.sets.write();
        let set = sets.entry(event_name.to_string()).or_default();
        set.counter += 1;
        set.members.insert((score, set.counter));
        Ok(set.counter)
    }

    fn count_total(&self, event_name: &str) -> Result<u64> {
        let sets = self.sets.read();
        Ok(sets.get(event_name).map_or(0, |s| s.members.len() as u64))
    }

    fn count_range(&self, event_name: &str, range: ScoreRange) -> Result<u64> {
        let (lo, hi) = range.bounds();
        if lo > hi {
            return Ok(0);
        }

        let sets = self.sets.read();
        let count = sets.get(event_name).map_or(0, |s| {
            s.members.range((lo, 0)..=(hi, u64::MAX)).count()
        });
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(scores: &[i64]) -> MemoryCountIndex {
        let index = MemoryCountIndex::new();
        for &score in scores {
            index.record_arrival("link_clicked", score).unwrap();
        }
        index
    }

    #[test]
    fn test_ids_increase_per_type() {
        let index = MemoryCountIndex::new();
        assert_eq!(index.record_arrival("a", 5).unwrap(), 1);
        assert_eq!(index.record_arrival("a", 5).unwrap(), 2);
        assert_eq!(index.record_arrival("b", 5).unwrap(), 1);
    }

    #[test]
    fn test_range_count() {
        let index = index_with(&[100, 200, 300]);
        let range = ScoreRange::from_sentinels(150, 250);
        assert_eq!(index.count_range("link_clicked", range).unwrap(), 1);
        assert_eq!(index.count_total("link_clicked").unwrap(), 3);
    }

    #[test]
    fn test_range_is_inclusive() {
        let index = index_with(&[100, 200, 300]);
        let range = ScoreRange::from_sentinels(100, 300);
        assert_eq!(index.count_range("link_clicked", range).unwrap(), 3);
    }

    #[test]
    fn test_zero_sentinels_are_unbounded() {
        let index = index_with(&[100, 200, 300, 300]);
        assert_eq!(
            index
                .count_range("link_clicked", ScoreRange::from_sentinels(0, 0))
                .unwrap(),
            index.count_total("link_clicked").unwrap()
        );
        assert_eq!(
            index
                .count_range("link_clicked", ScoreRange::from_sentinels(200, 0))
                .unwrap(),
            3
        );
        assert_eq!(
            index
                .count_range("link_clicked", ScoreRange::from_sentinels(0, 200))
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_duplicate_scores_are_distinct_members() {
        let index = index_with(&[42, 42, 42]);
        assert_eq!(index.count_total("link_clicked").unwrap(), 3);
        let range = ScoreRange::from_sentinels(42, 42);
        assert_eq!(index.count_range("link_clicked", range).unwrap(), 3);
    }

    #[test]
    fn test_unknown_type_counts_zero() {
        let index = MemoryCountIndex::new();
        assert_eq!(index.count_total("nothing").unwrap(), 0);
        assert_eq!(index.count_range("nothing", ScoreRange::ALL).unwrap(), 0);
    }

    #[test]
    fn test_reversed_range_counts_zero() {
        let index = index_with(&[100]);
        let range = ScoreRange {
            min: Some(200),
            max: Some(100),
        };
        assert_eq!(index.count_range("link_clicked", range).unwrap(), 0);
    }
}
