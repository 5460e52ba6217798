//! Rank allocation and the ordering contract every read follows.
//!
//! Ranks are millisecond-scale integers. New entities take "now", so they sort
//! first under rank-descending order. A reorder rewrites every entity of the
//! collection with `base - position`, where `base` sits above anything issued or
//! observed so far, so nothing outside the rewritten set needs renumbering.

use crate::config::OrderingRule;
use crate::models::{Item, OrderBy, Rank, ShoppingList, Table};
use crate::util::Clock;
use chrono::{DateTime, Utc};
use std::cell::Cell;
use std::cmp::Ordering;

/// Offset added to the clock when anchoring a reorder, so the rewritten ranks
/// land above entities created moments earlier on other clients.
pub const REORDER_SAFETY_OFFSET_MS: Rank = 1000;

/// Anything ordered by a persisted rank.
pub trait Ranked {
    fn id(&self) -> &str;
    fn rank(&self) -> Option<Rank>;
    fn created_at(&self) -> Option<&DateTime<Utc>>;
    /// Secondary key under rank ordering, compared newest first.
    fn tie_key(&self) -> Option<&DateTime<Utc>>;

    /// Rank used for ordering. Rows written without a rank sort as if ranked at
    /// their creation time; rows with neither sort last.
    fn effective_rank(&self) -> Rank {
        self.rank()
            .or_else(|| self.created_at().map(|t| t.timestamp_millis()))
            .unwrap_or(0)
    }
}

impl Ranked for ShoppingList {
    fn id(&self) -> &str {
        &self.id
    }

    fn rank(&self) -> Option<Rank> {
        self.order_index
    }

    fn created_at(&self) -> Option<&DateTime<Utc>> {
        self.created_at.as_ref()
    }

    fn tie_key(&self) -> Option<&DateTime<Utc>> {
        self.updated_at.as_ref()
    }
}

impl Ranked for Item {
    fn id(&self) -> &str {
        &self.id
    }

    fn rank(&self) -> Option<Rank> {
        self.order_index
    }

    fn created_at(&self) -> Option<&DateTime<Utc>> {
        self.created_at.as_ref()
    }

    fn tie_key(&self) -> Option<&DateTime<Utc>> {
        self.created_at.as_ref()
    }
}

/// Backend-side ordering matching [`compare`] for the given table.
pub fn order_for(table: Table, rule: OrderingRule) -> Vec<OrderBy> {
    match (rule, table) {
        (OrderingRule::RankDescending, Table::Lists) => {
            vec![OrderBy::desc("order_index"), OrderBy::desc("updated_at")]
        }
        (OrderingRule::RankDescending, Table::Items) => {
            vec![OrderBy::desc("order_index"), OrderBy::desc("created_at")]
        }
        (OrderingRule::CreatedAscending, _) => vec![OrderBy::asc("created_at")],
    }
}

/// Total order used for display. Ids break any remaining tie so repeated
/// loads of the same rows always come out identical.
pub fn compare<T: Ranked>(a: &T, b: &T, rule: OrderingRule) -> Ordering {
    let primary = match rule {
        OrderingRule::RankDescending => b
            .effective_rank()
            .cmp(&a.effective_rank())
            .then_with(|| b.tie_key().cmp(&a.tie_key())),
        OrderingRule::CreatedAscending => match (a.created_at(), b.created_at()) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    primary.then_with(|| a.id().cmp(b.id()))
}

pub fn sort_by_rank<T: Ranked>(rows: &mut [T], rule: OrderingRule) {
    rows.sort_by(|a, b| compare(a, b, rule));
}

/// Hands out ranks for one client session.
pub struct RankAllocator<C: Clock> {
    clock: C,
    /// Highest rank issued by this allocator or seen in a loaded snapshot.
    high_water: Cell<Rank>,
}

impl<C: Clock> RankAllocator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            high_water: Cell::new(Rank::MIN),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Record ranks present in a freshly loaded snapshot.
    pub fn observe<T: Ranked>(&self, rows: &[T]) {
        if let Some(max) = rows.iter().filter_map(|r| r.rank()).max() {
            self.bump(max);
        }
    }

    /// Strictly increasing across calls; follows the clock when it moves forward.
    pub fn rank_for_new_entity(&self) -> Rank {
        let floor = self.high_water.get().saturating_add(1);
        let rank = self.clock.now_ms().max(floor);
        self.bump(rank);
        rank
    }

    /// Ranks reproducing `ordered_ids` (first id = highest rank) under
    /// rank-descending order.
    ///
    /// Two clients reordering the same collection race per row: whichever
    /// write lands last wins for that row. Orders are never merged.
    pub fn ranks_for_order<'a>(&self, ordered_ids: &'a [String]) -> Vec<(&'a str, Rank)> {
        if ordered_ids.is_empty() {
            return vec![];
        }
        // Even the lowest rewritten rank stays above everything seen so far.
        let floor = self
            .high_water
            .get()
            .saturating_add(ordered_ids.len() as Rank);
        let base = self
            .clock
            .now_ms()
            .saturating_add(REORDER_SAFETY_OFFSET_MS)
            .max(floor);
        self.bump(base);

        ordered_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), base - i as Rank))
            .collect()
    }

    fn bump(&self, rank: Rank) {
        if rank > self.high_water.get() {
            self.high_water.set(rank);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_clock::ManualClock;
    use chrono::TimeZone;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().unwrap()
    }

    fn item(id: &str, rank: Option<Rank>, created_ms: i64) -> Item {
        Item {
            id: id.to_string(),
            list_id: "l1".to_string(),
            text: id.to_string(),
            done: false,
            quantity: String::new(),
            note: String::new(),
            created_at: Some(ts(created_ms)),
            updated_at: Some(ts(created_ms)),
            order_index: rank,
        }
    }

    fn ids<T: Ranked>(rows: &[T]) -> Vec<&str> {
        rows.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn test_new_entity_ranks_sort_newest_first() {
        let clock = ManualClock::at_ms(1_000);
        let alloc = RankAllocator::new(clock.clone());

        let mut issued = vec![];
        for _ in 0..5 {
            issued.push(alloc.rank_for_new_entity());
            clock.advance(3);
        }

        let mut sorted = issued.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        let mut reversed = issued.clone();
        reversed.reverse();
        assert_eq!(sorted, reversed);
    }

    #[test]
    fn test_new_entity_ranks_increase_when_clock_stalls() {
        let alloc = RankAllocator::new(ManualClock::at_ms(500));
        let a = alloc.rank_for_new_entity();
        let b = alloc.rank_for_new_entity();
        let c = alloc.rank_for_new_entity();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_ranks_for_order_reproduce_order() {
        let alloc = RankAllocator::new(ManualClock::at_ms(10_000));
        let order: Vec<String> = ["c", "a", "b"].iter().map(|s| s.to_string()).collect();
        let ranks = alloc.ranks_for_order(&order);
        assert_eq!(ranks, vec![("c", 11_000), ("a", 10_999), ("b", 10_998)]);

        let mut rows: Vec<Item> = ranks
            .iter()
            .map(|(id, r)| item(id, Some(*r), 0))
            .rev()
            .collect();
        sort_by_rank(&mut rows, OrderingRule::RankDescending);
        assert_eq!(ids(&rows), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_reorder_base_stays_above_observed_ranks() {
        let alloc = RankAllocator::new(ManualClock::at_ms(10_000));
        alloc.observe(&[item("x", Some(50_000), 0)]);
        let order = vec!["x".to_string(), "y".to_string()];
        let ranks = alloc.ranks_for_order(&order);
        assert_eq!(ranks, vec![("x", 50_002), ("y", 50_001)]);
        assert!(alloc.rank_for_new_entity() > 50_002);
    }

    #[test]
    fn test_new_entity_after_reorder_sorts_first() {
        let clock = ManualClock::at_ms(10_000);
        let alloc = RankAllocator::new(clock.clone());
        let order = vec!["a".to_string(), "b".to_string()];
        let top = alloc.ranks_for_order(&order)[0].1;
        clock.advance(5);
        assert!(alloc.rank_for_new_entity() > top);
    }

    #[test]
    fn test_missing_rank_falls_back_to_creation_time() {
        let mut rows = vec![
            item("ranked-low", Some(1_000), 0),
            item("legacy", None, 5_000),
            item("ranked-high", Some(9_000), 0),
        ];
        sort_by_rank(&mut rows, OrderingRule::RankDescending);
        assert_eq!(ids(&rows), vec!["ranked-high", "legacy", "ranked-low"]);
    }

    #[test]
    fn test_missing_rank_and_timestamp_sorts_last() {
        let mut bare = item("bare", None, 0);
        bare.created_at = None;
        let mut rows = vec![bare, item("ranked", Some(1), 0)];
        sort_by_rank(&mut rows, OrderingRule::RankDescending);
        assert_eq!(ids(&rows), vec!["ranked", "bare"]);
    }

    #[test]
    fn test_equal_ranks_break_ties_by_recency_then_id() {
        let mut rows = vec![item("b", Some(7), 100), item("a", Some(7), 100), item("c", Some(7), 200)];
        sort_by_rank(&mut rows, OrderingRule::RankDescending);
        assert_eq!(ids(&rows), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_created_ascending_ignores_rank() {
        let mut rows = vec![item("bread", Some(1), 300), item("milk", Some(3), 100), item("eggs", Some(2), 200)];
        sort_by_rank(&mut rows, OrderingRule::CreatedAscending);
        assert_eq!(ids(&rows), vec!["milk", "eggs", "bread"]);
    }

    #[test]
    fn test_order_for_lists_and_items() {
        assert_eq!(
            order_for(Table::Lists, OrderingRule::RankDescending),
            vec![OrderBy::desc("order_index"), OrderBy::desc("updated_at")]
        );
        assert_eq!(
            order_for(Table::Items, OrderingRule::CreatedAscending),
            vec![OrderBy::asc("created_at")]
        );
    }
}
