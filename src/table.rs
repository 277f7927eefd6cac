//! Fixed-capacity transposition table.
//!
//! The table is also the arena holding every [`SearchNode`]: children and
//! fathers refer to each other by position and are resolved here. All
//! slots are allocated up front and recycled; the table never holds more
//! than `capacity` nodes.
//!
//! Each slot sits on two intrusive doubly-linked lists: the chain of its
//! hash bucket, and a recency list from oldest to newest use. When the
//! table is full, inserting evicts the oldest unpinned node.

use crate::node::SearchNode;
use crate::position::Position;

/// Odd multiplier mixing the folded masks.
const HASH_MULTIPLIER: u64 = 541_725_397_157;

#[derive(Debug, Default)]
struct Slot {
    node: Option<SearchNode>,
    bucket_prev: Option<u32>,
    bucket_next: Option<u32>,
    older: Option<u32>,
    newer: Option<u32>,
    pinned: bool,
}

pub struct TranspositionTable {
    slots: Vec<Slot>,
    buckets: Vec<Option<u32>>,
    free: Vec<u32>,
    oldest: Option<u32>,
    newest: Option<u32>,
    len: usize,
}

fn fold(x: u64) -> i64 {
    // Truncating to 32 bits keeps the mixed low half.
    i64::from(x.wrapping_add(x >> 32).wrapping_mul(HASH_MULTIPLIER) as u32 as i32)
}

impl TranspositionTable {
    /// Creates a table with `capacity` slots and `buckets` hash chains.
    pub fn new(capacity: usize, buckets: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        Self {
            slots,
            buckets: vec![None; buckets.max(1)],
            free: (0..capacity as u32).rev().collect(),
            oldest: None,
            newest: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.slots.len()
    }

    /// Hash bucket of a position.
    pub fn bucket_of(&self, position: &Position) -> usize {
        let n = self.buckets.len() as i64;
        (3 * fold(position.player) + 17 * fold(position.opponent)).rem_euclid(n) as usize
    }

    fn find(&self, position: &Position) -> Option<u32> {
        let mut cursor = self.buckets[self.bucket_of(position)];
        while let Some(i) = cursor {
            let slot = &self.slots[i as usize];
            if slot.node.as_ref().is_some_and(|n| n.position == *position) {
                return Some(i);
            }
            cursor = slot.bucket_next;
        }
        None
    }

    /// Lookup without touching recency.
    pub fn get(&self, position: &Position) -> Option<&SearchNode> {
        self.find(position)
            .and_then(|i| self.slots[i as usize].node.as_ref())
    }

    /// Mutable access without marking the node as used.
    pub fn get_mut(&mut self, position: &Position) -> Option<&mut SearchNode> {
        let i = self.find(position)?;
        self.slots[i as usize].node.as_mut()
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.find(position).is_some()
    }

    /// Marks a node as just used. Returns false if it is not present.
    pub fn touch(&mut self, position: &Position) -> bool {
        match self.find(position) {
            Some(i) => {
                if !self.slots[i as usize].pinned {
                    self.unlink_recency(i);
                    self.push_newest(i);
                }
                true
            }
            None => false,
        }
    }

    /// Returns the node for `position`, marking it used, or inserts the one
    /// built by `make`, evicting the oldest unpinned node if the table is
    /// full. The flag is true when the node was created.
    ///
    /// Returns `None` only when the table is full of pinned nodes.
    pub fn get_or_create<F>(&mut self, position: Position, make: F) -> Option<(&mut SearchNode, bool)>
    where
        F: FnOnce() -> SearchNode,
    {
        if let Some(i) = self.find(&position) {
            if !self.slots[i as usize].pinned {
                self.unlink_recency(i);
                self.push_newest(i);
            }
            return self.slots[i as usize].node.as_mut().map(|n| (n, false));
        }

        let i = match self.free.pop() {
            Some(i) => i,
            None => {
                let (i, evicted) = self.remove_one()?;
                log::trace!("evicted {:#x}/{:#x}", evicted.player, evicted.opponent);
                i
            }
        };
        let node = make();
        debug_assert_eq!(node.position, position);
        let bucket = self.bucket_of(&position);
        let slot = &mut self.slots[i as usize];
        slot.node = Some(node);
        slot.pinned = false;
        self.push_bucket(i, bucket);
        self.push_newest(i);
        self.len += 1;
        self.slots[i as usize].node.as_mut().map(|n| (n, true))
    }

    /// Detaches the least recently used unpinned node and returns its slot
    /// for reuse, together with the evicted position.
    fn remove_one(&mut self) -> Option<(u32, Position)> {
        let i = self.oldest?;
        self.unlink_recency(i);
        let position = self.slots[i as usize].node.as_ref()?.position;
        let bucket = self.bucket_of(&position);
        self.unlink_bucket(i, bucket);
        self.slots[i as usize].node = None;
        self.len -= 1;
        Some((i, position))
    }

    /// Excludes a node from eviction.
    pub fn pin(&mut self, position: &Position) -> bool {
        let Some(i) = self.find(position) else {
            return false;
        };
        if !self.slots[i as usize].pinned {
            self.unlink_recency(i);
            self.slots[i as usize].pinned = true;
        }
        true
    }

    /// Makes a pinned node evictable again, as the newest entry.
    pub fn unpin(&mut self, position: &Position) -> bool {
        let Some(i) = self.find(position) else {
            return false;
        };
        if self.slots[i as usize].pinned {
            self.slots[i as usize].pinned = false;
            self.push_newest(i);
        }
        true
    }

    /// The node that would be evicted next.
    pub fn oldest(&self) -> Option<Position> {
        self.oldest
            .and_then(|i| self.slots[i as usize].node.as_ref())
            .map(|n| n.position)
    }

    /// Positions chained in `bucket`, head first.
    pub fn bucket_chain(&self, bucket: usize) -> Vec<Position> {
        let mut out = Vec::new();
        let mut cursor = self.buckets.get(bucket).copied().flatten();
        while let Some(i) = cursor {
            let slot = &self.slots[i as usize];
            if let Some(node) = &slot.node {
                out.push(node.position);
            }
            cursor = slot.bucket_next;
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchNode> {
        self.slots.iter().filter_map(|s| s.node.as_ref())
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::default();
        }
        self.buckets.iter_mut().for_each(|b| *b = None);
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.oldest = None;
        self.newest = None;
        self.len = 0;
    }

    // =========================================================================
    // Intrusive lists
    // =========================================================================

    fn push_bucket(&mut self, i: u32, bucket: usize) {
        let head = self.buckets[bucket];
        {
            let slot = &mut self.slots[i as usize];
            slot.bucket_prev = None;
            slot.bucket_next = head;
        }
        if let Some(h) = head {
            self.slots[h as usize].bucket_prev = Some(i);
        }
        self.buckets[bucket] = Some(i);
    }

    fn unlink_bucket(&mut self, i: u32, bucket: usize) {
        let (prev, next) = {
            let slot = &mut self.slots[i as usize];
            (slot.bucket_prev.take(), slot.bucket_next.take())
        };
        match prev {
            Some(p) => self.slots[p as usize].bucket_next = next,
            None => self.buckets[bucket] = next,
        }
        if let Some(n) = next {
            self.slots[n as usize].bucket_prev = prev;
        }
    }

    fn push_newest(&mut self, i: u32) {
        {
            let slot = &mut self.slots[i as usize];
            slot.older = self.newest;
            slot.newer = None;
        }
        match self.newest {
            Some(n) => self.slots[n as usize].newer = Some(i),
            None => self.oldest = Some(i),
        }
        self.newest = Some(i);
    }

    fn unlink_recency(&mut self, i: u32) {
        let (older, newer) = {
            let slot = &mut self.slots[i as usize];
            (slot.older.take(), slot.newer.take())
        };
        // Pinned slots are on no list; leave the ends untouched.
        if older.is_none() && newer.is_none() && self.oldest != Some(i) {
            return;
        }
        match older {
            Some(o) => self.slots[o as usize].newer = newer,
            None => self.oldest = newer,
        }
        match newer {
            Some(n) => self.slots[n as usize].older = older,
            None => self.newest = older,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::EvalGoal;

    fn pos(i: u64) -> Position {
        Position {
            player: i,
            opponent: 1 << 63,
        }
    }

    fn make(p: Position) -> impl FnOnce() -> SearchNode {
        move || SearchNode::new(p, 0, EvalGoal::new(100).unwrap(), 1)
    }

    fn insert(table: &mut TranspositionTable, p: Position) -> bool {
        table.get_or_create(p, make(p)).unwrap().1
    }

    fn check_reachable(table: &TranspositionTable) {
        let mut seen = 0;
        for node in table.iter() {
            let bucket = table.bucket_of(&node.position);
            assert!(table.bucket_chain(bucket).contains(&node.position));
            seen += 1;
        }
        assert_eq!(seen, table.len());
    }

    #[test]
    fn test_get_or_create_deduplicates() {
        let mut table = TranspositionTable::new(8, 4);
        assert!(insert(&mut table, pos(1)));
        assert!(!insert(&mut table, pos(1)));
        assert_eq!(table.len(), 1);
        assert!(table.contains(&pos(1)));
        assert!(table.get(&pos(2)).is_none());
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let mut table = TranspositionTable::new(16, 5);
        for i in 1..200 {
            insert(&mut table, pos(i));
            assert!(table.len() <= 16);
            check_reachable(&table);
        }
        assert_eq!(table.len(), 16);
        // The newest 16 survive.
        for i in 184..200 {
            assert!(table.contains(&pos(i)));
        }
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut table = TranspositionTable::new(3, 2);
        insert(&mut table, pos(1));
        insert(&mut table, pos(2));
        insert(&mut table, pos(3));
        assert_eq!(table.oldest(), Some(pos(1)));
        table.touch(&pos(1));
        assert_eq!(table.oldest(), Some(pos(2)));
        // Lookups by get_or_create also count as use.
        insert(&mut table, pos(2));
        assert_eq!(table.oldest(), Some(pos(3)));
        insert(&mut table, pos(4));
        assert!(!table.contains(&pos(3)));
        assert_eq!(table.oldest(), Some(pos(1)));
        check_reachable(&table);
    }

    #[test]
    fn test_get_does_not_touch() {
        let mut table = TranspositionTable::new(2, 2);
        insert(&mut table, pos(1));
        insert(&mut table, pos(2));
        assert!(table.get(&pos(1)).is_some());
        assert!(table.get_mut(&pos(1)).is_some());
        insert(&mut table, pos(3));
        assert!(!table.contains(&pos(1)));
    }

    #[test]
    fn test_pinned_nodes_survive() {
        let mut table = TranspositionTable::new(3, 3);
        insert(&mut table, pos(1));
        assert!(table.pin(&pos(1)));
        for i in 2..50 {
            insert(&mut table, pos(i));
        }
        assert!(table.contains(&pos(1)));
        assert_eq!(table.len(), 3);
        assert!(table.unpin(&pos(1)));
        insert(&mut table, pos(100));
        insert(&mut table, pos(101));
        insert(&mut table, pos(102));
        assert!(!table.contains(&pos(1)));
        check_reachable(&table);
    }

    #[test]
    fn test_full_of_pinned_nodes() {
        let mut table = TranspositionTable::new(1, 1);
        insert(&mut table, pos(1));
        table.pin(&pos(1));
        assert!(table.get_or_create(pos(2), make(pos(2))).is_none());
        assert!(table.contains(&pos(1)));
    }

    #[test]
    fn test_remove_one_unlinks_from_bucket() {
        let mut table = TranspositionTable::new(4, 1);
        for i in 1..=4 {
            insert(&mut table, pos(i));
        }
        assert_eq!(table.bucket_chain(0).len(), 4);
        let (_, evicted) = table.remove_one().unwrap();
        assert_eq!(evicted, pos(1));
        assert_eq!(table.bucket_chain(0).len(), 3);
        assert_eq!(table.len(), 3);
        check_reachable(&table);
    }

    #[test]
    fn test_clear() {
        let mut table = TranspositionTable::new(4, 4);
        for i in 1..=4 {
            insert(&mut table, pos(i));
        }
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.oldest(), None);
        for i in 5..=8 {
            insert(&mut table, pos(i));
        }
        assert_eq!(table.len(), 4);
        check_reachable(&table);
    }

    #[test]
    fn test_hash_spreads_positions() {
        let table = TranspositionTable::new(1, 1024);
        let mut rng = fastrand::Rng::with_seed(99);
        let mut positions = std::collections::HashSet::new();
        let mut used = std::collections::HashSet::new();
        for _ in 0..200 {
            let plies = rng.u32(10..50);
            let p = crate::position::random_position(&mut rng, plies);
            if positions.insert(p) {
                used.insert(table.bucket_of(&p));
            }
        }
        assert!(used.len() * 3 > positions.len() * 2);
    }
}
