//! Bounded, de-duplicated play queue
//!
//! Items are unique by identity. Every mutation replaces the sequence and
//! rebuilds the [`MediaIndexMap`], so `index.get(item)` always agrees with
//! the item's position.
//!
//! ```text
//! add_all([X, B], before = 1) on [A, B, C]:
//!
//!   [A] | [B, C]        split at 1
//!   [A] | [C]           strip incoming identities from both halves
//!   [A, X, B, C]        splice the batch in between
//! ```

use crate::index_map::MediaIndexMap;
use crate::shuffle::{restore_insertion_order, shuffle_items, stamp_batch};
use crate::types::{MediaKey, MusicItem};
use std::collections::HashSet;

/// Default hard cap on the number of queued items
pub const DEFAULT_MAX_QUEUE_LEN: usize = 10_000;

#[derive(Debug, Clone)]
pub struct PlayQueue {
    items: Vec<MusicItem>,
    index: MediaIndexMap,
    max_len: usize,
}

impl PlayQueue {
    pub fn new(max_len: usize) -> Self {
        Self {
            items: Vec::new(),
            index: MediaIndexMap::default(),
            max_len: max_len.max(2),
        }
    }

    pub fn items(&self) -> &[MusicItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len.max(2);
    }

    pub fn get(&self, index: usize) -> Option<&MusicItem> {
        self.items.get(index)
    }

    /// Item at `index` with wrap-around in both directions
    pub fn get_wrapped(&self, index: isize) -> Option<&MusicItem> {
        let len = self.items.len() as isize;
        if len == 0 {
            return None;
        }
        self.items.get(index.rem_euclid(len) as usize)
    }

    pub fn position(&self, item: &MusicItem) -> Option<usize> {
        self.index.get(item)
    }

    pub fn position_of_key(&self, key: &MediaKey) -> Option<usize> {
        self.index.get_key(key)
    }

    pub fn contains(&self, item: &MusicItem) -> bool {
        self.index.has(item)
    }

    /// Queued copy of an item, carrying its insertion stamps
    pub fn find(&self, item: &MusicItem) -> Option<&MusicItem> {
        self.position(item).and_then(|index| self.items.get(index))
    }

    /// Replace the whole sequence
    ///
    /// Duplicates are dropped (first occurrence wins) and the result is
    /// truncated to the cap anchored at `anchor`.
    pub fn replace(&mut self, items: Vec<MusicItem>, anchor: usize) {
        let items = dedup_by_identity(items);
        let items = if items.len() > self.max_len {
            shrink_to_window(items, anchor, self.max_len)
        } else {
            items
        };
        self.commit(items);
    }

    /// Insert a batch
    ///
    /// Each incoming item is stamped with `now_ms` and its position within
    /// the batch. With `before == None` only items not already queued are
    /// appended. Otherwise the existing queue is split at `before`, any
    /// queued copy of an incoming item is removed from both halves and the
    /// batch is spliced in between, so re-adding moves items. The result is
    /// shrunk to the cap anchored at the insertion point (or the end), then
    /// shuffled when requested.
    pub fn add_all(
        &mut self,
        items: Vec<MusicItem>,
        before: Option<usize>,
        shuffle: bool,
        now_ms: i64,
    ) {
        let mut incoming = dedup_by_identity(items);
        stamp_batch(&mut incoming, now_ms);

        let mut next = match before {
            None => {
                let mut next = self.items.clone();
                next.extend(incoming.into_iter().filter(|item| !self.index.has(item)));
                next
            }
            Some(before) => {
                let split = before.min(self.items.len());
                let incoming_index = MediaIndexMap::build(&incoming);
                let (head, tail) = self.items.split_at(split);

                let mut next = Vec::with_capacity(self.items.len() + incoming.len());
                next.extend(head.iter().filter(|item| !incoming_index.has(item)).cloned());
                next.extend(incoming);
                next.extend(tail.iter().filter(|item| !incoming_index.has(item)).cloned());
                next
            }
        };

        if next.len() > self.max_len {
            let anchor = before.unwrap_or(next.len() - 1);
            next = shrink_to_window(next, anchor, self.max_len);
        }

        if shuffle {
            shuffle_items(&mut next);
        }

        self.commit(next);
    }

    /// Remove an item, returning the position it occupied
    pub fn remove(&mut self, item: &MusicItem) -> Option<usize> {
        let position = self.index.get(item)?;
        let mut next = self.items.clone();
        next.remove(position);
        self.commit(next);
        Some(position)
    }

    pub fn clear(&mut self) {
        self.commit(Vec::new());
    }

    pub fn shuffle(&mut self) {
        let mut next = self.items.clone();
        shuffle_items(&mut next);
        self.commit(next);
    }

    pub fn unshuffle(&mut self) {
        let mut next = self.items.clone();
        restore_insertion_order(&mut next);
        self.commit(next);
    }

    fn commit(&mut self, items: Vec<MusicItem>) {
        self.index = MediaIndexMap::build(&items);
        self.items = items;
    }
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUE_LEN)
    }
}

/// Keep a window of at most `cap` items that contains `target`
///
/// A target in the first half of the cap keeps the head `[0, cap)`.
/// Otherwise the window ends at `min(len, target + cap / 2)`, never before
/// `cap`, and spans `cap` items back from there.
pub fn shrink_to_window(mut items: Vec<MusicItem>, target: usize, cap: usize) -> Vec<MusicItem> {
    if items.len() <= cap {
        return items;
    }

    let half = cap / 2;
    if target < half {
        items.truncate(cap);
        return items;
    }

    let right = items.len().min((target + half).max(cap));
    let left = right - cap;
    items.truncate(right);
    items.drain(..left);
    items
}

/// Drop repeated identities, keeping the first occurrence
pub fn dedup_by_identity(items: Vec<MusicItem>) -> Vec<MusicItem> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> MusicItem {
        MusicItem::new("p", id)
    }

    fn items(ids: &[&str]) -> Vec<MusicItem> {
        ids.iter().map(|id| item(id)).collect()
    }

    fn ids(queue: &PlayQueue) -> Vec<String> {
        queue.items().iter().map(|i| i.id.clone()).collect()
    }

    fn assert_index_consistent(queue: &PlayQueue) {
        for (i, it) in queue.items().iter().enumerate() {
            assert_eq!(queue.position(it), Some(i), "index drift for {}", it.id);
        }
    }

    #[test]
    fn append_skips_already_queued() {
        let mut queue = PlayQueue::new(100);
        queue.add_all(items(&["A", "B"]), None, false, 1);
        queue.add_all(items(&["B", "C"]), None, false, 2);

        assert_eq!(ids(&queue), vec!["A", "B", "C"]);
        // B keeps its original stamp
        assert_eq!(queue.get(1).and_then(|i| i.inserted_at), Some(1));
        assert_index_consistent(&queue);
    }

    #[test]
    fn insert_before_moves_duplicates() {
        let mut queue = PlayQueue::new(100);
        queue.add_all(items(&["A", "B", "C", "D"]), None, false, 1);
        queue.add_all(items(&["D", "X"]), Some(1), false, 2);

        assert_eq!(ids(&queue), vec!["A", "D", "X", "B", "C"]);
        assert_index_consistent(&queue);
    }

    #[test]
    fn insert_before_past_end_appends() {
        let mut queue = PlayQueue::new(100);
        queue.add_all(items(&["A"]), None, false, 1);
        queue.add_all(items(&["B"]), Some(7), false, 2);

        assert_eq!(ids(&queue), vec!["A", "B"]);
    }

    #[test]
    fn duplicate_in_batch_is_collapsed() {
        let mut queue = PlayQueue::new(100);
        queue.add_all(items(&["A", "B", "A"]), Some(0), false, 1);

        assert_eq!(ids(&queue), vec!["A", "B"]);
        assert_index_consistent(&queue);
    }

    #[test]
    fn stamps_follow_batch_position() {
        let mut queue = PlayQueue::new(100);
        queue.add_all(items(&["A", "B"]), None, false, 99);

        assert_eq!(queue.get(0).and_then(|i| i.insertion_ordinal), Some(0));
        assert_eq!(queue.get(1).and_then(|i| i.insertion_ordinal), Some(1));
        assert_eq!(queue.get(1).and_then(|i| i.inserted_at), Some(99));
    }

    #[test]
    fn remove_reports_position() {
        let mut queue = PlayQueue::new(100);
        queue.add_all(items(&["A", "B", "C"]), None, false, 1);

        assert_eq!(queue.remove(&item("B")), Some(1));
        assert_eq!(queue.remove(&item("B")), None);
        assert_eq!(ids(&queue), vec!["A", "C"]);
        assert_index_consistent(&queue);
    }

    #[test]
    fn wrapped_lookup() {
        let mut queue = PlayQueue::new(100);
        queue.add_all(items(&["A", "B", "C"]), None, false, 1);

        assert_eq!(queue.get_wrapped(-1).map(|i| i.id.as_str()), Some("C"));
        assert_eq!(queue.get_wrapped(3).map(|i| i.id.as_str()), Some("A"));
        assert_eq!(queue.get_wrapped(-4).map(|i| i.id.as_str()), Some("C"));
        assert!(PlayQueue::new(10).get_wrapped(0).is_none());
    }

    #[test]
    fn shuffle_then_unshuffle_restores_order() {
        let mut queue = PlayQueue::new(100);
        queue.add_all(items(&["A", "B", "C", "D", "E"]), None, false, 1);
        queue.add_all(items(&["F", "G"]), None, false, 2);

        queue.shuffle();
        assert_index_consistent(&queue);
        queue.unshuffle();

        assert_eq!(ids(&queue), vec!["A", "B", "C", "D", "E", "F", "G"]);
        assert_index_consistent(&queue);
    }

    #[test]
    fn shrink_keeps_head_for_early_anchor() {
        let all = items(&["0", "1", "2", "3", "4", "5"]);
        let kept = shrink_to_window(all, 1, 4);
        let ids: Vec<_> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn shrink_centres_window_on_late_anchor() {
        let all: Vec<MusicItem> = (0..10).map(|i| item(&i.to_string())).collect();
        let kept = shrink_to_window(all, 6, 4);
        let ids: Vec<_> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["4", "5", "6", "7"]);
    }

    #[test]
    fn shrink_window_clamps_at_tail() {
        let all: Vec<MusicItem> = (0..10).map(|i| item(&i.to_string())).collect();
        let kept = shrink_to_window(all, 9, 4);
        let ids: Vec<_> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["6", "7", "8", "9"]);
    }

    #[test]
    fn shrink_window_is_always_full() {
        let all: Vec<MusicItem> = (0..10).map(|i| item(&i.to_string())).collect();
        let kept = shrink_to_window(all, 2, 5);
        let ids: Vec<_> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn overflowing_insert_keeps_anchor() {
        let mut queue = PlayQueue::new(4);
        queue.add_all(items(&["0", "1", "2"]), None, false, 1);
        queue.add_all(items(&["X", "Y"]), Some(3), false, 2);

        assert_eq!(queue.len(), 4);
        assert!(queue.contains(&item("X")));
        assert_index_consistent(&queue);
    }

    #[test]
    fn overflowing_append_keeps_tail() {
        let mut queue = PlayQueue::new(4);
        queue.add_all(items(&["0", "1", "2", "3"]), None, false, 1);
        queue.add_all(items(&["4"]), None, false, 2);

        assert_eq!(ids(&queue), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn replace_dedups_and_rebuilds_index() {
        let mut queue = PlayQueue::new(100);
        queue.replace(items(&["A", "B", "A", "C"]), 0);

        assert_eq!(ids(&queue), vec!["A", "B", "C"]);
        assert_index_consistent(&queue);
    }
}
