//! Shuffle and unshuffle for the play queue
//!
//! Shuffling is a plain Fisher-Yates permutation. Unshuffling sorts by the
//! insertion stamps each item got when it was queued, so the original
//! order comes back regardless of how many times the queue was permuted.

use crate::types::MusicItem;
use rand::seq::SliceRandom;
use rand::thread_rng;

/// Randomly permute the queue in place
pub fn shuffle_items(items: &mut [MusicItem]) {
    let mut rng = thread_rng();
    items.shuffle(&mut rng);
}

/// Restore insertion order
///
/// Sorts ascending by `inserted_at`, ties broken by `insertion_ordinal`.
/// Missing stamps sort first. The sort is stable, so items with identical
/// stamps keep their relative order.
pub fn restore_insertion_order(items: &mut [MusicItem]) {
    items.sort_by_key(|item| {
        (
            item.inserted_at.unwrap_or(i64::MIN),
            item.insertion_ordinal.unwrap_or(0),
        )
    });
}

/// Attach insertion stamps to a batch
pub fn stamp_batch(items: &mut [MusicItem], now_ms: i64) {
    for (ordinal, item) in items.iter_mut().enumerate() {
        item.inserted_at = Some(now_ms);
        item.insertion_ordinal = Some(ordinal);
    }
}
