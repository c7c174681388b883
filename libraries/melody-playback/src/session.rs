//! In-memory playback session
//!
//! Owns the queue, the current item and the derived current index. The
//! current index is never stored independently: it is recomputed from the
//! current item after every mutation, and a mutation that drops the current
//! item from the queue clears it, so the index is `None` exactly when there
//! is no current item.
//!
//! Every change of current item bumps a shared generation counter.
//! [`PlayToken`]s capture the generation they were issued under; async
//! work checks [`PlayToken::is_current`] before any side effect.

use crate::queue::PlayQueue;
use crate::types::{MusicItem, QualityTier, RepeatMode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Staleness token for one resolution chain
#[derive(Debug, Clone)]
pub struct PlayToken {
    generation: u64,
    counter: Arc<AtomicU64>,
}

impl PlayToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer current item has been set since issue
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::Acquire) == self.generation
    }
}

/// Result of removing an item from the session
#[derive(Debug, Clone, PartialEq)]
pub enum RemoveOutcome {
    /// Item was not queued
    Absent,
    /// A non-current item was removed
    NonCurrent,
    /// The current item was removed and replaced by the one that slid
    /// into its position
    CurrentReplaced(MusicItem),
    /// The current item was the last one
    Emptied,
}

#[derive(Debug)]
pub struct Session {
    queue: PlayQueue,
    current: Option<MusicItem>,
    current_index: Option<usize>,
    repeat_mode: RepeatMode,
    quality: QualityTier,
    generation: Arc<AtomicU64>,
}

impl Session {
    pub fn new(max_queue_len: usize) -> Self {
        Self {
            queue: PlayQueue::new(max_queue_len),
            current: None,
            current_index: None,
            repeat_mode: RepeatMode::default(),
            quality: QualityTier::default(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    pub fn current(&self) -> Option<&MusicItem> {
        self.current.as_ref()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn quality(&self) -> QualityTier {
        self.quality
    }

    pub fn set_quality(&mut self, quality: QualityTier) {
        self.quality = quality;
    }

    pub fn set_max_queue_len(&mut self, max_len: usize) {
        self.queue.set_max_len(max_len);
    }

    pub fn is_current(&self, item: &MusicItem) -> bool {
        self.current.as_ref().is_some_and(|c| c.is_same(item))
    }

    /// Token bound to the current generation
    pub fn token(&self) -> PlayToken {
        PlayToken {
            generation: self.generation.load(Ordering::Acquire),
            counter: Arc::clone(&self.generation),
        }
    }

    /// Insert a batch; returns whether the shrink evicted the current item
    pub fn add_all(
        &mut self,
        items: Vec<MusicItem>,
        before: Option<usize>,
        shuffle: bool,
        now_ms: i64,
    ) -> bool {
        self.queue.add_all(items, before, shuffle, now_ms);
        self.drop_evicted_current()
    }

    /// Replace the queue wholesale, keeping items' existing stamps
    ///
    /// Returns whether the current item was left out.
    pub fn replace_queue(&mut self, items: Vec<MusicItem>, anchor: usize) -> bool {
        self.queue.replace(items, anchor);
        self.drop_evicted_current()
    }

    /// Remove an item, repairing the current item if it was removed
    pub fn remove(&mut self, item: &MusicItem) -> RemoveOutcome {
        let was_current = self.is_current(item);
        let previous_index = self.current_index;

        if self.queue.remove(item).is_none() {
            return RemoveOutcome::Absent;
        }

        if !was_current {
            self.refresh_index();
            return RemoveOutcome::NonCurrent;
        }

        match self.queue.len() {
            0 => {
                self.set_current(None);
                RemoveOutcome::Emptied
            }
            len => {
                let slot = previous_index.unwrap_or(0) % len;
                let next = self.queue.get(slot).cloned();
                self.set_current(next.clone());
                next.map_or(RemoveOutcome::Emptied, RemoveOutcome::CurrentReplaced)
            }
        }
    }

    /// Switch repeat mode, reordering only on a SHUFFLE edge
    ///
    /// Returns whether the queue order changed.
    pub fn set_repeat_mode(&mut self, mode: RepeatMode) -> bool {
        let was_shuffle = self.repeat_mode == RepeatMode::Shuffle;
        let is_shuffle = mode == RepeatMode::Shuffle;
        let reordered = was_shuffle != is_shuffle;

        if reordered {
            if is_shuffle {
                self.queue.shuffle();
            } else {
                self.queue.unshuffle();
            }
        }

        self.repeat_mode = mode;
        self.refresh_index();
        reordered
    }

    /// Set the current item, returning a token for the new generation
    ///
    /// When the item is queued the queued copy is stored, so insertion
    /// stamps survive.
    pub fn set_current(&mut self, item: Option<MusicItem>) -> PlayToken {
        self.current = item.map(|item| self.queue.find(&item).cloned().unwrap_or(item));
        self.refresh_index();
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.token()
    }

    /// Overlay metadata onto the current item without a generation bump
    pub fn update_current_metadata(&mut self, item: &MusicItem) {
        if let Some(current) = self.current.as_mut().filter(|c| c.is_same(item)) {
            let inserted_at = current.inserted_at;
            let insertion_ordinal = current.insertion_ordinal;
            *current = MusicItem {
                inserted_at,
                insertion_ordinal,
                ..item.clone()
            };
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.set_current(None);
    }

    /// Neighbour of the current index with wrap-around
    ///
    /// A missing current index counts as 0 when stepping backwards.
    pub fn neighbor(&self, offset: isize) -> Option<&MusicItem> {
        let target = match self.current_index {
            Some(index) => index as isize + offset,
            None if offset < 0 => 0,
            None => offset - 1,
        };
        self.queue.get_wrapped(target)
    }

    /// Item to put in the engine's look-ahead slot
    pub fn lookahead_item(&self) -> Option<&MusicItem> {
        let index = self.current_index.map_or(-1, |i| i as isize);
        match self.repeat_mode {
            RepeatMode::Single => self.current_index.and_then(|i| self.queue.get(i)),
            RepeatMode::Queue | RepeatMode::Shuffle => self.queue.get_wrapped(index + 1),
        }
    }

    /// A current item outside the queue becomes no current item
    fn drop_evicted_current(&mut self) -> bool {
        match &self.current {
            Some(current) if !self.queue.contains(current) => {
                self.set_current(None);
                true
            }
            _ => {
                self.refresh_index();
                false
            }
        }
    }

    fn refresh_index(&mut self) {
        self.current_index = self.current.as_ref().and_then(|c| self.queue.position(c));
    }
}
