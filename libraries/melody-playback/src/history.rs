//! Listening history
//!
//! Every successfully resolved play is recorded through [`MusicHistory`].
//! [`RecentHistory`] is the bundled bounded implementation.

use crate::types::MusicItem;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Sink for plays that reached the engine
pub trait MusicHistory: Send + Sync {
    fn add_music(&self, item: &MusicItem);
}

/// Bounded, de-duplicated history (most recent first)
///
/// Replaying an item moves it to the front instead of adding a second
/// entry. Once full, the oldest entry is discarded.
#[derive(Debug)]
pub struct RecentHistory {
    items: Mutex<VecDeque<MusicItem>>,
    max_size: usize,
}

impl RecentHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(max_size.min(1024))),
            max_size,
        }
    }

    /// Snapshot, most recent first
    pub fn items(&self) -> Vec<MusicItem> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<MusicItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MusicHistory for RecentHistory {
    fn add_music(&self, item: &MusicItem) {
        if self.max_size == 0 {
            return;
        }

        let mut items = self.lock();
        items.retain(|existing| !existing.is_same(item));
        items.push_front(item.clone());
        items.truncate(self.max_size);
    }
}

impl Default for RecentHistory {
    fn default() -> Self {
        Self::new(500)
    }
}
