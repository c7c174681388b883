//! Identity index over a queue
//!
//! Maps each item's `(platform, id)` key to its position. The map is
//! rebuilt wholesale from a slice and never patched in place, so it can
//! not drift from the sequence it was built from.

use crate::types::{MediaKey, MusicItem};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct MediaIndexMap {
    positions: HashMap<MediaKey, usize>,
}

impl MediaIndexMap {
    /// Build the index for a sequence
    ///
    /// If a key appears more than once the first position wins, matching
    /// what a linear `position()` scan would return.
    pub fn build(items: &[MusicItem]) -> Self {
        let mut positions = HashMap::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            positions.entry(item.key()).or_insert(index);
        }
        Self { positions }
    }

    pub fn get(&self, item: &MusicItem) -> Option<usize> {
        self.get_key(&item.key())
    }

    pub fn get_key(&self, key: &MediaKey) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn has(&self, item: &MusicItem) -> bool {
        self.positions.contains_key(&item.key())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
