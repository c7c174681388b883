//! Observable player state
//!
//! Wraps the [`Session`] behind a short-lived lock, mirrors every mutation
//! to the [`StatusStore`] and announces it on the [`EventBus`]. Readers get
//! snapshots; nothing here is ever held across an `.await`.

use crate::events::{EventBus, PlayerEvent};
use crate::session::{PlayToken, RemoveOutcome, Session};
use crate::status::{
    StatusStore, KEY_MUSIC_ITEM, KEY_PLAY_LIST, KEY_PROGRESS, KEY_QUALITY, KEY_RATE,
    KEY_REPEAT_MODE,
};
use crate::types::{MusicItem, QualityTier, RepeatMode, ResolvedTrack};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub struct PlayerStore {
    session: Mutex<Session>,
    status: Arc<dyn StatusStore>,
    events: EventBus,
    last_stamp: AtomicI64,
}

impl PlayerStore {
    pub fn new(max_queue_len: usize, status: Arc<dyn StatusStore>, events: EventBus) -> Self {
        Self {
            session: Mutex::new(Session::new(max_queue_len)),
            status,
            events,
            last_stamp: AtomicI64::new(i64::MIN),
        }
    }

    /// Insertion stamp in milliseconds, strictly increasing across batches
    pub fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        now.max(previous.saturating_add(1))
    }

    pub fn status(&self) -> &Arc<dyn StatusStore> {
        &self.status
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run a read-only closure against the session
    pub fn read<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&session)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }

    pub fn current_music(&self) -> Option<MusicItem> {
        self.read(|s| s.current().cloned())
    }

    pub fn current_index(&self) -> Option<usize> {
        self.read(Session::current_index)
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.read(Session::repeat_mode)
    }

    pub fn quality(&self) -> QualityTier {
        self.read(Session::quality)
    }

    pub fn play_list(&self) -> Vec<MusicItem> {
        self.read(|s| s.queue().items().to_vec())
    }

    pub fn is_current(&self, item: &MusicItem) -> bool {
        self.read(|s| s.is_current(item))
    }

    pub fn token(&self) -> PlayToken {
        self.read(Session::token)
    }

    pub fn set_max_queue_len(&self, max_len: usize) {
        self.write(|s| s.set_max_queue_len(max_len));
    }

    /// Insert a batch; returns whether the current item was evicted
    pub fn add_all(&self, items: Vec<MusicItem>, before: Option<usize>, shuffle: bool) -> bool {
        let now_ms = self.next_stamp();
        let (evicted, items) = self.write(|s| {
            let evicted = s.add_all(items, before, shuffle, now_ms);
            (evicted, s.queue().items().to_vec())
        });
        if evicted {
            tracing::debug!("Current music shrunk out of the play list");
            self.current_cleared();
        }
        self.play_list_changed(&items);
        evicted
    }

    /// Replace the queue, keeping the items' existing stamps
    ///
    /// Returns whether the current item was left out.
    pub fn replace_play_list(&self, items: Vec<MusicItem>, anchor: usize) -> bool {
        if let Some(latest) = items.iter().filter_map(|item| item.inserted_at).max() {
            self.last_stamp.fetch_max(latest, Ordering::AcqRel);
        }
        let (evicted, items) = self.write(|s| {
            let evicted = s.replace_queue(items, anchor);
            (evicted, s.queue().items().to_vec())
        });
        if evicted {
            self.current_cleared();
        }
        self.play_list_changed(&items);
        evicted
    }

    pub fn remove(&self, item: &MusicItem) -> RemoveOutcome {
        let (outcome, items) = self.write(|s| {
            let outcome = s.remove(item);
            (outcome, s.queue().items().to_vec())
        });

        match &outcome {
            RemoveOutcome::Absent => return outcome,
            RemoveOutcome::NonCurrent => {}
            RemoveOutcome::CurrentReplaced(next) => {
                self.events
                    .emit(PlayerEvent::CurrentMusicChanged(Some(next.clone())));
            }
            RemoveOutcome::Emptied => self.current_cleared(),
        }
        self.play_list_changed(&items);
        outcome
    }

    /// Set the current item and start a new generation
    pub fn set_current(&self, item: Option<MusicItem>) -> PlayToken {
        let (token, current) = self.write(|s| {
            let token = s.set_current(item);
            (token, s.current().cloned())
        });

        match current {
            Some(current) => {
                tracing::debug!(item = %current.key(), generation = token.generation(), "Current music changed");
                self.events
                    .emit(PlayerEvent::CurrentMusicChanged(Some(current)));
            }
            None => self.current_cleared(),
        }
        token
    }

    /// Replace the current item's metadata if it is still current
    pub fn update_current_metadata(&self, item: &MusicItem) {
        let current = self.write(|s| {
            s.update_current_metadata(item);
            s.current().cloned()
        });
        if current.as_ref().is_some_and(|c| c.is_same(item)) {
            self.events.emit(PlayerEvent::CurrentMusicChanged(current));
        }
    }

    /// Returns whether the queue order changed
    pub fn set_repeat_mode(&self, mode: RepeatMode) -> bool {
        let (reordered, items) = self.write(|s| {
            let reordered = s.set_repeat_mode(mode);
            (reordered, s.queue().items().to_vec())
        });

        if reordered {
            self.play_list_changed(&items);
        }
        self.persist(KEY_REPEAT_MODE, &mode);
        self.events.emit(PlayerEvent::RepeatModeChanged(mode));
        reordered
    }

    pub fn set_quality(&self, quality: QualityTier) {
        self.write(|s| s.set_quality(quality));
        self.persist(KEY_QUALITY, &quality);
        self.events.emit(PlayerEvent::QualityChanged(quality));
    }

    pub fn clear(&self) {
        self.write(Session::clear);
        self.current_cleared();
        self.play_list_changed(&[]);
    }

    /// Record the track just handed to the engine
    pub fn persist_track(&self, track: &ResolvedTrack) {
        self.persist(KEY_MUSIC_ITEM, track);
        self.persist(KEY_PROGRESS, &0.0);
    }

    pub fn persist_progress(&self, seconds: f64) {
        self.persist(KEY_PROGRESS, &seconds);
    }

    pub fn persist_rate(&self, percent: u32) {
        self.persist(KEY_RATE, &percent);
    }

    fn current_cleared(&self) {
        if let Err(e) = self.status.remove(KEY_MUSIC_ITEM) {
            tracing::warn!(error = %e, "Failed to clear persisted music item");
        }
        self.persist(KEY_PROGRESS, &0.0);
        self.events.emit(PlayerEvent::CurrentMusicChanged(None));
    }

    fn play_list_changed(&self, items: &[MusicItem]) {
        self.persist(KEY_PLAY_LIST, items);
        self.events
            .emit(PlayerEvent::QueueChanged { len: items.len() });
    }

    fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.status.set_as(key, value) {
            tracing::warn!(key, error = %e, "Failed to persist player status");
        }
    }
}
