//! Player events
//!
//! Typed notifications for UI synchronization. Events are emitted when:
//! - The current item changes (including being cleared)
//! - Progress is reset for a new track or synced from the engine
//! - The engine runs past the last real track
//! - The queue, repeat mode or quality change

use crate::types::{MusicItem, QualityTier, RepeatMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

/// Events emitted by the player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// Current item changed; `None` when the player went idle
    CurrentMusicChanged(Option<MusicItem>),

    /// Transport position update
    ProgressChanged {
        position: Duration,
        duration: Duration,
    },

    /// The active track finished and the look-ahead slot was reached
    PlaybackEnded,

    /// Queue contents changed
    QueueChanged {
        /// New queue length
        len: usize,
    },

    /// Repeat mode changed
    RepeatModeChanged(RepeatMode),

    /// Quality tier actually in use changed
    QualityChanged(QualityTier),
}

const EVENT_CAPACITY: usize = 64;

/// Fan-out of [`PlayerEvent`]s to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: PlayerEvent) {
        if let Err(err) = self.sender.send(event) {
            tracing::trace!(event = ?err.0, "No event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
