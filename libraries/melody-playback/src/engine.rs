//! Native engine contract
//!
//! The host runtime supplies the actual audio transport. The player only
//! ever hands it a two-slot queue (see [`crate::transport`]) and reacts to
//! the events it broadcasts.

use crate::types::{MusicItem, PlaybackState, Progress, QualityTier, StreamType};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Engine failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The transport must be set up before use
    #[error("The player is not initialized")]
    NotInitialized,

    /// Any other command failure
    #[error("Engine command failed: {0}")]
    Command(String),
}

impl EngineError {
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }
}

/// Track as the engine sees it
///
/// `marker` and `cold_start` are opaque tags owned by the transport
/// adapter; engines store and report them back untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineTrack {
    /// Stream location; empty for placeholders
    pub url: String,
    /// Queue item this track plays, for now-playing metadata
    pub item: Option<MusicItem>,
    /// Extra request headers for the stream
    pub headers: BTreeMap<String, String>,
    /// User agent to send when fetching the stream
    pub user_agent: String,
    /// Format hint (HLS or progressive)
    pub stream_type: Option<StreamType>,
    /// Tier the url was resolved at
    pub quality: Option<QualityTier>,
    /// Slot tag written by the transport adapter
    pub marker: Option<String>,
    /// Set on a track restored at startup until it first plays
    pub cold_start: bool,
}

/// Events broadcast by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The active queue slot changed
    ActiveTrackChanged {
        /// Slot now active
        index: Option<usize>,
        /// Slot active before the change
        last_index: Option<usize>,
        /// Track in the newly active slot
        track: Option<EngineTrack>,
    },

    /// Playback of the active track failed
    PlaybackError {
        message: String,
        code: Option<String>,
    },
}

/// Audio transport supplied by the host platform
#[async_trait]
pub trait NativeEngine: Send + Sync {
    /// Initialise the transport; called again after [`EngineError::NotInitialized`]
    async fn setup(&self) -> Result<(), EngineError>;

    async fn set_queue(&self, tracks: Vec<EngineTrack>) -> Result<(), EngineError>;

    async fn play(&self) -> Result<(), EngineError>;

    async fn pause(&self) -> Result<(), EngineError>;

    async fn seek_to(&self, position: Duration) -> Result<(), EngineError>;

    /// Make the slot at `index` active
    async fn skip(&self, index: usize) -> Result<(), EngineError>;

    /// Stop and drop the queue
    async fn reset(&self) -> Result<(), EngineError>;

    async fn set_rate(&self, rate: f32) -> Result<(), EngineError>;

    async fn rate(&self) -> Result<f32, EngineError>;

    async fn progress(&self) -> Result<Progress, EngineError>;

    async fn playback_state(&self) -> Result<PlaybackState, EngineError>;

    async fn track(&self, index: usize) -> Result<Option<EngineTrack>, EngineError>;

    async fn active_track(&self) -> Result<Option<EngineTrack>, EngineError>;

    async fn active_track_index(&self) -> Result<Option<usize>, EngineError>;

    /// Replace the metadata of a queued slot without touching playback
    async fn update_metadata_for_track(
        &self,
        index: usize,
        track: EngineTrack,
    ) -> Result<(), EngineError>;

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}
