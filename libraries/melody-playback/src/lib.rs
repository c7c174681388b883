//! Melody - Play Queue & Source Resolution
//!
//! Platform-agnostic playback orchestration for Melody.
//!
//! This crate provides:
//! - Bounded, de-duplicated play queue with identity index
//! - Shuffle/unshuffle with stable insertion-order restore
//! - Repeat modes (Queue, Single, Shuffle)
//! - Quality-ordered source resolution with fallbacks
//! - End-of-track detection through a look-ahead engine slot
//! - Failure recovery (skip ahead or halt)
//! - State persistence and restart recovery
//!
//! # Architecture
//!
//! `melody-playback` does not decode or output audio. The host supplies:
//! - A [`NativeEngine`] that plays a two-slot queue
//! - A [`PluginRegistry`] of [`MediaProvider`]s that resolve urls
//! - A [`StatusStore`] for durable key-value state
//!
//! Everything else (network status, dialogs, device info, history) has a
//! default implementation that can be swapped through [`PlayerBuilder`].
//!
//! # Example: Queue and Play
//!
//! ```rust,no_run
//! use melody_playback::{MusicItem, PlatformRegistry, Player};
//! use std::sync::Arc;
//! # async fn example(engine: Arc<dyn melody_playback::NativeEngine>) -> melody_playback::Result<()> {
//! let registry = Arc::new(PlatformRegistry::new());
//! let player = Player::builder(engine, registry).build()?;
//! player.setup().await?;
//!
//! player.add(vec![MusicItem::new("local", "song-1")], None).await?;
//! player.play(None, false).await?;
//! player.skip_to_next().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Repeat Modes
//!
//! ```rust,no_run
//! use melody_playback::{Player, RepeatMode};
//! # async fn example(player: Player) -> melody_playback::Result<()> {
//! // Shuffle permutes the queue; leaving it restores insertion order
//! player.set_repeat_mode(RepeatMode::Shuffle).await?;
//! player.set_repeat_mode(RepeatMode::Queue).await?;
//!
//! // SHUFFLE -> SINGLE -> QUEUE -> SHUFFLE
//! player.toggle_repeat_mode().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod controller;
pub mod engine;
mod error;
mod events;
mod history;
mod index_map;
pub mod provider;
mod queue;
mod resolver;
mod services;
mod session;
mod shuffle;
pub mod status;
mod store;
mod transport;
pub mod types;
mod user_agent;

// Public exports
pub use config::PlayerConfig;
pub use controller::{Player, PlayerBuilder};
pub use engine::{EngineError, EngineEvent, EngineTrack, NativeEngine};
pub use error::{PlayerError, Result};
pub use events::PlayerEvent;
pub use history::{MusicHistory, RecentHistory};
pub use index_map::MediaIndexMap;
pub use provider::{MediaProvider, PlatformRegistry, PluginRegistry, ProviderError, SimilarMusicFinder};
pub use queue::{shrink_to_window, PlayQueue, DEFAULT_MAX_QUEUE_LEN};
pub use resolver::sniff_stream_type;
pub use services::{DialogKind, DialogService, LogDialogs, NetworkStatus, Unmetered};
pub use session::{PlayToken, RemoveOutcome, Session};
pub use status::{JsonFileStatusStore, MemoryStatusStore, StatusStore};
pub use types::{
    quality_search_order, MediaKey, MediaSource, MusicInfo, MusicItem, PlaybackState, Progress,
    QualityOrder, QualityTier, RepeatMode, ResolvedTrack, StreamType, LOCAL_PLATFORM,
};
pub use user_agent::{app_user_agent, DeviceInfo, DevicePlatform, StaticDeviceInfo};
