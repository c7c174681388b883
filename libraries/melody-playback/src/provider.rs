//! Plugin provider contracts
//!
//! Providers turn a logical [`MusicItem`] into a concrete [`MediaSource`]
//! for a requested tier. The player never sees a provider error: the
//! resolver logs it and moves on to the next strategy.

use crate::session::PlayToken;
use crate::types::{MediaSource, MusicInfo, MusicItem, QualityTier};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Provider failures
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider's backend could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// Any other provider-side failure
    #[error("Provider error: {0}")]
    Other(String),
}

impl ProviderError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Source provider for one platform
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Resolve a playable source for the tier, or `None` when unavailable
    async fn get_media_source(
        &self,
        item: &MusicItem,
        quality: QualityTier,
        timeout_hint: Option<Duration>,
    ) -> Result<Option<MediaSource>, ProviderError>;

    /// Richer metadata for the item, if the provider offers any
    async fn get_music_info(&self, _item: &MusicItem) -> Result<Option<MusicInfo>, ProviderError> {
        Ok(None)
    }
}

/// Lookup of the provider responsible for an item
pub trait PluginRegistry: Send + Sync {
    fn provider_for(&self, item: &MusicItem) -> Option<Arc<dyn MediaProvider>>;
}

/// Registry keyed by the item's platform name
#[derive(Default, Clone)]
pub struct PlatformRegistry {
    providers: HashMap<String, Arc<dyn MediaProvider>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, platform: impl Into<String>, provider: Arc<dyn MediaProvider>) {
        self.providers.insert(platform.into(), provider);
    }

    #[must_use]
    pub fn with(mut self, platform: impl Into<String>, provider: Arc<dyn MediaProvider>) -> Self {
        self.register(platform, provider);
        self
    }

    pub fn platforms(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl PluginRegistry for PlatformRegistry {
    fn provider_for(&self, item: &MusicItem) -> Option<Arc<dyn MediaProvider>> {
        self.providers.get(&item.platform).cloned()
    }
}

/// Search for a substitute when an item can not be resolved
#[async_trait]
pub trait SimilarMusicFinder: Send + Sync {
    /// Find a similar track
    ///
    /// Implementations should stop early and return `None` once `token`
    /// is no longer current.
    async fn find_similar(&self, item: &MusicItem, token: &PlayToken) -> Option<MusicItem>;
}
