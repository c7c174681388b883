//! Queue files and the provider backed by them
//!
//! A queue file lists the tracks to play and, optionally, per-tier sources
//! and extra metadata keyed by track id:
//!
//! ```json
//! {
//!   "tracks": [{ "platform": "demo", "id": "1", "title": "Intro" }],
//!   "sources": { "1": { "standard": { "url": "https://cdn.example/1.mp3" } } },
//!   "info": { "1": { "artist": "Someone" } }
//! }
//! ```

use anyhow::Context;
use async_trait::async_trait;
use melody_playback::{
    MediaProvider, MediaSource, MusicInfo, MusicItem, PlatformRegistry, ProviderError,
    QualityTier, LOCAL_PLATFORM,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueFile {
    pub tracks: Vec<MusicItem>,

    #[serde(default)]
    pub sources: HashMap<String, BTreeMap<QualityTier, MediaSource>>,

    #[serde(default)]
    pub info: HashMap<String, MusicInfo>,
}

impl QueueFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read queue file {}", path.display()))?;
        let file: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid queue file {}", path.display()))?;
        anyhow::ensure!(!file.tracks.is_empty(), "Queue file has no tracks");
        Ok(file)
    }

    /// Registry serving every non-local platform named in the file
    pub fn registry(&self) -> PlatformRegistry {
        let provider: Arc<dyn MediaProvider> = Arc::new(CatalogProvider {
            sources: self.sources.clone(),
            info: self.info.clone(),
        });

        let platforms: HashSet<&str> = self
            .tracks
            .iter()
            .map(|t| t.platform.as_str())
            .filter(|p| *p != LOCAL_PLATFORM)
            .collect();

        platforms
            .into_iter()
            .fold(PlatformRegistry::new(), |registry, platform| {
                registry.with(platform, Arc::clone(&provider))
            })
    }
}

/// Provider answering from the queue file's tables
struct CatalogProvider {
    sources: HashMap<String, BTreeMap<QualityTier, MediaSource>>,
    info: HashMap<String, MusicInfo>,
}

#[async_trait]
impl MediaProvider for CatalogProvider {
    async fn get_media_source(
        &self,
        item: &MusicItem,
        quality: QualityTier,
        _timeout_hint: Option<Duration>,
    ) -> Result<Option<MediaSource>, ProviderError> {
        let source = self
            .sources
            .get(&item.id)
            .and_then(|tiers| tiers.get(&quality))
            .cloned();
        debug!(item = %item.key(), %quality, found = source.is_some(), "Catalog lookup");
        Ok(source)
    }

    async fn get_music_info(&self, item: &MusicItem) -> Result<Option<MusicInfo>, ProviderError> {
        Ok(self.info.get(&item.id).cloned())
    }
}
