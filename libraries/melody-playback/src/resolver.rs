//! Source resolution pipeline
//!
//! Turns a logical item into a playable [`ResolvedTrack`]:
//!
//! 1. Build the tier search order from the configured default and order.
//! 2. Ask the owning provider for each tier; first hit wins.
//! 3. Fall back to sources embedded in the item, same order.
//! 4. Without a direct url, optionally substitute a similar track and
//!    query its provider; otherwise give up with `InvalidSource`.
//! 5. Use the item's direct url at standard quality.
//! 6. Tag `.m3u8` urls as HLS.
//! 7. Merge the source onto the item.
//!
//! Before every provider call the [`PlayToken`] is checked; a stale token
//! ends the chain with [`PlayerError::Superseded`] and no side effects.

use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::provider::{MediaProvider, PluginRegistry, SimilarMusicFinder};
use crate::session::PlayToken;
use crate::types::{
    quality_search_order, MediaSource, MusicInfo, MusicItem, QualityTier, ResolvedTrack,
    StreamType,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct SourceResolver {
    registry: Arc<dyn PluginRegistry>,
    similar: Option<Arc<dyn SimilarMusicFinder>>,
}

impl SourceResolver {
    pub fn new(
        registry: Arc<dyn PluginRegistry>,
        similar: Option<Arc<dyn SimilarMusicFinder>>,
    ) -> Self {
        Self { registry, similar }
    }

    pub fn provider_for(&self, item: &MusicItem) -> Option<Arc<dyn MediaProvider>> {
        self.registry.provider_for(item)
    }

    /// Resolve a playable track for `item`
    pub async fn resolve(
        &self,
        item: &MusicItem,
        config: &PlayerConfig,
        token: &PlayToken,
        user_agent: &str,
    ) -> Result<ResolvedTrack> {
        let tiers = quality_search_order(config.default_quality, config.quality_order);
        let provider = self.registry.provider_for(item);

        let mut found = match &provider {
            Some(provider) => self.query_tiers(provider.as_ref(), item, &tiers, token).await?,
            None => {
                debug!(item = %item.key(), "No provider for platform");
                None
            }
        };

        if !token.is_current() {
            return Err(PlayerError::Superseded);
        }

        if found.is_none() {
            found = tiers.iter().find_map(|tier| {
                item.embedded_source(*tier)
                    .map(|source| (source.clone(), *tier))
            });
            if let Some((_, tier)) = &found {
                debug!(item = %item.key(), %tier, "Using embedded source");
            }
        }

        if found.is_none() {
            found = match item.url.as_deref().filter(|url| !url.is_empty()) {
                Some(url) => {
                    debug!(item = %item.key(), "Using direct url");
                    Some((MediaSource::new(url), QualityTier::Standard))
                }
                None if config.try_alternate_source_on_failure => {
                    self.resolve_similar(item, &tiers, token).await?
                }
                None => None,
            };
        }

        let Some((source, quality)) = found else {
            warn!(item = %item.key(), "No playable source");
            return Err(PlayerError::invalid_source(item));
        };

        let stream_type = sniff_stream_type(&source.url);
        Ok(ResolvedTrack {
            item: item.clone(),
            url: source.url,
            headers: source.headers,
            stream_type,
            user_agent: user_agent.to_string(),
            quality,
        })
    }

    /// Single-tier lookup with the owning provider
    ///
    /// Errors and empty urls both read as "no source".
    pub async fn resolve_tier(&self, item: &MusicItem, quality: QualityTier) -> Option<MediaSource> {
        let provider = self.registry.provider_for(item)?;
        match provider.get_media_source(item, quality, None).await {
            Ok(source) => source.filter(|s| !s.url.is_empty()),
            Err(e) => {
                debug!(item = %item.key(), %quality, error = %e, "Provider failed");
                None
            }
        }
    }

    /// Source lookup used when restoring at startup
    pub async fn resolve_restored(
        &self,
        item: &MusicItem,
        quality: QualityTier,
    ) -> Option<MediaSource> {
        let provider = self.registry.provider_for(item)?;
        match provider
            .get_media_source(item, quality, Some(Duration::ZERO))
            .await
        {
            Ok(source) => source.filter(|s| !s.url.is_empty()),
            Err(e) => {
                debug!(item = %item.key(), error = %e, "Provider failed during restore");
                None
            }
        }
    }

    /// Provider metadata for the item, with blank urls removed
    pub async fn fetch_info(&self, item: &MusicItem) -> Option<MusicInfo> {
        let provider = self.registry.provider_for(item)?;
        match provider.get_music_info(item).await {
            Ok(Some(mut info)) => {
                if info.url.as_deref().is_some_and(|url| url.trim().is_empty()) {
                    info.url = None;
                }
                Some(info)
            }
            Ok(None) => None,
            Err(e) => {
                debug!(item = %item.key(), error = %e, "Music info lookup failed");
                None
            }
        }
    }

    async fn resolve_similar(
        &self,
        item: &MusicItem,
        tiers: &[QualityTier],
        token: &PlayToken,
    ) -> Result<Option<(MediaSource, QualityTier)>> {
        let Some(finder) = &self.similar else {
            return Ok(None);
        };

        let Some(similar) = finder.find_similar(item, token).await else {
            return Ok(None);
        };
        if !token.is_current() {
            return Err(PlayerError::Superseded);
        }

        info!(item = %item.key(), substitute = %similar.key(), "Trying similar track");
        match self.registry.provider_for(&similar) {
            Some(provider) => self.query_tiers(provider.as_ref(), &similar, tiers, token).await,
            None => Ok(None),
        }
    }

    async fn query_tiers(
        &self,
        provider: &dyn MediaProvider,
        item: &MusicItem,
        tiers: &[QualityTier],
        token: &PlayToken,
    ) -> Result<Option<(MediaSource, QualityTier)>> {
        for &tier in tiers {
            if !token.is_current() {
                debug!(item = %item.key(), generation = token.generation(), "Resolution superseded");
                return Err(PlayerError::Superseded);
            }

            match provider.get_media_source(item, tier, None).await {
                Ok(Some(source)) if !source.url.is_empty() => {
                    debug!(item = %item.key(), %tier, "Resolved source");
                    return Ok(Some((source, tier)));
                }
                Ok(_) => debug!(item = %item.key(), %tier, "No source for tier"),
                Err(e) => debug!(item = %item.key(), %tier, error = %e, "Provider failed"),
            }
        }
        Ok(None)
    }
}

/// Detect HLS playlists by their `.m3u8` extension
///
/// Query strings and fragments are ignored.
pub fn sniff_stream_type(source: &str) -> Option<StreamType> {
    let path = match url::Url::parse(source) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => source
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let is_hls = path
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("m3u8") && !ext.contains('/'));
    is_hls.then_some(StreamType::Hls)
}
