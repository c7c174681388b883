//! Adapter between the player and the native engine
//!
//! The engine always holds exactly two slots:
//!
//! ```text
//! slot 0: resolved track, or a placeholder while resolution runs
//! slot 1: look-ahead sentinel (a copy of the next item, or of the
//!         current one in SINGLE mode, pointing at a dummy url)
//! ```
//!
//! When the engine advances from slot 0 into the sentinel the current
//! track has finished. The sentinel urls and marker never leave this
//! module: callers work with [`QueueSlot`] and [`SlotContent`].

use crate::engine::{EngineError, EngineEvent, EngineTrack, NativeEngine};
use crate::types::{MusicItem, PlaybackState, Progress, ResolvedTrack};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const LOOKAHEAD_URL: &str = "melody://lookahead";
const PLACEHOLDER_URL: &str = "melody://proposed";
const LOOKAHEAD_MARKER: &str = "melody.lookahead";

/// What to put into slot 0
#[derive(Debug, Clone, PartialEq)]
pub enum QueueSlot {
    /// A playable track; `cold_start` tags a track restored at startup
    Resolved {
        track: ResolvedTrack,
        cold_start: bool,
    },
    /// Stand-in while the source is being resolved
    Placeholder(MusicItem),
}

/// Decoded content of an engine slot
#[derive(Debug, Clone, PartialEq)]
pub enum SlotContent {
    /// A resolved, playable track
    Real {
        track: ResolvedTrack,
        cold_start: bool,
    },
    /// Stand-in for an item still being resolved
    Placeholder(MusicItem),
    /// The unresolved look-ahead entry in slot 1
    Lookahead,
}

impl SlotContent {
    /// Resolved track for `item`, if this slot holds one
    pub fn real_for(&self, item: &MusicItem) -> Option<&ResolvedTrack> {
        match self {
            Self::Real { track, .. } if track.item.is_same(item) => Some(track),
            _ => None,
        }
    }
}

/// Decode an engine track back into slot content
pub fn decode(track: &EngineTrack) -> Option<SlotContent> {
    if track.marker.as_deref() == Some(LOOKAHEAD_MARKER) || track.url == LOOKAHEAD_URL {
        return Some(SlotContent::Lookahead);
    }

    let item = track.item.clone()?;
    if track.url == PLACEHOLDER_URL {
        return Some(SlotContent::Placeholder(item));
    }
    if track.url.is_empty() {
        return None;
    }

    Some(SlotContent::Real {
        track: ResolvedTrack {
            item,
            url: track.url.clone(),
            headers: track.headers.clone(),
            stream_type: track.stream_type,
            user_agent: track.user_agent.clone(),
            quality: track.quality.unwrap_or_default(),
        },
        cold_start: track.cold_start,
    })
}

/// Whether an event is the engine moving from slot 0 into the sentinel
pub fn reached_lookahead(event: &EngineEvent) -> bool {
    match event {
        EngineEvent::ActiveTrackChanged {
            index: Some(1),
            last_index: Some(0),
            track: Some(track),
        } => matches!(decode(track), Some(SlotContent::Lookahead)),
        _ => false,
    }
}

fn display_item(item: &MusicItem) -> MusicItem {
    let mut item = item.clone();
    if item.artwork.as_deref().is_some_and(|a| a.trim().is_empty()) {
        item.artwork = None;
    }
    item
}

fn encode_slot(slot: QueueSlot, user_agent: &str) -> EngineTrack {
    match slot {
        QueueSlot::Resolved { track, cold_start } => EngineTrack {
            url: track.url,
            item: Some(display_item(&track.item)),
            headers: track.headers,
            user_agent: user_agent.to_string(),
            stream_type: track.stream_type,
            quality: Some(track.quality),
            marker: None,
            cold_start,
        },
        QueueSlot::Placeholder(item) => EngineTrack {
            url: PLACEHOLDER_URL.to_string(),
            item: Some(display_item(&item)),
            user_agent: user_agent.to_string(),
            ..EngineTrack::default()
        },
    }
}

fn encode_lookahead(item: Option<&MusicItem>, user_agent: &str) -> EngineTrack {
    EngineTrack {
        url: LOOKAHEAD_URL.to_string(),
        item: item.map(|item| display_item(&item.without_playable_fields())),
        user_agent: user_agent.to_string(),
        marker: Some(LOOKAHEAD_MARKER.to_string()),
        ..EngineTrack::default()
    }
}

pub struct Transport {
    engine: Arc<dyn NativeEngine>,
    user_agent: String,
}

impl Transport {
    pub fn new(engine: Arc<dyn NativeEngine>, user_agent: impl Into<String>) -> Self {
        Self {
            engine,
            user_agent: user_agent.into(),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Replace both slots
    pub async fn load(
        &self,
        slot: QueueSlot,
        lookahead: Option<&MusicItem>,
    ) -> Result<(), EngineError> {
        let current = encode_slot(slot, &self.user_agent);
        let next = encode_lookahead(lookahead, &self.user_agent);
        self.engine.set_queue(vec![current, next]).await
    }

    /// Re-point the sentinel slot after the queue or repeat mode changed
    pub async fn refresh_lookahead(&self, lookahead: Option<&MusicItem>) -> Result<(), EngineError> {
        self.engine
            .update_metadata_for_track(1, encode_lookahead(lookahead, &self.user_agent))
            .await
    }

    /// Rewrite slot 0's metadata, dropping any cold-start tag
    pub async fn update_current(&self, track: &ResolvedTrack) -> Result<(), EngineError> {
        let encoded = encode_slot(
            QueueSlot::Resolved {
                track: track.clone(),
                cold_start: false,
            },
            &self.user_agent,
        );
        self.engine.update_metadata_for_track(0, encoded).await
    }

    pub async fn slot(&self, index: usize) -> Result<Option<SlotContent>, EngineError> {
        Ok(self.engine.track(index).await?.as_ref().and_then(decode))
    }

    pub async fn active_slot(&self) -> Result<Option<SlotContent>, EngineError> {
        Ok(self.engine.active_track().await?.as_ref().and_then(decode))
    }

    pub async fn active_index(&self) -> Result<Option<usize>, EngineError> {
        self.engine.active_track_index().await
    }

    pub async fn setup(&self) -> Result<(), EngineError> {
        self.engine.setup().await
    }

    pub async fn play(&self) -> Result<(), EngineError> {
        self.engine.play().await
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        self.engine.pause().await
    }

    pub async fn seek_to(&self, position: Duration) -> Result<(), EngineError> {
        self.engine.seek_to(position).await
    }

    pub async fn skip(&self, index: usize) -> Result<(), EngineError> {
        self.engine.skip(index).await
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        self.engine.reset().await
    }

    pub async fn set_rate(&self, rate: f32) -> Result<(), EngineError> {
        self.engine.set_rate(rate).await
    }

    pub async fn rate(&self) -> Result<f32, EngineError> {
        self.engine.rate().await
    }

    pub async fn progress(&self) -> Result<Progress, EngineError> {
        self.engine.progress().await
    }

    pub async fn playback_state(&self) -> Result<PlaybackState, EngineError> {
        self.engine.playback_state().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.engine.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QualityTier, StreamType};
    use std::collections::BTreeMap;

    fn resolved(id: &str) -> ResolvedTrack {
        ResolvedTrack {
            item: MusicItem::new("p", id),
            url: format!("https://cdn/{id}.m3u8"),
            headers: BTreeMap::new(),
            stream_type: Some(StreamType::Hls),
            user_agent: String::new(),
            quality: QualityTier::High,
        }
    }

    const UA: &str = "Melody/1.0";

    #[test]
    fn resolved_slot_round_trips() {
        let encoded = encode_slot(
            QueueSlot::Resolved {
                track: resolved("1"),
                cold_start: true,
            },
            UA,
        );

        assert_eq!(encoded.user_agent, UA);
        match decode(&encoded) {
            Some(SlotContent::Real { track, cold_start }) => {
                assert!(cold_start);
                assert_eq!(track.quality, QualityTier::High);
                assert_eq!(track.stream_type, Some(StreamType::Hls));
                assert_eq!(track.user_agent, UA);
            }
            other => panic!("unexpected slot: {other:?}"),
        }
    }

    #[test]
    fn placeholder_is_not_real() {
        let encoded = encode_slot(QueueSlot::Placeholder(MusicItem::new("p", "1")), UA);

        let decoded = decode(&encoded);
        assert!(matches!(decoded, Some(SlotContent::Placeholder(_))));
        assert!(decoded
            .and_then(|d| d.real_for(&MusicItem::new("p", "1")).cloned())
            .is_none());
    }

    #[test]
    fn lookahead_strips_playable_fields() {
        let mut next = MusicItem::new("p", "2").with_url("https://cdn/2.mp3");
        next.artwork = Some("  ".to_string());

        let encoded = encode_lookahead(Some(&next), UA);
        let item = encoded.item.clone().unwrap();

        assert_eq!(item.id, "2");
        assert!(item.url.is_none());
        assert!(item.artwork.is_none());
        assert_eq!(decode(&encoded), Some(SlotContent::Lookahead));
    }

    #[test]
    fn empty_lookahead_is_bare_sentinel() {
        let encoded = encode_lookahead(None, UA);
        assert!(encoded.item.is_none());
        assert_eq!(decode(&encoded), Some(SlotContent::Lookahead));
    }

    #[test]
    fn reaching_sentinel_is_detected() {
        let sentinel = encode_lookahead(None, UA);
        let real = encode_slot(
            QueueSlot::Resolved {
                track: resolved("1"),
                cold_start: false,
            },
            UA,
        );

        assert!(reached_lookahead(&EngineEvent::ActiveTrackChanged {
            index: Some(1),
            last_index: Some(0),
            track: Some(sentinel.clone()),
        }));
        assert!(!reached_lookahead(&EngineEvent::ActiveTrackChanged {
            index: Some(1),
            last_index: Some(0),
            track: Some(real),
        }));
        assert!(!reached_lookahead(&EngineEvent::ActiveTrackChanged {
            index: Some(0),
            last_index: None,
            track: Some(sentinel),
        }));
    }
}
