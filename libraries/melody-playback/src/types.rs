//! Core types for queue management and source resolution

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Platform name used by items that live in the local library
pub const LOCAL_PLATFORM: &str = "local";

/// Identity of a music item within a queue
///
/// Two items are the same track when both platform and id match,
/// regardless of any other metadata they carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaKey {
    /// Plugin platform the item belongs to
    pub platform: String,
    /// Id within that platform
    pub id: String,
}

impl MediaKey {
    pub fn new(platform: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.platform)
    }
}

/// Named bitrate/format bucket, ordered from lowest to highest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Smallest bitrate
    Low,
    /// Default streaming quality
    #[default]
    Standard,
    /// High bitrate
    High,
    /// Lossless or best available
    Super,
}

impl QualityTier {
    /// All tiers, lowest first
    pub const ALL: [QualityTier; 4] = [Self::Low, Self::Standard, Self::High, Self::Super];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Standard => "standard",
            Self::High => "high",
            Self::Super => "super",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown quality tier: {s}"))
    }
}

/// Direction in which fallback tiers are tried after the preferred one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityOrder {
    /// Higher tiers first, then lower ones
    #[default]
    Asc,
    /// Lower tiers first, then higher ones
    Desc,
}

/// Build the tier search sequence for a preferred tier
///
/// The preferred tier always comes first. With [`QualityOrder::Asc`] the
/// better tiers follow (ascending), then the worse ones from nearest to
/// farthest; [`QualityOrder::Desc`] walks down first and then up.
pub fn quality_search_order(preferred: QualityTier, order: QualityOrder) -> Vec<QualityTier> {
    let split = QualityTier::ALL
        .iter()
        .position(|tier| *tier == preferred)
        .unwrap_or(0);
    let lower = QualityTier::ALL[..split].iter().rev().copied();
    let higher = QualityTier::ALL[split + 1..].iter().copied();

    let mut sequence = Vec::with_capacity(QualityTier::ALL.len());
    sequence.push(preferred);
    match order {
        QualityOrder::Asc => sequence.extend(higher.chain(lower)),
        QualityOrder::Desc => sequence.extend(lower.chain(higher)),
    }
    sequence
}

/// Repeat mode
///
/// SHUFFLE doubles as a repeat mode: the queue is permuted on entry and
/// restored to insertion order on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepeatMode {
    /// Loop the whole queue in order
    #[default]
    Queue,

    /// Loop the current track
    Single,

    /// Loop the whole queue in shuffled order
    Shuffle,
}

impl RepeatMode {
    /// Next mode in the toggle cycle SHUFFLE -> SINGLE -> QUEUE -> SHUFFLE
    pub fn toggled(self) -> Self {
        match self {
            Self::Shuffle => Self::Single,
            Self::Single => Self::Queue,
            Self::Queue => Self::Shuffle,
        }
    }
}

/// A concrete, streamable location for a track
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaSource {
    /// Stream url
    pub url: String,

    /// Request headers the stream requires
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl MediaSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Streaming format hint handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    /// Progressive download
    Default,
    /// HTTP Live Streaming playlist (`.m3u8`)
    Hls,
}

/// Logical, provider-agnostic reference to a playable track
///
/// Identity is the `(platform, id)` pair; see [`MusicItem::key`].
/// `inserted_at` and `insertion_ordinal` are queue bookkeeping stamped on
/// insertion and only used to restore the original order after a shuffle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MusicItem {
    /// Plugin platform; `"local"` for the local library
    pub platform: String,
    /// Id within the platform
    pub id: String,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Display artist
    #[serde(default)]
    pub artist: String,

    /// Album name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,

    /// Track length, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,

    /// Cover art url
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork: Option<String>,

    /// Sources embedded by the plugin layer, keyed by tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<BTreeMap<QualityTier, MediaSource>>,

    /// Direct url, used as a last resort at standard quality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Downloaded copy on disk, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,

    /// Epoch milliseconds of the batch insertion that queued this item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_at: Option<i64>,

    /// Position within its insertion batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insertion_ordinal: Option<usize>,
}

impl MusicItem {
    pub fn new(platform: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, tier: QualityTier, source: MediaSource) -> Self {
        self.source
            .get_or_insert_with(BTreeMap::new)
            .insert(tier, source);
        self
    }

    pub fn key(&self) -> MediaKey {
        MediaKey::new(self.platform.clone(), self.id.clone())
    }

    /// Structural identity comparison on `(platform, id)`
    pub fn is_same(&self, other: &MusicItem) -> bool {
        self.platform == other.platform && self.id == other.id
    }

    /// Whether the item can play without touching the network
    pub fn is_local(&self) -> bool {
        self.platform == LOCAL_PLATFORM || self.local_path.is_some()
    }

    /// Embedded source for a tier, ignoring entries without a url
    pub fn embedded_source(&self, tier: QualityTier) -> Option<&MediaSource> {
        self.source
            .as_ref()
            .and_then(|sources| sources.get(&tier))
            .filter(|source| !source.url.is_empty())
    }

    /// Copy with everything that could make it playable removed
    #[must_use]
    pub fn without_playable_fields(&self) -> Self {
        Self {
            source: None,
            url: None,
            local_path: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for MusicItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: \"{} - {}\"", self.key(), self.artist, self.title)
    }
}

/// Partial metadata returned by a provider's info lookup
///
/// Every field is optional; only the fields present overwrite the track's.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MusicInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub artwork: Option<String>,
    pub duration: Option<Duration>,
    /// Replacement stream url; blank values are ignored
    pub url: Option<String>,
    /// Replacement request headers
    pub headers: Option<BTreeMap<String, String>>,
}

/// A music item merged with the source it resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTrack {
    /// The queue item, with any provider metadata merged in
    pub item: MusicItem,
    /// Stream url handed to the engine
    pub url: String,

    /// Request headers for the stream
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// HLS when the url points at an `.m3u8` playlist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<StreamType>,

    /// App user agent stamped at load time
    #[serde(default)]
    pub user_agent: String,

    /// Tier the url was resolved at
    #[serde(default)]
    pub quality: QualityTier,
}

impl ResolvedTrack {
    pub fn key(&self) -> MediaKey {
        self.item.key()
    }

    /// Overlay provider metadata while keeping identity and a usable url
    #[must_use]
    pub fn merged_with(mut self, info: MusicInfo) -> Self {
        if let Some(title) = info.title {
            self.item.title = title;
        }
        if let Some(artist) = info.artist {
            self.item.artist = artist;
        }
        if info.album.is_some() {
            self.item.album = info.album;
        }
        if info.artwork.is_some() {
            self.item.artwork = info.artwork;
        }
        if info.duration.is_some() {
            self.item.duration = info.duration;
        }
        if let Some(url) = info.url.filter(|url| !url.trim().is_empty()) {
            self.stream_type = crate::resolver::sniff_stream_type(&url);
            self.url = url;
        }
        if let Some(headers) = info.headers {
            self.headers = headers;
        }
        self
    }
}

/// Transport state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Nothing loaded
    #[default]
    None,

    /// Loaded and ready to start
    Ready,

    /// Loading/buffering before playing
    Loading,

    /// Rebuffering mid-track
    Buffering,

    /// Currently playing
    Playing,

    /// Paused mid-track
    Paused,

    /// Stopped, queue kept
    Stopped,

    /// Reached the end of the queue
    Ended,

    /// Failed
    Error,
}

impl PlaybackState {
    /// Whether the engine is not actively producing audio
    pub fn is_paused(self) -> bool {
        !matches!(self, Self::Playing | Self::Buffering | Self::Loading)
    }
}

/// Position within the active track
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    /// Elapsed playback time
    pub position: Duration,
    /// Total length; zero when unknown
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascending_order_tries_better_tiers_first() {
        assert_eq!(
            quality_search_order(QualityTier::Standard, QualityOrder::Asc),
            vec![
                QualityTier::Standard,
                QualityTier::High,
                QualityTier::Super,
                QualityTier::Low
            ]
        );
    }

    #[test]
    fn descending_order_tries_worse_tiers_first() {
        assert_eq!(
            quality_search_order(QualityTier::High, QualityOrder::Desc),
            vec![
                QualityTier::High,
                QualityTier::Standard,
                QualityTier::Low,
                QualityTier::Super
            ]
        );
    }

    #[test]
    fn search_order_covers_every_tier_once() {
        for tier in QualityTier::ALL {
            for order in [QualityOrder::Asc, QualityOrder::Desc] {
                let mut sequence = quality_search_order(tier, order);
                assert_eq!(sequence[0], tier);
                sequence.sort();
                assert_eq!(sequence, QualityTier::ALL.to_vec());
            }
        }
    }

    #[test]
    fn repeat_toggle_cycles_through_all_modes() {
        assert_eq!(RepeatMode::Shuffle.toggled(), RepeatMode::Single);
        assert_eq!(RepeatMode::Single.toggled(), RepeatMode::Queue);
        assert_eq!(RepeatMode::Queue.toggled(), RepeatMode::Shuffle);
    }

    #[test]
    fn identity_ignores_metadata() {
        let a = MusicItem::new("netease", "1").with_title("One");
        let b = MusicItem::new("netease", "1").with_title("Uno");
        let c = MusicItem::new("qq", "1").with_title("One");

        assert!(a.is_same(&b));
        assert!(!a.is_same(&c));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn embedded_source_skips_empty_urls() {
        let item = MusicItem::new("p", "1")
            .with_source(QualityTier::Low, MediaSource::new(""))
            .with_source(QualityTier::High, MediaSource::new("https://cdn/high.mp3"));

        assert!(item.embedded_source(QualityTier::Low).is_none());
        assert_eq!(
            item.embedded_source(QualityTier::High).map(|s| s.url.as_str()),
            Some("https://cdn/high.mp3")
        );
    }

    #[test]
    fn merge_keeps_url_when_info_url_is_blank() {
        let track = ResolvedTrack {
            item: MusicItem::new("p", "1").with_title("Old"),
            url: "https://cdn/a.mp3".to_string(),
            headers: BTreeMap::new(),
            stream_type: None,
            user_agent: "ua".to_string(),
            quality: QualityTier::Standard,
        };

        let merged = track.merged_with(MusicInfo {
            title: Some("New".to_string()),
            url: Some("   ".to_string()),
            ..MusicInfo::default()
        });

        assert_eq!(merged.item.title, "New");
        assert_eq!(merged.url, "https://cdn/a.mp3");
        assert_eq!(merged.key(), MediaKey::new("p", "1"));
    }

    #[test]
    fn merge_retags_stream_type_for_new_url() {
        let track = ResolvedTrack {
            item: MusicItem::new("p", "1"),
            url: "https://cdn/a.mp3".to_string(),
            headers: BTreeMap::new(),
            stream_type: None,
            user_agent: "ua".to_string(),
            quality: QualityTier::Standard,
        };

        let hls = track.merged_with(MusicInfo {
            url: Some("https://cdn/live/index.m3u8?token=1".to_string()),
            ..MusicInfo::default()
        });
        assert_eq!(hls.stream_type, Some(StreamType::Hls));

        let plain = hls.merged_with(MusicInfo {
            url: Some("https://cdn/b.mp3".to_string()),
            ..MusicInfo::default()
        });
        assert_eq!(plain.stream_type, None);
    }

    #[test]
    fn paused_states() {
        assert!(!PlaybackState::Playing.is_paused());
        assert!(!PlaybackState::Buffering.is_paused());
        assert!(PlaybackState::Paused.is_paused());
        assert!(PlaybackState::Stopped.is_paused());
    }

    #[test]
    fn quality_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<QualityTier>(), Ok(QualityTier::High));
        assert!("ultra".parse::<QualityTier>().is_err());
    }
}
