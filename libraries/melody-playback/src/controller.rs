//! Playback session controller
//!
//! [`Player`] is the façade the host talks to. It sequences queue
//! mutations, source resolution and engine commands, and reacts to engine
//! events (end of track, playback errors) from a single listener task.
//!
//! States are behavioural rather than an explicit enum:
//!
//! ```text
//! Idle        no current item
//! Priming     current item set, engine holds a placeholder
//! Playing     engine holds the resolved track (playing or paused)
//! Recovering  resolution or playback failed; skip or halt
//! ```
//!
//! Every change of current item starts a new generation. A resolution
//! chain carries the [`PlayToken`] of the generation it started under and
//! abandons itself, without side effects, as soon as the token goes stale.

use crate::config::PlayerConfig;
use crate::engine::{EngineError, EngineEvent, NativeEngine};
use crate::error::{PlayerError, Result};
use crate::events::{EventBus, PlayerEvent};
use crate::history::{MusicHistory, RecentHistory};
use crate::provider::{PluginRegistry, SimilarMusicFinder};
use crate::queue::{dedup_by_identity, shrink_to_window};
use crate::resolver::{sniff_stream_type, SourceResolver};
use crate::services::{DialogKind, DialogService, LogDialogs, NetworkStatus, Unmetered};
use crate::session::{PlayToken, RemoveOutcome};
use crate::shuffle::{shuffle_items, stamp_batch};
use crate::status::{
    MemoryStatusStore, StatusStore, KEY_MUSIC_ITEM, KEY_PLAY_LIST, KEY_PROGRESS, KEY_QUALITY,
    KEY_RATE, KEY_REPEAT_MODE,
};
use crate::store::PlayerStore;
use crate::transport::{reached_lookahead, QueueSlot, SlotContent, Transport};
use crate::types::{MusicItem, PlaybackState, Progress, QualityTier, RepeatMode, ResolvedTrack};
use crate::user_agent::{app_user_agent, DeviceInfo, StaticDeviceInfo};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Engine error messages that never trigger failure recovery
const BENIGN_ERRORS: &[&str] = &["android-io-file-not-found"];

/// Saved position worth seeking to after a restart
fn restored_position(seconds: f64) -> Option<Duration> {
    if seconds <= 0.0 {
        return None;
    }
    match Duration::try_from_secs_f64(seconds) {
        Ok(position) => Some(position),
        Err(e) => {
            warn!(seconds, error = %e, "Ignoring unusable restored progress");
            None
        }
    }
}

/// Handle to the player; cheap to clone
#[derive(Clone)]
pub struct Player {
    inner: Arc<Inner>,
}

struct Inner {
    config: RwLock<PlayerConfig>,
    store: PlayerStore,
    transport: Transport,
    resolver: SourceResolver,
    history: Arc<dyn MusicHistory>,
    network: Arc<dyn NetworkStatus>,
    dialogs: Arc<dyn DialogService>,
    listening: AtomicBool,
    consecutive_failures: AtomicUsize,
}

/// Builder for [`Player`]
pub struct PlayerBuilder {
    config: PlayerConfig,
    engine: Arc<dyn NativeEngine>,
    registry: Arc<dyn PluginRegistry>,
    similar: Option<Arc<dyn SimilarMusicFinder>>,
    status: Option<Arc<dyn StatusStore>>,
    history: Option<Arc<dyn MusicHistory>>,
    network: Option<Arc<dyn NetworkStatus>>,
    dialogs: Option<Arc<dyn DialogService>>,
    device: Option<Arc<dyn DeviceInfo>>,
}

impl PlayerBuilder {
    #[must_use]
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn similar_music(mut self, finder: Arc<dyn SimilarMusicFinder>) -> Self {
        self.similar = Some(finder);
        self
    }

    #[must_use]
    pub fn status_store(mut self, status: Arc<dyn StatusStore>) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn history(mut self, history: Arc<dyn MusicHistory>) -> Self {
        self.history = Some(history);
        self
    }

    #[must_use]
    pub fn network(mut self, network: Arc<dyn NetworkStatus>) -> Self {
        self.network = Some(network);
        self
    }

    #[must_use]
    pub fn dialogs(mut self, dialogs: Arc<dyn DialogService>) -> Self {
        self.dialogs = Some(dialogs);
        self
    }

    #[must_use]
    pub fn device(mut self, device: Arc<dyn DeviceInfo>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn build(self) -> Result<Player> {
        self.config.validate()?;

        let device = self.device.unwrap_or_else(|| {
            Arc::new(StaticDeviceInfo::app("Melody", env!("CARGO_PKG_VERSION")))
        });
        let user_agent = app_user_agent(device.as_ref());
        let status = self
            .status
            .unwrap_or_else(|| Arc::new(MemoryStatusStore::new()));
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(RecentHistory::new(self.config.history_size)));

        let inner = Inner {
            store: PlayerStore::new(self.config.max_queue_len, status, EventBus::new()),
            transport: Transport::new(self.engine, user_agent),
            resolver: SourceResolver::new(self.registry, self.similar),
            history,
            network: self.network.unwrap_or_else(|| Arc::new(Unmetered)),
            dialogs: self.dialogs.unwrap_or_else(|| Arc::new(LogDialogs)),
            config: RwLock::new(self.config),
            listening: AtomicBool::new(false),
            consecutive_failures: AtomicUsize::new(0),
        };

        Ok(Player {
            inner: Arc::new(inner),
        })
    }
}

impl Player {
    pub fn builder(
        engine: Arc<dyn NativeEngine>,
        registry: Arc<dyn PluginRegistry>,
    ) -> PlayerBuilder {
        PlayerBuilder {
            config: PlayerConfig::default(),
            engine,
            registry,
            similar: None,
            status: None,
            history: None,
            network: None,
            dialogs: None,
            device: None,
        }
    }

    // ===== State =====

    pub fn config(&self) -> PlayerConfig {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the configuration; later operations see the new values
    pub fn update_config(&self, config: PlayerConfig) -> Result<()> {
        config.validate()?;
        self.inner.store.set_max_queue_len(config.max_queue_len);
        *self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.inner.store.events().subscribe()
    }

    pub fn user_agent(&self) -> &str {
        self.inner.transport.user_agent()
    }

    pub fn current_music(&self) -> Option<MusicItem> {
        self.inner.store.current_music()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.inner.store.current_index()
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.inner.store.repeat_mode()
    }

    pub fn quality(&self) -> QualityTier {
        self.inner.store.quality()
    }

    pub fn play_list(&self) -> Vec<MusicItem> {
        self.inner.store.play_list()
    }

    pub fn is_play_list_empty(&self) -> bool {
        self.inner.store.read(|s| s.queue().is_empty())
    }

    pub fn is_in_play_list(&self, item: &MusicItem) -> bool {
        self.inner.store.read(|s| s.queue().contains(item))
    }

    pub fn music_index_in_play_list(&self, item: &MusicItem) -> Option<usize> {
        self.inner.store.read(|s| s.queue().position(item))
    }

    pub fn is_current_music(&self, item: &MusicItem) -> bool {
        self.inner.store.is_current(item)
    }

    /// Queue item at `index`, wrapping in both directions
    pub fn play_list_music_at(&self, index: isize) -> Option<MusicItem> {
        self.inner
            .store
            .read(|s| s.queue().get_wrapped(index).cloned())
    }

    pub fn previous_music(&self) -> Option<MusicItem> {
        self.neighbour_of_current(-1)
    }

    pub fn next_music(&self) -> Option<MusicItem> {
        self.neighbour_of_current(1)
    }

    fn neighbour_of_current(&self, offset: isize) -> Option<MusicItem> {
        self.inner.store.read(|s| {
            s.current()?;
            s.neighbor(offset).cloned()
        })
    }

    // ===== Queue =====

    /// Insert a batch before `before`, or append when `None`
    /// Insert a batch
    ///
    /// When the queue cap pushes the current item out, the player goes idle
    /// and the transport is reset.
    pub async fn add_all(
        &self,
        items: Vec<MusicItem>,
        before: Option<usize>,
        shuffle: bool,
    ) -> Result<()> {
        if self.inner.store.add_all(items, before, shuffle) {
            info!("Current music evicted by the queue cap, going idle");
            self.inner.transport.reset().await?;
        }
        Ok(())
    }

    pub async fn add(&self, items: Vec<MusicItem>, before: Option<usize>) -> Result<()> {
        self.add_all(items, before, false).await
    }

    /// Insert right after the current item
    ///
    /// Starts playing the first inserted item if the queue was empty.
    pub async fn add_next(&self, items: Vec<MusicItem>) -> Result<()> {
        let was_empty = self.is_play_list_empty();
        let first = items.first().cloned();
        let before = self.current_index().map_or(0, |index| index + 1);

        self.add(items, Some(before)).await?;

        match first {
            Some(first) if was_empty => self.play(Some(first), false).await,
            _ => Ok(()),
        }
    }

    pub async fn remove(&self, item: &MusicItem) -> Result<()> {
        match self.inner.store.remove(item) {
            RemoveOutcome::Absent | RemoveOutcome::NonCurrent => Ok(()),
            RemoveOutcome::Emptied => {
                self.inner.transport.reset().await?;
                Ok(())
            }
            RemoveOutcome::CurrentReplaced(next) => {
                let resume = match self.inner.transport.playback_state().await {
                    Ok(state) => !state.is_paused(),
                    Err(e) => {
                        debug!(error = %e, "Playback state unavailable, not resuming");
                        false
                    }
                };

                if resume {
                    self.play(Some(next), true).await
                } else {
                    self.inner.transport.reset().await?;
                    Ok(())
                }
            }
        }
    }

    /// Replace the queue with `list` and play `item`
    pub async fn play_with_replace_play_list(
        &self,
        item: MusicItem,
        list: Vec<MusicItem>,
    ) -> Result<()> {
        if list.is_empty() {
            return Ok(());
        }

        let config = self.config();
        let list = dedup_by_identity(list);
        let anchor = list.iter().position(|it| it.is_same(&item)).unwrap_or(0);
        let mut list = shrink_to_window(list, anchor, config.max_queue_len);

        stamp_batch(&mut list, self.inner.store.next_stamp());
        if self.repeat_mode() == RepeatMode::Shuffle {
            shuffle_items(&mut list);
        }

        let anchor = list.iter().position(|it| it.is_same(&item)).unwrap_or(0);
        self.inner.store.replace_play_list(list, anchor);
        self.play(Some(item), true).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.inner.store.clear();
        self.inner.transport.reset().await?;
        Ok(())
    }

    pub async fn toggle_repeat_mode(&self) -> Result<()> {
        self.set_repeat_mode(self.repeat_mode().toggled()).await
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.inner.store.set_repeat_mode(mode);
        self.refresh_lookahead().await;
        Ok(())
    }

    async fn refresh_lookahead(&self) {
        let lookahead = self.inner.store.read(|s| s.lookahead_item().cloned());
        if let Err(e) = self
            .inner
            .transport
            .refresh_lookahead(lookahead.as_ref())
            .await
        {
            debug!(error = %e, "Could not refresh look-ahead slot");
        }
    }

    // ===== Playback =====

    /// Play `item`, or re-resolve the current item when `None`
    ///
    /// With neither an item nor a current item the head of the queue is
    /// played.
    ///
    /// Empty queues and superseded requests complete silently. A cellular
    /// block raises the dialog and returns [`PlayerError::CellularForbidden`].
    /// Exhausted sources go through failure recovery, which either skips
    /// ahead or halts with [`PlayerError::InvalidSource`].
    pub async fn play(&self, item: Option<MusicItem>, force_play: bool) -> Result<()> {
        match self.try_play(item.clone(), force_play).await {
            Err(e) if e.is_not_initialized() => {
                info!("Engine not initialized, setting up and retrying");
                self.inner.transport.setup().await?;
                let retried = self.try_play(item, force_play).await;
                self.settle(retried).await
            }
            outcome => self.settle(outcome).await,
        }
    }

    async fn settle(&self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => Ok(()),
            Err(PlayerError::Superseded) => {
                debug!("Play request superseded");
                Ok(())
            }
            Err(PlayerError::PlayListEmpty) => {
                debug!("Nothing to play");
                Ok(())
            }
            Err(PlayerError::CellularForbidden) => {
                let dialogs = &self.inner.dialogs;
                if dialogs.current() != Some(DialogKind::CellularBlocked) {
                    dialogs.show(DialogKind::CellularBlocked);
                }
                Err(PlayerError::CellularForbidden)
            }
            Err(e @ PlayerError::InvalidSource(_)) => {
                info!(error = %e, "Source resolution failed");
                let token = self.inner.store.token();
                self.handle_play_failure(e, token).await
            }
            Err(e) => Err(e),
        }
    }

    async fn try_play(&self, item: Option<MusicItem>, force_play: bool) -> Result<()> {
        let item = item
            .or_else(|| self.current_music())
            .or_else(|| self.play_list_music_at(0))
            .ok_or(PlayerError::PlayListEmpty)?;
        let config = self.config();
        let transport = &self.inner.transport;

        if self.inner.network.is_cellular() && !config.allow_cellular_playback && !item.is_local()
        {
            transport.reset().await?;
            return Err(PlayerError::CellularForbidden);
        }

        if self.is_current_music(&item) {
            let loaded = transport
                .slot(0)
                .await?
                .and_then(|slot| slot.real_for(&item).cloned());
            if let Some(track) = loaded {
                debug!(item = %item.key(), "Already loaded, resuming");
                return self.resume_loaded(track, force_play).await;
            }
        }

        if !self.is_in_play_list(&item) {
            self.add(vec![item.clone()], None).await?;
        }

        let token = self.inner.store.set_current(Some(item.clone()));
        let item = self.current_music().unwrap_or(item);
        let lookahead = self.inner.store.read(|s| s.lookahead_item().cloned());

        transport
            .load(QueueSlot::Placeholder(item.clone()), lookahead.as_ref())
            .await?;
        self.inner.store.events().emit(PlayerEvent::ProgressChanged {
            position: Duration::ZERO,
            duration: item.duration.unwrap_or_default(),
        });

        let track = self
            .inner
            .resolver
            .resolve(&item, &config, &token, transport.user_agent())
            .await?;
        if !token.is_current() {
            return Err(PlayerError::Superseded);
        }

        self.inner.store.set_quality(track.quality);
        self.inner.history.add_music(&item);
        info!(item = %item.key(), quality = %track.quality, "Playing");
        self.set_track_source(track.clone(), true, false).await?;
        self.inner.consecutive_failures.store(0, Ordering::Release);

        self.enrich(track, &token).await
    }

    /// Merge provider metadata over the loaded track
    async fn enrich(&self, track: ResolvedTrack, token: &PlayToken) -> Result<()> {
        let Some(info) = self.inner.resolver.fetch_info(&track.item).await else {
            return Ok(());
        };
        if !token.is_current() {
            return Ok(());
        }

        let merged = track.merged_with(info);
        self.inner.store.update_current_metadata(&merged.item);
        self.inner.transport.update_current(&merged).await?;
        Ok(())
    }

    async fn resume_loaded(&self, track: ResolvedTrack, force_play: bool) -> Result<()> {
        let transport = &self.inner.transport;

        if transport.active_index().await? != Some(0) {
            transport.skip(0).await?;
        }
        if force_play {
            transport.seek_to(Duration::ZERO).await?;
        }

        let state = transport.playback_state().await?;
        if state == PlaybackState::Stopped {
            self.set_track_source(track, false, false).await?;
        }
        if state != PlaybackState::Playing {
            transport.play().await?;
        }
        Ok(())
    }

    /// Hand a resolved track to the engine with a fresh look-ahead slot
    async fn set_track_source(
        &self,
        track: ResolvedTrack,
        autoplay: bool,
        cold_start: bool,
    ) -> Result<()> {
        let lookahead = self.inner.store.read(|s| s.lookahead_item().cloned());
        self.inner.store.persist_track(&track);
        self.inner
            .transport
            .load(QueueSlot::Resolved { track, cold_start }, lookahead.as_ref())
            .await?;
        if autoplay {
            self.inner.transport.play().await?;
        }
        Ok(())
    }

    pub async fn skip_to_next(&self) -> Result<()> {
        self.skip_by(1).await
    }

    pub async fn skip_to_previous(&self) -> Result<()> {
        self.skip_by(-1).await
    }

    async fn skip_by(&self, offset: isize) -> Result<()> {
        let target = self.inner.store.read(|s| s.neighbor(offset).cloned());
        match target {
            Some(target) => self.play(Some(target), true).await,
            None => {
                self.inner.store.set_current(None);
                self.inner.transport.reset().await?;
                Ok(())
            }
        }
    }

    /// Switch the current track to another tier, keeping position and state
    pub async fn change_quality(&self, quality: QualityTier) -> Result<()> {
        if quality == self.quality() {
            return Ok(());
        }
        let item = self.current_music().ok_or(PlayerError::PlayListEmpty)?;
        let token = self.inner.store.token();
        let transport = &self.inner.transport;

        let progress = transport.progress().await?;
        let source = self
            .inner
            .resolver
            .resolve_tier(&item, quality)
            .await
            .ok_or_else(|| PlayerError::invalid_source(&item))?;

        if !token.is_current() {
            debug!(item = %item.key(), "Quality change superseded");
            return Ok(());
        }

        let state = transport.playback_state().await?;
        let track = ResolvedTrack {
            stream_type: sniff_stream_type(&source.url),
            url: source.url,
            headers: source.headers,
            user_agent: transport.user_agent().to_string(),
            quality,
            item,
        };

        self.set_track_source(track, !state.is_paused(), false).await?;
        transport.seek_to(progress.position).await?;
        self.inner.store.set_quality(quality);
        Ok(())
    }

    // ===== Transport =====

    pub async fn pause(&self) -> Result<()> {
        Ok(self.inner.transport.pause().await?)
    }

    pub async fn seek_to(&self, position: Duration) -> Result<()> {
        Ok(self.inner.transport.seek_to(position).await?)
    }

    pub async fn reset(&self) -> Result<()> {
        Ok(self.inner.transport.reset().await?)
    }

    /// Set the playback rate; persisted in percent
    pub async fn set_rate(&self, rate: f32) -> Result<()> {
        self.inner.transport.set_rate(rate).await?;
        self.inner
            .store
            .persist_rate((f64::from(rate) * 100.0).round().max(0.0) as u32);
        Ok(())
    }

    pub async fn rate(&self) -> Result<f32> {
        Ok(self.inner.transport.rate().await?)
    }

    pub async fn progress(&self) -> Result<Progress> {
        Ok(self.inner.transport.progress().await?)
    }

    pub async fn playback_state(&self) -> Result<PlaybackState> {
        Ok(self.inner.transport.playback_state().await?)
    }

    /// Persist the engine position and announce it
    pub async fn sync_progress(&self) -> Result<Progress> {
        let progress = self.inner.transport.progress().await?;
        self.inner
            .store
            .persist_progress(progress.position.as_secs_f64());
        self.inner.store.events().emit(PlayerEvent::ProgressChanged {
            position: progress.position,
            duration: progress.duration,
        });
        Ok(progress)
    }

    // ===== Recovery =====

    /// Decide between skipping ahead and halting after a failure
    ///
    /// `token` is the generation the failure belongs to; once another item
    /// becomes current the recovery stands down.
    ///
    /// Boxed because skipping re-enters [`Player::play`].
    fn handle_play_failure(
        &self,
        cause: PlayerError,
        token: PlayToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let config = self.config();
            if config.auto_stop_on_error {
                info!(error = %cause, "Stopping after failure");
                return Err(cause);
            }

            if !token.is_current() {
                debug!(generation = token.generation(), "Failure already superseded");
                return Ok(());
            }

            let failures = self.inner.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
            let queued = self.inner.store.read(|s| s.queue().len());
            if failures >= queued.max(1) {
                warn!(failures, "Every queued item failed, halting");
                self.inner.consecutive_failures.store(0, Ordering::Release);
                self.inner.transport.reset().await?;
                return Err(cause);
            }

            self.inner.transport.reset().await?;
            tokio::time::sleep(config.failure_debounce()).await;

            if !token.is_current() {
                debug!(generation = token.generation(), "Recovery superseded during debounce");
                return Ok(());
            }
            self.skip_to_next().await
        })
    }

    /// React to one engine event
    pub async fn handle_engine_event(&self, event: EngineEvent) -> Result<()> {
        if reached_lookahead(&event) {
            debug!("Reached look-ahead slot");
            self.inner.store.events().emit(PlayerEvent::PlaybackEnded);
            return match self.repeat_mode() {
                RepeatMode::Single => self.play(None, true).await,
                RepeatMode::Queue | RepeatMode::Shuffle => self.skip_to_next().await,
            };
        }

        match event {
            EngineEvent::PlaybackError { message, code } => {
                self.handle_playback_error(message, code).await
            }
            EngineEvent::ActiveTrackChanged { .. } => Ok(()),
        }
    }

    async fn handle_playback_error(&self, message: String, code: Option<String>) -> Result<()> {
        error!(%message, ?code, "Playback error");
        let token = self.inner.store.token();
        let transport = &self.inner.transport;
        let active = transport.active_slot().await?;

        if let Some(SlotContent::Real {
            track,
            cold_start: true,
        }) = &active
        {
            debug!(item = %track.key(), "Ignoring error on restored track");
            transport.update_current(track).await?;
            return Ok(());
        }

        let benign = BENIGN_ERRORS.contains(&message.as_str())
            || code.as_deref().is_some_and(|c| BENIGN_ERRORS.contains(&c));
        let on_real_track = matches!(active, Some(SlotContent::Real { .. }));

        if on_real_track
            && !message.is_empty()
            && !benign
            && transport.active_index().await? == Some(0)
        {
            let cause = PlayerError::Engine(EngineError::Command(message));
            return self.handle_play_failure(cause, token).await;
        }
        Ok(())
    }

    // ===== Startup =====

    /// Restore persisted state and start listening to the engine
    pub async fn setup(&self) -> Result<()> {
        self.restore().await;
        self.install_listener();
        Ok(())
    }

    async fn restore(&self) {
        let status = Arc::clone(self.inner.store.status());
        let config = self.config();

        if let Some(percent) = status.get_as::<f64>(KEY_RATE).filter(|r| *r > 0.0) {
            if let Err(e) = self.inner.transport.set_rate((percent / 100.0) as f32).await {
                warn!(error = %e, "Could not restore playback rate");
            }
        }

        if let Some(mode) = status.get_as::<RepeatMode>(KEY_REPEAT_MODE) {
            self.inner.store.set_repeat_mode(mode);
        }

        if let Some(list) = status.get_as::<Vec<MusicItem>>(KEY_PLAY_LIST) {
            info!(len = list.len(), "Restoring play list");
            self.inner.store.replace_play_list(list, 0);
        }

        let quality = status
            .get_as::<QualityTier>(KEY_QUALITY)
            .unwrap_or(config.default_quality);
        self.inner.store.set_quality(quality);

        let progress = status
            .get_as::<f64>(KEY_PROGRESS)
            .and_then(restored_position);
        let track = status
            .get_as::<ResolvedTrack>(KEY_MUSIC_ITEM)
            .filter(|track| self.is_in_play_list(&track.item));

        if let Some(track) = track {
            info!(item = %track.key(), "Restoring current music");
            let token = self.inner.store.set_current(Some(track.item.clone()));
            let player = self.clone();
            tokio::spawn(async move {
                player.reload_restored(track, quality, progress, token).await;
            });
        }
    }

    async fn reload_restored(
        &self,
        mut track: ResolvedTrack,
        quality: QualityTier,
        progress: Option<Duration>,
        token: PlayToken,
    ) {
        if let Some(source) = self
            .inner
            .resolver
            .resolve_restored(&track.item, quality)
            .await
        {
            track.url = source.url;
            if !source.headers.is_empty() {
                track.headers = source.headers;
            }
        }
        track.stream_type = sniff_stream_type(&track.url);
        track.user_agent = self.user_agent().to_string();

        if !token.is_current() || track.url.is_empty() {
            debug!(item = %track.key(), "Restored track no longer applicable");
            return;
        }

        let autoplay = self.config().auto_play_on_start;
        if let Err(e) = self.set_track_source(track, autoplay, !autoplay).await {
            warn!(error = %e, "Could not load restored track");
            return;
        }

        if let Some(position) = progress {
            if let Err(e) = self.inner.transport.seek_to(position).await {
                warn!(error = %e, "Could not restore progress");
            }
            self.inner.store.persist_progress(position.as_secs_f64());
        }
    }

    /// Spawn the engine event listener; later calls are no-ops
    fn install_listener(&self) {
        if self.inner.listening.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut events = self.inner.transport.subscribe();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(inner) = weak.upgrade() else { break };
                        let player = Player { inner };
                        if let Err(e) = player.handle_engine_event(event).await {
                            warn!(error = %e, "Engine event handling failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Engine events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Engine listener stopped");
        });
    }
}
