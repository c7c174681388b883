//! Shared fakes for player integration tests
//!
//! `FakeEngine` records every command and lets tests drive engine events.
//! `ScriptedProvider` serves sources per (id, tier) and can hold a request
//! open until the test releases it.

#![allow(dead_code)]

use async_trait::async_trait;
use melody_playback::{
    DialogKind, DialogService, EngineError, EngineEvent, EngineTrack, MediaProvider, MediaSource,
    MemoryStatusStore, MusicInfo, MusicItem, NativeEngine, NetworkStatus, PlatformRegistry,
    PlayToken, Player, PlayerConfig, PlaybackState, Progress, ProviderError, QualityTier,
    RecentHistory, SimilarMusicFinder, StatusStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

pub const PLATFORM: &str = "test";

pub fn item(id: &str) -> MusicItem {
    MusicItem::new(PLATFORM, id).with_title(format!("Song {id}"))
}

pub fn items(ids: &[&str]) -> Vec<MusicItem> {
    ids.iter().map(|id| item(id)).collect()
}

pub fn ids(items: &[MusicItem]) -> Vec<String> {
    items.iter().map(|i| i.id.clone()).collect()
}

pub fn url_for(id: &str, tier: QualityTier) -> String {
    format!("https://cdn.test/{id}/{tier}.mp3")
}

/// Poll until `condition` holds, failing the test after a while
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// ===== Engine =====

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Setup,
    SetQueue(Vec<String>),
    Play,
    Pause,
    SeekTo(Duration),
    Skip(usize),
    Reset,
    SetRate(f32),
    UpdateMetadata(usize),
}

#[derive(Debug)]
struct EngineState {
    queue: Vec<EngineTrack>,
    active: Option<usize>,
    playback: PlaybackState,
    position: Duration,
    rate: f32,
    initialized: bool,
    fail_state_query: bool,
    commands: Vec<Command>,
}

pub struct FakeEngine {
    state: Mutex<EngineState>,
    events: broadcast::Sender<EngineEvent>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Self::with_initialized(true)
    }

    /// Engine that rejects commands until `setup` is called
    pub fn uninitialized() -> Arc<Self> {
        Self::with_initialized(false)
    }

    fn with_initialized(initialized: bool) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            state: Mutex::new(EngineState {
                queue: Vec::new(),
                active: None,
                playback: PlaybackState::None,
                position: Duration::ZERO,
                rate: 1.0,
                initialized,
                fail_state_query: false,
                commands: Vec::new(),
            }),
            events,
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    fn command(&self, command: Command) -> Result<(), EngineError> {
        self.with_state(|s| {
            if !s.initialized && command != Command::Setup {
                return Err(EngineError::NotInitialized);
            }
            s.commands.push(command);
            Ok(())
        })
    }

    pub fn commands(&self) -> Vec<Command> {
        self.with_state(|s| s.commands.clone())
    }

    pub fn clear_commands(&self) {
        self.with_state(|s| s.commands.clear());
    }

    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.with_state(|s| s.commands.iter().filter(|c| predicate(c)).count())
    }

    pub fn slot(&self, index: usize) -> Option<EngineTrack> {
        self.with_state(|s| s.queue.get(index).cloned())
    }

    pub fn slot_url(&self, index: usize) -> Option<String> {
        self.slot(index).map(|t| t.url)
    }

    pub fn rate_value(&self) -> f32 {
        self.with_state(|s| s.rate)
    }

    pub fn set_playback_state(&self, state: PlaybackState) {
        self.with_state(|s| s.playback = state);
    }

    pub fn set_position(&self, position: Duration) {
        self.with_state(|s| s.position = position);
    }

    pub fn fail_state_query(&self) {
        self.with_state(|s| s.fail_state_query = true);
    }

    /// Advance from slot 0 into slot 1, returning the event sent
    pub fn finish_track(&self) -> EngineEvent {
        let event = self.with_state(|s| {
            s.active = Some(1);
            EngineEvent::ActiveTrackChanged {
                index: Some(1),
                last_index: Some(0),
                track: s.queue.get(1).cloned(),
            }
        });
        let _ = self.events.send(event.clone());
        event
    }

    pub fn fail_playback(&self, message: &str, code: Option<&str>) -> EngineEvent {
        let event = EngineEvent::PlaybackError {
            message: message.to_string(),
            code: code.map(str::to_string),
        };
        let _ = self.events.send(event.clone());
        event
    }
}

#[async_trait]
impl NativeEngine for FakeEngine {
    async fn setup(&self) -> Result<(), EngineError> {
        self.command(Command::Setup)?;
        self.with_state(|s| s.initialized = true);
        Ok(())
    }

    async fn set_queue(&self, tracks: Vec<EngineTrack>) -> Result<(), EngineError> {
        self.command(Command::SetQueue(tracks.iter().map(|t| t.url.clone()).collect()))?;
        self.with_state(|s| {
            s.queue = tracks;
            s.active = Some(0);
            s.position = Duration::ZERO;
            if s.playback != PlaybackState::Playing {
                s.playback = PlaybackState::Ready;
            }
        });
        Ok(())
    }

    async fn play(&self) -> Result<(), EngineError> {
        self.command(Command::Play)?;
        self.with_state(|s| s.playback = PlaybackState::Playing);
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.command(Command::Pause)?;
        self.with_state(|s| s.playback = PlaybackState::Paused);
        Ok(())
    }

    async fn seek_to(&self, position: Duration) -> Result<(), EngineError> {
        self.command(Command::SeekTo(position))?;
        self.with_state(|s| s.position = position);
        Ok(())
    }

    async fn skip(&self, index: usize) -> Result<(), EngineError> {
        self.command(Command::Skip(index))?;
        self.with_state(|s| s.active = Some(index));
        Ok(())
    }

    async fn reset(&self) -> Result<(), EngineError> {
        self.command(Command::Reset)?;
        self.with_state(|s| {
            s.queue.clear();
            s.active = None;
            s.playback = PlaybackState::None;
            s.position = Duration::ZERO;
        });
        Ok(())
    }

    async fn set_rate(&self, rate: f32) -> Result<(), EngineError> {
        self.command(Command::SetRate(rate))?;
        self.with_state(|s| s.rate = rate);
        Ok(())
    }

    async fn rate(&self) -> Result<f32, EngineError> {
        Ok(self.with_state(|s| s.rate))
    }

    async fn progress(&self) -> Result<Progress, EngineError> {
        Ok(self.with_state(|s| Progress {
            position: s.position,
            duration: s
                .queue
                .first()
                .and_then(|t| t.item.as_ref())
                .and_then(|i| i.duration)
                .unwrap_or_default(),
        }))
    }

    async fn playback_state(&self) -> Result<PlaybackState, EngineError> {
        self.with_state(|s| {
            if s.fail_state_query {
                Err(EngineError::command("state unavailable"))
            } else {
                Ok(s.playback)
            }
        })
    }

    async fn track(&self, index: usize) -> Result<Option<EngineTrack>, EngineError> {
        Ok(self.slot(index))
    }

    async fn active_track(&self) -> Result<Option<EngineTrack>, EngineError> {
        Ok(self.with_state(|s| s.active.and_then(|i| s.queue.get(i).cloned())))
    }

    async fn active_track_index(&self) -> Result<Option<usize>, EngineError> {
        Ok(self.with_state(|s| s.active))
    }

    async fn update_metadata_for_track(
        &self,
        index: usize,
        track: EngineTrack,
    ) -> Result<(), EngineError> {
        self.command(Command::UpdateMetadata(index))?;
        self.with_state(|s| match s.queue.get_mut(index) {
            Some(slot) => {
                *slot = track;
                Ok(())
            }
            None => Err(EngineError::command("no such track")),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

// ===== Provider =====

#[derive(Default)]
pub struct ScriptedProvider {
    sources: Mutex<HashMap<(String, QualityTier), MediaSource>>,
    info: Mutex<HashMap<String, MusicInfo>>,
    failing: Mutex<Vec<String>>,
    holds: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<(String, QualityTier)>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, id: &str, tier: QualityTier, url: &str) {
        self.sources
            .lock()
            .unwrap()
            .insert((id.to_string(), tier), MediaSource::new(url));
    }

    /// Serve the conventional url for `id` at `tier`
    pub fn serve_default(&self, id: &str, tier: QualityTier) {
        self.serve(id, tier, &url_for(id, tier));
    }

    pub fn serve_all(&self, ids: &[&str]) {
        for id in ids {
            self.serve_default(id, QualityTier::Standard);
        }
    }

    pub fn set_info(&self, id: &str, info: MusicInfo) {
        self.info.lock().unwrap().insert(id.to_string(), info);
    }

    /// Every source request for `id` errors
    pub fn fail(&self, id: &str) {
        self.failing.lock().unwrap().push(id.to_string());
    }

    /// Block source requests for `id` until [`ScriptedProvider::release`]
    pub fn hold(&self, id: &str) {
        self.holds
            .lock()
            .unwrap()
            .insert(id.to_string(), Arc::new(Notify::new()));
    }

    pub fn release(&self, id: &str) {
        if let Some(gate) = self.holds.lock().unwrap().remove(id) {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> Vec<(String, QualityTier)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(i, _)| i == id).count()
    }
}

#[async_trait]
impl MediaProvider for ScriptedProvider {
    async fn get_media_source(
        &self,
        item: &MusicItem,
        quality: QualityTier,
        _timeout_hint: Option<Duration>,
    ) -> Result<Option<MediaSource>, ProviderError> {
        self.calls.lock().unwrap().push((item.id.clone(), quality));

        let gate = self.holds.lock().unwrap().get(&item.id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing.lock().unwrap().contains(&item.id) {
            return Err(ProviderError::network("connection reset"));
        }
        Ok(self
            .sources
            .lock()
            .unwrap()
            .get(&(item.id.clone(), quality))
            .cloned())
    }

    async fn get_music_info(&self, item: &MusicItem) -> Result<Option<MusicInfo>, ProviderError> {
        Ok(self.info.lock().unwrap().get(&item.id).cloned())
    }
}

// ===== Host services =====

#[derive(Default)]
pub struct FakeNetwork {
    cellular: AtomicBool,
}

impl FakeNetwork {
    pub fn set_cellular(&self, cellular: bool) {
        self.cellular.store(cellular, Ordering::SeqCst);
    }
}

impl NetworkStatus for FakeNetwork {
    fn is_cellular(&self) -> bool {
        self.cellular.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingDialogs {
    current: Mutex<Option<DialogKind>>,
    shown: Mutex<Vec<DialogKind>>,
}

impl RecordingDialogs {
    pub fn shown(&self) -> Vec<DialogKind> {
        self.shown.lock().unwrap().clone()
    }

    pub fn dismiss(&self) {
        *self.current.lock().unwrap() = None;
    }
}

impl DialogService for RecordingDialogs {
    fn current(&self) -> Option<DialogKind> {
        *self.current.lock().unwrap()
    }

    fn show(&self, dialog: DialogKind) {
        *self.current.lock().unwrap() = Some(dialog);
        self.shown.lock().unwrap().push(dialog);
    }
}

/// Similar-track finder that always suggests the same substitute
pub struct FixedSimilar(pub MusicItem);

#[async_trait]
impl SimilarMusicFinder for FixedSimilar {
    async fn find_similar(&self, _item: &MusicItem, token: &PlayToken) -> Option<MusicItem> {
        token.is_current().then(|| self.0.clone())
    }
}

// ===== Harness =====

pub struct Harness {
    pub player: Player,
    pub engine: Arc<FakeEngine>,
    pub provider: Arc<ScriptedProvider>,
    pub status: Arc<dyn StatusStore>,
    pub history: Arc<RecentHistory>,
    pub network: Arc<FakeNetwork>,
    pub dialogs: Arc<RecordingDialogs>,
}

pub struct HarnessBuilder {
    config: PlayerConfig,
    engine: Arc<FakeEngine>,
    status: Arc<dyn StatusStore>,
    registry: PlatformRegistry,
    similar: Option<Arc<dyn SimilarMusicFinder>>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn engine(mut self, engine: Arc<FakeEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn status(mut self, status: Arc<dyn StatusStore>) -> Self {
        self.status = status;
        self
    }

    pub fn provider(mut self, platform: &str, provider: Arc<dyn MediaProvider>) -> Self {
        self.registry.register(platform, provider);
        self
    }

    pub fn similar(mut self, finder: Arc<dyn SimilarMusicFinder>) -> Self {
        self.similar = Some(finder);
        self
    }

    pub fn build(self) -> Harness {
        init_tracing();

        let provider = ScriptedProvider::new();
        let registry = self
            .registry
            .with(PLATFORM, Arc::clone(&provider) as Arc<dyn MediaProvider>);
        let history = Arc::new(RecentHistory::new(50));
        let network = Arc::new(FakeNetwork::default());
        let dialogs = Arc::new(RecordingDialogs::default());

        let mut builder = Player::builder(Arc::clone(&self.engine) as Arc<dyn NativeEngine>, Arc::new(registry))
            .config(self.config)
            .status_store(Arc::clone(&self.status))
            .history(Arc::clone(&history) as Arc<dyn melody_playback::MusicHistory>)
            .network(Arc::clone(&network) as Arc<dyn NetworkStatus>)
            .dialogs(Arc::clone(&dialogs) as Arc<dyn DialogService>);
        if let Some(similar) = self.similar {
            builder = builder.similar_music(similar);
        }

        Harness {
            player: builder.build().unwrap(),
            engine: self.engine,
            provider,
            status: self.status,
            history,
            network,
            dialogs,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: PlayerConfig::default(),
            engine: FakeEngine::new(),
            status: Arc::new(MemoryStatusStore::new()),
            registry: PlatformRegistry::new(),
            similar: None,
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn queue_ids(&self) -> Vec<String> {
        ids(&self.player.play_list())
    }

    pub fn current_id(&self) -> Option<String> {
        self.player.current_music().map(|m| m.id)
    }

    /// Queue `ids`, serve them at standard quality and play the first
    pub async fn playing(&self, queued: &[&str]) {
        self.provider.serve_all(queued);
        self.player.add(items(queued), None).await.unwrap();
        self.player
            .play(Some(item(queued[0])), false)
            .await
            .unwrap();
    }
}
