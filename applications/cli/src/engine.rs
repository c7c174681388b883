//! Simulated audio engine
//!
//! Keeps the two-slot queue in memory and "plays" slot 0 for a fixed time,
//! then advances into slot 1 and reports the transition like a real
//! transport would. Urls with the `error:` scheme fail on play.

use async_trait::async_trait;
use melody_playback::{EngineError, EngineEvent, EngineTrack, NativeEngine, PlaybackState, Progress};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 16;
const FAILING_SCHEME: &str = "error:";

#[derive(Debug)]
struct State {
    initialized: bool,
    queue: Vec<EngineTrack>,
    active: Option<usize>,
    playback: PlaybackState,
    /// Position accumulated before `started_at`
    elapsed: Duration,
    started_at: Option<Instant>,
    rate: f32,
    /// Bumped whenever a pending end-of-track timer becomes invalid
    epoch: u64,
}

impl State {
    fn position(&self) -> Duration {
        let running = self
            .started_at
            .map(|t| t.elapsed().mul_f32(self.rate))
            .unwrap_or_default();
        self.elapsed + running
    }

    fn freeze(&mut self) {
        self.elapsed = self.position();
        self.started_at = None;
        self.epoch += 1;
    }
}

pub struct SimulatedEngine {
    state: Arc<Mutex<State>>,
    events: broadcast::Sender<EngineEvent>,
    track_time: Duration,
}

impl SimulatedEngine {
    pub fn new(track_time: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(State {
                initialized: false,
                queue: Vec::new(),
                active: None,
                playback: PlaybackState::None,
                elapsed: Duration::ZERO,
                started_at: None,
                rate: 1.0,
                epoch: 0,
            })),
            events,
            track_time,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_setup(state: &State) -> Result<(), EngineError> {
        if state.initialized {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    /// Arm the end-of-track timer for the active slot
    fn schedule_end(&self, state: &mut State) {
        state.started_at = Some(Instant::now());
        state.epoch += 1;

        let epoch = state.epoch;
        let remaining = self
            .track_time
            .saturating_sub(state.elapsed)
            .div_f32(state.rate.max(0.1));
        let shared = Arc::clone(&self.state);
        let events = self.events.clone();

        tokio::spawn(async move {
            tokio::time::sleep(remaining).await;

            let event = {
                let mut s = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if s.epoch != epoch || s.playback != PlaybackState::Playing || s.active != Some(0) {
                    return;
                }
                s.active = Some(1);
                s.elapsed = Duration::ZERO;
                s.started_at = None;
                EngineEvent::ActiveTrackChanged {
                    index: Some(1),
                    last_index: Some(0),
                    track: s.queue.get(1).cloned(),
                }
            };

            debug!("Simulated track finished");
            let _ = events.send(event);
        });
    }
}

#[async_trait]
impl NativeEngine for SimulatedEngine {
    async fn setup(&self) -> Result<(), EngineError> {
        let mut state = self.lock();
        if !state.initialized {
            info!(track_time = ?self.track_time, "Simulated engine ready");
            state.initialized = true;
        }
        Ok(())
    }

    async fn set_queue(&self, tracks: Vec<EngineTrack>) -> Result<(), EngineError> {
        let mut state = self.lock();
        Self::require_setup(&state)?;

        state.freeze();
        state.queue = tracks;
        state.active = Some(0);
        state.elapsed = Duration::ZERO;
        state.playback = PlaybackState::Ready;
        Ok(())
    }

    async fn play(&self) -> Result<(), EngineError> {
        let mut state = self.lock();
        Self::require_setup(&state)?;

        let Some(track) = state.active.and_then(|i| state.queue.get(i)).cloned() else {
            return Err(EngineError::command("nothing to play"));
        };
        if track.url.starts_with(FAILING_SCHEME) {
            state.playback = PlaybackState::Error;
            let _ = self.events.send(EngineEvent::PlaybackError {
                message: format!("unsupported source {}", track.url),
                code: Some("simulated-source-error".to_string()),
            });
            return Ok(());
        }

        if state.playback != PlaybackState::Playing {
            state.playback = PlaybackState::Playing;
            self.schedule_end(&mut state);
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.freeze();
        state.playback = PlaybackState::Paused;
        Ok(())
    }

    async fn seek_to(&self, position: Duration) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.freeze();
        state.elapsed = position;
        if state.playback == PlaybackState::Playing {
            self.schedule_end(&mut state);
        }
        Ok(())
    }

    async fn skip(&self, index: usize) -> Result<(), EngineError> {
        let mut state = self.lock();
        if index >= state.queue.len() {
            return Err(EngineError::command(format!("no track at {index}")));
        }
        state.freeze();
        state.active = Some(index);
        state.elapsed = Duration::ZERO;
        if state.playback == PlaybackState::Playing {
            self.schedule_end(&mut state);
        }
        Ok(())
    }

    async fn reset(&self) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.freeze();
        state.queue.clear();
        state.active = None;
        state.elapsed = Duration::ZERO;
        state.playback = PlaybackState::None;
        Ok(())
    }

    async fn set_rate(&self, rate: f32) -> Result<(), EngineError> {
        let mut state = self.lock();
        let playing = state.playback == PlaybackState::Playing;
        state.freeze();
        state.rate = rate;
        if playing {
            self.schedule_end(&mut state);
        }
        Ok(())
    }

    async fn rate(&self) -> Result<f32, EngineError> {
        Ok(self.lock().rate)
    }

    async fn progress(&self) -> Result<Progress, EngineError> {
        let state = self.lock();
        Ok(Progress {
            position: state.position().min(self.track_time),
            duration: self.track_time,
        })
    }

    async fn playback_state(&self) -> Result<PlaybackState, EngineError> {
        Ok(self.lock().playback)
    }

    async fn track(&self, index: usize) -> Result<Option<EngineTrack>, EngineError> {
        Ok(self.lock().queue.get(index).cloned())
    }

    async fn active_track(&self) -> Result<Option<EngineTrack>, EngineError> {
        let state = self.lock();
        Ok(state.active.and_then(|i| state.queue.get(i)).cloned())
    }

    async fn active_track_index(&self) -> Result<Option<usize>, EngineError> {
        Ok(self.lock().active)
    }

    async fn update_metadata_for_track(
        &self,
        index: usize,
        track: EngineTrack,
    ) -> Result<(), EngineError> {
        let mut state = self.lock();
        match state.queue.get_mut(index) {
            Some(slot) => {
                *slot = track;
                Ok(())
            }
            None => Err(EngineError::command(format!("no track at {index}"))),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}
