//! Melody - headless driver for the play queue

mod catalog;
mod engine;

use anyhow::Context;
use catalog::QueueFile;
use clap::{Parser, Subcommand, ValueEnum};
use engine::SimulatedEngine;
use melody_playback::status::{
    KEY_MUSIC_ITEM, KEY_PLAY_LIST, KEY_PROGRESS, KEY_QUALITY, KEY_RATE, KEY_REPEAT_MODE,
};
use melody_playback::{
    JsonFileStatusStore, MediaKey, MusicItem, PlatformRegistry, Player, PlayerConfig, PlayerEvent,
    QualityTier, RepeatMode, ResolvedTrack, StaticDeviceInfo, StatusStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "melody")]
#[command(about = "Drive the Melody play queue against a simulated engine", long_about = None)]
struct Cli {
    /// Player status file
    #[arg(long, global = true, default_value = "melody-status.json")]
    state: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the queue with a queue file and play through it
    Play {
        /// Queue file (JSON)
        queue: PathBuf,

        /// Index of the first track to play
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Stop after this many tracks have finished [default: queue length]
        #[arg(long)]
        tracks: Option<usize>,

        /// Simulated length of every track, in seconds
        #[arg(long, default_value_t = 3.0)]
        track_secs: f64,

        /// Repeat mode to switch to before playing
        #[arg(long, value_enum)]
        repeat: Option<RepeatArg>,
    },
    /// Show the persisted player state
    Status,
    /// Empty the queue and forget the current track
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum RepeatArg {
    Queue,
    Single,
    Shuffle,
}

impl From<RepeatArg> for RepeatMode {
    fn from(arg: RepeatArg) -> Self {
        match arg {
            RepeatArg::Queue => Self::Queue,
            RepeatArg::Single => Self::Single,
            RepeatArg::Shuffle => Self::Shuffle,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "melody=info,melody_playback=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            queue,
            start,
            tracks,
            track_secs,
            repeat,
        } => {
            let track_time = Duration::try_from_secs_f64(track_secs)
                .context("--track-secs must be a non-negative number")?;
            let options = PlayOptions {
                start,
                tracks,
                track_time,
                repeat: repeat.map(RepeatMode::from),
            };
            play(cli.config.as_deref(), &cli.state, &queue, options).await?;
        }
        Commands::Status => {
            status(&cli.state)?;
        }
        Commands::Clear => {
            clear(cli.config.as_deref(), &cli.state).await?;
        }
    }

    Ok(())
}

struct PlayOptions {
    start: usize,
    tracks: Option<usize>,
    track_time: Duration,
    repeat: Option<RepeatMode>,
}

fn build_player(
    config: Option<&Path>,
    state: &Path,
    registry: PlatformRegistry,
    track_time: Duration,
) -> anyhow::Result<Player> {
    let config = PlayerConfig::load(config)?;
    let status = JsonFileStatusStore::open(state)?;
    tracing::debug!(path = %status.path().display(), "Status file opened");

    let player = Player::builder(Arc::new(SimulatedEngine::new(track_time)), Arc::new(registry))
        .config(config)
        .status_store(Arc::new(status))
        .device(Arc::new(StaticDeviceInfo::app(
            "Melody CLI",
            env!("CARGO_PKG_VERSION"),
        )))
        .build()?;
    Ok(player)
}

async fn play(
    config: Option<&Path>,
    state: &Path,
    queue: &Path,
    options: PlayOptions,
) -> anyhow::Result<()> {
    let file = QueueFile::load(queue)?;
    let first = file.tracks.get(options.start).cloned().with_context(|| {
        format!(
            "--start {} is outside a queue of {} tracks",
            options.start,
            file.tracks.len()
        )
    })?;
    let limit = options.tracks.unwrap_or(file.tracks.len());

    let player = build_player(config, state, file.registry(), options.track_time)?;
    player.setup().await?;
    if let Some(mode) = options.repeat {
        player.set_repeat_mode(mode).await?;
    }

    let mut events = player.subscribe();
    player.play_with_replace_play_list(first, file.tracks).await?;
    tracing::info!(
        tracks = player.play_list().len(),
        mode = ?player.repeat_mode(),
        "Queue loaded"
    );

    // A track that never ends means the player halted after a failure
    let stall_limit = options.track_time * 2 + Duration::from_secs(5);
    let mut finished = 0;
    let mut announced: Option<MediaKey> = None;

    while finished < limit {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            event = tokio::time::timeout(stall_limit, events.recv()) => event,
        };

        match event {
            Ok(Ok(PlayerEvent::CurrentMusicChanged(Some(item)))) => {
                if announced.as_ref() != Some(&item.key()) {
                    println!("Now playing {item}");
                    announced = Some(item.key());
                }
            }
            // A track left over from the last run is dropped by the new queue
            Ok(Ok(PlayerEvent::CurrentMusicChanged(None))) if announced.is_none() => {}
            Ok(Ok(PlayerEvent::CurrentMusicChanged(None))) => {
                tracing::info!("Player went idle");
                break;
            }
            Ok(Ok(PlayerEvent::PlaybackEnded)) => finished += 1,
            Ok(Ok(PlayerEvent::QualityChanged(quality))) => {
                tracing::debug!(%quality, "Quality in use");
            }
            Ok(Ok(_)) => {}
            Ok(Err(RecvError::Lagged(skipped))) => {
                tracing::warn!(skipped, "Player events lagged");
            }
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => {
                tracing::warn!("No track finished in time, stopping");
                break;
            }
        }
    }

    player.pause().await?;
    let progress = player.sync_progress().await?;
    tracing::info!(finished, position = ?progress.position, "Stopped");
    Ok(())
}

fn status(state: &Path) -> anyhow::Result<()> {
    let status: Arc<dyn StatusStore> = Arc::new(JsonFileStatusStore::open(state)?);

    let queue: Vec<MusicItem> = status.get_as(KEY_PLAY_LIST).unwrap_or_default();
    let current: Option<ResolvedTrack> = status.get_as(KEY_MUSIC_ITEM);
    let mode: RepeatMode = status.get_as(KEY_REPEAT_MODE).unwrap_or_default();
    let quality: QualityTier = status.get_as(KEY_QUALITY).unwrap_or_default();
    let progress: f64 = status.get_as(KEY_PROGRESS).unwrap_or_default();
    let rate: f64 = status.get_as(KEY_RATE).unwrap_or(100.0);

    println!("Status file: {}", state.display());
    match &current {
        Some(track) => {
            println!("Current: {} at {progress:.1}s", track.item);
            println!("Source:  {} ({})", track.url, track.quality);
        }
        None => println!("Current: none"),
    }
    println!("Repeat:  {mode:?}");
    println!("Quality: {quality}");
    println!("Rate:    {:.2}x", rate / 100.0);
    println!("Queue:   {} tracks", queue.len());

    for (index, item) in queue.iter().enumerate() {
        let marker = if current.as_ref().is_some_and(|t| t.item.is_same(item)) {
            '>'
        } else {
            ' '
        };
        println!("{marker} {index:>4}  {item}");
    }
    Ok(())
}

async fn clear(config: Option<&Path>, state: &Path) -> anyhow::Result<()> {
    let player = build_player(config, state, PlatformRegistry::new(), Duration::ZERO)?;
    player.clear().await?;
    println!("Cleared {}", state.display());
    Ok(())
}
