//! Player configuration

use crate::error::{PlayerError, Result};
use crate::queue::DEFAULT_MAX_QUEUE_LEN;
use crate::types::{QualityOrder, QualityTier};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Tier tried first when resolving a source
    #[serde(default)]
    pub default_quality: QualityTier,

    /// Direction of the fallback search after the default tier
    #[serde(default)]
    pub quality_order: QualityOrder,

    /// Stream remote sources over a metered (cellular) connection
    ///
    /// When off, remote plays on cellular are refused and the user is
    /// shown the cellular dialog. Local files are never gated.
    #[serde(default)]
    pub allow_cellular_playback: bool,

    /// Resume the restored track as soon as the player starts
    #[serde(default)]
    pub auto_play_on_start: bool,

    /// Look for a similar track when nothing can be resolved
    #[serde(default)]
    pub try_alternate_source_on_failure: bool,

    /// Halt instead of skipping to the next track on failure
    #[serde(default)]
    pub auto_stop_on_error: bool,

    /// Hard cap on queued items; larger queues are shrunk to a window
    #[serde(default = "default_max_queue_len")]
    pub max_queue_len: usize,

    /// Pause between a failure and the automatic skip
    #[serde(default = "default_failure_debounce_ms")]
    pub failure_debounce_ms: u64,

    /// Entries kept by the bundled listening history
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl PlayerConfig {
    /// Load configuration from an optional file and the environment
    ///
    /// Environment variables are prefixed with `MELODY_`, e.g.
    /// `MELODY_DEFAULT_QUALITY=high`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path.filter(|p| p.exists()) {
            settings = settings.add_source(config::File::from(path.to_path_buf()));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("MELODY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_len < 2 {
            return Err(PlayerError::config(format!(
                "max_queue_len must be at least 2, got {}",
                self.max_queue_len
            )));
        }
        Ok(())
    }

    pub fn failure_debounce(&self) -> Duration {
        Duration::from_millis(self.failure_debounce_ms)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_quality: QualityTier::default(),
            quality_order: QualityOrder::default(),
            allow_cellular_playback: false,
            auto_play_on_start: false,
            try_alternate_source_on_failure: false,
            auto_stop_on_error: false,
            max_queue_len: default_max_queue_len(),
            failure_debounce_ms: default_failure_debounce_ms(),
            history_size: default_history_size(),
        }
    }
}

// Default values
fn default_max_queue_len() -> usize {
    DEFAULT_MAX_QUEUE_LEN
}

fn default_failure_debounce_ms() -> u64 {
    500
}

fn default_history_size() -> usize {
    500
}
