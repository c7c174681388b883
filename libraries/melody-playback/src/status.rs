//! Durable key-value status storage
//!
//! Player state survives restarts through a small key-value store holding
//! JSON values. No transactions or schema versions: each key is written
//! independently and unreadable values are treated as missing.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Playback rate, in percent
pub const KEY_RATE: &str = "music.rate";

/// Queue contents, including insertion stamps
pub const KEY_PLAY_LIST: &str = "music.playList";

/// Repeat mode
pub const KEY_REPEAT_MODE: &str = "music.repeatMode";

/// Position in the current track, in seconds
pub const KEY_PROGRESS: &str = "music.progress";

/// Last track handed to the engine
pub const KEY_MUSIC_ITEM: &str = "music.musicItem";

/// Quality tier last obtained
pub const KEY_QUALITY: &str = "music.quality";

/// Key-value persistence for player status
pub trait StatusStore: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Store a value; `None` removes the key
    fn set(&self, key: &str, value: Option<serde_json::Value>) -> Result<()>;
}

impl dyn StatusStore {
    /// Read and deserialize a value, treating malformed data as missing
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring unreadable status value");
                None
            }
        }
    }

    pub fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, Some(serde_json::to_value(value)?))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.set(key, None)
    }
}

/// In-memory store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Option<serde_json::Value>) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        match value {
            Some(value) => values.insert(key.to_string(), value),
            None => values.remove(key),
        };
        Ok(())
    }
}

/// Write-through store backed by a single JSON object on disk
#[derive(Debug)]
pub struct JsonFileStatusStore {
    path: PathBuf,
    values: Mutex<serde_json::Map<String, serde_json::Value>>,
}

impl JsonFileStatusStore {
    /// Open the store, starting empty if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => serde_json::Map::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::Map::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), keys = values.len(), "Opened status file");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl StatusStore for JsonFileStatusStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Option<serde_json::Value>) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        match value {
            Some(value) => values.insert(key.to_string(), value),
            None => values.remove(key),
        };
        self.flush(&values)
    }
}
