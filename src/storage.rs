use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::BTreeMap,
    fs, io,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Raw string storage underneath [`KvStore`].
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// A change broadcast to every observer of the store. `new_value` is the
/// serialized JSON, or `None` when the key was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
}

/// One `<key>.json` file per key inside a directory.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Option<String> {
        let path = match self.path_for(key) {
            Ok(path) => path,
            Err(err) => {
                error!("failed to read {key}: {err}");
                return None;
            }
        };
        match fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                error!("failed to read {}: {err}", path.display());
                None
            }
        }
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    fn values(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
        self.values
            .lock()
            .map_err(|_| StorageError::Unavailable("memory backend poisoned".to_string()))
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.values().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        validate_key(key)?;
        self.values()?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values()?.remove(key);
        Ok(())
    }
}

/// JSON key-value store with change notification. Clones share the same
/// backend and the same change channel.
#[derive(Clone)]
pub struct KvStore {
    backend: Arc<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
}

impl KvStore {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend: Arc::new(backend),
            events,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    /// The stored value for `key`, or `default` when it is absent or cannot
    /// be parsed.
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.backend.get(key) {
            Some(raw) => parse_or(key, &raw, default),
            None => default,
        }
    }

    /// Persists `value` and notifies observers. Failures are logged and the
    /// caller carries on with its in-memory state.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(err) = self.try_write(key, value) {
            error!("failed to write {key}: {err}");
        }
    }

    fn try_write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, raw.clone())?;
        self.publish(key, Some(raw));
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        match self.backend.remove(key) {
            Ok(()) => self.publish(key, None),
            Err(err) => error!("failed to remove {key}: {err}"),
        }
    }

    fn publish(&self, key: &str, new_value: Option<String>) {
        // No receivers is fine.
        let _ = self.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
        });
    }
}

fn parse_or<T: DeserializeOwned>(key: &str, raw: &str, default: T) -> T {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            error!("failed to parse stored value for {key}: {err}");
            default
        }
    }
}

/// In-memory copy of one key that follows changes made through any handle
/// of the same store.
pub struct StoredValue<T> {
    key: String,
    default: T,
    value: T,
    events: broadcast::Receiver<StorageEvent>,
}

impl<T> StoredValue<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn load(store: &KvStore, key: &str, default: T) -> Self {
        let events = store.subscribe();
        let value = store.read(key, default.clone());
        Self {
            key: key.to_string(),
            default,
            value,
            events,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, store: &KvStore, value: T) {
        self.value = value;
        store.write(&self.key, &self.value);
    }

    /// Applies pending change events for this key. Returns whether the copy
    /// changed.
    pub fn sync(&mut self, store: &KvStore) -> bool {
        let mut changed = false;
        loop {
            match self.events.try_recv() {
                Ok(event) if event.key == self.key => {
                    changed |= self.apply(event.new_value);
                }
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("missed {skipped} storage events, reloading {}", self.key);
                    self.value = store.read(&self.key, self.default.clone());
                    changed = true;
                }
                Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                    break;
                }
            }
        }
        changed
    }

    fn apply(&mut self, new_value: Option<String>) -> bool {
        match new_value {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.value = value;
                    true
                }
                Err(err) => {
                    error!("failed to parse change event for {}: {err}", self.key);
                    false
                }
            },
            None => {
                debug!("{} removed, resetting to default", self.key);
                self.value = self.default.clone();
                true
            }
        }
    }
}
