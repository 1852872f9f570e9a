//! Durable key-value state.
//!
//! All persisted values (session id, selected model, web-search flag, chat
//! history, skipped update version, login) live as top-level keys of one JSON object
//! on disk. A missing or unreadable file starts empty, and a value that no
//! longer deserializes reads as absent. Either way the next successful write
//! replaces it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::Result;

pub const KEY_SESSION_ID: &str = "session_id";
pub const KEY_SELECTED_MODEL: &str = "selected_model";
pub const KEY_WEB_SEARCH: &str = "web_search";
pub const KEY_CHAT_HISTORY: &str = "chat_history";
pub const KEY_SKIPPED_VERSION: &str = "skipped_version";
pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_USERNAME: &str = "username";

/// Default state file: ~/.local/share/niko/state.json
pub fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("niko")
        .join("state.json")
}

pub struct KeyValueStore {
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl KeyValueStore {
    /// Open the store at `path`. Never fails: unreadable content starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = load_map(&path);
        debug!("Opened state store {} ({} keys)", path.display(), values.len());
        Self {
            path: Some(path),
            values: Mutex::new(values),
        }
    }

    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(Map::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Typed read. Values of the wrong shape are treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.lock().get(key).cloned()?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Ignoring malformed stored value for '{key}': {e}");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let mut values = self.lock();
        values.insert(key.to_string(), value);
        self.flush(&values)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.lock();
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }

    fn flush(&self, values: &Map<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(values)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn load_map(path: &Path) -> Map<String, Value> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
        Err(e) => {
            warn!("Failed to read {}: {e}, starting empty", path.display());
            return Map::new();
        }
    };

    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("{} is not a JSON object, starting empty", path.display());
            Map::new()
        }
        Err(e) => {
            warn!("Failed to parse {}: {e}, starting empty", path.display());
            Map::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = KeyValueStore::open(&path);
        store.set(KEY_SESSION_ID, &"abc").unwrap();
        store.set(KEY_WEB_SEARCH, &true).unwrap();

        let reopened = KeyValueStore::open(&path);
        assert_eq!(reopened.get::<String>(KEY_SESSION_ID).as_deref(), Some("abc"));
        assert_eq!(reopened.get::<bool>(KEY_WEB_SEARCH), Some(true));
    }

    #[test]
    fn corrupt_file_opens_empty_and_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let store = KeyValueStore::open(&path);
        assert_eq!(store.get::<String>(KEY_SESSION_ID), None);

        store.set(KEY_SELECTED_MODEL, &"kumru").unwrap();
        let reopened = KeyValueStore::open(&path);
        assert_eq!(
            reopened.get::<String>(KEY_SELECTED_MODEL).as_deref(),
            Some("kumru")
        );
    }

    #[test]
    fn wrong_shape_reads_as_absent() {
        let store = KeyValueStore::in_memory();
        store.set(KEY_CHAT_HISTORY, &"oops").unwrap();
        assert_eq!(store.get::<Vec<u32>>(KEY_CHAT_HISTORY), None);
    }

    #[test]
    fn remove_deletes_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = KeyValueStore::open(&path);
        store.set(KEY_SESSION_ID, &"abc").unwrap();
        store.remove(KEY_SESSION_ID).unwrap();
        store.remove("never-set").unwrap();

        assert_eq!(KeyValueStore::open(&path).get::<String>(KEY_SESSION_ID), None);
    }
}
