//! Saved games, kept as a single JSON array under a fixed key of a key-value
//! store. Every entry is a full game state plus its save timestamp, a stable
//! id and the snapshot format version.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::games::yahtzee::State;
use crate::games::Validate;

pub const SAVED_GAMES_KEY: &str = "rollscoreSavedGames_v4";
pub const SNAPSHOT_VERSION: u32 = 1;
const TIMESTAMP_FORMAT: &str = "%d.%m.%Y, %H:%M:%S";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] io::Error),
    #[error("saved games are corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("could not encode saved games: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("no saved game at position {0}")]
    InvalidSelection(usize),
    #[error("no saved game with id {0}")]
    UnknownId(Uuid),
    #[error("saved game uses format version {found}, this build reads version {supported}")]
    UnsupportedVersion { found: u64, supported: u32 },
    #[error("saved game is not a valid game: {0}")]
    Invalid(anyhow::Error),
}

// Durable string values addressed by key
pub trait Storage {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&mut self, key: &str) -> io::Result<()>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        (**self).remove(key)
    }
}

/// One `<key>.json` file per key inside a directory. The directory is created
/// on the first write.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(key);
        // Write aside and rename so a crash never leaves half a file behind
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(tmp, path)
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path(key)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

// Values that live as long as the process, for throwaway sessions
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    values: HashMap<String, String>,
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SavedGame {
    pub id: Uuid,
    pub version: u32,
    #[serde(flatten)]
    pub state: State,
}

// A saved game as offered for selection. `index` is the position in the
// stored list, which shifts when earlier entries get deleted; `id` does not.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotEntry {
    pub index: usize,
    pub id: Option<Uuid>,
    pub label: String,
}

pub struct SaveStore<S: Storage> {
    storage: S,
}

impl<S: Storage> SaveStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    // Entries are kept as raw JSON so one unreadable snapshot does not take
    // the others down with it
    fn read_entries(&self) -> Result<Vec<Value>, StorageError> {
        match self.storage.get(SAVED_GAMES_KEY)? {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(StorageError::Corrupt),
        }
    }

    fn write_entries(&mut self, entries: &[Value]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(entries).map_err(StorageError::Encode)?;
        self.storage.set(SAVED_GAMES_KEY, &raw)?;
        Ok(())
    }

    /// Append a copy of the game, stamped with the current local time, and
    /// return the updated listing (newest first).
    ///
    /// Corrupt stored content is cleared and reported, so that the next save
    /// starts from an empty list.
    pub fn save(&mut self, state: &State) -> Result<Vec<SnapshotEntry>, StorageError> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(StorageError::Corrupt(err)) => {
                log::warn!("Clearing corrupt saved games: {}", err);
                self.storage.remove(SAVED_GAMES_KEY)?;
                return Err(StorageError::Corrupt(err));
            },
            Err(err) => return Err(err),
        };

        let mut snapshot = state.clone();
        snapshot.set_timestamp(Some(chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()));
        let saved = SavedGame {
            id: Uuid::new_v4(),
            version: SNAPSHOT_VERSION,
            state: snapshot,
        };

        entries.push(serde_json::to_value(&saved).map_err(StorageError::Encode)?);
        self.write_entries(&entries)?;
        log::info!("Saved game {} as entry {}", saved.id, entries.len() - 1);

        Ok(listing(&entries))
    }

    // Saved games, newest first, without touching storage
    pub fn list(&self) -> Result<Vec<SnapshotEntry>, StorageError> {
        Ok(listing(&self.read_entries()?))
    }

    pub fn load(&self, index: usize) -> Result<State, StorageError> {
        let entries = self.read_entries()?;
        let entry = entries.get(index).ok_or(StorageError::InvalidSelection(index))?;
        let state = decode(entry)?;
        log::info!("Loaded saved game {}", index);
        Ok(state)
    }

    pub fn load_by_id(&self, id: Uuid) -> Result<State, StorageError> {
        let index = self.position(id)?;
        self.load(index)
    }

    /// Remove the entry at `index` and return the updated listing. Entries
    /// after it move down by one position.
    pub fn delete(&mut self, index: usize) -> Result<Vec<SnapshotEntry>, StorageError> {
        let mut entries = self.read_entries()?;
        if index >= entries.len() {
            return Err(StorageError::InvalidSelection(index));
        }

        entries.remove(index);
        self.write_entries(&entries)?;
        log::info!("Deleted saved game {}", index);
        Ok(listing(&entries))
    }

    pub fn delete_by_id(&mut self, id: Uuid) -> Result<Vec<SnapshotEntry>, StorageError> {
        let index = self.position(id)?;
        self.delete(index)
    }

    fn position(&self, id: Uuid) -> Result<usize, StorageError> {
        self.read_entries()?
            .iter()
            .position(|entry| entry_id(entry) == Some(id))
            .ok_or(StorageError::UnknownId(id))
    }
}

fn entry_id(entry: &Value) -> Option<Uuid> {
    entry.get("id").and_then(Value::as_str).and_then(|id| Uuid::parse_str(id).ok())
}

fn decode(entry: &Value) -> Result<State, StorageError> {
    match entry.get("version").and_then(Value::as_u64) {
        Some(version) if version == SNAPSHOT_VERSION as u64 => {},
        Some(found) => return Err(StorageError::UnsupportedVersion { found, supported: SNAPSHOT_VERSION }),
        None => return Err(StorageError::Invalid(anyhow::anyhow!("snapshot has no format version"))),
    }

    let saved: SavedGame = serde_json::from_value(entry.clone()).map_err(|e| StorageError::Invalid(e.into()))?;
    saved.state.validate().map_err(StorageError::Invalid)?;
    Ok(saved.state)
}

// Selection label, e.g. "Game from 01.02.2026, 18:30:00 (3 players: Ann, Bob…)"
fn label(index: usize, entry: &Value) -> String {
    let info = match entry.get("timestamp").and_then(Value::as_str) {
        Some(timestamp) => format!("Game from {}", timestamp),
        None => format!("Game {}", index + 1),
    };

    let names: Vec<&str> = entry
        .get("players")
        .and_then(Value::as_array)
        .map(|players| players.iter().filter_map(|p| p.get("name").and_then(Value::as_str)).collect())
        .unwrap_or_default();

    if names.is_empty() {
        return info;
    }

    let preview = names.iter().take(2).copied().collect::<Vec<_>>().join(", ");
    format!(
        "{} ({} player{}: {}{})",
        info,
        names.len(),
        if names.len() == 1 { "" } else { "s" },
        preview,
        if names.len() > 2 { "…" } else { "" },
    )
}

fn listing(entries: &[Value]) -> Vec<SnapshotEntry> {
    entries
        .iter()
        .enumerate()
        .rev()
        .map(|(index, entry)| SnapshotEntry {
            index,
            id: entry_id(entry),
            label: label(index, entry),
        })
        .collect()
}
