//! # Storage access interface
//!
//! ## Responsibility
//! Keyed string storage for everything the client persists locally: the
//! session credential and identity, per-room metadata overrides, the
//! membership ledger, participant overrides, and discussion threads.
//!
//! Reconciliation code only sees the [`KeyValueStore`] trait, so tests run
//! against [`MemoryStore`] and the binary runs against [`SqliteStore`]
//! without touching any other module.
//!
//! ## Guarantees
//! - Values are opaque strings; JSON encoding is done by [`read_json_value`]
//!   and [`write_json`].
//! - Corrupt JSON under a key reads as empty (logged, never propagated).
//! - Keyed maps and lists read through [`read_json_map`] / [`read_json_list`]
//!   decode entry by entry, so one malformed entry is dropped on its own and
//!   the rest survive the next read-modify-write.
//! - Every successful `set`/`remove` publishes a [`StorageEvent`] to
//!   in-process subscribers.
//!
//! ## NOT Responsible For
//! - Cross-process change notification. Two processes sharing one sqlite
//!   file can still clobber each other's read-modify-write updates.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{Result, StudyRoomError};

/// Well-known storage keys.
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const USER_ID: &str = "userId";
    pub const USERNAME: &str = "username";
    pub const EMAIL: &str = "email";
    pub const ROOM_METADATA: &str = "roomMetadata";
    pub const JOINED_ROOMS: &str = "joinedStudyRooms";
    pub const PARTICIPANT_OVERRIDES: &str = "participantOverrides";
    /// Per-room avatar map written by older clients; read, never written.
    pub const LEGACY_PARTICIPANT_AVATARS: &str = "participantAvatars";
    /// Per-room presence map written by older clients; read, never written.
    pub const LEGACY_PARTICIPANT_STATUSES: &str = "participantStatuses";
    pub const DISCUSSIONS: &str = "discussions";
}

/// Notification that a key changed (set or removed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
}

const EVENT_CAPACITY: usize = 64;

/// Pluggable key→string persistence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Subscribe to change events. Backends without notification return `None`.
    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        None
    }
}

/// Shared handle used throughout the crate.
pub type SharedStore = Arc<dyn KeyValueStore>;

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// Parse the raw JSON under `key`. A missing key or corrupt JSON is `None`.
pub fn read_json_value(store: &dyn KeyValueStore, key: &str) -> Result<Option<Value>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!(key, error = %e, "corrupt JSON in local storage, treating as empty");
            Ok(None)
        }
    }
}

/// Decode each member of a JSON object on its own, dropping the members that
/// do not decode as `T`. Anything other than an object yields an empty map.
pub fn decode_entries<T: DeserializeOwned>(key: &str, value: Value) -> BTreeMap<String, T> {
    let members = match value {
        Value::Object(members) => members,
        other => {
            warn!(key, found = %other, "stored value is not an object, treating as empty");
            return BTreeMap::new();
        }
    };
    members
        .into_iter()
        .filter_map(|(entry, v)| match serde_json::from_value(v) {
            Ok(decoded) => Some((entry, decoded)),
            Err(e) => {
                warn!(key, entry = %entry, error = %e, "skipping malformed stored entry");
                None
            }
        })
        .collect()
}

/// Read a JSON object keyed by id, decoding each entry independently.
pub fn read_json_map<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<BTreeMap<String, T>> {
    Ok(read_json_value(store, key)?
        .map(|v| decode_entries(key, v))
        .unwrap_or_default())
}

/// Read a JSON array, decoding each element independently. A non-array value
/// reads as empty.
pub fn read_json_list<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Vec<T>> {
    let items = match read_json_value(store, key)? {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            warn!(key, found = %other, "stored value is not an array, treating as empty");
            return Ok(Vec::new());
        }
    };
    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(index, v)| match serde_json::from_value(v) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key, index, error = %e, "skipping malformed stored element");
                None
            }
        })
        .collect())
}

/// Encode `value` as JSON and store it under `key`.
pub fn write_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| StudyRoomError::Storage(format!("encode {key}: {e}")))?;
    store.set(key, &raw)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store. Cheap to clone; clones share the same map.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
    events: broadcast::Sender<StorageEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.inner
            .lock()
            .map_err(|_| StudyRoomError::Storage("internal: lock poisoned".to_string()))
    }

    fn notify(&self, key: &str) {
        let _ = self.events.send(StorageEvent { key: key.to_string() });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        self.notify(key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        self.notify(key);
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.events.subscribe())
    }
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// Durable store backed by a single sqlite table `kv(key, value)`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    events: broadcast::Sender<StorageEvent>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StudyRoomError::Storage(format!("create {}: {e}", parent.display())))?;
            }
        }
        debug!(path = %path.display(), "opening sqlite storage");
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)",
            [],
        )?;
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            events,
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StudyRoomError::Storage("internal: lock poisoned".to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        let _ = self.events.send(StorageEvent { key: key.to_string() });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        let _ = self.events.send(StorageEvent { key: key.to_string() });
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.events.subscribe())
    }
}
