//! # Membership Ledger
//!
//! ## Responsibility
//! The locally persisted list of rooms the user has joined. It is the only
//! source of "joined" status when the server does not report per-user
//! participation, so joins are optimistic and never confirmed here.
//!
//! ## Guarantees
//! - `join` never duplicates an entry.
//! - `join` followed by `leave` of a room that was not joined restores the
//!   ledger exactly.
//! - Legacy arrays of bare ids are accepted (their entries carry no
//!   timestamp); corrupt JSON reads as an empty ledger.
//!
//! ## NOT Responsible For
//! - Pruning entries for rooms the server deleted. Stale entries simply never
//!   match a fetched room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::RoomId;
use crate::storage::{keys, write_json, KeyValueStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    #[serde(rename = "joinedAt", skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
}

impl<'de> Deserialize<'de> for LedgerEntry {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Full {
            #[serde(rename = "roomId")]
            room_id: RoomId,
            #[serde(rename = "joinedAt", default)]
            joined_at: Option<Value>,
        }

        let v = Value::deserialize(d)?;
        if v.is_object() {
            let full: Full = serde_json::from_value(v).map_err(serde::de::Error::custom)?;
            let joined_at = full
                .joined_at
                .as_ref()
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc));
            return Ok(LedgerEntry {
                room_id: full.room_id,
                joined_at,
            });
        }
        let room_id: RoomId = serde_json::from_value(v).map_err(serde::de::Error::custom)?;
        Ok(LedgerEntry {
            room_id,
            joined_at: None,
        })
    }
}

/// In-memory ledger value. Persist with [`LedgerStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MembershipLedger {
    entries: Vec<LedgerEntry>,
}

impl MembershipLedger {
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }

    /// Decode a stored ledger, skipping elements that are neither entries
    /// nor ids. A non-array value reads as empty.
    pub fn from_json(raw: &str) -> Self {
        let items = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items,
            Ok(other) => {
                warn!(found = %other, "membership ledger is not an array, treating as empty");
                return Self::default();
            }
            Err(e) => {
                warn!(error = %e, "corrupt membership ledger, treating as empty");
                return Self::default();
            }
        };
        let entries = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<LedgerEntry>(item).ok())
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.entry(room_id).is_some()
    }

    pub fn entry(&self, room_id: &RoomId) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| &e.room_id == room_id)
    }

    /// When the room was joined, if it was and the entry carries a time.
    pub fn joined_at(&self, room_id: &RoomId) -> Option<DateTime<Utc>> {
        self.entry(room_id).and_then(|e| e.joined_at)
    }

    /// Append `(room_id, now)` unless already present. Returns `true` when
    /// an entry was added.
    pub fn join(&mut self, room_id: RoomId) -> bool {
        self.join_at(room_id, Utc::now())
    }

    pub fn join_at(&mut self, room_id: RoomId, at: DateTime<Utc>) -> bool {
        if self.contains(&room_id) {
            return false;
        }
        self.entries.push(LedgerEntry {
            room_id,
            joined_at: Some(at),
        });
        true
    }

    /// Remove every entry for `room_id`. Returns `true` if any were removed.
    pub fn leave(&mut self, room_id: &RoomId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.room_id != room_id);
        self.entries.len() != before
    }
}

/// Read-modify-write access to the persisted ledger.
pub struct LedgerStore<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> LedgerStore<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Result<MembershipLedger> {
        Ok(self
            .store
            .get(keys::JOINED_ROOMS)?
            .map(|raw| MembershipLedger::from_json(&raw))
            .unwrap_or_default())
    }

    fn save(&self, ledger: &MembershipLedger) -> Result<()> {
        write_json(self.store, keys::JOINED_ROOMS, ledger)
    }

    /// Optimistically record a join. Returns the updated ledger.
    pub fn join(&self, room_id: &RoomId) -> Result<MembershipLedger> {
        let mut ledger = self.load()?;
        if ledger.join(room_id.clone()) {
            self.save(&ledger)?;
            debug!(room_id = %room_id, "joined room locally");
        }
        Ok(ledger)
    }

    pub fn leave(&self, room_id: &RoomId) -> Result<MembershipLedger> {
        let mut ledger = self.load()?;
        if ledger.leave(room_id) {
            self.save(&ledger)?;
            debug!(room_id = %room_id, "left room locally");
        }
        Ok(ledger)
    }
}
