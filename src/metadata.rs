//! Local Metadata Store: per-room fields the user set locally, overlaid on
//! server records by the normalizer.
//!
//! Persisted as one JSON object under `roomMetadata` (room id → entry).
//! Entries are never deleted; an entry for a room the server no longer has
//! is simply never looked up. Fields holding numbers (older clients wrote
//! `creator_id` as one) read as strings, and an entry that is not an object
//! is dropped on its own without taking the rest of the map with it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::{lenient, RoomId, RoomPayload};
use crate::storage::{keys, read_json_map, write_json, KeyValueStore};

/// Locally owned overrides for one room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMetadata {
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl RoomMetadata {
    /// Overrides captured from a submitted create/edit form.
    pub fn from_payload(payload: &RoomPayload) -> Self {
        Self {
            date: Some(payload.date.clone()),
            start_time: Some(payload.start_time.clone()),
            end_time: Some(payload.end_time.clone()),
            location: Some(payload.location.clone()),
            mode: Some(payload.mode.to_string()),
            ..Default::default()
        }
    }

    /// Overlay `newer` onto `self`: fields set in `newer` win.
    pub fn merge(&mut self, newer: RoomMetadata) {
        fn take(slot: &mut Option<String>, v: Option<String>) {
            if v.is_some() {
                *slot = v;
            }
        }
        take(&mut self.date, newer.date);
        take(&mut self.start_time, newer.start_time);
        take(&mut self.end_time, newer.end_time);
        take(&mut self.location, newer.location);
        take(&mut self.mode, newer.mode);
        take(&mut self.creator_id, newer.creator_id);
        take(&mut self.username, newer.username);
        take(&mut self.email, newer.email);
    }
}

/// Snapshot of the whole metadata map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataMap(BTreeMap<String, RoomMetadata>);

impl MetadataMap {
    pub fn get(&self, room_id: &RoomId) -> Option<&RoomMetadata> {
        self.0.get(room_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read-modify-write access to the persisted metadata map.
pub struct MetadataStore<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> MetadataStore<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    /// Load the map; corrupt JSON reads as empty and malformed entries are
    /// skipped.
    pub fn load(&self) -> Result<MetadataMap> {
        read_json_map(self.store, keys::ROOM_METADATA).map(MetadataMap)
    }

    /// Merge `entry` into the stored entry for `room_id`, creating it if
    /// absent, and persist the whole map.
    pub fn upsert(&self, room_id: &RoomId, entry: RoomMetadata) -> Result<RoomMetadata> {
        let mut map = self.load()?;
        let slot = map.0.entry(room_id.to_string()).or_default();
        slot.merge(entry);
        let merged = slot.clone();
        write_json(self.store, keys::ROOM_METADATA, &map)?;
        debug!(room_id = %room_id, "room metadata updated");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoomMode;
    use crate::storage::MemoryStore;

    #[test]
    fn test_load_empty() {
        let store = MemoryStore::new();
        assert!(MetadataStore::new(&store).load().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_creates_and_merges() {
        let store = MemoryStore::new();
        let meta = MetadataStore::new(&store);
        let id = RoomId::from(4);
        meta.upsert(
            &id,
            RoomMetadata {
                date: Some("2024-03-05".into()),
                location: Some("Hall".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let merged = meta
            .upsert(
                &id,
                RoomMetadata {
                    location: Some("Library".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(merged.date.as_deref(), Some("2024-03-05"));
        assert_eq!(merged.location.as_deref(), Some("Library"));
        assert_eq!(meta.load().unwrap().get(&id), Some(&merged));
    }

    #[test]
    fn test_reads_source_shaped_json() {
        let store = MemoryStore::new();
        store
            .set(
                keys::ROOM_METADATA,
                r#"{"12":{"date":"2024-03-05","start_time":"09:00","mode":"online","username":"ada"}}"#,
            )
            .unwrap();
        let map = MetadataStore::new(&store).load().unwrap();
        let entry = map.get(&RoomId::from(12)).unwrap();
        assert_eq!(entry.start_time.as_deref(), Some("09:00"));
        assert_eq!(entry.username.as_deref(), Some("ada"));
    }

    #[test]
    fn test_corrupt_map_is_empty() {
        let store = MemoryStore::new();
        store.set(keys::ROOM_METADATA, "[[[").unwrap();
        assert!(MetadataStore::new(&store).load().unwrap().is_empty());
    }

    #[test]
    fn test_numeric_creator_id_keeps_every_entry() {
        let store = MemoryStore::new();
        store
            .set(
                keys::ROOM_METADATA,
                r#"{"1":{"date":"2024-03-09"},"2":{"date":"2024-04-01","creator_id":7},"3":"junk"}"#,
            )
            .unwrap();
        let meta = MetadataStore::new(&store);
        let map = meta.load().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&RoomId::from(1)).unwrap().date.as_deref(), Some("2024-03-09"));
        assert_eq!(map.get(&RoomId::from(2)).unwrap().creator_id.as_deref(), Some("7"));

        meta.upsert(
            &RoomId::from(4),
            RoomMetadata {
                location: Some("Lab".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let map = meta.load().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&RoomId::from(1)).unwrap().date.as_deref(), Some("2024-03-09"));
        assert_eq!(map.get(&RoomId::from(2)).unwrap().creator_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_wrongly_typed_field_drops_alone() {
        let store = MemoryStore::new();
        store
            .set(keys::ROOM_METADATA, r#"{"5":{"location":["a"],"start_time":"09:00"}}"#)
            .unwrap();
        let map = MetadataStore::new(&store).load().unwrap();
        let entry = map.get(&RoomId::from(5)).unwrap();
        assert_eq!(entry.location, None);
        assert_eq!(entry.start_time.as_deref(), Some("09:00"));
    }

    #[test]
    fn test_from_payload_captures_overridable_fields() {
        let payload = RoomPayload {
            name: "x".into(),
            date: "2024-03-05".into(),
            start_time: "09:00".into(),
            end_time: "10:00".into(),
            location: "Lab".into(),
            mode: RoomMode::Hybrid,
            ..Default::default()
        };
        let m = RoomMetadata::from_payload(&payload);
        assert_eq!(m.mode.as_deref(), Some("hybrid"));
        assert_eq!(m.location.as_deref(), Some("Lab"));
        assert!(m.username.is_none());
    }
}
