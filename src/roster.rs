//! Participant roster for the room detail surface.
//!
//! The server only reports participant ids (or just a head count), so the
//! roster is assembled client-side: the host first, then the current user
//! when they have joined, then every other id the server listed. Avatars and
//! presence can be overridden per room through the `participantOverrides`
//! storage key. Older clients kept the same data in two separate maps,
//! `participantAvatars` and `participantStatuses`; those are folded in on
//! read wherever `participantOverrides` has no value of its own.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::calendar::host_label;
use crate::error::Result;
use crate::model::{lenient, RoomId};
use crate::normalize::RoomView;
use crate::session::CurrentUser;
use crate::storage::{decode_entries, keys, read_json_map, write_json, KeyValueStore};

/// Colors assigned to participants in round-robin order.
pub const PARTICIPANT_COLORS: &[&str] = &[
    "#58a6ff", "#f0883e", "#a371f7", "#3fb950", "#e3b341", "#f85149",
];

const AVATAR_BASE: &str = "https://api.dicebear.com/7.x/avataaars/svg?seed=";
const HOST_SEED: &str = "host";

/// Deterministic generated avatar for `seed`.
pub fn avatar_url(seed: &str) -> String {
    format!("{AVATAR_BASE}{seed}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Host,
    Participant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Online,
    Away,
    Offline,
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Presence::Online => write!(f, "online"),
            Presence::Away => write!(f, "away"),
            Presence::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub color: String,
    pub role: ParticipantRole,
    pub status: Presence,
}

/// Locally stored tweaks for one participant in one room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantOverride {
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, deserialize_with = "lenient_presence", skip_serializing_if = "Option::is_none")]
    pub status: Option<Presence>,
}

fn lenient_presence<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Presence>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| serde_json::from_value(v).ok()))
}

/// room id → participant id → override.
pub type OverrideMap = BTreeMap<String, BTreeMap<String, ParticipantOverride>>;

/// Load every override. Rooms and participants are decoded one at a time,
/// so a malformed entry is skipped without losing its neighbours.
pub fn load_overrides(store: &dyn KeyValueStore) -> Result<OverrideMap> {
    let mut map: OverrideMap = read_json_map::<Value>(store, keys::PARTICIPANT_OVERRIDES)?
        .into_iter()
        .map(|(room, people)| {
            let people = decode_entries::<ParticipantOverride>(keys::PARTICIPANT_OVERRIDES, people);
            (room, people)
        })
        .collect();

    for (room, people) in read_legacy(store, keys::LEGACY_PARTICIPANT_AVATARS)? {
        for (id, avatar) in people {
            let slot = map.entry(room.clone()).or_default().entry(id).or_default();
            slot.avatar.get_or_insert(avatar);
        }
    }
    for (room, people) in read_legacy(store, keys::LEGACY_PARTICIPANT_STATUSES)? {
        for (id, status) in people {
            let Ok(status) = serde_json::from_value::<Presence>(Value::String(status)) else {
                continue;
            };
            let slot = map.entry(room.clone()).or_default().entry(id).or_default();
            slot.status.get_or_insert(status);
        }
    }
    Ok(map)
}

/// room id → participant id → string, as the older per-concern keys hold it.
fn read_legacy(store: &dyn KeyValueStore, key: &str) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
    Ok(read_json_map::<Value>(store, key)?
        .into_iter()
        .map(|(room, people)| {
            let people = decode_entries::<String>(key, people);
            (room, people)
        })
        .collect())
}

/// Record an override for one participant, replacing any earlier one.
pub fn set_override(
    store: &dyn KeyValueStore,
    room_id: &RoomId,
    participant_id: &str,
    value: ParticipantOverride,
) -> Result<()> {
    let mut map = load_overrides(store)?;
    map.entry(room_id.to_string())
        .or_default()
        .insert(participant_id.to_string(), value);
    write_json(store, keys::PARTICIPANT_OVERRIDES, &map)?;
    debug!(room_id = %room_id, participant_id, "participant override saved");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    pub participants: Vec<Participant>,
    pub capacity: u32,
}

impl Roster {
    /// `n/capacity` as shown above the participant list.
    pub fn occupancy_label(&self) -> String {
        format!("{}/{}", self.participants.len(), self.capacity)
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.participants.len() >= self.capacity as usize
    }
}

/// Assemble the roster for `view`.
pub fn roster(view: &RoomView, user: Option<&CurrentUser>, overrides: &OverrideMap) -> Roster {
    let room_overrides = overrides.get(view.room_id.as_str());
    let mut participants: Vec<Participant> = Vec::new();

    let mut push = |id: String, name: String, seed: &str, role: ParticipantRole| {
        if participants.iter().any(|p| p.id == id) {
            return;
        }
        let ov = room_overrides.and_then(|m| m.get(&id)).cloned().unwrap_or_default();
        let color = PARTICIPANT_COLORS[participants.len() % PARTICIPANT_COLORS.len()].to_string();
        participants.push(Participant {
            name: ov.name.unwrap_or(name),
            avatar: ov.avatar.unwrap_or_else(|| avatar_url(seed)),
            status: ov.status.unwrap_or_default(),
            color,
            role,
            id,
        });
    };

    let host_id = view.creator_id.clone().unwrap_or_else(|| HOST_SEED.to_string());
    push(host_id.clone(), host_label(view).to_string(), &host_id, ParticipantRole::Host);

    if let Some(u) = user.filter(|_| view.membership.is_member()) {
        push(u.id.clone(), u.username.clone(), &u.id, ParticipantRole::Participant);
    }

    for id in &view.participant_ids {
        push(id.clone(), id.clone(), id, ParticipantRole::Participant);
    }

    Roster {
        participants,
        capacity: view.capacity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MembershipLedger;
    use crate::model::RawRoomRecord;
    use crate::normalize::normalize;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn view(v: serde_json::Value, ledger: &MembershipLedger) -> RoomView {
        normalize(&RawRoomRecord::from_value(v).unwrap(), None, ledger)
    }

    fn ada() -> CurrentUser {
        CurrentUser::new("7", "ada", "ada@example.com")
    }

    #[test]
    fn test_host_only_for_stranger() {
        let v = view(json!({"room_id": 1, "host": "bob", "capacity": 4}), &MembershipLedger::default());
        let r = roster(&v, Some(&ada()), &OverrideMap::new());
        assert_eq!(r.participants.len(), 1);
        assert_eq!(r.participants[0].role, ParticipantRole::Host);
        assert_eq!(r.participants[0].name, "bob");
        assert_eq!(r.participants[0].avatar, avatar_url("host"));
        assert_eq!(r.occupancy_label(), "1/4");
    }

    #[test]
    fn test_joined_user_listed_after_host() {
        let mut ledger = MembershipLedger::default();
        ledger.join(RoomId::from(1));
        let v = view(json!({"room_id": 1, "creator_id": 3}), &ledger);
        let r = roster(&v, Some(&ada()), &OverrideMap::new());
        assert_eq!(r.participants.len(), 2);
        assert_eq!(r.participants[1].id, "7");
        assert_eq!(r.participants[1].avatar, avatar_url("7"));
        assert_ne!(r.participants[0].color, r.participants[1].color);
    }

    #[test]
    fn test_server_ids_deduplicated() {
        let mut ledger = MembershipLedger::default();
        ledger.join(RoomId::from(1));
        let v = view(json!({"room_id": 1, "creator_id": 3, "participants": [3, 7, 9]}), &ledger);
        let r = roster(&v, Some(&ada()), &OverrideMap::new());
        let ids: Vec<&str> = r.participants.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["3", "7", "9"]);
    }

    #[test]
    fn test_overrides_applied() {
        let store = MemoryStore::new();
        set_override(
            &store,
            &RoomId::from(1),
            "host",
            ParticipantOverride {
                avatar: Some("https://img/x.png".into()),
                status: Some(Presence::Away),
                ..Default::default()
            },
        )
        .unwrap();
        let overrides = load_overrides(&store).unwrap();
        let v = view(json!({"room_id": 1}), &MembershipLedger::default());
        let r = roster(&v, None, &overrides);
        assert_eq!(r.participants[0].avatar, "https://img/x.png");
        assert_eq!(r.participants[0].status, Presence::Away);
    }

    #[test]
    fn test_is_full() {
        let v = view(json!({"room_id": 1, "capacity": 2, "participants": [4, 5]}), &MembershipLedger::default());
        assert!(roster(&v, None, &OverrideMap::new()).is_full());
        let unlimited = view(json!({"room_id": 1}), &MembershipLedger::default());
        assert!(!roster(&unlimited, None, &OverrideMap::new()).is_full());
    }

    #[test]
    fn test_bad_override_entries_skipped_individually() {
        let store = MemoryStore::new();
        store
            .set(
                keys::PARTICIPANT_OVERRIDES,
                r#"{"1":{"9":{"status":"away"},"10":"junk","11":{"status":"asleep","name":42}},"2":7}"#,
            )
            .unwrap();
        let map = load_overrides(&store).unwrap();
        assert_eq!(map["1"]["9"].status, Some(Presence::Away));
        assert!(!map["1"].contains_key("10"));
        assert_eq!(map["1"]["11"].status, None);
        assert_eq!(map["1"]["11"].name.as_deref(), Some("42"));
        assert!(map["2"].is_empty());

        set_override(&store, &RoomId::from(3), "4", ParticipantOverride::default()).unwrap();
        let map = load_overrides(&store).unwrap();
        assert_eq!(map["1"]["9"].status, Some(Presence::Away));
        assert!(map["3"].contains_key("4"));
    }

    #[test]
    fn test_legacy_avatar_and_status_keys_folded_in() {
        let store = MemoryStore::new();
        store
            .set(keys::LEGACY_PARTICIPANT_AVATARS, r#"{"1":{"host":"data:image/png;base64,AA","9":"https://img/9.png"}}"#)
            .unwrap();
        store
            .set(keys::LEGACY_PARTICIPANT_STATUSES, r#"{"1":{"host":"offline","9":"dozing"}}"#)
            .unwrap();
        set_override(
            &store,
            &RoomId::from(1),
            "9",
            ParticipantOverride {
                avatar: Some("https://img/new.png".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let map = load_overrides(&store).unwrap();
        assert_eq!(map["1"]["host"].avatar.as_deref(), Some("data:image/png;base64,AA"));
        assert_eq!(map["1"]["host"].status, Some(Presence::Offline));
        assert_eq!(map["1"]["9"].avatar.as_deref(), Some("https://img/new.png"));
        assert_eq!(map["1"]["9"].status, None);

        let v = view(json!({"room_id": 1}), &MembershipLedger::default());
        let r = roster(&v, None, &map);
        assert_eq!(r.participants[0].status, Presence::Offline);
    }
}
