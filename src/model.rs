//! Raw, untrusted room records as the server sends them, plus the request
//! payload for create/update.
//!
//! The server populates fields inconsistently: ids arrive as numbers or
//! strings, `participants` is sometimes a count and sometimes a list, and
//! times come as `start_time` or `startTime`. Every field here is optional
//! and decoded leniently, so one wrongly-typed field drops to `None` instead
//! of failing the whole record. Nothing in this module reaches a render
//! surface directly; [`crate::normalize`] is the only consumer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Result, StudyRoomError};
use crate::normalize::{parse_date, parse_time};

// ---------------------------------------------------------------------------
// RoomId
// ---------------------------------------------------------------------------

/// Room identifier, compared as a string regardless of how it was encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_value(v: &Value) -> Option<Self> {
        scalar_string(v).filter(|s| !s.is_empty()).map(RoomId::new)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        RoomId::new(s)
    }
}

impl From<u64> for RoomId {
    fn from(n: u64) -> Self {
        RoomId(n.to_string())
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let v = Value::deserialize(d)?;
        RoomId::from_value(&v)
            .ok_or_else(|| serde::de::Error::custom(format!("expected room id, got {v}")))
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomMode {
    Online,
    Offline,
    #[default]
    Hybrid,
}

impl RoomMode {
    /// Case-insensitive parse; anything unrecognised is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Some(RoomMode::Online),
            "offline" => Some(RoomMode::Offline),
            "hybrid" => Some(RoomMode::Hybrid),
            _ => None,
        }
    }
}

impl std::fmt::Display for RoomMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomMode::Online => write!(f, "online"),
            RoomMode::Offline => write!(f, "offline"),
            RoomMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw record
// ---------------------------------------------------------------------------

/// Creator profile as embedded by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorProfile {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub email: Option<String>,
}

/// `participants` is either a head count or a list of member ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Participants {
    Count(u32),
    Members(Vec<String>),
}

impl Participants {
    pub fn count(&self) -> u32 {
        match self {
            Participants::Count(n) => *n,
            Participants::Members(ids) => u32::try_from(ids.len()).unwrap_or(u32::MAX),
        }
    }

    pub fn members(&self) -> &[String] {
        match self {
            Participants::Count(_) => &[],
            Participants::Members(ids) => ids,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRoomRecord {
    #[serde(default, deserialize_with = "lenient::room_id")]
    pub room_id: Option<RoomId>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub capacity: Option<u32>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub start_time: Option<String>,
    #[serde(default, rename = "startTime", deserialize_with = "lenient::string")]
    pub start_time_alt: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub end_time: Option<String>,
    #[serde(default, rename = "endTime", deserialize_with = "lenient::string")]
    pub end_time_alt: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub creator_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::creator")]
    pub creator: Option<CreatorProfile>,
    #[serde(default, deserialize_with = "lenient::participants")]
    pub participants: Option<Participants>,
}

impl RawRoomRecord {
    /// Decode one record. Fails only when `value` is not a JSON object.
    pub fn from_value(value: Value) -> std::result::Result<Self, serde_json::Error> {
        if !value.is_object() {
            return Err(serde::de::Error::custom(format!(
                "room record must be an object, got {}",
                type_name(&value)
            )));
        }
        serde_json::from_value(value)
    }

    /// The identifier used for detail lookups and local joins: `room_id`,
    /// falling back to the string `id`.
    pub fn key(&self) -> Option<RoomId> {
        self.room_id.clone().or_else(|| {
            self.id
                .as_deref()
                .map(|s| s.strip_prefix("room-").unwrap_or(s))
                .filter(|s| !s.is_empty())
                .map(RoomId::new)
        })
    }

    /// `start_time`, else `startTime`.
    pub fn start_time(&self) -> Option<&str> {
        first_non_empty(&self.start_time, &self.start_time_alt)
    }

    /// `end_time`, else `endTime`.
    pub fn end_time(&self) -> Option<&str> {
        first_non_empty(&self.end_time, &self.end_time_alt)
    }

    /// Overwrite the user-editable fields with a submitted payload, so a
    /// created or edited room can be shown before the next listing.
    pub fn apply_payload(&mut self, payload: &RoomPayload) {
        self.name = Some(payload.name.clone());
        self.description = Some(payload.description.clone());
        self.capacity = Some(payload.capacity);
        self.date = Some(payload.date.clone());
        self.start_time = Some(payload.start_time.clone());
        self.start_time_alt = None;
        self.end_time = Some(payload.end_time.clone());
        self.end_time_alt = None;
        self.location = Some(payload.location.clone());
        self.mode = Some(payload.mode.to_string());
        if !payload.tags.is_empty() {
            self.tags = payload.tags.clone();
        }
    }
}

fn first_non_empty<'a>(a: &'a Option<String>, b: &'a Option<String>) -> Option<&'a str> {
    a.as_deref()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| b.as_deref().filter(|s| !s.trim().is_empty()))
}

// ---------------------------------------------------------------------------
// Response envelopes
// ---------------------------------------------------------------------------

/// Split a collection response into per-room values.
///
/// Accepts a bare array or a `{ "rooms": [...] }` wrapper. An object without
/// a `rooms` array is an empty collection. Any other body is handed back
/// untouched inside the error.
pub fn collection_items(body: Value) -> std::result::Result<Vec<Value>, NotACollection> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("rooms") {
            Some(Value::Array(items)) => Ok(items),
            _ => Ok(Vec::new()),
        },
        other => Err(NotACollection(other)),
    }
}

/// A collection response that was neither an array nor an object.
#[derive(Debug, Clone, PartialEq)]
pub struct NotACollection(pub Value);

impl NotACollection {
    pub fn detail(&self) -> String {
        format!("expected array or {{rooms}} wrapper, got {}", type_name(&self.0))
    }
}

/// Unwrap a single-record response: either the record itself or
/// `{ "room": {...} }`.
pub fn record_item(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.len() == 1 && map.get("room").is_some_and(Value::is_object) => {
            map.remove("room").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Shallow merge: every top-level key of `detail` replaces the summary's.
pub fn merge_detail(summary: Value, detail: Value) -> Value {
    match (summary, detail) {
        (Value::Object(mut base), Value::Object(over)) => {
            for (k, v) in over {
                base.insert(k, v);
            }
            Value::Object(base)
        }
        (summary, _) => summary,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoders
// ---------------------------------------------------------------------------

pub(crate) mod lenient {
    use super::*;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(v.as_ref().and_then(scalar_string))
    }

    pub fn room_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<RoomId>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(v.as_ref().and_then(RoomId::from_value))
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u32>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(v.as_ref().and_then(as_count))
    }

    pub fn strings<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
            _ => Vec::new(),
        })
    }

    pub fn creator<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Option<CreatorProfile>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v {
            Some(v @ Value::Object(_)) => serde_json::from_value(v).ok(),
            _ => None,
        })
    }

    pub fn participants<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Option<Participants>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v {
            Some(Value::Array(items)) => Some(Participants::Members(
                items.iter().filter_map(member_id).collect(),
            )),
            Some(other) => as_count(&other).map(Participants::Count),
            None => None,
        })
    }

    fn member_id(v: &Value) -> Option<String> {
        match v {
            Value::Object(map) => map.get("id").and_then(scalar_string),
            other => scalar_string(other),
        }
    }

    fn as_count(v: &Value) -> Option<u32> {
        match v {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Create / update payload
// ---------------------------------------------------------------------------

/// Body of `POST /study_rooms` and `PUT /study_rooms/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPayload {
    pub name: String,
    pub description: String,
    pub capacity: u32,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
    pub mode: RoomMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Default for RoomPayload {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            capacity: 1,
            date: String::new(),
            start_time: String::new(),
            end_time: String::new(),
            location: String::new(),
            mode: RoomMode::Online,
            tags: Vec::new(),
        }
    }
}

impl RoomPayload {
    /// Check the fields the edit form requires before anything is sent.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StudyRoomError::Invalid("room name is required".to_string()));
        }
        if self.capacity == 0 {
            return Err(StudyRoomError::Invalid("capacity must be at least 1".to_string()));
        }
        if self.date.trim().is_empty() {
            return Err(StudyRoomError::Invalid("please select a date for the study room".to_string()));
        }
        if parse_date(&self.date).is_none() {
            return Err(StudyRoomError::Invalid(format!("date {:?} is not yyyy-mm-dd", self.date)));
        }
        if self.start_time.trim().is_empty() {
            return Err(StudyRoomError::Invalid(
                "please select a start time for the study room".to_string(),
            ));
        }
        if parse_time(&self.start_time).is_none() {
            return Err(StudyRoomError::Invalid(format!(
                "start time {:?} is not HH:mm",
                self.start_time
            )));
        }
        if self.end_time.trim().is_empty() {
            return Err(StudyRoomError::Invalid(
                "please select an end time for the study room".to_string(),
            ));
        }
        if parse_time(&self.end_time).is_none() {
            return Err(StudyRoomError::Invalid(format!("end time {:?} is not HH:mm", self.end_time)));
        }
        Ok(())
    }

    /// Pre-fill an edit form from a raw record, the way the edit page does.
    pub fn from_record(raw: &RawRoomRecord) -> Self {
        let defaults = RoomPayload::default();
        Self {
            name: raw.name.clone().unwrap_or_default(),
            description: raw.description.clone().unwrap_or_default(),
            capacity: raw.capacity.filter(|c| *c > 0).unwrap_or(defaults.capacity),
            date: raw.date.clone().unwrap_or_default(),
            start_time: raw.start_time().unwrap_or_default().to_string(),
            end_time: raw.end_time().unwrap_or_default().to_string(),
            location: raw.location.clone().unwrap_or_default(),
            mode: raw.mode.as_deref().and_then(RoomMode::parse).unwrap_or(defaults.mode),
            tags: raw.tags.clone(),
        }
    }
}
