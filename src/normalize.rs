//! # View Normalizer
//!
//! ## Responsibility
//! Merge one raw server record, the local metadata entry for that room, and
//! the membership ledger into a [`RoomView`]: the only room shape render
//! surfaces ever see.
//!
//! ## Resolution order
//! For each overridable attribute (date, start/end time, location, mode):
//! well-formed metadata value, then well-formed server value, then default.
//! Malformed values (`"9am"`, `"March 5"`, `"in person"`) are skipped, never
//! propagated.
//!
//! ## Guarantees
//! - Pure and idempotent: same inputs, same view.
//! - Every text field has a concrete value; nothing renders as null.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::ledger::MembershipLedger;
use crate::metadata::RoomMetadata;
use crate::model::{CreatorProfile, RawRoomRecord, RoomId, RoomMode, RoomPayload};

pub const DEFAULT_NAME: &str = "Unnamed Room";
pub const DEFAULT_DESCRIPTION: &str = "No description available";
pub const DEFAULT_HOST: &str = "Anonymous";
pub const DEFAULT_CAPACITY: u32 = 0;
pub const DEFAULT_TIME_LABEL: &str = "00:00";

// ---------------------------------------------------------------------------
// Field validation
// ---------------------------------------------------------------------------

/// Parse a strict `HH:mm` time (two-digit hour 00–23, two-digit minute).
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    let b = s.as_bytes();
    if b.len() != 5 || b[2] != b':' {
        return None;
    }
    if !b[..2].iter().chain(&b[3..]).all(u8::is_ascii_digit) {
        return None;
    }
    let hour: u32 = s[..2].parse().ok()?;
    let minute: u32 = s[3..].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Parse a calendar date `yyyy-mm-dd`. A trailing time part (`T…` or a
/// space) is ignored so ISO timestamps resolve to their date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date_part = s.split(|c| c == 'T' || c == ' ').next().unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

// ---------------------------------------------------------------------------
// View model
// ---------------------------------------------------------------------------

/// How the current user's membership in a room is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MembershipState {
    /// The server's participant list includes the user.
    Confirmed,
    /// Only the local ledger says so; the server has not confirmed it.
    Local { joined_at: Option<DateTime<Utc>> },
    None,
}

impl MembershipState {
    pub fn is_member(&self) -> bool {
        !matches!(self, MembershipState::None)
    }
}

/// Normalized, render-ready room.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomView {
    pub room_id: RoomId,
    /// Stable string id: server `id` or `room-<room_id>`.
    pub id: String,
    pub name: String,
    pub subject: String,
    pub description: String,
    pub capacity: u32,
    pub tags: Vec<String>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub location: String,
    pub mode: RoomMode,
    pub host: String,
    pub creator_id: Option<String>,
    pub creator: Option<CreatorProfile>,
    pub participant_count: u32,
    pub participant_ids: Vec<String>,
    pub membership: MembershipState,
}

impl RoomView {
    pub fn start_label(&self) -> String {
        time_label(self.start_time)
    }

    pub fn end_label(&self) -> String {
        time_label(self.end_time)
    }

    pub fn date_label(&self) -> String {
        self.date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }

    /// `n/capacity` as shown on room cards.
    pub fn occupancy_label(&self) -> String {
        format!("{}/{}", self.participant_count, self.capacity)
    }

    /// Upgrade ledger-only or absent membership to `Confirmed` when the
    /// server's participant list names `user_id`.
    pub fn confirm_membership(&mut self, user_id: &str) {
        if !user_id.is_empty() && self.participant_ids.iter().any(|p| p == user_id) {
            self.membership = MembershipState::Confirmed;
        }
    }

    /// Pre-fill an edit from what the user currently sees, local overrides
    /// included. Placeholder text and missing times come back empty.
    pub fn to_payload(&self) -> RoomPayload {
        let hh_mm = |t: Option<NaiveTime>| t.map(|t| t.format("%H:%M").to_string()).unwrap_or_default();
        RoomPayload {
            name: self.name.clone(),
            description: if self.description == DEFAULT_DESCRIPTION {
                String::new()
            } else {
                self.description.clone()
            },
            capacity: self.capacity.max(1),
            date: self.date_label(),
            start_time: hh_mm(self.start_time),
            end_time: hh_mm(self.end_time),
            location: self.location.clone(),
            mode: self.mode,
            tags: self.tags.clone(),
        }
    }
}

fn time_label(t: Option<NaiveTime>) -> String {
    t.map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| DEFAULT_TIME_LABEL.to_string())
}

// ---------------------------------------------------------------------------
// normalize
// ---------------------------------------------------------------------------

/// Merge a raw record with its metadata overrides and the ledger.
pub fn normalize(
    raw: &RawRoomRecord,
    metadata: Option<&RoomMetadata>,
    ledger: &MembershipLedger,
) -> RoomView {
    let room_id = raw.key().unwrap_or_else(|| RoomId::new("0"));
    let meta = metadata.cloned().unwrap_or_default();

    let id = non_empty(raw.id.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| format!("room-{room_id}"));

    let name = non_empty(raw.name.as_deref())
        .or_else(|| non_empty(raw.title.as_deref()))
        .unwrap_or(DEFAULT_NAME)
        .to_string();

    let date = meta
        .date
        .as_deref()
        .and_then(parse_date)
        .or_else(|| raw.date.as_deref().and_then(parse_date));
    let start_time = meta
        .start_time
        .as_deref()
        .and_then(parse_time)
        .or_else(|| raw.start_time().and_then(parse_time));
    let end_time = meta
        .end_time
        .as_deref()
        .and_then(parse_time)
        .or_else(|| raw.end_time().and_then(parse_time));
    let location = non_empty(meta.location.as_deref())
        .or_else(|| non_empty(raw.location.as_deref()))
        .unwrap_or_default()
        .to_string();
    let mode = meta
        .mode
        .as_deref()
        .and_then(RoomMode::parse)
        .or_else(|| raw.mode.as_deref().and_then(RoomMode::parse))
        .unwrap_or_default();

    let creator = resolve_creator(raw.creator.as_ref(), &meta);
    let creator_id = non_empty(raw.creator_id.as_deref())
        .or_else(|| raw.creator.as_ref().and_then(|c| non_empty(c.id.as_deref())))
        .or_else(|| non_empty(meta.creator_id.as_deref()))
        .map(str::to_string);

    let (participant_count, participant_ids) = match &raw.participants {
        Some(p) => (p.count(), p.members().to_vec()),
        None => (0, Vec::new()),
    };

    let membership = match ledger.entry(&room_id) {
        Some(entry) => MembershipState::Local {
            joined_at: entry.joined_at,
        },
        None => MembershipState::None,
    };

    RoomView {
        room_id,
        id,
        name,
        subject: raw.subject.clone().unwrap_or_default(),
        description: non_empty(raw.description.as_deref())
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_string(),
        capacity: raw.capacity.unwrap_or(DEFAULT_CAPACITY),
        tags: raw.tags.clone(),
        date,
        start_time,
        end_time,
        location,
        mode,
        host: non_empty(raw.host.as_deref()).unwrap_or(DEFAULT_HOST).to_string(),
        creator_id,
        creator,
        participant_count,
        participant_ids,
        membership,
    }
}

/// Server creator profile when it carries an identity; otherwise the
/// locally recorded creator hints.
fn resolve_creator(server: Option<&CreatorProfile>, meta: &RoomMetadata) -> Option<CreatorProfile> {
    let has_identity =
        |c: &CreatorProfile| non_empty(c.username.as_deref()).is_some() || non_empty(c.email.as_deref()).is_some();
    if let Some(c) = server.filter(|c| has_identity(*c)) {
        return Some(c.clone());
    }
    let hint = CreatorProfile {
        id: meta.creator_id.clone(),
        username: meta.username.clone(),
        email: meta.email.clone(),
    };
    has_identity(&hint).then_some(hint)
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}
