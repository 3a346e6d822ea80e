//! List-surface helpers: free-text search, tag filters, and the two
//! dashboard sections ("created by me" and "joined").

use crate::dashboard::RoomEntry;
use crate::normalize::RoomView;
use crate::session::CurrentUser;

/// Rooms shown per section before "view all".
pub const PREVIEW_LEN: usize = 3;

/// Case-insensitive substring match on name or description. An empty query
/// matches everything.
pub fn matches_query(view: &RoomView, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    q.is_empty() || view.name.to_lowercase().contains(&q) || view.description.to_lowercase().contains(&q)
}

/// Every selected tag must be a case-insensitive substring of at least one
/// of the room's tags.
pub fn matches_tags(view: &RoomView, tags: &[String]) -> bool {
    tags.iter().all(|wanted| {
        let wanted = wanted.to_lowercase();
        view.tags.iter().any(|t| t.to_lowercase().contains(&wanted))
    })
}

pub fn search<'a>(rooms: impl IntoIterator<Item = &'a RoomEntry>, query: &str) -> Vec<&'a RoomEntry> {
    rooms.into_iter().filter(|e| matches_query(&e.view, query)).collect()
}

pub fn filter_by_tags<'a>(
    rooms: impl IntoIterator<Item = &'a RoomEntry>,
    tags: &[String],
) -> Vec<&'a RoomEntry> {
    rooms.into_iter().filter(|e| matches_tags(&e.view, tags)).collect()
}

/// Distinct tags across `rooms`, in first-seen order.
pub fn all_tags<'a>(rooms: impl IntoIterator<Item = &'a RoomEntry>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for tag in rooms.into_iter().flat_map(|e| e.view.tags.iter()) {
        if !seen.iter().any(|t| t == tag) {
            seen.push(tag.clone());
        }
    }
    seen
}

/// A titled group of rooms with a short preview.
#[derive(Debug, Clone)]
pub struct Section<'a> {
    pub title: &'static str,
    pub rooms: Vec<&'a RoomEntry>,
}

impl<'a> Section<'a> {
    pub fn preview(&self) -> &[&'a RoomEntry] {
        &self.rooms[..self.rooms.len().min(PREVIEW_LEN)]
    }

    /// Whether a "view all" affordance is needed.
    pub fn has_more(&self) -> bool {
        self.rooms.len() > PREVIEW_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Sections<'a> {
    pub created: Section<'a>,
    pub joined: Section<'a>,
}

/// Split rooms by resolved role: owned rooms under "Created by me", joined
/// rooms the user does not own under "Joined". A room never lands in both.
pub fn sections<'a>(rooms: &'a [RoomEntry], user: Option<&CurrentUser>) -> Sections<'a> {
    let signed_in = user.is_some();
    let created = rooms.iter().filter(|e| signed_in && e.is_owner()).collect();
    let joined = rooms.iter().filter(|e| signed_in && e.is_joined()).collect();
    Sections {
        created: Section {
            title: "Created by me",
            rooms: created,
        },
        joined: Section {
            title: "Joined",
            rooms: joined,
        },
    }
}
