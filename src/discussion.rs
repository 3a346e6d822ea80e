//! Community discussion threads, kept in local storage under `discussions`.
//!
//! Threads and replies are plain records; there is no live transport, so a
//! reply only shows up for other users once something else syncs storage.
//! A thread or reply that fails to decode is skipped on load and dropped on
//! the next write; the others are kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, StudyRoomError};
use crate::storage::{keys, read_json_list, write_json, KeyValueStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: Uuid,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "replies_skipping_malformed")]
    pub replies: Vec<Reply>,
}

fn replies_skipping_malformed<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<Reply>, D::Error> {
    let items = match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!(error = %e, "skipping malformed reply");
                None
            }
        })
        .collect())
}

impl Thread {
    /// Time of the newest reply, or creation time for a quiet thread.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.replies
            .iter()
            .map(|r| r.created_at)
            .max()
            .map_or(self.created_at, |t| t.max(self.created_at))
    }

    pub fn reply_count(&self) -> usize {
        self.replies.len()
    }
}

/// Read-modify-write access to the thread list.
pub struct DiscussionBoard<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> DiscussionBoard<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    fn load(&self) -> Result<Vec<Thread>> {
        read_json_list(self.store, keys::DISCUSSIONS)
    }

    fn save(&self, threads: &[Thread]) -> Result<()> {
        write_json(self.store, keys::DISCUSSIONS, threads)
    }

    /// All threads, most recently active first.
    pub fn threads(&self) -> Result<Vec<Thread>> {
        let mut threads = self.load()?;
        threads.sort_by_key(|t| std::cmp::Reverse(t.last_activity()));
        Ok(threads)
    }

    pub fn thread(&self, id: Uuid) -> Result<Option<Thread>> {
        Ok(self.load()?.into_iter().find(|t| t.id == id))
    }

    pub fn post_thread(&self, author: &str, title: &str, subject: &str, body: &str) -> Result<Thread> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StudyRoomError::Invalid("thread title is required".to_string()));
        }
        let thread = Thread {
            id: Uuid::new_v4(),
            title: title.to_string(),
            author: author.to_string(),
            subject: subject.trim().to_string(),
            body: body.trim().to_string(),
            created_at: Utc::now(),
            replies: Vec::new(),
        };
        let mut threads = self.load()?;
        threads.push(thread.clone());
        self.save(&threads)?;
        debug!(thread_id = %thread.id, "thread posted");
        Ok(thread)
    }

    /// Append a reply. Blank text and unknown threads are rejected.
    pub fn reply(&self, thread_id: Uuid, author: &str, text: &str) -> Result<Reply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StudyRoomError::Invalid("reply must not be empty".to_string()));
        }
        let mut threads = self.load()?;
        let thread = threads
            .iter_mut()
            .find(|t| t.id == thread_id)
            .ok_or_else(|| StudyRoomError::Invalid(format!("no thread {thread_id}")))?;
        let reply = Reply {
            id: Uuid::new_v4(),
            author: author.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        };
        thread.replies.push(reply.clone());
        self.save(&threads)?;
        debug!(thread_id = %thread_id, reply_id = %reply.id, "reply posted");
        Ok(reply)
    }
}
