//! Crate-level error type.
//!
//! Every fallible operation in the crate returns [`Result`]. Variants carry
//! enough context (status, URL, truncated body) to diagnose a failure without
//! re-issuing the request.

use thiserror::Error;

/// Longest raw-body excerpt carried by the JSON error variants.
pub const EXCERPT_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum StudyRoomError {
    /// No bearer credential is stored. Callers send the user to the login
    /// surface; no request was issued.
    #[error("not logged in: no credential stored")]
    AuthMissing,

    /// The server replied with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The server rejected a mutation and explained why.
    #[error("request rejected ({status}): {message}")]
    Api { status: u16, message: String },

    /// A TCP-level connection or transport failure.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// The request did not complete within its deadline.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The body was not JSON at all (HTML error page, plain text, ...).
    #[error("non-JSON response from {url}: {excerpt:?}")]
    NonJson { url: String, excerpt: String },

    /// The body looked like JSON but did not parse.
    #[error("JSON parse failure from {url}: {detail} (body starts {excerpt:?})")]
    JsonParse {
        url: String,
        detail: String,
        excerpt: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, StudyRoomError>;

impl From<rusqlite::Error> for StudyRoomError {
    fn from(e: rusqlite::Error) -> Self {
        StudyRoomError::Storage(e.to_string())
    }
}

/// Truncate `body` to at most [`EXCERPT_LIMIT`] characters, never splitting
/// a UTF-8 sequence.
pub fn excerpt(body: &str) -> String {
    match body.char_indices().nth(EXCERPT_LIMIT) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
