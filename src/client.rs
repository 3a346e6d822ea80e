//! # Room Fetcher
//!
//! ## Responsibility
//! Talk to the remote study-room API: list rooms (with optional per-room
//! detail enrichment), fetch one room, and create, update, or delete rooms.
//!
//! ## Guarantees
//! - No request is issued without a bearer credential; a missing credential
//!   is [`StudyRoomError::AuthMissing`].
//! - Collection order is the server's order.
//! - A failed, slow, or unparseable detail fetch never fails the listing:
//!   that room falls back to its summary record and a `warn!` is emitted.
//! - A body that is not JSON is reported separately from a body that is
//!   malformed JSON, each with a truncated excerpt.
//!
//! ## NOT Responsible For
//! - Retries. Every failure is reported once; callers decide.
//! - Normalization. Records come back raw; see [`crate::normalize`].

use std::time::Duration;

use futures_util::future::join_all;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{excerpt, Result, StudyRoomError};
use crate::model::{collection_items, merge_detail, record_item, RawRoomRecord, RoomId, RoomPayload};

const ROOMS_PATH: &str = "/study_rooms";

/// Configuration for [`RoomApi`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoomApiConfig {
    /// Base URL of the API, e.g. `http://localhost:3000/api`.
    pub base_url: String,
    /// TCP connection timeout.
    pub connect_timeout: Duration,
    /// Per-request timeout for every call.
    pub request_timeout: Duration,
    /// Deadline for each per-room detail fetch during a listing.
    pub detail_timeout: Duration,
    /// Whether listings enrich each summary with its detail record.
    pub fetch_details: bool,
}

impl RoomApiConfig {
    /// Create a config with sensible defaults.
    ///
    /// - connect_timeout: 3 s
    /// - request_timeout: 10 s
    /// - detail_timeout: 5 s
    /// - fetch_details: true
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            detail_timeout: Duration::from_secs(5),
            fetch_details: true,
        }
    }
}

/// HTTP client for the study-room API. Use [`RoomApiBuilder`] for
/// construction.
#[derive(Debug, Clone)]
pub struct RoomApi {
    config: RoomApiConfig,
    client: reqwest::Client,
}

impl RoomApi {
    /// Start building a client aimed at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> RoomApiBuilder {
        RoomApiBuilder::new(base_url)
    }

    pub fn config(&self) -> &RoomApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn room_url(&self, id: &RoomId) -> String {
        self.url(&format!("{ROOMS_PATH}/{id}"))
    }

    /// Fetch every room, in server order.
    ///
    /// When detail fetching is enabled, each room's detail record is fetched
    /// concurrently and shallow-merged over its summary (detail keys win).
    /// Elements of the collection that are not JSON objects are skipped.
    ///
    /// # Returns
    /// - `Err(StudyRoomError::AuthMissing)` when `token` is absent or blank.
    /// - `Err(StudyRoomError::Http | Connect | Timeout)` when the collection
    ///   request fails.
    /// - `Err(StudyRoomError::NonJson | JsonParse)` when the collection body
    ///   cannot be decoded.
    pub async fn list_rooms(&self, token: Option<&str>) -> Result<Vec<RawRoomRecord>> {
        let token = require_token(token)?;
        let url = self.url(ROOMS_PATH);
        let body = self.get_json(&url, token).await?;
        let items = collection_items(body).map_err(|bad| StudyRoomError::JsonParse {
            url: url.clone(),
            detail: bad.detail(),
            excerpt: excerpt(&bad.0.to_string()),
        })?;
        debug!(url = %url, count = items.len(), "fetched room collection");

        let merged = if self.config.fetch_details {
            join_all(items.into_iter().map(|summary| self.enrich(token, summary))).await
        } else {
            items
        };

        Ok(merged
            .into_iter()
            .filter_map(|item| match RawRoomRecord::from_value(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(url = %url, error = %e, "skipping malformed room in collection");
                    None
                }
            })
            .collect())
    }

    /// Merge the detail record for `summary` over it, or return `summary`
    /// unchanged if the detail cannot be fetched in time.
    async fn enrich(&self, token: &str, summary: Value) -> Value {
        let Some(id) = RawRoomRecord::from_value(summary.clone())
            .ok()
            .and_then(|r| r.key())
        else {
            return summary;
        };
        let url = self.room_url(&id);
        match tokio::time::timeout(self.config.detail_timeout, self.get_json(&url, token)).await {
            Ok(Ok(detail)) => merge_detail(summary, record_item(detail)),
            Ok(Err(e)) => {
                warn!(room_id = %id, error = %e, "room detail fetch failed, using summary");
                summary
            }
            Err(_) => {
                warn!(
                    room_id = %id,
                    timeout_ms = self.config.detail_timeout.as_millis() as u64,
                    "room detail fetch timed out, using summary"
                );
                summary
            }
        }
    }

    /// Fetch a single room.
    pub async fn get_room(&self, token: Option<&str>, id: &RoomId) -> Result<RawRoomRecord> {
        let token = require_token(token)?;
        let url = self.room_url(id);
        let body = self.get_json(&url, token).await?;
        decode_record(&url, body)
    }

    /// Create a room. The payload is validated before anything is sent.
    pub async fn create_room(&self, token: Option<&str>, payload: &RoomPayload) -> Result<RawRoomRecord> {
        let token = require_token(token)?;
        payload.validate()?;
        let url = self.url(ROOMS_PATH);
        let req = self.request(Method::POST, &url, token).json(payload);
        let body = self.send_mutation(&url, req).await?;
        match body {
            Some(body) => decode_record(&url, body),
            None => Err(StudyRoomError::JsonParse {
                url,
                detail: "empty response to create".to_string(),
                excerpt: String::new(),
            }),
        }
    }

    /// Replace a room's fields. Returns the server's echo of the record when
    /// it sends one.
    pub async fn update_room(
        &self,
        token: Option<&str>,
        id: &RoomId,
        payload: &RoomPayload,
    ) -> Result<Option<RawRoomRecord>> {
        let token = require_token(token)?;
        payload.validate()?;
        let url = self.room_url(id);
        let req = self.request(Method::PUT, &url, token).json(payload);
        let body = self.send_mutation(&url, req).await?;
        Ok(body.and_then(|b| RawRoomRecord::from_value(record_item(b)).ok()))
    }

    pub async fn delete_room(&self, token: Option<&str>, id: &RoomId) -> Result<()> {
        let token = require_token(token)?;
        let url = self.room_url(id);
        let req = self.request(Method::DELETE, &url, token);
        self.send_mutation(&url, req).await?;
        debug!(room_id = %id, "room deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    fn request(&self, method: Method, url: &str, token: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(token)
    }

    async fn send(&self, url: &str, req: RequestBuilder) -> Result<Response> {
        req.send().await.map_err(|e| transport_error(url, &e))
    }

    async fn get_json(&self, url: &str, token: &str) -> Result<Value> {
        let req = self
            .request(Method::GET, url, token)
            .header(CACHE_CONTROL, "no-cache");
        let resp = self.send(url, req).await?;
        if !resp.status().is_success() {
            return Err(StudyRoomError::Http {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        let content_type = header_str(&resp, CONTENT_TYPE);
        let text = resp.text().await.map_err(|e| transport_error(url, &e))?;
        decode_json(url, content_type.as_deref(), &text)
    }

    /// Send a mutation. `Ok(None)` for a success with an empty body.
    async fn send_mutation(&self, url: &str, req: RequestBuilder) -> Result<Option<Value>> {
        let resp = self.send(url, req).await?;
        let status = resp.status();
        let content_type = header_str(&resp, CONTENT_TYPE);
        let text = resp.text().await.map_err(|e| transport_error(url, &e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .filter(|m| !m.trim().is_empty());
            return Err(match message {
                Some(message) => StudyRoomError::Api {
                    status: status.as_u16(),
                    message,
                },
                None => StudyRoomError::Http {
                    status: status.as_u16(),
                    url: url.to_string(),
                },
            });
        }

        if text.trim().is_empty() {
            return Ok(None);
        }
        decode_json(url, content_type.as_deref(), &text).map(Some)
    }
}

/// Builder for [`RoomApi`].
///
/// # Example
/// ```rust,ignore
/// let api = RoomApi::builder("http://localhost:3000/api")
///     .detail_timeout(Duration::from_secs(2))
///     .build();
/// ```
pub struct RoomApiBuilder {
    config: RoomApiConfig,
}

impl RoomApiBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: RoomApiConfig::new(base_url),
        }
    }

    /// Start from an existing config.
    pub fn from_config(config: RoomApiConfig) -> Self {
        Self { config }
    }

    /// Override the TCP connect timeout (default 3 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Override the per-request timeout (default 10 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Override the per-room detail deadline (default 5 s).
    pub fn detail_timeout(mut self, timeout: Duration) -> Self {
        self.config.detail_timeout = timeout;
        self
    }

    pub fn fetch_details(mut self, enabled: bool) -> Self {
        self.config.fetch_details = enabled;
        self
    }

    /// Consume the builder and construct a [`RoomApi`].
    ///
    /// # Panics
    /// This function never panics.
    pub fn build(self) -> RoomApi {
        // unwrap_or_default() falls back to a default client instead of
        // panicking if the TLS backend cannot be initialised.
        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .build()
            .unwrap_or_default();

        RoomApi {
            config: self.config,
            client,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_token(token: Option<&str>) -> Result<&str> {
    token
        .filter(|t| !t.trim().is_empty())
        .ok_or(StudyRoomError::AuthMissing)
}

fn header_str(resp: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn transport_error(url: &str, e: &reqwest::Error) -> StudyRoomError {
    if e.is_timeout() {
        StudyRoomError::Timeout { url: url.to_string() }
    } else {
        StudyRoomError::Connect {
            url: url.to_string(),
            detail: e.to_string(),
        }
    }
}

/// Decode a response body, telling "not JSON at all" apart from "broken
/// JSON". A body counts as JSON when the content type says so or it opens
/// with `{` or `[`.
pub(crate) fn decode_json(url: &str, content_type: Option<&str>, body: &str) -> Result<Value> {
    let declared = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    let looks_like = matches!(body.trim_start().chars().next(), Some('{' | '['));
    if !declared && !looks_like {
        return Err(StudyRoomError::NonJson {
            url: url.to_string(),
            excerpt: excerpt(body),
        });
    }
    serde_json::from_str(body).map_err(|e| StudyRoomError::JsonParse {
        url: url.to_string(),
        detail: e.to_string(),
        excerpt: excerpt(body),
    })
}

fn decode_record(url: &str, body: Value) -> Result<RawRoomRecord> {
    let item = record_item(body);
    let shown = item.to_string();
    RawRoomRecord::from_value(item).map_err(|e| StudyRoomError::JsonParse {
        url: url.to_string(),
        detail: e.to_string(),
        excerpt: excerpt(&shown),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
