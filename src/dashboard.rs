//! # Dashboard store
//!
//! ## Responsibility
//! Own the reconciled room list for the signed-in user and publish it to
//! every surface through a `tokio::sync::watch` channel. Fetches go through
//! [`RoomApi`]; local state goes through the injected [`KeyValueStore`].
//!
//! ## Guarantees
//! - A newer [`Dashboard::refresh`] aborts the one in flight; a superseded
//!   refresh never publishes.
//! - Join, leave, delete, create, and edit update the published list in
//!   place. No mutation triggers a full reload.
//! - [`RoomEntry::is_owner`] and [`RoomEntry::is_joined`] are never both true.
//! - A failed refresh keeps the previously published rooms.
//!
//! ## NOT Responsible For
//! - Retrying failed fetches.
//! - Cross-process coordination (see [`crate::storage`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::client::RoomApi;
use crate::error::{Result, StudyRoomError};
use crate::ledger::{LedgerStore, MembershipLedger};
use crate::metadata::{MetadataMap, MetadataStore, RoomMetadata};
use crate::model::{RawRoomRecord, RoomId, RoomPayload};
use crate::normalize::{normalize, RoomView};
use crate::ownership::{resolve, Role};
use crate::session::{CurrentUser, Session};
use crate::storage::{keys, SharedStore};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A normalized room plus the current user's role in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomEntry {
    pub view: RoomView,
    pub role: Role,
}

impl RoomEntry {
    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    /// Joined and not the owner.
    pub fn is_joined(&self) -> bool {
        self.role == Role::Member
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed(String),
    /// No credential is stored; the user has to sign in first.
    LoginRequired,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashboardState {
    pub status: LoadStatus,
    pub rooms: Vec<RoomEntry>,
}

impl DashboardState {
    pub fn room(&self, id: &RoomId) -> Option<&RoomEntry> {
        self.rooms.iter().find(|e| &e.view.room_id == id)
    }
}

/// Local inputs to reconciliation, read once per derivation.
struct LocalState {
    user: Option<CurrentUser>,
    ledger: MembershipLedger,
    metadata: MetadataMap,
}

impl LocalState {
    fn entry_for(&self, raw: &RawRoomRecord) -> RoomEntry {
        let meta = raw.key().and_then(|k| self.metadata.get(&k).cloned());
        let mut view = normalize(raw, meta.as_ref(), &self.ledger);
        if let Some(user) = &self.user {
            view.confirm_membership(&user.id);
        }
        let role = resolve(self.user.as_ref(), &view);
        RoomEntry { view, role }
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

pub struct Dashboard {
    api: RoomApi,
    store: SharedStore,
    state: watch::Sender<DashboardState>,
    /// Raw records behind the published entries, same order.
    raw: Mutex<Vec<RawRoomRecord>>,
    inflight: Mutex<Option<AbortHandle>>,
    generation: AtomicU64,
}

impl Dashboard {
    pub fn new(api: RoomApi, store: SharedStore) -> Self {
        let (state, _rx) = watch::channel(DashboardState::default());
        Self {
            api,
            store,
            state,
            raw: Mutex::new(Vec::new()),
            inflight: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DashboardState {
        self.state.borrow().clone()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    fn session(&self) -> Result<Session> {
        Session::load(self.store.as_ref())
    }

    fn local_state(&self) -> Result<LocalState> {
        Ok(LocalState {
            user: self.session()?.user,
            ledger: LedgerStore::new(self.store.as_ref()).load()?,
            metadata: MetadataStore::new(self.store.as_ref()).load()?,
        })
    }

    fn raw(&self) -> Result<MutexGuard<'_, Vec<RawRoomRecord>>> {
        lock(&self.raw)
    }

    fn set_status(&self, status: LoadStatus) {
        self.state.send_modify(|s| s.status = status);
    }

    /// Fetch and reconcile the room list.
    ///
    /// Returns `Ok(())` without publishing when a newer refresh superseded
    /// this one.
    pub async fn refresh(&self) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session = self.session()?;
        let Some(token) = session.token.clone() else {
            self.abort_inflight()?;
            *self.raw()? = Vec::new();
            self.state.send_replace(DashboardState {
                status: LoadStatus::LoginRequired,
                rooms: Vec::new(),
            });
            return Err(StudyRoomError::AuthMissing);
        };

        self.set_status(LoadStatus::Loading);
        let api = self.api.clone();
        let handle: JoinHandle<Result<Vec<RawRoomRecord>>> =
            tokio::spawn(async move { api.list_rooms(Some(&token)).await });
        if let Some(previous) = lock(&self.inflight)?.replace(handle.abort_handle()) {
            debug!("aborting superseded room refresh");
            previous.abort();
        }

        let outcome = handle.await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "refresh superseded, discarding result");
            return Ok(());
        }
        lock(&self.inflight)?.take();

        match outcome {
            Ok(Ok(records)) => {
                let local = self.local_state()?;
                let rooms: Vec<RoomEntry> = records.iter().map(|r| local.entry_for(r)).collect();
                info!(count = rooms.len(), "rooms refreshed");
                *self.raw()? = records;
                self.state.send_replace(DashboardState {
                    status: LoadStatus::Ready,
                    rooms,
                });
                Ok(())
            }
            Ok(Err(StudyRoomError::AuthMissing)) => {
                self.set_status(LoadStatus::LoginRequired);
                Err(StudyRoomError::AuthMissing)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "room refresh failed");
                self.set_status(LoadStatus::Failed(e.to_string()));
                Err(e)
            }
            Err(join) if join.is_cancelled() => Ok(()),
            Err(join) => {
                let e = StudyRoomError::Connect {
                    url: self.api.config().base_url.clone(),
                    detail: join.to_string(),
                };
                self.set_status(LoadStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    fn abort_inflight(&self) -> Result<()> {
        if let Some(previous) = lock(&self.inflight)?.take() {
            previous.abort();
        }
        Ok(())
    }

    /// Re-derive membership, metadata overlays, and roles from local state
    /// without fetching. `only` limits the work to one room.
    pub fn rederive(&self, only: Option<&RoomId>) -> Result<()> {
        let local = self.local_state()?;
        let raw = self.raw()?;
        self.state.send_modify(|state| {
            for (entry, record) in state.rooms.iter_mut().zip(raw.iter()) {
                if only.map_or(true, |id| &entry.view.room_id == id) {
                    *entry = local.entry_for(record);
                }
            }
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Join a room locally. The server is not told; the ledger is the record.
    pub fn join(&self, id: &RoomId) -> Result<()> {
        LedgerStore::new(self.store.as_ref()).join(id)?;
        self.rederive(Some(id))
    }

    pub fn leave(&self, id: &RoomId) -> Result<()> {
        LedgerStore::new(self.store.as_ref()).leave(id)?;
        self.rederive(Some(id))
    }

    /// Delete a room the user owns. Ledger and metadata are left as they are.
    pub async fn delete(&self, id: &RoomId) -> Result<()> {
        let role = self
            .snapshot()
            .room(id)
            .map(|e| e.role)
            .ok_or_else(|| StudyRoomError::Invalid(format!("unknown room {id}")))?;
        if role != Role::Owner {
            return Err(StudyRoomError::Invalid(format!("only the owner can delete room {id}")));
        }
        let token = self.session()?.token;
        self.api.delete_room(token.as_deref(), id).await?;

        let mut raw = self.raw()?;
        self.state.send_modify(|state| {
            if let Some(pos) = state.rooms.iter().position(|e| &e.view.room_id == id) {
                state.rooms.remove(pos);
                if pos < raw.len() {
                    raw.remove(pos);
                }
            }
        });
        info!(room_id = %id, "room deleted");
        Ok(())
    }

    /// Create a room and record its locally owned fields and creator hints.
    pub async fn create(&self, payload: &RoomPayload) -> Result<RoomEntry> {
        let session = self.session()?;
        let mut record = self.api.create_room(session.token.as_deref(), payload).await?;
        let id = record
            .key()
            .ok_or_else(|| StudyRoomError::Invalid("server did not return a room id".to_string()))?;
        if record.room_id.is_none() {
            record.room_id = Some(id.clone());
        }
        record.apply_payload(payload);

        let mut meta = RoomMetadata::from_payload(payload);
        if let Some(user) = &session.user {
            meta.creator_id = Some(user.id.clone());
            meta.username = Some(user.username.clone());
            meta.email = Some(user.email.clone());
        }
        MetadataStore::new(self.store.as_ref()).upsert(&id, meta)?;

        let entry = self.local_state()?.entry_for(&record);
        self.raw()?.push(record);
        let published = entry.clone();
        self.state.send_modify(|state| state.rooms.push(published));
        info!(room_id = %id, "room created");
        Ok(entry)
    }

    /// Save an edit: update the server, record the overrides locally, and
    /// replace the entry in place.
    pub async fn save_edit(&self, id: &RoomId, payload: &RoomPayload) -> Result<RoomEntry> {
        let token = self.session()?.token;
        let echo = self.api.update_room(token.as_deref(), id, payload).await?;
        MetadataStore::new(self.store.as_ref()).upsert(id, RoomMetadata::from_payload(payload))?;

        let local = self.local_state()?;
        let mut raw = self.raw()?;
        let pos = raw.iter().position(|r| r.key().as_ref() == Some(id));
        let mut record = echo
            .or_else(|| pos.map(|p| raw[p].clone()))
            .unwrap_or_default();
        if record.key().is_none() {
            record.room_id = Some(id.clone());
        }
        record.apply_payload(payload);
        let entry = local.entry_for(&record);

        let published = entry.clone();
        match pos {
            Some(p) => {
                raw[p] = record;
                self.state.send_modify(|state| {
                    if let Some(slot) = state.rooms.get_mut(p) {
                        *slot = published;
                    }
                });
            }
            None => {
                raw.push(record);
                self.state.send_modify(|state| state.rooms.push(published));
            }
        }
        info!(room_id = %id, "room updated");
        Ok(entry)
    }

    // -----------------------------------------------------------------------
    // Storage events
    // -----------------------------------------------------------------------

    /// Re-derive roles whenever another writer changes the ledger, the
    /// metadata, or the signed-in identity. Returns `None` when the backend
    /// publishes no change events.
    pub fn watch_storage(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut events = self.store.subscribe()?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ev) if is_reconciliation_key(&ev.key) => {
                        if let Err(e) = this.rederive(None) {
                            warn!(error = %e, key = %ev.key, "re-derive after storage change failed");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "storage events lagged, re-deriving everything");
                        if let Err(e) = this.rederive(None) {
                            warn!(error = %e, "re-derive after lag failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

fn is_reconciliation_key(key: &str) -> bool {
    matches!(
        key,
        keys::JOINED_ROOMS | keys::ROOM_METADATA | keys::USER_ID | keys::USERNAME | keys::EMAIL
    )
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| StudyRoomError::Storage("internal: lock poisoned".to_string()))
}
