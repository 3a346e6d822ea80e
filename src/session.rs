//! Signed-in user credential and identity, as persisted in local storage.
//!
//! Authentication itself happens elsewhere; this module only reads and
//! writes what a successful sign-in left behind.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyRoomError};
use crate::storage::{keys, KeyValueStore};

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    /// Present only when id, username, and email are all stored.
    pub user: Option<CurrentUser>,
}

impl Session {
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let token = store.get(keys::TOKEN)?.filter(|t| !t.trim().is_empty());
        let id = store.get(keys::USER_ID)?;
        let username = store.get(keys::USERNAME)?;
        let email = store.get(keys::EMAIL)?;
        let user = match (id, username, email) {
            (Some(id), Some(username), Some(email))
                if !id.is_empty() && !username.is_empty() && !email.is_empty() =>
            {
                Some(CurrentUser { id, username, email })
            }
            _ => None,
        };
        Ok(Self { token, user })
    }

    /// Persist a credential and identity obtained from a sign-in.
    pub fn save(store: &dyn KeyValueStore, token: &str, user: &CurrentUser) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(StudyRoomError::Invalid("token must not be empty".to_string()));
        }
        store.set(keys::TOKEN, token)?;
        store.set(keys::USER_ID, &user.id)?;
        store.set(keys::USERNAME, &user.username)?;
        store.set(keys::EMAIL, &user.email)?;
        Ok(Self {
            token: Some(token.to_string()),
            user: Some(user.clone()),
        })
    }

    /// Forget the credential and identity. Ledger and metadata are kept.
    pub fn clear(store: &dyn KeyValueStore) -> Result<()> {
        for key in [keys::TOKEN, keys::USER_ID, keys::USERNAME, keys::EMAIL] {
            store.remove(key)?;
        }
        Ok(())
    }

    pub fn require_token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(StudyRoomError::AuthMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_empty_store_has_no_session() {
        let store = MemoryStore::new();
        let s = Session::load(&store).unwrap();
        assert!(s.token.is_none());
        assert!(s.user.is_none());
        assert!(matches!(s.require_token(), Err(StudyRoomError::AuthMissing)));
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryStore::new();
        let user = CurrentUser::new("7", "ada", "ada@example.com");
        Session::save(&store, "tok", &user).unwrap();
        let s = Session::load(&store).unwrap();
        assert_eq!(s.require_token().unwrap(), "tok");
        assert_eq!(s.user, Some(user));
    }

    #[test]
    fn test_partial_identity_yields_no_user() {
        let store = MemoryStore::new();
        store.set(keys::TOKEN, "tok").unwrap();
        store.set(keys::USER_ID, "7").unwrap();
        let s = Session::load(&store).unwrap();
        assert!(s.token.is_some());
        assert!(s.user.is_none());
    }

    #[test]
    fn test_blank_token_is_missing() {
        let store = MemoryStore::new();
        store.set(keys::TOKEN, "  ").unwrap();
        assert!(Session::load(&store).unwrap().token.is_none());
    }

    #[test]
    fn test_clear_removes_credentials() {
        let store = MemoryStore::new();
        Session::save(&store, "tok", &CurrentUser::new("1", "a", "a@x")).unwrap();
        Session::clear(&store).unwrap();
        assert_eq!(Session::load(&store).unwrap(), Session::default());
    }

    #[test]
    fn test_save_rejects_empty_token() {
        let store = MemoryStore::new();
        let err = Session::save(&store, "", &CurrentUser::new("1", "a", "a@x")).unwrap_err();
        assert!(matches!(err, StudyRoomError::Invalid(_)));
    }
}
