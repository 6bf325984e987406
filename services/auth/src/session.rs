//! Persisted authentication state
//!
//! `AuthSession` keeps the token pair and the cached user in client storage
//! under three keys. Reads are public; every write is crate-private so the
//! only way to mutate the session is through `AuthClient` operations.

use std::sync::Arc;

use common::{
    ClientResult,
    storage::{KeyValueStore, MemoryStore},
};
use tracing::{info, warn};

use crate::models::User;

/// Storage key of the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Storage key of the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Storage key of the serialized user
pub const USER_KEY: &str = "user";

/// Handle over the persisted session, cheap to clone and share
#[derive(Clone, Debug)]
pub struct AuthSession {
    store: Arc<dyn KeyValueStore>,
}

impl AuthSession {
    /// Create a session over an existing store
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Create a session that only lives in memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value.filter(|value| !value.is_empty()),
            Err(e) => {
                warn!("Failed to read {} from client storage: {}", key, e);
                None
            }
        }
    }

    /// Stored access token, if any
    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    /// Stored refresh token, if any
    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    /// Cached user record, if any and well-formed
    pub fn current_user(&self) -> Option<User> {
        let raw = self.read(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Ignoring malformed cached user: {}", e);
                None
            }
        }
    }

    /// True iff both an access token and a user record are stored.
    /// The token is not validated against the server.
    pub fn is_authenticated(&self) -> bool {
        self.read(ACCESS_TOKEN_KEY).is_some() && self.read(USER_KEY).is_some()
    }

    /// Store the outcome of a login or registration
    pub(crate) fn store_login(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user: &User,
    ) -> ClientResult<()> {
        self.store.set(ACCESS_TOKEN_KEY, access_token)?;
        match refresh_token {
            Some(token) => self.store.set(REFRESH_TOKEN_KEY, token)?,
            None => self.store.delete(REFRESH_TOKEN_KEY)?,
        }
        self.store_user(user)?;

        info!("Session stored for user: {}", user.username);
        Ok(())
    }

    pub(crate) fn store_user(&self, user: &User) -> ClientResult<()> {
        let serialized = serde_json::to_string(user)?;
        self.store.set(USER_KEY, &serialized)?;
        Ok(())
    }

    pub(crate) fn store_access_token(&self, access_token: &str) -> ClientResult<()> {
        self.store.set(ACCESS_TOKEN_KEY, access_token)?;
        Ok(())
    }

    pub(crate) fn store_refresh_token(&self, refresh_token: &str) -> ClientResult<()> {
        self.store.set(REFRESH_TOKEN_KEY, refresh_token)?;
        Ok(())
    }

    /// Remove the token pair and the user together
    pub(crate) fn clear(&self) -> ClientResult<()> {
        self.store
            .delete_all(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY])?;
        info!("Session cleared");
        Ok(())
    }
}
