//! Cached user directory, used for assignee pickers and name lookups.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use taskdeck_proto::model::{User, UserRef};

use super::SyncError;
use crate::api::RemoteApi;

/// Users fetched from the server, cached for the session.
pub struct UserDirectory<A> {
    api: Arc<A>,
    cache: Arc<Mutex<HashMap<String, User>>>,
}

impl<A> Clone for UserDirectory<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<A> std::fmt::Debug for UserDirectory<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory")
            .field("cached", &self.cache.lock().len())
            .finish_non_exhaustive()
    }
}

impl<A: RemoteApi> UserDirectory<A> {
    /// Creates an empty directory.
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetches every user and refreshes the cache.
    ///
    /// # Errors
    ///
    /// Returns the request's [`SyncError`].
    pub async fn fetch_all(&self) -> Result<Vec<User>, SyncError> {
        let users = self.api.list_users().await?;
        let mut cache = self.cache.lock();
        cache.clear();
        cache.extend(users.iter().map(|u| (u.id.clone(), u.clone())));
        tracing::debug!(count = users.len(), "user directory refreshed");
        Ok(users)
    }

    /// Returns a user, fetching it only on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns the request's [`SyncError`] on a miss that fails.
    pub async fn fetch_by_id(&self, id: &str) -> Result<User, SyncError> {
        if let Some(user) = self.cached(id) {
            return Ok(user);
        }
        let user = self.api.get_user(id).await?;
        self.cache.lock().insert(user.id.clone(), user.clone());
        Ok(user)
    }
}

impl<A> UserDirectory<A> {
    /// Cached user, if known.
    #[must_use]
    pub fn cached(&self, id: &str) -> Option<User> {
        self.cache.lock().get(id).cloned()
    }

    /// Embedded reference for a cached user.
    #[must_use]
    pub fn user_ref(&self, id: &str) -> Option<UserRef> {
        self.cache.lock().get(id).map(User::to_ref)
    }

    /// Forgets every cached user.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}
