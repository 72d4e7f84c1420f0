//! Authentication session: the bearer token and the identity inside it.
//!
//! The session moves through three states. It starts [`SessionState::Unchecked`]
//! until durable storage has been consulted, then becomes either
//! [`SessionState::Absent`] or [`SessionState::Active`]. Only a token whose
//! payload decodes (and has not expired) ever makes the session active.
//!
//! Observers subscribe through a `tokio::sync::watch` channel; the realtime
//! supervisor uses it to tie the event connection to the session.

pub mod storage;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::watch;

pub use storage::{FileTokenStorage, MemoryTokenStorage, TokenStorage};

/// Why a token could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidToken {
    /// The token does not have the `header.payload.signature` shape.
    #[error("token is not a three-part JWT")]
    Shape,
    /// The payload segment is not valid base64url.
    #[error("token payload is not base64url")]
    Encoding,
    /// The payload is not the expected JSON.
    #[error("token payload is not valid claims JSON: {0}")]
    Claims(String),
    /// The payload carries no subject.
    #[error("token has no subject")]
    MissingSubject,
    /// The `exp` claim is in the past.
    #[error("token expired")]
    Expired,
}

/// Errors from the session layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token failed to decode; the session was cleared.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] InvalidToken),

    /// The token file could not be read or written.
    #[error("token storage at {path}: {source}")]
    Storage {
        /// Path of the token file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Identity claims carried in the token payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// User identifier.
    pub sub: String,
    /// Account email.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Expiry as seconds since the Unix epoch.
    #[serde(default)]
    pub exp: Option<i64>,
}

impl Claims {
    /// Decodes the payload segment of `token`.
    ///
    /// The signature is not verified; the server does that on every request.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidToken`] describing the first problem found.
    pub fn decode(token: &str) -> Result<Self, InvalidToken> {
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(InvalidToken::Shape);
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| InvalidToken::Encoding)?;
        let claims: Self =
            serde_json::from_slice(&bytes).map_err(|e| InvalidToken::Claims(e.to_string()))?;

        if claims.sub.is_empty() {
            return Err(InvalidToken::MissingSubject);
        }
        if claims.exp.is_some_and(|exp| exp <= Utc::now().timestamp()) {
            return Err(InvalidToken::Expired);
        }
        Ok(claims)
    }
}

/// An authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    claims: Claims,
}

impl Session {
    /// The bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Decoded identity claims.
    #[must_use]
    pub const fn claims(&self) -> &Claims {
        &self.claims
    }

    /// The current user's identifier.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Where the session stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Durable storage has not been consulted yet.
    Unchecked,
    /// No valid token.
    Absent,
    /// A token is held and its identity decoded.
    Active(Session),
}

impl SessionState {
    /// Returns the session if active.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::Active(session) => Some(session),
            Self::Unchecked | Self::Absent => None,
        }
    }

    /// Returns `true` while a token is held.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

struct Inner {
    storage: Box<dyn TokenStorage>,
    state: watch::Sender<SessionState>,
}

/// Shared handle to the session. Cloning yields another handle to the same
/// session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Creates an unchecked session backed by `storage`.
    pub fn new(storage: impl TokenStorage + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage: Box::new(storage),
                state: watch::Sender::new(SessionState::Unchecked),
            }),
        }
    }

    /// Creates a session that never touches disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryTokenStorage::new())
    }

    /// Accepts a freshly issued token.
    ///
    /// On success the token is persisted and the session becomes active. A
    /// token that fails to decode leaves the session cleared.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidToken`] if the token cannot be decoded.
    /// A failure to persist is logged, not returned; the session stays
    /// active for this process.
    pub fn set_token(&self, token: &str) -> Result<Session, SessionError> {
        let claims = match Claims::decode(token) {
            Ok(claims) => claims,
            Err(reason) => {
                tracing::warn!(%reason, "rejecting session token");
                self.clear();
                return Err(reason.into());
            }
        };

        if let Err(e) = self.inner.storage.save(token) {
            tracing::warn!(err = %e, "failed to persist session token");
        }

        let session = Session {
            token: token.to_string(),
            claims,
        };
        tracing::info!(user_id = %session.user_id(), "session active");
        self.inner
            .state
            .send_replace(SessionState::Active(session.clone()));
        Ok(session)
    }

    /// Drops the token from memory and storage. Calling it again is a no-op.
    pub fn clear(&self) {
        if let Err(e) = self.inner.storage.remove() {
            tracing::warn!(err = %e, "failed to remove stored session token");
        }
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == SessionState::Absent {
                false
            } else {
                *state = SessionState::Absent;
                true
            }
        });
        if changed {
            tracing::info!("session cleared");
        }
    }

    /// Restores the session from durable storage.
    ///
    /// A stored token that fails to decode is discarded and the session
    /// ends up absent. Storage read failures are treated the same way.
    pub fn rehydrate(&self) -> SessionState {
        let stored = match self.inner.storage.load() {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(err = %e, "cannot read stored session token");
                None
            }
        };

        match stored {
            Some(token) => match Claims::decode(&token) {
                Ok(claims) => {
                    let session = Session { token, claims };
                    tracing::debug!(user_id = %session.user_id(), "session restored");
                    self.inner.state.send_replace(SessionState::Active(session));
                }
                Err(reason) => {
                    tracing::warn!(%reason, "discarding stored session token");
                    self.clear();
                }
            },
            None => self.clear(),
        }
        self.state()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// The active session, if any.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.inner.state.borrow().session().cloned()
    }

    /// The bearer token, if a session is active.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .session()
            .map(|s| s.token.clone())
    }

    /// Watches state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }
}

/// Builds an unsigned token carrying `claims` as its payload.
///
/// Used by the in-process API and by tests; the client never mints tokens
/// for the real server.
#[must_use]
pub fn mint_unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.unsigned")
}
