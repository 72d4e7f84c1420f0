//! Client-side synchronization.
//!
//! A [`Workspace`] owns the task store, the comment board and the user
//! directory for one session. User actions apply optimistically and are
//! reconciled with the server's answer; real-time events are folded in
//! through the same idempotent store operations, so an action and its own
//! echo converge to a single entry.
//!
//! Failures are sorted into the [`SyncError`] taxonomy. Failed writes roll
//! back and raise a transient [`Notice`]; failed reads are returned inline.
//! An authentication failure anywhere clears the session.

pub mod detail;
pub mod ingest;
pub mod mutation;
pub mod users;
pub mod validate;
pub mod workspace;

use taskdeck_proto::DecodeError;
use taskdeck_proto::model::TaskId;

use crate::api::ApiError;

pub use detail::{LoadState, TaskDetailView};
pub use ingest::{Change, Feed};
pub use mutation::{MutationKind, PendingMutation, Resolution, Snapshot};
pub use users::UserDirectory;
pub use validate::{TaskDraft, ValidationError};
pub use workspace::{SyncSettings, Workspace};

/// Errors surfaced to the presentation layer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Missing, invalid or expired credentials. The session is cleared.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Input was refused, locally or by the server.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The server could not be reached or failed.
    #[error("network error: {0}")]
    Network(String),

    /// The entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server answered with something that did not match its schema.
    #[error("unexpected response: {0}")]
    Decode(#[from] DecodeError),
}

impl SyncError {
    /// Returns `true` if retrying the same action may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(message) => Self::Authentication(message),
            ApiError::NotFound(message) => Self::NotFound(message),
            ApiError::Rejected { message, .. } => {
                Self::Validation(ValidationError::Rejected(message))
            }
            ApiError::Server { status, message } => {
                Self::Network(format!("server error {status}: {message}"))
            }
            ApiError::Transport(message) => Self::Network(message),
            ApiError::Decode(e) => Self::Decode(e),
        }
    }
}

/// A user action that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Signing in.
    Login,
    /// Creating an account.
    Register,
    /// Creating a task.
    CreateTask,
    /// Editing a task.
    UpdateTask,
    /// Changing a task's status.
    UpdateStatus,
    /// Assigning a task.
    AssignTask,
    /// Deleting a task.
    DeleteTask,
    /// Posting a comment.
    AddComment,
}

/// Where the presentation layer should go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The sign-in screen.
    Login,
    /// The task list.
    Dashboard,
    /// One task's detail view.
    Task(TaskId),
}

/// Transient message for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A write failed and was rolled back.
    ActionFailed {
        /// What the user tried to do.
        action: Action,
        /// Human-readable reason.
        message: String,
    },
    /// The server rejected the session; the user must sign in again.
    SessionExpired,
    /// Navigate somewhere.
    Navigate(Route),
}
