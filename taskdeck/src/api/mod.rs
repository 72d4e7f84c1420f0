//! Remote task API abstraction.
//!
//! Defines the [`RemoteApi`] trait every backend satisfies:
//! - [`http::HttpApi`] talks to the REST server over `reqwest`
//! - [`loopback::LoopbackApi`] keeps everything in process and echoes
//!   change events to attached hubs, for tests and offline demos
//!
//! Identifiers passed to the trait are server identifiers; callers never
//! send a transient id over the wire.

pub mod http;
pub mod loopback;

use std::future::Future;

use taskdeck_proto::DecodeError;
use taskdeck_proto::api::{
    AccessToken, Credentials, NewComment, NewTask, Registration, TaskPatch, TaskQuery,
};
use taskdeck_proto::model::{Comment, Task, TaskDetail, TaskStatus, User};

/// Errors returned by a [`RemoteApi`] call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The credentials or token were rejected (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The resource does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The server refused the request (other 4xx, including 403 for
    /// actions the signed-in user may not take).
    #[error("request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided reason.
        message: String,
    },

    /// The server failed (5xx).
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Server-provided reason.
        message: String,
    },

    /// The request never got a response (connection refused, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not match the expected schema.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ApiError {
    /// Maps an HTTP failure status and message to an error.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::Unauthorized(message),
            404 => Self::NotFound(message),
            500..=599 => Self::Server { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    /// Returns `true` for failures where the same request may succeed later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Server { .. })
    }
}

/// Async access to the task server.
///
/// Every method resolves to the server's view of the entity after the
/// operation. Implementations must be usable from spawned tasks, so all
/// futures are `Send`.
pub trait RemoteApi: Send + Sync + 'static {
    /// Exchanges credentials for a token.
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<AccessToken, ApiError>> + Send;

    /// Creates an account and returns its token.
    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<AccessToken, ApiError>> + Send;

    /// Lists tasks matching `query`.
    fn list_tasks(
        &self,
        query: &TaskQuery,
    ) -> impl Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Fetches one task with its comment thread.
    fn get_task(&self, id: &str) -> impl Future<Output = Result<TaskDetail, ApiError>> + Send;

    /// Creates a task; the returned task carries the server identifier.
    fn create_task(&self, task: &NewTask) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Applies a partial update.
    fn update_task(
        &self,
        id: &str,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Moves a task to `status`.
    fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Assigns a task to a user.
    fn assign_task(
        &self,
        id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Deletes a task.
    fn delete_task(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Lists the comments of a task.
    fn list_comments(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Vec<Comment>, ApiError>> + Send;

    /// Adds a comment to a task.
    fn add_comment(
        &self,
        task_id: &str,
        comment: &NewComment,
    ) -> impl Future<Output = Result<Comment, ApiError>> + Send;

    /// Lists all users.
    fn list_users(&self) -> impl Future<Output = Result<Vec<User>, ApiError>> + Send;

    /// Fetches one user.
    fn get_user(&self, id: &str) -> impl Future<Output = Result<User, ApiError>> + Send;
}
