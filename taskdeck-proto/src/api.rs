//! Request and response bodies for the task API.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::DecodeError;
use crate::model::{TaskPriority, TaskStatus};

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
    /// Display name.
    pub name: String,
}

/// Response of the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Bearer token for subsequent requests and the event channel.
    pub access_token: String,
}

/// Body of `POST /tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Initial status.
    pub status: TaskStatus,
    /// Priority.
    pub priority: TaskPriority,
    /// Assignee user id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

/// Body of `PUT /tasks/:id`. Only present fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// New priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    /// `Some(None)` unassigns; `Some(Some(id))` reassigns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<String>>,
}

impl TaskPatch {
    /// Returns `true` if no field would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
    }
}

/// Body of `PUT /tasks/:id/status`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusChange {
    /// Target status.
    pub status: TaskStatus,
}

/// Body of `POST /tasks/:id/assign`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// User to assign.
    pub user_id: String,
}

/// Body of `POST /tasks/:id/comments`.
#[derive(Debug, Clone, Serialize)]
pub struct NewComment {
    /// Comment text.
    pub comment: String,
}

/// Query parameters of `GET /tasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    /// Filter by status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// Filter by priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    /// Filter by assignee user id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// Filter by creator user id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// 1-based page number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Free-text search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

/// A response body that may or may not be wrapped in `{ "data": ... }`.
///
/// The list endpoint wraps (`{ data: [...], message }`), the detail and
/// user endpoints return bare bodies. Both decode through this type.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Payload<T> {
    /// `{ "data": T, "message"?: string }`.
    Wrapped {
        /// The wrapped value.
        data: T,
        /// Optional server message.
        #[serde(default)]
        message: Option<String>,
    },
    /// The bare value.
    Bare(T),
}

impl<T> Payload<T> {
    /// Returns the value regardless of wrapping.
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data, .. } | Self::Bare(data) => data,
        }
    }
}

/// Decodes a response body (wrapped or bare) into `T`.
///
/// # Errors
///
/// Returns [`DecodeError::Schema`] naming `context` if the body matches
/// neither shape.
pub fn decode_body<T: DeserializeOwned>(context: &str, body: &[u8]) -> Result<T, DecodeError> {
    serde_json::from_slice::<Payload<T>>(body)
        .map(Payload::into_inner)
        .map_err(|e| DecodeError::schema(context, e))
}

/// Error body returned by the API on failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Message, either a string or a list of validation messages.
    #[serde(default)]
    pub message: Option<serde_json::Value>,
    /// Short error label.
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// Flattens the message into a single line.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        match &self.message {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            _ => self.error.clone(),
        }
    }
}
