//! Entity schemas: tasks, comments and users.
//!
//! Wire names are camelCase. A comment's text travels in `comment` and its
//! author in `user`; the Rust fields use `body` and `author`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Prefix used when a local identifier has to be rendered as a string.
const LOCAL_ID_PREFIX: &str = "local:";

/// Identifier of a task or comment.
///
/// An entity is either transient (created locally, not yet confirmed by
/// the server) or persisted (carrying the server-assigned identifier).
/// Strings decode to [`EntityId::Remote`] unless they are a `local:`
/// prefixed UUID, which is how a transient id serializes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    /// Temporary identifier assigned by this client before confirmation.
    Local(Uuid),
    /// Identifier assigned by the server.
    Remote(String),
}

/// Identifier of a task.
pub type TaskId = EntityId;

/// Identifier of a comment.
pub type CommentId = EntityId;

impl EntityId {
    /// Creates a fresh transient identifier (UUID v7, time-ordered).
    #[must_use]
    pub fn local() -> Self {
        Self::Local(Uuid::now_v7())
    }

    /// Wraps a server-assigned identifier.
    pub fn remote(id: impl Into<String>) -> Self {
        Self::Remote(id.into())
    }

    /// Returns `true` if the server has not assigned this identifier yet.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Returns the server identifier, or `None` for transient ids.
    #[must_use]
    pub fn as_remote(&self) -> Option<&str> {
        match self {
            Self::Remote(id) => Some(id),
            Self::Local(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(uuid) => write!(f, "{LOCAL_ID_PREFIX}{uuid}"),
            Self::Remote(id) => write!(f, "{id}"),
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl serde::de::Visitor<'_> for IdVisitor {
            type Value = EntityId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer identifier")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<EntityId, E> {
                if v.is_empty() {
                    return Err(E::custom("identifier cannot be empty"));
                }
                let local = v
                    .strip_prefix(LOCAL_ID_PREFIX)
                    .and_then(|rest| Uuid::parse_str(rest).ok());
                Ok(local.map_or_else(|| EntityId::remote(v), EntityId::Local))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<EntityId, E> {
                Ok(EntityId::remote(v.to_string()))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<EntityId, E> {
                Ok(EntityId::remote(v.to_string()))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// Workflow state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Not started.
    Todo,
    /// Being worked on.
    InProgress,
    /// Finished.
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Todo => write!(f, "TODO"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// Priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Reference to a user embedded in a task or comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Full user profile as returned by `/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Optional avatar URL or asset key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Account creation time, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Returns the embedded reference form of this user.
    #[must_use]
    pub fn to_ref(&self) -> UserRef {
        UserRef {
            id: self.id.clone(),
            name: self.name.clone(),
            email: Some(self.email.clone()),
        }
    }
}

/// A task as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Identifier; immutable once assigned.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    /// Workflow state.
    pub status: TaskStatus,
    /// Priority.
    pub priority: TaskPriority,
    /// Assigned user, if any.
    #[serde(rename = "assignedTo", default)]
    pub assignee: Option<UserRef>,
    /// User who created the task.
    #[serde(rename = "createdBy")]
    pub creator: UserRef,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// A task together with its comment thread (`GET /tasks/:id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetail {
    /// The task fields.
    #[serde(flatten)]
    pub task: Task,
    /// Comments, in server order.
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// A comment on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Identifier.
    pub id: CommentId,
    /// Parent task.
    #[serde(alias = "TaskId")]
    pub task_id: TaskId,
    /// Comment author.
    #[serde(rename = "user")]
    pub author: UserRef,
    /// Comment text.
    #[serde(rename = "comment")]
    pub body: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
