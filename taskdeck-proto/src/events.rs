//! Real-time event names and typed payloads.
//!
//! Task events are global to the authenticated channel (`task.created`,
//! `task.updated`, `task.deleted`). Comment events are scoped to one task
//! by suffixing the task id: `comments:created:<taskId>`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DecodeError;
use crate::model::{Comment, CommentId, Task, TaskId};

/// Event emitted when a task is created.
pub const TASK_CREATED: &str = "task.created";
/// Event emitted when a task is updated.
pub const TASK_UPDATED: &str = "task.updated";
/// Event emitted when a task is deleted.
pub const TASK_DELETED: &str = "task.deleted";

/// Kind of change carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new entity.
    Created,
    /// A changed entity.
    Updated,
    /// A removed entity.
    Deleted,
}

impl EventKind {
    /// All kinds, in subscription order.
    pub const ALL: [Self; 3] = [Self::Created, Self::Updated, Self::Deleted];

    /// Lowercase name used in comment event names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// Returns the task event name for `kind`.
#[must_use]
pub const fn task_event_name(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Created => TASK_CREATED,
        EventKind::Updated => TASK_UPDATED,
        EventKind::Deleted => TASK_DELETED,
    }
}

/// Returns the comment event name for `kind` scoped to `task_id`.
#[must_use]
pub fn comment_event_name(kind: EventKind, task_id: &TaskId) -> String {
    format!("comments:{}:{task_id}", kind.as_str())
}

/// Splits a comment event name into its kind and task id.
#[must_use]
pub fn parse_comment_event_name(name: &str) -> Option<(EventKind, TaskId)> {
    let rest = name.strip_prefix("comments:")?;
    let (kind, task_id) = rest.split_once(':')?;
    if task_id.is_empty() {
        return None;
    }
    let kind = EventKind::ALL.into_iter().find(|k| k.as_str() == kind)?;
    Some((kind, TaskId::remote(task_id)))
}

/// Payload of a delete event: either `{ "id": ... }` or the bare id.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DeletedRef {
    Object { id: crate::model::EntityId },
    Bare(crate::model::EntityId),
}

impl DeletedRef {
    fn into_id(self) -> crate::model::EntityId {
        match self {
            Self::Object { id } | Self::Bare(id) => id,
        }
    }
}

#[derive(Serialize)]
struct DeletedBody<'a> {
    id: &'a crate::model::EntityId,
}

/// A decoded task event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// `task.created` with the full task.
    Created(Task),
    /// `task.updated` with the full task.
    Updated(Task),
    /// `task.deleted` with the task id.
    Deleted(TaskId),
}

impl TaskEvent {
    /// Decodes an event by name.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownEvent`] for names other than the three
    /// task events, or [`DecodeError::Schema`] if the payload is malformed.
    pub fn decode(name: &str, payload: Value) -> Result<Self, DecodeError> {
        let kind = match name {
            TASK_CREATED => EventKind::Created,
            TASK_UPDATED => EventKind::Updated,
            TASK_DELETED => EventKind::Deleted,
            other => return Err(DecodeError::UnknownEvent(other.to_string())),
        };
        Self::decode_kind(kind, payload).map_err(|e| DecodeError::schema(name, e))
    }

    fn decode_kind(kind: EventKind, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::Created => Self::Created(serde_json::from_value(payload)?),
            EventKind::Updated => Self::Updated(serde_json::from_value(payload)?),
            EventKind::Deleted => {
                Self::Deleted(serde_json::from_value::<DeletedRef>(payload)?.into_id())
            }
        })
    }

    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Created(_) => EventKind::Created,
            Self::Updated(_) => EventKind::Updated,
            Self::Deleted(_) => EventKind::Deleted,
        }
    }

    /// Returns the event name this event travels under.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        task_event_name(self.kind())
    }

    /// Encodes the payload the broker would send for this event.
    ///
    /// # Errors
    ///
    /// Returns an error if the task cannot be serialized.
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Created(task) | Self::Updated(task) => serde_json::to_value(task),
            Self::Deleted(id) => serde_json::to_value(DeletedBody { id }),
        }
    }
}

/// A decoded comment event for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentEvent {
    /// A comment was added.
    Created(Comment),
    /// A comment was edited.
    Updated(Comment),
    /// A comment was removed.
    Deleted(CommentId),
}

impl CommentEvent {
    /// Decodes a comment event of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Schema`] if the payload is malformed.
    pub fn decode(kind: EventKind, payload: Value) -> Result<Self, DecodeError> {
        let decoded = match kind {
            EventKind::Created => serde_json::from_value(payload).map(Self::Created),
            EventKind::Updated => serde_json::from_value(payload).map(Self::Updated),
            EventKind::Deleted => {
                serde_json::from_value::<DeletedRef>(payload).map(|r| Self::Deleted(r.into_id()))
            }
        };
        decoded.map_err(|e| DecodeError::schema(format!("comments:{}", kind.as_str()), e))
    }

    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Created(_) => EventKind::Created,
            Self::Updated(_) => EventKind::Updated,
            Self::Deleted(_) => EventKind::Deleted,
        }
    }

    /// Encodes the payload the broker would send for this event.
    ///
    /// Deletes travel as the bare id string.
    ///
    /// # Errors
    ///
    /// Returns an error if the comment cannot be serialized.
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Created(comment) | Self::Updated(comment) => serde_json::to_value(comment),
            Self::Deleted(id) => serde_json::to_value(id),
        }
    }
}
