//! Folding real-time events into the stores.
//!
//! Task events go to the task store; `deleted` also drops the task's
//! comment thread. Comment events are scoped to one task and only flow while
//! a feed for that task is alive. Malformed payloads are logged and dropped
//! one at a time; they never stop a feed.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use taskdeck_proto::events::{
    CommentEvent, EventKind, TaskEvent, comment_event_name, parse_comment_event_name,
    task_event_name,
};
use taskdeck_proto::model::{EntityId, Task, TaskId};

use crate::realtime::EventHub;
use crate::store::{CommentBoard, EntityStore};

/// A store change caused by an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Kind of event.
    pub kind: EventKind,
    /// Affected entity.
    pub id: EntityId,
    /// `false` if the event changed nothing (e.g. update of an unknown task).
    pub applied: bool,
}

/// Applies a task event.
///
/// `created` inserts (or replaces, if the id is known). `updated` replaces
/// only tasks already in the store. `deleted` buries the task and drops its
/// comment thread.
pub fn apply_task_event(
    tasks: &mut EntityStore<Task>,
    comments: &mut CommentBoard,
    event: TaskEvent,
) -> Change {
    match event {
        TaskEvent::Created(task) => {
            let id = task.id.clone();
            tasks.insert_one(task);
            Change {
                kind: EventKind::Created,
                id,
                applied: true,
            }
        }
        TaskEvent::Updated(task) => {
            let id = task.id.clone();
            let applied = tasks.replace_one(task);
            Change {
                kind: EventKind::Updated,
                id,
                applied,
            }
        }
        TaskEvent::Deleted(id) => {
            let removed = tasks.bury(&id).is_some();
            let dropped = comments.drop_thread(&id);
            Change {
                kind: EventKind::Deleted,
                id,
                applied: removed || dropped,
            }
        }
    }
}

/// Applies a comment event to the thread of `task_id`.
pub fn apply_comment_event(
    comments: &mut CommentBoard,
    task_id: &TaskId,
    event: CommentEvent,
) -> Change {
    let thread = comments.thread_mut(task_id);
    match event {
        CommentEvent::Created(comment) => {
            let id = comment.id.clone();
            thread.insert_one(comment);
            Change {
                kind: EventKind::Created,
                id,
                applied: true,
            }
        }
        CommentEvent::Updated(comment) => {
            let id = comment.id.clone();
            let applied = thread.replace_one(comment);
            Change {
                kind: EventKind::Updated,
                id,
                applied,
            }
        }
        CommentEvent::Deleted(id) => {
            let applied = thread.bury(&id).is_some();
            Change {
                kind: EventKind::Deleted,
                id,
                applied,
            }
        }
    }
}

/// A running event subscription feeding the stores.
///
/// Dropping the feed stops it and unsubscribes from the hub.
#[derive(Debug)]
pub struct Feed {
    task: JoinHandle<()>,
    changes: mpsc::Receiver<Change>,
}

impl Feed {
    /// Waits for the next change this feed applied.
    ///
    /// Up to the feed capacity of changes are buffered; while the buffer is
    /// full new notifications are dropped (the stores are still updated).
    pub async fn next_change(&mut self) -> Option<Change> {
        self.changes.recv().await
    }

    /// Returns a buffered change without waiting.
    pub fn try_next_change(&mut self) -> Option<Change> {
        self.changes.try_recv().ok()
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn report(tx: &mpsc::Sender<Change>, change: Change) {
    if let Err(mpsc::error::TrySendError::Full(change)) = tx.try_send(change) {
        tracing::trace!(id = %change.id, "change buffer full, dropping notification");
    }
}

/// Starts folding task events from `hub` into the stores.
pub(crate) fn spawn_task_feed(
    hub: &EventHub,
    tasks: Arc<Mutex<EntityStore<Task>>>,
    comments: Arc<Mutex<CommentBoard>>,
    capacity: usize,
) -> Feed {
    let mut events = hub.subscribe_all(EventKind::ALL.map(task_event_name));
    let (tx, changes) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match TaskEvent::decode(&event.name, event.payload) {
                Ok(decoded) => {
                    let change = {
                        let mut tasks = tasks.lock();
                        let mut comments = comments.lock();
                        apply_task_event(&mut tasks, &mut comments, decoded)
                    };
                    tracing::debug!(
                        kind = ?change.kind,
                        id = %change.id,
                        applied = change.applied,
                        "task event"
                    );
                    report(&tx, change);
                }
                Err(e) => tracing::warn!(err = %e, name = %event.name, "dropping task event"),
            }
        }
    });
    Feed { task, changes }
}

/// Starts folding comment events for `task_id` into the comment board.
pub(crate) fn spawn_comment_feed(
    hub: &EventHub,
    task_id: TaskId,
    comments: Arc<Mutex<CommentBoard>>,
    capacity: usize,
) -> Feed {
    let names = EventKind::ALL.map(|kind| comment_event_name(kind, &task_id));
    let mut events = hub.subscribe_all(names);
    let (tx, changes) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some((kind, _)) = parse_comment_event_name(&event.name) else {
                continue;
            };
            match CommentEvent::decode(kind, event.payload) {
                Ok(decoded) => {
                    let change = apply_comment_event(&mut comments.lock(), &task_id, decoded);
                    tracing::debug!(
                        task_id = %task_id,
                        kind = ?change.kind,
                        id = %change.id,
                        "comment event"
                    );
                    report(&tx, change);
                }
                Err(e) => tracing::warn!(err = %e, name = %event.name, "dropping comment event"),
            }
        }
    });
    Feed { task, changes }
}
