//! Comment threads keyed by task.

use std::collections::HashMap;

use taskdeck_proto::model::{Comment, TaskId};

use super::{EntityStore, Placement};

/// One comment thread per task, oldest comment first.
#[derive(Debug, Default)]
pub struct CommentBoard {
    threads: HashMap<TaskId, EntityStore<Comment>>,
}

impl CommentBoard {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the thread for `task_id`, if one has been loaded.
    #[must_use]
    pub fn thread(&self, task_id: &TaskId) -> Option<&EntityStore<Comment>> {
        self.threads.get(task_id)
    }

    /// Returns the thread for `task_id`, creating an empty one if needed.
    pub fn thread_mut(&mut self, task_id: &TaskId) -> &mut EntityStore<Comment> {
        self.threads
            .entry(task_id.clone())
            .or_insert_with(|| EntityStore::new(Placement::Back))
    }

    /// Replaces the thread for `task_id`.
    pub fn set_thread(&mut self, task_id: &TaskId, comments: Vec<Comment>) {
        self.thread_mut(task_id).set_all(comments);
    }

    /// Comments of `task_id` in display order (empty if not loaded).
    #[must_use]
    pub fn comments(&self, task_id: &TaskId) -> Vec<Comment> {
        self.thread(task_id).map(EntityStore::to_vec).unwrap_or_default()
    }

    /// Forgets the thread of a task that no longer exists.
    pub fn drop_thread(&mut self, task_id: &TaskId) -> bool {
        self.threads.remove(task_id).is_some()
    }

    /// Drops every thread.
    pub fn clear(&mut self) {
        self.threads.clear();
    }

    /// Number of loaded threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Returns `true` if no thread is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}
