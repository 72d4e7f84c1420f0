//! Task detail view: one task with its live comment thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use taskdeck_proto::model::{Comment, Task, TaskId};

use super::ingest::Feed;
use super::workspace::Workspace;
use super::{Notice, Route, SyncError};
use crate::api::RemoteApi;
use crate::realtime::EventHub;

/// Loading state of a detail view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// The fetch is in flight.
    Loading,
    /// The task and its comments are in the stores.
    Ready,
    /// The fetch failed; the message is shown inline.
    Failed(String),
    /// The task does not exist. The view navigates back shortly.
    NotFound,
}

/// A mounted detail view.
///
/// While alive it follows the task's comment events. Dropping it unmounts
/// the view: a fetch still in flight may update the stores but no longer
/// touches the loading state or navigates.
pub struct TaskDetailView<A> {
    workspace: Workspace<A>,
    task_id: TaskId,
    mounted: Arc<AtomicBool>,
    state: Arc<watch::Sender<LoadState>>,
    _comments: Option<Feed>,
}

impl<A> std::fmt::Debug for TaskDetailView<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDetailView")
            .field("task_id", &self.task_id)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<A: RemoteApi> TaskDetailView<A> {
    /// Mounts a view for `task_id` and starts loading it.
    ///
    /// Must be called within a Tokio runtime.
    pub(crate) fn open(workspace: Workspace<A>, task_id: TaskId, hub: Option<&EventHub>) -> Self {
        let comments = hub.map(|hub| workspace.follow_comments(hub, &task_id));
        let view = Self {
            workspace,
            task_id,
            mounted: Arc::new(AtomicBool::new(true)),
            state: Arc::new(watch::Sender::new(LoadState::Loading)),
            _comments: comments,
        };
        let loader = Loader {
            workspace: view.workspace.clone(),
            task_id: view.task_id.clone(),
            mounted: Arc::clone(&view.mounted),
            state: Arc::clone(&view.state),
        };
        tokio::spawn(async move {
            loader.run().await;
        });
        view
    }

    /// Fetches the task again, e.g. after an inline error.
    pub async fn reload(&self) -> LoadState {
        self.state.send_replace(LoadState::Loading);
        let loader = Loader {
            workspace: self.workspace.clone(),
            task_id: self.task_id.clone(),
            mounted: Arc::clone(&self.mounted),
            state: Arc::clone(&self.state),
        };
        loader.run().await;
        self.state()
    }
}

impl<A> TaskDetailView<A> {
    /// The task shown.
    pub const fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Current loading state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Waits until loading has finished, one way or another.
    pub async fn wait_loaded(&self) -> LoadState {
        let mut rx = self.state.subscribe();
        rx.wait_for(|s| *s != LoadState::Loading)
            .await
            .map_or(LoadState::Loading, |s| s.clone())
    }
}

impl<A: RemoteApi> TaskDetailView<A> {
    /// The task as currently stored.
    #[must_use]
    pub fn task(&self) -> Option<Task> {
        self.workspace.task(&self.task_id)
    }

    /// The task's comments, oldest first.
    #[must_use]
    pub fn comments(&self) -> Vec<Comment> {
        self.workspace.comments(&self.task_id)
    }
}

impl<A> Drop for TaskDetailView<A> {
    fn drop(&mut self) {
        self.mounted.store(false, Ordering::Release);
    }
}

struct Loader<A> {
    workspace: Workspace<A>,
    task_id: TaskId,
    mounted: Arc<AtomicBool>,
    state: Arc<watch::Sender<LoadState>>,
}

impl<A: RemoteApi> Loader<A> {
    fn mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    async fn run(self) {
        let next = match self.workspace.fetch_task(&self.task_id).await {
            Ok(_) => LoadState::Ready,
            Err(SyncError::NotFound(_)) => LoadState::NotFound,
            Err(e) => LoadState::Failed(e.to_string()),
        };
        if !self.mounted() {
            tracing::debug!(task_id = %self.task_id, "detail view unmounted before load finished");
            return;
        }
        self.state.send_replace(next.clone());

        if next == LoadState::NotFound {
            tokio::time::sleep(self.workspace.settings().not_found_redirect).await;
            if self.mounted() {
                tracing::info!(task_id = %self.task_id, "task not found, returning to list");
                self.workspace.notify(Notice::Navigate(Route::Dashboard));
            }
        }
    }
}
