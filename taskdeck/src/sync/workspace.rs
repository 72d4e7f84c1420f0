//! The per-session sync context.
//!
//! Every write follows the same shape: validate, apply optimistically,
//! send, then confirm with the server's entity or roll back. Store locks
//! are taken for the duration of one store call and never held across an
//! await.
//!
//! Signing out bumps the workspace epoch. A response that arrives for an
//! earlier epoch is returned to its caller but never written to the stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskdeck_proto::api::{AccessToken, NewComment, TaskPatch, TaskQuery};
use taskdeck_proto::events::{CommentEvent, TaskEvent};
use taskdeck_proto::model::{Comment, EntityId, Task, TaskDetail, TaskId, TaskStatus, UserRef};

use super::detail::TaskDetailView;
use super::ingest::{self, Change, Feed};
use super::mutation::{PendingMutation, Resolution};
use super::users::UserDirectory;
use super::validate::{self, TaskDraft, ValidationError};
use super::{Action, Notice, Route, SyncError};
use crate::api::{ApiError, RemoteApi};
use crate::realtime::EventHub;
use crate::session::{Session, SessionError, SessionStore};
use crate::store::{CommentBoard, EntityStore, Placement};

/// Default maximum task title length, in characters.
pub const DEFAULT_MAX_TITLE_LEN: usize = 256;

/// Default delay before a missing task's view sends the user back.
pub const DEFAULT_NOT_FOUND_REDIRECT: Duration = Duration::from_millis(3000);

/// Default page size for task lists.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Default capacity of notice and feed buffers.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Tunables for a [`Workspace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Maximum task title length, in characters.
    pub max_title_len: usize,
    /// Delay before a not-found detail view navigates back.
    pub not_found_redirect: Duration,
    /// Page size used when a list query does not set one.
    pub page_size: u32,
    /// Capacity of the notice channel and feed change buffers.
    pub channel_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_title_len: DEFAULT_MAX_TITLE_LEN,
            not_found_redirect: DEFAULT_NOT_FOUND_REDIRECT,
            page_size: DEFAULT_PAGE_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Server call behind an update-like action.
enum UpdateCall<'a> {
    Patch(&'a TaskPatch),
    Status(TaskStatus),
    Assign(&'a str),
}

/// Stores and actions for one signed-in user.
///
/// Cloning is cheap and yields a handle to the same stores.
pub struct Workspace<A> {
    api: Arc<A>,
    session: SessionStore,
    tasks: Arc<Mutex<EntityStore<Task>>>,
    comments: Arc<Mutex<CommentBoard>>,
    users: UserDirectory<A>,
    notices: mpsc::Sender<Notice>,
    settings: SyncSettings,
    epoch: Arc<AtomicU64>,
}

impl<A> Clone for Workspace<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            session: self.session.clone(),
            tasks: Arc::clone(&self.tasks),
            comments: Arc::clone(&self.comments),
            users: self.users.clone(),
            notices: self.notices.clone(),
            settings: self.settings.clone(),
            epoch: Arc::clone(&self.epoch),
        }
    }
}

impl<A> std::fmt::Debug for Workspace<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("session", &self.session)
            .field("tasks", &self.tasks.lock().len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<A: RemoteApi> Workspace<A> {
    /// Creates a workspace and the receiver for its notices.
    pub fn new(
        api: Arc<A>,
        session: SessionStore,
        settings: SyncSettings,
    ) -> (Self, mpsc::Receiver<Notice>) {
        let (notices, notice_rx) = mpsc::channel(settings.channel_capacity.max(1));
        let workspace = Self {
            users: UserDirectory::new(Arc::clone(&api)),
            api,
            session,
            tasks: Arc::new(Mutex::new(EntityStore::new(Placement::Front))),
            comments: Arc::new(Mutex::new(CommentBoard::new())),
            notices,
            settings,
            epoch: Arc::new(AtomicU64::new(0)),
        };
        (workspace, notice_rx)
    }

    // -- Accessors ---------------------------------------------------------

    /// The backing API.
    pub const fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// The session this workspace acts for.
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// The user directory.
    pub const fn users(&self) -> &UserDirectory<A> {
        &self.users
    }

    /// The settings in effect.
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Tasks in display order (newest first).
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().to_vec()
    }

    /// One task from the store.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.tasks.lock().get(id).cloned()
    }

    /// Comments of a task in display order (oldest first).
    #[must_use]
    pub fn comments(&self, task_id: &TaskId) -> Vec<Comment> {
        self.comments.lock().comments(task_id)
    }

    // -- Authentication ----------------------------------------------------

    /// Signs in and activates the session.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] for malformed input and
    /// [`SyncError::Authentication`] for refused credentials or a token
    /// that cannot be decoded.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, SyncError> {
        let credentials = validate::credentials(email, password)?;
        let issued = self.api.login(&credentials).await;
        self.accept_token(Action::Login, issued)
    }

    /// Creates an account and activates its session.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, SyncError> {
        let registration = validate::registration(name, email, password)?;
        let issued = self.api.register(&registration).await;
        self.accept_token(Action::Register, issued)
    }

    fn accept_token(
        &self,
        action: Action,
        issued: Result<AccessToken, ApiError>,
    ) -> Result<Session, SyncError> {
        let token = issued.map_err(|e| {
            tracing::info!(?action, err = %e, "sign-in refused");
            let err = SyncError::from(e);
            self.notify(Notice::ActionFailed {
                action,
                message: err.to_string(),
            });
            err
        })?;
        let session = self
            .session
            .set_token(&token.access_token)
            .map_err(|e| match e {
                SessionError::InvalidToken(reason) => {
                    SyncError::Authentication(format!("server issued an unusable token: {reason}"))
                }
                SessionError::Storage { .. } => SyncError::Authentication(e.to_string()),
            })?;
        self.notify(Notice::Navigate(Route::Dashboard));
        Ok(session)
    }

    /// Ends the session and forgets everything loaded for it.
    pub fn logout(&self) {
        self.session.clear();
        self.forget_loaded();
        self.notify(Notice::Navigate(Route::Login));
    }

    // -- Reads -------------------------------------------------------------

    /// Loads the task list, replacing the store.
    ///
    /// Tasks still waiting for their create confirmation are kept at the
    /// front.
    ///
    /// # Errors
    ///
    /// Returns the request's [`SyncError`]; the store is left untouched.
    pub async fn load_tasks(&self, query: &TaskQuery) -> Result<usize, SyncError> {
        let mut query = query.clone();
        query.limit.get_or_insert(self.settings.page_size);
        let epoch = self.epoch();
        let listed = self.api.list_tasks(&query).await;
        if self.is_stale(epoch) {
            return listed.map(|_| 0).map_err(SyncError::from);
        }
        let listed = listed.map_err(|e| self.read_failed(e))?;

        let mut tasks = self.tasks.lock();
        let pending: Vec<Task> = tasks.iter().filter(|t| t.id.is_local()).cloned().collect();
        tasks.set_all(listed);
        for task in pending.into_iter().rev() {
            tasks.insert_one(task);
        }
        tracing::debug!(count = tasks.len(), "task list loaded");
        Ok(tasks.len())
    }

    /// Fetches one task with its comments into the stores.
    ///
    /// A task the server no longer has is removed locally.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotPersisted`] for a transient id, or the
    /// request's [`SyncError`].
    pub async fn fetch_task(&self, id: &TaskId) -> Result<TaskDetail, SyncError> {
        let remote = persisted(id)?;
        let epoch = self.epoch();
        let fetched = self.api.get_task(remote).await;
        if self.is_stale(epoch) {
            return fetched.map_err(SyncError::from);
        }
        match fetched {
            Ok(detail) => {
                let mut tasks = self.tasks.lock();
                if !tasks.is_buried(id) {
                    tasks.insert_one(detail.task.clone());
                }
                drop(tasks);
                self.comments
                    .lock()
                    .set_thread(id, detail.comments.clone());
                Ok(detail)
            }
            Err(ApiError::NotFound(message)) => {
                self.tasks.lock().bury(id);
                self.comments.lock().drop_thread(id);
                Err(SyncError::NotFound(message))
            }
            Err(e) => Err(self.read_failed(e)),
        }
    }

    /// Reloads the comment thread of a task.
    ///
    /// # Errors
    ///
    /// Returns the request's [`SyncError`].
    pub async fn load_comments(&self, task_id: &TaskId) -> Result<usize, SyncError> {
        let remote = persisted(task_id)?;
        let epoch = self.epoch();
        let listed = self.api.list_comments(remote).await;
        if self.is_stale(epoch) {
            return listed.map(|comments| comments.len()).map_err(SyncError::from);
        }
        let comments = listed.map_err(|e| self.read_failed(e))?;
        let count = comments.len();
        self.comments.lock().set_thread(task_id, comments);
        Ok(count)
    }

    // -- Writes ------------------------------------------------------------

    /// Creates a task.
    ///
    /// The task appears at the front of the list immediately under a
    /// transient id, which is swapped for the server id on success.
    ///
    /// # Errors
    ///
    /// Validation errors are returned without touching the store. Request
    /// failures roll the insert back and raise [`Notice::ActionFailed`].
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, SyncError> {
        let draft = draft.normalized(self.settings.max_title_len)?;
        let creator = self.current_user()?;
        let now = Utc::now();
        let optimistic = Task {
            id: EntityId::local(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            status: draft.status,
            priority: draft.priority,
            assignee: draft.assignee.clone(),
            creator,
            created_at: now,
            updated_at: now,
        };
        tracing::debug!(id = %optimistic.id, "creating task");
        let epoch = self.epoch();
        let pending = PendingMutation::insert(&mut self.tasks.lock(), optimistic);

        let created = self.api.create_task(&draft.to_request()).await;
        if self.is_stale(epoch) {
            return created.map_err(SyncError::from);
        }
        match created {
            Ok(task) => {
                settled(pending.confirm(&mut self.tasks.lock(), Some(task.clone())));
                tracing::info!(id = %task.id, "task created");
                Ok(task)
            }
            Err(e) => {
                settled(pending.roll_back(&mut self.tasks.lock()));
                Err(self.action_failed(Action::CreateTask, e))
            }
        }
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// See [`create_task`](Self::create_task).
    pub async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, SyncError> {
        let patch = validate::normalize_patch(patch, self.settings.max_title_len)?;
        self.run_update(Action::UpdateTask, id, &patch, UpdateCall::Patch(&patch))
            .await
    }

    /// Moves a task to `status`.
    ///
    /// # Errors
    ///
    /// See [`create_task`](Self::create_task).
    pub async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<Task, SyncError> {
        let patch = TaskPatch {
            status: Some(status),
            ..TaskPatch::default()
        };
        self.run_update(Action::UpdateStatus, id, &patch, UpdateCall::Status(status))
            .await
    }

    /// Assigns a task to a user.
    ///
    /// # Errors
    ///
    /// See [`create_task`](Self::create_task).
    pub async fn assign_task(&self, id: &TaskId, user_id: &str) -> Result<Task, SyncError> {
        let patch = validate::normalize_patch(
            TaskPatch {
                assigned_to: Some(Some(user_id.trim().to_string())),
                ..TaskPatch::default()
            },
            self.settings.max_title_len,
        )?;
        let user_id = user_id.trim();
        self.run_update(Action::AssignTask, id, &patch, UpdateCall::Assign(user_id))
            .await
    }

    async fn run_update(
        &self,
        action: Action,
        id: &TaskId,
        patch: &TaskPatch,
        call: UpdateCall<'_>,
    ) -> Result<Task, SyncError> {
        let remote = persisted(id)?;
        let epoch = self.epoch();
        let optimistic = self.tasks.lock().get(id).map(|t| self.merge_patch(t, patch));
        let pending =
            optimistic.and_then(|task| PendingMutation::replace(&mut self.tasks.lock(), task));
        if pending.is_none() {
            tracing::debug!(%id, "updating a task that is not loaded");
        }

        let sent = self.send_update(remote, call).await;
        if self.is_stale(epoch) {
            return sent.map_err(SyncError::from);
        }
        match sent {
            Ok(task) => {
                let mut tasks = self.tasks.lock();
                match pending {
                    Some(pending) => settled(pending.confirm(&mut tasks, Some(task.clone()))),
                    None => {
                        tasks.replace_one(task.clone());
                    }
                }
                Ok(task)
            }
            Err(e) => {
                if let Some(pending) = pending {
                    settled(pending.roll_back(&mut self.tasks.lock()));
                }
                Err(self.action_failed(action, e))
            }
        }
    }

    async fn send_update(&self, remote: &str, call: UpdateCall<'_>) -> Result<Task, ApiError> {
        match call {
            UpdateCall::Patch(patch) => self.api.update_task(remote, patch).await,
            UpdateCall::Status(status) => self.api.update_status(remote, status).await,
            UpdateCall::Assign(user_id) => self.api.assign_task(remote, user_id).await,
        }
    }

    /// Deletes a task.
    ///
    /// A task the server already lost counts as deleted.
    ///
    /// # Errors
    ///
    /// See [`create_task`](Self::create_task).
    pub async fn delete_task(&self, id: &TaskId) -> Result<(), SyncError> {
        let remote = persisted(id)?;
        let epoch = self.epoch();
        let pending = PendingMutation::remove(&mut self.tasks.lock(), id);

        let deleted = self.api.delete_task(remote).await;
        if self.is_stale(epoch) {
            return match deleted {
                Ok(()) | Err(ApiError::NotFound(_)) => Ok(()),
                Err(e) => Err(SyncError::from(e)),
            };
        }
        match deleted {
            Ok(()) | Err(ApiError::NotFound(_)) => {
                let mut tasks = self.tasks.lock();
                match pending {
                    Some(pending) => settled(pending.confirm(&mut tasks, None)),
                    None => {
                        tasks.bury(id);
                    }
                }
                drop(tasks);
                self.comments.lock().drop_thread(id);
                tracing::info!(%id, "task deleted");
                Ok(())
            }
            Err(e) => {
                if let Some(pending) = pending {
                    settled(pending.roll_back(&mut self.tasks.lock()));
                }
                Err(self.action_failed(Action::DeleteTask, e))
            }
        }
    }

    /// Posts a comment. It shows at the end of the thread immediately.
    ///
    /// # Errors
    ///
    /// See [`create_task`](Self::create_task).
    pub async fn add_comment(&self, task_id: &TaskId, body: &str) -> Result<Comment, SyncError> {
        let body = validate::normalize_comment(body)?;
        let remote = persisted(task_id)?;
        let author = self.current_user()?;
        let optimistic = Comment {
            id: EntityId::local(),
            task_id: task_id.clone(),
            author,
            body: body.clone(),
            created_at: Utc::now(),
        };
        let epoch = self.epoch();
        let pending = PendingMutation::insert(self.comments.lock().thread_mut(task_id), optimistic);

        let posted = self.api.add_comment(remote, &NewComment { comment: body }).await;
        // A thread whose task was deleted meanwhile is gone for good.
        if self.is_stale(epoch) || self.tasks.lock().is_buried(task_id) {
            return posted.map_err(SyncError::from);
        }
        match posted {
            Ok(comment) => {
                settled(pending.confirm(
                    self.comments.lock().thread_mut(task_id),
                    Some(comment.clone()),
                ));
                Ok(comment)
            }
            Err(e) => {
                settled(pending.roll_back(self.comments.lock().thread_mut(task_id)));
                Err(self.action_failed(Action::AddComment, e))
            }
        }
    }

    // -- Real-time ---------------------------------------------------------

    /// Applies a task event to the stores.
    pub fn apply_task_event(&self, event: TaskEvent) -> Change {
        let mut tasks = self.tasks.lock();
        let mut comments = self.comments.lock();
        ingest::apply_task_event(&mut tasks, &mut comments, event)
    }

    /// Applies a comment event to the thread of `task_id`.
    pub fn apply_comment_event(&self, task_id: &TaskId, event: CommentEvent) -> Change {
        ingest::apply_comment_event(&mut self.comments.lock(), task_id, event)
    }

    /// Follows task events from `hub` until the returned feed is dropped.
    pub fn follow_tasks(&self, hub: &EventHub) -> Feed {
        ingest::spawn_task_feed(
            hub,
            Arc::clone(&self.tasks),
            Arc::clone(&self.comments),
            self.settings.channel_capacity,
        )
    }

    /// Follows comment events of one task until the returned feed is dropped.
    pub fn follow_comments(&self, hub: &EventHub, task_id: &TaskId) -> Feed {
        ingest::spawn_comment_feed(
            hub,
            task_id.clone(),
            Arc::clone(&self.comments),
            self.settings.channel_capacity,
        )
    }

    /// Opens a detail view: loads the task and, with a hub, follows its
    /// comments for as long as the view lives.
    pub fn open_task(&self, id: &TaskId, hub: Option<&EventHub>) -> TaskDetailView<A> {
        TaskDetailView::open(self.clone(), id.clone(), hub)
    }

    // -- Internals ---------------------------------------------------------

    pub(crate) fn notify(&self, notice: Notice) {
        if let Err(e) = self.notices.try_send(notice) {
            tracing::debug!(err = %e, "notice dropped");
        }
    }

    /// The signed-in user as embedded in tasks and comments.
    fn current_user(&self) -> Result<UserRef, SyncError> {
        let session = self
            .session
            .current()
            .ok_or_else(|| SyncError::Authentication("not signed in".into()))?;
        let claims = session.claims();
        if let Some(user) = self.users.user_ref(&claims.sub) {
            return Ok(user);
        }
        Ok(UserRef {
            id: claims.sub.clone(),
            name: claims
                .name
                .clone()
                .or_else(|| claims.email.clone())
                .unwrap_or_else(|| claims.sub.clone()),
            email: claims.email.clone(),
        })
    }

    fn merge_patch(&self, task: &Task, patch: &TaskPatch) -> Task {
        let mut merged = task.clone();
        if let Some(title) = &patch.title {
            merged.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            merged.description.clone_from(description);
        }
        if let Some(status) = patch.status {
            merged.status = status;
        }
        if let Some(priority) = patch.priority {
            merged.priority = priority;
        }
        match &patch.assigned_to {
            None => {}
            Some(None) => merged.assignee = None,
            Some(Some(user_id)) => {
                let already = task.assignee.as_ref().filter(|a| &a.id == user_id).cloned();
                merged.assignee = Some(
                    already
                        .or_else(|| self.users.user_ref(user_id))
                        .unwrap_or_else(|| UserRef {
                            id: user_id.clone(),
                            name: user_id.clone(),
                            email: None,
                        }),
                );
            }
        }
        merged.updated_at = Utc::now();
        merged
    }

    /// Reports a failed write: expires the session on authentication
    /// errors and raises a notice.
    fn action_failed(&self, action: Action, err: ApiError) -> SyncError {
        let err = SyncError::from(err);
        tracing::warn!(?action, err = %err, "action failed, change rolled back");
        self.expire_on_auth(&err);
        self.notify(Notice::ActionFailed {
            action,
            message: err.to_string(),
        });
        err
    }

    /// Reports a failed read; the caller shows it inline.
    fn read_failed(&self, err: ApiError) -> SyncError {
        let err = SyncError::from(err);
        tracing::debug!(err = %err, "read failed");
        self.expire_on_auth(&err);
        err
    }

    fn expire_on_auth(&self, err: &SyncError) {
        if !matches!(err, SyncError::Authentication(_)) || !self.session.state().is_active() {
            return;
        }
        tracing::warn!("session rejected by server, signing out");
        self.session.clear();
        self.forget_loaded();
        self.notify(Notice::SessionExpired);
        self.notify(Notice::Navigate(Route::Login));
    }

    fn forget_loaded(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().clear();
        self.comments.lock().clear();
        self.users.clear();
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Returns `true` if the stores were reset since `epoch` was read.
    fn is_stale(&self, epoch: u64) -> bool {
        let stale = self.epoch() != epoch;
        if stale {
            tracing::debug!("session ended while a request was in flight, dropping its result");
        }
        stale
    }
}

fn settled<E>(resolution: Resolution<E>) {
    match resolution {
        Resolution::Confirmed => {}
        Resolution::RolledBack(snapshot) => tracing::debug!(
            id = %snapshot.id(),
            existed = snapshot.prior().is_some(),
            "optimistic change rolled back"
        ),
    }
}

/// The server id of a task, or a validation error for transient ids.
fn persisted(id: &TaskId) -> Result<&str, ValidationError> {
    id.as_remote()
        .ok_or_else(|| ValidationError::NotPersisted(id.clone()))
}
