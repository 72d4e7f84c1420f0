// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items,
    clippy::too_many_lines
)]

//! Integration tests for optimistic mutations racing real-time events.
//!
//! Every scenario drives one or more `Workspace`s against the in-process
//! `LoopbackApi`. A `Gated` wrapper can hold writes in flight so the
//! optimistic state is observable before the server answers.
//!
//! These tests validate:
//! - Optimistic create shows at the top, then reverts on failure with a notice
//! - A confirmed create and its own `task.created` echo leave one entry
//! - Two sessions converge through events alone
//! - Local delete followed by the `task.deleted` echo removes the task once
//! - A task deleted remotely stays deleted when a pending update fails
//! - Responses landing after sign-out never repopulate the stores
//! - Update rollback, transient ids, and list reloads with pending creates
//! - Rejected sessions are cleared and the user is sent to sign in
//! - Detail views follow comments and navigate away from missing tasks

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use taskdeck::api::loopback::LoopbackApi;
use taskdeck::api::{ApiError, RemoteApi};
use taskdeck::realtime::EventHub;
use taskdeck::session::SessionStore;
use taskdeck::sync::validate::ValidationError;
use taskdeck::sync::{
    Action, LoadState, Notice, Route, SyncError, SyncSettings, TaskDraft, Workspace,
};
use taskdeck_proto::api::{
    AccessToken, Credentials, NewComment, NewTask, Registration, TaskPatch, TaskQuery,
};
use taskdeck_proto::events::EventKind;
use taskdeck_proto::model::{
    Comment, EntityId, Task, TaskDetail, TaskPriority, TaskStatus, User,
};
use tokio::sync::{Semaphore, mpsc};

// =============================================================================
// Helpers
// =============================================================================

fn user(id: &str, name: &str) -> User {
    User {
        id: id.into(),
        name: name.into(),
        email: format!("{}@example.com", name.to_lowercase()),
        avatar: None,
        created_at: None,
    }
}

/// Wraps an API so writes wait for [`Gated::release`] and all calls can be
/// made to fail authentication.
struct Gated<A> {
    inner: A,
    gated: AtomicBool,
    permits: Semaphore,
    unauthorized: AtomicBool,
}

impl<A: RemoteApi> Gated<A> {
    fn new(inner: A) -> Self {
        Self {
            inner,
            gated: AtomicBool::new(false),
            permits: Semaphore::new(0),
            unauthorized: AtomicBool::new(false),
        }
    }

    fn hold_writes(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.permits.add_permits(1);
    }

    async fn pass(&self) -> Result<(), ApiError> {
        if self.gated.load(Ordering::SeqCst) {
            self.permits.acquire().await.unwrap().forget();
        }
        self.check()
    }

    fn check(&self) -> Result<(), ApiError> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized("jwt expired".into()));
        }
        Ok(())
    }
}

impl<A: RemoteApi> RemoteApi for Gated<A> {
    async fn login(&self, credentials: &Credentials) -> Result<AccessToken, ApiError> {
        self.inner.login(credentials).await
    }

    async fn register(&self, registration: &Registration) -> Result<AccessToken, ApiError> {
        self.inner.register(registration).await
    }

    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.check()?;
        self.inner.list_tasks(query).await
    }

    async fn get_task(&self, id: &str) -> Result<TaskDetail, ApiError> {
        self.check()?;
        self.inner.get_task(id).await
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
        self.pass().await?;
        self.inner.create_task(task).await
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, ApiError> {
        self.pass().await?;
        self.inner.update_task(id, patch).await
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<Task, ApiError> {
        self.pass().await?;
        self.inner.update_status(id, status).await
    }

    async fn assign_task(&self, id: &str, user_id: &str) -> Result<Task, ApiError> {
        self.pass().await?;
        self.inner.assign_task(id, user_id).await
    }

    async fn delete_task(&self, id: &str) -> Result<(), ApiError> {
        self.pass().await?;
        self.inner.delete_task(id).await
    }

    async fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>, ApiError> {
        self.check()?;
        self.inner.list_comments(task_id).await
    }

    async fn add_comment(&self, task_id: &str, comment: &NewComment) -> Result<Comment, ApiError> {
        self.pass().await?;
        self.inner.add_comment(task_id, comment).await
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.check()?;
        self.inner.list_users().await
    }

    async fn get_user(&self, id: &str) -> Result<User, ApiError> {
        self.check()?;
        self.inner.get_user(id).await
    }
}

/// A signed-in workspace over `api`.
fn signed_in<A: RemoteApi>(
    api: A,
    token: &str,
) -> (Workspace<A>, mpsc::Receiver<Notice>) {
    let session = SessionStore::in_memory();
    session.set_token(token).unwrap();
    let settings = SyncSettings {
        not_found_redirect: Duration::from_millis(50),
        ..SyncSettings::default()
    };
    Workspace::new(Arc::new(api), session, settings)
}

fn titles<A: RemoteApi>(workspace: &Workspace<A>) -> Vec<String> {
    workspace.tasks().into_iter().map(|t| t.title).collect()
}

/// Yields until `condition` holds or gives up after a bounded number of
/// scheduler turns.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}

// =============================================================================
// Optimistic create
// =============================================================================

#[tokio::test]
async fn offline_create_shows_then_reverts_with_notice() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let token = loopback.token();
    let seeded = loopback
        .create_task(&TaskDraft::new("Existing", "already there").to_request())
        .await
        .unwrap();
    let (workspace, mut notices) = signed_in(Gated::new(loopback), &token);
    workspace.load_tasks(&TaskQuery::default()).await.unwrap();
    let before = workspace.tasks();
    assert_eq!(before, vec![seeded]);

    workspace.api().inner.set_online(false);
    workspace.api().hold_writes();

    let create = tokio::spawn({
        let workspace = workspace.clone();
        async move {
            workspace
                .create_task(TaskDraft::new("Write report", "Q3 numbers"))
                .await
        }
    });

    assert!(eventually(|| workspace.tasks().len() == 2).await);
    let optimistic = &workspace.tasks()[0];
    assert_eq!(optimistic.title, "Write report");
    assert!(optimistic.id.is_local());
    assert_eq!(optimistic.creator.id, "u-ana");

    workspace.api().release();
    let result = create.await.unwrap();
    assert!(matches!(result, Err(SyncError::Network(_))));
    assert_eq!(workspace.tasks(), before);

    match notices.recv().await.unwrap() {
        Notice::ActionFailed { action, .. } => assert_eq!(action, Action::CreateTask),
        other => panic!("unexpected notice {other:?}"),
    }
}

#[tokio::test]
async fn confirmed_create_and_its_echo_leave_one_entry() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let hub = EventHub::new();
    loopback.attach(hub.clone());
    let token = loopback.token();
    let (workspace, _notices) = signed_in(loopback, &token);
    let mut feed = workspace.follow_tasks(&hub);

    let created = workspace
        .create_task(TaskDraft::new("Write report", "Q3 numbers"))
        .await
        .unwrap();
    assert!(!created.id.is_local());

    let echo = feed.next_change().await.unwrap();
    assert_eq!(echo.kind, EventKind::Created);
    assert_eq!(echo.id, created.id);

    let tasks = workspace.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0], created);
}

#[tokio::test]
async fn echo_arriving_before_the_response_is_merged() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let hub = EventHub::new();
    loopback.attach(hub.clone());
    let token = loopback.token();
    let api = Gated::new(loopback);
    api.hold_writes();
    let (workspace, _notices) = signed_in(api, &token);
    let _feed = workspace.follow_tasks(&hub);

    // The echo and the response race; either order must converge.
    let create = tokio::spawn({
        let workspace = workspace.clone();
        async move { workspace.create_task(TaskDraft::new("Plan", "offsite")).await }
    });
    assert!(eventually(|| workspace.tasks().len() == 1).await);
    workspace.api().release();
    let created = create.await.unwrap().unwrap();

    assert!(
        eventually(|| {
            let tasks = workspace.tasks();
            tasks.len() == 1 && tasks[0].id == created.id
        })
        .await
    );
}

#[tokio::test]
async fn validation_errors_touch_nothing() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let token = loopback.token();
    let (workspace, mut notices) = signed_in(loopback, &token);

    let err = workspace
        .create_task(TaskDraft::new("   ", "desc"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Validation(ValidationError::Required("title"))
    ));
    assert!(workspace.tasks().is_empty());
    assert_eq!(workspace.api().task_count(), 0);
    assert!(notices.try_recv().is_err());
}

// =============================================================================
// Multi-session convergence
// =============================================================================

#[tokio::test]
async fn second_session_receives_created_task_without_requesting() {
    let ana_api = LoopbackApi::new(user("u-ana", "Ana"));
    let bo_api = ana_api.join(user("u-bo", "Bo"));
    let bo_hub = EventHub::new();
    ana_api.attach(bo_hub.clone());

    let ana_token = ana_api.token();
    let bo_token = bo_api.token();
    let (ana, _) = signed_in(ana_api, &ana_token);
    let (bo, _) = signed_in(bo_api, &bo_token);
    let mut bo_feed = bo.follow_tasks(&bo_hub);

    // Bo's handle is offline: anything Bo sees must come from events.
    bo.api().set_online(false);

    let created = ana
        .create_task(TaskDraft::new("Shared", "seen by both"))
        .await
        .unwrap();

    let change = bo_feed.next_change().await.unwrap();
    assert_eq!(change.kind, EventKind::Created);
    assert_eq!(bo.tasks(), vec![created.clone()]);

    let updated = ana
        .update_status(&created.id, TaskStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(bo_feed.next_change().await.unwrap().kind, EventKind::Updated);
    assert_eq!(bo.task(&created.id).unwrap().status, TaskStatus::InProgress);
    assert_eq!(bo.task(&created.id), Some(updated));
}

#[tokio::test]
async fn local_delete_then_echo_removes_once() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let hub = EventHub::new();
    loopback.attach(hub.clone());
    let token = loopback.token();
    let (workspace, mut notices) = signed_in(loopback, &token);

    let task = workspace
        .create_task(TaskDraft::new("Short-lived", "x"))
        .await
        .unwrap();
    let mut feed = workspace.follow_tasks(&hub);

    workspace.delete_task(&task.id).await.unwrap();
    assert!(workspace.tasks().is_empty());

    let echo = feed.next_change().await.unwrap();
    assert_eq!(echo.kind, EventKind::Deleted);
    assert!(!echo.applied);
    assert!(workspace.tasks().is_empty());
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn delete_of_task_gone_on_server_succeeds() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let other = loopback.join(user("u-bo", "Bo"));
    let token = loopback.token();
    let (workspace, _notices) = signed_in(loopback, &token);

    let task = workspace
        .create_task(TaskDraft::new("Racy", "x"))
        .await
        .unwrap();
    other
        .delete_task(task.id.as_remote().unwrap())
        .await
        .unwrap();

    workspace.delete_task(&task.id).await.unwrap();
    assert!(workspace.tasks().is_empty());
}

#[tokio::test]
async fn remote_delete_during_failed_update_stays_deleted() {
    let ana_api = LoopbackApi::new(user("u-ana", "Ana"));
    let bo_api = ana_api.join(user("u-bo", "Bo"));
    let hub = EventHub::new();
    ana_api.attach(hub.clone());
    let token = ana_api.token();
    let (ana, mut notices) = signed_in(Gated::new(ana_api), &token);
    let mut feed = ana.follow_tasks(&hub);

    let task = ana
        .create_task(TaskDraft::new("Contested", "d"))
        .await
        .unwrap();
    assert_eq!(feed.next_change().await.unwrap().kind, EventKind::Created);

    ana.api().hold_writes();
    let update = tokio::spawn({
        let ana = ana.clone();
        let id = task.id.clone();
        async move { ana.update_status(&id, TaskStatus::Done).await }
    });
    assert!(
        eventually(|| ana
            .task(&task.id)
            .is_some_and(|t| t.status == TaskStatus::Done))
        .await
    );

    bo_api
        .delete_task(task.id.as_remote().unwrap())
        .await
        .unwrap();
    let deleted = feed.next_change().await.unwrap();
    assert_eq!(deleted.kind, EventKind::Deleted);
    assert!(deleted.applied);
    assert!(ana.tasks().is_empty());

    ana.api().release();
    let err = update.await.unwrap().unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
    assert!(ana.tasks().is_empty());
    assert!(matches!(
        notices.recv().await.unwrap(),
        Notice::ActionFailed {
            action: Action::UpdateStatus,
            ..
        }
    ));
}

#[tokio::test]
async fn logout_during_create_leaves_stores_empty() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let token = loopback.token();
    let api = Gated::new(loopback);
    api.hold_writes();
    let (workspace, mut notices) = signed_in(api, &token);

    let create = tokio::spawn({
        let workspace = workspace.clone();
        async move { workspace.create_task(TaskDraft::new("Late", "d")).await }
    });
    assert!(eventually(|| workspace.tasks().len() == 1).await);

    workspace.logout();
    assert!(workspace.tasks().is_empty());
    assert_eq!(notices.recv().await.unwrap(), Notice::Navigate(Route::Login));

    workspace.api().release();
    let created = create.await.unwrap().unwrap();
    assert!(!created.id.is_local());
    assert_eq!(workspace.api().inner.task_count(), 1);
    assert!(workspace.tasks().is_empty());
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn failed_update_after_logout_does_not_restore() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let token = loopback.token();
    let (workspace, mut notices) = signed_in(Gated::new(loopback), &token);
    let task = workspace
        .create_task(TaskDraft::new("Mine", "d"))
        .await
        .unwrap();

    workspace.api().inner.set_online(false);
    workspace.api().hold_writes();
    let update = tokio::spawn({
        let workspace = workspace.clone();
        let id = task.id.clone();
        async move { workspace.update_status(&id, TaskStatus::Done).await }
    });
    assert!(
        eventually(|| workspace
            .task(&task.id)
            .is_some_and(|t| t.status == TaskStatus::Done))
        .await
    );

    workspace.logout();
    assert_eq!(notices.recv().await.unwrap(), Notice::Navigate(Route::Login));
    workspace.api().release();
    assert!(matches!(
        update.await.unwrap(),
        Err(SyncError::Network(_))
    ));
    assert!(workspace.tasks().is_empty());
    assert!(notices.try_recv().is_err());
}

// =============================================================================
// Updates
// =============================================================================

#[tokio::test]
async fn failed_update_restores_previous_version_in_place() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let token = loopback.token();
    let (workspace, mut notices) = signed_in(loopback, &token);
    for title in ["one", "two", "three"] {
        workspace
            .create_task(TaskDraft::new(title, "d"))
            .await
            .unwrap();
    }
    let before = workspace.tasks();
    let target = before[1].clone();

    workspace.api().set_online(false);
    let err = workspace
        .update_task(
            &target.id,
            TaskPatch {
                title: Some("renamed".into()),
                priority: Some(TaskPriority::High),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(workspace.tasks(), before);
    assert!(matches!(
        notices.recv().await.unwrap(),
        Notice::ActionFailed {
            action: Action::UpdateTask,
            ..
        }
    ));
}

#[tokio::test]
async fn update_merges_and_confirms_server_version() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let api = Gated::new(loopback);
    let token = api.inner.token();
    api.hold_writes();
    let (workspace, _notices) = signed_in(api, &token);

    let create = tokio::spawn({
        let workspace = workspace.clone();
        async move { workspace.create_task(TaskDraft::new("Draft", "d")).await }
    });
    assert!(eventually(|| !workspace.tasks().is_empty()).await);
    workspace.api().release();
    let task = create.await.unwrap().unwrap();

    let update = tokio::spawn({
        let workspace = workspace.clone();
        let id = task.id.clone();
        async move { workspace.update_status(&id, TaskStatus::Done).await }
    });
    assert!(
        eventually(|| workspace.task(&task.id).unwrap().status == TaskStatus::Done).await,
        "optimistic status should show before the server answers"
    );
    let optimistic = workspace.task(&task.id).unwrap();
    assert!(optimistic.updated_at >= task.updated_at);

    workspace.api().release();
    let confirmed = update.await.unwrap().unwrap();
    assert_eq!(workspace.task(&task.id), Some(confirmed));
}

#[tokio::test]
async fn assign_resolves_known_user() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let _bo = loopback.join(user("u-bo", "Bo"));
    let token = loopback.token();
    let (workspace, _notices) = signed_in(loopback, &token);
    workspace.users().fetch_all().await.unwrap();

    let task = workspace
        .create_task(TaskDraft::new("Hand over", "d"))
        .await
        .unwrap();
    let assigned = workspace.assign_task(&task.id, "u-bo").await.unwrap();
    assert_eq!(assigned.assignee.unwrap().name, "Bo");
}

#[tokio::test]
async fn transient_ids_cannot_be_updated_or_deleted() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let token = loopback.token();
    let (workspace, _notices) = signed_in(loopback, &token);
    let local = EntityId::local();

    let err = workspace
        .update_status(&local, TaskStatus::Done)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Validation(ValidationError::NotPersisted(_))
    ));
    let err = workspace.delete_task(&local).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Validation(ValidationError::NotPersisted(_))
    ));
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn reload_keeps_pending_create_at_the_front() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    loopback
        .create_task(&TaskDraft::new("Server side", "d").to_request())
        .await
        .unwrap();
    let token = loopback.token();
    let api = Gated::new(loopback);
    api.hold_writes();
    let (workspace, _notices) = signed_in(api, &token);

    let create = tokio::spawn({
        let workspace = workspace.clone();
        async move { workspace.create_task(TaskDraft::new("In flight", "d")).await }
    });
    assert!(eventually(|| workspace.tasks().len() == 1).await);

    workspace.load_tasks(&TaskQuery::default()).await.unwrap();
    assert_eq!(titles(&workspace), ["In flight", "Server side"]);

    workspace.api().release();
    create.await.unwrap().unwrap();
    assert_eq!(titles(&workspace), ["In flight", "Server side"]);
    assert!(workspace.tasks().iter().all(|t| !t.id.is_local()));
}

#[tokio::test]
async fn failed_list_load_is_returned_inline() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let token = loopback.token();
    let (workspace, mut notices) = signed_in(loopback, &token);
    workspace.api().set_online(false);

    let err = workspace
        .load_tasks(&TaskQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
    assert!(notices.try_recv().is_err());
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn rejected_token_clears_session_and_stores() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let token = loopback.token();
    let api = Gated::new(loopback);
    let (workspace, mut notices) = signed_in(api, &token);
    workspace
        .create_task(TaskDraft::new("Mine", "d"))
        .await
        .unwrap();

    workspace.api().unauthorized.store(true, Ordering::SeqCst);
    let err = workspace
        .load_tasks(&TaskQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Authentication(_)));
    assert!(workspace.session().current().is_none());
    assert!(workspace.tasks().is_empty());
    assert_eq!(notices.recv().await.unwrap(), Notice::SessionExpired);
    assert_eq!(
        notices.recv().await.unwrap(),
        Notice::Navigate(Route::Login)
    );

    // Already signed out: a second failure raises nothing new.
    let _ = workspace.load_tasks(&TaskQuery::default()).await;
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn login_activates_session_and_navigates() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    loopback.add_account(user("u-bo", "Bo"), "hunter2");
    let (workspace, mut notices) = Workspace::new(
        Arc::new(loopback),
        SessionStore::in_memory(),
        SyncSettings::default(),
    );

    let err = workspace
        .login("bo@example.com", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Authentication(_)));
    assert!(matches!(
        notices.recv().await.unwrap(),
        Notice::ActionFailed {
            action: Action::Login,
            ..
        }
    ));

    let session = workspace.login("bo@example.com", "hunter2").await.unwrap();
    assert_eq!(session.user_id(), "u-bo");
    assert_eq!(
        notices.recv().await.unwrap(),
        Notice::Navigate(Route::Dashboard)
    );

    let task = workspace
        .create_task(TaskDraft::new("By Bo", "d"))
        .await
        .unwrap();
    assert_eq!(task.creator.id, "u-bo");

    workspace.logout();
    assert!(workspace.session().current().is_none());
    assert!(workspace.tasks().is_empty());
}

// =============================================================================
// Detail view
// =============================================================================

#[tokio::test]
async fn detail_view_follows_comments_from_other_sessions() {
    let ana_api = LoopbackApi::new(user("u-ana", "Ana"));
    let bo_api = ana_api.join(user("u-bo", "Bo"));
    let hub = EventHub::new();
    ana_api.attach(hub.clone());
    let token = ana_api.token();
    let (workspace, _notices) = signed_in(ana_api, &token);

    let task = workspace
        .create_task(TaskDraft::new("Discuss", "d"))
        .await
        .unwrap();
    workspace.add_comment(&task.id, "first").await.unwrap();

    let view = workspace.open_task(&task.id, Some(&hub));
    assert_eq!(view.wait_loaded().await, LoadState::Ready);
    assert_eq!(view.comments().len(), 1);

    bo_api
        .add_comment(
            task.id.as_remote().unwrap(),
            &NewComment {
                comment: "second".into(),
            },
        )
        .await
        .unwrap();
    assert!(eventually(|| view.comments().len() == 2).await);
    let bodies: Vec<_> = view.comments().into_iter().map(|c| c.body).collect();
    assert_eq!(bodies, ["first", "second"]);
    assert_eq!(view.comments()[1].author.name, "Bo");
}

#[tokio::test]
async fn own_comment_and_its_echo_leave_one_entry() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let hub = EventHub::new();
    loopback.attach(hub.clone());
    let token = loopback.token();
    let (workspace, _notices) = signed_in(loopback, &token);
    let task = workspace
        .create_task(TaskDraft::new("Chat", "d"))
        .await
        .unwrap();

    let view = workspace.open_task(&task.id, Some(&hub));
    view.wait_loaded().await;
    workspace.add_comment(&task.id, "  hello  ").await.unwrap();

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let comments = view.comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].body, "hello");
    assert!(!comments[0].id.is_local());
}

#[tokio::test]
async fn failed_comment_is_rolled_back() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let token = loopback.token();
    let (workspace, mut notices) = signed_in(loopback, &token);
    let task = workspace
        .create_task(TaskDraft::new("Quiet", "d"))
        .await
        .unwrap();

    workspace.api().set_online(false);
    assert!(workspace.add_comment(&task.id, "lost").await.is_err());
    assert!(workspace.comments(&task.id).is_empty());
    assert!(matches!(
        notices.recv().await.unwrap(),
        Notice::ActionFailed {
            action: Action::AddComment,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn missing_task_navigates_back_after_delay() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let token = loopback.token();
    let (workspace, mut notices) = signed_in(loopback, &token);

    let view = workspace.open_task(&EntityId::remote("t-404"), None);
    assert_eq!(view.wait_loaded().await, LoadState::NotFound);
    assert!(notices.try_recv().is_err());

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice, Notice::Navigate(Route::Dashboard));
}

#[tokio::test(start_paused = true)]
async fn unmounted_view_does_not_navigate() {
    let loopback = LoopbackApi::new(user("u-ana", "Ana"));
    let token = loopback.token();
    let (workspace, mut notices) = signed_in(loopback, &token);

    let view = workspace.open_task(&EntityId::remote("t-404"), None);
    drop(view);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(notices.try_recv().is_err());
}
