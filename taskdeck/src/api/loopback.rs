//! In-process task server for tests and offline demos.
//!
//! A [`LoopbackApi`] is one client's handle onto a shared in-memory
//! backend. Handles made with [`LoopbackApi::join`] see the same tasks, so
//! several sessions can be driven against one "server". Every change is
//! published, the way the broker would push it, into all hubs attached with
//! [`LoopbackApi::attach`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Value, json};

use taskdeck_proto::api::{
    AccessToken, Credentials, NewComment, NewTask, Registration, TaskPatch, TaskQuery,
};
use taskdeck_proto::events::{CommentEvent, TaskEvent, comment_event_name};
use taskdeck_proto::model::{
    Comment, EntityId, Task, TaskDetail, TaskId, TaskStatus, User, UserRef,
};

use super::{ApiError, RemoteApi};
use crate::realtime::EventHub;
use crate::session::mint_unsigned_token;
use crate::store::{CommentBoard, EntityStore, Placement};

/// Shared server state.
struct Backend {
    tasks: EntityStore<Task>,
    comments: CommentBoard,
    users: HashMap<String, User>,
    passwords: HashMap<String, String>,
    hubs: Vec<EventHub>,
    next_id: u64,
}

impl Backend {
    fn new() -> Self {
        Self {
            tasks: EntityStore::new(Placement::Front),
            comments: CommentBoard::new(),
            users: HashMap::new(),
            passwords: HashMap::new(),
            hubs: Vec::new(),
            next_id: 0,
        }
    }

    fn mint_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn user_ref(&self, id: &str) -> UserRef {
        self.users.get(id).map_or_else(
            || UserRef {
                id: id.to_string(),
                name: id.to_string(),
                email: None,
            },
            User::to_ref,
        )
    }

    fn task(&self, id: &str) -> Result<&Task, ApiError> {
        self.tasks
            .get(&EntityId::remote(id))
            .ok_or_else(|| ApiError::NotFound(format!("task {id}")))
    }

    fn edit(&mut self, id: &str, apply: impl FnOnce(&mut Task)) -> Result<Task, ApiError> {
        let mut task = self.task(id)?.clone();
        apply(&mut task);
        task.updated_at = Utc::now();
        self.tasks.replace_one(task.clone());
        Ok(task)
    }
}

/// One client's handle onto an in-memory task server.
pub struct LoopbackApi {
    backend: Arc<Mutex<Backend>>,
    actor: Mutex<User>,
    online: AtomicBool,
}

impl std::fmt::Debug for LoopbackApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackApi")
            .field("actor", &self.actor.lock().id)
            .field("online", &self.online.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LoopbackApi {
    /// Starts an empty server and returns a handle acting as `actor`.
    pub fn new(actor: User) -> Self {
        Self::attach_backend(Arc::new(Mutex::new(Backend::new())), actor)
    }

    /// Returns another handle onto the same server, acting as `actor`.
    #[must_use]
    pub fn join(&self, actor: User) -> Self {
        Self::attach_backend(Arc::clone(&self.backend), actor)
    }

    fn attach_backend(backend: Arc<Mutex<Backend>>, actor: User) -> Self {
        backend.lock().users.insert(actor.id.clone(), actor.clone());
        Self {
            backend,
            actor: Mutex::new(actor),
            online: AtomicBool::new(true),
        }
    }

    /// Registers an account that can sign in with `password`.
    pub fn add_account(&self, user: User, password: &str) {
        let mut backend = self.backend.lock();
        backend.passwords.insert(user.email.clone(), password.to_string());
        backend.users.insert(user.id.clone(), user);
    }

    /// Publishes every future change into `hub`.
    pub fn attach(&self, hub: EventHub) {
        self.backend.lock().hubs.push(hub);
    }

    /// While offline every call on this handle fails with a transport error.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// A token for the acting user, as the auth endpoints would issue.
    #[must_use]
    pub fn token(&self) -> String {
        token_for(&self.actor.lock())
    }

    /// Number of tasks on the server.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.backend.lock().tasks.len()
    }

    fn reachable(&self) -> Result<(), ApiError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ApiError::Transport("offline".into()))
        }
    }

    fn actor_ref(&self) -> UserRef {
        self.actor.lock().to_ref()
    }

    /// Publishes outside the backend lock.
    fn publish(hubs: &[EventHub], name: &str, payload: Result<Value, serde_json::Error>) {
        match payload {
            Ok(payload) => {
                for hub in hubs {
                    hub.publish(name, payload.clone());
                }
            }
            Err(e) => tracing::warn!(err = %e, name, "could not encode loopback event"),
        }
    }

    fn publish_task(hubs: &[EventHub], event: &TaskEvent) {
        Self::publish(hubs, event.name(), event.to_payload());
    }

    fn publish_comment(hubs: &[EventHub], task_id: &TaskId, event: &CommentEvent) {
        let name = comment_event_name(event.kind(), task_id);
        Self::publish(hubs, &name, event.to_payload());
    }

    fn updated(&self, id: &str, apply: impl FnOnce(&mut Task)) -> Result<Task, ApiError> {
        self.reachable()?;
        let (task, hubs) = {
            let mut backend = self.backend.lock();
            let task = backend.edit(id, apply)?;
            (task, backend.hubs.clone())
        };
        Self::publish_task(&hubs, &TaskEvent::Updated(task.clone()));
        Ok(task)
    }
}

fn token_for(user: &User) -> String {
    mint_unsigned_token(&json!({
        "sub": user.id,
        "email": user.email,
        "name": user.name,
    }))
}

fn matches_query(task: &Task, query: &TaskQuery) -> bool {
    if query.status.is_some_and(|s| s != task.status) {
        return false;
    }
    if query.priority.is_some_and(|p| p != task.priority) {
        return false;
    }
    if let Some(assignee) = &query.assigned_to {
        if task.assignee.as_ref().is_none_or(|a| &a.id != assignee) {
            return false;
        }
    }
    if query.created_by.as_ref().is_some_and(|c| c != &task.creator.id) {
        return false;
    }
    if let Some(q) = &query.q {
        let q = q.to_lowercase();
        if !task.title.to_lowercase().contains(&q) && !task.description.to_lowercase().contains(&q)
        {
            return false;
        }
    }
    true
}

impl RemoteApi for LoopbackApi {
    async fn login(&self, credentials: &Credentials) -> Result<AccessToken, ApiError> {
        self.reachable()?;
        let user = {
            let backend = self.backend.lock();
            let known = backend
                .passwords
                .get(&credentials.email)
                .is_some_and(|pw| *pw == credentials.password);
            backend
                .users
                .values()
                .find(|u| known && u.email == credentials.email)
                .cloned()
                .ok_or_else(|| ApiError::Unauthorized("invalid credentials".into()))?
        };
        let token = token_for(&user);
        *self.actor.lock() = user;
        Ok(AccessToken {
            access_token: token,
        })
    }

    async fn register(&self, registration: &Registration) -> Result<AccessToken, ApiError> {
        self.reachable()?;
        let user = {
            let mut backend = self.backend.lock();
            if backend.passwords.contains_key(&registration.email) {
                return Err(ApiError::Rejected {
                    status: 409,
                    message: "email already registered".into(),
                });
            }
            let user = User {
                id: backend.mint_id("u"),
                name: registration.name.clone(),
                email: registration.email.clone(),
                avatar: None,
                created_at: Some(Utc::now()),
            };
            backend
                .passwords
                .insert(user.email.clone(), registration.password.clone());
            backend.users.insert(user.id.clone(), user.clone());
            user
        };
        let token = token_for(&user);
        *self.actor.lock() = user;
        Ok(AccessToken {
            access_token: token,
        })
    }

    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.reachable()?;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        let skip = query
            .page
            .map_or(0, |p| (p.max(1) as usize - 1).saturating_mul(limit));
        let backend = self.backend.lock();
        Ok(backend
            .tasks
            .iter()
            .filter(|t| matches_query(t, query))
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_task(&self, id: &str) -> Result<TaskDetail, ApiError> {
        self.reachable()?;
        let backend = self.backend.lock();
        let task = backend.task(id)?.clone();
        let comments = backend.comments.comments(&task.id);
        Ok(TaskDetail { task, comments })
    }

    async fn create_task(&self, new: &NewTask) -> Result<Task, ApiError> {
        self.reachable()?;
        let creator = self.actor_ref();
        let (task, hubs) = {
            let mut backend = self.backend.lock();
            let now = Utc::now();
            let task = Task {
                id: EntityId::remote(backend.mint_id("t")),
                title: new.title.clone(),
                description: new.description.clone(),
                status: new.status,
                priority: new.priority,
                assignee: new.assigned_to.as_deref().map(|id| backend.user_ref(id)),
                creator,
                created_at: now,
                updated_at: now,
            };
            backend.tasks.insert_one(task.clone());
            (task, backend.hubs.clone())
        };
        Self::publish_task(&hubs, &TaskEvent::Created(task.clone()));
        Ok(task)
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, ApiError> {
        let assignee = patch.assigned_to.as_ref().map(|assigned| {
            assigned
                .as_deref()
                .map(|user_id| self.backend.lock().user_ref(user_id))
        });
        self.updated(id, |task| {
            if let Some(title) = &patch.title {
                task.title.clone_from(title);
            }
            if let Some(description) = &patch.description {
                task.description.clone_from(description);
            }
            if let Some(status) = patch.status {
                task.status = status;
            }
            if let Some(priority) = patch.priority {
                task.priority = priority;
            }
            if let Some(assignee) = assignee {
                task.assignee = assignee;
            }
        })
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<Task, ApiError> {
        self.updated(id, |task| task.status = status)
    }

    async fn assign_task(&self, id: &str, user_id: &str) -> Result<Task, ApiError> {
        let assignee = self.backend.lock().user_ref(user_id);
        self.updated(id, |task| task.assignee = Some(assignee))
    }

    async fn delete_task(&self, id: &str) -> Result<(), ApiError> {
        self.reachable()?;
        let task_id = EntityId::remote(id);
        let hubs = {
            let mut backend = self.backend.lock();
            if backend.tasks.remove_one(&task_id).is_none() {
                return Err(ApiError::NotFound(format!("task {id}")));
            }
            backend.comments.drop_thread(&task_id);
            backend.hubs.clone()
        };
        Self::publish_task(&hubs, &TaskEvent::Deleted(task_id));
        Ok(())
    }

    async fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>, ApiError> {
        self.reachable()?;
        let backend = self.backend.lock();
        let task = backend.task(task_id)?;
        Ok(backend.comments.comments(&task.id))
    }

    async fn add_comment(&self, task_id: &str, new: &NewComment) -> Result<Comment, ApiError> {
        self.reachable()?;
        let author = self.actor_ref();
        let (comment, hubs) = {
            let mut backend = self.backend.lock();
            let parent = backend.task(task_id)?.id.clone();
            let comment = Comment {
                id: EntityId::remote(backend.mint_id("c")),
                task_id: parent.clone(),
                author,
                body: new.comment.clone(),
                created_at: Utc::now(),
            };
            backend.comments.thread_mut(&parent).insert_one(comment.clone());
            (comment, backend.hubs.clone())
        };
        Self::publish_comment(
            &hubs,
            &comment.task_id,
            &CommentEvent::Created(comment.clone()),
        );
        Ok(comment)
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.reachable()?;
        let mut users: Vec<User> = self.backend.lock().users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn get_user(&self, id: &str) -> Result<User, ApiError> {
        self.reachable()?;
        self.backend
            .lock()
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("user {id}")))
    }
}
