//! REST backend for [`RemoteApi`] built on `reqwest`.
//!
//! Every request carries the session token as a bearer header when one is
//! active. Response bodies are decoded through
//! [`taskdeck_proto::api::decode_body`], which accepts both the wrapped
//! (`{ data, message }`) and bare shapes the server uses.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use taskdeck_proto::api::{
    AccessToken, Assignment, Credentials, ErrorBody, NewComment, NewTask, Registration,
    StatusChange, TaskPatch, TaskQuery, decode_body,
};
use taskdeck_proto::model::{Comment, Task, TaskDetail, TaskStatus, User};

use super::{ApiError, RemoteApi};
use crate::session::SessionStore;

/// HTTP client for the task server.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base: Url,
    session: SessionStore,
}

impl HttpApi {
    /// Creates a client rooted at `base` (e.g. `http://localhost:3000/api`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if `base` cannot carry path segments
    /// or the HTTP client cannot be built.
    pub fn new(base: Url, session: SessionStore, timeout: Duration) -> Result<Self, ApiError> {
        if base.cannot_be_a_base() {
            return Err(ApiError::Transport(format!("{base} cannot be used as an API root")));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base,
            session,
        })
    }

    /// The API root.
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Transport(format!("{} has no path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let request = self.client.request(method, self.endpoint(segments)?);
        Ok(match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    /// Sends `request` and returns the raw body of a successful response.
    async fn execute(&self, context: &str, request: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let response = request.send().await.map_err(|e| {
            tracing::debug!(context, err = %e, "request did not complete");
            ApiError::Transport(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if status.is_success() {
            return Ok(body.to_vec());
        }

        let message = serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.summary())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        tracing::debug!(context, status = status.as_u16(), %message, "request failed");
        Err(ApiError::from_status(status.as_u16(), message))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        context: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.execute(context, request).await?;
        Ok(decode_body(context, &body)?)
    }
}

impl RemoteApi for HttpApi {
    async fn login(&self, credentials: &Credentials) -> Result<AccessToken, ApiError> {
        let request = self.request(Method::POST, &["auth", "login"])?.json(credentials);
        self.fetch("POST /auth/login", request).await
    }

    async fn register(&self, registration: &Registration) -> Result<AccessToken, ApiError> {
        let request = self
            .request(Method::POST, &["auth", "register"])?
            .json(registration);
        self.fetch("POST /auth/register", request).await
    }

    async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        let request = self.request(Method::GET, &["tasks"])?.query(query);
        self.fetch("GET /tasks", request).await
    }

    async fn get_task(&self, id: &str) -> Result<TaskDetail, ApiError> {
        let request = self.request(Method::GET, &["tasks", id])?;
        self.fetch("GET /tasks/:id", request).await
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
        let request = self.request(Method::POST, &["tasks"])?.json(task);
        self.fetch("POST /tasks", request).await
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, ApiError> {
        let request = self.request(Method::PUT, &["tasks", id])?.json(patch);
        self.fetch("PUT /tasks/:id", request).await
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<Task, ApiError> {
        let request = self
            .request(Method::PUT, &["tasks", id, "status"])?
            .json(&StatusChange { status });
        self.fetch("PUT /tasks/:id/status", request).await
    }

    async fn assign_task(&self, id: &str, user_id: &str) -> Result<Task, ApiError> {
        let request = self
            .request(Method::POST, &["tasks", id, "assign"])?
            .json(&Assignment {
                user_id: user_id.to_string(),
            });
        self.fetch("POST /tasks/:id/assign", request).await
    }

    async fn delete_task(&self, id: &str) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, &["tasks", id])?;
        self.execute("DELETE /tasks/:id", request).await.map(drop)
    }

    async fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>, ApiError> {
        let request = self.request(Method::GET, &["tasks", task_id, "comments"])?;
        self.fetch("GET /tasks/:id/comments", request).await
    }

    async fn add_comment(&self, task_id: &str, comment: &NewComment) -> Result<Comment, ApiError> {
        let request = self
            .request(Method::POST, &["tasks", task_id, "comments"])?
            .json(comment);
        self.fetch("POST /tasks/:id/comments", request).await
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let request = self.request(Method::GET, &["users"])?;
        self.fetch("GET /users", request).await
    }

    async fn get_user(&self, id: &str) -> Result<User, ApiError> {
        let request = self.request(Method::GET, &["users", id])?;
        self.fetch("GET /users/:id", request).await
    }
}
