//! Form validation run before anything is sent.

use taskdeck_proto::api::{Credentials, NewTask, Registration, TaskPatch};
use taskdeck_proto::model::{TaskId, TaskPriority, TaskStatus, UserRef};

/// Input refused before or by the server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required field is blank.
    #[error("{0} is required")]
    Required(&'static str),

    /// A field exceeds its length limit.
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum length in characters.
        max: usize,
    },

    /// The email address has no `@`.
    #[error("email address is invalid")]
    InvalidEmail,

    /// The task only exists locally and cannot be referenced yet.
    #[error("task {0} has not been saved yet")]
    NotPersisted(TaskId),

    /// The update would change nothing.
    #[error("nothing to update")]
    EmptyPatch,

    /// The server refused the input.
    #[error("{0}")]
    Rejected(String),
}

/// A task as filled in by the user, before it has an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Initial status.
    pub status: TaskStatus,
    /// Priority.
    pub priority: TaskPriority,
    /// Assignee, if chosen.
    pub assignee: Option<UserRef>,
}

impl TaskDraft {
    /// A `TODO`, `MEDIUM` draft with no assignee.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            assignee: None,
        }
    }

    /// Trims the text fields and checks them.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Required`] for a blank title or
    /// description, or [`ValidationError::TooLong`] for an oversized title.
    pub fn normalized(mut self, max_title_len: usize) -> Result<Self, ValidationError> {
        self.title = required_text("title", &self.title)?;
        self.description = required_text("description", &self.description)?;
        check_length("title", &self.title, max_title_len)?;
        Ok(self)
    }

    /// The request body for this draft.
    #[must_use]
    pub fn to_request(&self) -> NewTask {
        NewTask {
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status,
            priority: self.priority,
            assigned_to: self.assignee.as_ref().map(|u| u.id.clone()),
        }
    }
}

/// Trims and checks a partial update.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyPatch`] if nothing would change, or the
/// same field errors as [`TaskDraft::normalized`].
pub fn normalize_patch(
    mut patch: TaskPatch,
    max_title_len: usize,
) -> Result<TaskPatch, ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::EmptyPatch);
    }
    if let Some(title) = patch.title.as_deref() {
        let title = required_text("title", title)?;
        check_length("title", &title, max_title_len)?;
        patch.title = Some(title);
    }
    if let Some(description) = patch.description.as_deref() {
        patch.description = Some(required_text("description", description)?);
    }
    if let Some(Some(user_id)) = patch.assigned_to.as_ref() {
        if user_id.trim().is_empty() {
            return Err(ValidationError::Required("assignee"));
        }
    }
    Ok(patch)
}

/// Trims and checks comment text.
///
/// # Errors
///
/// Returns [`ValidationError::Required`] if the text is blank.
pub fn normalize_comment(body: &str) -> Result<String, ValidationError> {
    required_text("comment", body)
}

/// Checks sign-in input.
///
/// # Errors
///
/// Returns the first blank or malformed field.
pub fn credentials(email: &str, password: &str) -> Result<Credentials, ValidationError> {
    Ok(Credentials {
        email: email_address(email)?,
        password: required_secret(password)?,
    })
}

/// Checks sign-up input.
///
/// # Errors
///
/// Returns the first blank or malformed field.
pub fn registration(
    name: &str,
    email: &str,
    password: &str,
) -> Result<Registration, ValidationError> {
    Ok(Registration {
        name: required_text("name", name)?,
        email: email_address(email)?,
        password: required_secret(password)?,
    })
}

fn required_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(trimmed.to_string())
}

// Passwords are sent as typed; only emptiness is checked.
fn required_secret(value: &str) -> Result<String, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required("password"));
    }
    Ok(value.to_string())
}

fn email_address(value: &str) -> Result<String, ValidationError> {
    let email = required_text("email", value)?;
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ValidationError::InvalidEmail),
    }
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}
