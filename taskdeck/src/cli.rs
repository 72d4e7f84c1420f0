//! Command-line front end over a [`Workspace`].
//!
//! Each subcommand maps onto one workspace action. Output goes to the
//! writer handed in, so commands can be driven against the loopback API in
//! tests.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use taskdeck_proto::api::{TaskPatch, TaskQuery};
use taskdeck_proto::model::{Comment, EntityId, Task, TaskPriority, TaskStatus};

use crate::api::RemoteApi;
use crate::realtime::RealtimeClient;
use crate::sync::{Change, LoadState, SyncError, TaskDraft, Workspace};

/// Errors reported by a command.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The action failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Writing output failed.
    #[error("output error: {0}")]
    Io(#[from] io::Error),

    /// The command cannot run in this setup.
    #[error("{0}")]
    Unavailable(String),
}

/// Top-level subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sign in and store the session token.
    Login {
        /// Account email.
        email: String,
        /// Account password.
        #[arg(long, env = "TASKDECK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in.
    Register {
        /// Display name.
        name: String,
        /// Account email.
        email: String,
        /// Account password.
        #[arg(long, env = "TASKDECK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show who is signed in.
    Whoami,
    /// Work with tasks.
    #[command(subcommand)]
    Tasks(TaskCommand),
    /// Comment on a task.
    Comment {
        /// Task identifier.
        task_id: String,
        /// Comment text.
        text: String,
    },
    /// List users.
    Users,
    /// Follow live task changes until interrupted.
    Watch,
}

/// `tasks` subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    /// List tasks.
    List {
        /// Only tasks in this status.
        #[arg(long, value_parser = parse_status)]
        status: Option<TaskStatus>,
        /// Only tasks with this priority.
        #[arg(long, value_parser = parse_priority)]
        priority: Option<TaskPriority>,
        /// Only tasks assigned to this user id.
        #[arg(long)]
        assigned_to: Option<String>,
        /// Only tasks created by this user id.
        #[arg(long)]
        created_by: Option<String>,
        /// Page number, starting at 1.
        #[arg(long)]
        page: Option<u32>,
        /// Page size.
        #[arg(long)]
        limit: Option<u32>,
        /// Free-text search.
        #[arg(long, short)]
        query: Option<String>,
    },
    /// Show a task with its comments.
    Show {
        /// Task identifier.
        id: String,
    },
    /// Create a task.
    Create {
        /// Title.
        title: String,
        /// Description.
        description: String,
        /// Initial status.
        #[arg(long, value_parser = parse_status, default_value = "TODO")]
        status: TaskStatus,
        /// Priority.
        #[arg(long, value_parser = parse_priority, default_value = "MEDIUM")]
        priority: TaskPriority,
        /// Assignee user id.
        #[arg(long)]
        assignee: Option<String>,
    },
    /// Edit a task.
    Update {
        /// Task identifier.
        id: String,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// New status.
        #[arg(long, value_parser = parse_status)]
        status: Option<TaskStatus>,
        /// New priority.
        #[arg(long, value_parser = parse_priority)]
        priority: Option<TaskPriority>,
        /// New assignee user id.
        #[arg(long, conflicts_with = "unassign")]
        assignee: Option<String>,
        /// Remove the assignee.
        #[arg(long)]
        unassign: bool,
    },
    /// Delete a task.
    Delete {
        /// Task identifier.
        id: String,
    },
}

/// Parses a status as written on the wire (`in_progress`, `IN-PROGRESS`).
fn parse_status(value: &str) -> Result<TaskStatus, String> {
    parse_enum(value)
}

/// Parses a priority (`low`, `MEDIUM`, ...).
fn parse_priority(value: &str) -> Result<TaskPriority, String> {
    parse_enum(value)
}

fn parse_enum<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, String> {
    let wire = value.trim().to_uppercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(wire))
        .map_err(|_| format!("unrecognized value {value:?}"))
}

/// Runs one command.
///
/// `realtime` is needed only by [`Command::Watch`], which runs until
/// `shutdown` resolves.
///
/// # Errors
///
/// Returns [`CliError`] if the action fails or output cannot be written.
pub async fn execute<A, W>(
    workspace: &Workspace<A>,
    realtime: Option<&Arc<RealtimeClient>>,
    command: Command,
    out: &mut W,
    shutdown: impl Future<Output = ()>,
) -> Result<(), CliError>
where
    A: RemoteApi,
    W: Write,
{
    match command {
        Command::Login { email, password } => {
            let session = workspace.login(&email, &password).await?;
            writeln!(out, "signed in as {}", display_name(&session))?;
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let session = workspace.register(&name, &email, &password).await?;
            writeln!(out, "registered and signed in as {}", display_name(&session))?;
        }
        Command::Logout => {
            workspace.logout();
            writeln!(out, "signed out")?;
        }
        Command::Whoami => match workspace.session().current() {
            Some(session) => writeln!(out, "{} ({})", display_name(&session), session.user_id())?,
            None => writeln!(out, "not signed in")?,
        },
        Command::Tasks(command) => run_task_command(workspace, command, out).await?,
        Command::Comment { task_id, text } => {
            let comment = workspace
                .add_comment(&EntityId::remote(task_id), &text)
                .await?;
            write_comment(out, &comment)?;
        }
        Command::Users => {
            for user in workspace.users().fetch_all().await? {
                writeln!(out, "{}\t{}\t{}", user.id, user.name, user.email)?;
            }
        }
        Command::Watch => {
            let realtime = realtime
                .ok_or_else(|| CliError::Unavailable("event channel is not configured".into()))?;
            watch(workspace, realtime, out, shutdown).await?;
        }
    }
    Ok(())
}

async fn run_task_command<A, W>(
    workspace: &Workspace<A>,
    command: TaskCommand,
    out: &mut W,
) -> Result<(), CliError>
where
    A: RemoteApi,
    W: Write,
{
    match command {
        TaskCommand::List {
            status,
            priority,
            assigned_to,
            created_by,
            page,
            limit,
            query,
        } => {
            let query = TaskQuery {
                status,
                priority,
                assigned_to,
                created_by,
                page,
                limit,
                q: query,
            };
            workspace.load_tasks(&query).await?;
            write_task_list(out, &workspace.tasks())?;
        }
        TaskCommand::Show { id } => {
            let view = workspace.open_task(&EntityId::remote(id), None);
            match view.wait_loaded().await {
                LoadState::Ready => {
                    if let Some(task) = view.task() {
                        write_task_detail(out, &task, &view.comments())?;
                    }
                }
                LoadState::NotFound => writeln!(out, "task {} not found", view.task_id())?,
                LoadState::Failed(message) => return Err(CliError::Unavailable(message)),
                LoadState::Loading => {}
            }
        }
        TaskCommand::Create {
            title,
            description,
            status,
            priority,
            assignee,
        } => {
            let mut draft = TaskDraft::new(title, description);
            draft.status = status;
            draft.priority = priority;
            if let Some(user_id) = assignee {
                draft.assignee = Some(workspace.users().fetch_by_id(&user_id).await?.to_ref());
            }
            let task = workspace.create_task(draft).await?;
            write_task(out, &task)?;
        }
        TaskCommand::Update {
            id,
            title,
            description,
            status,
            priority,
            assignee,
            unassign,
        } => {
            let id = EntityId::remote(id);
            let assigned_to = if unassign {
                Some(None)
            } else {
                assignee.map(Some)
            };
            let patch = TaskPatch {
                title,
                description,
                status,
                priority,
                assigned_to,
            };
            let task = match single_field(&patch) {
                Some(SingleField::Status(status)) => workspace.update_status(&id, status).await?,
                Some(SingleField::Assignee(user_id)) => {
                    workspace.assign_task(&id, &user_id).await?
                }
                None => workspace.update_task(&id, patch).await?,
            };
            write_task(out, &task)?;
        }
        TaskCommand::Delete { id } => {
            workspace.delete_task(&EntityId::remote(id.clone())).await?;
            writeln!(out, "deleted {id}")?;
        }
    }
    Ok(())
}

/// Patches that have a dedicated endpoint.
enum SingleField {
    Status(TaskStatus),
    Assignee(String),
}

fn single_field(patch: &TaskPatch) -> Option<SingleField> {
    let set = [
        patch.title.is_some(),
        patch.description.is_some(),
        patch.status.is_some(),
        patch.priority.is_some(),
        patch.assigned_to.is_some(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count();
    if set != 1 {
        return None;
    }
    if let Some(status) = patch.status {
        return Some(SingleField::Status(status));
    }
    match &patch.assigned_to {
        Some(Some(user_id)) => Some(SingleField::Assignee(user_id.clone())),
        _ => None,
    }
}

/// Streams task changes until `shutdown` resolves.
///
/// The event channel follows the session for the whole run: it closes as
/// soon as the session ends and reopens on a new sign-in.
async fn watch<A, W>(
    workspace: &Workspace<A>,
    realtime: &Arc<RealtimeClient>,
    out: &mut W,
    shutdown: impl Future<Output = ()>,
) -> Result<(), CliError>
where
    A: RemoteApi,
    W: Write,
{
    if workspace.session().current().is_none() {
        return Err(SyncError::Authentication("not signed in".into()).into());
    }
    let follower = realtime.follow_session(workspace.session());
    let streamed = stream_changes(workspace, realtime, out, shutdown).await;
    follower.abort();
    realtime.disconnect();
    streamed
}

async fn stream_changes<A, W>(
    workspace: &Workspace<A>,
    realtime: &RealtimeClient,
    out: &mut W,
    shutdown: impl Future<Output = ()>,
) -> Result<(), CliError>
where
    A: RemoteApi,
    W: Write,
{
    let mut feed = workspace.follow_tasks(realtime.hub());
    let mut states = realtime.watch_state();

    workspace.load_tasks(&TaskQuery::default()).await?;
    write_task_list(out, &workspace.tasks())?;

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            change = feed.next_change() => {
                let Some(change) = change else { break };
                write_change(out, &change)?;
                write_task_list(out, &workspace.tasks())?;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                writeln!(out, "-- event channel {state}")?;
            }
        }
    }
    Ok(())
}

fn display_name(session: &crate::session::Session) -> &str {
    let claims = session.claims();
    claims
        .name
        .as_deref()
        .or(claims.email.as_deref())
        .unwrap_or(&claims.sub)
}

fn write_task<W: Write>(out: &mut W, task: &Task) -> io::Result<()> {
    let assignee = task.assignee.as_ref().map_or("-", |a| a.name.as_str());
    writeln!(
        out,
        "{}\t[{}]\t{}\t{}\t@{}",
        task.id, task.status, task.priority, task.title, assignee
    )
}

fn write_task_list<W: Write>(out: &mut W, tasks: &[Task]) -> io::Result<()> {
    if tasks.is_empty() {
        return writeln!(out, "no tasks");
    }
    for task in tasks {
        write_task(out, task)?;
    }
    Ok(())
}

fn write_task_detail<W: Write>(out: &mut W, task: &Task, comments: &[Comment]) -> io::Result<()> {
    write_task(out, task)?;
    writeln!(out, "created by {} at {}", task.creator.name, task.created_at)?;
    writeln!(out)?;
    writeln!(out, "{}", task.description)?;
    if !comments.is_empty() {
        writeln!(out)?;
    }
    for comment in comments {
        write_comment(out, comment)?;
    }
    Ok(())
}

fn write_comment<W: Write>(out: &mut W, comment: &Comment) -> io::Result<()> {
    writeln!(out, "{} {}: {}", comment.created_at, comment.author.name, comment.body)
}

fn write_change<W: Write>(out: &mut W, change: &Change) -> io::Result<()> {
    let note = if change.applied { "" } else { " (no change)" };
    writeln!(out, "-- task {} {}{note}", change.id, change.kind.as_str())
}
