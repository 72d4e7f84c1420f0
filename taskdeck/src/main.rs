//! `TaskDeck`: collaborative task tracker client.
//!
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskdeck/config.toml`).
//!
//! ```bash
//! taskdeck --api-url http://localhost:3000 login ana@example.com --password secret
//! taskdeck tasks create "Write report" "Quarterly numbers" --priority high
//! taskdeck tasks list --status in-progress
//! taskdeck watch
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskdeck::api::http::HttpApi;
use taskdeck::cli::{self, Command};
use taskdeck::config::{CliArgs, ClientConfig};
use taskdeck::realtime::RealtimeClient;
use taskdeck::session::{FileTokenStorage, SessionState, SessionStore};
use taskdeck::sync::{Notice, Workspace};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file so stdout carries only command output.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(api = %config.api_url, "taskdeck starting");

    let command = cli.command.unwrap_or(Command::Whoami);
    match run(&config, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &ClientConfig, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let session = SessionStore::new(FileTokenStorage::new(config.token_path.clone()));
    if let SessionState::Absent = session.rehydrate() {
        tracing::debug!(path = %config.token_path.display(), "no stored session");
    }

    let api = HttpApi::new(config.api_base()?, session.clone(), config.request_timeout)?;
    let (workspace, mut notices) = Workspace::new(Arc::new(api), session, config.sync_settings());

    let realtime = match &command {
        Command::Watch => Some(Arc::new(RealtimeClient::new(config.realtime_config()?))),
        _ => None,
    };

    let mut stdout = std::io::stdout().lock();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(err = %e, "could not listen for interrupt");
            std::future::pending::<()>().await;
        }
    };
    let result = cli::execute(&workspace, realtime.as_ref(), command, &mut stdout, shutdown).await;

    while let Ok(notice) = notices.try_recv() {
        print_notice(notice);
    }
    tracing::info!("taskdeck exiting");
    Ok(result?)
}

/// Echoes a workspace notice on stderr.
fn print_notice(notice: Notice) {
    match notice {
        Notice::ActionFailed { action, message } => eprintln!("{action:?} failed: {message}"),
        Notice::SessionExpired => eprintln!("session expired, please sign in again"),
        Notice::Navigate(route) => tracing::debug!(?route, "navigation requested"),
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskdeck.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
