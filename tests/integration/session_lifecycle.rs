// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::missing_panics_doc
)]

//! Integration tests for the session surviving restarts.
//!
//! Uses a real token file in a temporary directory. These tests validate:
//! - A token saved by one process is restored by the next
//! - Garbled or expired stored tokens are discarded and the file removed
//! - Clearing is idempotent and observers see each transition once
//! - Signing in and out through a workspace writes and removes the file

use std::sync::Arc;

use serde_json::json;
use taskdeck::api::loopback::LoopbackApi;
use taskdeck::session::{FileTokenStorage, SessionError, SessionState, SessionStore};
use taskdeck::sync::{Notice, Route, SyncSettings, Workspace};
use taskdeck_proto::model::User;
use tempfile::TempDir;

fn token(sub: &str) -> String {
    taskdeck::session::mint_unsigned_token(&json!({
        "sub": sub,
        "email": format!("{sub}@example.com"),
    }))
}

fn file_session(dir: &TempDir) -> (SessionStore, std::path::PathBuf) {
    let path = dir.path().join("taskdeck").join("token");
    (SessionStore::new(FileTokenStorage::new(path.clone())), path)
}

#[test]
fn token_survives_restart() {
    let dir = TempDir::new().unwrap();

    let (first, path) = file_session(&dir);
    assert_eq!(first.state(), SessionState::Unchecked);
    assert_eq!(first.rehydrate(), SessionState::Absent);
    first.set_token(&token("u-ana")).unwrap();
    assert!(path.exists());

    let (second, _) = file_session(&dir);
    let restored = second.rehydrate();
    let session = restored.session().expect("session restored");
    assert_eq!(session.user_id(), "u-ana");
    assert_eq!(second.token().as_deref(), Some(token("u-ana").as_str()));
}

#[test]
fn garbled_stored_token_is_discarded() {
    let dir = TempDir::new().unwrap();
    let (session, path) = file_session(&dir);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "not-a-jwt").unwrap();

    assert_eq!(session.rehydrate(), SessionState::Absent);
    assert!(!path.exists());
}

#[test]
fn expired_stored_token_is_discarded() {
    let dir = TempDir::new().unwrap();
    let (session, path) = file_session(&dir);
    let expired = taskdeck::session::mint_unsigned_token(&json!({
        "sub": "u-ana",
        "exp": 1_000,
    }));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, expired).unwrap();

    assert_eq!(session.rehydrate(), SessionState::Absent);
    assert!(!path.exists());
}

#[test]
fn blank_token_file_means_signed_out() {
    let dir = TempDir::new().unwrap();
    let (session, path) = file_session(&dir);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "\n").unwrap();

    assert_eq!(session.rehydrate(), SessionState::Absent);
}

#[test]
fn invalid_new_token_clears_existing_session() {
    let dir = TempDir::new().unwrap();
    let (session, path) = file_session(&dir);
    session.set_token(&token("u-ana")).unwrap();

    let err = session.set_token("a.b").unwrap_err();
    assert!(matches!(err, SessionError::InvalidToken(_)));
    assert_eq!(session.state(), SessionState::Absent);
    assert!(!path.exists());
}

#[test]
fn clear_twice_notifies_once() {
    let dir = TempDir::new().unwrap();
    let (session, path) = file_session(&dir);
    session.set_token(&token("u-ana")).unwrap();
    let mut watcher = session.subscribe();
    watcher.borrow_and_update();

    session.clear();
    assert!(watcher.has_changed().unwrap());
    assert_eq!(*watcher.borrow_and_update(), SessionState::Absent);

    session.clear();
    assert!(!watcher.has_changed().unwrap());
    assert!(!path.exists());
}

#[tokio::test]
async fn workspace_sign_in_and_out_round_trip_the_file() {
    let dir = TempDir::new().unwrap();
    let (session, path) = file_session(&dir);
    session.rehydrate();

    let api = LoopbackApi::new(User {
        id: "u-admin".into(),
        name: "Admin".into(),
        email: "admin@example.com".into(),
        avatar: None,
        created_at: None,
    });
    let (workspace, mut notices) =
        Workspace::new(Arc::new(api), session.clone(), SyncSettings::default());

    let signed_in = workspace
        .register("Ana", "ana@example.com", "secret1")
        .await
        .unwrap();
    assert_eq!(
        notices.recv().await.unwrap(),
        Notice::Navigate(Route::Dashboard)
    );
    let stored = std::fs::read_to_string(&path).unwrap();
    assert_eq!(stored, signed_in.token());

    // A second process picks the session up without signing in again.
    let (restarted, _) = file_session(&dir);
    assert_eq!(
        restarted.rehydrate().session().map(|s| s.user_id().to_string()),
        Some(signed_in.user_id().to_string())
    );

    workspace.logout();
    assert_eq!(
        notices.recv().await.unwrap(),
        Notice::Navigate(Route::Login)
    );
    assert!(!path.exists());
    assert_eq!(session.state(), SessionState::Absent);
}
