//! `TaskDeck`: collaborative task tracker client library.
//!
//! Local stores stay converged with the server while the user edits
//! optimistically and other sessions push changes over the event channel.

pub mod api;
pub mod cli;
pub mod config;
pub mod realtime;
pub mod session;
pub mod store;
pub mod sync;
