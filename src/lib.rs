//! Agora - federated discussion-board backend
//!
//! Stores ActivityPub-style notes and activities in MongoDB, keeps
//! denormalized thread/note counters in Postgres, and attaches thread
//! lineage to every note at write time so reply resolution is a single
//! point lookup.

pub mod config;
pub mod db;
pub mod federation;
pub mod routes;
pub mod server;
pub mod stats;
pub mod threads;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{AgoraError, Result};
