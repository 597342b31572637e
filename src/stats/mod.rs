//! Aggregate counter stores
//!
//! Denormalized per-thread and per-note counters live in Postgres, separate
//! from the authoritative object store. Both repos are narrow ports with a
//! Postgres production impl and an in-memory impl for dev mode and tests.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::Result;

/// One row per thread
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStats {
    pub group_iri: String,
    pub root_note_iri: String,
    pub title: String,
    pub creator_iri: String,

    pub reply_count: i32,
    pub last_activity_at: DateTime<Utc>,

    pub is_locked: bool,
    pub is_pinned: bool,
    pub is_deleted: bool,

    pub created_at: DateTime<Utc>,
}

/// Parameters for registering a new thread row
#[derive(Debug, Clone)]
pub struct NewThread {
    pub group_iri: String,
    pub root_note_iri: String,
    pub title: String,
    pub creator_iri: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// One row per note
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteStats {
    pub note_id: String,
    pub replies: i32,
    pub ups: i32,
    pub downs: i32,
}

/// Per-thread counter operations. Each is a single statement; increments
/// are atomic relational updates, commutative under concurrent callers.
#[async_trait]
pub trait ThreadStatsRepo: Send + Sync {
    /// Insert a thread row with reply count 0. A conflicting insert on the
    /// same root id is a silent no-op.
    async fn create_thread(&self, thread: NewThread) -> Result<()>;

    /// Atomically bump the reply counter and last-activity time. Silent
    /// no-op if the row does not exist.
    async fn increment_replies(
        &self,
        root_note_iri: &str,
        activity_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_by_root_note(&self, root_note_iri: &str) -> Result<Option<ThreadStats>>;

    /// Threads in a group, pinned first then most recent activity,
    /// excluding soft-deleted rows.
    async fn list_by_group(
        &self,
        group_iri: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ThreadStats>>;

    async fn lock_thread(&self, root_note_iri: &str) -> Result<()>;
    async fn unlock_thread(&self, root_note_iri: &str) -> Result<()>;
    async fn pin_thread(&self, root_note_iri: &str) -> Result<()>;
    async fn unpin_thread(&self, root_note_iri: &str) -> Result<()>;
    async fn soft_delete_thread(&self, root_note_iri: &str) -> Result<()>;

    /// Overwrite the reply counter with a recount from the source of truth
    /// (reconciliation).
    async fn reset_replies(
        &self,
        root_note_iri: &str,
        reply_count: i32,
        activity_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Per-note counter operations
#[async_trait]
pub trait NoteStatsRepo: Send + Sync {
    /// Create a zeroed stats row if absent. Safe to call repeatedly.
    async fn ensure(&self, note_id: &str) -> Result<()>;

    async fn increment_replies(&self, note_id: &str) -> Result<()>;
    async fn increment_ups(&self, note_id: &str) -> Result<()>;
    async fn increment_downs(&self, note_id: &str) -> Result<()>;

    async fn get(&self, note_id: &str) -> Result<Option<NoteStats>>;

    /// Overwrite counters (bulk import)
    async fn set_initial(&self, note_id: &str, replies: i32, ups: i32, downs: i32) -> Result<()>;

    async fn delete(&self, note_id: &str) -> Result<()>;
}

pub use memory::{MemoryNoteStats, MemoryThreadStats};
pub use pg::{PgNoteStats, PgThreadStats};
