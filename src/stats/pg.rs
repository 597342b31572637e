//! Postgres implementations of the counter repos
//!
//! All SQL is runtime-checked (sqlx::query, not sqlx::query!) to avoid a
//! compile-time DB requirement. Increments are expressed as relational
//! updates, never read-modify-write in application code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::stats::{NewThread, NoteStats, NoteStatsRepo, ThreadStats, ThreadStatsRepo};
use crate::types::Result;

type ThreadRow = (
    String,
    String,
    String,
    String,
    i32,
    DateTime<Utc>,
    bool,
    bool,
    bool,
    DateTime<Utc>,
);

const THREAD_COLUMNS: &str = "group_iri, root_note_iri, title, creator_iri, \
     reply_count, last_activity_at, is_locked, is_pinned, is_deleted, created_at";

fn thread_from_row(row: ThreadRow) -> ThreadStats {
    ThreadStats {
        group_iri: row.0,
        root_note_iri: row.1,
        title: row.2,
        creator_iri: row.3,
        reply_count: row.4,
        last_activity_at: row.5,
        is_locked: row.6,
        is_pinned: row.7,
        is_deleted: row.8,
        created_at: row.9,
    }
}

/// Create counter tables if absent. Run once at startup.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS threads (
            id BIGSERIAL PRIMARY KEY,

            group_iri TEXT NOT NULL,
            root_note_iri TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            creator_iri TEXT NOT NULL,

            reply_count INTEGER NOT NULL DEFAULT 0,
            last_activity_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

            is_locked BOOLEAN NOT NULL DEFAULT FALSE,
            is_pinned BOOLEAN NOT NULL DEFAULT FALSE,
            is_deleted BOOLEAN NOT NULL DEFAULT FALSE,

            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS threads_group_listing
        ON threads (group_iri, is_pinned DESC, last_activity_at DESC)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS note_stats (
            note_id TEXT PRIMARY KEY,
            replies INTEGER NOT NULL DEFAULT 0,
            ups INTEGER NOT NULL DEFAULT 0,
            downs INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("Postgres counter tables ready");
    Ok(())
}

/// Postgres-backed thread counters
#[derive(Clone)]
pub struct PgThreadStats {
    pool: PgPool,
}

impl PgThreadStats {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ThreadStatsRepo for PgThreadStats {
    async fn create_thread(&self, thread: NewThread) -> Result<()> {
        let published = thread.published_at.unwrap_or_else(Utc::now);

        sqlx::query(
            r#"
            INSERT INTO threads (
                group_iri, root_note_iri, title, creator_iri,
                reply_count, last_activity_at, created_at
            )
            VALUES ($1, $2, $3, $4, 0, $5, $5)
            ON CONFLICT (root_note_iri) DO NOTHING
            "#,
        )
        .bind(&thread.group_iri)
        .bind(&thread.root_note_iri)
        .bind(&thread.title)
        .bind(&thread.creator_iri)
        .bind(published)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_replies(
        &self,
        root_note_iri: &str,
        activity_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE threads
            SET reply_count = reply_count + 1,
                last_activity_at = $2
            WHERE root_note_iri = $1
            "#,
        )
        .bind(root_note_iri)
        .bind(activity_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_root_note(&self, root_note_iri: &str) -> Result<Option<ThreadStats>> {
        let row = sqlx::query_as::<_, ThreadRow>(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads WHERE root_note_iri = $1"
        ))
        .bind(root_note_iri)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(thread_from_row))
    }

    async fn list_by_group(
        &self,
        group_iri: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ThreadStats>> {
        let rows = sqlx::query_as::<_, ThreadRow>(&format!(
            r#"
            SELECT {THREAD_COLUMNS}
            FROM threads
            WHERE group_iri = $1
              AND is_deleted = FALSE
            ORDER BY is_pinned DESC, last_activity_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(group_iri)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(thread_from_row).collect())
    }

    async fn lock_thread(&self, root_note_iri: &str) -> Result<()> {
        self.set_flag(root_note_iri, "is_locked", true).await
    }

    async fn unlock_thread(&self, root_note_iri: &str) -> Result<()> {
        self.set_flag(root_note_iri, "is_locked", false).await
    }

    async fn pin_thread(&self, root_note_iri: &str) -> Result<()> {
        self.set_flag(root_note_iri, "is_pinned", true).await
    }

    async fn unpin_thread(&self, root_note_iri: &str) -> Result<()> {
        self.set_flag(root_note_iri, "is_pinned", false).await
    }

    async fn soft_delete_thread(&self, root_note_iri: &str) -> Result<()> {
        self.set_flag(root_note_iri, "is_deleted", true).await
    }

    async fn reset_replies(
        &self,
        root_note_iri: &str,
        reply_count: i32,
        activity_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE threads
            SET reply_count = $2,
                last_activity_at = $3
            WHERE root_note_iri = $1
            "#,
        )
        .bind(root_note_iri)
        .bind(reply_count)
        .bind(activity_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl PgThreadStats {
    async fn set_flag(&self, root_note_iri: &str, column: &str, value: bool) -> Result<()> {
        // column is a compile-time constant from the methods above
        sqlx::query(&format!(
            "UPDATE threads SET {column} = $2 WHERE root_note_iri = $1"
        ))
        .bind(root_note_iri)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Postgres-backed note counters
#[derive(Clone)]
pub struct PgNoteStats {
    pool: PgPool,
}

impl PgNoteStats {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn increment(&self, note_id: &str, column: &str) -> Result<()> {
        sqlx::query(&format!(
            "UPDATE note_stats SET {column} = {column} + 1 WHERE note_id = $1"
        ))
        .bind(note_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl NoteStatsRepo for PgNoteStats {
    async fn ensure(&self, note_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO note_stats (note_id, replies, ups, downs)
            VALUES ($1, 0, 0, 0)
            ON CONFLICT (note_id) DO NOTHING
            "#,
        )
        .bind(note_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_replies(&self, note_id: &str) -> Result<()> {
        self.increment(note_id, "replies").await
    }

    async fn increment_ups(&self, note_id: &str) -> Result<()> {
        self.increment(note_id, "ups").await
    }

    async fn increment_downs(&self, note_id: &str) -> Result<()> {
        self.increment(note_id, "downs").await
    }

    async fn get(&self, note_id: &str) -> Result<Option<NoteStats>> {
        let row = sqlx::query_as::<_, (String, i32, i32, i32)>(
            r#"
            SELECT note_id, replies, ups, downs
            FROM note_stats
            WHERE note_id = $1
            "#,
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(note_id, replies, ups, downs)| NoteStats {
            note_id,
            replies,
            ups,
            downs,
        }))
    }

    async fn set_initial(&self, note_id: &str, replies: i32, ups: i32, downs: i32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO note_stats (note_id, replies, ups, downs)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (note_id)
            DO UPDATE SET
                replies = EXCLUDED.replies,
                ups = EXCLUDED.ups,
                downs = EXCLUDED.downs
            "#,
        )
        .bind(note_id)
        .bind(replies)
        .bind(ups)
        .bind(downs)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, note_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM note_stats WHERE note_id = $1")
            .bind(note_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running Postgres instance
}
