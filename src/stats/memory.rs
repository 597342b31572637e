//! In-memory counter repos used when Postgres is unavailable in dev mode

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::stats::{NewThread, NoteStats, NoteStatsRepo, ThreadStats, ThreadStatsRepo};
use crate::types::Result;

/// In-memory thread counters
#[derive(Default)]
pub struct MemoryThreadStats {
    rows: RwLock<HashMap<String, ThreadStats>>,
}

impl MemoryThreadStats {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, root_note_iri: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut ThreadStats),
    {
        if let Some(row) = self.rows.write().await.get_mut(root_note_iri) {
            f(row);
        }
        Ok(())
    }
}

#[async_trait]
impl ThreadStatsRepo for MemoryThreadStats {
    async fn create_thread(&self, thread: NewThread) -> Result<()> {
        let mut rows = self.rows.write().await;

        // Idempotent create: first writer wins
        if rows.contains_key(&thread.root_note_iri) {
            return Ok(());
        }

        let at = thread.published_at.unwrap_or_else(Utc::now);
        rows.insert(
            thread.root_note_iri.clone(),
            ThreadStats {
                group_iri: thread.group_iri,
                root_note_iri: thread.root_note_iri,
                title: thread.title,
                creator_iri: thread.creator_iri,
                reply_count: 0,
                last_activity_at: at,
                is_locked: false,
                is_pinned: false,
                is_deleted: false,
                created_at: at,
            },
        );

        Ok(())
    }

    async fn increment_replies(
        &self,
        root_note_iri: &str,
        activity_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(root_note_iri, |row| {
            row.reply_count += 1;
            row.last_activity_at = activity_at;
        })
        .await
    }

    async fn get_by_root_note(&self, root_note_iri: &str) -> Result<Option<ThreadStats>> {
        Ok(self.rows.read().await.get(root_note_iri).cloned())
    }

    async fn list_by_group(
        &self,
        group_iri: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ThreadStats>> {
        let mut threads: Vec<ThreadStats> = self
            .rows
            .read()
            .await
            .values()
            .filter(|t| t.group_iri == group_iri && !t.is_deleted)
            .cloned()
            .collect();

        threads.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then(b.last_activity_at.cmp(&a.last_activity_at))
        });

        Ok(threads
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn lock_thread(&self, root: &str) -> Result<()> {
        self.update(root, |row| row.is_locked = true).await
    }

    async fn unlock_thread(&self, root: &str) -> Result<()> {
        self.update(root, |row| row.is_locked = false).await
    }

    async fn pin_thread(&self, root: &str) -> Result<()> {
        self.update(root, |row| row.is_pinned = true).await
    }

    async fn unpin_thread(&self, root: &str) -> Result<()> {
        self.update(root, |row| row.is_pinned = false).await
    }

    async fn soft_delete_thread(&self, root: &str) -> Result<()> {
        self.update(root, |row| row.is_deleted = true).await
    }

    async fn reset_replies(
        &self,
        root_note_iri: &str,
        reply_count: i32,
        activity_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(root_note_iri, |row| {
            row.reply_count = reply_count;
            row.last_activity_at = activity_at;
        })
        .await
    }
}

/// In-memory note counters
#[derive(Default)]
pub struct MemoryNoteStats {
    rows: RwLock<HashMap<String, NoteStats>>,
}

impl MemoryNoteStats {
    pub fn new() -> Self {
        Self::default()
    }

    async fn increment<F>(&self, note_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut NoteStats),
    {
        if let Some(row) = self.rows.write().await.get_mut(note_id) {
            f(row);
        }
        Ok(())
    }
}

#[async_trait]
impl NoteStatsRepo for MemoryNoteStats {
    async fn ensure(&self, note_id: &str) -> Result<()> {
        self.rows
            .write()
            .await
            .entry(note_id.to_string())
            .or_insert_with(|| NoteStats {
                note_id: note_id.to_string(),
                replies: 0,
                ups: 0,
                downs: 0,
            });
        Ok(())
    }

    async fn increment_replies(&self, note_id: &str) -> Result<()> {
        self.increment(note_id, |row| row.replies += 1).await
    }

    async fn increment_ups(&self, note_id: &str) -> Result<()> {
        self.increment(note_id, |row| row.ups += 1).await
    }

    async fn increment_downs(&self, note_id: &str) -> Result<()> {
        self.increment(note_id, |row| row.downs += 1).await
    }

    async fn get(&self, note_id: &str) -> Result<Option<NoteStats>> {
        Ok(self.rows.read().await.get(note_id).cloned())
    }

    async fn set_initial(&self, note_id: &str, replies: i32, ups: i32, downs: i32) -> Result<()> {
        self.rows.write().await.insert(
            note_id.to_string(),
            NoteStats {
                note_id: note_id.to_string(),
                replies,
                ups,
                downs,
            },
        );
        Ok(())
    }

    async fn delete(&self, note_id: &str) -> Result<()> {
        self.rows.write().await.remove(note_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_thread_is_idempotent() {
        let repo = MemoryThreadStats::new();
        let thread = NewThread {
            group_iri: "https://example.org/g/rust".to_string(),
            root_note_iri: "https://example.org/o/root".to_string(),
            title: "Intro".to_string(),
            creator_iri: "https://example.org/u/alice".to_string(),
            published_at: None,
        };

        repo.create_thread(thread.clone()).await.unwrap();
        repo.increment_replies("https://example.org/o/root", Utc::now())
            .await
            .unwrap();

        // Second create must not reset the counter
        repo.create_thread(thread).await.unwrap();

        let row = repo
            .get_by_root_note("https://example.org/o/root")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.reply_count, 1);
    }

    #[tokio::test]
    async fn increment_on_missing_row_is_a_noop() {
        let repo = MemoryThreadStats::new();
        repo.increment_replies("missing", Utc::now()).await.unwrap();
        assert!(repo.get_by_root_note("missing").await.unwrap().is_none());

        let notes = MemoryNoteStats::new();
        notes.increment_replies("missing").await.unwrap();
        assert!(notes.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn group_listing_is_pinned_first_then_recent() {
        let repo = MemoryThreadStats::new();
        let group = "https://example.org/g/rust";

        for (root, minute) in [("a", 1), ("b", 2), ("c", 3)] {
            repo.create_thread(NewThread {
                group_iri: group.to_string(),
                root_note_iri: root.to_string(),
                title: root.to_string(),
                creator_iri: "https://example.org/u/alice".to_string(),
                published_at: Some(
                    chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 1, 1, 12, minute, 0).unwrap(),
                ),
            })
            .await
            .unwrap();
        }

        repo.pin_thread("a").await.unwrap();
        repo.soft_delete_thread("b").await.unwrap();

        let listing = repo.list_by_group(group, 50, 0).await.unwrap();
        let roots: Vec<&str> = listing.iter().map(|t| t.root_note_iri.as_str()).collect();
        assert_eq!(roots, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn note_stats_ensure_and_votes() {
        let repo = MemoryNoteStats::new();
        repo.ensure("n1").await.unwrap();
        repo.ensure("n1").await.unwrap();
        repo.increment_ups("n1").await.unwrap();
        repo.increment_downs("n1").await.unwrap();
        repo.increment_ups("n1").await.unwrap();

        let row = repo.get("n1").await.unwrap().unwrap();
        assert_eq!((row.replies, row.ups, row.downs), (0, 2, 1));

        repo.set_initial("n1", 5, 10, 2).await.unwrap();
        let row = repo.get("n1").await.unwrap().unwrap();
        assert_eq!((row.replies, row.ups, row.downs), (5, 10, 2));

        repo.delete("n1").await.unwrap();
        assert!(repo.get("n1").await.unwrap().is_none());
    }
}
