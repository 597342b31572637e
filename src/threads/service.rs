//! Thread and post creation workflow
//!
//! Sequences the federation submission with the counter-store updates.
//! Writes to the object store are authoritative; counter updates after a
//! successful submission are best-effort and reconcilable, so a late
//! counter failure surfaces as an error but never rolls the object back.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::federation::{FederationEngine, NewMessage, ObjectStore, Submission};
use crate::stats::{NewThread, NoteStats, NoteStatsRepo, ThreadStats, ThreadStatsRepo};
use crate::threads::resolver::ReplyResolver;
use crate::types::{AgoraError, Result};

/// Parameters for a plain post submission
#[derive(Debug, Clone, Default)]
pub struct CreatePost {
    pub content: String,
    pub context: Option<String>,
    pub in_reply_to: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
}

/// A thread's counters plus its flat note list
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadView {
    pub thread_stats: Option<ThreadStats>,
    pub notes: Vec<crate::federation::Note>,
}

/// Orchestrates submissions, lineage resolution, and counter updates
pub struct ThreadService {
    engine: Arc<FederationEngine>,
    store: Arc<dyn ObjectStore>,
    resolver: ReplyResolver,
    thread_stats: Arc<dyn ThreadStatsRepo>,
    note_stats: Arc<dyn NoteStatsRepo>,
}

impl ThreadService {
    pub fn new(
        engine: Arc<FederationEngine>,
        store: Arc<dyn ObjectStore>,
        thread_stats: Arc<dyn ThreadStatsRepo>,
        note_stats: Arc<dyn NoteStatsRepo>,
    ) -> Self {
        let resolver = ReplyResolver::new(store.clone());
        Self {
            engine,
            store,
            resolver,
            thread_stats,
            note_stats,
        }
    }

    /// Start a new thread in a group: submit the root note with the group
    /// as context and audience, then register the thread row.
    ///
    /// The root note is durable before the counter row exists, so a failure
    /// after submission leaves a registerable thread behind; retrying with
    /// the same root is idempotent at the counter store.
    pub async fn create_thread(
        &self,
        actor_id: &str,
        title: &str,
        group_iri: &str,
    ) -> Result<Submission> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AgoraError::Validation("title must not be empty".into()));
        }
        if group_iri.is_empty() {
            return Err(AgoraError::Validation(
                "groupContext must not be empty".into(),
            ));
        }

        let published = Utc::now();
        let submission = self
            .engine
            .submit_message(
                actor_id,
                NewMessage {
                    content: title.to_string(),
                    context: Some(group_iri.to_string()),
                    in_reply_to: None,
                    to: vec![group_iri.to_string()],
                    cc: vec![],
                    published: Some(published),
                },
            )
            .await?;

        self.thread_stats
            .create_thread(NewThread {
                group_iri: group_iri.to_string(),
                root_note_iri: submission.message_id.clone(),
                title: title.to_string(),
                creator_iri: actor_id.to_string(),
                published_at: Some(published),
            })
            .await?;

        info!(
            "Thread {} created in {} by {}",
            submission.message_id, group_iri, actor_id
        );

        Ok(submission)
    }

    /// Submit a post. When it is a reply, bump the parent note's reply
    /// counter and, if the parent resolves to a thread root, the thread's.
    ///
    /// The three counter updates are independent single statements; a reply
    /// whose parent has no stored lineage updates note counters only.
    pub async fn create_post(&self, actor_id: &str, post: CreatePost) -> Result<Submission> {
        if post.content.trim().is_empty() {
            return Err(AgoraError::Validation("content must not be empty".into()));
        }

        let in_reply_to = post.in_reply_to.clone();
        let published = Utc::now();

        let submission = self
            .engine
            .submit_message(
                actor_id,
                NewMessage {
                    content: post.content,
                    context: post.context,
                    in_reply_to: post.in_reply_to,
                    to: post.to,
                    cc: post.cc,
                    published: Some(published),
                },
            )
            .await?;

        if let Some(parent_id) = in_reply_to {
            self.note_stats.ensure(&parent_id).await?;
            self.note_stats.increment_replies(&parent_id).await?;

            match self.resolver.resolve_thread_root(&parent_id).await? {
                Some(root) => {
                    self.thread_stats
                        .increment_replies(&root, published)
                        .await?;
                }
                None => {
                    debug!("Reply parent {} has no thread lineage", parent_id);
                }
            }
        }

        Ok(submission)
    }

    /// Counters plus the flat note list for a thread, ascending by publish
    /// time. Both parts may be empty for an unknown root.
    pub async fn get_thread(&self, root_note_iri: &str) -> Result<ThreadView> {
        let thread_stats = self.thread_stats.get_by_root_note(root_note_iri).await?;
        let notes = self.store.find_thread_notes(root_note_iri).await?;

        Ok(ThreadView {
            thread_stats,
            notes,
        })
    }

    pub async fn get_thread_stats(&self, root_note_iri: &str) -> Result<Option<ThreadStats>> {
        self.thread_stats.get_by_root_note(root_note_iri).await
    }

    pub async fn list_threads(
        &self,
        group_iri: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ThreadStats>> {
        self.thread_stats.list_by_group(group_iri, limit, offset).await
    }

    pub async fn lock_thread(&self, root: &str) -> Result<()> {
        self.thread_stats.lock_thread(root).await
    }

    pub async fn unlock_thread(&self, root: &str) -> Result<()> {
        self.thread_stats.unlock_thread(root).await
    }

    pub async fn pin_thread(&self, root: &str) -> Result<()> {
        self.thread_stats.pin_thread(root).await
    }

    pub async fn unpin_thread(&self, root: &str) -> Result<()> {
        self.thread_stats.unpin_thread(root).await
    }

    pub async fn delete_thread(&self, root: &str) -> Result<()> {
        self.thread_stats.soft_delete_thread(root).await
    }

    pub async fn get_note_stats(&self, note_id: &str) -> Result<Option<NoteStats>> {
        self.note_stats.get(note_id).await
    }

    pub async fn upvote_note(&self, note_id: &str) -> Result<()> {
        self.note_stats.ensure(note_id).await?;
        self.note_stats.increment_ups(note_id).await
    }

    pub async fn downvote_note(&self, note_id: &str) -> Result<()> {
        self.note_stats.ensure(note_id).await?;
        self.note_stats.increment_downs(note_id).await
    }

    /// Recount a thread's replies from the object store and overwrite the
    /// counter row. Returns the recounted value.
    pub async fn reconcile_thread(&self, root_note_iri: &str) -> Result<u64> {
        let count = self.store.count_thread_replies(root_note_iri).await?;

        let notes = self.store.find_thread_notes(root_note_iri).await?;
        let last_activity = notes
            .iter()
            .filter_map(|n| n.published)
            .max()
            .unwrap_or_else(Utc::now);

        self.thread_stats
            .reset_replies(root_note_iri, count as i32, last_activity)
            .await?;

        info!("Reconciled {} to {} replies", root_note_iri, count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::{InterceptedStore, MemoryObjectStore};
    use crate::stats::{MemoryNoteStats, MemoryThreadStats};
    use crate::threads::lineage::{LineageEnricher, MissingParentPolicy};

    fn service() -> ThreadService {
        let store: Arc<dyn ObjectStore> = Arc::new(InterceptedStore::new(
            Arc::new(MemoryObjectStore::new()),
            vec![Arc::new(LineageEnricher::new(MissingParentPolicy::Skip))],
        ));
        let engine = Arc::new(FederationEngine::new(
            store.clone(),
            "https://example.org".to_string(),
        ));
        ThreadService::new(
            engine,
            store,
            Arc::new(MemoryThreadStats::new()),
            Arc::new(MemoryNoteStats::new()),
        )
    }

    #[tokio::test]
    async fn create_thread_registers_counter_row() {
        let service = service();
        let submission = service
            .create_thread(
                "https://example.org/u/alice",
                "Introductions",
                "https://example.org/g/rust",
            )
            .await
            .unwrap();

        let stats = service
            .get_thread_stats(&submission.message_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.title, "Introductions");
        assert_eq!(stats.reply_count, 0);
        assert_eq!(stats.group_iri, "https://example.org/g/rust");
    }

    #[tokio::test]
    async fn create_thread_rejects_blank_title() {
        let service = service();
        let err = service
            .create_thread(
                "https://example.org/u/alice",
                "   ",
                "https://example.org/g/rust",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgoraError::Validation(_)));
    }

    #[tokio::test]
    async fn reply_bumps_thread_and_parent_counters() {
        let service = service();
        let thread = service
            .create_thread(
                "https://example.org/u/alice",
                "Introductions",
                "https://example.org/g/rust",
            )
            .await
            .unwrap();

        service
            .create_post(
                "https://example.org/u/bob",
                CreatePost {
                    content: "hi everyone".to_string(),
                    in_reply_to: Some(thread.message_id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stats = service
            .get_thread_stats(&thread.message_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.reply_count, 1);

        let parent_stats = service
            .get_note_stats(&thread.message_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parent_stats.replies, 1);
    }

    #[tokio::test]
    async fn reply_to_unknown_parent_updates_note_counters_only() {
        let service = service();
        let ghost = "https://elsewhere.example/o/ghost";

        service
            .create_post(
                "https://example.org/u/bob",
                CreatePost {
                    content: "into the void".to_string(),
                    in_reply_to: Some(ghost.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Parent note counters exist even though no thread was touched
        let parent_stats = service.get_note_stats(ghost).await.unwrap().unwrap();
        assert_eq!(parent_stats.replies, 1);
    }

    #[tokio::test]
    async fn votes_create_row_on_demand() {
        let service = service();
        let note = "https://example.org/o/some-note";

        service.upvote_note(note).await.unwrap();
        service.upvote_note(note).await.unwrap();
        service.downvote_note(note).await.unwrap();

        let stats = service.get_note_stats(note).await.unwrap().unwrap();
        assert_eq!((stats.ups, stats.downs), (2, 1));
    }

    #[tokio::test]
    async fn reconcile_recounts_from_object_store() {
        let service = service();
        let thread = service
            .create_thread(
                "https://example.org/u/alice",
                "Introductions",
                "https://example.org/g/rust",
            )
            .await
            .unwrap();

        for i in 0..3 {
            service
                .create_post(
                    "https://example.org/u/bob",
                    CreatePost {
                        content: format!("reply {}", i),
                        in_reply_to: Some(thread.message_id.clone()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        // Simulate drift
        service
            .thread_stats
            .reset_replies(&thread.message_id, 99, Utc::now())
            .await
            .unwrap();

        let recounted = service.reconcile_thread(&thread.message_id).await.unwrap();
        assert_eq!(recounted, 3);

        let stats = service
            .get_thread_stats(&thread.message_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.reply_count, 3);
    }
}
