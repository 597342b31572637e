//! Object store: persistence for notes, activities, and actors
//!
//! The save path carries an explicit interceptor extension point: every
//! object written through an [`InterceptedStore`] passes each registered
//! [`SaveInterceptor`] before it becomes durable. Interceptor failures are
//! logged and never abort the underlying write.

use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::options::IndexOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::db::{IntoIndexes, MongoClient, MongoCollection};
use crate::federation::object::{ApObject, Note};
use crate::types::Result;

/// Collection name for stored objects
pub const OBJECT_COLLECTION: &str = "objects";

/// Persistence port for federation objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Point lookup by IRI
    async fn get_object(&self, id: &str) -> Result<Option<ApObject>>;

    /// Durably store an object, replacing any previous version with the
    /// same IRI. Returns the stored object.
    async fn save_object(&self, object: ApObject) -> Result<ApObject>;

    /// All notes whose lineage points at the given thread root, sorted by
    /// publish time ascending. Notes without a lineage block never match.
    async fn find_thread_notes(&self, thread_root: &str) -> Result<Vec<Note>>;

    /// Number of notes in the thread excluding the root itself
    async fn count_thread_replies(&self, thread_root: &str) -> Result<u64>;
}

/// Hook invoked on every object write before it becomes durable.
///
/// Receives the inner store so it can read other objects (e.g. a reply's
/// parent) without re-entering the interceptor chain.
#[async_trait]
pub trait SaveInterceptor: Send + Sync {
    async fn before_save(&self, object: &mut ApObject, store: &dyn ObjectStore) -> Result<()>;
}

// ============================================================================
// MongoDB implementation
// ============================================================================

impl IntoIndexes for ApObject {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on object IRI
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("object_id_unique".to_string())
                        .build(),
                ),
            ),
            // Thread membership queries: threadRoot filter + published sort
            (
                doc! { "_local.threadRoot": 1, "published": 1 },
                Some(
                    IndexOptions::builder()
                        .name("thread_root_published".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

/// MongoDB-backed object store
#[derive(Clone)]
pub struct MongoObjectStore {
    collection: MongoCollection<ApObject>,
}

impl MongoObjectStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection::<ApObject>(OBJECT_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl ObjectStore for MongoObjectStore {
    async fn get_object(&self, id: &str) -> Result<Option<ApObject>> {
        self.collection.find_one(doc! { "id": id }).await
    }

    async fn save_object(&self, object: ApObject) -> Result<ApObject> {
        let id = object.id().to_string();
        self.collection.upsert_one(doc! { "id": &id }, &object).await?;
        Ok(object)
    }

    async fn find_thread_notes(&self, thread_root: &str) -> Result<Vec<Note>> {
        // Published timestamps serialize as RFC 3339 strings, so a
        // lexicographic sort is chronological.
        let objects = self
            .collection
            .find_many(
                doc! { "type": "Note", "_local.threadRoot": thread_root },
                Some(doc! { "published": 1 }),
            )
            .await?;

        Ok(objects
            .into_iter()
            .filter_map(|obj| match obj {
                ApObject::Note(note) => Some(note),
                _ => None,
            })
            .collect())
    }

    async fn count_thread_replies(&self, thread_root: &str) -> Result<u64> {
        self.collection
            .count(doc! {
                "type": "Note",
                "_local.threadRoot": thread_root,
                "id": { "$ne": thread_root },
            })
            .await
    }
}

// ============================================================================
// In-memory implementation (dev mode, tests)
// ============================================================================

/// In-memory object store used when MongoDB is unavailable in dev mode
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, ApObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, id: &str) -> Result<Option<ApObject>> {
        Ok(self.objects.read().await.get(id).cloned())
    }

    async fn save_object(&self, object: ApObject) -> Result<ApObject> {
        self.objects
            .write()
            .await
            .insert(object.id().to_string(), object.clone());
        Ok(object)
    }

    async fn find_thread_notes(&self, thread_root: &str) -> Result<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .objects
            .read()
            .await
            .values()
            .filter_map(|obj| obj.as_note())
            .filter(|note| {
                note.local
                    .as_ref()
                    .is_some_and(|lineage| lineage.thread_root == thread_root)
            })
            .cloned()
            .collect();

        notes.sort_by_key(|note| note.published);
        Ok(notes)
    }

    async fn count_thread_replies(&self, thread_root: &str) -> Result<u64> {
        let notes = self.find_thread_notes(thread_root).await?;
        Ok(notes.iter().filter(|n| n.id != thread_root).count() as u64)
    }
}

// ============================================================================
// Interceptor wrapper
// ============================================================================

/// Object store wrapper that runs save interceptors before delegating.
///
/// Interceptors see the inner store, so lookups they perform do not
/// re-trigger the chain.
pub struct InterceptedStore {
    inner: Arc<dyn ObjectStore>,
    interceptors: Vec<Arc<dyn SaveInterceptor>>,
}

impl InterceptedStore {
    pub fn new(inner: Arc<dyn ObjectStore>, interceptors: Vec<Arc<dyn SaveInterceptor>>) -> Self {
        Self { inner, interceptors }
    }
}

#[async_trait]
impl ObjectStore for InterceptedStore {
    async fn get_object(&self, id: &str) -> Result<Option<ApObject>> {
        self.inner.get_object(id).await
    }

    async fn save_object(&self, mut object: ApObject) -> Result<ApObject> {
        for interceptor in &self.interceptors {
            // A failed interceptor must not fail the triggering write.
            if let Err(e) = interceptor
                .before_save(&mut object, self.inner.as_ref())
                .await
            {
                warn!("Save interceptor failed for {}: {}", object.id(), e);
            }
        }

        self.inner.save_object(object).await
    }

    async fn find_thread_notes(&self, thread_root: &str) -> Result<Vec<Note>> {
        self.inner.find_thread_notes(thread_root).await
    }

    async fn count_thread_replies(&self, thread_root: &str) -> Result<u64> {
        self.inner.count_thread_replies(thread_root).await
    }
}
