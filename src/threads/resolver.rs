//! Thread root resolution
//!
//! Reads the lineage block attached at save time instead of walking the
//! parent chain: one point lookup per call. The trade-off is staleness --
//! a note whose enrichment never ran resolves to nothing.

use std::sync::Arc;

use crate::federation::store::ObjectStore;
use crate::types::Result;

/// Resolves a message id to its thread root via stored lineage
#[derive(Clone)]
pub struct ReplyResolver {
    store: Arc<dyn ObjectStore>,
}

impl ReplyResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Thread root IRI for a message, or `None` if the message is unknown,
    /// is not a note, or carries no lineage block.
    pub async fn resolve_thread_root(&self, message_id: &str) -> Result<Option<String>> {
        let Some(object) = self.store.get_object(message_id).await? else {
            return Ok(None);
        };

        Ok(object
            .as_note()
            .and_then(|note| note.local.as_ref())
            .map(|lineage| lineage.thread_root.clone()))
    }
}
