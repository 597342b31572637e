//! Outbox-style submission surface of the federation engine
//!
//! Wraps a message payload as a Note + Create activity pair, mints IRIs
//! under the local domain, and stores both through the intercepted object
//! store (which attaches thread lineage as a save-time side effect).
//! Delivery to remote peers happens outside this crate.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::federation::object::{Activity, Actor, ApObject, Note};
use crate::federation::store::ObjectStore;
use crate::types::{AgoraError, Result};

/// ActivityStreams public audience collection
pub const PUBLIC_ADDRESS: &str = "https://www.w3.org/ns/activitystreams#Public";

/// Message payload accepted by [`FederationEngine::submit_message`]
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub content: String,
    pub context: Option<String>,
    pub in_reply_to: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub published: Option<chrono::DateTime<Utc>>,
}

/// Identifiers of a successfully submitted message
#[derive(Debug, Clone)]
pub struct Submission {
    pub message_id: String,
    pub activity_id: String,
}

/// Submission endpoint over the object store
pub struct FederationEngine {
    store: Arc<dyn ObjectStore>,
    base_url: String,
}

impl FederationEngine {
    /// `store` should be the intercepted store so enrichment runs on save
    pub fn new(store: Arc<dyn ObjectStore>, base_url: String) -> Self {
        Self { store, base_url }
    }

    /// IRI for a group actor name
    pub fn group_iri(&self, name: &str) -> String {
        format!("{}/g/{}", self.base_url, name)
    }

    /// IRI for a user actor name
    pub fn actor_iri(&self, name: &str) -> String {
        format!("{}/u/{}", self.base_url, name)
    }

    /// Submit a message: store the Note (triggering enrichment) and its
    /// wrapping Create activity. Counter updates are the caller's concern
    /// and are sequenced after this returns.
    pub async fn submit_message(
        &self,
        actor_id: &str,
        message: NewMessage,
    ) -> Result<Submission> {
        let message_id = format!("{}/o/{}", self.base_url, Uuid::new_v4());
        let activity_id = format!("{}/s/{}", self.base_url, Uuid::new_v4());
        let published = message.published.unwrap_or_else(Utc::now);

        let to = if message.to.is_empty() {
            vec![PUBLIC_ADDRESS.to_string()]
        } else {
            message.to
        };

        let note = Note {
            id: message_id.clone(),
            attributed_to: actor_id.to_string(),
            content: message.content,
            in_reply_to: message.in_reply_to,
            context: message.context,
            published: Some(published),
            to: to.clone(),
            cc: message.cc.clone(),
            local: None,
        };

        self.store
            .save_object(ApObject::Note(note))
            .await
            .map_err(|e| AgoraError::Upstream(e.to_string()))?;

        let activity = Activity {
            id: activity_id.clone(),
            actor: actor_id.to_string(),
            object: message_id.clone(),
            published: Some(published),
            to,
            cc: message.cc,
        };

        self.store
            .save_object(ApObject::Create(activity))
            .await
            .map_err(|e| AgoraError::Upstream(e.to_string()))?;

        debug!("Submitted {} via {}", message_id, activity_id);

        Ok(Submission {
            message_id,
            activity_id,
        })
    }

    /// Create the group actor for a name if it does not exist yet.
    /// Returns the group IRI either way.
    pub async fn ensure_group(&self, name: &str) -> Result<String> {
        let iri = self.group_iri(name);

        if self.store.get_object(&iri).await?.is_none() {
            debug!("Creating group actor: {}", name);
            let group = Actor {
                id: iri.clone(),
                name: name.to_string(),
                summary: Some(format!("Group about {}", name)),
            };
            self.store.save_object(ApObject::Group(group)).await?;
        }

        Ok(iri)
    }
}
