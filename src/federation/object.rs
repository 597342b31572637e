//! Closed object model for stored federation objects
//!
//! Everything that flows through the object store is one of these tagged
//! variants with required fields checked at deserialization, rather than a
//! loosely-typed document. Unknown incoming types fail at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local-only thread membership metadata attached to a note at save time.
///
/// Stored under the `_local` key on the persisted object and never sent to
/// remote peers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Lineage {
    /// IRI of the message that roots this conversation
    pub thread_root: String,
    /// Parent hops from this message to the thread root
    pub depth: u32,
}

/// A single federated post/comment ("Note")
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Globally unique IRI
    pub id: String,

    /// Author actor IRI
    pub attributed_to: String,

    /// Message body
    pub content: String,

    /// Parent message IRI. Remote payloads sometimes carry this as a
    /// one-element array; normalized to the first element on read.
    #[serde(
        default,
        with = "iri_or_first",
        skip_serializing_if = "Option::is_none"
    )]
    pub in_reply_to: Option<String>,

    /// Group/conversation context IRI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Publish timestamp (absent on some remote objects)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,

    /// Primary audience
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,

    /// Secondary audience
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,

    /// Local lineage block, written exactly once by the enrichment hook
    #[serde(
        default,
        rename = "_local",
        skip_serializing_if = "Option::is_none"
    )]
    pub local: Option<Lineage>,
}

/// A Create activity wrapping a note submission
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Globally unique IRI
    pub id: String,

    /// Acting actor IRI
    pub actor: String,

    /// IRI of the object this activity carries
    pub object: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
}

/// A group actor owning threads
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// Globally unique IRI
    pub id: String,

    /// Display name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Tagged union of everything the object store persists
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type")]
pub enum ApObject {
    Note(Note),
    Create(Activity),
    Group(Actor),
}

impl ApObject {
    /// IRI of the wrapped object
    pub fn id(&self) -> &str {
        match self {
            ApObject::Note(n) => &n.id,
            ApObject::Create(a) => &a.id,
            ApObject::Group(g) => &g.id,
        }
    }

    pub fn as_note(&self) -> Option<&Note> {
        match self {
            ApObject::Note(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_note_mut(&mut self) -> Option<&mut Note> {
        match self {
            ApObject::Note(n) => Some(n),
            _ => None,
        }
    }
}

/// Accepts an IRI as either a plain string or an array, taking the first
/// element. Serializes back as a plain string.
mod iri_or_first {
    use serde::de::Deserializer;
    use serde::ser::Serializer;
    use serde::Deserialize;
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Array(items) => items
                .into_iter()
                .find_map(|item| item.as_str().map(str::to_owned)),
            _ => None,
        }))
    }

    pub fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(s) => serializer.serialize_str(s),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_round_trips_with_lineage() {
        let json = serde_json::json!({
            "type": "Note",
            "id": "https://example.org/o/1",
            "attributedTo": "https://example.org/u/alice",
            "content": "hello",
            "inReplyTo": "https://example.org/o/0",
            "published": "2026-01-01T00:00:00Z",
            "_local": { "threadRoot": "https://example.org/o/0", "depth": 1 }
        });

        let obj: ApObject = serde_json::from_value(json).unwrap();
        let note = obj.as_note().unwrap();
        assert_eq!(note.in_reply_to.as_deref(), Some("https://example.org/o/0"));
        assert_eq!(note.local.as_ref().unwrap().depth, 1);

        let back = serde_json::to_value(&obj).unwrap();
        assert_eq!(back["type"], "Note");
        assert_eq!(back["_local"]["threadRoot"], "https://example.org/o/0");
    }

    #[test]
    fn in_reply_to_array_takes_first_element() {
        let json = serde_json::json!({
            "type": "Note",
            "id": "https://example.org/o/2",
            "attributedTo": "https://example.org/u/bob",
            "content": "hi",
            "inReplyTo": ["https://example.org/o/1", "https://example.org/o/0"]
        });

        let obj: ApObject = serde_json::from_value(json).unwrap();
        assert_eq!(
            obj.as_note().unwrap().in_reply_to.as_deref(),
            Some("https://example.org/o/1")
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = serde_json::json!({
            "type": "Tombstone",
            "id": "https://example.org/o/3"
        });

        assert!(serde_json::from_value::<ApObject>(json).is_err());
    }
}
