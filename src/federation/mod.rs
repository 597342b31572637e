//! Federation object model, persistence, and submission engine
//!
//! The wire protocol itself (delivery, signatures, collection paging) is an
//! external concern. This module covers what the thread engine needs from it:
//! a closed object model, a persistence layer with a save-time extension
//! point, and an outbox-style submission surface.

pub mod engine;
pub mod object;
pub mod store;

pub use engine::{FederationEngine, NewMessage, Submission};
pub use object::{Activity, Actor, ApObject, Lineage, Note};
pub use store::{
    InterceptedStore, MemoryObjectStore, MongoObjectStore, ObjectStore, SaveInterceptor,
    OBJECT_COLLECTION,
};
