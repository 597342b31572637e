//! Database clients

pub mod mongo;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
