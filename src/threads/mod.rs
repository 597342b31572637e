//! Thread/reply consistency engine
//!
//! Derives thread membership for every note at write time, keeps the
//! aggregate counters in step as replies arrive, and reconstructs reply
//! trees for display.

pub mod lineage;
pub mod resolver;
pub mod service;
pub mod tree;

pub use lineage::{LineageEnricher, MissingParentPolicy};
pub use resolver::ReplyResolver;
pub use service::{CreatePost, ThreadService, ThreadView};
pub use tree::{build_tree, TreeNode};
