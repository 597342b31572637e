//! Reply tree assembly
//!
//! Pure transformation of a flat, unordered note list into an ordered
//! forest for presentation. Runs wherever the flat thread fetch lands;
//! the server itself only returns flat lists.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::federation::object::Note;

/// A note plus its ordered replies
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub note: Note,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Total number of nodes in this subtree, including self
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::count).sum::<usize>()
    }
}

/// Build an ordered reply forest from a flat note list.
///
/// A note whose declared parent is absent from the input becomes a root of
/// the output forest; that is policy, not an error. Every input note appears
/// exactly once. Timestamped siblings are sorted ascending by publish time
/// among themselves; siblings without a timestamp keep their input slots.
pub fn build_tree(notes: Vec<Note>) -> Vec<TreeNode> {
    let ids: HashSet<String> = notes.iter().map(|n| n.id.clone()).collect();

    // Group children under parents present in the input; everything else
    // is a root. Input order is preserved within each bucket.
    let mut children_of: HashMap<String, Vec<Note>> = HashMap::new();
    let mut roots: Vec<Note> = Vec::new();

    for note in notes {
        match note.in_reply_to.as_ref().filter(|p| ids.contains(*p)) {
            Some(parent) => children_of.entry(parent.clone()).or_default().push(note),
            None => roots.push(note),
        }
    }

    let mut forest = attach_children(roots, &mut children_of);

    // Any buckets left over reference parents that were themselves never
    // reachable (cycles in corrupt input). Surface them as roots rather
    // than dropping notes.
    let mut leftover_keys: Vec<String> = children_of.keys().cloned().collect();
    leftover_keys.sort();
    for key in leftover_keys {
        if let Some(orphans) = children_of.remove(&key) {
            forest.extend(attach_children(orphans, &mut children_of));
        }
    }

    forest
}

fn attach_children(
    level: Vec<Note>,
    children_of: &mut HashMap<String, Vec<Note>>,
) -> Vec<TreeNode> {
    let nodes: Vec<TreeNode> = level
        .into_iter()
        .map(|note| {
            let children = children_of.remove(&note.id).unwrap_or_default();
            TreeNode {
                children: attach_children(children, children_of),
                note,
            }
        })
        .collect();

    sort_siblings(nodes)
}

/// Sort timestamped siblings ascending among themselves, leaving
/// untimestamped siblings in their input slots. Comparing only `Some`
/// timestamps keeps the order total; a mixed comparator that treats
/// `(Some, None)` as equal is not transitive and `sort_by` would be free
/// to scramble or panic on it.
fn sort_siblings(nodes: Vec<TreeNode>) -> Vec<TreeNode> {
    let slots: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.note.published.is_some())
        .map(|(i, _)| i)
        .collect();

    if slots.len() < 2 {
        return nodes;
    }

    let mut out: Vec<Option<TreeNode>> = nodes.into_iter().map(Some).collect();

    let mut timed: Vec<TreeNode> = Vec::with_capacity(slots.len());
    for &i in &slots {
        if let Some(node) = out[i].take() {
            timed.push(node);
        }
    }

    // Stable: equal timestamps keep input order
    timed.sort_by_key(|node| node.note.published);

    for (&i, node) in slots.iter().zip(timed) {
        out[i] = Some(node);
    }

    out.into_iter().flatten().collect()
}
