//! Upward traversal along parent handles.

use crate::node::NodeId;
use crate::tree::EntryTree;

/// Iterator over the directories above an entry, nearest first.
pub struct Ancestors<'a> {
    tree: &'a EntryTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.get(current).and_then(|entry| entry.parent());
        Some(current)
    }
}

impl EntryTree {
    /// Lazily walk the parent chain of `id`, parent first and root last.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get(id).and_then(|entry| entry.parent()),
        }
    }
}

/// Directories whose aggregates depend on `id`: its parent first, the root
/// last. Empty for the root or an unknown handle.
pub fn ancestors_of(tree: &EntryTree, id: NodeId) -> Vec<NodeId> {
    tree.ancestors(id).collect()
}
