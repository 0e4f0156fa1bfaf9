//! Static flattening of a step tree into its canonical numbered sequence.
//!
//! The order is a pre-order walk of the declaration: a group emits itself,
//! then its children one level deeper. It never looks at an execution
//! result, so the index of a node and the total are the same for every run.

use crate::tree::{Node, StepTree};

/// One entry of the flattened sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatNode<'a> {
    /// 1-based position in the sequence.
    pub index: usize,
    /// Nesting depth; top-level nodes are at depth 0.
    pub depth: usize,
    pub node: &'a Node,
}

/// The flattened sequence plus its precomputed total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flattened<'a> {
    entries: Vec<FlatNode<'a>>,
}

impl<'a> Flattened<'a> {
    /// Number of declared nodes; the denominator of every `[i/total]` index.
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FlatNode<'a>> {
        self.entries.iter()
    }

    /// Entry at a 1-based index.
    pub fn get(&self, index: usize) -> Option<&FlatNode<'a>> {
        index.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// 1-based index of the node with the given key.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.node.key() == key)
            .map(|e| e.index)
    }
}

impl<'s, 'a> IntoIterator for &'s Flattened<'a> {
    type Item = &'s FlatNode<'a>;
    type IntoIter = std::slice::Iter<'s, FlatNode<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

pub fn flatten(tree: &StepTree) -> Flattened<'_> {
    let mut entries = Vec::with_capacity(tree.len());
    walk(tree.nodes(), 0, &mut entries);
    Flattened { entries }
}

fn walk<'a>(nodes: &'a [Node], depth: usize, out: &mut Vec<FlatNode<'a>>) {
    for node in nodes {
        out.push(FlatNode {
            index: out.len() + 1,
            depth,
            node,
        });
        walk(node.children(), depth + 1, out);
    }
}
