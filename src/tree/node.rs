//! Trie nodes.
//!
//! A node owns its path-compressed prefix, at most one leaf (the key that ends
//! exactly here), and child edges sorted by label. Each node caches the first
//! and last leaf of its subtree so boundary leaves are reachable in O(1).
//!
//! Nodes are shared through `Arc`; writers go through `Arc::make_mut`, so a
//! node still reachable from a published snapshot is copied before it changes.

use std::sync::Arc;

use smallvec::SmallVec;

use super::arena::LeafId;

/// Inline prefix capacity before spilling to the heap.
pub(crate) type Prefix = SmallVec<[u8; 16]>;

/// A child edge. `label` is always the first byte of `child.prefix`.
#[derive(Clone, Debug)]
pub(crate) struct Edge {
    pub label: u8,
    pub child: Arc<Node>,
}

impl Edge {
    pub fn new(child: Node) -> Self {
        Self::from_arc(Arc::new(child))
    }

    pub fn from_arc(child: Arc<Node>) -> Self {
        debug_assert!(!child.prefix.is_empty(), "child node without a label byte");
        Self {
            label: child.prefix[0],
            child,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Node {
    pub prefix: Prefix,
    pub leaf: Option<LeafId>,
    pub edges: SmallVec<[Edge; 4]>,
    /// Smallest leaf in this subtree, NULL when empty.
    pub min: LeafId,
    /// Largest leaf in this subtree, NULL when empty.
    pub max: LeafId,
}

impl Node {
    pub fn root() -> Self {
        Self {
            min: LeafId::NULL,
            max: LeafId::NULL,
            ..Self::default()
        }
    }

    /// A node holding only `leaf`, reached through `prefix`.
    pub fn with_leaf(prefix: &[u8], leaf: LeafId) -> Self {
        Self {
            prefix: Prefix::from_slice(prefix),
            leaf: Some(leaf),
            edges: SmallVec::new(),
            min: leaf,
            max: leaf,
        }
    }

    /// An internal node with no leaf and no edges yet.
    pub fn branch(prefix: &[u8]) -> Self {
        Self {
            prefix: Prefix::from_slice(prefix),
            leaf: None,
            edges: SmallVec::new(),
            min: LeafId::NULL,
            max: LeafId::NULL,
        }
    }

    /// `Ok(index)` of the edge labelled `label`, or `Err(insertion point)`.
    #[inline]
    pub fn find_edge(&self, label: u8) -> Result<usize, usize> {
        self.edges.binary_search_by(|e| e.label.cmp(&label))
    }

    pub fn add_edge(&mut self, edge: Edge) {
        match self.find_edge(edge.label) {
            Ok(_) => panic!("duplicate edge label {:#04x}", edge.label),
            Err(at) => self.edges.insert(at, edge),
        }
    }

    /// Recompute the boundary caches from the leaf and the edge set.
    ///
    /// The node's own leaf sorts before every descendant because its key is a
    /// proper prefix of theirs.
    pub fn refresh_bounds(&mut self) {
        self.min = match (self.leaf, self.edges.first()) {
            (Some(leaf), _) => leaf,
            (None, Some(edge)) => edge.child.min,
            (None, None) => LeafId::NULL,
        };
        self.max = match (self.edges.last(), self.leaf) {
            (Some(edge), _) => edge.child.max,
            (None, Some(leaf)) => leaf,
            (None, None) => LeafId::NULL,
        };
    }

    /// Restore path compression for the child behind edge `at` after a
    /// removal below it: an empty child is dropped, a leafless child with a
    /// single edge is merged with its own child.
    pub fn compact_edge(&mut self, at: usize) {
        let child = &self.edges[at].child;
        if child.leaf.is_some() {
            return;
        }
        match child.edges.len() {
            0 => {
                self.edges.remove(at);
            }
            1 => {
                let child = Arc::make_mut(&mut self.edges[at].child);
                let grandchild = child.edges.remove(0).child;
                let mut merged = Arc::try_unwrap(grandchild).unwrap_or_else(|shared| (*shared).clone());
                merged.prefix.insert_from_slice(0, &child.prefix);
                self.edges[at] = Edge::new(merged);
            }
            _ => {}
        }
    }
}

/// Length of the longest common prefix of `a` and `b`.
#[inline]
pub(crate) fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_prefix_len() {
        assert_eq!(common_prefix_len(b"apple", b"apply"), 4);
        assert_eq!(common_prefix_len(b"app", b"apple"), 3);
        assert_eq!(common_prefix_len(b"", b"x"), 0);
        assert_eq!(common_prefix_len(b"abc", b"xyz"), 0);
    }

    #[test]
    fn test_edges_stay_sorted() {
        let mut node = Node::root();
        for (i, prefix) in [&b"m"[..], &b"c"[..], &b"x"[..], &b"a"[..]].iter().enumerate() {
            let leaf = node_leaf(i);
            node.add_edge(Edge::new(Node::with_leaf(prefix, leaf)));
        }
        let labels: Vec<u8> = node.edges.iter().map(|e| e.label).collect();
        assert_eq!(labels, b"acmx".to_vec());
        assert_eq!(node.find_edge(b'm'), Ok(2));
        assert_eq!(node.find_edge(b'd'), Err(2));
    }

    #[test]
    fn test_refresh_bounds() {
        let mut node = Node::branch(b"k");
        node.refresh_bounds();
        assert!(node.min.is_null() && node.max.is_null());

        node.add_edge(Edge::new(Node::with_leaf(b"a", node_leaf(1))));
        node.add_edge(Edge::new(Node::with_leaf(b"b", node_leaf(2))));
        node.refresh_bounds();
        assert_eq!((node.min, node.max), (node_leaf(1), node_leaf(2)));

        node.leaf = Some(node_leaf(0));
        node.refresh_bounds();
        assert_eq!((node.min, node.max), (node_leaf(0), node_leaf(2)));
    }

    #[test]
    fn test_compact_edge_merges_single_child() {
        let mut inner = Node::branch(b"ab");
        inner.add_edge(Edge::new(Node::with_leaf(b"cd", node_leaf(7))));
        inner.refresh_bounds();

        let mut root = Node::root();
        root.add_edge(Edge::new(inner));
        root.compact_edge(0);

        let child = &root.edges[0].child;
        assert_eq!(child.prefix.as_slice(), b"abcd");
        assert_eq!(child.leaf, Some(node_leaf(7)));
        assert_eq!(root.edges[0].label, b'a');
    }

    fn node_leaf(i: usize) -> LeafId {
        let mut arena = super::super::arena::LeafArena::new();
        let mut id = LeafId::NULL;
        for _ in 0..=i {
            id = arena.alloc(b"", ());
        }
        id
    }
}
