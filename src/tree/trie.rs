//! Structural trie algorithms.
//!
//! A [`Trie`] owns only nodes; leaves live in a [`LeafArena`] supplied by the
//! caller. Every mutation keeps two things in step: the node structure with
//! its boundary caches, and the leaf chain.
//!
//! Insertion splices the new leaf next to its nearest neighbour in this trie.
//! When the trie shares its arena with others (score buckets), the neighbour's
//! outer link may point into another trie; splicing through it keeps the
//! combined chain intact without knowing about the other trie.

use std::sync::Arc;

use super::arena::{LeafArena, LeafId};
use super::node::{common_prefix_len, Edge, Node};

#[derive(Clone, Debug)]
pub(crate) struct Trie {
    pub root: Arc<Node>,
    pub len: usize,
}

impl Trie {
    pub fn new() -> Self {
        Self {
            root: Arc::new(Node::root()),
            len: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn first(&self) -> Option<LeafId> {
        self.root.min.get()
    }

    #[inline]
    pub fn last(&self) -> Option<LeafId> {
        self.root.max.get()
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn find(&self, key: &[u8]) -> Option<LeafId> {
        let mut node = &*self.root;
        let mut rest = key;
        loop {
            if rest.is_empty() {
                return node.leaf;
            }
            let at = node.find_edge(rest[0]).ok()?;
            let child = &node.edges[at].child;
            if !rest.starts_with(&child.prefix) {
                return None;
            }
            rest = &rest[child.prefix.len()..];
            node = child;
        }
    }

    /// Greatest leaf with a key strictly below `key` and least leaf strictly
    /// above it, ignoring `key` itself.
    ///
    /// Candidates found deeper in the descent are closer to `key` than those
    /// found above, so they overwrite.
    pub fn neighbors(&self, key: &[u8]) -> (Option<LeafId>, Option<LeafId>) {
        let mut pred = None;
        let mut succ = None;
        let mut node = &*self.root;
        let mut rest = key;

        loop {
            if rest.is_empty() {
                if let Some(edge) = node.edges.first() {
                    succ = Some(edge.child.min);
                }
                return (pred, succ);
            }

            if let Some(leaf) = node.leaf {
                pred = Some(leaf);
            }

            let (at, found) = match node.find_edge(rest[0]) {
                Ok(at) => (at, true),
                Err(at) => (at, false),
            };
            if at > 0 {
                pred = Some(node.edges[at - 1].child.max);
            }
            let after = if found { at + 1 } else { at };
            if let Some(edge) = node.edges.get(after) {
                succ = Some(edge.child.min);
            }
            if !found {
                return (pred, succ);
            }

            let child = &node.edges[at].child;
            let common = common_prefix_len(&child.prefix, rest);
            if common == child.prefix.len() {
                rest = &rest[common..];
                node = child;
                continue;
            }

            if common == rest.len() || rest[common] < child.prefix[common] {
                succ = Some(child.min);
            } else {
                pred = Some(child.max);
            }
            return (pred, succ);
        }
    }

    /// First leaf with a key `>= key`.
    pub fn lower_bound(&self, key: &[u8]) -> Option<LeafId> {
        self.find(key).or_else(|| self.neighbors(key).1)
    }

    /// Last leaf with a key `<= key`.
    pub fn upper_bound(&self, key: &[u8]) -> Option<LeafId> {
        self.find(key).or_else(|| self.neighbors(key).0)
    }

    /// The node whose subtree holds exactly the keys starting with `prefix`.
    pub fn locate_prefix(&self, prefix: &[u8]) -> Option<&Node> {
        let mut node = &*self.root;
        let mut rest = prefix;
        loop {
            if rest.is_empty() {
                return Some(node);
            }
            let at = node.find_edge(rest[0]).ok()?;
            let child = &node.edges[at].child;
            if child.prefix.starts_with(rest) {
                return Some(child);
            }
            if !rest.starts_with(&child.prefix) {
                return None;
            }
            rest = &rest[child.prefix.len()..];
            node = child;
        }
    }

    /// Deepest leaf whose key is a byte-prefix of `key`.
    pub fn longest_prefix(&self, key: &[u8]) -> Option<LeafId> {
        let mut best = None;
        let mut node = &*self.root;
        let mut rest = key;
        loop {
            if node.leaf.is_some() {
                best = node.leaf;
            }
            if rest.is_empty() {
                return best;
            }
            let Ok(at) = node.find_edge(rest[0]) else {
                return best;
            };
            let child = &node.edges[at].child;
            if !rest.starts_with(&child.prefix) {
                return best;
            }
            rest = &rest[child.prefix.len()..];
            node = child;
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert or replace. Returns the previous value on replace.
    pub fn insert<V: Clone>(&mut self, leaves: &mut LeafArena<V>, key: &[u8], value: V) -> Option<V> {
        if let Some(id) = self.find(key) {
            return Some(std::mem::replace(&mut leaves.get_mut(id).value, value));
        }

        let (pred, succ) = self.neighbors(key);
        let id = leaves.alloc(key, value);
        Self::insert_at(&mut self.root, key, id);

        match (pred, succ) {
            (Some(pred), _) => leaves.link_after(pred, id),
            (None, Some(succ)) => leaves.link_before(succ, id),
            // Sole leaf of this trie: outer links are the owner's business.
            (None, None) => {}
        }
        self.len += 1;
        None
    }

    /// `rest` excludes the prefix of `node`, which the caller has matched.
    fn insert_at(node: &mut Arc<Node>, rest: &[u8], id: LeafId) {
        let n = Arc::make_mut(node);

        if rest.is_empty() {
            debug_assert!(n.leaf.is_none(), "insert_at reached an occupied leaf");
            n.leaf = Some(id);
            n.refresh_bounds();
            return;
        }

        match n.find_edge(rest[0]) {
            Err(at) => n.edges.insert(at, Edge::new(Node::with_leaf(rest, id))),
            Ok(at) => {
                let child_prefix_len = n.edges[at].child.prefix.len();
                let common = common_prefix_len(&n.edges[at].child.prefix, rest);
                if common == child_prefix_len {
                    Self::insert_at(&mut n.edges[at].child, &rest[common..], id);
                } else {
                    // Split the edge at the divergence point.
                    let mut tail = std::mem::take(&mut n.edges[at].child);
                    {
                        let tail = Arc::make_mut(&mut tail);
                        tail.prefix.drain(..common);
                    }
                    let mut mid = Node::branch(&rest[..common]);
                    mid.add_edge(Edge::from_arc(tail));
                    if common == rest.len() {
                        mid.leaf = Some(id);
                    } else {
                        mid.add_edge(Edge::new(Node::with_leaf(&rest[common..], id)));
                    }
                    mid.refresh_bounds();
                    n.edges[at] = Edge::new(mid);
                }
            }
        }
        n.refresh_bounds();
    }

    /// Remove `key`, unlinking and freeing its leaf.
    pub fn remove<V: Clone>(&mut self, leaves: &mut LeafArena<V>, key: &[u8]) -> Option<V> {
        let id = self.find(key)?;
        let removed = Self::remove_at(&mut self.root, key);
        debug_assert!(removed, "found key vanished during removal");

        leaves.unlink(id);
        self.len -= 1;
        Some(leaves.release(id).value)
    }

    fn remove_at(node: &mut Arc<Node>, rest: &[u8]) -> bool {
        let n = Arc::make_mut(node);

        if rest.is_empty() {
            let removed = n.leaf.take().is_some();
            n.refresh_bounds();
            return removed;
        }

        let Ok(at) = n.find_edge(rest[0]) else {
            return false;
        };
        let child_prefix_len = n.edges[at].child.prefix.len();
        if !rest.starts_with(&n.edges[at].child.prefix) {
            return false;
        }
        let removed = Self::remove_at(&mut n.edges[at].child, &rest[child_prefix_len..]);
        if removed {
            n.compact_edge(at);
            n.refresh_bounds();
        }
        removed
    }

    /// Remove every key starting with `prefix`. Returns the count removed.
    ///
    /// The covered subtree's leaves form one contiguous run of the chain, so
    /// it is released in a single pass from its cached min to its cached max.
    pub fn remove_prefix<V: Clone>(&mut self, leaves: &mut LeafArena<V>, prefix: &[u8]) -> usize {
        let Some(target) = self.locate_prefix(prefix) else {
            return 0;
        };
        if target.min.is_null() {
            return 0;
        }
        let (first, last) = (target.min, target.max);

        Self::detach(&mut self.root, prefix);
        let released = leaves.release_run(first, last);
        self.len -= released;
        released
    }

    fn detach(node: &mut Arc<Node>, rest: &[u8]) {
        let n = Arc::make_mut(node);

        if rest.is_empty() {
            // Only the root is ever covered with nothing left to match.
            n.leaf = None;
            n.edges.clear();
            n.refresh_bounds();
            return;
        }

        let Ok(at) = n.find_edge(rest[0]) else {
            return;
        };
        let child_prefix_len = n.edges[at].child.prefix.len();
        if rest.len() <= child_prefix_len {
            n.edges.remove(at);
        } else {
            Self::detach(&mut n.edges[at].child, &rest[child_prefix_len..]);
            n.compact_edge(at);
        }
        n.refresh_bounds();
    }

    /// Drop every node and release every leaf.
    pub fn clear<V: Clone>(&mut self, leaves: &mut LeafArena<V>) -> usize {
        self.remove_prefix(leaves, b"")
    }
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}
