//! Debug utilities for radix tree troubleshooting.

use std::sync::Arc;

use super::arena::LeafArena;
use super::node::Node;
use super::trie::Trie;
use super::RadixTree;

impl<V: std::fmt::Debug> RadixTree<V> {
    /// Print the tree structure for debugging.
    pub fn debug_print(&self) {
        println!("=== RadixTree Debug ===");
        println!("Size: {}", self.len());
        Self::debug_node(&self.leaves, &self.trie.root, 0);
        println!("=======================");
    }

    fn debug_node(leaves: &LeafArena<V>, node: &Node, depth: usize) {
        let indent = "  ".repeat(depth);
        print!("{}[{:?}]", indent, String::from_utf8_lossy(&node.prefix));
        if let Some(id) = node.leaf {
            let leaf = leaves.get(id);
            print!(" = {:?}", leaf.value());
        }
        println!(" ({} edges)", node.edges.len());
        for edge in &node.edges {
            Self::debug_node(leaves, &edge.child, depth + 1);
        }
    }
}

impl<V> RadixTree<V> {
    /// Verify tree integrity - returns list of issues found.
    ///
    /// Checks node structure, boundary caches, leaf keys against their paths,
    /// and the leaf chain from the first leaf to the last.
    pub fn verify_integrity(&self) -> Vec<String> {
        let mut issues = self.trie.verify(&self.leaves);

        if let Some(first) = self.trie.first() {
            if !self.leaves.prev_of(first).is_null() {
                issues.push("first leaf has a predecessor".to_string());
            }
        }
        if let Some(last) = self.trie.last() {
            if !self.leaves.next_of(last).is_null() {
                issues.push("last leaf has a successor".to_string());
            }
        }
        if self.leaves.live() != self.len() {
            issues.push(format!(
                "arena holds {} leaves but tree len is {}",
                self.leaves.live(),
                self.len()
            ));
        }
        issues
    }

    /// Nodes and leaf tables of `self` not shared with `earlier`, an older
    /// version of this tree. After one write to a clone this stays near the
    /// key depth plus a few leaf blocks, whatever the tree size.
    pub fn copied_since(&self, earlier: &Self) -> usize {
        self.trie.nodes_copied_since(&earlier.trie) + self.leaves.copied_since(&earlier.leaves)
    }
}

impl Trie {
    pub(crate) fn nodes_copied_since(&self, earlier: &Trie) -> usize {
        Self::nodes_copied(&self.root, Some(&earlier.root))
    }

    fn nodes_copied(node: &Arc<Node>, earlier: Option<&Arc<Node>>) -> usize {
        if earlier.is_some_and(|e| Arc::ptr_eq(node, e)) {
            return 0;
        }
        let copied: usize = node
            .edges
            .iter()
            .map(|edge| {
                let before = earlier.and_then(|e| e.find_edge(edge.label).ok().map(|at| &e.edges[at].child));
                Self::nodes_copied(&edge.child, before)
            })
            .sum();
        1 + copied
    }

    /// Structural and chain checks for one trie. Links leaving the trie's
    /// own leaf range are not inspected.
    pub(crate) fn verify<V>(&self, leaves: &LeafArena<V>) -> Vec<String> {
        let mut issues = Vec::new();
        if !self.root.prefix.is_empty() {
            issues.push("root has a non-empty prefix".to_string());
        }

        let mut path = Vec::new();
        let mut reachable = 0;
        Self::verify_node(&self.root, true, leaves, &mut path, &mut reachable, &mut issues);
        if reachable != self.len {
            issues.push(format!("{} reachable leaves but len is {}", reachable, self.len));
        }

        Self::verify_chain(self, leaves, &mut issues);
        issues
    }

    fn verify_node<V>(
        node: &Node,
        is_root: bool,
        leaves: &LeafArena<V>,
        path: &mut Vec<u8>,
        reachable: &mut usize,
        issues: &mut Vec<String>,
    ) {
        path.extend_from_slice(&node.prefix);

        if !is_root {
            if node.prefix.is_empty() {
                issues.push(format!("node under {:?} has an empty prefix", path));
            }
            if node.leaf.is_none() && node.edges.len() < 2 {
                issues.push(format!(
                    "leafless node at {:?} has {} edges",
                    path,
                    node.edges.len()
                ));
            }
        }

        if let Some(id) = node.leaf {
            *reachable += 1;
            if leaves.get(id).key() != path.as_slice() {
                issues.push(format!(
                    "leaf key {:?} stored at path {:?}",
                    leaves.get(id).key(),
                    path
                ));
            }
        }

        for pair in node.edges.windows(2) {
            if pair[0].label >= pair[1].label {
                issues.push(format!("edges out of order at {:?}", path));
            }
        }
        for edge in &node.edges {
            if edge.child.prefix.first() != Some(&edge.label) {
                issues.push(format!("edge label {:#04x} disagrees with child prefix", edge.label));
            }
        }

        let mut expected = node.clone();
        expected.refresh_bounds();
        if expected.min != node.min || expected.max != node.max {
            issues.push(format!("stale min/max cache at {:?}", path));
        }

        for edge in &node.edges {
            Self::verify_node(&edge.child, false, leaves, path, reachable, issues);
        }
        path.truncate(path.len() - node.prefix.len());
    }

    fn verify_chain<V>(&self, leaves: &LeafArena<V>, issues: &mut Vec<String>) {
        let (Some(first), Some(last)) = (self.first(), self.last()) else {
            return;
        };

        let mut steps = 1;
        let mut cur = first;
        while cur != last {
            let next = leaves.next_of(cur);
            if next.is_null() {
                issues.push("chain ends before the last leaf".to_string());
                return;
            }
            if leaves.prev_of(next) != cur {
                issues.push(format!("prev link of {:?} does not point back", leaves.get(next).key()));
            }
            if leaves.get(next).key() <= leaves.get(cur).key() {
                issues.push(format!("chain out of order at {:?}", leaves.get(next).key()));
            }
            steps += 1;
            if steps > self.len {
                issues.push("chain is longer than the trie".to_string());
                return;
            }
            cur = next;
        }
        if steps != self.len {
            issues.push(format!("chain has {} leaves but len is {}", steps, self.len));
        }
    }
}
