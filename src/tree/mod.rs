//! Radix tree with a linked leaf chain.
//!
//! A compressed trie mapping byte-string keys to values. Every leaf is also a
//! member of a doubly linked chain ordered by key bytes, so ordered iteration
//! costs one descent to position and O(1) per step after that.
//!
//! Key features:
//! - Path compression: a leafless node other than the root has two or more
//!   children
//! - Per-node min/max leaf caches for O(1) subtree boundaries
//! - Copy-on-write nodes and leaf blocks: cloning a tree is cheap and the
//!   clone is unaffected by later writes to the original

pub mod arena;
mod debug;
mod iter;
pub(crate) mod node;
pub(crate) mod trie;

use crate::config::DEFAULT_MAX_KEY_LEN;
use crate::error::{Error, Result};

pub use arena::{Leaf, LeafArena, LeafId};
pub use iter::{Cursor, Iter, Matching};

use regex::bytes::Regex;
use trie::Trie;

/// An ordered map from byte strings to `V`.
#[derive(Clone)]
pub struct RadixTree<V> {
    trie: Trie,
    leaves: LeafArena<V>,
    max_key_len: usize,
}

impl<V> RadixTree<V> {
    /// Create an empty tree accepting keys up to 512 MiB.
    pub fn new() -> Self {
        Self::with_max_key_len(DEFAULT_MAX_KEY_LEN)
    }

    /// Create an empty tree rejecting keys longer than `max_key_len`.
    pub fn with_max_key_len(max_key_len: usize) -> Self {
        Self {
            trie: Trie::new(),
            leaves: LeafArena::new(),
            max_key_len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.trie.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    pub fn max_key_len(&self) -> usize {
        self.max_key_len
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.trie.find(key).map(|id| self.leaves.get(id).value())
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.trie.find(key).is_some()
    }

    /// The longest stored key that is a byte-prefix of `key`, with its value.
    pub fn longest_prefix_match(&self, key: &[u8]) -> Option<(&[u8], &V)> {
        let leaf = self.leaves.get(self.trie.longest_prefix(key)?);
        Some((leaf.key(), leaf.value()))
    }

    pub fn first(&self) -> Option<(&[u8], &V)> {
        let leaf = self.leaves.get(self.trie.first()?);
        Some((leaf.key(), leaf.value()))
    }

    pub fn last(&self) -> Option<(&[u8], &V)> {
        let leaf = self.leaves.get(self.trie.last()?);
        Some((leaf.key(), leaf.value()))
    }

    /// All entries in key order. Reverse with `.rev()`.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter::new(&self.leaves, self.trie.root.min, self.trie.root.max)
    }

    /// Entries whose key starts with `prefix`, in key order.
    pub fn iter_prefix(&self, prefix: &[u8]) -> Iter<'_, V> {
        match self.trie.locate_prefix(prefix) {
            Some(node) => Iter::new(&self.leaves, node.min, node.max),
            None => Iter::empty(&self.leaves),
        }
    }

    /// Entries with a key `>= start`, in key order.
    pub fn range_from(&self, start: &[u8]) -> Iter<'_, V> {
        match self.trie.lower_bound(start) {
            Some(id) => Iter::new(&self.leaves, id, self.trie.root.max),
            None => Iter::empty(&self.leaves),
        }
    }

    /// Entries with a key `<= end`, in descending key order.
    pub fn range_to_rev(&self, end: &[u8]) -> std::iter::Rev<Iter<'_, V>> {
        match self.trie.upper_bound(end) {
            Some(id) => Iter::new(&self.leaves, self.trie.root.min, id).rev(),
            None => Iter::empty(&self.leaves).rev(),
        }
    }

    /// Entries under `prefix` whose key matches `pattern`.
    ///
    /// The pattern is compiled once here; matching is lazy.
    pub fn iter_matching(&self, prefix: &[u8], pattern: &str) -> Result<Matching<'_, V>> {
        let regex = Regex::new(pattern)?;
        Ok(self.iter_prefix(prefix).matching(regex))
    }

    /// A cursor on the first entry with a key `>= key`.
    pub fn seek(&self, key: &[u8]) -> Cursor<'_, V> {
        let at = self.trie.lower_bound(key).unwrap_or(LeafId::NULL);
        Cursor::new(&self.leaves, self.trie.root.min, self.trie.root.max, at)
    }

    /// A cursor on the first entry.
    pub fn cursor(&self) -> Cursor<'_, V> {
        Cursor::new(&self.leaves, self.trie.root.min, self.trie.root.max, self.trie.root.min)
    }

    /// Approximate heap bytes held by leaves and keys. Nodes shared with
    /// clones are not counted.
    pub fn memory_usage(&self) -> usize {
        self.leaves.memory_usage()
    }

    pub(crate) fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() > self.max_key_len {
            return Err(Error::KeyTooLong {
                len: key.len(),
                max: self.max_key_len,
            });
        }
        Ok(())
    }
}

impl<V: Clone> RadixTree<V> {
    /// Insert a key-value pair.
    ///
    /// Returns the previous value if the key already existed. An oversized
    /// key is rejected and leaves the tree unchanged.
    pub fn insert(&mut self, key: &[u8], value: V) -> Result<Option<V>> {
        self.check_key(key)?;
        Ok(self.trie.insert(&mut self.leaves, key, value))
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let id = self.trie.find(key)?;
        Some(&mut self.leaves.get_mut(id).value)
    }

    /// Remove a key, returning its value if it existed.
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        self.trie.remove(&mut self.leaves, key)
    }

    /// Remove every key starting with `prefix`. Returns how many were removed.
    pub fn remove_prefix(&mut self, prefix: &[u8]) -> usize {
        self.trie.remove_prefix(&mut self.leaves, prefix)
    }

    pub fn clear(&mut self) {
        self.trie.clear(&mut self.leaves);
    }
}

impl<V> Default for RadixTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for RadixTree<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(k, v)| (String::from_utf8_lossy(k), v)))
            .finish()
    }
}

impl<'a, V> IntoIterator for &'a RadixTree<V> {
    type Item = (&'a [u8], &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
