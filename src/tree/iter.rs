//! Iteration over the leaf chain.
//!
//! Positioning costs one descent; every step after that follows a chain link.

use regex::bytes::Regex;

use super::arena::{LeafArena, LeafId};

/// Double-ended iterator over the leaves `front..=back` of a chain.
///
/// The bounds matter when several tries share one chain: iteration stops at
/// the last leaf of the range instead of running into a neighbouring trie.
pub struct Iter<'a, V> {
    leaves: &'a LeafArena<V>,
    front: LeafId,
    back: LeafId,
    remaining: bool,
}

impl<'a, V> Iter<'a, V> {
    pub(crate) fn new(leaves: &'a LeafArena<V>, front: LeafId, back: LeafId) -> Self {
        Self {
            leaves,
            front,
            back,
            remaining: !front.is_null() && !back.is_null(),
        }
    }

    pub(crate) fn empty(leaves: &'a LeafArena<V>) -> Self {
        Self::new(leaves, LeafId::NULL, LeafId::NULL)
    }

    /// Keep only keys matched by `pattern`. The regex is evaluated per step
    /// but compiled by the caller, once.
    pub fn matching(self, pattern: Regex) -> Matching<'a, V> {
        Matching {
            inner: self,
            pattern,
        }
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.remaining {
            return None;
        }
        let leaf = self.leaves.get(self.front);
        if self.front == self.back {
            self.remaining = false;
        } else {
            self.front = leaf.next;
            if self.front.is_null() {
                self.remaining = false;
            }
        }
        Some((leaf.key(), leaf.value()))
    }
}

impl<'a, V> DoubleEndedIterator for Iter<'a, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if !self.remaining {
            return None;
        }
        let leaf = self.leaves.get(self.back);
        if self.front == self.back {
            self.remaining = false;
        } else {
            self.back = leaf.prev;
            if self.back.is_null() {
                self.remaining = false;
            }
        }
        Some((leaf.key(), leaf.value()))
    }
}

/// Regex-filtered iteration, lazily skipping non-matching keys.
pub struct Matching<'a, V> {
    inner: Iter<'a, V>,
    pattern: Regex,
}

impl<'a, V> Iterator for Matching<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let pattern = &self.pattern;
        self.inner.find(|(key, _)| pattern.is_match(key))
    }
}

impl<'a, V> DoubleEndedIterator for Matching<'a, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let pattern = &self.pattern;
        self.inner.rfind(|(key, _)| pattern.is_match(key))
    }
}

/// A bidirectional position in a tree, bounded by its first and last leaf.
///
/// Unlike [`Iter`], a cursor can change direction and report where it is.
pub struct Cursor<'a, V> {
    leaves: &'a LeafArena<V>,
    first: LeafId,
    last: LeafId,
    current: LeafId,
}

impl<'a, V> Cursor<'a, V> {
    pub(crate) fn new(leaves: &'a LeafArena<V>, first: LeafId, last: LeafId, current: LeafId) -> Self {
        Self {
            leaves,
            first,
            last,
            current,
        }
    }

    /// The entry under the cursor, `None` once it has stepped off either end.
    pub fn current(&self) -> Option<(&'a [u8], &'a V)> {
        let leaves = self.leaves;
        let leaf = leaves.get(self.current.get()?);
        Some((leaf.key(), leaf.value()))
    }

    /// Advance and return the new current entry.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<(&'a [u8], &'a V)> {
        if self.current.is_null() {
            return None;
        }
        self.current = if self.current == self.last {
            LeafId::NULL
        } else {
            self.leaves.next_of(self.current)
        };
        self.current()
    }

    /// Step back and return the new current entry.
    pub fn prev(&mut self) -> Option<(&'a [u8], &'a V)> {
        if self.current.is_null() {
            return None;
        }
        self.current = if self.current == self.first {
            LeafId::NULL
        } else {
            self.leaves.prev_of(self.current)
        };
        self.current()
    }
}
