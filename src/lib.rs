//! # radish
//!
//! An ordered in-memory key store built on a compressed radix tree whose
//! leaves form one doubly linked chain in key order.
//!
//! - [`RadixTree`]: byte-string keys to values, with O(key length) lookups,
//!   longest-prefix match, bulk prefix deletion and O(1)-per-step ordered
//!   iteration in both directions.
//! - [`SortedSet`]: members ordered by (score, member), stored in one small
//!   trie per distinct score; the bucket chains are spliced so a score range
//!   is a single walk.
//! - [`scan`]: stateless, resumable prefix paging with hash cursors.
//! - [`Store`]: a primary namespace plus named sorted sets, mutated by a
//!   single writer and read through cheap copy-on-write snapshots.
//!
//! ## Example
//!
//! ```rust
//! use radish::RadixTree;
//!
//! let mut tree: RadixTree<u64> = RadixTree::new();
//! tree.insert(b"apple", 1).unwrap();
//! tree.insert(b"app", 2).unwrap();
//! tree.insert(b"apply", 3).unwrap();
//!
//! assert_eq!(tree.get(b"app"), Some(&2));
//! let keys: Vec<&[u8]> = tree.iter_prefix(b"app").map(|(k, _)| k).collect();
//! assert_eq!(keys, vec![&b"app"[..], &b"apple"[..], &b"apply"[..]]);
//!
//! assert_eq!(tree.remove_prefix(b"appl"), 2);
//! assert_eq!(tree.len(), 1);
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod scan;
pub mod store;
pub mod tree;
mod validate;
pub mod zset;

pub use config::Config;
pub use error::{Error, Result};
pub use scan::ScanPage;
pub use store::{Keyspace, Reader, Snapshot, Store, Transaction, Value};
pub use tree::RadixTree;
pub use zset::{RangeEntry, RangeOptions, ScoreBound, Scored, SortedSet};

#[cfg(test)]
mod proptests;
