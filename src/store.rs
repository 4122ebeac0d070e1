//! The store facade: one primary key-value namespace plus a table of sorted
//! sets, with a single writer and any number of snapshot readers.
//!
//! ## Publication
//!
//! The writer mutates a private working [`Keyspace`]. A successful
//! transaction that changed something bumps the generation, clones the
//! working keyspace and swaps the clone into the published slot. The clone
//! shares every node, leaf table and sorted set with the working copy, so it
//! costs a handful of `Arc` bumps; the writer's next mutation copies only the
//! paths it touches. A transaction that changed nothing publishes nothing. Readers take an `Arc` to the published keyspace and keep a stable
//! view for as long as they hold it.
//!
//! ## Example
//!
//! ```rust
//! use radish::Store;
//!
//! let mut store = Store::new();
//! let reader = store.reader();
//!
//! store.set(b"greeting", b"hello".to_vec()).unwrap();
//! let before = reader.snapshot();
//! store.set(b"greeting", b"bye".to_vec()).unwrap();
//!
//! assert_eq!(before.get(b"greeting"), Some(&b"hello"[..]));
//! assert_eq!(reader.snapshot().get(b"greeting"), Some(&b"bye"[..]));
//! ```

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::scan::{self, ScanPage};
use crate::tree::RadixTree;
use crate::validate::validate_key;
use crate::zset::{RangeEntry, RangeOptions, ScoreBound, SortedSet};

/// Stored values and sorted-set payloads are opaque bytes.
pub type Value = Vec<u8>;

// =============================================================================
// Keyspace
// =============================================================================

/// One consistent state of the store. Every read operation lives here, so a
/// [`Store`], a [`Transaction`] and a [`Snapshot`] all read the same way.
#[derive(Clone)]
pub struct Keyspace {
    primary: RadixTree<Value>,
    zsets: RadixTree<Arc<SortedSet<Value>>>,
    generation: u64,
    config: Config,
}

impl Keyspace {
    fn new(config: Config) -> Self {
        Self {
            primary: RadixTree::with_max_key_len(config.max_key_len),
            zsets: RadixTree::with_max_key_len(config.max_key_len),
            generation: 0,
            config,
        }
    }

    /// Number of committed transactions this state reflects.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Keys in the primary namespace.
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.primary.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.primary.contains_key(key)
    }

    /// The longest stored key that is a byte-prefix of `key`.
    pub fn longest_prefix_match(&self, key: &[u8]) -> Option<(&[u8], &[u8])> {
        self.primary
            .longest_prefix_match(key)
            .map(|(k, v)| (k, v.as_slice()))
    }

    /// The primary namespace, for ordered iteration and cursors.
    pub fn primary(&self) -> &RadixTree<Value> {
        &self.primary
    }

    /// Keys matching a regular expression, in key order.
    pub fn keys_matching(&self, pattern: &str) -> Result<Vec<&[u8]>> {
        Ok(self
            .primary
            .iter_matching(b"", pattern)?
            .map(|(key, _)| key)
            .collect())
    }

    /// One page of a prefix scan. `cursor` is the decimal cursor returned by
    /// the previous page, `"0"` to start. A missing `count` uses the
    /// configured default.
    pub fn scan(&self, cursor: &str, prefix: &[u8], count: Option<usize>) -> Result<ScanPage<'_, Value>> {
        let cursor: u32 = cursor
            .trim()
            .parse()
            .map_err(|_| Error::InvalidCursor(cursor.to_string()))?;
        let count = count.unwrap_or(self.config.default_scan_count);
        Ok(scan::scan(&self.primary, cursor, prefix, count))
    }

    /// The sorted set stored under `key`.
    pub fn zset(&self, key: &[u8]) -> Option<&SortedSet<Value>> {
        self.zsets.get(key).map(Arc::as_ref)
    }

    /// Number of sorted sets.
    pub fn zset_count(&self) -> usize {
        self.zsets.len()
    }

    /// Members in the sorted set; zero when it does not exist.
    pub fn zcard(&self, key: &[u8]) -> usize {
        self.zset(key).map_or(0, SortedSet::card)
    }

    pub fn zscore(&self, key: &[u8], member: &[u8]) -> Option<f64> {
        self.zset(key)?.score_of(member)
    }

    pub fn zrange_by_lex(&self, key: &[u8], prefix: &[u8], opts: RangeOptions) -> Vec<RangeEntry<'_, Value>> {
        self.zset(key)
            .map(|z| z.range_by_lex(prefix, opts))
            .unwrap_or_default()
    }

    pub fn zrange_by_score(
        &self,
        key: &[u8],
        min: ScoreBound,
        max: ScoreBound,
        opts: RangeOptions,
    ) -> Vec<RangeEntry<'_, Value>> {
        self.zset(key)
            .map(|z| z.range_by_score(min, max, opts))
            .unwrap_or_default()
    }

    /// Structural check of every tree and sorted set. Empty when consistent.
    pub fn verify_integrity(&self) -> Vec<String> {
        let mut issues = self.primary.verify_integrity();
        issues.extend(self.zsets.verify_integrity());
        for (key, zset) in &self.zsets {
            if zset.is_empty() {
                issues.push(format!("empty sorted set kept at {:?}", String::from_utf8_lossy(key)));
            }
            for issue in zset.check_integrity() {
                issues.push(format!("{}: {}", String::from_utf8_lossy(key), issue));
            }
        }
        issues
    }
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("generation", &self.generation)
            .field("keys", &self.primary.len())
            .field("zsets", &self.zsets.len())
            .finish()
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Write access to the working keyspace inside [`Store::transaction`].
///
/// Reads through the transaction see its own earlier writes.
pub struct Transaction<'a> {
    space: &'a mut Keyspace,
    changed: bool,
}

impl Deref for Transaction<'_> {
    type Target = Keyspace;

    fn deref(&self) -> &Keyspace {
        &*self.space
    }
}

impl Transaction<'_> {
    /// Insert or replace a key. Returns the previous value.
    pub fn set(&mut self, key: &[u8], value: Value) -> Result<Option<Value>> {
        validate_key(&self.space.config, key)?;
        trace!(key_len = key.len(), "set");
        let previous = self.space.primary.insert(key, value)?;
        self.changed = true;
        Ok(previous)
    }

    pub fn delete(&mut self, key: &[u8]) -> Option<Value> {
        let removed = self.space.primary.remove(key);
        self.changed |= removed.is_some();
        removed
    }

    /// Remove every primary key starting with `prefix`.
    pub fn delete_prefix(&mut self, prefix: &[u8]) -> usize {
        let removed = self.space.primary.remove_prefix(prefix);
        debug!(prefix = %String::from_utf8_lossy(prefix), removed, "deleted prefix");
        self.changed |= removed > 0;
        removed
    }

    /// Add `(score, member, payload)` triples to the sorted set at `key`,
    /// creating it on first use. Returns how many members are new.
    ///
    /// Nothing changes if any score or member is invalid.
    pub fn zadd<M: AsRef<[u8]>>(
        &mut self,
        key: &[u8],
        items: impl IntoIterator<Item = (f64, M, Value)>,
    ) -> Result<usize> {
        validate_key(&self.space.config, key)?;
        let items: Vec<_> = items.into_iter().collect();
        if items.is_empty() {
            return Ok(0);
        }

        if let Some(zset) = self.space.zsets.get_mut(key) {
            let added = Arc::make_mut(zset).add(items)?;
            self.changed = true;
            return Ok(added);
        }

        let mut zset = SortedSet::with_max_member_len(self.space.config.max_key_len);
        let added = zset.add(items)?;
        debug!(key = %String::from_utf8_lossy(key), "creating sorted set");
        self.space.zsets.insert(key, Arc::new(zset))?;
        self.changed = true;
        Ok(added)
    }

    /// Remove members. A sorted set left empty is dropped. Returns how many
    /// members were removed.
    pub fn zrem<M: AsRef<[u8]>>(&mut self, key: &[u8], members: impl IntoIterator<Item = M>) -> usize {
        let Some(current) = self.space.zsets.get(key) else {
            return 0;
        };
        let members: Vec<M> = members
            .into_iter()
            .filter(|m| current.score_of(m.as_ref()).is_some())
            .collect();
        if members.is_empty() {
            return 0;
        }

        let Some(zset) = self.space.zsets.get_mut(key) else {
            return 0;
        };
        let zset = Arc::make_mut(zset);
        let removed = zset.remove(members);
        if zset.is_empty() {
            self.space.zsets.remove(key);
            debug!(key = %String::from_utf8_lossy(key), "dropped empty sorted set");
        }
        self.changed = true;
        removed
    }

    /// Drop a whole sorted set. Returns whether it existed.
    pub fn zdel(&mut self, key: &[u8]) -> bool {
        let existed = self.space.zsets.remove(key).is_some();
        self.changed |= existed;
        existed
    }
}

// =============================================================================
// Store
// =============================================================================

/// The single writer.
///
/// All mutation takes `&mut self`; reads go through `Deref` to the working
/// [`Keyspace`], or through a [`Reader`] for other threads.
pub struct Store {
    working: Keyspace,
    published: Arc<RwLock<Arc<Keyspace>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let working = Keyspace::new(config);
        let published = Arc::new(RwLock::new(Arc::new(working.clone())));
        Self { working, published }
    }

    /// A handle for reading published state from any thread.
    pub fn reader(&self) -> Reader {
        Reader {
            published: Arc::clone(&self.published),
        }
    }

    /// The state as of the last commit.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(Arc::clone(&self.published.read()))
    }

    /// Run `f` against the working keyspace and publish the result.
    ///
    /// If `f` fails, the working keyspace is restored to the last published
    /// state and nothing is published. If `f` changed nothing, nothing is
    /// published and the generation stays put.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut tx = Transaction {
            space: &mut self.working,
            changed: false,
        };
        let result = f(&mut tx);
        let changed = tx.changed;
        match result {
            Ok(value) => {
                if changed {
                    self.commit();
                }
                Ok(value)
            }
            Err(err) => {
                self.working = Keyspace::clone(&self.published.read());
                debug!(error = %err, generation = self.working.generation, "transaction rolled back");
                Err(err)
            }
        }
    }

    fn commit(&mut self) {
        self.working.generation += 1;
        let snapshot = Arc::new(self.working.clone());
        *self.published.write() = snapshot;
        debug!(generation = self.working.generation, "committed");
    }

    pub fn set(&mut self, key: &[u8], value: Value) -> Result<Option<Value>> {
        self.transaction(|tx| tx.set(key, value))
    }

    pub fn delete(&mut self, key: &[u8]) -> Option<Value> {
        self.write(|tx| tx.delete(key))
    }

    pub fn delete_prefix(&mut self, prefix: &[u8]) -> usize {
        self.write(|tx| tx.delete_prefix(prefix))
    }

    pub fn zadd<M: AsRef<[u8]>>(&mut self, key: &[u8], items: impl IntoIterator<Item = (f64, M, Value)>) -> Result<usize> {
        self.transaction(|tx| tx.zadd(key, items))
    }

    pub fn zrem<M: AsRef<[u8]>>(&mut self, key: &[u8], members: impl IntoIterator<Item = M>) -> usize {
        self.write(|tx| tx.zrem(key, members))
    }

    pub fn zdel(&mut self, key: &[u8]) -> bool {
        self.write(|tx| tx.zdel(key))
    }

    /// An infallible single-operation transaction.
    fn write<T>(&mut self, f: impl FnOnce(&mut Transaction<'_>) -> T) -> T {
        let mut tx = Transaction {
            space: &mut self.working,
            changed: false,
        };
        let value = f(&mut tx);
        if tx.changed {
            self.commit();
        }
        value
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Store {
    type Target = Keyspace;

    fn deref(&self) -> &Keyspace {
        &self.working
    }
}

// =============================================================================
// Readers
// =============================================================================

/// A cloneable, thread-safe handle onto the published state.
#[derive(Clone)]
pub struct Reader {
    published: Arc<RwLock<Arc<Keyspace>>>,
}

impl Reader {
    /// The state as of the last commit. Later commits do not affect it.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(Arc::clone(&self.published.read()))
    }

    pub fn generation(&self) -> u64 {
        self.published.read().generation
    }
}

/// A frozen [`Keyspace`].
#[derive(Clone, Debug)]
pub struct Snapshot(Arc<Keyspace>);

impl Deref for Snapshot {
    type Target = Keyspace;

    fn deref(&self) -> &Keyspace {
        &self.0
    }
}
