//! Resumable prefix scans.
//!
//! A scan cursor is the 32-bit FNV-1a hash of the last key handed out. The
//! next call walks the prefix range again, skips up to the first key with that
//! hash and continues after it. Nothing is stored between calls, so a cursor
//! stays usable across commits, at the price of best-effort semantics: keys
//! inserted or removed between calls, or two keys sharing a hash, can make a
//! scan skip or repeat entries.

use crate::tree::RadixTree;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Cursor value that starts a scan, and that a finished scan returns.
pub const CURSOR_START: u32 = 0;

/// FNV-1a hash of `key` as used for scan cursors.
///
/// Zero is reserved for [`CURSOR_START`], so a key hashing to zero reports 1.
#[inline]
pub fn cursor_hash(key: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in key {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    if hash == CURSOR_START {
        1
    } else {
        hash
    }
}

/// One page of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage<'a, V> {
    pub entries: Vec<(&'a [u8], &'a V)>,
    /// Feed back to continue; [`CURSOR_START`] once the range is exhausted.
    pub cursor: u32,
}

impl<'a, V> ScanPage<'a, V> {
    pub fn is_done(&self) -> bool {
        self.cursor == CURSOR_START
    }
}

/// Return up to `count` entries under `prefix`, resuming after `cursor`.
///
/// A `count` of zero returns an empty page and hands `cursor` back
/// unchanged. A cursor that matches no key under `prefix` ends the scan.
pub fn scan<'a, V>(tree: &'a RadixTree<V>, cursor: u32, prefix: &[u8], count: usize) -> ScanPage<'a, V> {
    if count == 0 {
        return ScanPage {
            entries: Vec::new(),
            cursor,
        };
    }

    let mut iter = tree.iter_prefix(prefix).peekable();
    if cursor != CURSOR_START {
        // Consume everything up to and including the cursor key.
        let found = iter.by_ref().any(|(key, _)| cursor_hash(key) == cursor);
        if !found {
            return ScanPage {
                entries: Vec::new(),
                cursor: CURSOR_START,
            };
        }
    }

    let entries: Vec<_> = iter.by_ref().take(count).collect();
    let cursor = match (entries.last(), iter.peek()) {
        (Some((key, _)), Some(_)) => cursor_hash(key),
        _ => CURSOR_START,
    };
    ScanPage { entries, cursor }
}
