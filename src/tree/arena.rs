//! Leaf storage and the tree-wide leaf chain.
//!
//! Leaves live in a slab addressed by 32-bit [`LeafId`]s instead of pointers.
//! The slab is a persistent radix table: blocks of 64 slots at the bottom,
//! pages of up to 32 children above them, every level behind an `Arc`.
//! - cloning the arena is one `Arc` bump,
//! - the first write to a shared slot copies the block and the pages on its
//!   path, nothing else,
//! - freed slots form an intrusive list through the table itself, so the free
//!   list is shared and copied the same way,
//! - relinking the chain is plain index bookkeeping.
//!
//! Several tries may allocate from one arena; their leaves then form a single
//! chain, which is how sorted-set score buckets are spliced together.

use std::sync::Arc;

/// Slots per block.
const BLOCK_BITS: u32 = 6;
const BLOCK_LEN: usize = 1 << BLOCK_BITS;
const BLOCK_MASK: u32 = (BLOCK_LEN as u32) - 1;

/// Children per page.
const PAGE_BITS: u32 = 5;
const PAGE_LEN: usize = 1 << PAGE_BITS;
const PAGE_MASK: u32 = (PAGE_LEN as u32) - 1;

/// A 32-bit reference to a leaf in a [`LeafArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct LeafId(u32);

impl LeafId {
    /// Marks the end of the chain and empty boundary caches.
    pub const NULL: LeafId = LeafId(u32::MAX);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == u32::MAX
    }

    /// `None` for [`LeafId::NULL`].
    #[inline]
    pub fn get(self) -> Option<LeafId> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }

    #[inline]
    fn new(idx: usize) -> Self {
        assert!(idx < u32::MAX as usize, "leaf arena exhausted");
        LeafId(idx as u32)
    }

    #[inline]
    fn slot(self) -> usize {
        (self.0 & BLOCK_MASK) as usize
    }

    /// Child index within the page at `level` (blocks are level 0).
    #[inline]
    fn child(self, level: u32) -> usize {
        ((self.0 >> (BLOCK_BITS + PAGE_BITS * (level - 1))) & PAGE_MASK) as usize
    }

    /// Whether a table of `height` page levels has room for this id.
    #[inline]
    fn fits(self, height: u32) -> bool {
        (u64::from(self.0) >> (BLOCK_BITS + PAGE_BITS * height)) == 0
    }
}

impl Default for LeafId {
    fn default() -> Self {
        LeafId::NULL
    }
}

/// A stored key/value pair plus its chain links.
#[derive(Clone, Debug)]
pub struct Leaf<V> {
    pub(crate) key: Arc<[u8]>,
    pub(crate) value: V,
    pub(crate) prev: LeafId,
    pub(crate) next: LeafId,
}

impl<V> Leaf<V> {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn prev(&self) -> Option<LeafId> {
        self.prev.get()
    }

    pub fn next(&self) -> Option<LeafId> {
        self.next.get()
    }
}

#[derive(Clone, Debug)]
enum Slot<V> {
    /// Free, holding the next free slot.
    Vacant(LeafId),
    Live(Leaf<V>),
}

#[derive(Clone, Debug)]
enum Table<V> {
    Block(Vec<Slot<V>>),
    Page(Vec<Arc<Table<V>>>),
}

impl<V> Table<V> {
    fn empty(level: u32) -> Self {
        if level == 0 {
            let mut slots = Vec::with_capacity(BLOCK_LEN);
            slots.resize_with(BLOCK_LEN, || Slot::Vacant(LeafId::NULL));
            Table::Block(slots)
        } else {
            Table::Page(Vec::with_capacity(PAGE_LEN))
        }
    }

    fn slot(&self, id: LeafId, level: u32) -> Option<&Slot<V>> {
        match self {
            Table::Block(slots) => slots.get(id.slot()),
            Table::Page(children) => children.get(id.child(level))?.slot(id, level - 1),
        }
    }

    fn memory_usage(&self) -> usize {
        match self {
            Table::Block(slots) => {
                let keys: usize = slots
                    .iter()
                    .map(|slot| match slot {
                        Slot::Live(leaf) => leaf.key.len(),
                        Slot::Vacant(_) => 0,
                    })
                    .sum();
                slots.capacity() * std::mem::size_of::<Slot<V>>() + keys
            }
            Table::Page(children) => {
                children.capacity() * std::mem::size_of::<Arc<Table<V>>>()
                    + children.iter().map(|c| c.memory_usage()).sum::<usize>()
            }
        }
    }

    /// Tables reachable from `this` that are not the same allocation as the
    /// table at the same position under `earlier`. `lift` is how many page
    /// levels `this` has grown since; the old root then sits at child 0.
    fn copied_since(this: &Arc<Self>, earlier: Option<&Arc<Self>>, lift: u32) -> usize {
        if lift == 0 && earlier.is_some_and(|e| Arc::ptr_eq(this, e)) {
            return 0;
        }
        let Table::Page(children) = &**this else {
            return 1;
        };
        let copied: usize = children
            .iter()
            .enumerate()
            .map(|(i, child)| {
                if lift > 0 {
                    Self::copied_since(child, earlier.filter(|_| i == 0), lift - 1)
                } else {
                    let before = match earlier.map(|e| &**e) {
                        Some(Table::Page(before)) => before.get(i),
                        _ => None,
                    };
                    Self::copied_since(child, before, 0)
                }
            })
            .sum();
        1 + copied
    }
}

impl<V: Clone> Table<V> {
    /// Copy-on-write descent: every shared table on the path is copied.
    fn slot_mut(this: &mut Arc<Self>, id: LeafId, level: u32) -> Option<&mut Slot<V>> {
        match Arc::make_mut(this) {
            Table::Block(slots) => slots.get_mut(id.slot()),
            Table::Page(children) => Self::slot_mut(children.get_mut(id.child(level))?, id, level - 1),
        }
    }

    /// Add the missing pages and block on the path to a fresh id.
    fn extend_to(this: &mut Arc<Self>, id: LeafId, level: u32) {
        if let Table::Page(children) = Arc::make_mut(this) {
            let at = id.child(level);
            if at == children.len() {
                children.push(Arc::new(Table::empty(level - 1)));
            }
            Self::extend_to(&mut children[at], id, level - 1);
        }
    }
}

/// Slab of leaves with copy-on-write paths.
#[derive(Clone, Debug)]
pub struct LeafArena<V> {
    root: Option<Arc<Table<V>>>,
    /// Page levels above the blocks.
    height: u32,
    free_head: LeafId,
    next_fresh: usize,
    live: usize,
}

impl<V> LeafArena<V> {
    pub fn new() -> Self {
        Self {
            root: None,
            height: 0,
            free_head: LeafId::NULL,
            next_fresh: 0,
            live: 0,
        }
    }

    /// Number of allocated leaves.
    pub fn live(&self) -> usize {
        self.live
    }

    /// # Panics
    /// Panics if `id` does not refer to a live leaf. A dangling id means the
    /// chain or a boundary cache is corrupt.
    #[inline]
    pub fn get(&self, id: LeafId) -> &Leaf<V> {
        let slot = self
            .root
            .as_deref()
            .filter(|_| id.fits(self.height))
            .and_then(|root| root.slot(id, self.height));
        match slot {
            Some(Slot::Live(leaf)) => leaf,
            _ => panic!("dangling leaf reference {id:?}"),
        }
    }

    #[inline]
    pub fn next_of(&self, id: LeafId) -> LeafId {
        self.get(id).next
    }

    #[inline]
    pub fn prev_of(&self, id: LeafId) -> LeafId {
        self.get(id).prev
    }

    /// Approximate heap bytes held, keys included. Tables shared with clones
    /// are counted in full.
    pub fn memory_usage(&self) -> usize {
        self.root.as_ref().map_or(0, |root| root.memory_usage())
    }

    /// Blocks and pages of `self` that are not shared with `earlier`, an
    /// older version of the same arena.
    pub fn copied_since(&self, earlier: &Self) -> usize {
        self.root.as_ref().map_or(0, |root| {
            let lift = self.height.saturating_sub(earlier.height);
            Table::copied_since(root, earlier.root.as_ref(), lift)
        })
    }
}

impl<V: Clone> LeafArena<V> {
    fn slot_mut(&mut self, id: LeafId) -> &mut Slot<V> {
        let height = self.height;
        self.root
            .as_mut()
            .filter(|_| id.fits(height))
            .and_then(|root| Table::slot_mut(root, id, height))
            .unwrap_or_else(|| panic!("dangling leaf reference {id:?}"))
    }

    /// Copy-on-write access: tables shared with a clone are copied first.
    #[inline]
    pub fn get_mut(&mut self, id: LeafId) -> &mut Leaf<V> {
        match self.slot_mut(id) {
            Slot::Live(leaf) => leaf,
            Slot::Vacant(_) => panic!("dangling leaf reference {id:?}"),
        }
    }

    /// Allocate an unlinked leaf.
    pub fn alloc(&mut self, key: &[u8], value: V) -> LeafId {
        let leaf = Leaf {
            key: Arc::from(key),
            value,
            prev: LeafId::NULL,
            next: LeafId::NULL,
        };
        let id = match self.free_head.get() {
            Some(id) => id,
            None => self.reserve_fresh(),
        };

        let slot = self.slot_mut(id);
        let next_free = match slot {
            Slot::Vacant(next) => *next,
            Slot::Live(_) => panic!("free list handed out a live slot {id:?}"),
        };
        *slot = Slot::Live(leaf);
        if id == self.free_head {
            self.free_head = next_free;
        }
        self.live += 1;
        id
    }

    /// The next never-used id, growing the table by one level when full.
    fn reserve_fresh(&mut self) -> LeafId {
        let id = LeafId::new(self.next_fresh);
        self.next_fresh += 1;

        let root = match self.root.take() {
            None => Arc::new(Table::empty(0)),
            Some(root) if id.fits(self.height) => root,
            Some(root) => {
                self.height += 1;
                let mut page = Vec::with_capacity(PAGE_LEN);
                page.push(root);
                Arc::new(Table::Page(page))
            }
        };
        let root = self.root.insert(root);
        Table::extend_to(root, id, self.height);
        id
    }

    /// Free a leaf slot. The caller unlinks it first.
    pub fn release(&mut self, id: LeafId) -> Leaf<V> {
        let head = self.free_head;
        let slot = self.slot_mut(id);
        let leaf = match std::mem::replace(slot, Slot::Vacant(head)) {
            Slot::Live(leaf) => leaf,
            Slot::Vacant(_) => panic!("double release of leaf {id:?}"),
        };
        self.free_head = id;
        self.live -= 1;
        leaf
    }

    /// Point `a.next` at `b` and `b.prev` at `a`; either side may be NULL.
    pub fn join(&mut self, a: LeafId, b: LeafId) {
        if !a.is_null() {
            self.get_mut(a).next = b;
        }
        if !b.is_null() {
            self.get_mut(b).prev = a;
        }
    }

    /// Splice unlinked `id` directly after `pred`.
    pub fn link_after(&mut self, pred: LeafId, id: LeafId) {
        let succ = self.next_of(pred);
        self.join(pred, id);
        self.join(id, succ);
    }

    /// Splice unlinked `id` directly before `succ`.
    pub fn link_before(&mut self, succ: LeafId, id: LeafId) {
        let pred = self.prev_of(succ);
        self.join(pred, id);
        self.join(id, succ);
    }

    /// Remove `id` from the chain, closing the gap around it.
    pub fn unlink(&mut self, id: LeafId) {
        let (prev, next) = {
            let leaf = self.get(id);
            (leaf.prev, leaf.next)
        };
        self.join(prev, next);
        let leaf = self.get_mut(id);
        leaf.prev = LeafId::NULL;
        leaf.next = LeafId::NULL;
    }

    /// Unlink and free the contiguous run `first..=last`. Returns the number
    /// of leaves released.
    pub fn release_run(&mut self, first: LeafId, last: LeafId) -> usize {
        let before = self.prev_of(first);
        let after = self.next_of(last);

        let mut released = 0;
        let mut cur = first;
        loop {
            let next = self.next_of(cur);
            self.release(cur);
            released += 1;
            if cur == last {
                break;
            }
            assert!(!next.is_null(), "leaf run ended before its last leaf");
            cur = next;
        }

        self.join(before, after);
        released
    }
}

impl<V> Default for LeafArena<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(arena: &LeafArena<u32>, mut id: LeafId) -> Vec<u32> {
        let mut out = Vec::new();
        while !id.is_null() {
            let leaf = arena.get(id);
            out.push(leaf.value);
            id = leaf.next;
        }
        out
    }

    #[test]
    fn test_link_and_unlink() {
        let mut arena = LeafArena::new();
        let a = arena.alloc(b"a", 1);
        let c = arena.alloc(b"c", 3);
        let b = arena.alloc(b"b", 2);

        arena.join(a, c);
        arena.link_after(a, b);
        assert_eq!(chain(&arena, a), vec![1, 2, 3]);
        assert_eq!(arena.prev_of(c), b);

        arena.unlink(b);
        assert_eq!(chain(&arena, a), vec![1, 3]);
        assert_eq!(arena.prev_of(c), a);

        arena.link_before(a, b);
        assert_eq!(chain(&arena, b), vec![2, 1, 3]);
    }

    #[test]
    fn test_release_reuses_slots() {
        let mut arena = LeafArena::new();
        let a = arena.alloc(b"a", 1);
        arena.release(a);
        assert_eq!(arena.live(), 0);
        let b = arena.alloc(b"b", 2);
        assert_eq!(a, b);
        assert_eq!(arena.get(b).key(), b"b");
    }

    #[test]
    fn test_release_run_closes_gap() {
        let mut arena = LeafArena::new();
        let ids: Vec<_> = (0..5u32).map(|i| arena.alloc(&[i as u8], i)).collect();
        for w in ids.windows(2) {
            arena.join(w[0], w[1]);
        }

        assert_eq!(arena.release_run(ids[1], ids[3]), 3);
        assert_eq!(chain(&arena, ids[0]), vec![0, 4]);
        assert_eq!(arena.live(), 2);
    }

    #[test]
    fn test_clone_is_copy_on_write() {
        let mut arena = LeafArena::new();
        let a = arena.alloc(b"a", 1);
        let snapshot = arena.clone();

        arena.get_mut(a).value = 10;
        assert_eq!(arena.get(a).value, 10);
        assert_eq!(snapshot.get(a).value, 1);
    }

    #[test]
    fn test_many_blocks() {
        let mut arena = LeafArena::new();
        let ids: Vec<_> = (0..1000u32)
            .map(|i| arena.alloc(&i.to_be_bytes(), i))
            .collect();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(arena.get(*id).value, i as u32);
        }
        assert_eq!(arena.live(), 1000);
    }

    #[test]
    fn test_write_copies_one_path() {
        let mut arena = LeafArena::new();
        // 40 blocks: more than one page, so the table is two pages tall.
        let ids: Vec<_> = (0..40 * 64u32)
            .map(|i| arena.alloc(&i.to_be_bytes(), i))
            .collect();
        assert_eq!(arena.height, 2);
        let snapshot = arena.clone();
        assert_eq!(arena.copied_since(&snapshot), 0);

        arena.get_mut(ids[1000]).value = 0;
        // Root page, one inner page, one block.
        assert_eq!(arena.copied_since(&snapshot), 3);
        assert_eq!(snapshot.get(ids[1000]).value, 1000);

        arena.get_mut(ids[1001]).value = 0;
        assert_eq!(arena.copied_since(&snapshot), 3);
    }

    #[test]
    fn test_free_list_is_copy_on_write() {
        let mut arena = LeafArena::new();
        let ids: Vec<_> = (0..200u32).map(|i| arena.alloc(&[], i)).collect();
        arena.release(ids[10]);
        arena.release(ids[150]);
        let snapshot = arena.clone();

        assert_eq!(arena.alloc(b"x", 1), ids[150]);
        assert_eq!(arena.alloc(b"y", 2), ids[10]);
        assert_eq!(arena.alloc(b"z", 3), LeafId::new(200));
        assert_eq!(arena.live(), 201);

        // The snapshot still sees both slots free and hands them out again.
        let mut snapshot = snapshot;
        assert_eq!(snapshot.live(), 198);
        assert_eq!(snapshot.alloc(b"w", 4), ids[150]);
        assert_eq!(arena.get(ids[150]).key(), b"x");
    }

    #[test]
    fn test_growth_keeps_old_tables_shared() {
        let mut arena = LeafArena::new();
        for i in 0..64u32 {
            arena.alloc(&[], i);
        }
        let snapshot = arena.clone();
        assert_eq!(arena.height, 0);

        let id = arena.alloc(&[], 64);
        assert_eq!(arena.height, 1);
        // New root page and new block; the old block is shared.
        assert_eq!(arena.copied_since(&snapshot), 2);
        assert_eq!(arena.get(id).value, 64);
        assert_eq!(arena.get(LeafId::new(0)).value, 0);
    }

    #[test]
    #[should_panic(expected = "dangling leaf reference")]
    fn test_dangling_reference_panics() {
        let mut arena = LeafArena::new();
        let a = arena.alloc(b"a", 1);
        arena.release(a);
        arena.get(a);
    }

    #[test]
    #[should_panic(expected = "dangling leaf reference")]
    fn test_null_reference_panics() {
        let mut arena = LeafArena::new();
        arena.alloc(b"a", 1);
        arena.get(LeafId::NULL);
    }
}
