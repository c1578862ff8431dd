//! An intrusive-style FIFO used to park channel waiters.
//!
//! Values live inside the list's own storage (a [`slab::Slab`]) rather than
//! behind a pointer the caller owns, so a [`NodeId`] handed back by
//! [`IntrusiveList::append`] stays valid and cheap to remove in O(1) even
//! while other nodes are pushed and popped around it. This is the same
//! contract as `pygoic`'s `LinkedList`/`LinkedNode`
//! (`examples/original_source/pygoic/linked.py`), generalized from raw
//! prev/next pointers to slab keys to avoid unsafe code.

use slab::Slab;

/// Opaque handle to a node in an [`IntrusiveList`].
///
/// Cloning/copying a `NodeId` does not clone the underlying value; it is
/// only a key into the list's slab, paired with the generation the slot
/// held at insertion time (see the module doc comment on why that matters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize, u64);

struct Entry<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
    generation: u64,
}

/// A doubly linked FIFO supporting O(1) append to either end and O(1)
/// removal by node handle.
///
/// `slab` recycles a removed slot's key for the next insert, so a bare key
/// is ABA-prone: a `NodeId` captured before a node is removed could, after
/// reuse, name an entirely different value inserted later at the same key.
/// `next_generation` stamps every insert with a number that never repeats,
/// and [`remove`](IntrusiveList::remove)/[`contains`](IntrusiveList::contains)
/// check it alongside the key, so a stale `NodeId` can never be mistaken
/// for the live node that happens to reuse its slot.
pub struct IntrusiveList<T> {
    slab: Slab<Entry<T>>,
    head: Option<usize>,
    tail: Option<usize>,
    next_generation: u64,
}

impl<T> IntrusiveList<T> {
    pub fn new() -> Self {
        IntrusiveList { slab: Slab::new(), head: None, tail: None, next_generation: 0 }
    }

    fn bump_generation(&mut self) -> u64 {
        let g = self.next_generation;
        self.next_generation += 1;
        g
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    /// Appends to the tail (the end `pop_left` eventually reaches).
    pub fn append(&mut self, value: T) -> NodeId {
        let generation = self.bump_generation();
        let key = self.slab.insert(Entry { value, prev: self.tail, next: None, generation });
        match self.tail {
            Some(tail) => self.slab[tail].next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        NodeId(key, generation)
    }

    /// Appends to the head (the end `pop_left` reaches first).
    pub fn append_left(&mut self, value: T) -> NodeId {
        let generation = self.bump_generation();
        let key = self.slab.insert(Entry { value, prev: None, next: self.head, generation });
        match self.head {
            Some(head) => self.slab[head].prev = Some(key),
            None => self.tail = Some(key),
        }
        self.head = Some(key);
        NodeId(key, generation)
    }

    pub fn pop_left(&mut self) -> Option<T> {
        let key = self.head?;
        Some(self.unlink(key))
    }

    pub fn pop_right(&mut self) -> Option<T> {
        let key = self.tail?;
        Some(self.unlink(key))
    }

    /// Removes the node named by `id` if it is still linked, handing back
    /// its value. Idempotent: calling this twice on the same handle (or
    /// once it has already been popped) returns `None` rather than
    /// panicking, matching the discarded-waiter cleanup path in the select
    /// engine, which also uses the `Some` case to take ownership of a
    /// peeked-then-committed waiter (spec.md §4.4).
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        if self.live(id) {
            Some(self.unlink(id.0))
        } else {
            None
        }
    }

    /// True if `id` still names a linked node (not yet popped/removed) —
    /// and not a different, later node that happens to reuse the same
    /// slab key (see the module doc comment on generations).
    pub fn contains(&self, id: NodeId) -> bool {
        self.live(id)
    }

    fn live(&self, id: NodeId) -> bool {
        self.slab.get(id.0).map(|e| e.generation == id.1).unwrap_or(false)
    }

    fn unlink(&mut self, key: usize) -> T {
        let Entry { value, prev, next, generation: _ } = self.slab.remove(key);
        match prev {
            Some(prev) => self.slab[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slab[next].prev = prev,
            None => self.tail = prev,
        }
        value
    }

    /// Iterates node handles from head to tail, stable under removal: the
    /// iterator is produced once and walks the pre-snapshotted key order, so
    /// a caller that pops/removes nodes while scanning the select-group path
    /// (§4.4) can do so safely between iterations.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(self.slab.len());
        let mut cur = self.head;
        while let Some(key) = cur {
            ids.push(NodeId(key, self.slab[key].generation));
            cur = self.slab[key].next;
        }
        ids
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        if self.live(id) {
            self.slab.get(id.0).map(|e| &e.value)
        } else {
            None
        }
    }
}

impl<T> Default for IntrusiveList<T> {
    fn default() -> Self {
        Self::new()
    }
}
