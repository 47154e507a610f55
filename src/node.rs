//! Per-node record and state protocol.
//!
//! A node's membership state is published through two monotonic atomic
//! flags:
//!
//! - `fully_linked`: set once, after every incoming forward pointer is in
//!   place. A node is invisible to membership queries until then.
//! - `marked`: set once, under the node's own lock, at the instant the node
//!   logically leaves the set. Physical unlinking happens afterwards.
//!
//! Both flags are written with Release and read with Acquire: a reader that
//! observes `fully_linked == true` also observes every forward pointer
//! written before publication.
//!
//! The lock is a raw mutex rather than `Mutex<T>` because predecessor locks
//! are released collectively by a guard owning several nodes at once (see
//! `list::locks`), not at the end of a lexical scope.

use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use parking_lot::lock_api::RawMutex as _;
use parking_lot::RawMutex;
use seize::{AsLink, Collector, Link};

use crate::key::Key;
use crate::level::{HEIGHT, MAX_LEVEL};

#[repr(C)]
pub(crate) struct Node {
    /// Safety invariant: must stay the first field (required by `AsLink`).
    link: Link,
    key: Key,
    /// Highest level this node participates at; immutable after allocation.
    top_level: usize,
    /// Forward pointers, one per level in `[0, top_level]`.
    next: Box<[AtomicPtr<Node>]>,
    lock: RawMutex,
    marked: AtomicBool,
    fully_linked: AtomicBool,
}

// SAFETY: `Node` is `#[repr(C)]` with `link` as its first field.
unsafe impl AsLink for Node {}

impl Node {
    /// Allocate a user node occupying levels `[0, top_level]`, unlinked and
    /// unpublished.
    pub(crate) fn new(collector: &Collector, key: Key, top_level: usize) -> Self {
        assert!(
            (1..=MAX_LEVEL).contains(&top_level),
            "node top level {top_level} outside [1, {MAX_LEVEL}]"
        );
        debug_assert!(!key.is_sentinel(), "user nodes carry finite keys");

        Self {
            link: collector.link(),
            key,
            top_level,
            next: null_forwards(top_level + 1),
            lock: RawMutex::INIT,
            marked: AtomicBool::new(false),
            fully_linked: AtomicBool::new(false),
        }
    }

    /// Allocate a sentinel: full height, published from birth, never marked.
    pub(crate) fn sentinel(collector: &Collector, key: Key) -> Self {
        debug_assert!(key.is_sentinel());

        Self {
            link: collector.link(),
            key,
            top_level: MAX_LEVEL,
            next: null_forwards(HEIGHT),
            lock: RawMutex::INIT,
            marked: AtomicBool::new(false),
            fully_linked: AtomicBool::new(true),
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn key(&self) -> Key {
        self.key
    }

    #[inline]
    #[must_use]
    pub(crate) fn top_level(&self) -> usize {
        self.top_level
    }

    /// Forward pointer at `level`.
    ///
    /// Acquire pairs with the Release in [`set_next`](Self::set_next): a
    /// traversal that reaches a node through this load also sees the node's
    /// own forward pointers, written before it was linked in.
    #[inline]
    pub(crate) fn next(&self, level: usize) -> *mut Node {
        self.next[level].load(Ordering::Acquire)
    }

    /// Write the forward pointer at `level` with Release ordering.
    ///
    /// For links out of a live predecessor the caller must hold that
    /// predecessor's lock at `level`; a new node's own forwards are written
    /// before the node is reachable.
    #[inline]
    pub(crate) fn set_next(&self, level: usize, node: *mut Node) {
        self.next[level].store(node, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub(crate) fn is_marked(&self) -> bool {
        self.marked.load(Ordering::Acquire)
    }

    /// Logical deletion. Caller holds this node's lock; the flag never
    /// transitions back.
    #[inline]
    pub(crate) fn set_marked(&self) {
        debug_assert!(self.lock.is_locked());
        self.marked.store(true, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub(crate) fn is_fully_linked(&self) -> bool {
        self.fully_linked.load(Ordering::Acquire)
    }

    /// Publication. Called once, after every `preds[l].next[l]` points here;
    /// the flag never transitions back.
    #[inline]
    pub(crate) fn set_fully_linked(&self) {
        self.fully_linked.store(true, Ordering::Release);
    }

    /// Block until this node's lock is held.
    #[inline]
    pub(crate) fn lock(&self) {
        self.lock.lock();
    }

    /// Release this node's lock.
    ///
    /// # Safety
    ///
    /// The current thread must hold the lock via a prior [`lock`](Self::lock)
    /// that has not yet been paired with an unlock.
    #[inline]
    pub(crate) unsafe fn unlock(&self) {
        // SAFETY: forwarded contract.
        unsafe { self.lock.unlock() };
    }
}

fn null_forwards(len: usize) -> Box<[AtomicPtr<Node>]> {
    (0..len)
        .map(|_| AtomicPtr::new(std::ptr::null_mut()))
        .collect::<Vec<_>>()
        .into_boxed_slice()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_is_unpublished_and_unmarked() {
        let collector = Collector::new();
        let node = Node::new(&collector, Key::Finite(7), 3);
        assert!(!node.is_fully_linked());
        assert!(!node.is_marked());
        assert_eq!(node.top_level(), 3);
        assert_eq!(node.key(), Key::Finite(7));
        // One forward slot per level in [0, top_level].
        for level in 0..=3 {
            assert!(node.next(level).is_null());
        }
    }

    #[test]
    fn sentinel_is_published_at_full_height() {
        let collector = Collector::new();
        let head = Node::sentinel(&collector, Key::NegInf);
        assert!(head.is_fully_linked());
        assert!(!head.is_marked());
        assert_eq!(head.top_level(), MAX_LEVEL);
        assert!(head.next(MAX_LEVEL).is_null());
    }

    #[test]
    fn publication_flag_is_sticky() {
        let collector = Collector::new();
        let node = Node::new(&collector, Key::Finite(1), 1);
        node.set_fully_linked();
        assert!(node.is_fully_linked());
        assert!(node.is_fully_linked());
    }

    #[test]
    fn marking_under_lock() {
        let collector = Collector::new();
        let node = Node::new(&collector, Key::Finite(1), 1);
        node.lock();
        node.set_marked();
        // SAFETY: locked just above.
        unsafe { node.unlock() };
        assert!(node.is_marked());
    }

    #[test]
    #[should_panic(expected = "top level")]
    fn zero_top_level_rejected() {
        let collector = Collector::new();
        let _ = Node::new(&collector, Key::Finite(0), 0);
    }

    #[test]
    #[should_panic(expected = "top level")]
    fn oversized_top_level_rejected() {
        let collector = Collector::new();
        let _ = Node::new(&collector, Key::Finite(0), MAX_LEVEL + 1);
    }
}
