//! Concurrent ordered set on an optimistic lazy skip list.
//!
//! # Concurrency model
//!
//! 1. Readers: [`SkipSet::contains`] walks the levels without locks or
//!    retries and filters the match through the publication flags.
//! 2. Writers: [`SkipSet::insert`] and [`SkipSet::remove`] lock only the
//!    affected predecessors, re-validate the unsynchronized traversal under
//!    those locks, and retry from a fresh traversal when validation fails.
//!
//! Linearization points:
//!
//! - successful insert: the `fully_linked` publication write;
//! - successful remove: the `marked` write under the victim's lock;
//! - contains: the flag reads on the matched node;
//! - unsuccessful operations: the corresponding observation.
//!
//! # Memory reclamation
//!
//! Traversals hold no locks, so a node unlinked by one thread may still be
//! referenced by another thread's walk. Every operation pins a
//! [`seize::LocalGuard`]; `remove` retires the victim to the collector, and
//! the memory is freed only after all guards that might reference it are
//! gone. Holding a guard also rules out ABA on the validation pointer
//! compares: a node's address cannot be recycled while any pinned traversal
//! could still observe it.

use std::fmt;
use std::hint;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use seize::{Collector, Guard, LocalGuard};

use crate::key::Key;
use crate::level::{GeometricLevels, LevelGenerator, HEIGHT, MAX_LEVEL};
use crate::node::Node;
use crate::tracing_helpers::{debug_log, trace_log};

use self::locks::{LockedPreds, VictimLock};

mod locks;
mod reclaim;



// ============================================================================
//  SkipSet
// ============================================================================

/// A concurrent ordered set of `i64` keys.
///
/// Every finite `i64` is a valid key; the internal sentinels sit outside the
/// user key space. All operations take `&self` and may be called from any
/// number of threads.
///
/// # Example
///
/// ```rust
/// use lazyskip::SkipSet;
/// use std::sync::Arc;
/// use std::thread;
///
/// let set = Arc::new(SkipSet::new());
/// let handles: Vec<_> = (0..4)
///     .map(|t| {
///         let set = Arc::clone(&set);
///         thread::spawn(move || {
///             for k in 0..100 {
///                 set.insert(t * 100 + k);
///             }
///         })
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
/// assert_eq!(set.len(), 400);
/// ```
pub struct SkipSet {
    head: *mut Node,
    tail: *mut Node,
    collector: Collector,
    levels: Box<dyn LevelGenerator>,
    /// Member count, updated at the linearization points. Approximate while
    /// mutations are in flight, exact at quiescence.
    len: AtomicUsize,
}

// SAFETY: all shared node state is reached through atomic loads or under the
// per-node lock, and node memory stays valid while any operation's collector
// guard is pinned. The raw head/tail pointers are written once at
// construction and freed only in Drop, which takes `&mut self`.
unsafe impl Send for SkipSet {}
// SAFETY: as above; `&SkipSet` operations never hand out references to
// unsynchronized mutable state.
unsafe impl Sync for SkipSet {}

impl SkipSet {
    /// Create an empty set with the default geometric level distribution.
    #[must_use]
    pub fn new() -> Self {
        Self::with_levels(GeometricLevels::default())
    }

    /// Create an empty set drawing node heights from `levels`.
    #[must_use]
    pub fn with_levels(levels: impl LevelGenerator + 'static) -> Self {
        let collector = Collector::new();
        let tail = Box::into_raw(Box::new(Node::sentinel(&collector, Key::PosInf)));
        let head = Box::into_raw(Box::new(Node::sentinel(&collector, Key::NegInf)));

        // SAFETY: freshly allocated above; nothing else can reference them.
        let head_ref = unsafe { &*head };
        for level in 0..HEIGHT {
            head_ref.set_next(level, tail);
        }

        Self {
            head,
            tail,
            collector,
            levels: Box::new(levels),
            len: AtomicUsize::new(0),
        }
    }

    /// Pin a reclamation guard for a batch of `*_with_guard` calls.
    ///
    /// Entering a guard is cheap but not free; loops over many operations
    /// amortize it:
    ///
    /// ```rust
    /// use lazyskip::SkipSet;
    ///
    /// let set = SkipSet::new();
    /// let guard = set.guard();
    /// for k in 0..1000 {
    ///     set.insert_with_guard(k, &guard);
    /// }
    /// ```
    #[must_use]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Number of members. Approximate while mutations are in flight.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    //  Membership test
    // ========================================================================

    /// Whether `key` is a member. Never locks, never retries.
    #[must_use]
    pub fn contains(&self, key: i64) -> bool {
        self.contains_with_guard(key, &self.guard())
    }

    /// [`contains`](Self::contains) under a caller-pinned guard.
    #[must_use]
    pub fn contains_with_guard(&self, key: i64, guard: &LocalGuard<'_>) -> bool {
        let mut preds = [ptr::null_mut(); HEIGHT];
        let mut succs = [ptr::null_mut(); HEIGHT];

        match self.find(Key::Finite(key), &mut preds, &mut succs, guard) {
            Some(layer) => {
                // SAFETY: observed during `find` while `guard` is pinned.
                let node = unsafe { &*succs[layer] };
                // A node is a member iff published and not logically deleted,
                // whatever its physical linkage state.
                node.is_fully_linked() && !node.is_marked()
            }
            None => false,
        }
    }

    // ========================================================================
    //  Insert
    // ========================================================================

    /// Add `key` to the set. Returns `true` iff membership changed.
    pub fn insert(&self, key: i64) -> bool {
        self.insert_with_guard(key, &self.guard())
    }

    /// [`insert`](Self::insert) under a caller-pinned guard.
    pub fn insert_with_guard(&self, key: i64, guard: &LocalGuard<'_>) -> bool {
        let key = Key::Finite(key);
        let mut preds = [ptr::null_mut(); HEIGHT];
        let mut succs = [ptr::null_mut(); HEIGHT];

        loop {
            if let Some(layer) = self.find(key, &mut preds, &mut succs, guard) {
                // SAFETY: observed during `find` while `guard` is pinned.
                let found = unsafe { &*succs[layer] };

                if found.is_marked() {
                    // A deletion of the same key is in flight; its preds are
                    // about to change under us. Re-run the traversal.
                    trace_log!(?key, "insert raced a removal, retrying");
                    continue;
                }

                // Publication may not have completed yet; the key is
                // nevertheless claimed. Wait out the link phase so that a
                // subsequent contains() by this caller sees the member.
                while !found.is_fully_linked() {
                    hint::spin_loop();
                }
                return false;
            }

            let top = self.levels.level().clamp(1, MAX_LEVEL);

            let mut held = LockedPreds::new();
            let mut valid = true;
            for level in 0..=top {
                // SAFETY: observed during `find` while `guard` is pinned.
                let pred = unsafe { &*preds[level] };
                let succ = unsafe { &*succs[level] };

                held.acquire(pred);

                // The unsynchronized traversal is trustworthy only if, under
                // the lock, the window is still intact and neither endpoint
                // is leaving the set.
                valid = !pred.is_marked()
                    && !succ.is_marked()
                    && ptr::eq(pred.next(level), succs[level]);
                if !valid {
                    break;
                }
            }

            if !valid {
                // `held` unlocks on drop; retry from a fresh traversal.
                trace_log!(?key, "insert validation failed, retrying");
                continue;
            }

            let node = Box::into_raw(Box::new(Node::new(&self.collector, key, top)));
            // SAFETY: freshly allocated, unreachable until linked below.
            let node_ref = unsafe { &*node };

            // Two passes, in this order: the new node's own forwards must be
            // complete before any predecessor can route a reader into it.
            for level in 0..=top {
                node_ref.set_next(level, succs[level]);
            }
            for level in 0..=top {
                // SAFETY: locked member of `held`.
                unsafe { &*preds[level] }.set_next(level, node);
            }

            // Linearization point.
            node_ref.set_fully_linked();
            self.len.fetch_add(1, Ordering::Relaxed);
            debug_log!(?key, top, "inserted");

            return true;
        }
    }

    // ========================================================================
    //  Remove
    // ========================================================================

    /// Remove `key` from the set. Returns `true` iff membership changed.
    pub fn remove(&self, key: i64) -> bool {
        self.remove_with_guard(key, &self.guard())
    }

    /// [`remove`](Self::remove) under a caller-pinned guard.
    pub fn remove_with_guard(&self, key: i64, guard: &LocalGuard<'_>) -> bool {
        let key = Key::Finite(key);
        let mut preds = [ptr::null_mut(); HEIGHT];
        let mut succs = [ptr::null_mut(); HEIGHT];

        // Once the victim is marked, its lock is held across retries so no
        // other thread can attempt the physical unlink.
        let mut victim_lock: Option<VictimLock<'_>> = None;
        let mut victim_ptr: *mut Node = ptr::null_mut();
        let mut top = 0;

        loop {
            let layer_found = self.find(key, &mut preds, &mut succs, guard);

            if victim_lock.is_none() {
                let Some(layer) = layer_found else {
                    return false;
                };
                // SAFETY: observed during `find` while `guard` is pinned.
                let candidate = unsafe { &*succs[layer] };

                // The canonical observation of a member is at its own top
                // level; seeing it lower means another thread is mid-insert
                // or mid-unlink on this node.
                if !candidate.is_fully_linked()
                    || candidate.top_level() != layer
                    || candidate.is_marked()
                {
                    return false;
                }

                top = candidate.top_level();
                let lock = VictimLock::acquire(candidate);
                if candidate.is_marked() {
                    // Lost the race to another remover; `lock` drops here.
                    return false;
                }

                // Linearization point: the key leaves the set now, while the
                // node is still physically linked.
                candidate.set_marked();
                self.len.fetch_sub(1, Ordering::Relaxed);
                victim_ptr = succs[layer];
                victim_lock = Some(lock);
            }

            // SAFETY: marked by us above and still locked; the node cannot be
            // retired before this operation unlinks it.
            let victim = unsafe { &*victim_ptr };

            let mut held = LockedPreds::new();
            let mut valid = true;
            for level in 0..=top {
                // SAFETY: observed during `find` while `guard` is pinned.
                let pred = unsafe { &*preds[level] };

                held.acquire(pred);

                valid = !pred.is_marked() && ptr::eq(pred.next(level), victim_ptr);
                if !valid {
                    break;
                }
            }

            if !valid {
                // Release predecessor locks only; the mark and the victim
                // lock persist, and the next traversal recomputes preds.
                trace_log!(?key, "remove validation failed, retrying");
                continue;
            }

            // Top-down, so a reader descending through the victim from a
            // higher level still finds it linked below.
            for level in (0..=top).rev() {
                // SAFETY: locked member of `held`.
                unsafe { &*preds[level] }.set_next(level, victim.next(level));
            }

            // Victim lock first, then predecessors (dropped with `held`).
            drop(victim_lock.take());

            // SAFETY: unlinked from every level, so no new traversal can
            // reach it; concurrent walks are covered by their own guards.
            unsafe { guard.defer_retire(victim_ptr, reclaim::retire_node) };
            debug_log!(?key, top, "removed");

            return true;
        }
    }

    // ========================================================================
    //  Traversal
    // ========================================================================

    /// Multi-level predecessor/successor discovery.
    ///
    /// Walks top-down from the head, filling **every** slot of
    /// `preds`/`succs` (callers index by arbitrary levels up to
    /// `MAX_LEVEL`), and returns the highest level at which a node with
    /// `key` was observed, if any.
    ///
    /// Performs no locking and no validation, and never skips marked nodes;
    /// the returned nodes may be in any lifecycle state. Callers revalidate
    /// under locks before acting.
    fn find(
        &self,
        key: Key,
        preds: &mut [*mut Node; HEIGHT],
        succs: &mut [*mut Node; HEIGHT],
        _guard: &LocalGuard<'_>,
    ) -> Option<usize> {
        let mut layer_found = None;
        let mut pred = self.head;

        for level in (0..HEIGHT).rev() {
            // SAFETY: `pred` is the head or was reached through an Acquire
            // load below; the caller's guard keeps it alive. Containment
            // guarantees `pred` participates at `level`.
            let mut curr = unsafe { &*pred }.next(level);
            loop {
                // SAFETY: forward pointers always lead to the tail or to a
                // node kept alive by the guard.
                let curr_ref = unsafe { &*curr };
                if curr_ref.key() < key {
                    pred = curr;
                    curr = curr_ref.next(level);
                } else {
                    break;
                }
            }

            // SAFETY: as above.
            if layer_found.is_none() && unsafe { &*curr }.key() == key {
                layer_found = Some(level);
            }
            preds[level] = pred;
            succs[level] = curr;
        }

        layer_found
    }

    // ========================================================================
    //  Diagnostics
    // ========================================================================

    /// Walk the whole structure and panic on any violated structural
    /// invariant.
    ///
    /// Quiescent use only: results are meaningless (and the walk unsound in
    /// spirit, though not in memory) while other threads are mutating the
    /// set. Tests call this after joining their workers.
    ///
    /// Checked: per-level strict sortedness; level `l + 1` ⊆ level `l`;
    /// every linked node published and unmarked; the level-0 population
    /// matches [`len`](Self::len).
    pub fn check_invariants(&self) {
        let _guard = self.guard();
        let mut below: Option<Vec<*mut Node>> = None;

        for level in 0..HEIGHT {
            let mut chain = Vec::new();
            // SAFETY: quiescent; every linked node is alive.
            let mut curr = unsafe { &*self.head }.next(level);
            let mut prev_key = Key::NegInf;

            while !ptr::eq(curr, self.tail) {
                // SAFETY: as above.
                let node = unsafe { &*curr };
                assert!(
                    prev_key < node.key(),
                    "level {level}: keys out of order ({prev_key:?} !< {:?})",
                    node.key()
                );
                assert!(
                    node.is_fully_linked() && !node.is_marked(),
                    "level {level}: node {:?} linked but not a member",
                    node.key()
                );
                assert!(
                    node.top_level() >= level,
                    "level {level}: node {:?} linked above its top level {}",
                    node.key(),
                    node.top_level()
                );
                prev_key = node.key();
                chain.push(curr);
                curr = node.next(level);
            }

            if let Some(below) = &below {
                for node in &chain {
                    assert!(
                        below.contains(node),
                        "containment violated: node at level {level} missing from level {}",
                        level - 1
                    );
                }
            } else {
                assert_eq!(
                    chain.len(),
                    self.len(),
                    "level-0 population disagrees with len()"
                );
            }
            below = Some(chain);
        }
    }
}

impl Default for SkipSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SkipSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipSet")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Drop for SkipSet {
    fn drop(&mut self) {
        // Exclusive access: no operation is in flight. Nodes removed earlier
        // were retired to the collector and are freed when it drops; here we
        // free everything still on the level-0 chain, sentinels included.
        let mut curr = self.head;
        while !curr.is_null() {
            // SAFETY: level-0 links partition the remaining live nodes; each
            // is freed exactly once and `next` is read before the free.
            let next = unsafe { &*curr }.next(0);
            // SAFETY: allocated via Box::into_raw in with_levels/insert.
            unsafe { drop(Box::from_raw(curr)) };
            curr = next;
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================
