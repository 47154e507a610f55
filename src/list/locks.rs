//! RAII guards for the fine-grained locking discipline.
//!
//! Both `insert` and `remove` lock a run of predecessors bottom-up, and both
//! have several exit paths (success, validation failure, unwind). The guards
//! here make every path release every acquired lock exactly once.
//!
//! The per-node locks are non-reentrant, and the same node can serve as
//! predecessor at several levels, so [`LockedPreds::acquire`] deduplicates
//! against the full set of nodes already held. Checking only the previous
//! level is not enough: an unsynchronized traversal can hand back repeated
//! predecessors at non-adjacent levels.

use std::ptr;

use crate::node::Node;

/// The set of predecessor locks held by one locking loop.
///
/// Dropping the guard releases every held lock, in reverse acquisition
/// order, exactly once, including during panic unwinding.
#[must_use = "dropping immediately would release the predecessor locks"]
pub(super) struct LockedPreds<'a> {
    held: Vec<&'a Node>,
}

impl<'a> LockedPreds<'a> {
    pub(super) fn new() -> Self {
        Self {
            // Geometric heights make runs of more than a few distinct
            // predecessors rare.
            held: Vec::with_capacity(4),
        }
    }

    /// Lock `node` unless this guard already holds it.
    pub(super) fn acquire(&mut self, node: &'a Node) {
        if self.held.iter().any(|&h| ptr::eq(h, node)) {
            return;
        }
        node.lock();
        self.held.push(node);
    }
}

impl Drop for LockedPreds<'_> {
    fn drop(&mut self) {
        for node in self.held.drain(..).rev() {
            // SAFETY: locked by `acquire` on this thread and released only
            // here.
            unsafe { node.unlock() };
        }
    }
}

/// Lock on a removal victim, held from logical deletion until after the
/// physical unlink (across any number of validation retries).
#[must_use = "dropping immediately would release the victim lock"]
pub(super) struct VictimLock<'a> {
    node: &'a Node,
}

impl<'a> VictimLock<'a> {
    /// Block until `node`'s lock is held and wrap it.
    pub(super) fn acquire(node: &'a Node) -> Self {
        node.lock();
        Self { node }
    }
}

impl Drop for VictimLock<'_> {
    fn drop(&mut self) {
        // SAFETY: locked in `acquire` on this thread and released only here.
        unsafe { self.node.unlock() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use seize::Collector;

    #[test]
    fn duplicate_acquire_is_idempotent() {
        let collector = Collector::new();
        let node = Node::new(&collector, Key::Finite(1), 3);
        let mut held = LockedPreds::new();
        held.acquire(&node);
        // A non-reentrant lock would deadlock here without deduplication.
        held.acquire(&node);
        held.acquire(&node);
        drop(held);

        // Released exactly once: the lock is free again.
        node.lock();
        // SAFETY: locked just above.
        unsafe { node.unlock() };
    }

    #[test]
    fn drop_releases_all() {
        let collector = Collector::new();
        let a = Node::new(&collector, Key::Finite(1), 1);
        let b = Node::new(&collector, Key::Finite(2), 1);
        {
            let mut held = LockedPreds::new();
            held.acquire(&a);
            held.acquire(&b);
        }
        a.lock();
        b.lock();
        // SAFETY: locked just above.
        unsafe {
            a.unlock();
            b.unlock();
        }
    }

    #[test]
    fn victim_lock_releases_on_drop() {
        let collector = Collector::new();
        let node = Node::new(&collector, Key::Finite(1), 1);
        drop(VictimLock::acquire(&node));
        node.lock();
        // SAFETY: locked just above.
        unsafe { node.unlock() };
    }
}
