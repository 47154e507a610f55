//! Reclaim callback for seize-based deferred reclamation.

use seize::Link;

use crate::node::Node;

/// Free a node allocated via `Box::into_raw` (seize callback).
///
/// # Safety
///
/// - `link` must point to the `Link` embedded in a valid `Node` produced by
///   `Box::into_raw`.
/// - Must only be called once seize determines no guard can still reference
///   the node.
pub(super) unsafe fn retire_node(link: *mut Link) {
    // SAFETY: caller guarantees provenance and that no readers remain; `Node`
    // is `#[repr(C)]` with `link` as its first field.
    let ptr: *mut Node = Link::cast(link);
    // SAFETY: caller guarantees provenance and that no readers remain.
    unsafe { drop(Box::from_raw(ptr)) };
}
