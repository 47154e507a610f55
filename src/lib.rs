//! # lazyskip
//!
//! A concurrent ordered set of `i64` keys backed by a lazy skip list.
//!
//! The set supports three operations, [`SkipSet::insert`],
//! [`SkipSet::remove`], and [`SkipSet::contains`], callable from any number
//! of threads on a shared instance.
//!
//! ## Design
//!
//! - Lookups: lock-free; a single top-down traversal plus two flag reads.
//! - Updates: fine-grained locking of the affected predecessors only, with
//!   optimistic validation and retry.
//! - Membership is published through a pair of atomic flags (`fully_linked`,
//!   `marked`) so readers never observe a half-inserted or half-unlinked
//!   node as a live member.
//! - Memory reclamation: removed nodes are retired through a [`seize`]
//!   collector, so unsynchronized traversals never touch freed memory.
//!
//! ## Example
//!
//! ```rust
//! use lazyskip::SkipSet;
//!
//! let set = SkipSet::new();
//! assert!(set.insert(3));
//! assert!(set.contains(3));
//! assert!(!set.insert(3));
//! assert!(set.remove(3));
//! assert!(!set.contains(3));
//! ```

mod key;
pub mod level;
mod list;
mod node;
mod tracing_helpers;

pub use level::{ConstantLevels, GeometricLevels, LevelGenerator, MAX_LEVEL};
pub use list::SkipSet;

// Guards appear in the `*_with_guard` signatures.
pub use seize::{Guard, LocalGuard};
