//! Random level assignment for new nodes.
//!
//! A skip list balances itself probabilistically: each inserted node is
//! promoted to level `l + 1` with probability `p`, so the expected number of
//! nodes participating at level `l` is `N * p^l` and expected traversal work
//! is logarithmic.
//!
//! The default [`GeometricLevels`] generator draws from per-thread RNG state,
//! so concurrent inserters never contend on a shared random source. Custom
//! generators can be plugged in through [`SkipSet::with_levels`]; tests use
//! [`ConstantLevels`] to force degenerate heights.
//!
//! [`SkipSet::with_levels`]: crate::SkipSet::with_levels

use std::cell::RefCell;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Strict upper bound on a node's top level. Sentinels participate at every
/// level in `[0, MAX_LEVEL]`; user nodes draw a top level in `[1, MAX_LEVEL]`.
pub const MAX_LEVEL: usize = 32;

/// Number of level slots, `MAX_LEVEL + 1` (inclusive level convention).
pub(crate) const HEIGHT: usize = MAX_LEVEL + 1;

/// Default promotion probability.
pub const DEFAULT_P: f64 = 0.5;

thread_local! {
    // One RNG per thread; inserters never share random state.
    static LEVEL_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_entropy());
}

/// Source of top levels for newly inserted nodes.
///
/// Implementations must return values in `[1, MAX_LEVEL]` and must be safe
/// to call from many threads at once; any mutable state belongs in
/// thread-local storage.
pub trait LevelGenerator: Send + Sync {
    /// Draw the top level for one new node.
    fn level(&self) -> usize;
}

/// Geometrically distributed levels: `1 +` the number of consecutive
/// Bernoulli(`p`) successes, capped at [`MAX_LEVEL`].
pub struct GeometricLevels {
    p: f64,
}

impl GeometricLevels {
    /// Create a generator with promotion probability `p`.
    ///
    /// # Panics
    ///
    /// Panics unless `p` is in the open interval `(0, 1)`.
    #[must_use]
    pub fn new(p: f64) -> Self {
        assert!(p > 0.0 && p < 1.0, "promotion probability must be in (0, 1)");
        Self { p }
    }
}

impl Default for GeometricLevels {
    fn default() -> Self {
        Self::new(DEFAULT_P)
    }
}

impl LevelGenerator for GeometricLevels {
    fn level(&self) -> usize {
        LEVEL_RNG.with(|rng| {
            let mut rng = rng.borrow_mut();
            let mut level: usize = 1;
            // Cap explicitly; the draw must never exceed MAX_LEVEL.
            while level < MAX_LEVEL && rng.gen_bool(self.p) {
                level += 1;
            }
            level
        })
    }
}

/// Fixed-level generator for tests: always returns the configured level,
/// clamped to `[1, MAX_LEVEL]`. Forcing `MAX_LEVEL` exercises full-height
/// nodes that the geometric draw would produce once in ~2^31 inserts.
pub struct ConstantLevels(pub usize);

impl LevelGenerator for ConstantLevels {
    fn level(&self) -> usize {
        self.0.clamp(1, MAX_LEVEL)
    }
}
