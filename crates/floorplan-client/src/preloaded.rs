//! Example plans offered to users who have nothing to upload.

use rand::Rng;
use rand::seq::SliceRandom;

/// How many examples are offered at once.
pub const EXAMPLES_SHOWN: usize = 3;

/// Shuffle `plans` and keep at most [`EXAMPLES_SHOWN`] of them.
pub fn pick_preloaded<T, R: Rng + ?Sized>(mut plans: Vec<T>, rng: &mut R) -> Vec<T> {
    plans.shuffle(rng);
    plans.truncate(EXAMPLES_SHOWN);
    plans
}
