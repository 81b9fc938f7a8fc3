//! Index-pool shuffling used by unique-scope row selection.
use rand::seq::SliceRandom;
use rand::Rng;

/// Shuffle `items` in place.
pub fn shuffle_in_place<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    items.shuffle(rng);
}

/// Splice a uniformly random index out of `pool`, preserving the relative
/// order of the remaining elements.
pub fn take_random<T, R: Rng + ?Sized>(pool: &mut Vec<T>, rng: &mut R) -> Option<T> {
    if pool.is_empty() {
        return None;
    }
    let idx = rng.random_range(0..pool.len());
    Some(pool.remove(idx))
}
