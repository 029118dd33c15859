//! Seeded train/test split.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of each side of a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with `seed` and cut off `ceil(n * test_fraction)` rows
/// for testing, keeping at least one row on each side.
///
/// Returns `None` when `n < 2`.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Option<Split> {
    if n < 2 {
        return None;
    }
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let wanted = (n as f64 * test_fraction).ceil() as usize;
    let n_test = wanted.clamp(1, n - 1);
    let train = indices.split_off(n_test);
    Some(Split {
        train,
        test: indices,
    })
}
