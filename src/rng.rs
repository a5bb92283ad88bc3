//! Seeded pseudo-random number generators of the aggregator.
//!
//! The aggregator owns one [`AggregatorRng`], seeded once at construction. It holds two
//! independent `ChaCha20` streams derived from the same seed: one for integer-valued draws (e.g.
//! sampling client indices) and one for real-valued draws.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{seq::index, Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

const INT_STREAM: u64 = 0;
const REAL_STREAM: u64 = 1;

/// Resolves an optional seed: non-negative seeds are used as is, absent or negative seeds fall
/// back to the current unix time in seconds.
pub fn resolve_seed(seed: Option<i64>) -> u64 {
    match seed {
        Some(seed) if seed >= 0 => seed as u64,
        _ => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default(),
    }
}

#[derive(Debug, Clone)]
/// A pair of seeded generators for integer and real-valued draws.
pub struct AggregatorRng {
    seed: u64,
    int_rng: ChaCha20Rng,
    real_rng: ChaCha20Rng,
}

impl AggregatorRng {
    /// Creates the generators from an optional seed, see [`resolve_seed()`].
    pub fn new(seed: Option<i64>) -> Self {
        Self::from_seed(resolve_seed(seed))
    }

    /// Creates the generators from a resolved seed.
    pub fn from_seed(seed: u64) -> Self {
        let mut int_rng = ChaCha20Rng::seed_from_u64(seed);
        int_rng.set_stream(INT_STREAM);
        let mut real_rng = ChaCha20Rng::seed_from_u64(seed);
        real_rng.set_stream(REAL_STREAM);
        Self {
            seed,
            int_rng,
            real_rng,
        }
    }

    /// Gets the seed the generators were created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draws an index uniformly from `0..upper`.
    ///
    /// # Panics
    /// Panics if `upper` is zero.
    pub fn gen_index(&mut self, upper: usize) -> usize {
        self.int_rng.gen_range(0..upper)
    }

    /// Draws `amount` distinct indices uniformly from `0..length`, in random order.
    ///
    /// # Panics
    /// Panics if `amount > length`.
    pub fn sample_indices(&mut self, length: usize, amount: usize) -> Vec<usize> {
        index::sample(&mut self.int_rng, length, amount).into_vec()
    }

    /// Draws a real value uniformly from `[0, 1)`.
    pub fn gen_unit(&mut self) -> f64 {
        self.real_rng.gen::<f64>()
    }

    /// Gets the integer-valued generator.
    pub fn int_rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.int_rng
    }

    /// Gets the real-valued generator.
    pub fn real_rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.real_rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_seed() {
        assert_eq!(resolve_seed(Some(0)), 0);
        assert_eq!(resolve_seed(Some(1234)), 1234);

        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let from_negative = resolve_seed(Some(-1));
        let from_none = resolve_seed(None);
        assert!(from_negative >= before);
        assert!(from_none >= before);
    }

    #[test]
    fn test_same_seed_same_streams() {
        let mut rng1 = AggregatorRng::new(Some(42));
        let mut rng2 = AggregatorRng::new(Some(42));
        assert_eq!(rng1.seed(), 42);

        let draws1: Vec<usize> = (0..16).map(|_| rng1.gen_index(1000)).collect();
        let draws2: Vec<usize> = (0..16).map(|_| rng2.gen_index(1000)).collect();
        assert_eq!(draws1, draws2);

        let units1: Vec<f64> = (0..16).map(|_| rng1.gen_unit()).collect();
        let units2: Vec<f64> = (0..16).map(|_| rng2.gen_unit()).collect();
        assert_eq!(units1, units2);
        assert!(units1.iter().all(|u| (0. ..1.).contains(u)));

        assert_eq!(rng1.sample_indices(10, 4), rng2.sample_indices(10, 4));
    }

    #[test]
    fn test_streams_are_independent() {
        // drawing from the real stream must not shift the integer stream
        let mut rng1 = AggregatorRng::from_seed(7);
        let mut rng2 = AggregatorRng::from_seed(7);
        for _ in 0..10 {
            rng1.gen_unit();
        }
        assert_eq!(rng1.gen_index(usize::MAX), rng2.gen_index(usize::MAX));
    }

    #[test]
    fn test_sample_indices() {
        let mut rng = AggregatorRng::from_seed(3);
        let mut indices = rng.sample_indices(10, 10);
        indices.sort_unstable();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
    }
}
