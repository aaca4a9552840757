//! Seeded randomness. The core never reads an ambient clock or OS RNG
//! — every sampling site takes a `StdRng` built here from an
//! explicit seed, so two runs with the same seed produce bit-identical
//! output.

use rand::rngs::StdRng;
use rand::SeedableRng;

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn same_seed_yields_same_sequence() {
        let mut a = seeded_rng(42);
        let mut b = seeded_rng(42);
        let sample_a: Vec<u32> = (0..10).map(|_| a.random()).collect();
        let sample_b: Vec<u32> = (0..10).map(|_| b.random()).collect();
        assert_eq!(sample_a, sample_b);
    }

    #[test]
    fn different_seeds_yield_different_sequences() {
        let mut a = seeded_rng(1);
        let mut b = seeded_rng(2);
        let sample_a: Vec<u32> = (0..10).map(|_| a.random()).collect();
        let sample_b: Vec<u32> = (0..10).map(|_| b.random()).collect();
        assert_ne!(sample_a, sample_b);
    }
}
