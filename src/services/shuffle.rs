// src/services/shuffle.rs

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use uuid::Uuid;

/// Deterministic permutation of `items` for a given seed.
pub fn shuffle<T>(seed: u64, mut items: Vec<T>) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    items
}

/// Seed derived from an attempt id, so one attempt always sees one order.
pub fn seed_for(attempt_id: Uuid) -> u64 {
    let (hi, lo) = attempt_id.as_u64_pair();
    hi ^ lo
}
