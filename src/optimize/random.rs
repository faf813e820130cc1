use indexmap::IndexMap;
use rand::seq::SliceRandom;
use std::hash::Hash;

use crate::splits::SplitSpec;
use crate::types::SplitName;

#[derive(Debug, Clone)]
/// Small deterministic RNG used for reproducible random splits.
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    /// Seeded generator.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl rand::RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64_internal().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Shuffle `items` with `seed` and cut the shuffled order into consecutive
/// runs sized by the split fractions. The last split takes the remainder.
///
/// The result is keyed in input order.
pub fn random_split<T>(items: &[T], splits: &SplitSpec, seed: u64) -> IndexMap<T, SplitName>
where
    T: Clone + Hash + Eq,
{
    let n = items.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut DeterministicRng::new(seed));

    let mut split_at = vec![0usize; n];
    let mut cumulative = 0.0;
    let mut start = 0usize;
    for split in 0..splits.len() {
        cumulative += splits.fractions()[split];
        let end = if split + 1 == splits.len() {
            n
        } else {
            ((cumulative * n as f64).round() as usize).min(n)
        };
        for &idx in &order[start.min(end)..end] {
            split_at[idx] = split;
        }
        start = end.max(start);
    }
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| (item.clone(), splits.name(split_at[idx]).to_string()))
        .collect()
}
