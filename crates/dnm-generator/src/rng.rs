//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Seeded random stream threaded through every generator stage."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! The run owns exactly one [`GeneratorRng`], passed by `&mut` to each stage
//! in a fixed order. Feeder load series and AMI draw from index-derived
//! sub-streams so their output does not depend on how many draws earlier
//! stages consumed within those series.

use rand::prelude::*;
use rand_distr::StandardNormal;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// SplitMix64 finaliser used to derive sub-stream seeds.
pub fn splitmix64(value: u64) -> u64 {
    let mut z = value.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone)]
pub struct GeneratorRng {
    seed: u64,
    inner: StdRng,
}

impl GeneratorRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Independent stream for unit `index`; depends only on the base seed.
    pub fn substream(&self, index: u64) -> Self {
        Self::new(splitmix64(self.seed ^ splitmix64(index)))
    }

    /// Uniform draw in `[low, high)`, or `low` when the interval is empty.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high > low {
            self.inner.gen_range(low..high)
        } else {
            low
        }
    }

    /// Symmetric uniform draw in `[-half_width, half_width)`.
    pub fn jitter(&mut self, half_width: f64) -> f64 {
        self.uniform(-half_width, half_width)
    }

    pub fn chance(&mut self, probability: f64) -> bool {
        self.inner.gen_bool(probability.clamp(0.0, 1.0))
    }

    pub fn between(&mut self, low: u32, high: u32) -> u32 {
        if high > low {
            self.inner.gen_range(low..=high)
        } else {
            low
        }
    }

    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let z: f64 = self.inner.sample(StandardNormal);
        mean + std_dev * z
    }

    /// Log-normal draw parameterised by its median.
    pub fn log_normal(&mut self, median: f64, sigma: f64) -> f64 {
        (median.ln() + sigma * self.normal(0.0, 1.0)).exp()
    }

    pub fn pick<'a, T, const N: usize>(&mut self, items: &'a [T; N]) -> &'a T {
        &items[self.inner.gen_range(0..N)]
    }

    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.inner)
    }

    /// Weighted choice over `(item, weight)` pairs; the last item absorbs
    /// rounding residue.
    pub fn weighted<'a, T, const N: usize>(&mut self, items: &'a [(T, f64); N]) -> &'a T {
        let total: f64 = items.iter().map(|(_, w)| *w).sum();
        let mut target = self.uniform(0.0, total);
        for (item, weight) in items.iter() {
            if target < *weight {
                return item;
            }
            target -= *weight;
        }
        &items[N - 1].0
    }

    /// Sorted sample of `amount` distinct indices out of `length`.
    pub fn sample_indices(&mut self, length: usize, amount: usize) -> Vec<usize> {
        let mut picked =
            rand::seq::index::sample(&mut self.inner, length, amount.min(length)).into_vec();
        picked.sort_unstable();
        picked
    }
}

impl RngCore for GeneratorRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_reproduces_stream() {
        let mut a = GeneratorRng::new(42);
        let mut b = GeneratorRng::new(42);
        let left: Vec<f64> = (0..16).map(|_| a.uniform(0.0, 1.0)).collect();
        let right: Vec<f64> = (0..16).map(|_| b.uniform(0.0, 1.0)).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn substreams_ignore_parent_position() {
        let fresh = GeneratorRng::new(7);
        let mut advanced = GeneratorRng::new(7);
        for _ in 0..100 {
            advanced.next_u64();
        }
        let mut x = fresh.substream(3);
        let mut y = advanced.substream(3);
        assert_eq!(x.next_u64(), y.next_u64());

        let mut other = fresh.substream(4);
        let mut again = fresh.substream(3);
        assert_ne!(other.next_u64(), again.next_u64());
    }

    #[test]
    fn empty_intervals_collapse_to_lower_bound() {
        let mut rng = GeneratorRng::new(1);
        assert_eq!(rng.uniform(2.0, 2.0), 2.0);
        assert_eq!(rng.between(5, 5), 5);
    }

    #[test]
    fn weighted_choice_respects_zero_weights() {
        let mut rng = GeneratorRng::new(9);
        let items = [("never", 0.0), ("always", 1.0)];
        for _ in 0..50 {
            assert_eq!(*rng.weighted(&items), "always");
        }
    }

    #[test]
    fn sample_indices_are_sorted_and_distinct() {
        let mut rng = GeneratorRng::new(11);
        let picked = rng.sample_indices(100, 10);
        assert_eq!(picked.len(), 10);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(rng.sample_indices(3, 10).len(), 3);
    }
}
