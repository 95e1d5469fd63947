//! Endless stimulus sources. Nothing here ever returns `None`; whoever
//! consumes a generator decides when to stop pulling.

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Operand pair for a two-input arithmetic circuit.
pub type StimulusPair = (i64, i64);

/// Number of cycles high, then low.
pub type DutyCycle = (u32, u32);

/// Independent `(a, b)` draws, both uniform in `[low, high]`.
#[derive(Debug, Clone)]
pub struct RangeSampler {
    rng: StdRng,
    dist: Uniform<i64>,
    low: i64,
    high: i64,
}

impl RangeSampler {
    pub fn new(low: i64, high: i64, seed: u64) -> Self {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Self {
            rng: StdRng::seed_from_u64(seed),
            dist: Uniform::new_inclusive(low, high),
            low,
            high,
        }
    }

    /// Restarts the sequence from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn bounds(&self) -> (i64, i64) {
        (self.low, self.high)
    }
}

impl Iterator for RangeSampler {
    type Item = StimulusPair;

    fn next(&mut self) -> Option<Self::Item> {
        let a = self.dist.sample(&mut self.rng);
        let b = self.dist.sample(&mut self.rng);
        Some((a, b))
    }
}

pub const DEFAULT_MAX_CYCLES: u32 = 5;

/// `(on, off)` cycle counts, each uniform in `1..=max`.
#[derive(Debug, Clone)]
pub struct DutyCycleSampler {
    rng: StdRng,
    dist: Uniform<u32>,
}

impl DutyCycleSampler {
    pub fn new(seed: u64) -> Self {
        Self::with_max(DEFAULT_MAX_CYCLES, seed)
    }

    pub fn with_max(max: u32, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            dist: Uniform::new_inclusive(1, max.max(1)),
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

impl Iterator for DutyCycleSampler {
    type Item = DutyCycle;

    fn next(&mut self) -> Option<Self::Item> {
        let on = self.dist.sample(&mut self.rng);
        let off = self.dist.sample(&mut self.rng);
        Some((on, off))
    }
}

/// Repeats a fixed list of items forever. An empty list yields nothing.
#[derive(Debug, Clone)]
pub struct ScriptedSampler<T> {
    items: Vec<T>,
    pos: usize,
}

impl<T: Clone> ScriptedSampler<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, pos: 0 }
    }
}

impl<T: Clone> Iterator for ScriptedSampler<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let item = self.items[self.pos].clone();
        self.pos = (self.pos + 1) % self.items.len();
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_sampler_stays_in_bounds() {
        let draws: Vec<_> = RangeSampler::new(-10, 15, 7).take(500).collect();
        assert!(draws
            .iter()
            .all(|&(a, b)| (-10..=15).contains(&a) && (-10..=15).contains(&b)));
        // both ends show up eventually
        assert!(draws.iter().any(|&(a, _)| a == -10));
        assert!(draws.iter().any(|&(a, _)| a == 15));
    }

    #[test]
    fn same_seed_same_sequence() {
        let a: Vec<_> = RangeSampler::new(0, 100, 3).take(20).collect();
        let b: Vec<_> = RangeSampler::new(0, 100, 3).take(20).collect();
        let c: Vec<_> = RangeSampler::new(0, 100, 4).take(20).collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn reseed_restarts() {
        let mut s = RangeSampler::new(0, 100, 11);
        let first: Vec<_> = s.by_ref().take(5).collect();
        s.reseed(11);
        let again: Vec<_> = s.take(5).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn duty_cycles_are_positive() {
        assert!(DutyCycleSampler::new(1)
            .take(200)
            .all(|(on, off)| (1..=5).contains(&on) && (1..=5).contains(&off)));
    }

    #[test]
    fn scripted_sampler_wraps_around() {
        let s = ScriptedSampler::new(vec![(1, 2), (2, 3)]);
        assert_eq!(s.take(3).collect::<Vec<_>>(), vec![(1, 2), (2, 3), (1, 2)]);
        assert_eq!(ScriptedSampler::<u8>::new(vec![]).next(), None);
    }
}
