//! White-noise source backed by a one-shot buffer.
//!
//! Each buffer is filled from its own RNG when it is created and is never
//! handed to a second playback, so overlapping plays of the same sound never
//! share sample content.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A buffer of independent uniform samples in [-1, 1].
#[derive(Debug, Clone)]
pub struct NoiseBuffer {
    samples: Vec<f64>,
    position: usize,
}

impl NoiseBuffer {
    /// Fill `duration * sample_rate` samples from fresh entropy.
    pub fn new(duration: f64, sample_rate: f64) -> Self {
        Self::fill(duration, sample_rate, StdRng::from_entropy())
    }

    /// Deterministic buffer for tests.
    pub fn with_seed(duration: f64, sample_rate: f64, seed: u64) -> Self {
        Self::fill(duration, sample_rate, StdRng::seed_from_u64(seed))
    }

    fn fill(duration: f64, sample_rate: f64, mut rng: StdRng) -> Self {
        let len = (duration.max(0.0) * sample_rate).round() as usize;
        let samples = (0..len).map(|_| rng.gen_range(-1.0..=1.0)).collect();
        NoiseBuffer { samples, position: 0 }
    }

    /// Next sample, or silence once the buffer is exhausted.
    pub fn next_sample(&mut self) -> f64 {
        match self.samples.get(self.position) {
            Some(&s) => {
                self.position += 1;
                s
            }
            None => 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.samples.len()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_matches_duration() {
        let n = NoiseBuffer::new(0.03, 44100.0);
        assert_eq!(n.len(), 1323);
    }

    #[test]
    fn samples_in_range() {
        let n = NoiseBuffer::with_seed(0.1, 44100.0, 7);
        assert!(n.samples().iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn fresh_buffers_differ() {
        let a = NoiseBuffer::new(0.01, 44100.0);
        let b = NoiseBuffer::new(0.01, 44100.0);
        assert_ne!(a.samples(), b.samples(), "two buffers should not share content");
    }

    #[test]
    fn silent_after_end() {
        let mut n = NoiseBuffer::with_seed(0.0001, 44100.0, 1);
        for _ in 0..n.len() {
            n.next_sample();
        }
        assert!(n.is_exhausted());
        assert_eq!(n.next_sample(), 0.0);
    }
}
