//! Biquad filter: Matches WebAudio BiquadFilterNode coefficients.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Filter response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
}

/// A biquad IIR filter (2nd order).
///
/// Direct Form II Transposed, coefficients from the Audio EQ Cookbook
/// (Robert Bristow-Johnson). Cutoff and Q may change every sample; the
/// coefficients are only recomputed when they actually do.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub kind: FilterKind,
    cutoff: f64,
    q: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
}

impl BiquadFilter {
    pub fn new(kind: FilterKind, cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            kind,
            cutoff,
            q,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        };
        f.update_coefficients();
        f
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    /// Move cutoff and Q, recomputing coefficients if either changed.
    pub fn set_params(&mut self, cutoff: f64, q: f64) {
        if cutoff != self.cutoff || q != self.q {
            self.cutoff = cutoff;
            self.q = q;
            self.update_coefficients();
        }
    }

    fn update_coefficients(&mut self) {
        let nyquist = self.sample_rate / 2.0;
        let freq = self.cutoff.clamp(10.0, nyquist * 0.99);
        let q = self.q.max(1e-3);
        let w0 = 2.0 * PI * freq / self.sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2) = match self.kind {
            FilterKind::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterKind::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0)
            }
            FilterKind::Bandpass => (alpha, 0.0, -alpha),
            FilterKind::Notch => (1.0, -2.0 * cos_w0, 1.0),
        };
        let a0 = 1.0 + alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = -2.0 * cos_w0 / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    /// Process a single sample.
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_passes_dc() {
        let mut f = BiquadFilter::new(FilterKind::Lowpass, 5000.0, 0.707, 44100.0);
        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!((output - 1.0).abs() < 0.001, "Lowpass should pass DC, got {output}");
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut f = BiquadFilter::new(FilterKind::Highpass, 1000.0, 0.707, 44100.0);
        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!(output.abs() < 0.001, "Highpass should block DC, got {output}");
    }

    #[test]
    fn bandpass_attenuates_far_frequencies() {
        let mut f = BiquadFilter::new(FilterKind::Bandpass, 2000.0, 5.0, 44100.0);
        let mut max_out = 0.0_f64;
        for i in 0..4410 {
            let t = i as f64 / 44100.0;
            let out = f.process((2.0 * PI * 100.0 * t).sin());
            if i > 1000 {
                max_out = max_out.max(out.abs());
            }
        }
        assert!(max_out < 0.05, "Bandpass@2k should reject 100 Hz, got {max_out}");
    }

    #[test]
    fn stable_at_max_q_with_sweeping_cutoff() {
        let mut f = BiquadFilter::new(FilterKind::Bandpass, 300.0, 15.0, 44100.0);
        for i in 0..20000 {
            let cutoff = 300.0 + i as f64 * 0.2;
            f.set_params(cutoff, 15.0);
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let out = f.process(input);
            assert!(out.is_finite() && out.abs() < 100.0, "unstable at sample {i}: {out}");
        }
    }

    #[test]
    fn set_params_is_lazy() {
        let mut f = BiquadFilter::new(FilterKind::Notch, 1000.0, 1.0, 44100.0);
        let before = f.b0;
        f.set_params(1000.0, 1.0);
        assert_eq!(f.b0, before);
        f.set_params(2000.0, 1.0);
        assert_ne!(f.b0, before);
    }
}
