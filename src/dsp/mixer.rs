//! Mixer: Sums every live instance into one output block.

/// A summing block buffer with master gain and soft clipping.
#[derive(Debug, Clone)]
pub struct Mixer {
    pub master_gain: f64,
    buffer: Vec<f64>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Mixer {
    pub fn new(master_gain: f64) -> Self {
        Mixer {
            master_gain,
            buffer: Vec::new(),
        }
    }

    /// Prepare a buffer of `num_samples` filled with zeros.
    pub fn clear(&mut self, num_samples: usize) {
        self.buffer.clear();
        self.buffer.resize(num_samples, 0.0);
    }

    /// Raw buffer for sources to add into.
    pub fn buffer_mut(&mut self) -> &mut [f64] {
        &mut self.buffer
    }

    /// The mixed block as f32 sink frames, with master gain and soft
    /// clipping applied.
    pub fn output(&self) -> Vec<f32> {
        self.buffer
            .iter()
            .map(|&s| soft_clip(s * self.master_gain) as f32)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Level below which the mix passes through untouched.
const KNEE: f64 = 0.5;

/// Unity below [`KNEE`], tanh-shaped above it so the mix approaches but
/// never reaches full scale. Value and slope are continuous at the knee.
fn soft_clip(x: f64) -> f64 {
    let level = x.abs();
    if level <= KNEE {
        return x;
    }
    let headroom = 1.0 - KNEE;
    x.signum() * (KNEE + headroom * ((level - KNEE) / headroom).tanh())
}
