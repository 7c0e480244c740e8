//! Engine configuration supplied by the host.

use serde::{Deserialize, Serialize};

/// Host-facing engine settings.
///
/// Every field has a default, so a host may send a partial JSON object
/// (`{"sampleRate": 48000}`) and get sensible values for the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Output sample rate in Hz. Inherited by every graph and by WAV export.
    pub sample_rate: u32,
    /// Bit depth of exported WAV files. Only 16 is written.
    pub bits_per_sample: u16,
    /// Frames rendered per `render_block` call by the offline renderer.
    pub block_size: usize,
    /// Maximum number of simultaneously live instances.
    pub max_instances: usize,
    /// Post-mix gain [0, 1] applied before soft clipping.
    pub master_gain: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44_100,
            bits_per_sample: 16,
            // WebAudio render quantum
            block_size: 128,
            max_instances: 32,
            master_gain: 1.0,
        }
    }
}

impl EngineConfig {
    /// Config with a custom sample rate and defaults elsewhere.
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        EngineConfig {
            sample_rate,
            ..Self::default()
        }
    }

    /// Clamp fields into workable ranges.
    pub fn sanitized(mut self) -> Self {
        self.sample_rate = self.sample_rate.clamp(8_000, 192_000);
        self.bits_per_sample = 16;
        self.block_size = self.block_size.clamp(1, 8192);
        self.max_instances = self.max_instances.max(1);
        self.master_gain = if self.master_gain.is_finite() {
            self.master_gain.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self
    }

    pub fn sample_rate_f64(&self) -> f64 {
        self.sample_rate as f64
    }
}
