//! Compressor — feed-forward envelope follower on the mixed signal.
//!
//! Threshold is linear amplitude rather than dB: the mix is already
//! soft-clipped into [-1, 1], so the numbers stay readable.

use serde::{Deserialize, Serialize};

/// Compressor settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    /// Linear threshold (0, 1].
    pub threshold: f32,
    /// Compression ratio (e.g. 4.0 = 4:1).
    pub ratio: f32,
    /// Attack time in seconds.
    pub attack: f64,
    /// Release time in seconds.
    pub release: f64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            ratio: 4.0,
            attack: 0.003,
            release: 0.1,
        }
    }
}

/// A mono dynamics compressor with persistent envelope state.
#[derive(Debug, Clone)]
pub struct Compressor {
    sample_rate: f64,
    pub config: CompressorConfig,
    attack_coef: f32,
    release_coef: f32,
    envelope: f32,
}

impl Compressor {
    /// Create a new compressor with default settings.
    pub fn new(sample_rate: f64) -> Self {
        Self::with_config(sample_rate, CompressorConfig::default())
    }

    pub fn with_config(sample_rate: f64, config: CompressorConfig) -> Self {
        let config = CompressorConfig {
            threshold: config.threshold.clamp(0.01, 1.0),
            ratio: config.ratio.max(1.0),
            attack: config.attack.clamp(0.0001, 1.0),
            release: config.release.clamp(0.001, 5.0),
        };
        Self {
            sample_rate,
            config,
            attack_coef: Self::coefficient(config.attack, sample_rate),
            release_coef: Self::coefficient(config.release, sample_rate),
            envelope: 0.0,
        }
    }

    fn coefficient(seconds: f64, sample_rate: f64) -> f32 {
        (-1.0 / (seconds * sample_rate)).exp() as f32
    }

    /// Process one sample.
    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let level = input.abs();
        let coef = if level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = level + (self.envelope - level) * coef;
        input * self.gain()
    }

    /// Process a block in place. Envelope state carries over between calls.
    pub fn process(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            *s = self.process_sample(*s);
        }
    }

    /// Current gain from the envelope.
    fn gain(&self) -> f32 {
        let t = self.config.threshold;
        if self.envelope > t {
            (t + (self.envelope - t) / self.config.ratio) / self.envelope
        } else {
            1.0
        }
    }

    /// Current gain reduction as a factor in (0, 1] (for metering).
    pub fn gain_reduction(&self) -> f32 {
        self.gain()
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Reset the compressor state.
    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}
