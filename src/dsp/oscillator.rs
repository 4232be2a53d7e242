//! Chiptune oscillators: pulse, triangle and LFSR noise.
//!
//! These are deliberately naive (not band-limited). The aliasing at high
//! pitches is part of the 8-bit character the sequencer is after.

/// Peak level of the pulse and triangle waves.
pub const TONE_LEVEL: f32 = 0.5;
/// Peak level of the noise channel.
pub const NOISE_LEVEL: f32 = 0.2;

/// Default LFSR register value after a reset.
pub const LFSR_SEED: u16 = 0x0001;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// Pulse wave; `duty` is the fraction of the period spent high.
    Square { duty: f32 },
    Triangle,
    /// 16-bit LFSR noise, clocked once every `period` samples.
    Noise { period: u8 },
}

/// A single oscillator with persistent phase (or LFSR) state.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    phase: f64,
    sample_rate: f64,
    lfsr: u16,
    seed: u16,
    counter: u8,
    noise_level: f32,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        let waveform = match waveform {
            Waveform::Square { duty } => Waveform::Square {
                duty: duty.clamp(0.0, 1.0),
            },
            Waveform::Noise { period } => Waveform::Noise {
                period: period.clamp(1, 16),
            },
            other => other,
        };
        let mut osc = Oscillator {
            waveform,
            phase: 0.0,
            sample_rate,
            lfsr: LFSR_SEED,
            seed: LFSR_SEED,
            counter: 0,
            noise_level: 0.0,
        };
        osc.reset();
        osc
    }

    pub fn square(duty: f32, sample_rate: f64) -> Self {
        Self::new(Waveform::Square { duty }, sample_rate)
    }

    pub fn triangle(sample_rate: f64) -> Self {
        Self::new(Waveform::Triangle, sample_rate)
    }

    pub fn noise(period: u8, sample_rate: f64) -> Self {
        Self::new(Waveform::Noise { period }, sample_rate)
    }

    /// Seed the noise register. A zero register would lock the LFSR, so zero
    /// is replaced by the default seed.
    pub fn with_seed(mut self, seed: u16) -> Self {
        self.seed = if seed == 0 { LFSR_SEED } else { seed };
        self.reset();
        self
    }

    pub fn is_noise(&self) -> bool {
        matches!(self.waveform, Waveform::Noise { .. })
    }

    /// Change the pulse width. Ignored for non-pulse waveforms.
    pub fn set_duty(&mut self, duty: f32) {
        if let Waveform::Square { duty: d } = &mut self.waveform {
            *d = duty.clamp(0.0, 1.0);
        }
    }

    /// Change the noise clock divider (1..=16). Ignored for pitched waveforms.
    pub fn set_period(&mut self, period: u8) {
        if let Waveform::Noise { period: p } = &mut self.waveform {
            *p = period.clamp(1, 16);
        }
    }

    /// Current phase in `[0, 1)`.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Current LFSR register.
    pub fn register(&self) -> u16 {
        self.lfsr
    }

    /// Generate `num_samples` samples at `frequency` Hz.
    ///
    /// Pitched waveforms return silence for a non-positive (or non-finite)
    /// frequency. Noise ignores the frequency entirely.
    pub fn generate(&mut self, frequency: f64, num_samples: usize) -> Vec<f32> {
        let mut out = vec![0.0; num_samples];
        self.generate_into(frequency, &mut out);
        out
    }

    /// Like [`generate`](Self::generate) but writes into an existing buffer.
    pub fn generate_into(&mut self, frequency: f64, out: &mut [f32]) {
        match self.waveform {
            Waveform::Noise { period } => {
                for s in out.iter_mut() {
                    *s = self.next_noise(period);
                }
            }
            Waveform::Square { .. } | Waveform::Triangle => {
                if !(frequency > 0.0 && frequency.is_finite()) {
                    out.fill(0.0);
                    return;
                }
                let inc = frequency / self.sample_rate;
                for s in out.iter_mut() {
                    *s = self.pitched_sample();
                    self.phase += inc;
                    // Wrap every sample so a mid-buffer pitch change stays continuous.
                    self.phase -= self.phase.floor();
                }
            }
        }
    }

    fn pitched_sample(&self) -> f32 {
        let p = self.phase;
        match self.waveform {
            Waveform::Square { duty } => {
                if p < duty as f64 {
                    TONE_LEVEL
                } else {
                    -TONE_LEVEL
                }
            }
            Waveform::Triangle => {
                let value = if p < 0.25 {
                    4.0 * p
                } else if p < 0.75 {
                    2.0 - 4.0 * p
                } else {
                    4.0 * p - 4.0
                };
                value as f32 * TONE_LEVEL
            }
            Waveform::Noise { .. } => 0.0,
        }
    }

    fn next_noise(&mut self, period: u8) -> f32 {
        if self.counter >= period {
            self.clock_lfsr();
            self.counter = 0;
        }
        self.counter += 1;
        self.noise_level
    }

    /// Clock the shift register once: feedback from taps 0 and 1 into bit 15.
    fn clock_lfsr(&mut self) {
        let feedback = (self.lfsr & 0x0001) ^ ((self.lfsr >> 1) & 0x0001);
        self.lfsr = (self.lfsr >> 1) | (feedback << 15);
        self.noise_level = Self::level_for(self.lfsr);
    }

    fn level_for(register: u16) -> f32 {
        if register & 0x0001 != 0 {
            NOISE_LEVEL
        } else {
            -NOISE_LEVEL
        }
    }

    /// Reset phase and noise state.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.lfsr = self.seed;
        self.counter = 0;
        self.noise_level = Self::level_for(self.seed);
    }
}
