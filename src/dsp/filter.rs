//! One-pole low-pass "warmth" filter.
//!
//! Takes the edge off raw pulse waves. The only state is the previous output
//! sample, so a channel can keep one filter for its whole lifetime.

use std::f64::consts::PI;

/// A single-pole IIR low-pass: `y[n] = y[n-1] + a * (x[n] - y[n-1])`.
#[derive(Debug, Clone)]
pub struct OnePole {
    /// Cutoff frequency in Hz.
    pub cutoff: f64,
    coefficient: f32,
    previous: f32,
    sample_rate: f64,
}

impl OnePole {
    pub fn new(cutoff: f64, sample_rate: f64) -> Self {
        let mut f = OnePole {
            cutoff,
            coefficient: 1.0,
            previous: 0.0,
            sample_rate,
        };
        f.set_cutoff(cutoff);
        f
    }

    /// Set the cutoff; values at or above Nyquist pass the signal unchanged.
    pub fn set_cutoff(&mut self, cutoff: f64) {
        let nyquist = self.sample_rate / 2.0;
        self.cutoff = cutoff.clamp(1.0, nyquist);
        self.coefficient = if self.cutoff >= nyquist {
            1.0
        } else {
            (1.0 - (-2.0 * PI * self.cutoff / self.sample_rate).exp()) as f32
        };
    }

    /// Filter one sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.previous += self.coefficient * (input - self.previous);
        self.previous
    }

    /// Filter a block in place.
    pub fn process_block(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            *s = self.process(*s);
        }
    }

    /// The previous output sample.
    pub fn state(&self) -> f32 {
        self.previous
    }

    pub fn reset(&mut self) {
        self.previous = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_passes_through() {
        let mut f = OnePole::new(2000.0, 44100.0);
        let mut buf = vec![0.5f32; 4410];
        f.process_block(&mut buf);
        assert!((buf[4409] - 0.5).abs() < 1e-4, "DC should settle at input, got {}", buf[4409]);
    }

    #[test]
    fn attenuates_fast_alternation() {
        let mut f = OnePole::new(500.0, 44100.0);
        // Nyquist-rate square: +1, -1, +1, ...
        let mut buf: Vec<f32> = (0..2000).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        f.process_block(&mut buf);
        let peak = buf[1000..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak < 0.1, "high frequencies should be attenuated, peak {peak}");
    }

    #[test]
    fn nyquist_cutoff_is_transparent() {
        let mut f = OnePole::new(1.0e9, 44100.0);
        assert_eq!(f.process(0.3), 0.3);
        assert_eq!(f.process(-0.7), -0.7);
    }

    #[test]
    fn keeps_previous_output_as_state() {
        let mut f = OnePole::new(1000.0, 44100.0);
        let y = f.process(1.0);
        assert_eq!(f.state(), y);
        f.reset();
        assert_eq!(f.state(), 0.0);
    }
}
