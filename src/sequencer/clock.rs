//! Step clock: turns tempo and swing into sixteenth-note boundaries.
//!
//! The clock does not own time. Callers pass a timestamp (seconds on any
//! monotonic axis) to [`StepClock::tick`], usually read from a [`TickSource`].

use std::cell::Cell;
use std::time::Instant;

/// Default swing ratio (67/33 feel).
pub const DEFAULT_SWING_RATIO: f64 = 0.67;

/// A monotonic time source in seconds.
pub trait TickSource {
    fn now(&self) -> f64;
}

/// Wall-clock seconds since construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to. Used for offline rendering and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        ManualClock {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }
}

impl TickSource for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// Sixteenth-note step counter with swing and drift correction.
#[derive(Debug, Clone)]
pub struct StepClock {
    tempo: u32,
    step_duration: f64,
    current_step: usize,
    last_boundary: f64,
    first_tick_pending: bool,
    swing: bool,
    swing_ratio: f64,
    total_steps: usize,
    steps_per_bar: usize,
}

impl StepClock {
    pub fn new(tempo: u32, total_steps: usize) -> Self {
        let mut clock = StepClock {
            tempo: 120,
            step_duration: 0.125,
            current_step: 0,
            last_boundary: 0.0,
            first_tick_pending: true,
            swing: false,
            swing_ratio: DEFAULT_SWING_RATIO,
            total_steps: total_steps.max(1),
            steps_per_bar: 16,
        };
        clock.set_tempo(tempo);
        clock
    }

    /// Arm the clock; the first [`tick`](Self::tick) fires immediately.
    pub fn start(&mut self, now: f64) {
        self.last_boundary = now;
        self.first_tick_pending = true;
    }

    /// Rewind to step 0 and re-arm at `now`.
    pub fn reset(&mut self, now: f64) {
        self.current_step = 0;
        self.start(now);
    }

    /// Returns true when a step boundary has been crossed at `now`.
    ///
    /// The boundary advances by exactly one step duration so rounding does not
    /// accumulate. If the caller has fallen more than two steps behind, the
    /// boundary jumps to `now` instead of replaying the backlog.
    pub fn tick(&mut self, now: f64) -> bool {
        if self.first_tick_pending {
            self.first_tick_pending = false;
            self.last_boundary = now;
            return true;
        }

        let expected = self.current_step_duration();
        let elapsed = now - self.last_boundary;
        if elapsed < expected {
            return false;
        }
        if elapsed > expected * 2.0 {
            self.last_boundary = now;
        } else {
            self.last_boundary += expected;
        }
        true
    }

    /// Move to the next step, wrapping at the loop length.
    pub fn advance(&mut self) {
        self.current_step = (self.current_step + 1) % self.total_steps;
    }

    pub fn set_tempo(&mut self, bpm: u32) {
        self.tempo = bpm.max(1);
        self.step_duration = (60.0 / self.tempo as f64) / 4.0;
    }

    pub fn set_swing(&mut self, enabled: bool) {
        self.swing = enabled;
    }

    pub fn set_swing_ratio(&mut self, ratio: f64) {
        self.swing_ratio = ratio.clamp(0.0, 2.0);
    }

    pub fn set_total_steps(&mut self, total: usize) {
        self.total_steps = total.max(1);
        self.current_step %= self.total_steps;
    }

    pub fn set_steps_per_bar(&mut self, steps: usize) {
        self.steps_per_bar = steps.max(1);
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn steps_per_bar(&self) -> usize {
        self.steps_per_bar
    }

    pub fn swing(&self) -> bool {
        self.swing
    }

    /// Unswung sixteenth duration in seconds.
    pub fn step_duration(&self) -> f64 {
        self.step_duration
    }

    /// Duration of the current step with swing applied. Odd steps are
    /// lengthened and even steps shortened so each pair sums to two steps.
    pub fn current_step_duration(&self) -> f64 {
        if !self.swing {
            return self.step_duration;
        }
        if self.current_step % 2 == 1 {
            self.step_duration * (2.0 - self.swing_ratio)
        } else {
            self.step_duration * self.swing_ratio
        }
    }

    pub fn last_boundary(&self) -> f64 {
        self.last_boundary
    }

    /// `(bar, step within bar)` of the current step.
    pub fn bar_position(&self) -> (usize, usize) {
        (
            self.current_step / self.steps_per_bar,
            self.current_step % self.steps_per_bar,
        )
    }

    /// True when the current step starts a bar.
    pub fn is_bar_start(&self) -> bool {
        self.current_step % self.steps_per_bar == 0
    }
}
