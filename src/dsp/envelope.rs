//! Note and drum envelopes.
//!
//! Every stage is a linear ramp whose length in samples is fixed when the
//! envelope is built. A zero sustain ends the envelope after the decay, which
//! is how drum hits finish without a note-off.

/// Stage timings in seconds and the held level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape {
    pub attack: f64,
    pub decay: f64,
    /// Held level in `[0, 1]`. Zero means the envelope ends after decay.
    pub sustain: f64,
    pub release: f64,
}

impl Shape {
    /// Short, click-free shape for the pitched channels.
    pub const TONE: Shape = Shape {
        attack: 0.005,
        decay: 0.08,
        sustain: 0.7,
        release: 0.04,
    };

    /// Near-instant hit that decays to silence over `decay` seconds.
    pub fn drum(decay: f64) -> Shape {
        Shape {
            attack: 0.0005,
            decay,
            sustain: 0.0,
            release: 0.01,
        }
    }

    fn clamped(self) -> Shape {
        Shape {
            attack: self.attack.max(0.0),
            decay: self.decay.max(0.0),
            sustain: self.sustain.clamp(0.0, 1.0),
            release: self.release.max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone)]
pub struct Envelope {
    shape: Shape,
    attack_len: usize,
    decay_len: usize,
    release_len: usize,
    phase: Phase,
    pos: usize,
    /// Level the current ramp started from.
    from: f64,
    level: f64,
}

impl Envelope {
    pub fn new(shape: Shape, sample_rate: f64) -> Self {
        let shape = shape.clamped();
        let samples = |seconds: f64| (seconds * sample_rate) as usize;
        Envelope {
            shape,
            attack_len: samples(shape.attack),
            decay_len: samples(shape.decay),
            release_len: samples(shape.release),
            phase: Phase::Idle,
            pos: 0,
            from: 0.0,
            level: 0.0,
        }
    }

    pub fn tone(sample_rate: f64) -> Self {
        Self::new(Shape::TONE, sample_rate)
    }

    pub fn percussive(sample_rate: f64, decay: f64) -> Self {
        Self::new(Shape::drum(decay), sample_rate)
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Note on. Restarts the attack from wherever the level is now.
    pub fn gate_on(&mut self) {
        self.enter(Phase::Attack);
    }

    /// Note off. Ignored when idle or already releasing.
    pub fn gate_off(&mut self) {
        if !matches!(self.phase, Phase::Idle | Phase::Release) {
            self.enter(Phase::Release);
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        let (len, target) = match self.phase {
            Phase::Idle => {
                self.level = 0.0;
                return self.level;
            }
            Phase::Sustain => {
                self.level = self.shape.sustain;
                return self.level;
            }
            Phase::Attack => (self.attack_len, 1.0),
            Phase::Decay => (self.decay_len, self.shape.sustain),
            Phase::Release => (self.release_len, 0.0),
        };

        if len > 0 {
            self.level = self.from + (target - self.from) * (self.pos as f64 / len as f64);
            self.pos += 1;
        }
        if self.pos >= len {
            self.level = target;
            self.finish_phase();
        }
        self.level
    }

    /// Scale `samples` in place.
    pub fn apply(&mut self, samples: &mut [f32]) {
        for s in samples {
            *s *= self.next_sample() as f32;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.phase == Phase::Release
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.pos = 0;
        self.from = self.level;
    }

    fn finish_phase(&mut self) {
        let next = match self.phase {
            Phase::Attack => Phase::Decay,
            Phase::Decay if self.shape.sustain > 0.0 => Phase::Sustain,
            _ => Phase::Idle,
        };
        self.enter(next);
    }
}
