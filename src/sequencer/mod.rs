//! Step sequencing: clock, patterns, pattern generation and the walker that
//! turns the current step into channel events.

pub mod clock;
pub mod generator;
pub mod pattern;

pub use clock::{ManualClock, StepClock, SystemClock, TickSource};
pub use generator::{GenerationMode, PatternGenerator};
pub use pattern::{DrumKind, NoteEvent, Pattern, PatternSet, quantize_step};

use crate::dsp::mixer::ChannelId;

/// Events due on one step, at most one per channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepEvents {
    pub step: usize,
    events: [Option<NoteEvent>; 4],
}

impl StepEvents {
    pub fn get(&self, id: ChannelId) -> Option<&NoteEvent> {
        self.events[id.index()].as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.events.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &NoteEvent)> {
        ChannelId::ALL
            .into_iter()
            .zip(self.events.iter())
            .filter_map(|(id, e)| e.as_ref().map(|e| (id, e)))
    }
}

/// Walks a [`PatternSet`] in time with a [`StepClock`].
#[derive(Debug, Clone)]
pub struct Sequencer {
    clock: StepClock,
}

impl Sequencer {
    pub fn new(clock: StepClock) -> Self {
        Sequencer { clock }
    }

    /// Read every channel's slot at `step` (wrapped into each pattern).
    pub fn step(patterns: &PatternSet, step: usize) -> StepEvents {
        let mut events = StepEvents {
            step,
            ..StepEvents::default()
        };
        for (id, pattern) in patterns.iter() {
            events.events[id.index()] = pattern.get(step).cloned();
        }
        events
    }

    /// If a step boundary has been reached at `now`, return that step's events
    /// and move the clock on.
    pub fn poll(&mut self, patterns: &PatternSet, now: f64) -> Option<StepEvents> {
        if !self.clock.tick(now) {
            return None;
        }
        let events = Self::step(patterns, self.clock.current_step());
        self.clock.advance();
        Some(events)
    }

    pub fn clock(&self) -> &StepClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut StepClock {
        &mut self.clock
    }

    /// Step that will sound next.
    pub fn current_step(&self) -> usize {
        self.clock.current_step()
    }
}
