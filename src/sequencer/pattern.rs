//! Step patterns: fixed-length slot sequences, one per channel.

use crate::dsp::mixer::ChannelId;
use crate::theory::note::{
    A4_TUNING, frequency_to_midi, midi_to_frequency, midi_to_note_name, note_to_midi,
    semitone_ratio,
};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Sixteenth-note steps per bar of pattern storage.
pub const STEPS_PER_BAR: usize = 16;

/// Steps per beat (one quarter note).
pub const STEPS_PER_BEAT: usize = 4;

/// Percussion voices on the noise channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrumKind {
    Kick,
    Snare,
    HiHat,
}

impl DrumKind {
    /// Noise clock divider; longer periods sound lower.
    pub fn noise_period(self) -> u8 {
        match self {
            DrumKind::Kick => 15,
            DrumKind::Snare => 4,
            DrumKind::HiHat => 1,
        }
    }

    /// Envelope decay time in seconds.
    pub fn decay(self) -> f64 {
        match self {
            DrumKind::Kick => 0.12,
            DrumKind::Snare => 0.07,
            DrumKind::HiHat => 0.03,
        }
    }
}

/// One slot's content. Events are never mutated after placement; edits
/// replace the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NoteEvent {
    Tone {
        frequency: f64,
        note: String,
        /// MIDI-style velocity, 0..=127.
        velocity: u8,
        duration_beats: f64,
    },
    Drum {
        drum: DrumKind,
        noise_period: u8,
        velocity: u8,
        duration_beats: f64,
    },
}

impl NoteEvent {
    pub fn tone(frequency: f64, note: impl Into<String>, velocity: u8, duration_beats: f64) -> Self {
        NoteEvent::Tone {
            frequency,
            note: note.into(),
            velocity: velocity.min(127),
            duration_beats,
        }
    }

    /// A tone from a note name such as `"A4"`. Unknown names yield `None`.
    pub fn named(note: &str, velocity: u8, duration_beats: f64) -> Option<Self> {
        let midi = note_to_midi(note)?;
        Some(NoteEvent::tone(
            midi_to_frequency(midi, A4_TUNING),
            midi_to_note_name(midi),
            velocity,
            duration_beats,
        ))
    }

    pub fn drum(drum: DrumKind, velocity: u8, duration_beats: f64) -> Self {
        NoteEvent::Drum {
            drum,
            noise_period: drum.noise_period(),
            velocity: velocity.min(127),
            duration_beats,
        }
    }

    pub fn velocity(&self) -> u8 {
        match self {
            NoteEvent::Tone { velocity, .. } | NoteEvent::Drum { velocity, .. } => *velocity,
        }
    }

    /// Velocity scaled to `0..=1`.
    pub fn gain(&self) -> f32 {
        self.velocity() as f32 / 127.0
    }

    pub fn duration_beats(&self) -> f64 {
        match self {
            NoteEvent::Tone { duration_beats, .. } | NoteEvent::Drum { duration_beats, .. } => {
                *duration_beats
            }
        }
    }

    pub fn is_tone(&self) -> bool {
        matches!(self, NoteEvent::Tone { .. })
    }

    /// Display label: the note name, or the drum name.
    pub fn label(&self) -> String {
        match self {
            NoteEvent::Tone { note, .. } => note.clone(),
            NoteEvent::Drum { drum, .. } => format!("{drum:?}").to_ascii_lowercase(),
        }
    }

    /// Copy of this event shifted by `semitones`. Drums are unchanged.
    pub fn transposed(&self, semitones: i32) -> NoteEvent {
        match self {
            NoteEvent::Tone {
                frequency,
                note,
                velocity,
                duration_beats,
            } => {
                // Silent or malformed tones have no pitch to move.
                if !(frequency.is_finite() && *frequency > 0.0) {
                    return self.clone();
                }
                let midi = note_to_midi(note)
                    .unwrap_or_else(|| frequency_to_midi(*frequency, A4_TUNING))
                    .saturating_add(semitones)
                    .clamp(0, 127);
                NoteEvent::Tone {
                    frequency: frequency * semitone_ratio(semitones),
                    note: midi_to_note_name(midi),
                    velocity: *velocity,
                    duration_beats: *duration_beats,
                }
            }
            drum => drum.clone(),
        }
    }
}

/// Snap `step` to the nearest beat (ties round up), wrapped into the loop.
pub fn quantize_step(step: usize, total_steps: usize) -> usize {
    if total_steps == 0 {
        return 0;
    }
    let nearest = (step + STEPS_PER_BEAT / 2) / STEPS_PER_BEAT * STEPS_PER_BEAT;
    nearest % total_steps
}

/// A fixed-length sequence of optional events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Option<NoteEvent>>", into = "Vec<Option<NoteEvent>>")]
pub struct Pattern {
    slots: Vec<Option<NoteEvent>>,
}

impl Pattern {
    /// An empty pattern of `bars` bars (at least one).
    pub fn new(bars: usize) -> Self {
        Pattern {
            slots: vec![None; bars.max(1) * STEPS_PER_BAR],
        }
    }

    /// Build from raw slots. An empty list becomes one empty bar.
    pub fn from_slots(slots: Vec<Option<NoteEvent>>) -> Self {
        if slots.is_empty() {
            return Pattern::new(1);
        }
        Pattern { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn bars(&self) -> usize {
        self.slots.len().div_ceil(STEPS_PER_BAR)
    }

    /// True when no slot holds an event.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Number of occupied slots.
    pub fn event_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Event at `step`, indexed modulo the pattern length.
    pub fn get(&self, step: usize) -> Option<&NoteEvent> {
        self.slots[step % self.slots.len()].as_ref()
    }

    /// Place an event, replacing whatever was there. Returns the slot index used.
    pub fn insert(&mut self, step: usize, event: NoteEvent) -> usize {
        let index = step % self.slots.len();
        self.slots[index] = Some(event);
        index
    }

    /// Empty a slot, returning the removed event.
    pub fn clear(&mut self, step: usize) -> Option<NoteEvent> {
        let index = step % self.slots.len();
        self.slots[index].take()
    }

    pub fn clear_all(&mut self) {
        self.slots.fill(None);
    }

    /// Change the length to `bars × 16`. Slot `i` of the result is the old
    /// slot `i mod old_len`, so shrinking truncates and growing repeats.
    pub fn resize(&mut self, bars: usize) {
        let new_len = bars.max(1) * STEPS_PER_BAR;
        let old = &self.slots;
        let slots = (0..new_len).map(|i| old[i % old.len()].clone()).collect();
        self.slots = slots;
    }

    /// Shift every tonal event by `semitones`.
    pub fn transpose(&mut self, semitones: i32) {
        if semitones == 0 {
            return;
        }
        for slot in self.slots.iter_mut() {
            if let Some(event) = slot {
                *event = event.transposed(semitones);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &NoteEvent)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (i, e)))
    }
}

impl From<Vec<Option<NoteEvent>>> for Pattern {
    fn from(slots: Vec<Option<NoteEvent>>) -> Self {
        Pattern::from_slots(slots)
    }
}

impl From<Pattern> for Vec<Option<NoteEvent>> {
    fn from(pattern: Pattern) -> Self {
        pattern.slots
    }
}

/// One pattern per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSet {
    patterns: [Pattern; 4],
}

impl PatternSet {
    pub fn new(bars: usize) -> Self {
        PatternSet {
            patterns: std::array::from_fn(|_| Pattern::new(bars)),
        }
    }

    pub fn from_patterns(patterns: [Pattern; 4]) -> Self {
        PatternSet { patterns }
    }

    /// Length of the lead pattern; every pattern in a set shares it.
    pub fn len(&self) -> usize {
        self.patterns[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.iter().all(Pattern::is_empty)
    }

    pub fn bars(&self) -> usize {
        self.patterns[0].bars()
    }

    pub fn resize(&mut self, bars: usize) {
        for p in self.patterns.iter_mut() {
            p.resize(bars);
        }
    }

    /// Transpose the three tonal channels; percussion is untouched.
    pub fn transpose_tonal(&mut self, semitones: i32) {
        for id in ChannelId::TONAL {
            self.patterns[id.index()].transpose(semitones);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &Pattern)> {
        ChannelId::ALL.into_iter().zip(self.patterns.iter())
    }
}

impl Index<ChannelId> for PatternSet {
    type Output = Pattern;

    fn index(&self, id: ChannelId) -> &Pattern {
        &self.patterns[id.index()]
    }
}

impl IndexMut<ChannelId> for PatternSet {
    fn index_mut(&mut self, id: ChannelId) -> &mut Pattern {
        &mut self.patterns[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(note: &str) -> NoteEvent {
        NoteEvent::named(note, 100, 1.0).unwrap()
    }

    fn sample_pattern(bars: usize) -> Pattern {
        let mut p = Pattern::new(bars);
        let names = ["C4", "E4", "G4", "B4"];
        for (i, step) in (0..p.len()).step_by(3).enumerate() {
            p.insert(step, tone(names[i % names.len()]));
        }
        p.insert(5, NoteEvent::drum(DrumKind::Snare, 90, 0.25));
        p
    }

    #[test]
    fn new_pattern_length() {
        assert_eq!(Pattern::new(8).len(), 128);
        assert_eq!(Pattern::new(0).len(), 16);
        assert!(Pattern::new(2).is_empty());
    }

    #[test]
    fn get_wraps() {
        let mut p = Pattern::new(1);
        p.insert(3, tone("A4"));
        assert_eq!(p.get(3), p.get(19));
        assert_eq!(p.get(3 + 16 * 100).map(NoteEvent::label), Some("A4".to_string()));
        assert_eq!(p.insert(35, tone("C5")), 3);
    }

    #[test]
    fn resize_round_trip_restores_content() {
        for (n, m) in [(8, 2), (2, 8), (4, 3), (1, 16), (5, 5)] {
            let original = sample_pattern(n);
            let mut p = original.clone();
            p.resize(m);
            assert_eq!(p.len(), m * STEPS_PER_BAR);
            p.resize(n);
            let keep = n.min(m) * STEPS_PER_BAR;
            for i in 0..keep {
                assert_eq!(p.get(i), original.get(i), "slot {i} after {n}->{m}->{n}");
            }
        }
    }

    #[test]
    fn growing_repeats_content() {
        let original = sample_pattern(2);
        let mut p = original.clone();
        p.resize(5);
        for i in 0..p.len() {
            assert_eq!(p.get(i), original.get(i % original.len()));
        }
    }

    #[test]
    fn quantize_to_nearest_beat() {
        assert_eq!(quantize_step(0, 128), 0);
        assert_eq!(quantize_step(1, 128), 0);
        assert_eq!(quantize_step(2, 128), 4);
        assert_eq!(quantize_step(5, 128), 4);
        assert_eq!(quantize_step(6, 128), 8);
        assert_eq!(quantize_step(126, 128), 0, "rounds past the end and wraps");
        assert_eq!(quantize_step(7, 0), 0);
    }

    #[test]
    fn transpose_shifts_tones_only() {
        let mut p = Pattern::new(1);
        p.insert(0, tone("A4"));
        p.insert(1, NoteEvent::drum(DrumKind::Kick, 100, 0.5));
        p.transpose(3);
        match p.get(0) {
            Some(NoteEvent::Tone { frequency, note, .. }) => {
                assert_eq!(note, "C5");
                assert!((frequency - 523.251).abs() < 0.01, "got {frequency}");
            }
            other => panic!("expected tone, got {other:?}"),
        }
        assert_eq!(p.get(1), Some(&NoteEvent::drum(DrumKind::Kick, 100, 0.5)));
    }

    #[test]
    fn silent_tones_survive_transpose() {
        let rest = NoteEvent::tone(0.0, "rest", 100, 1.0);
        assert_eq!(rest.transposed(-2), rest);
        assert_eq!(rest.transposed(5), rest);

        let broken = NoteEvent::tone(f64::NAN, "??", 100, 1.0);
        assert!(matches!(broken.transposed(-7), NoteEvent::Tone { ref note, .. } if note == "??"));

        // An unnamed tone still follows its frequency.
        let unnamed = NoteEvent::tone(440.0, "", 90, 0.5);
        assert_eq!(unnamed.transposed(-12).label(), "A3");
    }

    #[test]
    fn clear_removes_event() {
        let mut p = Pattern::new(1);
        p.insert(4, tone("C4"));
        assert!(p.clear(20).is_some());
        assert!(p.is_empty());
        assert!(p.clear(4).is_none());
    }

    #[test]
    fn pattern_set_indexing() {
        let mut set = PatternSet::new(2);
        set[ChannelId::Bass].insert(0, tone("C2"));
        set[ChannelId::Percussion].insert(0, NoteEvent::drum(DrumKind::HiHat, 50, 0.25));
        set.transpose_tonal(12);
        assert_eq!(set[ChannelId::Bass].get(0).map(NoteEvent::label), Some("C3".to_string()));
        assert_eq!(set[ChannelId::Percussion].get(0).map(NoteEvent::label), Some("hihat".to_string()));
        set.resize(4);
        assert_eq!(set.len(), 64);
        assert_eq!(set.bars(), 4);
    }

    #[test]
    fn drum_constructor_uses_kind_period() {
        match NoteEvent::drum(DrumKind::Kick, 200, 0.5) {
            NoteEvent::Drum {
                noise_period,
                velocity,
                ..
            } => {
                assert_eq!(noise_period, 15);
                assert_eq!(velocity, 127);
            }
            other => panic!("expected drum, got {other:?}"),
        }
    }
}
