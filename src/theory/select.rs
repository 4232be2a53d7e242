//! Weighted scale-degree selection for interactive note insertion.

use super::note::{A4_TUNING, Key, midi_to_frequency, midi_to_note_name};
use super::scale::{Scale, ScaleKind};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Weight of the root out of 100.
pub const ROOT_WEIGHT: u32 = 30;
/// Weight of the third (degree index 2).
pub const THIRD_WEIGHT: u32 = 25;
/// Weight of the fifth (degree index 4).
pub const FIFTH_WEIGHT: u32 = 25;
/// Weight of the seventh (degree index 6), only on scales with 7+ degrees.
pub const SEVENTH_WEIGHT: u32 = 15;

/// Octave the picker centres on.
pub const BASE_OCTAVE: i32 = 4;

/// A picked note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickedNote {
    pub frequency: f64,
    /// Full name with octave, e.g. `E5`.
    pub note: String,
    /// Zero-based scale degree index.
    pub degree: usize,
    pub octave: i32,
}

/// Per-degree weights for a scale with `len` degrees.
///
/// Fixed weights go to the root, third, fifth and (for 7+ degree scales)
/// seventh; whatever is left of 100 is shared equally by the other degrees.
pub fn degree_weights(len: usize) -> Vec<f64> {
    // Index 6 only exists on scales with seven or more degrees.
    let fixed = [
        (0, ROOT_WEIGHT),
        (2, THIRD_WEIGHT),
        (4, FIFTH_WEIGHT),
        (6, SEVENTH_WEIGHT),
    ];
    let mut weights = vec![0.0; len];
    let mut assigned = 0u32;
    for (index, weight) in fixed {
        if index < len {
            weights[index] = weight as f64;
            assigned += weight;
        }
    }

    let others = weights.iter().filter(|&&w| w == 0.0).count();
    if others > 0 {
        let share = 100u32.saturating_sub(assigned) as f64 / others as f64;
        for w in weights.iter_mut().filter(|w| **w == 0.0) {
            *w = share;
        }
    }
    weights
}

/// Draws scale notes with harmonic weighting and a random octave offset.
#[derive(Debug, Clone)]
pub struct NotePicker {
    scale: Scale,
    /// Maximum octave offset in either direction.
    pub octave_spread: i32,
    rng: StdRng,
    distribution: WeightedIndex<f64>,
}

impl NotePicker {
    pub fn new(key: Key, kind: ScaleKind) -> Self {
        Self::with_rng(key, kind, StdRng::from_entropy())
    }

    /// Deterministic picker for reproducible draws.
    pub fn seeded(key: Key, kind: ScaleKind, seed: u64) -> Self {
        Self::with_rng(key, kind, StdRng::seed_from_u64(seed))
    }

    fn with_rng(key: Key, kind: ScaleKind, rng: StdRng) -> Self {
        let scale = Scale::new(key, kind);
        NotePicker {
            distribution: Self::distribution_for(&scale),
            scale,
            octave_spread: 1,
            rng,
        }
    }

    fn distribution_for(scale: &Scale) -> WeightedIndex<f64> {
        WeightedIndex::new(degree_weights(scale.len()))
            .unwrap_or_else(|e| unreachable!("root always carries weight: {e}"))
    }

    pub fn with_octave_spread(mut self, spread: i32) -> Self {
        self.octave_spread = spread.max(0);
        self
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Switch key/scale for subsequent draws.
    pub fn set_scale(&mut self, key: Key, kind: ScaleKind) {
        self.scale = Scale::new(key, kind);
        self.distribution = Self::distribution_for(&self.scale);
    }

    /// Draw a zero-based degree index.
    pub fn pick_degree(&mut self) -> usize {
        self.distribution.sample(&mut self.rng)
    }

    /// Draw a note: weighted degree plus an octave offset in `[-spread, +spread]`.
    pub fn pick(&mut self) -> PickedNote {
        let degree = self.pick_degree();
        let offset = if self.octave_spread > 0 {
            self.rng.gen_range(-self.octave_spread..=self.octave_spread)
        } else {
            0
        };
        let octave = BASE_OCTAVE + offset;
        let midi = self.scale.root.midi(octave) + self.scale.semitones_at(degree as i32);
        PickedNote {
            frequency: midi_to_frequency(midi, A4_TUNING),
            note: midi_to_note_name(midi),
            degree,
            octave,
        }
    }

    /// Access the underlying generator (drum choices share the same stream).
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// An entry of the insert-mode note list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableNote {
    pub name: String,
    pub key: Key,
    pub octave: i32,
    pub frequency: f64,
    /// Semitones above the scale root.
    pub interval: i32,
}

/// Lowest octave offered for manual note selection.
pub const MIN_SELECT_OCTAVE: i32 = 2;
/// Highest octave offered for manual note selection.
pub const MAX_SELECT_OCTAVE: i32 = 6;

/// Every scale note across octaves 2 to 6, ascending by octave then degree.
pub fn available_notes(scale: &Scale) -> Vec<AvailableNote> {
    let mut notes = Vec::with_capacity(scale.len() * 5);
    for octave in MIN_SELECT_OCTAVE..=MAX_SELECT_OCTAVE {
        for &interval in scale.kind.intervals() {
            let key = scale.root.transpose(interval);
            let midi = key.midi(octave);
            notes.push(AvailableNote {
                name: midi_to_note_name(midi),
                key,
                octave,
                frequency: midi_to_frequency(midi, A4_TUNING),
                interval,
            });
        }
    }
    notes
}

/// Index of the root in `octave` within an [`available_notes`] list.
pub fn root_index(notes: &[AvailableNote], octave: i32) -> Option<usize> {
    notes
        .iter()
        .position(|n| n.interval == 0 && n.octave == octave)
        .or_else(|| notes.iter().position(|n| n.interval == 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_for_heptatonic_scale() {
        let w = degree_weights(7);
        let expected = [30.0, 5.0 / 3.0, 25.0, 5.0 / 3.0, 25.0, 5.0 / 3.0, 15.0];
        for (i, (got, want)) in w.iter().zip(expected).enumerate() {
            assert!((got - want).abs() < 1e-9, "degree {i}: {got} != {want}");
        }
        assert!((w.iter().sum::<f64>() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn weights_without_seventh() {
        let w = degree_weights(5);
        assert_eq!(w[0], 30.0);
        assert_eq!(w[2], 25.0);
        assert_eq!(w[4], 25.0);
        assert!((w[1] - 10.0).abs() < 1e-9);
        assert!((w[3] - 10.0).abs() < 1e-9);

        let six = degree_weights(6);
        assert!(six[5] > 0.0, "blues has no seventh weight, sixth degree shares the rest");
        assert!((six.iter().sum::<f64>() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn root_frequency_close_to_thirty_percent() {
        let mut picker = NotePicker::seeded(Key::C, ScaleKind::Major, 7);
        let draws = 10_000;
        let roots = (0..draws).filter(|_| picker.pick_degree() == 0).count();
        let ratio = roots as f64 / draws as f64;
        assert!((ratio - 0.30).abs() < 0.03, "root ratio {ratio}");
    }

    #[test]
    fn picked_notes_stay_in_scale_and_range() {
        let mut picker = NotePicker::seeded(Key::D, ScaleKind::Dorian, 42).with_octave_spread(1);
        let scale = picker.scale();
        for _ in 0..1000 {
            let n = picker.pick();
            assert!(scale.contains(&n.note), "{} not in {scale}", n.note);
            assert!((3..=5).contains(&n.octave));
            assert!(n.frequency > 0.0);
        }
    }

    #[test]
    fn seeded_pickers_agree() {
        let mut a = NotePicker::seeded(Key::C, ScaleKind::Minor, 99);
        let mut b = NotePicker::seeded(Key::C, ScaleKind::Minor, 99);
        for _ in 0..100 {
            assert_eq!(a.pick(), b.pick());
        }
    }

    #[test]
    fn zero_spread_stays_in_base_octave() {
        let mut picker = NotePicker::seeded(Key::A, ScaleKind::Major, 1).with_octave_spread(0);
        for _ in 0..50 {
            let n = picker.pick();
            assert_eq!(n.octave, BASE_OCTAVE);
        }
    }

    #[test]
    fn available_notes_span_five_octaves() {
        let scale = Scale::new(Key::C, ScaleKind::Pentatonic);
        let notes = available_notes(&scale);
        assert_eq!(notes.len(), 25);
        assert_eq!(notes[0].name, "C2");
        assert_eq!(notes.last().map(|n| n.name.as_str()), Some("A6"));
        assert_eq!(root_index(&notes, 4), Some(10));
    }
}
