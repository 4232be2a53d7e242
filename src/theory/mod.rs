//! Music theory: note math, scales, chords, progressions and weighted
//! note selection. Everything here is a value type derived on demand from
//! the current key and scale.

pub mod chord;
pub mod note;
pub mod scale;
pub mod select;

pub use chord::{Chord, ChordKind, Degree, Progression};
pub use note::Key;
pub use scale::{Scale, ScaleKind};
pub use select::{NotePicker, PickedNote};
