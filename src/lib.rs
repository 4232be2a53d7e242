pub mod dsp;
pub mod error;
pub mod params;
pub mod sequencer;
pub mod stream;
pub mod synth;
pub mod theory;

use crate::params::{Genre, Parameters};
use crate::theory::chord::{Progression, named_progressions};
use crate::theory::{Key, Scale, ScaleKind};
use serde::Serialize;
use wasm_bindgen::prelude::*;

pub use crate::error::EngineError;
pub use crate::synth::{SynthCore, Visualization};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the chipstream-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Note names of a scale. Unknown names fall back to C / major.
pub fn scale_note_names(key: &str, scale: &str) -> Vec<String> {
    Scale::new(Key::parse(key), ScaleKind::parse(scale))
        .notes()
        .into_iter()
        .map(String::from)
        .collect()
}

/// WASM-exposed: note names of a scale, e.g. `scale_notes("C", "major")`.
#[wasm_bindgen]
pub fn scale_notes(key: &str, scale: &str) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&scale_note_names(key, scale))
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressionView {
    pub name: &'static str,
    pub degrees: &'static [&'static str],
    pub chords: Vec<Vec<&'static str>>,
}

/// Every named progression for a genre, resolved in `key`/`scale`.
pub fn genre_progressions(genre: &str, key: &str, scale: &str) -> Vec<ProgressionView> {
    let (key, scale) = (Key::parse(key), ScaleKind::parse(scale));
    named_progressions(Genre::parse(genre))
        .iter()
        .map(|&(name, degrees)| ProgressionView {
            name,
            degrees,
            chords: Progression::new(key, scale, degrees)
                .chords()
                .iter()
                .map(|c| c.notes())
                .collect(),
        })
        .collect()
}

/// WASM-exposed: named progressions for a genre as JSON-like values.
#[wasm_bindgen]
pub fn progressions(genre: &str, key: &str, scale: &str) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&genre_progressions(genre, key, scale))
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// Render `seconds` of the loop described by `params_json` to 16-bit stereo PCM.
pub fn render_loop(params_json: &str, seconds: f64, seed: Option<u64>) -> Result<Vec<u8>, EngineError> {
    let params = if params_json.trim().is_empty() {
        Parameters::default()
    } else {
        Parameters::from_json(params_json)?
    };
    Ok(dsp::renderer::render_pcm(params, 44100, seconds, seed))
}

/// WASM-exposed: render PCM bytes for AudioWorklet playback.
#[wasm_bindgen]
pub fn render_loop_pcm(params_json: &str, seconds: f64) -> Result<Vec<u8>, JsValue> {
    render_loop(params_json, seconds, None).map_err(|e| JsValue::from_str(&format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_major_scale() {
        assert_eq!(
            scale_note_names("C", "major"),
            vec!["C", "D", "E", "F", "G", "A", "B"]
        );
    }

    #[test]
    fn unknown_scale_falls_back_to_c_major() {
        assert_eq!(scale_note_names("H", "nope"), scale_note_names("C", "major"));
    }

    #[test]
    fn progressions_resolve_chords() {
        let views = genre_progressions("rock", "C", "major");
        assert!(!views.is_empty());
        for view in &views {
            assert_eq!(view.degrees.len(), view.chords.len(), "{}", view.name);
            assert!(view.chords.iter().all(|c| c.len() >= 2));
        }
    }

    #[test]
    fn render_loop_from_json() {
        let pcm = render_loop(r#"{"tempo": 100, "loop_bars": 1}"#, 0.5, Some(2)).unwrap();
        assert_eq!(pcm.len(), 22050 * dsp::pcm::FRAME_BYTES);
        assert_eq!(render_loop("", 0.1, Some(2)).unwrap().len(), 4410 * 4);
        assert!(matches!(
            render_loop("{bad", 1.0, None),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}
