//! DSP — chip-style voices, mixing, dynamics and PCM encoding.
//!
//! Everything here is plain sample math with no I/O, so the same code serves
//! live streaming, offline rendering and the WASM bindings.

pub mod compressor;
pub mod envelope;
pub mod filter;
pub mod mixer;
pub mod oscillator;
pub mod pcm;
pub mod renderer;
