//! PCM encoder: mono f32 in [-1, 1] to interleaved 16-bit LE stereo.

/// Bytes per stereo frame (two i16 samples).
pub const FRAME_BYTES: usize = 4;

/// Output channel count.
pub const CHANNELS: u16 = 2;

/// Bits per sample.
pub const BIT_DEPTH: u16 = 16;

/// Convert one float sample to i16, clamping out-of-range input.
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Encode mono samples as stereo frames, duplicating each sample to left and right.
pub fn encode_stereo(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * FRAME_BYTES);
    for &s in samples {
        let bytes = to_i16(s).to_le_bytes();
        out.extend_from_slice(&bytes);
        out.extend_from_slice(&bytes);
    }
    out
}

/// `frames` stereo frames of digital silence.
pub fn silence(frames: usize) -> Vec<u8> {
    vec![0; frames * FRAME_BYTES]
}

/// Number of whole frames that fit in `bytes`.
pub fn frames_in(bytes: usize) -> usize {
    bytes / FRAME_BYTES
}

/// Decode interleaved i16 LE bytes back into samples (both channels).
pub fn decode_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
