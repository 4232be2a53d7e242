//! Stream engine — the producer/consumer state machine around [`PcmRing`].
//!
//! ```text
//! INIT -> PREFILL -> STREAMING -> DRAINING -> STOPPED
//! ```
//!
//! Synthesis runs on stream time (frames synthesized / sample rate), so
//! musical timing does not depend on when the producer happens to be polled.

use super::ring::PcmRing;
use super::sink::SinkConfig;
use crate::dsp::pcm::{self, FRAME_BYTES};
use crate::error::EngineError;
use crate::params::ParameterChange;
use crate::synth::{SynthCore, Visualization};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Init,
    Prefill,
    Streaming,
    Draining,
    Stopped,
}

/// Buffering and scheduling knobs. Sizes are in frames or chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate: u32,
    /// Frames per synthesis pass and per sink write.
    pub chunk_frames: usize,
    /// Ring capacity in chunks.
    pub ring_chunks: usize,
    /// Chunks queued before the first sink write.
    pub prefill_chunks: usize,
    /// The producer only runs when this many chunks are free.
    pub min_free_chunks: usize,
    /// Below this many queued chunks the consumer refills synchronously.
    /// Zero disables emergency refill.
    pub low_watermark_chunks: usize,
    pub producer_interval_ms: u64,
    pub trailing_silence_frames: usize,
    /// Start with half the ring queued as silence.
    pub initial_slack: bool,
    pub sink: SinkConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            sample_rate: 44100,
            chunk_frames: 1024,
            ring_chunks: 16,
            prefill_chunks: 4,
            min_free_chunks: 1,
            low_watermark_chunks: 2,
            producer_interval_ms: 5,
            trailing_silence_frames: 2048,
            initial_slack: false,
            sink: SinkConfig::default(),
        }
    }
}

impl StreamConfig {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: StreamConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_frames * FRAME_BYTES
    }

    /// Ring size in bytes: whole chunks plus the frame that is kept empty.
    pub fn ring_bytes(&self) -> usize {
        self.ring_chunks * self.chunk_bytes() + FRAME_BYTES
    }

    /// Bytes queued before the first write: the configured prefill or the
    /// sink's low watermark, whichever is larger.
    pub fn prefill_bytes(&self) -> usize {
        (self.prefill_chunks * self.chunk_bytes()).max(self.sink.low_watermark)
    }

    pub fn low_watermark_bytes(&self) -> usize {
        self.low_watermark_chunks * self.chunk_bytes()
    }

    pub fn chunk_duration(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_frames as f64 / self.sample_rate.max(1) as f64)
    }

    pub fn producer_interval(&self) -> Duration {
        Duration::from_millis(self.producer_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: String| -> Result<(), EngineError> { Err(EngineError::InvalidConfig(msg)) };
        if self.sample_rate == 0 {
            return invalid("sample_rate must be > 0".into());
        }
        if self.chunk_frames == 0 {
            return invalid("chunk_frames must be > 0".into());
        }
        if self.ring_chunks < 2 {
            return invalid(format!("ring must hold at least two chunks, got {}", self.ring_chunks));
        }
        if self.prefill_bytes() > self.ring_chunks * self.chunk_bytes() {
            return invalid(format!(
                "prefill of {} bytes does not fit a {}-byte ring",
                self.prefill_bytes(),
                self.ring_chunks * self.chunk_bytes()
            ));
        }
        if self.sink.sample_rate != self.sample_rate {
            return invalid(format!(
                "sink sample rate {} differs from stream sample rate {}",
                self.sink.sample_rate, self.sample_rate
            ));
        }
        if self.sink.channels != pcm::CHANNELS || self.sink.bit_depth != pcm::BIT_DEPTH {
            return invalid(format!(
                "sink must take {}-channel {}-bit PCM",
                pcm::CHANNELS,
                pcm::BIT_DEPTH
            ));
        }
        Ok(())
    }
}

/// Counters for the lifetime of one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub chunks_produced: u64,
    pub chunks_consumed: u64,
    pub underruns: u64,
    pub emergency_refills: u64,
    pub sink_errors: u64,
}

pub struct StreamEngine {
    config: StreamConfig,
    core: SynthCore,
    ring: PcmRing,
    state: StreamState,
    generating: bool,
    frames_synthesized: u64,
    stats: StreamStats,
}

impl StreamEngine {
    pub fn new(core: SynthCore, config: StreamConfig) -> Result<Self, EngineError> {
        config.validate()?;
        if (core.sample_rate() - config.sample_rate as f64).abs() > f64::EPSILON {
            return Err(EngineError::InvalidConfig(format!(
                "synth runs at {} Hz but the stream at {} Hz",
                core.sample_rate(),
                config.sample_rate
            )));
        }
        let ring = if config.initial_slack {
            PcmRing::with_slack(config.ring_bytes(), config.ring_bytes() / 2)
        } else {
            PcmRing::new(config.ring_bytes())
        };
        Ok(StreamEngine {
            config,
            core,
            ring,
            state: StreamState::Init,
            generating: false,
            frames_synthesized: 0,
            stats: StreamStats::default(),
        })
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn ring(&self) -> &PcmRing {
        &self.ring
    }

    pub fn core(&self) -> &SynthCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut SynthCore {
        &mut self.core
    }

    /// Queue a parameter change for the next synthesis pass.
    pub fn queue_change(&mut self, change: ParameterChange) {
        self.core.queue_change(change);
    }

    pub fn visualization(&self) -> Visualization {
        self.core.visualization()
    }

    /// Seconds of audio synthesized so far.
    pub fn stream_time(&self) -> f64 {
        self.frames_synthesized as f64 / self.config.sample_rate as f64
    }

    /// One synthesis pass into the ring. Refused while another is running or
    /// when a whole chunk would not fit.
    fn synthesize_chunk(&mut self) -> bool {
        if self.generating || self.ring.free() < self.config.chunk_bytes() {
            return false;
        }
        self.generating = true;
        let bytes = self.core.render(self.stream_time(), self.config.chunk_frames);
        self.frames_synthesized += self.config.chunk_frames as u64;
        let written = self.ring.write(&bytes);
        debug_assert_eq!(written, bytes.len());
        self.stats.chunks_produced += 1;
        self.generating = false;
        true
    }

    /// Queue at least [`StreamConfig::prefill_bytes`] and hand all of it
    /// back for a single sink write. Moves to STREAMING.
    pub fn prefill(&mut self) -> Vec<u8> {
        if self.state != StreamState::Init {
            warn!(state = ?self.state, "prefill requested twice");
            return Vec::new();
        }
        self.state = StreamState::Prefill;
        let target = self.config.prefill_bytes();
        while self.ring.available() < target {
            if !self.synthesize_chunk() {
                break;
            }
        }
        let (bytes, _) = self.ring.read_chunk(self.ring.available());
        self.state = StreamState::Streaming;
        info!(bytes = bytes.len(), "prefill complete, streaming");
        bytes
    }

    /// Producer step: one synthesis pass if enough of the ring is free.
    pub fn produce(&mut self) -> bool {
        if self.state != StreamState::Streaming {
            return false;
        }
        let needed = self.config.min_free_chunks.max(1) * self.config.chunk_bytes();
        if self.ring.free() < needed {
            return false;
        }
        self.synthesize_chunk()
    }

    /// Consumer step: dequeue one chunk. Never blocks; an empty ring yields
    /// silence.
    pub fn next_chunk(&mut self) -> Vec<u8> {
        let chunk_bytes = self.config.chunk_bytes();
        if self.state != StreamState::Streaming {
            return pcm::silence(self.config.chunk_frames);
        }

        if self.ring.available() < self.config.low_watermark_bytes() {
            if self.generating {
                debug!("emergency refill skipped, generation in progress");
            } else if self.synthesize_chunk() {
                self.stats.emergency_refills += 1;
                debug!(available = self.ring.available(), "emergency refill");
            }
        }

        let (chunk, missing) = self.ring.read_chunk(chunk_bytes);
        if missing > 0 {
            self.stats.underruns += 1;
            warn!(
                missing_bytes = missing,
                underruns = self.stats.underruns,
                "ring underrun, padding with silence"
            );
        }
        self.stats.chunks_consumed += 1;
        chunk
    }

    pub fn record_sink_error(&mut self, err: &EngineError) {
        self.stats.sink_errors += 1;
        warn!(error = %err, errors = self.stats.sink_errors, "sink write failed, continuing");
    }

    /// Stop producing. Queued audio is abandoned.
    pub fn begin_drain(&mut self) {
        if matches!(self.state, StreamState::Draining | StreamState::Stopped) {
            return;
        }
        self.state = StreamState::Draining;
        self.ring.clear();
        info!("draining stream");
    }

    /// Short silence written before the sink is released.
    pub fn trailing_silence(&self) -> Vec<u8> {
        pcm::silence(self.config.trailing_silence_frames)
    }

    pub fn finish(&mut self) {
        self.state = StreamState::Stopped;
        let s = self.stats;
        info!(
            produced = s.chunks_produced,
            consumed = s.chunks_consumed,
            underruns = s.underruns,
            emergency_refills = s.emergency_refills,
            sink_errors = s.sink_errors,
            "stream stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameters;
    use crate::sequencer::GenerationMode;

    fn small_config() -> StreamConfig {
        StreamConfig {
            chunk_frames: 256,
            ring_chunks: 8,
            prefill_chunks: 2,
            low_watermark_chunks: 1,
            sink: SinkConfig {
                low_watermark: 0,
                ..SinkConfig::default()
            },
            ..StreamConfig::default()
        }
    }

    fn engine(config: StreamConfig) -> StreamEngine {
        let core = SynthCore::seeded(Parameters::default(), 44100.0, 4)
            .with_mode(GenerationMode::Drone);
        StreamEngine::new(core, config).unwrap()
    }

    #[test]
    fn config_defaults_are_valid() {
        let c = StreamConfig::default();
        c.validate().unwrap();
        assert_eq!(c.chunk_bytes(), 4096);
        assert_eq!(c.ring_bytes(), 16 * 4096 + 4);
        assert_eq!(c.prefill_bytes(), 4 * 4096);
    }

    #[test]
    fn config_rejects_bad_sizes() {
        let zero = StreamConfig {
            chunk_frames: 0,
            ..StreamConfig::default()
        };
        assert!(zero.validate().is_err());

        let tiny = StreamConfig {
            ring_chunks: 1,
            ..StreamConfig::default()
        };
        assert!(tiny.validate().is_err());

        let overfull = StreamConfig {
            prefill_chunks: 17,
            ..StreamConfig::default()
        };
        assert!(overfull.validate().is_err());

        let mut watermark = StreamConfig::default();
        watermark.sink.low_watermark = 1 << 20;
        assert!(watermark.validate().is_err());

        let mut rate = StreamConfig::default();
        rate.sink.sample_rate = 48000;
        assert!(rate.validate().is_err());
    }

    #[test]
    fn config_from_json() {
        let c = StreamConfig::from_json(r#"{"chunk_frames": 512, "ring_chunks": 4}"#).unwrap();
        assert_eq!(c.chunk_frames, 512);
        assert_eq!(c.prefill_chunks, 4);
        assert!(StreamConfig::from_json(r#"{"chunk_frames": 0}"#).is_err());
        assert!(StreamConfig::from_json("[").is_err());
    }

    #[test]
    fn sample_rate_mismatch_is_rejected() {
        let core = SynthCore::seeded(Parameters::default(), 48000.0, 1);
        assert!(StreamEngine::new(core, StreamConfig::default()).is_err());
    }

    #[test]
    fn prefill_honours_sink_low_watermark() {
        let mut config = small_config();
        config.sink.low_watermark = 5 * 256 * FRAME_BYTES;
        let mut e = engine(config);
        assert_eq!(e.state(), StreamState::Init);
        let bytes = e.prefill();
        assert_eq!(bytes.len(), 5 * 256 * FRAME_BYTES);
        assert_eq!(e.state(), StreamState::Streaming);
        assert_eq!(e.stats().chunks_produced, 5);
        assert!(e.prefill().is_empty(), "second prefill is refused");
    }

    #[test]
    fn producer_fills_until_ring_is_full() {
        let mut e = engine(small_config());
        e.prefill();
        let mut passes = 0;
        while e.produce() {
            passes += 1;
        }
        assert_eq!(passes, 8);
        assert_eq!(e.ring().free(), 0);
        assert_eq!(e.ring().available(), 8 * e.config().chunk_bytes());
    }

    #[test]
    fn produce_does_nothing_before_streaming() {
        let mut e = engine(small_config());
        assert!(!e.produce());
        assert_eq!(e.stats().chunks_produced, 0);
    }

    #[test]
    fn consumer_takes_chunks_in_order() {
        let mut e = engine(small_config());
        e.prefill();
        e.produce();
        e.produce();
        let chunk = e.next_chunk();
        assert_eq!(chunk.len(), 256 * FRAME_BYTES);
        assert!(pcm::decode_i16(&chunk).iter().any(|&s| s != 0));
        assert_eq!(e.stats().chunks_consumed, 1);
        assert_eq!(e.stats().underruns, 0);
    }

    #[test]
    fn low_ring_triggers_emergency_refill() {
        let mut e = engine(small_config());
        e.prefill();
        // Ring is empty after prefill; the consumer must synthesize on its own.
        let chunk = e.next_chunk();
        assert_eq!(e.stats().emergency_refills, 1);
        assert_eq!(e.stats().underruns, 0);
        assert!(pcm::decode_i16(&chunk).iter().any(|&s| s != 0));
    }

    #[test]
    fn refill_is_skipped_while_generating() {
        let mut e = engine(small_config());
        e.prefill();
        e.generating = true;
        let chunk = e.next_chunk();
        assert_eq!(e.stats().emergency_refills, 0);
        assert_eq!(e.stats().underruns, 1);
        assert!(chunk.iter().all(|&b| b == 0));
        assert!(!e.produce(), "producer refuses to re-enter");
    }

    #[test]
    fn underrun_yields_silence_not_stale_audio() {
        let mut config = small_config();
        config.low_watermark_chunks = 0;
        let mut e = engine(config);
        e.prefill();
        e.produce();
        let audible = e.next_chunk();
        assert!(audible.iter().any(|&b| b != 0));

        let chunk = e.next_chunk();
        assert_eq!(chunk.len(), 256 * FRAME_BYTES);
        assert!(chunk.iter().all(|&b| b == 0));
        assert_eq!(e.stats().underruns, 1);
    }

    #[test]
    fn synthesis_follows_stream_time() {
        let mut e = engine(small_config());
        e.prefill();
        let before = e.stream_time();
        e.produce();
        let after = e.stream_time();
        assert!((after - before - 256.0 / 44100.0).abs() < 1e-12);
    }

    #[test]
    fn drain_and_stop() {
        let mut e = engine(small_config());
        e.prefill();
        e.produce();
        e.begin_drain();
        assert_eq!(e.state(), StreamState::Draining);
        assert!(e.ring().is_empty());
        assert!(!e.produce());
        let tail = e.trailing_silence();
        assert_eq!(tail.len(), 2048 * FRAME_BYTES);
        assert!(tail.iter().all(|&b| b == 0));
        e.finish();
        assert_eq!(e.state(), StreamState::Stopped);
        assert!(e.next_chunk().iter().all(|&b| b == 0));
    }

    #[test]
    fn initial_slack_is_silent() {
        let config = StreamConfig {
            initial_slack: true,
            ..small_config()
        };
        let e = engine(config);
        assert_eq!(e.ring().available(), e.config().ring_bytes() / 2 / FRAME_BYTES * FRAME_BYTES);
    }
}
