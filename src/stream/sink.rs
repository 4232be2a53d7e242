//! Audio sinks: the trait the driver writes through, plus an in-memory sink.

use crate::dsp::pcm;
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// What the sink is asked to accept. Watermarks are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub low_watermark: usize,
    pub high_watermark: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            sample_rate: 44100,
            channels: pcm::CHANNELS,
            bit_depth: pcm::BIT_DEPTH,
            low_watermark: 4096,
            high_watermark: 16384,
        }
    }
}

/// Destination for interleaved 16-bit stereo PCM.
///
/// `write` resolves when the sink has accepted the chunk; the driver does not
/// dequeue the next one until then.
pub trait AudioSink {
    fn open(&mut self, config: &SinkConfig) -> Result<(), EngineError>;

    fn write(&mut self, chunk: Vec<u8>) -> impl Future<Output = Result<(), EngineError>>;

    fn close(&mut self) -> impl Future<Output = Result<(), EngineError>>;
}

/// Records every chunk. Can refuse to open or fail chosen writes, and can
/// take real (tokio) time per chunk like a device would.
#[derive(Debug, Default)]
pub struct MemorySink {
    config: Option<SinkConfig>,
    chunks: Vec<Vec<u8>>,
    attempts: usize,
    closed: bool,
    fail_open: bool,
    failing_writes: Vec<usize>,
    paced: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each write takes as long as its audio would take to play.
    pub fn paced() -> Self {
        MemorySink {
            paced: true,
            ..Self::default()
        }
    }

    /// `open` will fail.
    pub fn unavailable() -> Self {
        MemorySink {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Fail the writes with these zero-based attempt numbers.
    pub fn with_failing_writes(mut self, attempts: &[usize]) -> Self {
        self.failing_writes = attempts.to_vec();
        self
    }

    pub fn config(&self) -> Option<&SinkConfig> {
        self.config.as_ref()
    }

    /// Chunks accepted so far.
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Write calls made, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn bytes_written(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    fn accept(&mut self, chunk: Vec<u8>) -> Result<Duration, EngineError> {
        let attempt = self.attempts;
        self.attempts += 1;
        let config = self
            .config
            .ok_or_else(|| EngineError::SinkWrite("sink is not open".into()))?;
        if self.closed {
            return Err(EngineError::SinkWrite("sink is closed".into()));
        }
        let seconds = pcm::frames_in(chunk.len()) as f64 / config.sample_rate.max(1) as f64;
        if self.failing_writes.contains(&attempt) {
            return Err(EngineError::SinkWrite(format!("injected failure on write {attempt}")));
        }
        self.chunks.push(chunk);
        Ok(Duration::from_secs_f64(seconds))
    }
}

impl AudioSink for MemorySink {
    fn open(&mut self, config: &SinkConfig) -> Result<(), EngineError> {
        if self.fail_open {
            return Err(EngineError::SinkUnavailable("memory sink refused to open".into()));
        }
        self.config = Some(*config);
        self.closed = false;
        Ok(())
    }

    fn write(&mut self, chunk: Vec<u8>) -> impl Future<Output = Result<(), EngineError>> {
        let outcome = self.accept(chunk);
        let paced = self.paced;
        async move {
            let playback = outcome?;
            if paced {
                pause(playback).await;
            }
            Ok(())
        }
    }

    fn close(&mut self) -> impl Future<Output = Result<(), EngineError>> {
        self.closed = true;
        std::future::ready(Ok(()))
    }
}

#[cfg(feature = "runtime")]
async fn pause(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(not(feature = "runtime"))]
async fn pause(_duration: Duration) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(f)
    }

    #[test]
    fn records_writes_after_open() {
        let mut sink = MemorySink::new();
        assert!(block_on(sink.write(vec![0; 8])).is_err(), "not open yet");

        sink.open(&SinkConfig::default()).unwrap();
        block_on(sink.write(vec![1; 8])).unwrap();
        block_on(sink.write(vec![2; 4])).unwrap();
        assert_eq!(sink.chunks().len(), 2);
        assert_eq!(sink.bytes_written(), 12);
        assert_eq!(sink.attempts(), 3);

        block_on(sink.close()).unwrap();
        assert!(sink.is_closed());
        assert!(block_on(sink.write(vec![0; 4])).is_err());
    }

    #[test]
    fn injected_failures() {
        let mut sink = MemorySink::new().with_failing_writes(&[1]);
        sink.open(&SinkConfig::default()).unwrap();
        assert!(block_on(sink.write(vec![0; 4])).is_ok());
        let err = block_on(sink.write(vec![0; 4])).unwrap_err();
        assert!(matches!(err, EngineError::SinkWrite(_)));
        assert!(block_on(sink.write(vec![0; 4])).is_ok());
        assert_eq!(sink.chunks().len(), 2);
    }

    #[test]
    fn unavailable_sink_fails_to_open() {
        let mut sink = MemorySink::unavailable();
        let err = sink.open(&SinkConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::SinkUnavailable(_)));
        assert!(sink.config().is_none());
    }

    #[test]
    fn default_config_is_cd_stereo() {
        let c = SinkConfig::default();
        assert_eq!((c.sample_rate, c.channels, c.bit_depth), (44100, 2, 16));
        assert!(c.low_watermark < c.high_watermark);
    }
}
