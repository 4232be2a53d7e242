//! Default output device via cpal.
//!
//! `write` converts PCM frames to the device layout and pushes them into a
//! lock-free SPSC queue the device callback drains. A full queue makes
//! `write` wait, which is what paces the consumer loop.

use super::sink::{AudioSink, SinkConfig};
use crate::error::EngineError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// How long `write` sleeps while the device queue is full.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Longest `close` waits for queued audio to play out.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

pub struct CpalSink {
    stream: Option<cpal::Stream>,
    producer: Option<HeapProd<f32>>,
    device_channels: usize,
    errors: Arc<AtomicUsize>,
    reported: usize,
}

impl CpalSink {
    pub fn new() -> Self {
        CpalSink {
            stream: None,
            producer: None,
            device_channels: 2,
            errors: Arc::new(AtomicUsize::new(0)),
            reported: 0,
        }
    }

    /// Device errors reported by the stream callback so far.
    pub fn device_errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Spread mono-duplicated i16 stereo frames over the device's channels.
    fn to_device_samples(&self, chunk: &[u8]) -> Vec<f32> {
        let mut out = Vec::with_capacity(chunk.len() / 4 * self.device_channels);
        for frame in chunk.chunks_exact(4) {
            let left = i16::from_le_bytes([frame[0], frame[1]]) as f32 / 32768.0;
            let right = i16::from_le_bytes([frame[2], frame[3]]) as f32 / 32768.0;
            match self.device_channels {
                1 => out.push((left + right) * 0.5),
                n => {
                    out.push(left);
                    out.push(right);
                    out.extend(std::iter::repeat_n(0.0, n.saturating_sub(2)));
                }
            }
        }
        out
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CpalSink {
    fn open(&mut self, config: &SinkConfig) -> Result<(), EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::SinkUnavailable("no output device available".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::SinkUnavailable(format!("no default output config: {e}")))?;

        let channels = supported.channels();
        let sample_format = supported.sample_format();
        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Queue holds the sink's high watermark worth of frames.
        let queue_frames = (config.high_watermark / 4).max(1024);
        let ring = HeapRb::<f32>::new(queue_frames * channels as usize);
        let (producer, mut consumer) = ring.split();

        let errors = Arc::clone(&self.errors);
        let err_fn = move |err: cpal::StreamError| {
            let count = errors.fetch_add(1, Ordering::Relaxed) + 1;
            error!(error = %err, count, "audio device error");
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let read = consumer.pop_slice(data);
                    data[read..].fill(0.0);
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => {
                let mut scratch: Vec<f32> = Vec::new();
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len(), 0.0);
                        let read = consumer.pop_slice(&mut scratch);
                        for (dst, src) in data.iter_mut().zip(&scratch[..read]) {
                            *dst = (src.clamp(-1.0, 1.0) * 32767.0) as i16;
                        }
                        data[read..].fill(0);
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(EngineError::SinkUnavailable(format!(
                    "unsupported sample format {other:?}"
                )));
            }
        }
        .map_err(|e| EngineError::SinkUnavailable(format!("failed to build stream: {e}")))?;

        stream
            .play()
            .map_err(|e| EngineError::SinkUnavailable(format!("failed to start stream: {e}")))?;

        let name = device.name().unwrap_or_default();
        info!(
            device = %name,
            channels,
            queue_frames,
            sample_rate = config.sample_rate,
            "output device started"
        );
        self.device_channels = channels as usize;
        self.producer = Some(producer);
        self.stream = Some(stream);
        Ok(())
    }

    fn write(&mut self, chunk: Vec<u8>) -> impl Future<Output = Result<(), EngineError>> {
        let samples = self.to_device_samples(&chunk);
        // Surface callback errors through the next write.
        let errors = self.device_errors();
        let fresh = errors - self.reported;
        self.reported = errors;
        let producer = self.producer.as_mut();
        async move {
            let producer =
                producer.ok_or_else(|| EngineError::SinkWrite("device is not open".into()))?;
            let mut pushed = 0;
            while pushed < samples.len() {
                pushed += producer.push_slice(&samples[pushed..]);
                if pushed < samples.len() {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
            if fresh > 0 {
                return Err(EngineError::Device(format!(
                    "{fresh} stream error(s) since the last write"
                )));
            }
            Ok(())
        }
    }

    fn close(&mut self) -> impl Future<Output = Result<(), EngineError>> {
        let producer = self.producer.take();
        let stream = self.stream.take();
        async move {
            if let Some(producer) = producer {
                let deadline = tokio::time::Instant::now() + CLOSE_TIMEOUT;
                while producer.occupied_len() > 0 {
                    if tokio::time::Instant::now() >= deadline {
                        warn!(queued = producer.occupied_len(), "device close timed out");
                        break;
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
            drop(stream);
            info!("output device closed");
            Ok(())
        }
    }
}
