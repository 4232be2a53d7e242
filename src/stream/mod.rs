//! Gap-free PCM streaming: a byte ring between synthesis and the sink, the
//! state machine that manages it, and the drivers that run it.

pub mod engine;
pub mod ring;
pub mod sink;

#[cfg(feature = "runtime")]
pub mod driver;

#[cfg(feature = "device")]
pub mod device;

pub use engine::{StreamConfig, StreamEngine, StreamState, StreamStats};
pub use ring::PcmRing;
pub use sink::{AudioSink, MemorySink, SinkConfig};

#[cfg(feature = "runtime")]
pub use driver::{StopFlag, run, run_for};

#[cfg(feature = "device")]
pub use device::CpalSink;
