//! Single-threaded driver: one producer loop and one consumer loop joined on
//! the current task.
//!
//! The producer wakes on a tokio interval and runs at most one synthesis pass
//! per tick. The consumer writes one chunk at a time and only dequeues the
//! next after the sink has accepted the previous one. Engine borrows are
//! never held across an await.

use super::engine::{StreamEngine, StreamStats};
use super::sink::AudioSink;
use crate::error::EngineError;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Shared stop request checked by both loops before each cycle.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Rc<Cell<bool>>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.get()
    }
}

/// Stream until `stop` is raised, then write trailing silence and close the
/// sink. Only a failure to open the sink is returned as an error.
pub async fn run<S: AudioSink>(
    engine: Rc<RefCell<StreamEngine>>,
    sink: &mut S,
    stop: StopFlag,
) -> Result<StreamStats, EngineError> {
    let (sink_config, interval) = {
        let e = engine.borrow();
        (e.config().sink, e.config().producer_interval())
    };

    if let Err(e) = sink.open(&sink_config) {
        error!(error = %e, "could not open audio sink");
        return Err(e);
    }
    info!(
        sample_rate = sink_config.sample_rate,
        channels = sink_config.channels,
        "audio sink opened"
    );

    let prefill = engine.borrow_mut().prefill();
    if let Err(e) = sink.write(prefill).await {
        engine.borrow_mut().record_sink_error(&e);
    }

    let producer = async {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if stop.is_stopped() {
                break;
            }
            engine.borrow_mut().produce();
        }
    };

    let consumer = async {
        while !stop.is_stopped() {
            let chunk = engine.borrow_mut().next_chunk();
            if let Err(e) = sink.write(chunk).await {
                engine.borrow_mut().record_sink_error(&e);
            }
            // A sink that completes instantly would otherwise starve the producer.
            tokio::task::yield_now().await;
        }
    };

    tokio::join!(producer, consumer);

    engine.borrow_mut().begin_drain();
    let tail = engine.borrow().trailing_silence();
    if let Err(e) = sink.write(tail).await {
        engine.borrow_mut().record_sink_error(&e);
    }
    if let Err(e) = sink.close().await {
        warn!(error = %e, "closing audio sink failed");
    }
    engine.borrow_mut().finish();

    let stats = engine.borrow().stats();
    Ok(stats)
}

/// Run for a fixed duration, then stop.
pub async fn run_for<S: AudioSink>(
    engine: Rc<RefCell<StreamEngine>>,
    sink: &mut S,
    duration: Duration,
) -> Result<StreamStats, EngineError> {
    let stop = StopFlag::new();
    let timer = {
        let stop = stop.clone();
        async move {
            tokio::time::sleep(duration).await;
            stop.stop();
        }
    };
    let (result, ()) = tokio::join!(run(engine, sink, stop), timer);
    result
}
