//! chipstream — play a generated chiptune loop on the default output device.

use chipstream_core::params::{Genre, Parameters};
use chipstream_core::sequencer::GenerationMode;
use chipstream_core::stream::{CpalSink, StopFlag, StreamConfig, StreamEngine, run};
use chipstream_core::synth::SynthCore;
use chipstream_core::theory::{Key, ScaleKind};
use clap::Parser;
use serde::Deserialize;
use std::cell::RefCell;
use std::error::Error;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chipstream", version, about = "Procedural chiptune player")]
struct Args {
    /// Tempo in BPM (30-300)
    #[arg(long)]
    tempo: Option<u32>,

    /// Root key, e.g. C, F#, Bb
    #[arg(long)]
    key: Option<String>,

    /// Scale name, e.g. major, minor, dorian, harmonic-minor
    #[arg(long)]
    scale: Option<String>,

    /// soft, rock or bossa
    #[arg(long)]
    genre: Option<String>,

    /// Loop length in bars
    #[arg(long)]
    bars: Option<usize>,

    /// Swing the off-beat sixteenths
    #[arg(long)]
    swing: bool,

    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(long)]
    seconds: Option<f64>,

    /// Hold the key root instead of generating parts
    #[arg(long)]
    drone: bool,

    /// Seed for reproducible patterns
    #[arg(long)]
    seed: Option<u64>,

    /// JSON file with `params` and `stream` sections
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    params: Parameters,
    stream: StreamConfig,
}

impl Args {
    fn parameters(&self, mut params: Parameters) -> Parameters {
        if let Some(genre) = &self.genre {
            params.genre = Genre::parse(genre);
            params.tempo = params.genre.fit_tempo(params.tempo);
        }
        if let Some(tempo) = self.tempo {
            params.tempo = tempo;
        }
        if let Some(key) = &self.key {
            params.key = Key::parse(key);
        }
        if let Some(scale) = &self.scale {
            params.scale = ScaleKind::parse(scale);
        }
        if let Some(bars) = self.bars {
            params.loop_bars = bars;
        }
        if self.swing {
            params.swing = true;
        }
        params.sanitized()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let file = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str::<FileConfig>(&text)?
        }
        None => FileConfig::default(),
    };
    let params = args.parameters(file.params);
    file.stream.validate()?;

    let sample_rate = file.stream.sample_rate as f64;
    let mode = if args.drone {
        GenerationMode::Drone
    } else {
        GenerationMode::Procedural
    };
    let core = match args.seed {
        Some(seed) => SynthCore::seeded(params.clone(), sample_rate, seed),
        None => SynthCore::new(params.clone(), sample_rate),
    }
    .with_mode(mode);

    info!(
        tempo = params.tempo,
        key = %params.key,
        scale = ?params.scale,
        genre = %params.genre,
        bars = params.loop_bars,
        "starting playback"
    );

    let engine = Rc::new(RefCell::new(StreamEngine::new(core, file.stream)?));
    let mut sink = CpalSink::new();
    let stop = StopFlag::new();

    let stopper = {
        let stop = stop.clone();
        let seconds = args.seconds;
        async move {
            match seconds {
                Some(s) => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs_f64(s.max(0.0))) => {}
                        _ = tokio::signal::ctrl_c() => {}
                    }
                }
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
            stop.stop();
        }
    };

    let result = {
        let playback = run(engine.clone(), &mut sink, stop);
        tokio::pin!(playback);
        tokio::select! {
            // Only returns early when the device could not be opened.
            r = &mut playback => r,
            () = stopper => playback.await,
        }
    };
    let stats = result?;
    info!(
        chunks = stats.chunks_consumed,
        underruns = stats.underruns,
        sink_errors = stats.sink_errors,
        device_errors = sink.device_errors(),
        "done"
    );
    Ok(())
}
