use std::{
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use beatscope_core::{
    AppConfig, AudioEngine, Band, BeatscopeError, FrameTimeline, ManualBackend, PlaybackClock,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> beatscope_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Devices => run_devices(config),
        Commands::Live {
            device,
            gain,
            fps,
            seconds,
        } => run_live(config, device, gain, fps, seconds),
        Commands::Precompute { input, output } => run_precompute(config, &input, &output),
        Commands::Inspect { cache, at } => run_inspect(&cache, at),
    }
}

fn load_config(path: Option<&Path>) -> beatscope_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::load(path)
        }
        None => Ok(AppConfig::live_defaults()),
    }
}

fn run_devices(config: AppConfig) -> beatscope_core::Result<()> {
    let engine = AudioEngine::with_default_backend(config)?;
    let devices = engine.list_devices()?;
    if devices.is_empty() {
        println!("no input devices found ({} backend)", engine.capture().backend_name());
    }
    for (index, name) in devices.iter().enumerate() {
        println!("{index}: {name}");
    }
    Ok(())
}

fn run_live(
    mut config: AppConfig,
    device: Option<usize>,
    gain: Option<f32>,
    fps: f64,
    seconds: Option<f64>,
) -> beatscope_core::Result<()> {
    if let Some(device) = device {
        config.audio.device_id = device;
    }
    if let Some(gain) = gain {
        config.audio.gain = gain;
    }

    let mut engine = AudioEngine::with_default_backend(config)?;
    let handle = engine.start();
    if !engine.input_ready() {
        tracing::warn!("no audio input available; analysing silence");
    }
    tracing::info!(fps, gain = engine.capture().gain(), "starting live mode");

    let frame_time = Duration::from_secs_f64(1.0 / fps.clamp(1.0, 240.0));
    let started = Instant::now();
    let mut last_report = Instant::now();

    loop {
        let tick_started = Instant::now();
        let frame = engine.update()?;

        if frame.on_beat() {
            tracing::debug!(bpm = frame.bpm(), "beat");
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            let latest = handle.latest()?;
            tracing::info!(
                bpm = format_args!("{:.1}", latest.bpm()),
                confidence = format_args!("{:.2}", latest.tempo.confidence),
                bass = format_args!("{:.3}", latest.band_energy(Band::Bass)),
                level = format_args!("{:.3}", latest.level),
                input_ready = latest.input_ready,
                "tempo"
            );
            last_report = Instant::now();
        }

        if seconds.is_some_and(|limit| started.elapsed().as_secs_f64() >= limit) {
            break;
        }
        if let Some(remaining) = frame_time.checked_sub(tick_started.elapsed()) {
            thread::sleep(remaining);
        }
    }

    engine.stop();
    Ok(())
}

fn run_precompute(config: AppConfig, input: &Path, output: &Path) -> beatscope_core::Result<()> {
    tracing::info!(?input, ?output, "running precompute pipeline");

    let (samples, channels, sample_rate) = read_wav(input)?;
    let mut config = config;
    config.audio.sample_rate = sample_rate;
    config.audio.channels = channels;

    let backend = ManualBackend::new([input.display().to_string()]);
    let feed = backend.feed();
    let mut engine = AudioEngine::new(config, Box::new(backend))?;
    engine.start();

    let block_size = engine.config().audio.block_size;
    let block_ms = engine.config().audio.block_duration_ms();
    let mut timeline = FrameTimeline::new(sample_rate, block_size);
    let mut clock = PlaybackClock::default();

    for chunk in samples.chunks(block_size * channels as usize) {
        if feed.push(chunk) == 0 {
            // Trailing partial block.
            break;
        }
        clock.advance(block_ms);
        let frame = engine.update_at(clock.now_ms())?;
        timeline.push((*frame).clone());
    }

    timeline.save(output)?;
    tracing::info!(
        frames = timeline.len(),
        duration_ms = timeline.duration_ms(),
        bpm = ?timeline.final_bpm(),
        "analysis cache written"
    );
    Ok(())
}

fn read_wav(path: &Path) -> beatscope_core::Result<(Vec<f32>, u16, u32)> {
    let mut reader =
        hound::WavReader::open(path).map_err(|err| BeatscopeError::Decode(err.to_string()))?;
    let spec = reader.spec();

    let samples: Result<Vec<f32>, hound::Error> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect()
        }
    };
    let samples = samples.map_err(|err| BeatscopeError::Decode(err.to_string()))?;

    Ok((samples, spec.channels.max(1), spec.sample_rate))
}

fn run_inspect(cache: &Path, at: f64) -> beatscope_core::Result<()> {
    let timeline = FrameTimeline::load(cache)?;
    let frame = timeline.sample_at(at * 1000.0);
    println!("{}", serde_json::to_string_pretty(&frame)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive tempo and spectrum analyser", long_about = None)]
struct Cli {
    /// JSON configuration file; defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the available audio input devices.
    Devices,
    /// Analyse the selected input device in real time.
    Live {
        /// Input device index as printed by `devices`.
        #[arg(short, long)]
        device: Option<usize>,
        /// Input gain, clamped to 0..=4.
        #[arg(short, long)]
        gain: Option<f32>,
        /// Analysis ticks per second.
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
        /// Stop after this many seconds instead of running forever.
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Analyse a WAV file ahead of time and persist the frames.
    Precompute {
        /// Path to the audio file that should be analysed.
        input: PathBuf,
        /// Output path for the generated analysis cache.
        output: PathBuf,
    },
    /// Print the cached frame at a point in time.
    Inspect {
        /// Analysis cache written by `precompute`.
        cache: PathBuf,
        /// Time in seconds.
        #[arg(long, default_value_t = 0.0)]
        at: f64,
    },
}
