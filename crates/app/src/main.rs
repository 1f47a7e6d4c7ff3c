mod demo;

use std::{
    f32::consts::TAU,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use flame_visualiser_core::{
    AnalyserSource, AnchorConfig, AnchorExtractor, AnchorInbox, AnchorSender, AppConfig,
    FixedStepClock, FrameClock, FrameLoop, PointCloud, SampleRing, SceneModel, ShutdownSignal,
    SignalConfig, SignalLevel, SignalPipeline, SpectrumSource,
};
use tracing_subscriber::EnvFilter;

fn main() -> flame_visualiser_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.seed)?;

    match cli.command {
        Commands::Live { seconds } => run_live(&config, cli.scene, seconds),
        Commands::Simulate { frames, output } => {
            run_simulate(&config, cli.scene.as_deref(), frames, output.as_deref())
        }
    }
}

fn run_live(
    config: &AppConfig,
    scene: Option<PathBuf>,
    seconds: Option<f32>,
) -> flame_visualiser_core::Result<()> {
    tracing::info!(?scene, ?seconds, "starting live mode");

    let (publisher, level) = SignalLevel::channel();
    let mut pipeline = SignalPipeline::new(publisher, config.signal.clone());
    pipeline.start();

    let (sender, inbox) = AnchorInbox::channel();
    let loader = spawn_scene_loader(scene, config.anchors.clone(), sender)?;

    let mut frame_loop = FrameLoop::new(config, level, inbox).with_pipeline(pipeline);
    let mut clock = FrameClock::start();
    let mut cloud = PointCloud::new();
    let shutdown = ShutdownSignal::new();
    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs_f32(s.max(0.0)));
    let frames_per_report = u64::from(config.frame.target_fps);

    while !shutdown.is_cancelled() {
        frame_loop.run(&mut clock, &mut cloud, &shutdown, Some(frames_per_report));

        let stats = frame_loop.field().stats();
        tracing::info!(
            frames = frame_loop.frames(),
            level = frame_loop.level().get(),
            particles = stats.particles,
            mean_spread = stats.mean_spread,
            max_spread = stats.max_spread,
            "live"
        );

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            shutdown.cancel();
        }
    }

    if loader.join().is_err() {
        tracing::error!("scene loader panicked");
    }
    Ok(())
}

fn run_simulate(
    config: &AppConfig,
    scene: Option<&Path>,
    frames: u64,
    output: Option<&Path>,
) -> flame_visualiser_core::Result<()> {
    tracing::info!(?scene, frames, "running simulation");

    let fps = config.frame.target_fps;
    let (publisher, level) = SignalLevel::channel();
    let microphone = SyntheticMicrophone::new(&config.signal, 48_000, fps);
    let pipeline =
        SignalPipeline::with_source(publisher, config.signal.clone(), Box::new(microphone));

    let (sender, inbox) = AnchorInbox::channel();
    sender.send(AnchorExtractor::new(config.anchors.clone()).from_model(&load_scene(scene)?));
    drop(sender);

    let mut frame_loop = FrameLoop::new(config, level, inbox).with_pipeline(pipeline);
    let mut clock = FixedStepClock::new(1.0 / fps as f32);
    let mut cloud = PointCloud::new();
    frame_loop.run(&mut clock, &mut cloud, &ShutdownSignal::new(), Some(frames));

    let stats = frame_loop.field().stats();
    tracing::info!(
        frames = frame_loop.frames(),
        level = frame_loop.level().get(),
        particles = stats.particles,
        mean_spread = stats.mean_spread,
        max_spread = stats.max_spread,
        "simulation finished"
    );

    if let Some(output) = output {
        let report = serde_json::json!({
            "frames": frame_loop.frames(),
            "level": frame_loop.level().get(),
            "stats": stats,
            "cloud": cloud.snapshot(),
        });
        std::fs::write(output, serde_json::to_vec_pretty(&report)?)?;
        tracing::info!(?output, "wrote point cloud");
    }
    Ok(())
}

fn load_config(path: Option<&Path>, seed: Option<u64>) -> flame_visualiser_core::Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if seed.is_some() {
        config.flames.seed = seed;
    }
    Ok(config)
}

fn load_scene(path: Option<&Path>) -> flame_visualiser_core::Result<SceneModel> {
    match path {
        Some(path) => SceneModel::load(path),
        None => Ok(demo::birthday_cake()),
    }
}

/// Loads the scene off the render thread; anchors reach the frame loop
/// whenever loading completes.
fn spawn_scene_loader(
    scene: Option<PathBuf>,
    config: AnchorConfig,
    sender: AnchorSender,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("scene-loader".into())
        .spawn(move || match load_scene(scene.as_deref()) {
            Ok(model) => {
                sender.send(AnchorExtractor::new(config).from_model(&model));
            }
            Err(err) => tracing::error!(error = %err, "failed to load scene, no flames spawned"),
        })
}

/// Microphone stand-in: a two-partial tone gated on for half a second every
/// two seconds, pushed through the regular analyser.
struct SyntheticMicrophone {
    analyser: AnalyserSource,
    ring: SampleRing,
    sample_rate: u32,
    samples_per_frame: usize,
    cursor: u64,
    block: Vec<f32>,
}

impl SyntheticMicrophone {
    fn new(config: &SignalConfig, sample_rate: u32, fps: u32) -> Self {
        let analyser = AnalyserSource::new(config);
        let ring = analyser.ring();
        let samples_per_frame = (sample_rate / fps.max(1)) as usize;
        Self {
            analyser,
            ring,
            sample_rate,
            samples_per_frame,
            cursor: 0,
            block: Vec::with_capacity(samples_per_frame),
        }
    }
}

fn gated_tone(index: u64, sample_rate: u32) -> f32 {
    let t = index as f32 / sample_rate as f32;
    let gate = if t % 2.0 < 0.5 { 0.8 } else { 0.0 };
    gate * (0.7 * (TAU * 440.0 * t).sin() + 0.3 * (TAU * 1250.0 * t).sin())
}

impl SpectrumSource for SyntheticMicrophone {
    fn bin_count(&self) -> usize {
        self.analyser.bin_count()
    }

    fn read_frame(&mut self, bins: &mut [u8]) -> bool {
        let start = self.cursor;
        let end = start + self.samples_per_frame as u64;
        let sample_rate = self.sample_rate;
        self.block.clear();
        self.block
            .extend((start..end).map(|index| gated_tone(index, sample_rate)));
        self.cursor = end;

        self.ring.push(&self.block);
        self.analyser.read_frame(bins)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive candle flames", long_about = None)]
struct Cli {
    /// JSON configuration file. Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// JSON scene description. A built-in birthday cake is used when omitted.
    #[arg(short, long, global = true)]
    scene: Option<PathBuf>,
    /// Seed for the flame particle randomisation.
    #[arg(long, global = true)]
    seed: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// React to the default microphone in real time.
    ///
    /// Microphone input needs a build with `--features capture`. Without it
    /// the flames idle at level 0.
    Live {
        /// Stop after this many seconds instead of running until killed.
        #[arg(long)]
        seconds: Option<f32>,
    },
    /// Run a deterministic session against a synthetic microphone.
    Simulate {
        /// Number of frames to render.
        #[arg(short, long, default_value_t = 600)]
        frames: u64,
        /// Where to write the final point cloud as JSON.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
