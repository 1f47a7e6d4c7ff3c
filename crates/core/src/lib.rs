//! Core library for the audio-reactive flame visualiser.
//!
//! Two pipelines meet in a single shared value. The signal pipeline turns
//! microphone spectra into a loudness level in [0, 1]; the animation core
//! reads that level every frame and moves small groups of flame particles
//! spawned on top of the candle geometry. Rendering, model loading and the
//! camera live outside this crate and talk to it through [`PointSink`],
//! [`SceneModel`] and a per-frame time value.

pub mod anchors;
pub mod animation;
pub mod config;
pub mod error;
pub mod flame;
pub mod render;
pub mod signal;
pub mod timeline;

pub use anchors::{cell_key, Anchor, AnchorExtractor, MeshGeometry, SceneModel};
pub use animation::{FieldStats, FlameField, SpreadModel};
pub use config::{
    AnchorConfig, AnimationConfig, AppConfig, FlameConfig, FrameConfig, SignalConfig,
    UniformRange,
};
pub use error::{FlameVizError, Result};
pub use flame::{FlameFactory, Particle, ParticleGroup, PARTICLES_PER_GROUP};
pub use render::{PointCloud, PointCloudSnapshot, PointRecord, PointSink, PointStyle};
pub use signal::{
    mean_level, AnalyserSource, SampleRing, SignalLevel, SignalPipeline, SignalPublisher,
    SpectrumAnalyser, SpectrumSource,
};
pub use timeline::{
    AnchorInbox, AnchorSender, FixedStepClock, FrameClock, FrameLoop, ShutdownSignal, TimeSource,
};
