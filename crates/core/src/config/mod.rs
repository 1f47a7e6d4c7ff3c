use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{FlameVizError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub signal: SignalConfig,
    pub anchors: AnchorConfig,
    pub flames: FlameConfig,
    pub animation: AnimationConfig,
    pub frame: FrameConfig,
}

impl AppConfig {
    /// Parses a (possibly partial) JSON document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Self::from_json_str(&contents)
    }

    /// Checks every section. Run once at startup so that per-frame code can
    /// assume well-formed parameters.
    pub fn validate(&self) -> Result<()> {
        self.signal.validate()?;
        self.anchors.validate()?;
        self.flames.validate()?;
        self.animation.validate()?;
        self.frame.validate()
    }
}

/// Parameters of the analyser that turns microphone samples into byte
/// frequency magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Window length in samples. Produces `fft_size / 2` magnitude bins.
    pub fft_size: usize,
    /// Magnitude mapped to byte 0.
    pub min_decibels: f32,
    /// Magnitude mapped to byte 255.
    pub max_decibels: f32,
    /// Blend factor between the previous and current spectrum, in [0, 1).
    pub smoothing: f32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            fft_size: 512,
            min_decibels: -100.0,
            max_decibels: -30.0,
            smoothing: 0.8,
        }
    }
}

impl SignalConfig {
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() || !(32..=32_768).contains(&self.fft_size) {
            return Err(FlameVizError::config(format!(
                "fft_size must be a power of two between 32 and 32768, got {}",
                self.fft_size
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(FlameVizError::config(
                "min_decibels must be lower than max_decibels",
            ));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(FlameVizError::config("smoothing must lie in [0, 1)"));
        }
        Ok(())
    }
}

/// Controls how spawn points are derived from the candle mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Name of the mesh whose vertices become anchors.
    pub mesh_name: String,
    /// Vertical offset applied to every vertex so flames sit above the wick.
    pub lift: f32,
    /// Decimal digits kept when bucketing vertices by (x, z).
    pub precision: usize,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            mesh_name: "Candle".to_string(),
            lift: 0.1,
            precision: 2,
        }
    }
}

impl AnchorConfig {
    fn validate(&self) -> Result<()> {
        if self.mesh_name.is_empty() {
            return Err(FlameVizError::config("mesh_name must not be empty"));
        }
        if self.precision > 6 {
            return Err(FlameVizError::config(
                "precision above 6 digits is meaningless for f32",
            ));
        }
        Ok(())
    }
}

/// Closed interval sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformRange {
    pub min: f32,
    pub max: f32,
}

impl UniformRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(FlameVizError::config(format!(
                "{name} range is invalid: [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Randomisation ranges for freshly created flame particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlameConfig {
    pub direction_x: UniformRange,
    /// Narrower above zero so that flames spread sideways more than upwards.
    pub direction_y: UniformRange,
    pub direction_z: UniformRange,
    pub wiggle_amplitude: UniformRange,
    pub wiggle_speed: UniformRange,
    pub hue: UniformRange,
    pub saturation: f32,
    pub lightness: UniformRange,
    pub point_size: f32,
    /// Fixed seed for reproducible runs. Entropy is used when absent.
    pub seed: Option<u64>,
}

impl Default for FlameConfig {
    fn default() -> Self {
        Self {
            direction_x: UniformRange::new(-0.5, 0.5),
            direction_y: UniformRange::new(-0.5, 0.3),
            direction_z: UniformRange::new(-0.5, 0.5),
            wiggle_amplitude: UniformRange::new(0.01, 0.03),
            wiggle_speed: UniformRange::new(2.0, 4.0),
            hue: UniformRange::new(0.08, 0.16),
            saturation: 0.5,
            lightness: UniformRange::new(0.5, 0.7),
            point_size: 0.08,
            seed: None,
        }
    }
}

impl FlameConfig {
    fn validate(&self) -> Result<()> {
        self.direction_x.validate("direction_x")?;
        self.direction_y.validate("direction_y")?;
        self.direction_z.validate("direction_z")?;
        self.wiggle_amplitude.validate("wiggle_amplitude")?;
        self.wiggle_speed.validate("wiggle_speed")?;
        self.hue.validate("hue")?;
        self.lightness.validate("lightness")?;

        let spans_direction = [self.direction_x, self.direction_y, self.direction_z]
            .iter()
            .any(|range| range.min != 0.0 || range.max != 0.0);
        if !spans_direction {
            return Err(FlameVizError::config(
                "direction ranges must not all collapse to zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.saturation) {
            return Err(FlameVizError::config("saturation must lie in [0, 1]"));
        }
        if self.point_size <= 0.0 {
            return Err(FlameVizError::config("point_size must be positive"));
        }
        Ok(())
    }
}

/// Constants of the spread pursuit filter and the positional jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Spread reached at full signal level, in scene units.
    pub spread_scale: f32,
    /// Pursuit coefficient while the spread is below its target.
    pub attack: f32,
    /// Pursuit coefficient while the spread is at or above its target.
    pub decay: f32,
    /// Amplitude of the horizontal circular flicker.
    pub jitter: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            spread_scale: 20.0,
            attack: 0.2,
            decay: 0.008,
            jitter: 0.01,
        }
    }
}

impl AnimationConfig {
    fn validate(&self) -> Result<()> {
        if self.spread_scale.is_nan() || self.spread_scale < 0.0 {
            return Err(FlameVizError::config("spread_scale must be non-negative"));
        }
        if !self.jitter.is_finite() {
            return Err(FlameVizError::config("jitter must be finite"));
        }
        for (name, value) in [("attack", self.attack), ("decay", self.decay)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(FlameVizError::config(format!(
                    "{name} coefficient must lie in (0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Pacing of the frame loop when no display refresh drives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub target_fps: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { target_fps: 60 }
    }
}

impl FrameConfig {
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }

    fn validate(&self) -> Result<()> {
        if self.target_fps == 0 {
            return Err(FlameVizError::config("target_fps must be at least 1"));
        }
        Ok(())
    }
}
