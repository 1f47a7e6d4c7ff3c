use std::f32::consts::TAU;

use glam::Vec3;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    anchors::Anchor,
    config::{FlameConfig, UniformRange},
    render::PointStyle,
};

/// Particles spawned per anchor.
pub const PARTICLES_PER_GROUP: usize = 3;

/// One animated flame point.
///
/// Everything except the spread is fixed at construction. The spread is only
/// ever written by [`SpreadModel`](crate::animation::SpreadModel).
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    base: Vec3,
    direction: Vec3,
    phase: f32,
    wiggle_amplitude: f32,
    wiggle_speed: f32,
    style: PointStyle,
    pub(crate) current_spread: f32,
}

impl Particle {
    /// Builds a particle at rest. Returns `None` if `direction` cannot be
    /// normalised.
    pub fn new(
        anchor: Anchor,
        direction: Vec3,
        phase: f32,
        wiggle_amplitude: f32,
        wiggle_speed: f32,
    ) -> Option<Self> {
        Some(Self {
            base: anchor.position(),
            direction: direction.try_normalize()?,
            phase,
            wiggle_amplitude,
            wiggle_speed,
            style: PointStyle::default(),
            current_spread: 0.0,
        })
    }

    pub fn base(&self) -> Vec3 {
        self.base
    }

    /// Unit vector the particle drifts along as its spread grows.
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn wiggle_amplitude(&self) -> f32 {
        self.wiggle_amplitude
    }

    pub fn wiggle_speed(&self) -> f32 {
        self.wiggle_speed
    }

    pub fn style(&self) -> &PointStyle {
        &self.style
    }

    pub fn current_spread(&self) -> f32 {
        self.current_spread
    }
}

/// The particles sharing one anchor. They hold no state in common.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleGroup {
    anchor: Anchor,
    particles: [Particle; PARTICLES_PER_GROUP],
}

impl ParticleGroup {
    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub(crate) fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }
}

/// Creates particle groups with independently randomised motion.
#[derive(Debug)]
pub struct FlameFactory<R = StdRng> {
    config: FlameConfig,
    rng: R,
}

impl FlameFactory<StdRng> {
    /// Seeds from `config.seed`, or from entropy when unset.
    pub fn new(config: FlameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }
}

impl<R: Rng> FlameFactory<R> {
    pub fn with_rng(config: FlameConfig, rng: R) -> Self {
        Self { config, rng }
    }

    pub fn create_group(&mut self, anchor: Anchor) -> ParticleGroup {
        ParticleGroup {
            anchor,
            particles: std::array::from_fn(|_| self.create_particle(anchor)),
        }
    }

    fn create_particle(&mut self, anchor: Anchor) -> Particle {
        let direction = self.sample_direction();
        let style = PointStyle {
            color: hsl_to_rgb(
                self.sample(self.config.hue),
                self.config.saturation,
                self.sample(self.config.lightness),
            ),
            size: self.config.point_size,
        };

        Particle {
            base: anchor.position(),
            direction,
            phase: self.rng.gen_range(0.0..TAU),
            wiggle_amplitude: self.sample(self.config.wiggle_amplitude),
            wiggle_speed: self.sample(self.config.wiggle_speed),
            style,
            current_spread: 0.0,
        }
    }

    /// Redraws until the sample has a usable length.
    fn sample_direction(&mut self) -> Vec3 {
        loop {
            let raw = Vec3::new(
                self.sample(self.config.direction_x),
                self.sample(self.config.direction_y),
                self.sample(self.config.direction_z),
            );
            if let Some(direction) = raw.try_normalize() {
                return direction;
            }
        }
    }

    fn sample(&mut self, range: UniformRange) -> f32 {
        if range.min < range.max {
            self.rng.gen_range(range.min..range.max)
        } else {
            range.min
        }
    }
}

/// HSL in [0, 1] to linear RGB in [0, 1].
fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [f32; 3] {
    if saturation <= 0.0 {
        return [lightness; 3];
    }

    let q = if lightness <= 0.5 {
        lightness * (1.0 + saturation)
    } else {
        lightness + saturation - lightness * saturation
    };
    let p = 2.0 * lightness - q;

    [
        hue_to_channel(p, q, hue + 1.0 / 3.0),
        hue_to_channel(p, q, hue),
        hue_to_channel(p, q, hue - 1.0 / 3.0),
    ]
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * 6.0 * (2.0 / 3.0 - t)
    } else {
        p
    }
}
