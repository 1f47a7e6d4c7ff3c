use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{
    anchors::Anchor,
    config::AnimationConfig,
    flame::{FlameFactory, Particle, ParticleGroup},
    render::PointSink,
};

/// Per-frame kinematics of a flame particle.
///
/// The spread follows `level * spread_scale` through a one-pole filter whose
/// coefficient depends on direction: `attack` while growing, `decay` while
/// shrinking. The filter is a convex blend, so the spread approaches its
/// target from either side without ever crossing it.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadModel {
    spread_scale: f32,
    attack: f32,
    decay: f32,
    jitter: f32,
}

impl SpreadModel {
    pub fn new(config: &AnimationConfig) -> Self {
        Self {
            spread_scale: config.spread_scale,
            attack: config.attack,
            decay: config.decay,
            jitter: config.jitter,
        }
    }

    pub fn target_spread(&self, level: f32) -> f32 {
        level.clamp(0.0, 1.0) * self.spread_scale
    }

    /// One step of the asymmetric pursuit.
    pub fn pursue(&self, current: f32, target: f32) -> f32 {
        let coefficient = if current < target {
            self.attack
        } else {
            self.decay
        };
        current + (target - current) * coefficient
    }

    /// Moves the particle's spread one frame towards the level's target and
    /// returns where it should be drawn at `elapsed` seconds.
    pub fn advance(&self, particle: &mut Particle, elapsed: f32, level: f32) -> Vec3 {
        let target = self.target_spread(level);
        particle.current_spread = self.pursue(particle.current_spread, target);
        self.position(particle, elapsed)
    }

    /// Rendered position for the particle's current spread.
    pub fn position(&self, particle: &Particle, elapsed: f32) -> Vec3 {
        let spread = particle.current_spread();
        let phase = particle.phase();
        let wiggle =
            particle.wiggle_amplitude() * (elapsed * particle.wiggle_speed() + phase).sin();
        let flicker = Vec3::new(
            (elapsed + phase).sin() * self.jitter,
            wiggle,
            (elapsed + phase).cos() * self.jitter,
        );

        particle.base() + particle.direction() * spread + flicker
    }
}

impl Default for SpreadModel {
    fn default() -> Self {
        Self::new(&AnimationConfig::default())
    }
}

/// Spread statistics over all live particles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub particles: usize,
    pub mean_spread: f32,
    pub max_spread: f32,
}

/// Owns every flame group and advances them once per frame.
#[derive(Debug, Default)]
pub struct FlameField {
    model: SpreadModel,
    groups: Vec<ParticleGroup>,
}

impl FlameField {
    pub fn new(model: SpreadModel) -> Self {
        Self {
            model,
            groups: Vec::new(),
        }
    }

    /// Creates one group per anchor. Returns how many groups were added.
    pub fn spawn<R: rand::Rng>(
        &mut self,
        factory: &mut FlameFactory<R>,
        anchors: &[Anchor],
    ) -> usize {
        self.groups
            .extend(anchors.iter().map(|anchor| factory.create_group(*anchor)));
        anchors.len()
    }

    pub fn groups(&self) -> &[ParticleGroup] {
        &self.groups
    }

    pub fn particles(&self) -> impl Iterator<Item = &Particle> + '_ {
        self.groups.iter().flat_map(|group| group.particles())
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.particles().count()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn model(&self) -> &SpreadModel {
        &self.model
    }

    /// Advances every particle and writes its position into `sink`, in
    /// particle order.
    pub fn advance_all(&mut self, elapsed: f32, level: f32, sink: &mut dyn PointSink) {
        let model = &self.model;
        let particles = self
            .groups
            .iter_mut()
            .flat_map(|group| group.particles_mut().iter_mut());
        for (index, particle) in particles.enumerate() {
            sink.write_position(index, model.advance(particle, elapsed, level));
        }
    }

    pub fn stats(&self) -> FieldStats {
        let mut stats = FieldStats::default();
        let mut total = 0.0;
        for particle in self.particles() {
            stats.particles += 1;
            total += particle.current_spread();
            stats.max_spread = stats.max_spread.max(particle.current_spread());
        }
        if stats.particles > 0 {
            stats.mean_spread = total / stats.particles as f32;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        anchors::AnchorExtractor, config::FlameConfig, flame::PARTICLES_PER_GROUP,
        render::PointCloud,
    };

    fn particle() -> Particle {
        Particle::new(
            Anchor::new(Vec3::new(1.0, 2.0, 3.0)),
            Vec3::new(1.0, 0.0, 0.0),
            0.0,
            0.02,
            3.0,
        )
        .unwrap()
    }

    fn frames_to_settle(model: &SpreadModel, mut spread: f32, level: f32, epsilon: f32) -> usize {
        let target = model.target_spread(level);
        let mut frames = 0;
        while (spread - target).abs() > epsilon {
            spread = model.pursue(spread, target);
            frames += 1;
            assert!(frames < 10_000, "pursuit failed to converge");
        }
        frames
    }

    #[test]
    fn target_spread_scales_and_is_monotonic() {
        let model = SpreadModel::default();
        assert_eq!(model.target_spread(0.0), 0.0);
        assert_eq!(model.target_spread(1.0), 20.0);
        assert!((model.target_spread(0.25) - 5.0).abs() < 1e-6);

        let mut previous = f32::MIN;
        for step in 0..=100 {
            let target = model.target_spread(step as f32 / 100.0);
            assert!(target >= previous);
            previous = target;
        }
    }

    #[test]
    fn silence_decays_slowly() {
        let model = SpreadModel::default();
        let mut particle = particle();
        particle.current_spread = 5.0;

        model.advance(&mut particle, 0.0, 0.0);

        assert!((particle.current_spread() - 4.96).abs() < 1e-6);
    }

    #[test]
    fn full_level_attacks_fast() {
        let model = SpreadModel::default();
        let mut particle = particle();

        model.advance(&mut particle, 0.0, 1.0);

        assert!((particle.current_spread() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn attack_settles_within_twenty_five_frames() {
        let model = SpreadModel::default();
        assert!(frames_to_settle(&model, 0.0, 0.05, 0.01) <= 25);
    }

    #[test]
    fn decay_settles_within_five_hundred_seventy_five_frames() {
        let model = SpreadModel::default();
        let frames = frames_to_settle(&model, 1.0, 0.0, 0.01);
        assert!(frames > 25);
        assert!(frames <= 575);
    }

    #[test]
    fn pursuit_never_overshoots() {
        let model = SpreadModel::default();
        for start in [0.0, 3.0, 10.0, 20.0] {
            for level in [0.0, 0.1, 0.5, 0.9, 1.0] {
                let target = model.target_spread(level);
                let mut spread = start;
                for _ in 0..2_000 {
                    let next = model.pursue(spread, target);
                    if start <= target {
                        assert!(next >= spread - 1e-6 && next <= target + 1e-6);
                    } else {
                        assert!(next <= spread + 1e-6 && next >= target - 1e-6);
                    }
                    spread = next;
                }
            }
        }
    }

    #[test]
    fn position_combines_spread_wiggle_and_flicker() {
        let model = SpreadModel::default();
        let mut particle = particle();
        let elapsed = 1.3_f32;

        let position = model.advance(&mut particle, elapsed, 0.5);

        let spread = 2.0;
        let expected = Vec3::new(
            1.0 + spread + elapsed.sin() * 0.01,
            2.0 + 0.02 * (elapsed * 3.0).sin(),
            3.0 + elapsed.cos() * 0.01,
        );
        assert!((particle.current_spread() - spread).abs() < 1e-6);
        assert!((position - expected).length() < 1e-5);
    }

    #[test]
    fn idle_flames_stay_close_to_their_anchor() {
        let model = SpreadModel::default();
        let mut particle = particle();
        for frame in 0..600 {
            let position = model.advance(&mut particle, frame as f32 / 60.0, 0.0);
            assert!((position - particle.base()).length() < 0.05);
        }
        assert_eq!(particle.current_spread(), 0.0);
    }

    #[test]
    fn field_advances_every_particle_into_the_sink() {
        let anchors = AnchorExtractor::default()
            .extract([[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 1.0]].map(Vec3::from_array));
        let mut factory = FlameFactory::new(FlameConfig {
            seed: Some(1),
            ..FlameConfig::default()
        });
        let mut field = FlameField::new(SpreadModel::default());

        assert_eq!(field.spawn(&mut factory, &anchors), 2);
        assert_eq!(field.len(), 2 * PARTICLES_PER_GROUP);

        let mut cloud = PointCloud::default();
        cloud.reset(&field.particles().map(|p| p.style().clone()).collect::<Vec<_>>());
        field.advance_all(0.5, 1.0, &mut cloud);

        assert_eq!(cloud.positions().len(), 6);
        for (particle, position) in field.particles().zip(cloud.positions()) {
            assert!((particle.current_spread() - 4.0).abs() < 1e-6);
            let expected = field.model().position(particle, 0.5);
            assert!((*position - expected).length() < 1e-6);
        }

        let stats = field.stats();
        assert_eq!(stats.particles, 6);
        assert!((stats.mean_spread - 4.0).abs() < 1e-6);
        assert!((stats.max_spread - 4.0).abs() < 1e-6);
    }

    #[test]
    fn empty_field_has_nothing_to_advance() {
        let mut field = FlameField::default();
        let mut cloud = PointCloud::default();

        field.advance_all(1.0, 1.0, &mut cloud);

        assert!(field.is_empty());
        assert!(cloud.positions().is_empty());
        assert_eq!(field.stats(), FieldStats::default());
    }
}
