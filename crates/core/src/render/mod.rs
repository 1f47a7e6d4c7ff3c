use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Appearance of one flame point, fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointStyle {
    pub color: [f32; 3],
    pub size: f32,
}

impl Default for PointStyle {
    fn default() -> Self {
        Self {
            color: [1.0, 0.6, 0.2],
            size: 0.08,
        }
    }
}

/// Externally owned renderable that receives particle positions.
pub trait PointSink {
    /// Replaces the point set; called whenever particles are spawned.
    fn reset(&mut self, styles: &[PointStyle]);

    /// Updates the position of point `index` for the current frame.
    fn write_position(&mut self, index: usize, position: Vec3);

    /// Hands the frame to the renderer.
    fn present(&mut self) -> Result<()>;
}

/// Plain in-memory point buffer, used by the CLI and in tests.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    styles: Vec<PointStyle>,
    positions: Vec<Vec3>,
    frames_presented: u64,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn styles(&self) -> &[PointStyle] {
        &self.styles
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Serialisable copy of the current buffer contents.
    pub fn snapshot(&self) -> PointCloudSnapshot {
        PointCloudSnapshot {
            frames_presented: self.frames_presented,
            points: self
                .positions
                .iter()
                .zip(&self.styles)
                .map(|(position, style)| PointRecord {
                    position: position.to_array(),
                    color: style.color,
                    size: style.size,
                })
                .collect(),
        }
    }
}

impl PointSink for PointCloud {
    fn reset(&mut self, styles: &[PointStyle]) {
        self.styles = styles.to_vec();
        self.positions.clear();
        self.positions.resize(styles.len(), Vec3::ZERO);
    }

    fn write_position(&mut self, index: usize, position: Vec3) {
        if index >= self.positions.len() {
            self.positions.resize(index + 1, Vec3::ZERO);
            self.styles.resize(index + 1, PointStyle::default());
        }
        self.positions[index] = position;
    }

    fn present(&mut self) -> Result<()> {
        self.frames_presented += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudSnapshot {
    pub frames_presented: u64,
    pub points: Vec<PointRecord>,
}
