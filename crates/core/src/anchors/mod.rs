use std::{collections::HashMap, path::Path};

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::{config::AnchorConfig, Result};

/// Fixed world-space spawn point of one flame group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    position: Vec3,
}

impl Anchor {
    pub const fn new(position: Vec3) -> Self {
        Self { position }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }
}

/// Vertex buffer of a single named mesh, as handed over by the model loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshGeometry {
    pub name: String,
    #[serde(default)]
    pub positions: Vec<[f32; 3]>,
    /// Column-major world matrix. Identity when absent.
    #[serde(default)]
    pub transform: Option<[[f32; 4]; 4]>,
}

impl MeshGeometry {
    pub fn new(name: impl Into<String>, positions: Vec<[f32; 3]>) -> Self {
        Self {
            name: name.into(),
            positions,
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = Some(transform.to_cols_array_2d());
        self
    }

    /// Vertex positions with the world transform applied.
    pub fn world_positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        let transform = self
            .transform
            .map(|cols| Mat4::from_cols_array_2d(&cols))
            .unwrap_or(Mat4::IDENTITY);
        self.positions
            .iter()
            .map(move |position| transform.transform_point3(Vec3::from_array(*position)))
    }
}

/// Flat list of meshes making up a loaded model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneModel {
    pub meshes: Vec<MeshGeometry>,
}

impl SceneModel {
    pub fn new(meshes: Vec<MeshGeometry>) -> Self {
        Self { meshes }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn find_mesh(&self, name: &str) -> Option<&MeshGeometry> {
        self.meshes.iter().find(|mesh| mesh.name == name)
    }
}

/// Reduces candle geometry to one anchor per horizontal cell.
#[derive(Debug, Clone, Default)]
pub struct AnchorExtractor {
    config: AnchorConfig,
}

impl AnchorExtractor {
    pub fn new(config: AnchorConfig) -> Self {
        Self { config }
    }

    /// Anchors from the configured mesh of `model`. A missing or empty mesh is
    /// logged and yields no anchors.
    pub fn from_model(&self, model: &SceneModel) -> Vec<Anchor> {
        let mesh_name = self.config.mesh_name.as_str();
        match model.find_mesh(mesh_name) {
            Some(mesh) if !mesh.positions.is_empty() => {
                let anchors = self.extract(mesh.world_positions());
                tracing::info!(
                    mesh = mesh_name,
                    vertices = mesh.positions.len(),
                    anchors = anchors.len(),
                    "extracted flame anchors"
                );
                anchors
            }
            Some(_) => {
                tracing::warn!(mesh = mesh_name, "mesh has no geometry, no flames spawned");
                Vec::new()
            }
            None => {
                tracing::warn!(mesh = mesh_name, "mesh not found, no flames spawned");
                Vec::new()
            }
        }
    }

    /// Lifts every vertex, buckets by rounded (x, z) and keeps the highest
    /// vertex per bucket. Anchors come out in first-seen bucket order.
    pub fn extract(&self, positions: impl IntoIterator<Item = Vec3>) -> Vec<Anchor> {
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut anchors: Vec<Vec3> = Vec::new();

        for position in positions {
            let lifted = position + Vec3::Y * self.config.lift;
            let key = cell_key(lifted.x, lifted.z, self.config.precision);

            match slots.get(&key) {
                Some(&slot) => {
                    if anchors[slot].y < lifted.y {
                        anchors[slot] = lifted;
                    }
                }
                None => {
                    slots.insert(key, anchors.len());
                    anchors.push(lifted);
                }
            }
        }

        anchors.into_iter().map(Anchor::new).collect()
    }
}

/// Horizontal bucket label such as `"0.25|-1.00"`.
pub fn cell_key(x: f32, z: f32, precision: usize) -> String {
    format!("{}|{}", fixed(x, precision), fixed(z, precision))
}

/// Fixed-point text with exact decimal ties rounded away from zero, so
/// `0.125` becomes `0.13` rather than the half-to-even `0.12`.
fn fixed(value: f32, precision: usize) -> String {
    let value = f64::from(value);
    let scale = 10f64.powi(precision as i32);
    let magnitude = (value.abs() * scale).round() / scale;
    // -0.0 is not negative, so it shares the cell of 0.0.
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{magnitude:.precision$}")
}
