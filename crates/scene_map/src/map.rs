//! `map.json` reader.
//!
//! A map directory holds a `map.json` plus the OBJ and image files it
//! references. Two arrays are recognised:
//!
//! ```json
//! {
//!   "model": [{ "name": "car", "file": "car.obj", "textureFile": "car.png",
//!               "instances": [[1.0, 2.0, 0.0, 0.5]], "frames": [1, 2] }],
//!   "block": [{ "name": "wall", "dimension": [4.0, 0.2, 2.0],
//!               "textureFile": "brick.png", "textureSize": [1.0, 0.5],
//!               "instances": [[0.0, 3.0, 1.0, 0.0]] }]
//! }
//! ```
//!
//! Instances are `[x, y, z, yaw]`. Every file reference is resolved relative
//! to the map directory.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const MAP_FILE_NAME: &str = "map.json";

/// Surface used when a definition names neither a colour nor a texture.
pub const DEFAULT_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

/// How a model is shaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Surface {
    /// Flat per-vertex colour (linear RGB, 0..1).
    Color([f32; 3]),
    /// Image file sampled with the model's texture coordinates.
    Texture(PathBuf),
}

impl Surface {
    pub fn color(&self) -> [f32; 3] {
        match self {
            Surface::Color(c) => *c,
            Surface::Texture(_) => [0.0; 3],
        }
    }

    pub fn texture_path(&self) -> Option<&Path> {
        match self {
            Surface::Color(_) => None,
            Surface::Texture(p) => Some(p),
        }
    }
}

/// Geometry definition for one named model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// Triangle mesh loaded from an OBJ file.
    FileMesh { path: PathBuf, surface: Surface },
    /// Axis-aligned box centred on the origin. `tile_size` is the world size
    /// covered by one repetition of the texture; it is ignored for colour
    /// surfaces.
    ProceduralBox {
        dimension: [f32; 3],
        surface: Surface,
        tile_size: [f32; 2],
    },
}

impl ModelSource {
    pub fn surface(&self) -> &Surface {
        match self {
            ModelSource::FileMesh { surface, .. } => surface,
            ModelSource::ProceduralBox { surface, .. } => surface,
        }
    }
}

/// A fixed world placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: [f32; 3],
    pub yaw: f32,
}

impl From<[f32; 4]> for Placement {
    fn from(v: [f32; 4]) -> Self {
        Self {
            position: [v[0], v[1], v[2]],
            yaw: v[3],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelDef {
    pub name: String,
    pub source: ModelSource,
    /// Static instances, always visible.
    pub instances: Vec<Placement>,
    /// Frame identifiers whose pose stream drives a tracked instance.
    pub frames: Vec<u32>,
}

/// Parsed map: file meshes first, then procedural boxes, each in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneDescription {
    pub models: Vec<ModelDef>,
}

#[derive(Deserialize)]
struct RawMap {
    #[serde(default)]
    model: Vec<RawModel>,
    #[serde(default)]
    block: Vec<RawBlock>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    name: String,
    file: String,
    color: Option<[f32; 3]>,
    texture_file: Option<String>,
    #[serde(default)]
    instances: Vec<[f32; 4]>,
    #[serde(default)]
    frames: Vec<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    name: String,
    dimension: [f32; 3],
    color: Option<[f32; 3]>,
    texture_file: Option<String>,
    texture_size: Option<[f32; 2]>,
    #[serde(default)]
    instances: Vec<[f32; 4]>,
    #[serde(default)]
    frames: Vec<u32>,
}

fn surface(base_dir: &Path, color: Option<[f32; 3]>, texture_file: Option<String>) -> Surface {
    match (texture_file, color) {
        (Some(file), _) => Surface::Texture(base_dir.join(file)),
        (None, Some(c)) => Surface::Color(c),
        (None, None) => Surface::Color(DEFAULT_COLOR),
    }
}

impl SceneDescription {
    /// Parses `map.json` text; relative paths are joined onto `base_dir`.
    pub fn from_json_str(text: &str, base_dir: &Path) -> Result<Self> {
        let raw: RawMap = serde_json::from_str(text).context("Invalid map description")?;

        let mut models = Vec::with_capacity(raw.model.len() + raw.block.len());

        for m in raw.model {
            models.push(ModelDef {
                source: ModelSource::FileMesh {
                    path: base_dir.join(&m.file),
                    surface: surface(base_dir, m.color, m.texture_file),
                },
                name: m.name,
                instances: m.instances.into_iter().map(Placement::from).collect(),
                frames: m.frames,
            });
        }

        for b in raw.block {
            if b.dimension.iter().any(|d| !d.is_finite() || *d <= 0.0) {
                bail!("Block '{}' has a non-positive dimension {:?}", b.name, b.dimension);
            }
            let tile_size = b.texture_size.unwrap_or([1.0, 1.0]);
            if b.texture_file.is_some() && tile_size.iter().any(|t| *t <= 0.0) {
                bail!("Block '{}' has a non-positive textureSize {:?}", b.name, tile_size);
            }
            models.push(ModelDef {
                source: ModelSource::ProceduralBox {
                    dimension: b.dimension,
                    surface: surface(base_dir, b.color, b.texture_file),
                    tile_size,
                },
                name: b.name,
                instances: b.instances.into_iter().map(Placement::from).collect(),
                frames: b.frames,
            });
        }

        let mut seen = HashSet::new();
        for m in &models {
            if !seen.insert(m.name.as_str()) {
                bail!("Duplicate model name '{}' in map description", m.name);
            }
        }

        Ok(Self { models })
    }

    /// Reads `<map_path>/map.json`.
    pub fn load_dir(map_path: &Path) -> Result<Self> {
        let file = map_path.join(MAP_FILE_NAME);
        let text = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        Self::from_json_str(&text, map_path)
    }

    /// Static placements as `(model name, placement)`, in map order.
    pub fn static_instances(&self) -> impl Iterator<Item = (&str, Placement)> + '_ {
        self.models
            .iter()
            .flat_map(|m| m.instances.iter().map(move |p| (m.name.as_str(), *p)))
    }

    /// Tracked frame identifiers as `(frame id, model name)`.
    pub fn tracked_frames(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.models
            .iter()
            .flat_map(|m| m.frames.iter().map(move |f| (*f, m.name.as_str())))
    }
}
