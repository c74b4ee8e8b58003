//! Scene inputs for the camera simulator.
//!
//! - `map`: the `map.json` description of a static 3D map (models, procedural
//!   boxes, static placements and tracked frame identifiers).
//! - `obj`: a small Wavefront OBJ reader yielding raw position/texcoord
//!   corners, one per triangle corner.
//!
//! Neither module touches the GPU; the simulator core turns these
//! descriptions into render-ready geometry.

pub mod map;
pub mod obj;

pub use self::map::{ModelDef, ModelSource, Placement, SceneDescription, Surface};
pub use self::obj::{load_obj, parse_obj, ObjCorner, ObjMesh};
