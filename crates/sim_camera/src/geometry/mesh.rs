use super::Vertex;
use scene_map::ObjMesh;
use std::collections::HashMap;

/// Collapses identical (position, colour, texcoord) corners into one vertex.
///
/// Texture V is flipped so that `v = 0` addresses the top row of the image.
/// Meshes without texture coordinates get `(0, 0)`, which makes the shader
/// fall back to the vertex colour.
pub fn build_mesh(obj: &ObjMesh, color: [f32; 3]) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::with_capacity(obj.corners.len());
    let mut unique: HashMap<Vertex, u32> = HashMap::with_capacity(obj.corners.len());

    for corner in &obj.corners {
        let position = obj.positions[corner.position as usize];
        let tex_coord = match corner.texcoord {
            Some(t) => {
                let [u, v] = obj.texcoords[t as usize];
                [u, 1.0 - v]
            }
            None => [0.0, 0.0],
        };
        let vertex = Vertex::new(position, tex_coord, color);

        let index = *unique.entry(vertex).or_insert_with(|| {
            vertices.push(vertex);
            (vertices.len() - 1) as u32
        });
        indices.push(index);
    }

    (vertices, indices)
}
