use super::Vertex;

/// Emits an axis-aligned box centred on the origin: 24 vertices (four per
/// face, none shared between faces) and 36 indices.
///
/// With `tile_size = Some([tw, th])` the UV extent of each face is its world
/// size divided by the tile size, so a repeating texture keeps true scale.
/// With `None` every UV is `(0, 0)` and the box is shaded with `color`.
pub fn build_box(
    dimension: [f32; 3],
    color: [f32; 3],
    tile_size: Option<[f32; 2]>,
) -> (Vec<Vertex>, Vec<u32>) {
    let [xh, yh, zh] = dimension.map(|d| d / 2.0);

    let (xtw, ytw, yth, zth) = match tile_size {
        Some([tw, th]) => (
            dimension[0] / tw,
            dimension[1] / tw,
            dimension[1] / th,
            dimension[2] / th,
        ),
        None => (0.0, 0.0, 0.0, 0.0),
    };

    let v = |p: [f32; 3], uv: [f32; 2]| Vertex::new(p, uv, color);

    let vertices = vec![
        // -Z
        v([-xh, -yh, -zh], [0.0, 0.0]),
        v([xh, -yh, -zh], [xtw, 0.0]),
        v([xh, yh, -zh], [xtw, yth]),
        v([-xh, yh, -zh], [0.0, yth]),
        // +Z
        v([-xh, -yh, zh], [0.0, 0.0]),
        v([xh, -yh, zh], [xtw, 0.0]),
        v([xh, yh, zh], [xtw, yth]),
        v([-xh, yh, zh], [0.0, yth]),
        // -Y
        v([-xh, -yh, -zh], [0.0, 0.0]),
        v([xh, -yh, -zh], [xtw, 0.0]),
        v([xh, -yh, zh], [xtw, zth]),
        v([-xh, -yh, zh], [0.0, zth]),
        // +Y
        v([-xh, yh, -zh], [0.0, 0.0]),
        v([xh, yh, -zh], [xtw, 0.0]),
        v([xh, yh, zh], [xtw, zth]),
        v([-xh, yh, zh], [0.0, zth]),
        // -X
        v([-xh, -yh, -zh], [0.0, 0.0]),
        v([-xh, yh, -zh], [ytw, 0.0]),
        v([-xh, yh, zh], [ytw, zth]),
        v([-xh, -yh, zh], [0.0, zth]),
        // +X
        v([xh, -yh, -zh], [0.0, 0.0]),
        v([xh, yh, -zh], [ytw, 0.0]),
        v([xh, yh, zh], [ytw, zth]),
        v([xh, -yh, zh], [0.0, zth]),
    ];

    let indices = (0..6u32)
        .flat_map(|face| {
            let i = face * 4;
            [i, i + 1, i + 2, i, i + 2, i + 3]
        })
        .collect();

    (vertices, indices)
}
