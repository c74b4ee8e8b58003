//! Minimal Wavefront OBJ reader.
//!
//! Only what a camera simulator needs is kept: positions (`v`), texture
//! coordinates (`vt`) and faces (`f`). Polygons are fan-triangulated, so
//! every three consecutive corners in [`ObjMesh::corners`] form a triangle.

use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// One triangle corner, as zero-based indices into the mesh attribute lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjCorner {
    pub position: u32,
    pub texcoord: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjMesh {
    pub positions: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub corners: Vec<ObjCorner>,
    /// Non-fatal issues, e.g. unsupported statements.
    pub warnings: Vec<String>,
}

impl ObjMesh {
    pub fn triangle_count(&self) -> usize {
        self.corners.len() / 3
    }
}

/// Reads and parses an OBJ file.
pub fn load_obj(path: &Path) -> Result<ObjMesh> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    parse_obj(file)
}

/// Parses OBJ text. On failure the error message carries every warning
/// collected before the failing line.
pub fn parse_obj<R: Read>(reader: R) -> Result<ObjMesh> {
    let mut mesh = ObjMesh::default();
    match parse_into(reader, &mut mesh) {
        Ok(()) => Ok(mesh),
        Err(err) if mesh.warnings.is_empty() => Err(err),
        Err(err) => Err(anyhow!("{}\n{:#}", mesh.warnings.join("\n"), err)),
    }
}

fn parse_into<R: Read>(reader: R, mesh: &mut ObjMesh) -> Result<()> {
    for (line_no, line_result) in BufReader::new(reader).lines().enumerate() {
        let line = line_result?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };
        let line_no = line_no + 1;

        match keyword {
            "v" => {
                let x = parse_f32(parts.next(), "x", line_no)?;
                let y = parse_f32(parts.next(), "y", line_no)?;
                let z = parse_f32(parts.next(), "z", line_no)?;
                mesh.positions.push([x, y, z]);
            }
            "vt" => {
                let u = parse_f32(parts.next(), "u", line_no)?;
                // Some exporters write 1D texture coordinates.
                let v = match parts.next() {
                    Some(s) => parse_f32(Some(s), "v", line_no)?,
                    None => 0.0,
                };
                mesh.texcoords.push([u, v]);
            }
            "f" => {
                let corners = parts
                    .map(|token| parse_corner(token, mesh, line_no))
                    .collect::<Result<Vec<_>>>()?;
                if corners.len() < 3 {
                    bail!("line {}: face with {} corners", line_no, corners.len());
                }
                for i in 1..corners.len() - 1 {
                    mesh.corners.push(corners[0]);
                    mesh.corners.push(corners[i]);
                    mesh.corners.push(corners[i + 1]);
                }
            }
            "vn" | "vp" | "o" | "g" | "s" | "usemtl" | "mtllib" | "l" | "p" => {}
            other => mesh
                .warnings
                .push(format!("line {}: unsupported statement '{}'", line_no, other)),
        }
    }

    for c in &mesh.corners {
        if c.position as usize >= mesh.positions.len() {
            bail!(
                "position index {} out of range ({} positions)",
                c.position + 1,
                mesh.positions.len()
            );
        }
        if let Some(t) = c.texcoord {
            if t as usize >= mesh.texcoords.len() {
                bail!(
                    "texcoord index {} out of range ({} texcoords)",
                    t + 1,
                    mesh.texcoords.len()
                );
            }
        }
    }

    Ok(())
}

fn parse_f32(token: Option<&str>, what: &str, line_no: usize) -> Result<f32> {
    let token = token.with_context(|| format!("line {}: missing {} value", line_no, what))?;
    token
        .parse()
        .with_context(|| format!("line {}: invalid {} value '{}'", line_no, what, token))
}

/// Resolves a 1-based (or negative, relative) OBJ index to zero-based.
fn resolve_index(token: &str, count: usize, line_no: usize) -> Result<u32> {
    let idx: i64 = token
        .parse()
        .with_context(|| format!("line {}: invalid index '{}'", line_no, token))?;
    let resolved = match idx {
        0 => bail!("line {}: index 0 is not valid in OBJ", line_no),
        i if i > 0 => i - 1,
        i => count as i64 + i,
    };
    u32::try_from(resolved).map_err(|_| anyhow!("line {}: index '{}' out of range", line_no, token))
}

fn parse_corner(token: &str, mesh: &ObjMesh, line_no: usize) -> Result<ObjCorner> {
    let mut fields = token.split('/');
    let position = resolve_index(
        fields.next().unwrap_or_default(),
        mesh.positions.len(),
        line_no,
    )?;
    let texcoord = match fields.next() {
        Some(t) if !t.is_empty() => Some(resolve_index(t, mesh.texcoords.len(), line_no)?),
        _ => None,
    };
    Ok(ObjCorner { position, texcoord })
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
# unit quad
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn fan_triangulates_quads() {
        let mesh = parse_obj(QUAD.as_bytes()).unwrap();
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.texcoords.len(), 4);
        assert_eq!(mesh.triangle_count(), 2);

        let pos: Vec<u32> = mesh.corners.iter().map(|c| c.position).collect();
        assert_eq!(pos, [0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.corners[4].texcoord, Some(2));
        assert!(mesh.warnings.is_empty());
    }

    #[test]
    fn supports_relative_and_normal_only_forms() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3//1 -2//1 -1//1\n";
        let mesh = parse_obj(text.as_bytes()).unwrap();
        assert_eq!(
            mesh.corners,
            [
                ObjCorner { position: 0, texcoord: None },
                ObjCorner { position: 1, texcoord: None },
                ObjCorner { position: 2, texcoord: None },
            ]
        );
    }

    #[test]
    fn out_of_range_index_fails() {
        let text = "v 0 0 0\nv 1 0 0\nf 1 2 3\n";
        let err = parse_obj(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn error_text_includes_warnings() {
        let text = "curv 0 1\nv 0 0 zero\n";
        let err = format!("{:#}", parse_obj(text.as_bytes()).unwrap_err());
        assert!(err.contains("unsupported statement 'curv'"));
        assert!(err.contains("invalid z value 'zero'"));
    }

    #[test]
    fn degenerate_face_fails() {
        let text = "v 0 0 0\nv 1 0 0\nf 1 2\n";
        assert!(parse_obj(text.as_bytes()).is_err());
    }

    #[test]
    fn missing_file_fails() {
        assert!(load_obj(Path::new("/nonexistent/model.obj")).is_err());
    }
}
