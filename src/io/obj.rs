//! Wavefront OBJ reading and writing.
//!
//! Reads `v`, `vt` and `f` statements; face corners may be written as `v`,
//! `v/vt`, `v//vn` or `v/vt/vn`, with negative indices counting back from
//! the latest vertex. Groups, materials, normals and free-form geometry are
//! ignored. When every face corner uses the texture coordinate with the same
//! index as its vertex, the coordinates are stored in `"v:tex"`.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::{Point2, Point3};

use super::{assemble, load_error};
use crate::algo::parameterize::TEX_COORD_PROPERTY;
use crate::error::Result;
use crate::mesh::{ElementKind, HalfEdgeMesh, MeshIndex};

/// Parsed OBJ content.
#[derive(Debug, Clone, Default)]
pub struct ObjData {
    /// Vertex positions.
    pub vertices: Vec<Point3<f64>>,
    /// Texture coordinates.
    pub tex_coords: Vec<Point2<f64>>,
    /// Faces as zero-based vertex indices.
    pub faces: Vec<Vec<usize>>,
    /// Whether every corner's texture index equals its vertex index.
    pub tex_per_vertex: bool,
}

fn resolve(token: &str, count: usize, line: usize) -> std::result::Result<usize, String> {
    let raw: i64 = token
        .parse()
        .map_err(|_| format!("line {}: bad index '{}'", line, token))?;
    let index = match raw {
        0 => return Err(format!("line {}: index 0 is not allowed", line)),
        r if r > 0 => r - 1,
        r => count as i64 + r,
    };
    if index < 0 {
        return Err(format!("line {}: relative index {} out of range", line, raw));
    }
    Ok(index as usize)
}

fn coords<const N: usize>(parts: &mut std::str::SplitWhitespace<'_>, line: usize) -> std::result::Result<[f64; N], String> {
    let mut out = [0.0; N];
    for value in out.iter_mut() {
        let token = parts
            .next()
            .ok_or_else(|| format!("line {}: expected {} coordinates", line, N))?;
        *value = token
            .parse()
            .map_err(|_| format!("line {}: bad number '{}'", line, token))?;
    }
    Ok(out)
}

/// Parse OBJ text. Errors carry the offending line number.
pub fn read<R: BufRead>(reader: R) -> std::result::Result<ObjData, String> {
    let mut data = ObjData {
        tex_per_vertex: true,
        ..Default::default()
    };
    let mut any_tex_corner = false;

    for (number, line) in reader.lines().enumerate() {
        let number = number + 1;
        let line = line.map_err(|e| e.to_string())?;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("v") => {
                let [x, y, z] = coords::<3>(&mut parts, number)?;
                data.vertices.push(Point3::new(x, y, z));
            }
            Some("vt") => {
                let [u, v] = coords::<2>(&mut parts, number)?;
                data.tex_coords.push(Point2::new(u, v));
            }
            Some("f") => {
                let mut face = Vec::new();
                for corner in parts {
                    let mut fields = corner.split('/');
                    let vertex = resolve(fields.next().unwrap_or(""), data.vertices.len(), number)?;
                    match fields.next().filter(|t| !t.is_empty()) {
                        Some(t) => {
                            any_tex_corner = true;
                            if resolve(t, data.tex_coords.len(), number)? != vertex {
                                data.tex_per_vertex = false;
                            }
                        }
                        None => data.tex_per_vertex = false,
                    }
                    face.push(vertex);
                }
                if face.len() < 3 {
                    return Err(format!("line {}: face with {} corners", number, face.len()));
                }
                data.faces.push(face);
            }
            _ => {}
        }
    }

    data.tex_per_vertex &= any_tex_corner && data.tex_coords.len() == data.vertices.len();
    Ok(data)
}

/// Load a mesh from an OBJ file.
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let data = read(BufReader::new(file)).map_err(|message| load_error(path, message))?;
    let mut mesh = assemble(path, &data.vertices, &data.faces)?;
    if data.tex_per_vertex {
        mesh.properties_mut()
            .set(ElementKind::Vertex, TEX_COORD_PROPERTY, data.tex_coords, Point2::origin())?;
    }
    Ok(mesh)
}

/// Write a mesh as OBJ text, with texture coordinates when `"v:tex"` exists.
pub fn write<W: Write, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, writer: &mut W) -> std::io::Result<()> {
    let tex = mesh.vertex_property::<Point2<f64>>(TEX_COORD_PROPERTY).ok();
    let mut index = vec![0usize; mesh.vertex_slots()];

    writeln!(writer, "# {} vertices, {} faces", mesh.num_vertices(), mesh.num_faces())?;
    for (i, v) in mesh.vertex_ids().enumerate() {
        index[v.index()] = i + 1;
        let p = mesh.position(v);
        writeln!(writer, "v {} {} {}", p.x, p.y, p.z)?;
    }
    if let Some(tex) = tex {
        for v in mesh.vertex_ids() {
            let uv = tex[v.index()];
            writeln!(writer, "vt {} {}", uv.x, uv.y)?;
        }
    }
    for f in mesh.face_ids() {
        write!(writer, "f")?;
        for v in mesh.face_vertices(f) {
            let i = index[v.index()];
            if tex.is_some() {
                write!(writer, " {}/{}", i, i)?;
            } else {
                write!(writer, " {}", i)?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Save a mesh to an OBJ file.
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write(mesh, &mut writer)?;
    writer.flush()?;
    Ok(())
}
