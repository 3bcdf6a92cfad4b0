//! STL reading and writing through `stl_io`.
//!
//! STL stores a triangle soup; `stl_io` merges bitwise identical corners, so
//! shared vertices come back shared. Triangles that collapse onto a repeated
//! vertex are dropped. Polygons are fan-split on output.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};

use super::{assemble, load_error, save_error};
use crate::error::Result;
use crate::mesh::{to_triangles, HalfEdgeMesh, MeshIndex};

/// Parse binary or ASCII STL into positions and triangles.
pub fn read<R: Read + Seek>(reader: &mut R) -> std::io::Result<(Vec<Point3<f64>>, Vec<Vec<usize>>)> {
    let stl = stl_io::read_stl(reader)?;
    let vertices = stl
        .vertices
        .iter()
        .map(|v| Point3::new(f64::from(v[0]), f64::from(v[1]), f64::from(v[2])))
        .collect();
    let faces = stl
        .faces
        .iter()
        .map(|t| t.vertices)
        .filter(|[a, b, c]| a != b && b != c && c != a)
        .map(|t| t.to_vec())
        .collect();
    Ok((vertices, faces))
}

/// Load a mesh from an STL file.
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let (vertices, faces) = read(&mut file).map_err(|e| load_error(path, e.to_string()))?;
    assemble(path, &vertices, &faces)
}

fn vertex(p: &Point3<f64>) -> stl_io::Vertex {
    stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32])
}

/// Write a mesh as binary STL.
pub fn write<W: Write, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, writer: &mut W) -> std::io::Result<()> {
    let (points, triangles) = to_triangles(mesh);
    let triangles: Vec<stl_io::Triangle> = triangles
        .iter()
        .map(|&[a, b, c]| {
            let [pa, pb, pc] = [points[a], points[b], points[c]];
            let n = (pb - pa)
                .cross(&(pc - pa))
                .try_normalize(1e-20)
                .unwrap_or_else(Vector3::zeros);
            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [vertex(&pa), vertex(&pb), vertex(&pc)],
            }
        })
        .collect();
    stl_io::write_stl(writer, triangles.iter())
}

/// Save a mesh to a binary STL file.
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    write(mesh, &mut writer).map_err(|e| save_error(path, e.to_string()))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;
    use std::io::Cursor;

    #[test]
    fn test_binary_round_trip_shares_vertices() {
        let mesh = fixtures::icosahedron();
        let mut buffer = Vec::new();
        write(&mesh, &mut buffer).unwrap();
        // 80-byte header, count, 50 bytes per triangle
        assert_eq!(buffer.len(), 84 + 50 * 20);

        let (vertices, faces) = read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(vertices.len(), 12);
        assert_eq!(faces.len(), 20);
        let rebuilt: HalfEdgeMesh = crate::mesh::build_from_polygons(&vertices, &faces).unwrap();
        assert!(rebuilt.is_closed());
    }

    #[test]
    fn test_ascii_input_drops_collapsed_triangles() {
        let text = "solid t
facet normal 0 0 1
outer loop
vertex 0 0 0
vertex 1 0 0
vertex 0 1 0
endloop
endfacet
facet normal 0 0 1
outer loop
vertex 1 0 0
vertex 1 0 0
vertex 0 1 0
endloop
endfacet
endsolid t
";
        let (vertices, faces) = read(&mut Cursor::new(text.as_bytes().to_vec())).unwrap();
        assert_eq!(vertices.len(), 3);
        assert_eq!(faces.len(), 1);
    }
}
