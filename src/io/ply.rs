//! PLY (Stanford polygon format) reading and writing through `ply-rs`.
//!
//! Any ASCII or binary file with a `vertex` element carrying `x`, `y`, `z`
//! and a `face` element carrying a `vertex_indices` (or `vertex_index`) list
//! is accepted. Output is ASCII with double precision coordinates.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use ply_rs::parser::Parser;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType, ScalarType,
};
use ply_rs::writer::Writer;

use super::{assemble, load_error, save_error};
use crate::error::Result;
use crate::mesh::{to_face_vertex, HalfEdgeMesh, MeshIndex};

fn scalar(element: &DefaultElement, key: &str) -> Option<f64> {
    Some(match element.get(key)? {
        Property::Double(v) => *v,
        Property::Float(v) => f64::from(*v),
        Property::Int(v) => f64::from(*v),
        Property::UInt(v) => f64::from(*v),
        Property::Short(v) => f64::from(*v),
        Property::UShort(v) => f64::from(*v),
        Property::Char(v) => f64::from(*v),
        Property::UChar(v) => f64::from(*v),
        _ => return None,
    })
}

fn index_list(element: &DefaultElement) -> Option<Vec<i64>> {
    let list = element.get("vertex_indices").or_else(|| element.get("vertex_index"))?;
    Some(match list {
        Property::ListInt(v) => v.iter().map(|&i| i64::from(i)).collect(),
        Property::ListUInt(v) => v.iter().map(|&i| i64::from(i)).collect(),
        Property::ListShort(v) => v.iter().map(|&i| i64::from(i)).collect(),
        Property::ListUShort(v) => v.iter().map(|&i| i64::from(i)).collect(),
        Property::ListChar(v) => v.iter().map(|&i| i64::from(i)).collect(),
        Property::ListUChar(v) => v.iter().map(|&i| i64::from(i)).collect(),
        _ => return None,
    })
}

/// Parse PLY content into positions and polygons.
pub fn read<R: BufRead>(reader: &mut R) -> std::result::Result<(Vec<Point3<f64>>, Vec<Vec<usize>>), String> {
    let ply = Parser::<DefaultElement>::new()
        .read_ply(reader)
        .map_err(|e| format!("malformed PLY: {}", e))?;

    let vertex_elements = ply.payload.get("vertex").ok_or("no vertex element")?;
    let vertices = vertex_elements
        .iter()
        .enumerate()
        .map(|(i, element)| match (scalar(element, "x"), scalar(element, "y"), scalar(element, "z")) {
            (Some(x), Some(y), Some(z)) => Ok(Point3::new(x, y, z)),
            _ => Err(format!("vertex {} lacks numeric x, y, z", i)),
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut faces = Vec::new();
    for (i, element) in ply.payload.get("face").map(Vec::as_slice).unwrap_or(&[]).iter().enumerate() {
        let list = index_list(element).ok_or_else(|| format!("face {} lacks a vertex index list", i))?;
        let face = list
            .into_iter()
            .map(|v| usize::try_from(v).map_err(|_| format!("face {} has negative index {}", i, v)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        faces.push(face);
    }
    Ok((vertices, faces))
}

/// Load a mesh from a PLY file.
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let (vertices, faces) = read(&mut reader).map_err(|message| load_error(path, message))?;
    assemble(path, &vertices, &faces)
}

fn header<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, max_degree: usize) -> Ply<DefaultElement> {
    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;
    ply.header.comments.push("written by tessera".to_string());

    let mut vertex = ElementDef::new("vertex".to_string());
    for axis in ["x", "y", "z"] {
        vertex
            .properties
            .add(PropertyDef::new(axis.to_string(), PropertyType::Scalar(ScalarType::Double)));
    }
    vertex.count = mesh.num_vertices();
    ply.header.elements.add(vertex);

    let count_type = if max_degree <= u8::MAX as usize {
        ScalarType::UChar
    } else {
        ScalarType::UInt
    };
    let mut face = ElementDef::new("face".to_string());
    face.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(count_type, ScalarType::UInt),
    ));
    face.count = mesh.num_faces();
    ply.header.elements.add(face);
    ply
}

/// Write a mesh as ASCII PLY.
pub fn write<W: Write, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, writer: &mut W) -> std::io::Result<()> {
    let (vertices, faces) = to_face_vertex(mesh);
    let mut ply = header(mesh, faces.iter().map(Vec::len).max().unwrap_or(0));

    let vertex_elements = vertices
        .iter()
        .map(|p| {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Double(p.x));
            element.insert("y".to_string(), Property::Double(p.y));
            element.insert("z".to_string(), Property::Double(p.z));
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertex_elements);

    let face_elements = faces
        .iter()
        .map(|f| {
            let mut element = DefaultElement::new();
            let indices = f.iter().map(|&v| v as u32).collect();
            element.insert("vertex_indices".to_string(), Property::ListUInt(indices));
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), face_elements);

    Writer::new().write_ply(writer, &mut ply)?;
    Ok(())
}

/// Save a mesh to an ASCII PLY file.
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
    fn test_read_ascii_quad_and_triangle() {
        let text = "ply
format ascii 1.0
element vertex 5
property float x
property float y
property float z
property uchar red
element face 2
property list uchar int vertex_indices
end_header
0 0 0 255
1 0 0 255
1 1 0 255
0 1 0 255
2 0 0 255
4 0 1 2 3
3 1 4 2
";
        let (vertices, faces) = read(&mut Cursor::new(text)).unwrap();
        assert_eq!(vertices.len(), 5);
        assert_eq!(vertices[2], Point3::new(1.0, 1.0, 0.0));
        assert_eq!(faces, vec![vec![0, 1, 2, 3], vec![1, 4, 2]]);
    }

    #[test]
    fn test_read_point_cloud_without_faces() {
        let text = "ply
format ascii 1.0
element vertex 2
property double x
property double y
property double z
end_header
0 0 0
1 2 3
";
        let (vertices, faces) = read(&mut Cursor::new(text)).unwrap();
        assert_eq!(vertices.len(), 2);
        assert!(faces.is_empty());
    }

    #[test]
    fn test_write_then_read_keeps_polygons() {
        let mut mesh = fixtures::torus(8, 5);
        let scale = 1.0 / 3.0;
        for v in mesh.vertex_ids().collect::<Vec<_>>() {
            let p = *mesh.position(v) * scale;
            mesh.set_position(v, p);
        }
        let mut buffer = Vec::new();
        write(&mesh, &mut buffer).unwrap();
        let (vertices, faces) = read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(faces.len(), 80);
        for (read_back, original) in vertices.iter().zip(mesh.positions()) {
            assert!((read_back - original).norm() < 1e-12);
        }

        let mut buffer = Vec::new();
        write(&fixtures::cube(), &mut buffer).unwrap();
        let (_, faces) = read(&mut Cursor::new(buffer)).unwrap();
        assert!(faces.iter().all(|f| f.len() == 4));
    }
}
