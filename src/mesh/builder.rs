//! Mesh construction utilities.
//!
//! Builds halfedge meshes from face-vertex lists as found in mesh file
//! formats, and converts back. Faces are inserted one at a time through
//! [`HalfEdgeMesh::add_face`], so the result always satisfies the manifold
//! invariants.

use nalgebra::Point3;

use super::halfedge::HalfEdgeMesh;
use super::index::{MeshIndex, VertexId};
use crate::error::{MeshError, Result};

/// Build a halfedge mesh from vertices and triangle faces.
///
/// # Example
/// ```
/// use tessera::mesh::{build_from_triangles, HalfEdgeMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_faces(), 1);
/// ```
pub fn build_from_triangles<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<HalfEdgeMesh<I>> {
    let polygons: Vec<&[usize]> = faces.iter().map(|f| &f[..]).collect();
    build(vertices, &polygons, false).map(|(mesh, _)| mesh)
}

/// Build a halfedge mesh from vertices and polygon faces of any degree.
///
/// Fails on the first face that references a missing vertex or cannot be
/// inserted without breaking manifoldness.
pub fn build_from_polygons<I: MeshIndex, F: AsRef<[usize]>>(
    vertices: &[Point3<f64>],
    faces: &[F],
) -> Result<HalfEdgeMesh<I>> {
    let polygons: Vec<&[usize]> = faces.iter().map(|f| f.as_ref()).collect();
    build(vertices, &polygons, false).map(|(mesh, _)| mesh)
}

/// Like [`build_from_polygons`], but faces that cannot be inserted are
/// skipped. Returns the mesh and the number of skipped faces.
pub fn build_from_polygons_lenient<I: MeshIndex, F: AsRef<[usize]>>(
    vertices: &[Point3<f64>],
    faces: &[F],
) -> Result<(HalfEdgeMesh<I>, usize)> {
    let polygons: Vec<&[usize]> = faces.iter().map(|f| f.as_ref()).collect();
    build(vertices, &polygons, true)
}

fn build<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[&[usize]],
    skip_invalid: bool,
) -> Result<(HalfEdgeMesh<I>, usize)> {
    let mut mesh = HalfEdgeMesh::with_capacity(vertices.len(), faces.len());
    let ids: Vec<VertexId<I>> = vertices.iter().map(|&p| mesh.add_vertex(p)).collect();

    let mut skipped = 0;
    let mut corners = Vec::new();
    for (fi, face) in faces.iter().enumerate() {
        corners.clear();
        let mut bad_index = None;
        for &vi in face.iter() {
            match ids.get(vi) {
                Some(&v) => corners.push(v),
                None => {
                    bad_index = Some(vi);
                    break;
                }
            }
        }

        let result = match bad_index {
            Some(vertex) => Err(MeshError::InvalidVertexIndex { face: fi, vertex }),
            None => mesh.add_face(&corners).map(|_| ()),
        };

        if let Err(e) = result {
            if !skip_invalid {
                return Err(e);
            }
            log::warn!("skipping face {}: {}", fi, e);
            skipped += 1;
        }
    }

    Ok((mesh, skipped))
}

/// Convert a mesh to a face-vertex representation.
///
/// Live vertices are numbered consecutively in handle order, so the output is
/// valid even if the mesh holds deleted elements.
pub fn to_face_vertex<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
    let mut index = vec![usize::MAX; mesh.vertex_slots()];
    let mut vertices = Vec::with_capacity(mesh.num_vertices());
    for v in mesh.vertex_ids() {
        index[v.index()] = vertices.len();
        vertices.push(*mesh.position(v));
    }

    let faces = mesh
        .face_ids()
        .map(|f| mesh.face_vertices(f).map(|v| index[v.index()]).collect())
        .collect();

    (vertices, faces)
}

/// Convert a mesh to vertices and triangles, fan-splitting larger polygons.
pub fn to_triangles<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let (vertices, polygons) = to_face_vertex(mesh);
    let mut triangles = Vec::with_capacity(polygons.len());
    for poly in &polygons {
        for i in 1..poly.len().saturating_sub(1) {
            triangles.push([poly[0], poly[i], poly[i + 1]]);
        }
    }
    (vertices, triangles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        (vertices, vec![[0, 1, 2], [0, 2, 3]])
    }

    #[test]
    fn test_two_triangles() {
        let (vertices, faces) = two_triangles();
        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.num_edges(), 5);
        assert!(mesh.is_valid());
        let boundary = mesh.edge_ids().filter(|&e| mesh.is_boundary_edge(e)).count();
        assert_eq!(boundary, 4);
    }

    #[test]
    fn test_roundtrip() {
        let (vertices, faces) = two_triangles();
        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
        let (out_vertices, out_faces) = to_face_vertex(&mesh);
        assert_eq!(out_vertices, vertices);
        assert_eq!(out_faces.len(), 2);
        for face in &out_faces {
            assert_eq!(face.len(), 3);
        }
    }

    #[test]
    fn test_invalid_vertex_index() {
        let vertices = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let result: Result<HalfEdgeMesh> = build_from_triangles(&vertices, &[[0, 1, 5]]);
        assert!(matches!(
            result,
            Err(MeshError::InvalidVertexIndex { face: 0, vertex: 5 })
        ));
    }

    #[test]
    fn test_degenerate_face() {
        let (vertices, _) = two_triangles();
        let result: Result<HalfEdgeMesh> = build_from_triangles(&vertices, &[[0, 0, 1]]);
        assert!(matches!(result, Err(MeshError::DegenerateInput(_))));
    }

    #[test]
    fn test_mixed_polygons() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(2.0, 0.5, 0.0),
        ];
        let faces: Vec<Vec<usize>> = vec![vec![0, 1, 2, 3], vec![1, 4, 2]];
        let mesh: HalfEdgeMesh = build_from_polygons(&vertices, &faces).unwrap();
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.num_edges(), 6);
        assert!(!mesh.is_triangle_mesh());
        let (_, tris) = to_triangles(&mesh);
        assert_eq!(tris.len(), 3);
    }

    #[test]
    fn test_lenient_skips_non_manifold_faces() {
        let (vertices, _) = two_triangles();
        // The third face repeats the orientation of edge 0->1
        let faces = vec![[0, 1, 2], [0, 2, 3], [0, 1, 3]];
        let (mesh, skipped): (HalfEdgeMesh, usize) =
            build_from_polygons_lenient(&vertices, &faces).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(mesh.num_faces(), 2);

        let strict: Result<HalfEdgeMesh> = build_from_polygons(&vertices, &faces);
        assert!(strict.unwrap_err().is_topology_violation());
    }
}
