//! √3 subdivision for triangle meshes.

use nalgebra::{Point3, Vector3};

use crate::error::Result;
use crate::mesh::{build_from_triangles, FaceId, HalfEdgeMesh, MeshIndex, VertexId};

use super::{iterate, map_indices, prepare, SubdivideOptions};

/// Performs √3 subdivision on a triangle mesh.
///
/// Each iteration inserts a vertex at every face centroid, relaxes the
/// original interior vertices with
/// `α(n) = (4 - 2 cos(2π/n)) / 9`, and flips every original interior edge
/// so it connects the two new centroids. Border vertices stay in place and
/// border edges are not flipped. The face count triples per iteration.
///
/// Fails with `PreconditionUnmet` when the mesh has no faces or a
/// non-triangular face.
pub fn sqrt3_subdivide<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &SubdivideOptions) -> Result<()> {
    prepare(mesh, "√3", true)?;
    iterate(mesh, options, "√3", |mesh| sqrt3_once(mesh, options))
}

fn sqrt3_alpha(n: usize) -> f64 {
    (4.0 - 2.0 * (2.0 * std::f64::consts::PI / n as f64).cos()) / 9.0
}

fn relaxed_point<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> Point3<f64> {
    let p = *mesh.position(v);
    if mesh.is_boundary_vertex(v) {
        return p;
    }
    let (sum, n) = mesh
        .vertex_neighbors(v)
        .fold((Vector3::zeros(), 0usize), |(sum, n), w| (sum + mesh.position(w).coords, n + 1));
    if n == 0 {
        return p;
    }
    let alpha = sqrt3_alpha(n);
    Point3::from(p.coords * (1.0 - alpha) + sum * (alpha / n as f64))
}

/// One iteration on a compact triangle mesh.
fn sqrt3_once<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &SubdivideOptions) -> Result<()> {
    let source = &*mesh;
    let n = source.vertex_slots();

    let mut positions = map_indices(n, options.parallel, |i| relaxed_point(source, VertexId::new(i)));
    positions.extend(map_indices(source.face_slots(), options.parallel, |f| {
        source.face_centroid(FaceId::new(f))
    }));

    let mut triangles = Vec::with_capacity(3 * source.num_faces());
    for e in source.edge_ids() {
        let h = e.halfedge(0);
        let a = source.source(h).index();
        let b = source.target(h).index();
        match (source.face_of(h).is_valid(), source.face_of(h.opposite()).is_valid()) {
            (true, true) => {
                // Flipped edge between the centroids of the two faces
                let c0 = n + source.face_of(h).index();
                let c1 = n + source.face_of(h.opposite()).index();
                triangles.push([a, c1, c0]);
                triangles.push([c1, b, c0]);
            }
            (true, false) => triangles.push([a, b, n + source.face_of(h).index()]),
            (false, true) => triangles.push([b, a, n + source.face_of(h.opposite()).index()]),
            (false, false) => {}
        }
    }

    *mesh = build_from_triangles::<I>(&positions, &triangles)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::components::topology_info;
    use crate::algo::subdivide::catmull_clark_subdivide;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_sqrt3_triples_faces() {
        let mut mesh = fixtures::icosahedron();
        let (v, f) = (mesh.num_vertices(), mesh.num_faces());
        sqrt3_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();
        assert_eq!(mesh.num_vertices(), v + f);
        assert_eq!(mesh.num_faces(), 3 * f);
        assert!(mesh.is_triangle_mesh());
        assert!(mesh.is_closed());
        assert_eq!(topology_info(&mesh).euler_characteristic, 2);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_sqrt3_flips_original_edges() {
        let mut mesh = fixtures::icosahedron();
        sqrt3_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();
        // Original vertices are no longer adjacent to each other
        for e in mesh.edge_ids() {
            let h = e.halfedge(0);
            assert!(mesh.source(h).index() >= 12 || mesh.target(h).index() >= 12);
        }
        // Original vertices keep valence 5, centroids get valence 6
        for v in mesh.vertex_ids() {
            let expected = if v.index() < 12 { 5 } else { 6 };
            assert_eq!(mesh.valence(v), expected);
        }
    }

    #[test]
    fn test_sqrt3_open_mesh_keeps_border() {
        let mut mesh = fixtures::grid(3);
        let f = mesh.num_faces();
        let border: Vec<Point3<f64>> = mesh
            .vertex_ids()
            .filter(|&v| mesh.is_boundary_vertex(v))
            .map(|v| *mesh.position(v))
            .collect();
        sqrt3_subdivide(&mut mesh, &SubdivideOptions::new(2)).unwrap();
        assert_eq!(mesh.num_faces(), 9 * f);
        assert!(mesh.is_valid());
        assert_eq!(topology_info(&mesh).euler_characteristic, 1);
        for p in &border {
            assert!(mesh.vertex_ids().any(|v| mesh.position(v) == p));
        }
    }

    #[test]
    fn test_sqrt3_differs_from_catmull_clark() {
        let mut a = fixtures::tetrahedron();
        let mut b = fixtures::tetrahedron();
        sqrt3_subdivide(&mut a, &SubdivideOptions::new(1)).unwrap();
        catmull_clark_subdivide(&mut b, &SubdivideOptions::new(1)).unwrap();
        assert!(a.is_triangle_mesh());
        assert!(b.is_quad_mesh());
        assert_ne!(a.num_vertices(), b.num_vertices());
    }

    #[test]
    fn test_sqrt3_alpha() {
        // Regular valence 6 gives 1/3
        assert_relative_eq!(sqrt3_alpha(6), 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sqrt3_rejects_quads() {
        let mut mesh = fixtures::cube();
        assert!(sqrt3_subdivide(&mut mesh, &SubdivideOptions::new(1))
            .unwrap_err()
            .is_precondition());
    }
}
