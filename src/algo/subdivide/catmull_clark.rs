//! Catmull-Clark subdivision for polygon meshes.

use nalgebra::{Point3, Vector3};

use crate::error::Result;
use crate::mesh::{build_from_polygons, EdgeId, FaceId, HalfEdgeMesh, MeshIndex, VertexId};

use super::{border_vertex_point, iterate, map_indices, prepare, BoundaryRule, SubdivideOptions};

/// Performs Catmull-Clark subdivision on a mesh with arbitrary polygon faces.
///
/// After one iteration every face is a quad: a face of degree `k` becomes
/// `k` quads, and the mesh gains one vertex per edge and per face.
///
/// # Point Rules
///
/// - **Face point**: average of the face's vertices
/// - **Interior edge point**: average of the two endpoints and the two
///   adjacent face points
/// - **Border edge point**: edge midpoint
/// - **Interior vertex**: `(Q + 2R + (n - 3) P) / n` where `Q` averages the
///   adjacent face points, `R` averages the incident edge midpoints, and `n`
///   is the valence
/// - **Border vertex**: see [`BoundaryRule`]
pub fn catmull_clark_subdivide<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &SubdivideOptions) -> Result<()> {
    prepare(mesh, "Catmull-Clark", false)?;
    iterate(mesh, options, "Catmull-Clark", |mesh| catmull_clark_once(mesh, options))
}

fn edge_point<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, e: EdgeId<I>, face_points: &[Point3<f64>]) -> Point3<f64> {
    let h = e.halfedge(0);
    let a = mesh.position(mesh.source(h)).coords;
    let b = mesh.position(mesh.target(h)).coords;
    if mesh.is_boundary_edge(e) {
        return Point3::from((a + b) * 0.5);
    }
    let f0 = face_points[mesh.face_of(h).index()].coords;
    let f1 = face_points[mesh.face_of(h.opposite()).index()].coords;
    Point3::from((a + b + f0 + f1) * 0.25)
}

fn vertex_point<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    v: VertexId<I>,
    face_points: &[Point3<f64>],
    rule: BoundaryRule,
) -> Point3<f64> {
    if mesh.is_boundary_vertex(v) {
        return border_vertex_point(mesh, v, rule);
    }
    let p = *mesh.position(v);
    let n = mesh.valence(v);
    if n == 0 {
        return p;
    }

    let mut q = Vector3::zeros();
    let mut faces = 0usize;
    for f in mesh.vertex_faces(v) {
        q += face_points[f.index()].coords;
        faces += 1;
    }
    let q = q / faces.max(1) as f64;
    let r = mesh
        .vertex_neighbors(v)
        .map(|w| (p.coords + mesh.position(w).coords) * 0.5)
        .sum::<Vector3<f64>>()
        / n as f64;

    let n = n as f64;
    Point3::from((q + r * 2.0 + p.coords * (n - 3.0)) / n)
}

/// One iteration on a compact polygon mesh.
fn catmull_clark_once<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &SubdivideOptions) -> Result<()> {
    let source = &*mesh;
    let n = source.vertex_slots();
    let m = source.edge_slots();

    let face_points = map_indices(source.face_slots(), options.parallel, |f| {
        source.face_centroid(FaceId::new(f))
    });
    let mut positions = map_indices(n, options.parallel, |i| {
        vertex_point(source, VertexId::new(i), &face_points, options.boundary)
    });
    positions.extend(map_indices(m, options.parallel, |e| {
        edge_point(source, EdgeId::new(e), &face_points)
    }));
    positions.extend_from_slice(&face_points);

    let mut quads: Vec<[usize; 4]> = Vec::new();
    for f in source.face_ids() {
        let center = n + m + f.index();
        for h in source.face_halfedges(f) {
            // Quad at the corner where `prev(h)` enters and `h` leaves
            let corner = source.source(h).index();
            let outgoing = n + h.edge().index();
            let incoming = n + source.prev(h).edge().index();
            quads.push([corner, outgoing, center, incoming]);
        }
    }

    *mesh = build_from_polygons::<I, _>(&positions, &quads)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::components::topology_info;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_catmull_clark_cube() {
        let mut mesh = fixtures::cube();
        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();

        // 8 + 12 + 6 vertices, 6 * 4 quads
        assert_eq!(mesh.num_vertices(), 26);
        assert_eq!(mesh.num_faces(), 24);
        assert!(mesh.is_quad_mesh());
        assert!(mesh.is_closed());
        assert_eq!(topology_info(&mesh).euler_characteristic, 2);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_catmull_clark_cube_corner_rule() {
        // A cube corner has valence 3: Q = mean of three face centres,
        // R = mean of three edge midpoints
        let mut mesh = fixtures::cube();
        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();
        let corner = mesh.position(VertexId::new(0));
        // Corner (0,0,0) of the unit cube moves to (Q + 2R) / 3 = 2/9 on each axis
        for k in 0..3 {
            assert_relative_eq!(corner[k], 2.0 / 9.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_catmull_clark_triangles_become_quads() {
        let mut mesh = fixtures::tetrahedron();
        let (v, e, f) = (mesh.num_vertices(), mesh.num_edges(), mesh.num_faces());
        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(1)).unwrap();
        assert_eq!(mesh.num_vertices(), v + e + f);
        assert_eq!(mesh.num_faces(), 3 * f);
        assert!(mesh.is_quad_mesh());
    }

    #[test]
    fn test_catmull_clark_open_grid() {
        let mut mesh = fixtures::grid(2);
        let options = SubdivideOptions::new(2).with_boundary(BoundaryRule::Interpolate);
        catmull_clark_subdivide(&mut mesh, &options).unwrap();
        assert!(mesh.is_valid());
        assert_eq!(topology_info(&mesh).euler_characteristic, 1);
        for v in mesh.vertex_ids() {
            let p = mesh.position(v);
            assert_relative_eq!(p.z, 0.0, epsilon = 1e-12);
            assert!(p.x >= -1e-12 && p.x <= 2.0 + 1e-12);
        }
        // Interpolation keeps the grid corners
        assert_eq!(*mesh.position(VertexId::new(0)), Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_catmull_clark_zero_iterations() {
        let mut mesh = fixtures::cube();
        catmull_clark_subdivide(&mut mesh, &SubdivideOptions::new(0)).unwrap();
        assert_eq!(mesh.num_faces(), 6);
    }
}
