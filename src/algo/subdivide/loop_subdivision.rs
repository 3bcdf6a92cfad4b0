//! Loop subdivision for triangle meshes.

use nalgebra::{Point3, Vector3};

use crate::error::Result;
use crate::mesh::{build_from_triangles, EdgeId, HalfEdgeMesh, MeshIndex, VertexId};

use super::{border_vertex_point, iterate, map_indices, prepare, BoundaryRule, SubdivideOptions};

/// Performs Loop subdivision on a triangle mesh.
///
/// Each iteration quadruples the number of triangles. Fails with
/// `PreconditionUnmet`, leaving the mesh untouched, when the mesh has no
/// faces or a non-triangular face.
///
/// # Vertex Rules
///
/// - **Interior odd vertex**: `3/8 * (v0 + v1) + 1/8 * (v_left + v_right)`
/// - **Border odd vertex**: `1/2 * (v0 + v1)`
/// - **Interior even vertex**: `(1 - n*β) * v + β * Σ(neighbors)`
/// - **Border even vertex**: see [`BoundaryRule`]
pub fn loop_subdivide<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &SubdivideOptions) -> Result<()> {
    prepare(mesh, "Loop", true)?;
    iterate(mesh, options, "Loop", |mesh| loop_subdivide_once(mesh, options))
}

/// Loop's β coefficient for an interior vertex of valence `n`:
/// `β = 1/n * (5/8 - (3/8 + 1/4 * cos(2π/n))²)`.
pub fn loop_beta(n: usize) -> f64 {
    if n == 3 {
        3.0 / 16.0
    } else {
        let n_f = n as f64;
        let inner = 3.0 / 8.0 + 0.25 * (2.0 * std::f64::consts::PI / n_f).cos();
        (5.0 / 8.0 - inner * inner) / n_f
    }
}

fn even_point<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>, rule: BoundaryRule) -> Point3<f64> {
    if mesh.is_boundary_vertex(v) {
        return border_vertex_point(mesh, v, rule);
    }
    let p = *mesh.position(v);
    let (sum, n) = mesh
        .vertex_neighbors(v)
        .fold((Vector3::zeros(), 0usize), |(sum, n), w| (sum + mesh.position(w).coords, n + 1));
    if n == 0 {
        return p;
    }
    let beta = loop_beta(n);
    Point3::from(p.coords * (1.0 - n as f64 * beta) + sum * beta)
}

fn odd_point<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, e: EdgeId<I>) -> Point3<f64> {
    let h = e.halfedge(0);
    let a = mesh.position(mesh.source(h)).coords;
    let b = mesh.position(mesh.target(h)).coords;
    if mesh.is_boundary_edge(e) {
        return Point3::from((a + b) * 0.5);
    }
    let c = mesh.position(mesh.target(mesh.next(h))).coords;
    let d = mesh.position(mesh.target(mesh.next(h.opposite()))).coords;
    Point3::from((a + b) * (3.0 / 8.0) + (c + d) * (1.0 / 8.0))
}

/// One iteration on a compact triangle mesh.
fn loop_subdivide_once<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &SubdivideOptions) -> Result<()> {
    let n = mesh.vertex_slots();
    let rule = options.boundary;
    let source = &*mesh;

    let mut positions = map_indices(n, options.parallel, |i| even_point(source, VertexId::new(i), rule));
    positions.extend(map_indices(source.edge_slots(), options.parallel, |e| {
        odd_point(source, EdgeId::new(e))
    }));

    let mut triangles = Vec::with_capacity(4 * source.num_faces());
    for f in source.face_ids() {
        let mut corners = [0usize; 3];
        let mut odd = [0usize; 3];
        for (k, h) in source.face_halfedges(f).take(3).enumerate() {
            corners[k] = source.source(h).index();
            odd[k] = n + h.edge().index();
        }
        // odd[k] sits on the edge leaving corners[k]
        let [a, b, c] = corners;
        let [ab, bc, ca] = odd;
        triangles.push([a, ab, ca]);
        triangles.push([b, bc, ab]);
        triangles.push([c, ca, bc]);
        triangles.push([ab, bc, ca]);
    }

    *mesh = build_from_triangles::<I>(&positions, &triangles)?;
    Ok(())
}
