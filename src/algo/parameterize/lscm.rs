//! Least Squares Conformal Maps (LSCM) parameterization.
//!
//! LSCM minimizes, over all triangles, the area-weighted deviation of the
//! piecewise linear map from the Cauchy-Riemann equations
//!
//! ```text
//! E = Σ_t A_t ((∂u/∂x − ∂v/∂y)² + (∂u/∂y + ∂v/∂x)²)
//! ```
//!
//! where `(x, y)` is an orthonormal frame in the plane of each triangle. The
//! energy is a quadratic form in the `2n` unknowns; it has a four
//! dimensional kernel (similarities), which two pinned vertices remove. The
//! pinned unknowns are eliminated and the remaining symmetric positive
//! definite system is solved with conjugate gradients.
//!
//! # References
//!
//! - Lévy, B., Petitjean, S., Ray, N., & Maillot, J. (2002). "Least squares
//!   conformal maps for automatic texture atlas generation." ACM SIGGRAPH.

use nalgebra::{DVector, Point2};

use super::uv::UVMap;
use super::{disc_border, ParameterizeOptions, PinStrategy, PinnedVertex};
use crate::algo::sparse::{conjugate_gradient, CsrMatrix};
use crate::error::{MeshError, Result};
use crate::mesh::{FaceId, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Compute an LSCM parameterization.
///
/// The two pinned vertices come from [`PinStrategy`]: with
/// [`PinStrategy::Automatic`] the two border vertices farthest apart are
/// pinned at their 3D distance along the u axis. The result is normalized
/// into the unit square, written to `"v:tex"` and returned.
///
/// # Errors
///
/// - `PreconditionUnmet` if the mesh is not a triangulated disc
/// - `InvalidParameter` if a manual pin is not a live vertex or both pins
///   are the same vertex
/// - `ConvergenceFailed` if the solver does not converge
pub fn lscm<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &ParameterizeOptions) -> Result<UVMap<I>> {
    let border = disc_border(mesh)?;
    let (pin0, pin1) = match options.pins {
        PinStrategy::Automatic => farthest_border_pair(mesh, &border),
        PinStrategy::Manual(pin0, pin1) => {
            check_pins(mesh, &pin0, &pin1)?;
            (pin0, pin1)
        }
    };

    let mut uv = UVMap::zeros(mesh.vertex_slots());
    let pinned = [pin0, pin1];
    for pin in &pinned {
        uv.set(VertexId::new(pin.vertex), Point2::new(pin.u, pin.v));
    }

    let mut free = vec![usize::MAX; mesh.vertex_slots()];
    let mut free_vertices = Vec::new();
    for v in mesh.vertex_ids() {
        if pinned.iter().all(|pin| pin.vertex != v.index()) {
            free[v.index()] = free_vertices.len();
            free_vertices.push(v);
        }
    }

    if !free_vertices.is_empty() {
        let system = LscmSystem::assemble(mesh, &free, free_vertices.len(), &uv);
        let solution = conjugate_gradient(
            &system.matrix,
            &system.rhs,
            None,
            options.solver.max_iterations,
            options.solver.tolerance,
        )?;
        let m = free_vertices.len();
        for (r, &v) in free_vertices.iter().enumerate() {
            uv.set(v, Point2::new(solution[r], solution[m + r]));
        }
    }

    uv.normalize(mesh);
    uv.store(mesh)?;
    log::info!(
        "LSCM parameterization: {} vertices, pins {} and {}",
        mesh.num_vertices(),
        pin0.vertex,
        pin1.vertex
    );
    Ok(uv)
}

fn check_pins<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, pin0: &PinnedVertex, pin1: &PinnedVertex) -> Result<()> {
    for pin in [pin0, pin1] {
        if pin.vertex >= mesh.vertex_slots() || mesh.is_deleted_vertex(VertexId::new(pin.vertex)) {
            return Err(MeshError::invalid_param("pin", pin.vertex, "is not a live vertex"));
        }
        if !pin.u.is_finite() || !pin.v.is_finite() {
            return Err(MeshError::invalid_param("pin", pin.vertex, "has non-finite coordinates"));
        }
    }
    if pin0.vertex == pin1.vertex {
        return Err(MeshError::invalid_param("pin", pin1.vertex, "both pins are the same vertex"));
    }
    if (pin0.u - pin1.u).hypot(pin0.v - pin1.v) <= f64::EPSILON {
        return Err(MeshError::invalid_param("pin", pin1.vertex, "both pins share one UV position"));
    }
    Ok(())
}

/// The two border vertices farthest apart, pinned at (0, 0) and (d, 0).
fn farthest_border_pair<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    border: &[HalfEdgeId<I>],
) -> (PinnedVertex, PinnedVertex) {
    let vertices: Vec<VertexId<I>> = border.iter().map(|&h| mesh.source(h)).collect();
    let mut best = (vertices[0], vertices[vertices.len() / 2], 0.0);
    for (i, &a) in vertices.iter().enumerate() {
        for &b in &vertices[i + 1..] {
            let d = (mesh.position(a) - mesh.position(b)).norm_squared();
            if d > best.2 {
                best = (a, b, d);
            }
        }
    }
    let (a, b, d) = best;
    (
        PinnedVertex::new(a.index(), 0.0, 0.0),
        PinnedVertex::new(b.index(), d.sqrt().max(1.0e-3), 0.0),
    )
}

/// Reduced normal equations over the free unknowns: rows `0..m` hold `u`,
/// rows `m..2m` hold `v`.
struct LscmSystem {
    matrix: CsrMatrix,
    rhs: DVector<f64>,
}

impl LscmSystem {
    fn assemble<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, free: &[usize], m: usize, pinned: &UVMap<I>) -> Self {
        let mut triplets = Vec::new();
        let mut rhs = DVector::zeros(2 * m);

        // Unknown (vertex, axis) -> row, or the pinned value
        let slot = |v: VertexId<I>, axis: usize| -> std::result::Result<usize, f64> {
            match free[v.index()] {
                usize::MAX => Err(pinned.get(v)[axis]),
                r => Ok(axis * m + r),
            }
        };

        for f in mesh.face_ids() {
            let Some(gradients) = face_gradients(mesh, f) else {
                continue;
            };
            for &(vi, ax_i, ay_i, area) in &gradients {
                for &(vj, ax_j, ay_j, _) in &gradients {
                    let same = (ax_i * ax_j + ay_i * ay_j) * area;
                    let mixed = (ay_i * ax_j - ax_i * ay_j) * area;
                    for (row_axis, col_axis, value) in [(0, 0, same), (1, 1, same), (0, 1, mixed), (1, 0, -mixed)] {
                        let Ok(row) = slot(vi, row_axis) else {
                            continue;
                        };
                        match slot(vj, col_axis) {
                            Ok(col) => triplets.push((row, col, value)),
                            Err(fixed) => rhs[row] -= value * fixed,
                        }
                    }
                }
            }
        }

        Self {
            matrix: CsrMatrix::from_triplets(2 * m, 2 * m, triplets),
            rhs,
        }
    }
}

/// Gradient coefficients `(vertex, ∂/∂x, ∂/∂y, area)` of the three
/// barycentric hat functions in the triangle's own plane frame, or `None`
/// for a degenerate triangle.
fn face_gradients<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, f: FaceId<I>) -> Option<[(VertexId<I>, f64, f64, f64); 3]> {
    let [i, j, k] = mesh.face_triangle(f);
    let [pi, pj, pk] = mesh.face_positions(f);
    let e1 = pj - pi;
    let e2 = pk - pi;
    let e1_len = e1.norm();
    let normal = e1.cross(&e2);
    let area = 0.5 * normal.norm();
    if e1_len < 1e-12 || area < 1e-14 {
        return None;
    }

    // pi at the origin, pj on the x axis, y axis = normal × e1
    let x_axis = e1 / e1_len;
    let y_axis = normal.cross(&e1).normalize();
    let q = [(0.0, 0.0), (e1_len, 0.0), (e2.dot(&x_axis), e2.dot(&y_axis))];

    let inv_2a = 1.0 / (2.0 * area);
    let gradient = |a: usize| {
        let (b, c) = ((a + 1) % 3, (a + 2) % 3);
        ((q[b].1 - q[c].1) * inv_2a, (q[c].0 - q[b].0) * inv_2a)
    };
    let (gi, gj, gk) = (gradient(0), gradient(1), gradient(2));
    Some([
        (i, gi.0, gi.1, area),
        (j, gj.0, gj.1, area),
        (k, gk.0, gk.1, area),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    /// Every edge is scaled by the same factor.
    fn assert_similarity(mesh: &HalfEdgeMesh, uv: &UVMap) {
        let ratios: Vec<f64> = mesh
            .edge_ids()
            .map(|e| {
                let h = e.halfedge(0);
                let (a, b) = (mesh.source(h), mesh.target(h));
                (uv.get(a) - uv.get(b)).norm() / (mesh.position(a) - mesh.position(b)).norm()
            })
            .collect();
        for r in &ratios {
            assert_relative_eq!(*r, ratios[0], epsilon = 1e-6, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_lscm_flat_grid_is_similarity() {
        let mut mesh = fixtures::grid(3);
        let uv = lscm(&mut mesh, &ParameterizeOptions::default()).unwrap();
        assert_similarity(&mesh, &uv);
        for f in mesh.face_ids() {
            assert!(uv.signed_area(&mesh, f) > 0.0);
        }
        let (min, max) = uv.bounding_box(&mesh).unwrap();
        assert!(min.x.abs() < 1e-9 && min.y.abs() < 1e-9);
        assert_relative_eq!(max.x.max(max.y), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_lscm_manual_pins() {
        let mut mesh = fixtures::grid(2);
        let options = ParameterizeOptions::default()
            .with_pins(PinnedVertex::new(0, 0.0, 0.0), PinnedVertex::new(2, 1.0, 0.0));
        let uv = lscm(&mut mesh, &options).unwrap();
        for v in mesh.vertex_ids() {
            let p = mesh.position(v);
            assert_relative_eq!(uv.get(v).x, p.x / 2.0, epsilon = 1e-6);
            assert_relative_eq!(uv.get(v).y, p.y / 2.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_lscm_curved_cap_has_no_flips() {
        let mut mesh = fixtures::disc(4, 12);
        let ids: Vec<_> = mesh.vertex_ids().collect();
        for v in ids {
            let p = *mesh.position(v);
            let z = 0.4 * (1.0 - p.x * p.x - p.y * p.y);
            mesh.set_position(v, Point3::new(p.x, p.y, z));
        }
        let uv = lscm(&mut mesh, &ParameterizeOptions::default()).unwrap();
        for f in mesh.face_ids() {
            assert!(uv.signed_area(&mesh, f) > 0.0);
        }
        assert_eq!(UVMap::from_mesh(&mesh).unwrap().as_slice(), uv.as_slice());
    }

    #[test]
    fn test_lscm_closed_mesh_fails() {
        let mut mesh = fixtures::tetrahedron();
        let err = lscm(&mut mesh, &ParameterizeOptions::default()).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_lscm_invalid_pins() {
        let mut mesh = fixtures::grid(2);
        let same = ParameterizeOptions::default()
            .with_pins(PinnedVertex::new(1, 0.0, 0.0), PinnedVertex::new(1, 1.0, 0.0));
        assert!(matches!(
            lscm(&mut mesh, &same).unwrap_err(),
            MeshError::InvalidParameter { name: "pin", .. }
        ));
        let missing = ParameterizeOptions::default()
            .with_pins(PinnedVertex::new(0, 0.0, 0.0), PinnedVertex::new(99, 1.0, 0.0));
        assert!(lscm(&mut mesh, &missing).is_err());
    }

    #[test]
    fn test_farthest_border_pair() {
        let mesh = fixtures::disc(1, 6);
        let border = disc_border(&mesh).unwrap();
        let (pin0, pin1) = farthest_border_pair(&mesh, &border);
        let a = mesh.position(VertexId::new(pin0.vertex));
        let b = mesh.position(VertexId::new(pin1.vertex));
        // Opposite corners of the hexagon
        assert_relative_eq!((a - b).norm(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(pin1.u, 2.0, epsilon = 1e-12);
        assert_eq!(pin0.u, 0.0);
    }
}
