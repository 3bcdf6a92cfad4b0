//! Discrete harmonic parameterization.

use std::f64::consts::TAU;

use nalgebra::{DVector, Point2};

use super::uv::UVMap;
use super::{disc_border, BoundaryShape, ParameterizeOptions};
use crate::algo::laplace::{self, VertexNumbering};
use crate::algo::sparse::{self, CsrMatrix};
use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

/// Compute a discrete harmonic parameterization.
///
/// The border loop is laid out on [`BoundaryShape`] by arc length, starting
/// at its lowest-numbered vertex and running in the direction that keeps
/// the faces' orientation. Interior vertices solve `L u = 0` with the chosen
/// edge weights. Cotangent weights that are not positive fall back to 1,
/// so every interior UV is a strict convex combination of its neighbours
/// and lies strictly inside the border polygon.
///
/// The coordinates are written to `"v:tex"` and returned.
pub fn harmonic<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &ParameterizeOptions) -> Result<UVMap<I>> {
    let mut border = disc_border(mesh)?;
    let start = (0..border.len())
        .min_by_key(|&i| mesh.source(border[i]).index())
        .unwrap_or(0);
    border.rotate_left(start);

    let mut uv = UVMap::zeros(mesh.vertex_slots());
    layout_border(mesh, &border, options.boundary, &mut uv)?;

    let is_border: Vec<bool> = (0..mesh.vertex_slots())
        .map(|i| {
            let v = VertexId::new(i);
            !mesh.is_deleted_vertex(v) && mesh.is_boundary_vertex(v)
        })
        .collect();
    let numbering = VertexNumbering::new(mesh, |v| !is_border[v.index()]);
    if !numbering.is_empty() {
        solve_interior(mesh, &numbering, options, &mut uv)?;
    }

    uv.store(mesh)?;
    log::info!(
        "harmonic parameterization: {} border, {} interior vertices",
        border.len(),
        numbering.len()
    );
    Ok(uv)
}

/// Position on the border shape at arc-length fraction `t` in [0, 1).
fn shape_point(shape: BoundaryShape, t: f64) -> Point2<f64> {
    match shape {
        BoundaryShape::Circle => {
            let angle = -TAU * t;
            Point2::new(0.5 + 0.5 * angle.cos(), 0.5 + 0.5 * angle.sin())
        }
        BoundaryShape::Square => {
            // Clockwise from the origin: left, top, right, bottom side
            let s = 4.0 * t;
            match s {
                s if s < 1.0 => Point2::new(0.0, s),
                s if s < 2.0 => Point2::new(s - 1.0, 1.0),
                s if s < 3.0 => Point2::new(1.0, 3.0 - s),
                s => Point2::new(4.0 - s, 0.0),
            }
        }
    }
}

fn layout_border<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    border: &[crate::mesh::HalfEdgeId<I>],
    shape: BoundaryShape,
    uv: &mut UVMap<I>,
) -> Result<()> {
    let lengths: Vec<f64> = border.iter().map(|&h| mesh.edge_length(h.edge())).collect();
    let total: f64 = lengths.iter().sum();
    if total <= f64::EPSILON {
        return Err(MeshError::degenerate("border loop has zero length"));
    }
    let mut walked = 0.0;
    for (&h, length) in border.iter().zip(&lengths) {
        uv.set(mesh.source(h), shape_point(shape, walked / total));
        walked += length;
    }
    Ok(())
}

fn solve_interior<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    numbering: &VertexNumbering<I>,
    options: &ParameterizeOptions,
    uv: &mut UVMap<I>,
) -> Result<()> {
    let weights = laplace::edge_weights(mesh, options.weighting);
    let n = numbering.len();
    let mut triplets = Vec::new();
    let mut rhs = vec![DVector::zeros(n), DVector::zeros(n)];

    for (r, &v) in numbering.vertices().iter().enumerate() {
        let mut diagonal = 0.0;
        for h in mesh.vertex_halfedges(v) {
            let w = weights[h.edge().index()];
            diagonal += w;
            let u = mesh.target(h);
            match numbering.row(u) {
                Some(col) => triplets.push((r, col, -w)),
                None => {
                    let fixed = uv.get(u);
                    rhs[0][r] += w * fixed.x;
                    rhs[1][r] += w * fixed.y;
                }
            }
        }
        triplets.push((r, r, diagonal));
    }

    let matrix = CsrMatrix::from_triplets(n, n, triplets);
    let solution = sparse::solve_columns(&matrix, &rhs, None, options.solver, options.parallel)?;
    for (r, &v) in numbering.vertices().iter().enumerate() {
        uv.set(v, Point2::new(solution[0][r], solution[1][r]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::laplace::LaplaceWeighting;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;

    fn cross(o: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    }

    #[test]
    fn test_hexagon_interior_strictly_inside() {
        for weighting in [LaplaceWeighting::Uniform, LaplaceWeighting::Cotangent] {
            let mut mesh = fixtures::disc(2, 6);
            let options = ParameterizeOptions::default().with_weighting(weighting);
            let uv = harmonic(&mut mesh, &options).unwrap();

            let center = Point2::new(0.5, 0.5);
            let mut hexagon: Vec<Point2<f64>> = mesh
                .vertex_ids()
                .filter(|&v| mesh.is_boundary_vertex(v))
                .map(|v| uv.get(v))
                .collect();
            assert_eq!(hexagon.len(), 6);
            for p in &hexagon {
                assert_relative_eq!((p - center).norm(), 0.5, epsilon = 1e-12);
            }
            hexagon.sort_by(|a, b| {
                let ta = (a.y - 0.5).atan2(a.x - 0.5);
                let tb = (b.y - 0.5).atan2(b.x - 0.5);
                ta.total_cmp(&tb)
            });
            // Regular hexagon
            for i in 0..6 {
                let side = (hexagon[(i + 1) % 6] - hexagon[i]).norm();
                assert_relative_eq!(side, 0.5, epsilon = 1e-12);
            }

            for v in mesh.vertex_ids().filter(|&v| !mesh.is_boundary_vertex(v)) {
                let p = uv.get(v);
                for i in 0..6 {
                    assert!(cross(hexagon[i], hexagon[(i + 1) % 6], p) > 1e-9);
                }
            }
            // The centre of a symmetric disc maps to the centre
            assert_relative_eq!((uv.get(VertexId::new(0)) - center).norm(), 0.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_harmonic_keeps_orientation() {
        for shape in [BoundaryShape::Circle, BoundaryShape::Square] {
            let mut mesh = fixtures::grid(4);
            let uv = harmonic(&mut mesh, &ParameterizeOptions::default().with_boundary(shape)).unwrap();
            for f in mesh.face_ids() {
                assert!(uv.signed_area(&mesh, f) > 0.0, "{:?} flipped with {:?}", f, shape);
            }
        }
    }

    #[test]
    fn test_square_reproduces_planar_grid() {
        let mut mesh = fixtures::grid(4);
        let options = ParameterizeOptions::default()
            .with_boundary(BoundaryShape::Square)
            .with_weighting(LaplaceWeighting::Uniform);
        let uv = harmonic(&mut mesh, &options).unwrap();
        for v in mesh.vertex_ids() {
            let p = mesh.position(v);
            assert_relative_eq!(uv.get(v).x, p.x / 4.0, epsilon = 1e-8);
            assert_relative_eq!(uv.get(v).y, p.y / 4.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_harmonic_stores_property() {
        let mut mesh = fixtures::disc(3, 8);
        let uv = harmonic(&mut mesh, &ParameterizeOptions::default().with_parallel(false)).unwrap();
        let stored = UVMap::from_mesh(&mesh).unwrap();
        assert_eq!(stored.as_slice(), uv.as_slice());
    }

    #[test]
    fn test_harmonic_rejects_non_disc_unchanged() {
        let mut mesh = fixtures::cylinder(2, 8);
        let before = mesh.positions();
        let err = harmonic(&mut mesh, &ParameterizeOptions::default()).unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(mesh.positions(), before);
        assert!(UVMap::from_mesh(&mesh).is_err());
    }
}
