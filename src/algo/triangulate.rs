//! Triangulation of polygon faces.
//!
//! Each face of degree `n > 3` is split into `n − 2` triangles by inserting
//! diagonals. The diagonals are chosen per face with the classic `O(n³)`
//! dynamic program over sub-polygons `(i, k)`:
//!
//! ```text
//! W(i, k) = min over i < m < k of  W(i, m) ⊕ W(m, k) ⊕ w(i, m, k)
//! ```
//!
//! where `⊕` combines the cost of the triangles of both halves according to
//! the [`Objective`]. Diagonals that already exist as mesh edges are never
//! chosen, so the result stays manifold; a face for which no valid
//! triangulation exists is left untouched and counted as failed.

use std::fmt;

use nalgebra::Point3;

use super::laplace::triangle_angle;
use crate::error::{MeshError, Result};
use crate::mesh::{FaceId, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// What the per-face dynamic program optimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Objective {
    /// Minimize the total area of the triangles; the largest angle breaks ties.
    ///
    /// For a planar polygon every triangulation has the same area, so this
    /// mostly matters for non-planar faces.
    #[default]
    MinArea,
    /// Minimize the largest interior angle of the triangles (avoids slivers);
    /// the total area breaks ties.
    MaxAngle,
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::MinArea => write!(f, "min-area"),
            Objective::MaxAngle => write!(f, "max-angle"),
        }
    }
}

/// Options for triangulation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangulateOptions {
    /// Cost minimized when choosing diagonals.
    pub objective: Objective,
}

impl TriangulateOptions {
    /// Options with the given objective.
    pub fn new(objective: Objective) -> Self {
        Self { objective }
    }
}

/// Outcome of [`triangulate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriangulateReport {
    /// Faces of degree above three that were split.
    pub triangulated_faces: usize,
    /// Triangles added on top of the faces that were split.
    pub added_faces: usize,
    /// Faces left as they were because every triangulation would duplicate
    /// an existing edge.
    pub failed_faces: usize,
}

/// Triangulate every polygon face of the mesh in place.
///
/// Vertices are untouched and triangles keep the orientation of the face they
/// came from. Per-face failures are counted, not raised.
pub fn triangulate<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &TriangulateOptions) -> Result<TriangulateReport> {
    let polygons: Vec<FaceId<I>> = mesh.face_ids().filter(|&f| mesh.face_degree(f) > 3).collect();
    let mut report = TriangulateReport::default();
    for f in polygons {
        match triangulate_face(mesh, f, options.objective) {
            Ok(added) => {
                report.triangulated_faces += 1;
                report.added_faces += added;
            }
            Err(err) if err.is_topology_violation() => {
                log::debug!("triangulation skipped {:?}: {}", f, err);
                report.failed_faces += 1;
            }
            Err(err) => return Err(err),
        }
    }
    log::info!(
        "triangulation ({}): {} faces split into {} extra triangles, {} failed",
        options.objective,
        report.triangulated_faces,
        report.added_faces,
        report.failed_faces
    );
    Ok(report)
}

/// Triangulate a single face. Returns the number of triangles added.
///
/// Triangles are left alone (zero added). Fails with `TopologyViolation`,
/// without changing the mesh, when every triangulation would duplicate an
/// existing edge.
pub fn triangulate_face<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, f: FaceId<I>, objective: Objective) -> Result<usize> {
    if !f.is_valid() || f.index() >= mesh.face_slots() || mesh.is_deleted_face(f) {
        return Err(MeshError::precondition(format!("{:?} is not a live face", f)));
    }
    let n = mesh.face_degree(f);
    if n <= 3 {
        return Ok(0);
    }

    let table = CostTable::solve(mesh, f, objective);
    if !table.cost[0][n - 1].area.is_finite() {
        return Err(MeshError::topology(
            "triangulate",
            format!("every triangulation of {:?} duplicates an existing edge", f),
        ));
    }

    // Diagonals of the optimal triangulation, outermost first
    let mut diagonals = Vec::with_capacity(n - 3);
    let mut stack = vec![(0, n - 1)];
    while let Some((i, k)) = stack.pop() {
        if k - i < 2 {
            continue;
        }
        let m = table.split[i][k];
        if m - i >= 2 {
            diagonals.push((table.vertices[i], table.vertices[m]));
        }
        if k - m >= 2 {
            diagonals.push((table.vertices[m], table.vertices[k]));
        }
        stack.push((i, m));
        stack.push((m, k));
    }

    let mut patch = vec![f];
    for (a, b) in diagonals {
        let (h0, h1) = find_corners(mesh, &patch, a, b)
            .ok_or_else(|| MeshError::topology("triangulate", "diagonal endpoints do not share a face"))?;
        let h = mesh.insert_edge(h0, h1)?;
        patch.push(mesh.face_of(h.opposite()));
    }
    Ok(n - 3)
}

/// Halfedges of one patch face ending at `a` and at `b`.
fn find_corners<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    patch: &[FaceId<I>],
    a: VertexId<I>,
    b: VertexId<I>,
) -> Option<(HalfEdgeId<I>, HalfEdgeId<I>)> {
    patch.iter().find_map(|&f| {
        let ha = mesh.face_halfedges(f).find(|&h| mesh.target(h) == a)?;
        let hb = mesh.face_halfedges(f).find(|&h| mesh.target(h) == b)?;
        Some((ha, hb))
    })
}

#[derive(Debug, Clone, Copy)]
struct Cost {
    area: f64,
    angle: f64,
}

impl Cost {
    const ZERO: Cost = Cost { area: 0.0, angle: 0.0 };
    const INFINITE: Cost = Cost {
        area: f64::INFINITY,
        angle: f64::INFINITY,
    };

    fn triangle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Cost {
        let area = 0.5 * (b - a).cross(&(c - a)).norm();
        let angle = triangle_angle(a, b, c)
            .max(triangle_angle(b, c, a))
            .max(triangle_angle(c, a, b));
        Cost { area, angle }
    }

    fn combine(self, other: Cost) -> Cost {
        Cost {
            area: self.area + other.area,
            angle: self.angle.max(other.angle),
        }
    }

    fn less_than(&self, other: &Cost, objective: Objective) -> bool {
        match objective {
            Objective::MinArea => self.area < other.area || (self.area == other.area && self.angle < other.angle),
            Objective::MaxAngle => self.angle < other.angle || (self.angle == other.angle && self.area < other.area),
        }
    }
}

/// Dynamic program over the sub-polygons of one face.
struct CostTable<I: MeshIndex> {
    vertices: Vec<VertexId<I>>,
    cost: Vec<Vec<Cost>>,
    split: Vec<Vec<usize>>,
}

impl<I: MeshIndex> CostTable<I> {
    fn solve(mesh: &HalfEdgeMesh<I>, f: FaceId<I>, objective: Objective) -> Self {
        let vertices: Vec<VertexId<I>> = mesh.face_halfedges(f).map(|h| mesh.source(h)).collect();
        let n = vertices.len();
        let points: Vec<Point3<f64>> = vertices.iter().map(|&v| *mesh.position(v)).collect();

        let mut cost = vec![vec![Cost::ZERO; n]; n];
        let mut split = vec![vec![0usize; n]; n];

        for span in 2..n {
            for i in 0..n - span {
                let k = i + span;
                // The chord (i, k) is a face side only for (0, n - 1)
                let is_side = i == 0 && k == n - 1;
                if !is_side && mesh.find_halfedge(vertices[i], vertices[k]).is_some() {
                    cost[i][k] = Cost::INFINITE;
                    continue;
                }
                let mut best = Cost::INFINITE;
                let mut best_m = i + 1;
                for m in i + 1..k {
                    let candidate = cost[i][m]
                        .combine(cost[m][k])
                        .combine(Cost::triangle(&points[i], &points[m], &points[k]));
                    if candidate.area.is_finite() && candidate.less_than(&best, objective) {
                        best = candidate;
                        best_m = m;
                    }
                }
                cost[i][k] = best;
                split[i][k] = best_m;
            }
        }

        Self { vertices, cost, split }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::components::topology_info;
    use crate::mesh::{build_from_polygons, fixtures};

    fn single_polygon(points: Vec<Point3<f64>>) -> HalfEdgeMesh {
        let face: Vec<usize> = (0..points.len()).collect();
        build_from_polygons::<u32, _>(&points, &[face]).unwrap()
    }

    fn has_edge(mesh: &HalfEdgeMesh, a: usize, b: usize) -> bool {
        mesh.find_edge(VertexId::new(a), VertexId::new(b)).is_some()
    }

    #[test]
    fn test_cube_min_area() {
        let mut mesh = fixtures::cube();
        let report = triangulate(&mut mesh, &TriangulateOptions::new(Objective::MinArea)).unwrap();
        assert_eq!(report.triangulated_faces, 6);
        assert_eq!(report.added_faces, 6);
        assert_eq!(report.failed_faces, 0);

        assert_eq!(mesh.num_faces(), 12);
        assert_eq!(mesh.num_vertices(), 8);
        assert!(mesh.is_triangle_mesh());
        assert!(mesh.is_closed());
        assert_eq!(topology_info(&mesh).euler_characteristic, 2);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_triangles_keep_face_orientation() {
        let mut mesh = fixtures::cube();
        let before = mesh.surface_area();
        triangulate(&mut mesh, &TriangulateOptions::default()).unwrap();
        for f in mesh.face_ids() {
            // Outward normals on the unit cube centred at (0.5, 0.5, 0.5)
            let c = mesh.face_centroid(f);
            let outward = c - Point3::new(0.5, 0.5, 0.5);
            assert!(mesh.face_normal(f).dot(&outward) > 0.0);
        }
        assert!((mesh.surface_area() - before).abs() < 1e-12);
    }

    #[test]
    fn test_max_angle_picks_short_diagonal() {
        // Parallelogram: the diagonal 1-3 gives a largest angle of about 117°,
        // the diagonal 0-2 one of 135°
        let mut mesh = single_polygon(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(5.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ]);
        triangulate(&mut mesh, &TriangulateOptions::new(Objective::MaxAngle)).unwrap();
        assert!(has_edge(&mesh, 1, 3));
        assert!(!has_edge(&mesh, 0, 2));
    }

    #[test]
    fn test_min_area_on_folded_quad() {
        // Splitting along 1-3 gives area 2.0, along 0-2 about 2.24
        let mut mesh = single_polygon(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 2.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        triangulate(&mut mesh, &TriangulateOptions::new(Objective::MinArea)).unwrap();
        assert!(has_edge(&mesh, 1, 3));
        assert!((mesh.surface_area() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_hexagon_gets_four_triangles() {
        let points = (0..6)
            .map(|k| {
                let a = std::f64::consts::TAU * k as f64 / 6.0;
                Point3::new(a.cos(), a.sin(), 0.0)
            })
            .collect();
        let mut mesh = single_polygon(points);
        for objective in [Objective::MinArea, Objective::MaxAngle] {
            let mut copy = mesh.clone();
            triangulate(&mut copy, &TriangulateOptions::new(objective)).unwrap();
            assert_eq!(copy.num_faces(), 4);
            assert_eq!(copy.num_edges(), 9);
            assert!(copy.is_valid());
        }
        let f = mesh.face_ids().next().unwrap();
        assert_eq!(triangulate_face(&mut mesh, f, Objective::MinArea).unwrap(), 3);
    }

    #[test]
    fn test_triangle_mesh_is_untouched() {
        let mut mesh = fixtures::icosahedron();
        let report = triangulate(&mut mesh, &TriangulateOptions::default()).unwrap();
        assert_eq!(report, TriangulateReport::default());
        assert_eq!(mesh.num_faces(), 20);
    }

    #[test]
    fn test_existing_edge_is_not_duplicated() {
        // Closed pillow: a quad glued to two triangles that already use the
        // diagonal 0-2, so the quad must be split along 1-3
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.5),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.5),
        ];
        let faces: Vec<Vec<usize>> = vec![vec![0, 1, 2, 3], vec![0, 2, 1], vec![0, 3, 2]];
        for objective in [Objective::MinArea, Objective::MaxAngle] {
            let mut mesh = build_from_polygons::<u32, _>(&points, &faces).unwrap();
            let report = triangulate(&mut mesh, &TriangulateOptions::new(objective)).unwrap();
            assert_eq!(report.failed_faces, 0);
            assert!(has_edge(&mesh, 1, 3));
            assert_eq!(mesh.num_faces(), 4);
            assert_eq!(mesh.num_edges(), 6);
            assert!(mesh.is_closed());
            assert!(mesh.is_valid());
        }
    }
}
