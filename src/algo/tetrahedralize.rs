//! Volumetric tetrahedralization of closed surfaces.
//!
//! The surface mesh only hands a closed, consistently oriented triangle
//! boundary to a [`Tetrahedralizer`]; filling the volume is the backend's
//! business. [`StarTetrahedralizer`] is a small built-in backend for
//! star-shaped solids: it connects every boundary triangle to the vertex
//! centroid and gives up when that produces an inverted cell.

use nalgebra::{Point3, Vector3};

use crate::mesh::{to_triangles, HalfEdgeMesh, MeshIndex};

/// Tetrahedral volume mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolyMesh {
    /// Node positions.
    pub points: Vec<Point3<f64>>,
    /// Cells as four node indices, positively oriented.
    pub cells: Vec<[usize; 4]>,
}

impl PolyMesh {
    /// Number of tetrahedra.
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Signed volume of one cell.
    pub fn cell_volume(&self, cell: usize) -> f64 {
        let [a, b, c, d] = self.cells[cell].map(|i| self.points[i]);
        tet_volume(&a, &b, &c, &d)
    }

    /// Total volume.
    pub fn volume(&self) -> f64 {
        (0..self.cells.len()).map(|c| self.cell_volume(c)).sum()
    }
}

fn tet_volume(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a))) / 6.0
}

/// A volume mesher.
pub trait Tetrahedralizer {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Fill the solid bounded by `triangles` (outward oriented, closed,
    /// manifold). `None` when the backend cannot mesh this input.
    fn tetrahedralize(&self, points: &[Point3<f64>], triangles: &[[usize; 3]]) -> Option<PolyMesh>;
}

/// Cone from the vertex centroid to every boundary triangle.
#[derive(Debug, Clone, Copy)]
pub struct StarTetrahedralizer {
    /// Smallest accepted cell volume relative to the bounding box diagonal cubed.
    pub min_relative_volume: f64,
}

impl Default for StarTetrahedralizer {
    fn default() -> Self {
        Self {
            min_relative_volume: 1e-12,
        }
    }
}

impl Tetrahedralizer for StarTetrahedralizer {
    fn name(&self) -> &'static str {
        "star"
    }

    fn tetrahedralize(&self, points: &[Point3<f64>], triangles: &[[usize; 3]]) -> Option<PolyMesh> {
        if points.is_empty() || triangles.is_empty() {
            return None;
        }
        let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
        let apex = Point3::from(sum / points.len() as f64);

        let mut lo = points[0];
        let mut hi = points[0];
        for p in points {
            lo = lo.inf(p);
            hi = hi.sup(p);
        }
        let min_volume = self.min_relative_volume * (hi - lo).norm().powi(3);

        let mut mesh = PolyMesh {
            points: points.to_vec(),
            cells: Vec::with_capacity(triangles.len()),
        };
        let apex_index = mesh.points.len();
        mesh.points.push(apex);
        for &[a, b, c] in triangles {
            // Outward triangles see the interior apex on their negative side
            let cell = [b, a, c, apex_index];
            if tet_volume(&points[b], &points[a], &points[c], &apex) <= min_volume {
                return None;
            }
            mesh.cells.push(cell);
        }
        Some(mesh)
    }
}

/// Tetrahedralize a closed surface with `backend`.
///
/// Returns `None` without calling the backend when the mesh is empty, has a
/// border or has a non-manifold vertex. Polygon faces are fan-split first.
pub fn tetrahedralize<I: MeshIndex, B: Tetrahedralizer>(mesh: &HalfEdgeMesh<I>, backend: &B) -> Option<PolyMesh> {
    if mesh.num_faces() == 0 {
        log::warn!("tetrahedralization skipped: mesh has no faces");
        return None;
    }
    if !mesh.is_closed() {
        log::warn!("tetrahedralization skipped: surface is not closed");
        return None;
    }
    if mesh.vertex_ids().any(|v| !mesh.is_manifold(v) || mesh.is_isolated(v)) {
        log::warn!("tetrahedralization skipped: surface has non-manifold or isolated vertices");
        return None;
    }

    let (points, triangles) = to_triangles(mesh);
    let result = backend.tetrahedralize(&points, &triangles);
    match &result {
        Some(volume) => log::info!(
            "tetrahedralization ({}): {} cells, volume {:.6}",
            backend.name(),
            volume.num_cells(),
            volume.volume()
        ),
        None => log::warn!("tetrahedralization ({}) failed", backend.name()),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;
    use std::cell::Cell;

    struct CountingBackend {
        calls: Cell<usize>,
    }

    impl Tetrahedralizer for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn tetrahedralize(&self, points: &[Point3<f64>], _triangles: &[[usize; 3]]) -> Option<PolyMesh> {
            self.calls.set(self.calls.get() + 1);
            Some(PolyMesh {
                points: points.to_vec(),
                cells: Vec::new(),
            })
        }
    }

    #[test]
    fn test_cube_volume() {
        let mesh = fixtures::cube();
        let volume = tetrahedralize(&mesh, &StarTetrahedralizer::default()).unwrap();
        assert_eq!(volume.num_cells(), 12);
        assert_eq!(volume.points.len(), 9);
        assert_relative_eq!(volume.points[8], Point3::new(0.5, 0.5, 0.5), epsilon = 1e-12);
        assert_relative_eq!(volume.volume(), 1.0, epsilon = 1e-12);
        assert!((0..volume.num_cells()).all(|c| volume.cell_volume(c) > 0.0));
    }

    #[test]
    fn test_tetrahedron_and_sphere_volumes() {
        let tet = tetrahedralize(&fixtures::tetrahedron(), &StarTetrahedralizer::default()).unwrap();
        assert_relative_eq!(tet.volume(), 1.0 / 6.0, epsilon = 1e-12);

        let sphere = tetrahedralize(&fixtures::sphere(2), &StarTetrahedralizer::default()).unwrap();
        let ball = 4.0 / 3.0 * std::f64::consts::PI;
        assert!(sphere.volume() < ball);
        assert!(sphere.volume() > 0.95 * ball);
    }

    #[test]
    fn test_open_surface_never_reaches_backend() {
        let backend = CountingBackend { calls: Cell::new(0) };
        assert!(tetrahedralize(&fixtures::grid(2), &backend).is_none());
        assert!(tetrahedralize(&fixtures::cylinder(2, 8), &backend).is_none());
        assert!(tetrahedralize(&HalfEdgeMesh::<u32>::new(), &backend).is_none());
        assert_eq!(backend.calls.get(), 0);

        assert!(tetrahedralize(&fixtures::cube(), &backend).is_some());
        assert_eq!(backend.calls.get(), 1);
    }

    #[test]
    fn test_star_backend_rejects_torus() {
        // The centroid lies in the hole, so some cones are inverted
        assert!(tetrahedralize(&fixtures::torus(12, 6), &StarTetrahedralizer::default()).is_none());
    }
}
