//! Mesh subdivision algorithms.
//!
//! This module provides algorithms for subdividing meshes to create
//! smoother surfaces. Every scheme rebuilds the mesh from scratch, so
//! per-element properties are not carried over.
//!
//! # Loop Subdivision (Triangle Meshes)
//!
//! Loop subdivision (Loop, 1987) is an approximating subdivision scheme for
//! triangle meshes. Each iteration:
//!
//! 1. Inserts one odd vertex per edge (weighted positions)
//! 2. Moves the even (original) vertices towards their neighbours
//! 3. Splits each triangle into 4 smaller triangles
//!
//! A mesh with V vertices, E edges and F faces becomes one with V + E
//! vertices and 4F faces.
//!
//! # Catmull-Clark Subdivision (Polygon Meshes)
//!
//! Catmull-Clark subdivision (Catmull & Clark, 1978) works on arbitrary
//! polygons and always produces quads. Each iteration:
//!
//! 1. Creates a face point at each face centroid
//! 2. Creates edge points as average of edge endpoints and adjacent face points
//! 3. Updates original vertices using weighted average of neighbors
//! 4. Connects every corner of every face into a new quad
//!
//! # √3 Subdivision (Triangle Meshes)
//!
//! √3 subdivision (Kobbelt, 2000) inserts one vertex per face, relaxes the
//! original vertices, and flips every original interior edge. The face count
//! triples per iteration, so two iterations refine each original edge by 3.
//!
//! # Example
//!
//! ```no_run
//! use tessera::prelude::*;
//! use tessera::algo::subdivide::{loop_subdivide, SubdivideOptions};
//!
//! let mut mesh: HalfEdgeMesh = tessera::io::load("input.obj").unwrap();
//!
//! let options = SubdivideOptions::new(2); // 2 iterations
//! loop_subdivide(&mut mesh, &options).unwrap();
//!
//! tessera::io::save(&mesh, "output.obj").unwrap();
//! ```
//!
//! # References
//!
//! - Loop, C. (1987). "Smooth Subdivision Surfaces Based on Triangles."
//!   Master's thesis, University of Utah.
//! - Catmull, E. & Clark, J. (1978). "Recursively generated B-spline surfaces
//!   on arbitrary topological meshes." Computer-Aided Design, 10(6), 350-355.
//! - Kobbelt, L. (2000). "√3-Subdivision." SIGGRAPH 2000.

mod catmull_clark;
mod loop_subdivision;
mod sqrt3;

use nalgebra::Point3;
use rayon::prelude::*;

use super::progress::Progress;
use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

pub use catmull_clark::catmull_clark_subdivide;
pub use loop_subdivision::{loop_beta, loop_subdivide};
pub use sqrt3::sqrt3_subdivide;

/// How border vertices move during Loop and Catmull-Clark subdivision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryRule {
    /// Borders follow the cubic B-spline rule `3/4 v + 1/8 (left + right)`;
    /// the border curve is smoothed like the interior.
    #[default]
    Smooth,

    /// Border vertices keep their positions and new border vertices land on
    /// edge midpoints, so the border polyline is preserved exactly.
    Interpolate,
}

/// Options for subdivision algorithms.
#[derive(Debug, Clone)]
pub struct SubdivideOptions {
    /// Number of subdivision iterations.
    pub iterations: usize,

    /// Rule applied to border vertices.
    pub boundary: BoundaryRule,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,

    /// Progress callback, reported once per iteration.
    pub progress: Progress,
}

impl Default for SubdivideOptions {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SubdivideOptions {
    /// Create options with the specified number of iterations.
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            boundary: BoundaryRule::default(),
            parallel: true,
            progress: Progress::none(),
        }
    }

    /// Set the border rule.
    pub fn with_boundary(mut self, rule: BoundaryRule) -> Self {
        self.boundary = rule;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }
}

/// Fails unless the mesh has faces and, when `triangles_only`, every face is
/// a triangle. Compacts the mesh so vertex, edge and face indices are dense.
fn prepare<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, scheme: &str, triangles_only: bool) -> Result<()> {
    if mesh.num_faces() == 0 {
        return Err(MeshError::precondition(format!("{scheme} subdivision requires a mesh with faces")));
    }
    if triangles_only && !mesh.is_triangle_mesh() {
        return Err(MeshError::precondition(format!("{scheme} subdivision requires a triangle mesh")));
    }
    mesh.compact();
    Ok(())
}

/// Run `step` once per configured iteration with progress reporting.
fn iterate<I, F>(mesh: &mut HalfEdgeMesh<I>, options: &SubdivideOptions, scheme: &str, mut step: F) -> Result<()>
where
    I: MeshIndex,
    F: FnMut(&mut HalfEdgeMesh<I>) -> Result<()>,
{
    for iteration in 0..options.iterations {
        options.progress.report(iteration, options.iterations, scheme);
        step(mesh)?;
        log::debug!(
            "{scheme} subdivision {}/{}: {} vertices, {} faces",
            iteration + 1,
            options.iterations,
            mesh.num_vertices(),
            mesh.num_faces()
        );
    }
    options.progress.report(options.iterations, options.iterations, scheme);
    Ok(())
}

/// Evaluate `f` for every index in `0..n`, in parallel when requested.
fn map_indices<F>(n: usize, parallel: bool, f: F) -> Vec<Point3<f64>>
where
    F: Fn(usize) -> Point3<f64> + Sync + Send,
{
    if parallel {
        (0..n).into_par_iter().map(f).collect()
    } else {
        (0..n).map(f).collect()
    }
}

/// The two border neighbours of a regular border vertex.
fn border_neighbors<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> Option<[VertexId<I>; 2]> {
    let mut found = mesh
        .vertex_halfedges(v)
        .filter(|h| mesh.is_boundary_edge(h.edge()))
        .map(|h| mesh.target(h));
    let left = found.next()?;
    let right = found.next()?;
    match found.next() {
        Some(_) => None,
        None => Some([left, right]),
    }
}

/// Position of a border vertex under `rule`; corners and non-manifold border
/// vertices stay put.
fn border_vertex_point<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>, rule: BoundaryRule) -> Point3<f64> {
    let p = *mesh.position(v);
    match (rule, border_neighbors(mesh, v)) {
        (BoundaryRule::Smooth, Some([l, r])) => {
            Point3::from(p.coords * 0.75 + (mesh.position(l).coords + mesh.position(r).coords) * 0.125)
        }
        _ => p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;

    #[test]
    fn test_border_neighbors() {
        let mesh = fixtures::grid(2);
        // Corner (0,0) and the middle of the bottom row
        let corner = VertexId::new(0);
        let mid = VertexId::new(1);
        let [a, b] = border_neighbors(&mesh, mid).unwrap();
        let mut found = [a.index(), b.index()];
        found.sort_unstable();
        assert_eq!(found, [0, 2]);
        assert!(border_neighbors(&mesh, corner).is_some());
        assert!(border_neighbors(&mesh, VertexId::new(4)).is_none());
    }

    #[test]
    fn test_prepare_rejects_empty_and_polygons() {
        let mut empty = HalfEdgeMesh::<u32>::new();
        assert!(prepare(&mut empty, "Loop", false).unwrap_err().is_precondition());
        let mut cube = fixtures::cube();
        assert!(prepare(&mut cube, "Loop", true).unwrap_err().is_precondition());
        assert!(prepare(&mut cube, "Catmull-Clark", false).is_ok());
    }
}
