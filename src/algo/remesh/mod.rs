//! Isotropic remeshing, uniform or curvature-adaptive.
//!
//! Each iteration runs four passes over a triangle mesh:
//!
//! 1. split edges longer than 4/3 of their target length
//! 2. collapse edges shorter than 4/5 of their target length
//! 3. flip edges to bring vertex valences towards 6 (4 on the border)
//! 4. tangential relaxation, projecting vertices back onto the input surface
//!
//! With [`RemeshOptions::uniform`] every edge aims for the same length. With
//! [`RemeshOptions::adaptive`] the target per vertex is derived from the
//! maximum absolute principal curvature of the input so that a circle
//! segment of that curvature deviates from its chord by at most the
//! approximation error, clamped to `[min_length, max_length]`.
//!
//! Border vertices and endpoints of `"e:feature"` edges never move. They are
//! only removed along straight stretches of their border or feature line, so
//! the outline of the input is kept.
//!
//! # Example
//!
//! ```
//! use tessera::prelude::*;
//! use tessera::algo::remesh::{remesh, RemeshOptions};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2], [0, 2, 3]]).unwrap();
//!
//! let report = remesh(&mut mesh, &RemeshOptions::uniform(0.25).with_iterations(3)).unwrap();
//! assert!(report.splits > 0);
//! ```

mod passes;
mod reference;

use super::curvature::{analyze_tensor, CurvatureOptions};
use super::features::{FEATURE_EDGE_PROPERTY, FEATURE_VERTEX_PROPERTY};
use super::progress::Progress;
use super::Termination;
use crate::error::{MeshError, Result};
use crate::mesh::{ElementKind, HalfEdgeMesh, MeshIndex, VertexId};

use passes::RemeshState;
use reference::ReferenceSurface;

/// How target edge lengths are chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sizing {
    /// One target length everywhere.
    Uniform(f64),
    /// Curvature-driven target lengths.
    Adaptive {
        /// Shortest allowed target.
        min_length: f64,
        /// Longest allowed target.
        max_length: f64,
        /// Allowed distance between the surface and the remeshed triangles.
        approximation_error: f64,
    },
}

/// Options for remeshing.
#[derive(Debug, Clone)]
pub struct RemeshOptions {
    /// Target edge lengths.
    pub sizing: Sizing,

    /// Maximum number of remeshing iterations.
    pub iterations: usize,

    /// Tangential relaxation sweeps per iteration.
    pub smoothing_iterations: usize,

    /// Step size of each relaxation sweep, in (0, 1].
    pub smoothing_lambda: f64,

    /// Project relaxed vertices back onto the input surface.
    pub projection: bool,

    /// Relax and project vertices in parallel.
    pub parallel: bool,

    /// Progress callback.
    pub progress: Progress,
}

impl RemeshOptions {
    /// Options with the given sizing and default iteration counts.
    pub fn new(sizing: Sizing) -> Self {
        Self {
            sizing,
            iterations: 10,
            smoothing_iterations: 3,
            smoothing_lambda: 0.5,
            projection: true,
            parallel: true,
            progress: Progress::none(),
        }
    }

    /// Uniform remeshing towards `target_length`.
    pub fn uniform(target_length: f64) -> Self {
        Self::new(Sizing::Uniform(target_length))
    }

    /// Curvature-adaptive remeshing.
    pub fn adaptive(min_length: f64, max_length: f64, approximation_error: f64) -> Self {
        Self::new(Sizing::Adaptive {
            min_length,
            max_length,
            approximation_error,
        })
    }

    /// Set the iteration cap.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the number of relaxation sweeps per iteration.
    pub fn with_smoothing_iterations(mut self, iterations: usize) -> Self {
        self.smoothing_iterations = iterations;
        self
    }

    /// Enable or disable projection onto the input surface.
    pub fn with_projection(mut self, projection: bool) -> Self {
        self.projection = projection;
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

    fn validate(&self) -> Result<()> {
        let positive = |name: &'static str, value: f64| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(MeshError::invalid_param(name, value, "must be positive"))
            }
        };
        match self.sizing {
            Sizing::Uniform(length) => positive("target_length", length)?,
            Sizing::Adaptive {
                min_length,
                max_length,
                approximation_error,
            } => {
                positive("min_length", min_length)?;
                positive("max_length", max_length)?;
                positive("approximation_error", approximation_error)?;
                if min_length > max_length {
                    return Err(MeshError::invalid_param(
                        "min_length",
                        min_length,
                        "must not exceed max_length",
                    ));
                }
            }
        }
        if !(self.smoothing_lambda > 0.0 && self.smoothing_lambda <= 1.0) {
            return Err(MeshError::invalid_param(
                "smoothing_lambda",
                self.smoothing_lambda,
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Counts of the edits performed by [`remesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemeshReport {
    /// Iterations run.
    pub iterations: usize,
    /// Edge splits.
    pub splits: usize,
    /// Edge collapses.
    pub collapses: usize,
    /// Edge flips.
    pub flips: usize,
    /// `Completed` when an iteration made no topological change,
    /// `ResourceExhausted` when the iteration cap was reached first.
    pub termination: Termination,
}

/// Target edge length for a curvature magnitude.
///
/// A circle segment of radius `r = 1 / curvature` with sagitta `error` has
/// chord `2·sqrt(2re − e²)`; the equilateral triangle inscribed in that chord
/// circle has edge `sqrt(6re − 3e²)`.
pub fn curvature_target_length(curvature: f64, error: f64, min_length: f64, max_length: f64) -> f64 {
    let c = curvature.abs();
    let length = if c < 1e-12 {
        max_length
    } else {
        let r = 1.0 / c;
        if error < r {
            (6.0 * error * r - 3.0 * error * error).sqrt()
        } else {
            error * 3.0_f64.sqrt()
        }
    };
    length.clamp(min_length, max_length)
}

fn initial_sizing<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, sizing: Sizing) -> Result<Vec<f64>> {
    match sizing {
        Sizing::Uniform(length) => Ok(vec![length; mesh.vertex_slots()]),
        Sizing::Adaptive {
            min_length,
            max_length,
            approximation_error,
        } => {
            // One-ring tensors; two rings would average over regions larger than min_length
            let curvature = analyze_tensor(
                mesh,
                &CurvatureOptions::default()
                    .with_two_ring(false)
                    .with_post_smoothing_steps(1),
            )?;
            Ok((0..mesh.vertex_slots())
                .map(|i| {
                    let c = curvature.max_abs(VertexId::new(i));
                    curvature_target_length(c, approximation_error, min_length, max_length)
                })
                .collect())
        }
    }
}

/// Remesh a triangle mesh in place.
///
/// Fails with `PreconditionUnmet` for a mesh without faces or with
/// non-triangular faces, and with `InvalidParameter` for non-positive
/// lengths. The mesh is compacted before returning.
pub fn remesh<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &RemeshOptions) -> Result<RemeshReport> {
    options.validate()?;
    if mesh.num_faces() == 0 {
        return Err(MeshError::precondition("remeshing requires a mesh with faces"));
    }
    if !mesh.is_triangle_mesh() {
        return Err(MeshError::precondition("remeshing requires a triangle mesh"));
    }
    if mesh.properties().contains(ElementKind::Edge, FEATURE_EDGE_PROPERTY) {
        mesh.edge_property::<bool>(FEATURE_EDGE_PROPERTY)?;
    }

    let sizing = initial_sizing(mesh, options.sizing)?;
    let reference = ReferenceSurface::new(mesh, sizing.clone());
    let mut state = RemeshState {
        sizing,
        features: super::features::feature_edges(mesh),
    };

    let mut report = RemeshReport {
        iterations: 0,
        splits: 0,
        collapses: 0,
        flips: 0,
        termination: Termination::ResourceExhausted,
    };
    let total_steps = options.iterations * 4;

    for iteration in 0..options.iterations {
        let step = iteration * 4;

        options.progress.report(step, total_steps, "splitting long edges");
        let splits = passes::split_long_edges(mesh, &mut state, 10);

        options.progress.report(step + 1, total_steps, "collapsing short edges");
        let collapses = passes::collapse_short_edges(mesh, &state);

        options.progress.report(step + 2, total_steps, "flipping edges");
        let flips = passes::flip_for_valence(mesh, &state, 10);

        options.progress.report(step + 3, total_steps, "relaxing");
        let target = options.projection.then_some(&reference);
        for _ in 0..options.smoothing_iterations {
            passes::tangential_relaxation(mesh, &mut state, target, options.smoothing_lambda, options.parallel);
        }

        report.iterations += 1;
        report.splits += splits;
        report.collapses += collapses;
        report.flips += flips;
        log::debug!(
            "remesh iteration {}: {} splits, {} collapses, {} flips",
            iteration + 1,
            splits,
            collapses,
            flips
        );

        if splits == 0 && collapses == 0 && flips == 0 {
            report.termination = Termination::Completed;
            break;
        }
    }
    options.progress.report(total_steps, total_steps, "remeshing complete");

    // Carry feature flags through compaction
    if mesh.properties().contains(ElementKind::Edge, FEATURE_EDGE_PROPERTY) {
        let vertex_flags: Vec<bool> = mesh
            .vertex_ids()
            .map(|v| mesh.vertex_halfedges(v).any(|h| state.features[h.edge().index()]))
            .collect();
        let mut per_slot = vec![false; mesh.vertex_slots()];
        for (v, flag) in mesh.vertex_ids().zip(vertex_flags) {
            per_slot[v.index()] = flag;
        }
        let props = mesh.properties_mut();
        props.set(ElementKind::Edge, FEATURE_EDGE_PROPERTY, state.features, false)?;
        props.set(ElementKind::Vertex, FEATURE_VERTEX_PROPERTY, per_slot, false)?;
    }
    mesh.compact();

    log::info!(
        "remeshing: {} iterations, {} splits, {} collapses, {} flips ({}), {} vertices",
        report.iterations,
        report.splits,
        report.collapses,
        report.flips,
        report.termination,
        mesh.num_vertices()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::components::topology_info;
    use crate::algo::features::detect_angle;
    use crate::mesh::{build_from_triangles, fixtures};
    use nalgebra::Point3;

    fn edge_length_range(mesh: &HalfEdgeMesh) -> (f64, f64) {
        mesh.edge_ids()
            .map(|e| mesh.edge_length(e))
            .fold((f64::INFINITY, 0.0), |(lo, hi), l| (lo.min(l), hi.max(l)))
    }

    #[test]
    fn test_uniform_refines_sphere_and_stays_on_it() {
        let mut mesh = fixtures::icosahedron();
        let before = topology_info(&mesh);
        let report = remesh(&mut mesh, &RemeshOptions::uniform(0.3).with_iterations(5)).unwrap();

        assert!(report.splits > 0);
        assert!(mesh.is_valid());
        assert!(!mesh.has_garbage());
        assert!(mesh.num_vertices() > 12);
        // Topology is unchanged
        assert_eq!(topology_info(&mesh).euler_characteristic, before.euler_characteristic);
        // Projection keeps vertices on the input icosahedron, inside the sphere
        for v in mesh.vertex_ids() {
            let r = mesh.position(v).coords.norm();
            assert!(r <= 1.0 + 1e-9 && r > 0.7, "radius {}", r);
        }
        let (_, longest) = edge_length_range(&mesh);
        assert!(longest < 2.0 * 0.3, "longest edge {}", longest);
    }

    #[test]
    fn test_coarsening_keeps_square_outline() {
        let mut mesh = fixtures::grid(8);
        remesh(&mut mesh, &RemeshOptions::uniform(2.5).with_iterations(5)).unwrap();
        assert!(mesh.is_valid());
        assert!(mesh.num_vertices() < 81);

        let (min, max) = mesh.bounding_box().unwrap();
        assert_eq!((min.x, min.y, max.x, max.y), (0.0, 0.0, 8.0, 8.0));
        for corner in [(0.0, 0.0), (8.0, 0.0), (0.0, 8.0), (8.0, 8.0)] {
            assert!(mesh
                .vertex_ids()
                .any(|v| mesh.position(v).x == corner.0 && mesh.position(v).y == corner.1));
        }
        for v in mesh.vertex_ids() {
            assert_eq!(mesh.position(v).z, 0.0);
        }
    }

    #[test]
    fn test_feature_edges_survive() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let faces = [
            [0, 3, 2], [0, 2, 1], [4, 5, 6], [4, 6, 7],
            [0, 1, 5], [0, 5, 4], [2, 3, 7], [2, 7, 6],
            [0, 4, 7], [0, 7, 3], [1, 2, 6], [1, 6, 5],
        ];
        let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
        detect_angle(&mut mesh, 45.0).unwrap();

        remesh(&mut mesh, &RemeshOptions::uniform(0.25).with_iterations(4)).unwrap();
        assert!(mesh.is_valid());
        // Every vertex still lies on the cube surface
        for v in mesh.vertex_ids() {
            let p = mesh.position(v);
            let on_face = [p.x, p.y, p.z].iter().any(|&c| c.abs() < 1e-9 || (c - 1.0).abs() < 1e-9);
            assert!(on_face, "{:?}", p);
        }
        // All eight corners survive
        for corner in &vertices {
            assert!(mesh.vertex_ids().any(|v| mesh.position(v) == corner));
        }
        let flags: &[bool] = mesh.edge_property(FEATURE_EDGE_PROPERTY).unwrap();
        assert!(flags.iter().filter(|&&f| f).count() >= 12);
    }

    #[test]
    fn test_adaptive_targets_follow_curvature() {
        assert_eq!(curvature_target_length(0.0, 0.01, 0.05, 1.0), 1.0);
        let flat_ish = curvature_target_length(0.1, 0.01, 0.05, 1.0);
        let curved = curvature_target_length(10.0, 0.01, 0.05, 1.0);
        assert!(curved < flat_ish);
        assert_eq!(curvature_target_length(1e6, 0.01, 0.05, 1.0), 0.05);

        let mut mesh = fixtures::torus(16, 8);
        let report = remesh(&mut mesh, &RemeshOptions::adaptive(0.1, 0.8, 0.01).with_iterations(3)).unwrap();
        assert!(mesh.is_valid());
        assert!(report.iterations <= 3);
        assert_eq!(topology_info(&mesh).euler_characteristic, 0);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let mut a = fixtures::sphere(1);
        let mut b = fixtures::sphere(1);
        let options = RemeshOptions::uniform(0.25).with_iterations(2);
        remesh(&mut a, &options).unwrap();
        remesh(&mut b, &options.clone().with_parallel(false)).unwrap();
        assert_eq!(a.positions(), b.positions());
    }

    #[test]
    fn test_preconditions() {
        let mut quads = fixtures::cube();
        assert!(remesh(&mut quads, &RemeshOptions::uniform(0.5)).unwrap_err().is_precondition());

        let mut mesh = fixtures::tetrahedron();
        let err = remesh(&mut mesh, &RemeshOptions::uniform(-1.0)).unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "target_length", .. }));
        let err = remesh(&mut mesh, &RemeshOptions::adaptive(1.0, 0.5, 0.01)).unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "min_length", .. }));
    }
}
