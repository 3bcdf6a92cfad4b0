//! Laplacian mesh smoothing.
//!
//! Two flavours:
//!
//! - [`explicit_smooth`]: N iterations of weighted umbrella averaging. Cheap,
//!   but each step must be small to stay stable. Optionally re-projects every
//!   vertex onto its original tangent plane, which removes the normal
//!   component of the motion and with it most of the shrinkage.
//! - [`implicit_smooth`]: one backward-Euler step of the heat flow,
//!   `(M + t·L) x' = M x` per coordinate with mass matrix `M` and positive
//!   semi-definite Laplacian `L`. Unconditionally stable for any `t`. When no
//!   vertex is held fixed the result is rescaled to the original surface area
//!   and recentred, since the flow itself shrinks the surface.
//!
//! # Example
//!
//! ```
//! use tessera::prelude::*;
//! use tessera::algo::smooth::{explicit_smooth, SmoothOptions};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 0.5),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
//! let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//!
//! explicit_smooth(&mut mesh, &SmoothOptions::default().with_iterations(3)).unwrap();
//! ```

use nalgebra::{DVector, Point3, Vector3};
use rayon::prelude::*;

use super::laplace::{self, LaplaceWeighting, VertexNumbering};
use super::sparse::{self, CsrMatrix, SolverOptions};
use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

/// Options for explicit and implicit smoothing.
#[derive(Debug, Clone)]
pub struct SmoothOptions {
    /// Number of explicit iterations.
    pub iterations: usize,

    /// Explicit step size in (0, 1]; fraction of the way towards the
    /// weighted neighbour average.
    pub lambda: f64,

    /// Implicit time step.
    pub timestep: f64,

    /// Edge weighting of the Laplacian.
    pub weighting: LaplaceWeighting,

    /// Keep border vertices fixed.
    pub preserve_boundary: bool,

    /// Explicit only: project each vertex back onto its original tangent plane.
    pub tangential: bool,

    /// Implicit only: restore surface area and centroid when nothing is fixed.
    pub rescale: bool,

    /// Evaluate vertices and solve coordinates in parallel.
    pub parallel: bool,

    /// Linear solver limits for the implicit step.
    pub solver: SolverOptions,
}

impl Default for SmoothOptions {
    fn default() -> Self {
        Self {
            iterations: 1,
            lambda: 0.5,
            timestep: 1e-3,
            weighting: LaplaceWeighting::Cotangent,
            preserve_boundary: true,
            tangential: false,
            rescale: true,
            parallel: true,
            solver: SolverOptions::default(),
        }
    }
}

impl SmoothOptions {
    /// Set the number of explicit iterations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the explicit step size.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    /// Set the implicit time step.
    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.timestep = timestep;
        self
    }

    /// Choose uniform or cotangent weights.
    pub fn with_weighting(mut self, weighting: LaplaceWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Let border vertices move.
    pub fn allow_boundary_movement(mut self) -> Self {
        self.preserve_boundary = false;
        self
    }

    /// Enable tangent-plane re-projection for explicit smoothing.
    pub fn with_tangential(mut self, tangential: bool) -> Self {
        self.tangential = tangential;
        self
    }

    /// Enable or disable area rescaling for implicit smoothing.
    pub fn with_rescale(mut self, rescale: bool) -> Self {
        self.rescale = rescale;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the linear solver limits.
    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }
}

fn require_faces<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Result<()> {
    if mesh.num_faces() == 0 {
        return Err(MeshError::precondition("smoothing requires a mesh with faces"));
    }
    Ok(())
}

/// Whether a vertex stays in place.
fn is_fixed<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>, preserve_boundary: bool) -> bool {
    mesh.is_isolated(v) || (preserve_boundary && mesh.is_boundary_vertex(v))
}

/// Explicit Laplacian smoothing.
///
/// Each iteration moves every free vertex by `lambda` times the difference
/// between the normalized weighted neighbour average and its position.
/// Weights are recomputed from the current geometry every iteration.
pub fn explicit_smooth<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &SmoothOptions) -> Result<()> {
    require_faces(mesh)?;
    if !(options.lambda > 0.0 && options.lambda <= 1.0) {
        return Err(MeshError::invalid_param("lambda", options.lambda, "must be in (0, 1]"));
    }

    let n = mesh.vertex_slots();
    let fixed: Vec<bool> = (0..n)
        .map(|i| {
            let v = VertexId::new(i);
            mesh.is_deleted_vertex(v) || is_fixed(mesh, v, options.preserve_boundary)
        })
        .collect();
    let original: Vec<(Point3<f64>, Vector3<f64>)> = if options.tangential {
        (0..n)
            .map(|i| {
                let v = VertexId::new(i);
                if fixed[i] {
                    (Point3::origin(), Vector3::zeros())
                } else {
                    (*mesh.position(v), mesh.vertex_normal(v))
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    for iteration in 0..options.iterations {
        let weights = laplace::edge_weights(mesh, options.weighting);
        let step = |i: usize| -> Point3<f64> {
            let v = VertexId::new(i);
            let p = *mesh.position(v);
            if fixed[i] {
                return p;
            }
            let mut weight_sum = 0.0;
            for h in mesh.vertex_halfedges(v) {
                weight_sum += weights[h.edge().index()];
            }
            if weight_sum <= 0.0 {
                return p;
            }
            let mut q = p + options.lambda * laplace::umbrella(mesh, v, &weights) / weight_sum;
            if options.tangential {
                let (origin, normal) = original[i];
                q -= (q - origin).dot(&normal) * normal;
            }
            q
        };

        let new_positions: Vec<Point3<f64>> = if options.parallel {
            (0..n).into_par_iter().map(step).collect()
        } else {
            (0..n).map(step).collect()
        };

        for (i, p) in new_positions.into_iter().enumerate() {
            if !fixed[i] {
                mesh.set_position(VertexId::new(i), p);
            }
        }
        log::trace!("explicit smoothing iteration {}", iteration + 1);
    }

    log::debug!(
        "explicit smoothing: {} iterations on {} vertices",
        options.iterations,
        mesh.num_vertices()
    );
    Ok(())
}

/// Area-weighted centroid of the surface.
fn surface_centroid<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Point3<f64> {
    let mut sum = Vector3::zeros();
    let mut area = 0.0;
    for f in mesh.face_ids() {
        let a = mesh.face_area(f);
        sum += a * mesh.face_centroid(f).coords;
        area += a;
    }
    if area > 0.0 {
        Point3::from(sum / area)
    } else {
        Point3::origin()
    }
}

/// Implicit Laplacian smoothing: one backward-Euler step of size `timestep`.
///
/// Fixed vertices (border vertices when `preserve_boundary` is set, isolated
/// vertices always) become Dirichlet constraints. The three coordinate systems
/// share one matrix and are solved independently, in parallel when enabled;
/// the result does not depend on thread scheduling.
pub fn implicit_smooth<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &SmoothOptions) -> Result<()> {
    require_faces(mesh)?;
    if !(options.timestep > 0.0 && options.timestep.is_finite()) {
        return Err(MeshError::invalid_param("timestep", options.timestep, "must be positive"));
    }

    let numbering = VertexNumbering::new(mesh, |v| !is_fixed(mesh, v, options.preserve_boundary));
    if numbering.is_empty() {
        log::debug!("implicit smoothing: no free vertices");
        return Ok(());
    }
    let any_fixed = mesh
        .vertex_ids()
        .any(|v| !mesh.is_isolated(v) && numbering.row(v).is_none());
    let rescale = options.rescale && !any_fixed;
    let area_before = mesh.surface_area();
    let centroid_before = surface_centroid(mesh);

    let weights = laplace::edge_weights(mesh, options.weighting);
    let t = options.timestep;
    let n = numbering.len();
    let mut triplets = Vec::with_capacity(7 * n);
    let mut rhs = vec![DVector::zeros(n), DVector::zeros(n), DVector::zeros(n)];
    let mut guess = vec![DVector::zeros(n), DVector::zeros(n), DVector::zeros(n)];

    for (r, &v) in numbering.vertices().iter().enumerate() {
        let p = mesh.position(v);
        let mass = laplace::vertex_area(mesh, v).max(f64::EPSILON);
        let mut diagonal = mass;
        let mut b = mass * p.coords;
        for h in mesh.vertex_halfedges(v) {
            let w = t * weights[h.edge().index()];
            let u = mesh.target(h);
            diagonal += w;
            match numbering.row(u) {
                Some(c) => triplets.push((r, c, -w)),
                None => b += w * mesh.position(u).coords,
            }
        }
        triplets.push((r, r, diagonal));
        for axis in 0..3 {
            rhs[axis][r] = b[axis];
            guess[axis][r] = p[axis];
        }
    }

    let matrix = CsrMatrix::from_triplets(n, n, triplets);
    let solution = sparse::solve_columns(&matrix, &rhs, Some(&guess), options.solver, options.parallel)?;

    for (r, &v) in numbering.vertices().iter().enumerate() {
        mesh.set_position(v, Point3::new(solution[0][r], solution[1][r], solution[2][r]));
    }

    if rescale {
        let area_after = mesh.surface_area();
        if area_after > f64::EPSILON {
            let scale = (area_before / area_after).sqrt();
            let centroid_after = surface_centroid(mesh);
            for v in numbering.vertices() {
                let p = mesh.position(*v);
                let q = centroid_before + scale * (p - centroid_after);
                mesh.set_position(*v, q);
            }
        }
    }

    log::debug!(
        "implicit smoothing: {} free vertices, t = {}{}",
        n,
        t,
        if rescale { ", rescaled" } else { "" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;

    /// Grid with every interior vertex lifted in a checkerboard pattern.
    fn noisy_grid() -> HalfEdgeMesh {
        let mut mesh = fixtures::grid(6);
        let ids: Vec<_> = mesh.vertex_ids().collect();
        for v in ids {
            if !mesh.is_boundary_vertex(v) {
                let mut p = *mesh.position(v);
                p.z = if (p.x + p.y) as i64 % 2 == 0 { 0.2 } else { -0.2 };
                mesh.set_position(v, p);
            }
        }
        mesh
    }

    fn roughness(mesh: &HalfEdgeMesh) -> f64 {
        mesh.vertex_ids().map(|v| mesh.position(v).z.powi(2)).sum()
    }

    fn mean_radius(mesh: &HalfEdgeMesh) -> f64 {
        mesh.vertex_ids().map(|v| mesh.position(v).coords.norm()).sum::<f64>() / mesh.num_vertices() as f64
    }

    #[test]
    fn test_explicit_reduces_noise_and_keeps_boundary() {
        let mut mesh = noisy_grid();
        let before = roughness(&mesh);
        let boundary: Vec<_> = mesh
            .vertex_ids()
            .filter(|&v| mesh.is_boundary_vertex(v))
            .map(|v| (v, *mesh.position(v)))
            .collect();

        explicit_smooth(&mut mesh, &SmoothOptions::default().with_iterations(5)).unwrap();

        assert!(roughness(&mesh) < 0.5 * before);
        for (v, p) in boundary {
            assert_eq!(*mesh.position(v), p);
        }
    }

    #[test]
    fn test_explicit_uniform_sequential_matches_parallel() {
        let options = SmoothOptions::default()
            .with_iterations(3)
            .with_weighting(LaplaceWeighting::Uniform);
        let mut a = noisy_grid();
        let mut b = noisy_grid();
        explicit_smooth(&mut a, &options).unwrap();
        explicit_smooth(&mut b, &options.clone().with_parallel(false)).unwrap();
        assert_eq!(a.positions(), b.positions());
    }

    #[test]
    fn test_tangential_projection_reduces_shrinkage() {
        let options = SmoothOptions::default().with_iterations(5);
        let mut plain = fixtures::sphere(1);
        let mut tangential = fixtures::sphere(1);
        explicit_smooth(&mut plain, &options).unwrap();
        explicit_smooth(&mut tangential, &options.clone().with_tangential(true)).unwrap();
        assert!(mean_radius(&tangential) > mean_radius(&plain));
    }

    #[test]
    fn test_implicit_flattens_interior() {
        let mut mesh = noisy_grid();
        let before = roughness(&mesh);
        implicit_smooth(&mut mesh, &SmoothOptions::default().with_timestep(10.0)).unwrap();
        assert!(roughness(&mesh) < 0.05 * before);
        for v in mesh.vertex_ids() {
            if mesh.is_boundary_vertex(v) {
                assert_eq!(mesh.position(v).z, 0.0);
            }
        }
    }

    #[test]
    fn test_implicit_rescale_preserves_area() {
        let mut mesh = fixtures::sphere(1);
        let area = mesh.surface_area();
        implicit_smooth(&mut mesh, &SmoothOptions::default().with_timestep(0.05)).unwrap();
        assert_relative_eq!(mesh.surface_area(), area, max_relative = 1e-9);
        assert!(surface_centroid(&mesh).coords.norm() < 1e-9);

        let mut shrunk = fixtures::sphere(1);
        implicit_smooth(
            &mut shrunk,
            &SmoothOptions::default().with_timestep(0.05).with_rescale(false),
        )
        .unwrap();
        assert!(shrunk.surface_area() < area);
    }

    #[test]
    fn test_invalid_parameters() {
        let mut mesh = fixtures::grid(2);
        let err = explicit_smooth(&mut mesh, &SmoothOptions::default().with_lambda(1.5)).unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "lambda", .. }));
        let err = implicit_smooth(&mut mesh, &SmoothOptions::default().with_timestep(0.0)).unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "timestep", .. }));

        let mut empty: HalfEdgeMesh = HalfEdgeMesh::new();
        assert!(explicit_smooth(&mut empty, &SmoothOptions::default())
            .unwrap_err()
            .is_precondition());
    }
}
