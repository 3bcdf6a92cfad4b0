//! Discrete curvature estimation.
//!
//! Principal curvatures and directions come from a curvature tensor
//! accumulated over a one- or two-ring neighbourhood: every edge contributes
//! its signed dihedral angle times its length along the edge direction
//! (normal cycle theory). The eigenvector most aligned with the vertex normal
//! is discarded; the remaining two eigenvalues are the principal curvatures.
//! An edge bends the surface across itself, so the eigenvector of the larger
//! eigenvalue is the direction of *minimum* curvature.
//!
//! Signs follow the outward normal: convex regions have positive curvature.
//!
//! Angle-defect Gaussian curvature and cotangent mean curvature are provided
//! as cheaper per-vertex estimates.
//!
//! # Example
//!
//! ```no_run
//! use tessera::prelude::*;
//! use tessera::algo::curvature::{compute_curvature, CurvatureOptions};
//!
//! let mut mesh: HalfEdgeMesh = tessera::io::load("mesh.obj").unwrap();
//! let result = compute_curvature(&mut mesh, &CurvatureOptions::default()).unwrap();
//!
//! let v = VertexId::new(0);
//! let (k1, k2) = result.principal(v);
//! println!("mean {} gauss {} ({} / {})", result.mean(v), result.gaussian(v), k1, k2);
//! ```
//!
//! # References
//!
//! - Cohen-Steiner, D., Morvan, J.-M. (2003). "Restricted Delaunay
//!   Triangulations and Normal Cycle." SoCG.
//! - Meyer, M., et al. (2003). "Discrete Differential-Geometry Operators for
//!   Triangulated 2-Manifolds." Visualization and Mathematics III.

use std::f64::consts::PI;
use std::marker::PhantomData;

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use super::laplace::{self, LaplaceWeighting};
use crate::error::{MeshError, Result};
use crate::mesh::{EdgeId, ElementKind, HalfEdgeMesh, MeshIndex, VertexId};

/// Property names written by [`compute_curvature`].
pub mod names {
    /// Minimum principal curvature.
    pub const MIN: &str = "v:curv_min";
    /// Maximum principal curvature.
    pub const MAX: &str = "v:curv_max";
    /// Mean curvature.
    pub const MEAN: &str = "v:curv_mean";
    /// Gaussian curvature.
    pub const GAUSS: &str = "v:curv_gauss";
    /// Largest absolute principal curvature.
    pub const MAX_ABS: &str = "v:curv_max_abs";
    /// Direction of minimum curvature.
    pub const DIR_MIN: &str = "v:curv_dir_min";
    /// Direction of maximum curvature.
    pub const DIR_MAX: &str = "v:curv_dir_max";
}

/// Options for tensor curvature analysis.
#[derive(Debug, Clone)]
pub struct CurvatureOptions {
    /// Number of smoothing passes applied to the principal curvatures.
    pub post_smoothing_steps: usize,
    /// Use a two-ring instead of a one-ring neighbourhood.
    pub two_ring: bool,
    /// Evaluate vertices in parallel.
    pub parallel: bool,
}

impl Default for CurvatureOptions {
    fn default() -> Self {
        Self {
            post_smoothing_steps: 0,
            two_ring: true,
            parallel: true,
        }
    }
}

impl CurvatureOptions {
    /// Set the number of post-smoothing passes.
    pub fn with_post_smoothing_steps(mut self, steps: usize) -> Self {
        self.post_smoothing_steps = steps;
        self
    }

    /// Choose between one- and two-ring neighbourhoods.
    pub fn with_two_ring(mut self, two_ring: bool) -> Self {
        self.two_ring = two_ring;
        self
    }

    /// Enable or disable parallel evaluation.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Per-vertex principal curvatures and directions, indexed by vertex slot.
#[derive(Debug, Clone)]
pub struct CurvatureResult<I: MeshIndex = u32> {
    min: Vec<f64>,
    max: Vec<f64>,
    dir_min: Vec<Vector3<f64>>,
    dir_max: Vec<Vector3<f64>>,
    _marker: PhantomData<I>,
}

impl<I: MeshIndex> CurvatureResult<I> {
    /// Principal curvatures (k1, k2) with k1 >= k2.
    #[inline]
    pub fn principal(&self, v: VertexId<I>) -> (f64, f64) {
        (self.max[v.index()], self.min[v.index()])
    }

    /// Minimum principal curvature.
    #[inline]
    pub fn min(&self, v: VertexId<I>) -> f64 {
        self.min[v.index()]
    }

    /// Maximum principal curvature.
    #[inline]
    pub fn max(&self, v: VertexId<I>) -> f64 {
        self.max[v.index()]
    }

    /// Mean curvature (k1 + k2) / 2.
    #[inline]
    pub fn mean(&self, v: VertexId<I>) -> f64 {
        0.5 * (self.min[v.index()] + self.max[v.index()])
    }

    /// Gaussian curvature k1 * k2.
    #[inline]
    pub fn gaussian(&self, v: VertexId<I>) -> f64 {
        self.min[v.index()] * self.max[v.index()]
    }

    /// max(|k1|, |k2|).
    #[inline]
    pub fn max_abs(&self, v: VertexId<I>) -> f64 {
        self.min[v.index()].abs().max(self.max[v.index()].abs())
    }

    /// Unit tangent direction of minimum curvature.
    #[inline]
    pub fn min_direction(&self, v: VertexId<I>) -> Vector3<f64> {
        self.dir_min[v.index()]
    }

    /// Unit tangent direction of maximum curvature.
    #[inline]
    pub fn max_direction(&self, v: VertexId<I>) -> Vector3<f64> {
        self.dir_max[v.index()]
    }

    /// Shape index (2/π) atan((k1+k2)/(k1-k2)) in [-1, 1].
    pub fn shape_index(&self, v: VertexId<I>) -> f64 {
        let (k1, k2) = self.principal(v);
        let diff = k1 - k2;
        if diff.abs() < 1e-10 {
            0.0
        } else {
            (2.0 / PI) * ((k1 + k2) / diff).atan()
        }
    }

    /// Curvedness sqrt((k1² + k2²) / 2).
    pub fn curvedness(&self, v: VertexId<I>) -> f64 {
        let (k1, k2) = self.principal(v);
        ((k1 * k1 + k2 * k2) / 2.0).sqrt()
    }

    /// Number of vertex slots covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.min.len()
    }

    /// True for an empty mesh.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.is_empty()
    }
}

/// Signed dihedral angle of every edge slot; positive where the surface is
/// convex, zero on the border.
fn dihedral_angles<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Vec<f64> {
    (0..mesh.edge_slots())
        .into_par_iter()
        .map(|i| {
            let e = EdgeId::new(i);
            if mesh.is_deleted_edge(e) || mesh.is_boundary_edge(e) {
                return 0.0;
            }
            let h0 = e.halfedge(0);
            let h1 = e.halfedge(1);
            let n0 = mesh.face_normal(mesh.face_of(h0));
            let n1 = mesh.face_normal(mesh.face_of(h1));
            let angle = n0.dot(&n1).clamp(-1.0, 1.0).acos();
            let other = mesh.face_centroid(mesh.face_of(h1)) - mesh.position(mesh.source(h0));
            if other.dot(&n0) > 0.0 {
                -angle
            } else {
                angle
            }
        })
        .collect()
}

/// Vertices within one or two rings of `v`, including `v`.
fn neighbourhood<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>, two_ring: bool) -> Vec<VertexId<I>> {
    let mut ring: Vec<VertexId<I>> = std::iter::once(v).chain(mesh.vertex_neighbors(v)).collect();
    if two_ring {
        let first = ring.len();
        for i in 1..first {
            let w = ring[i];
            ring.extend(mesh.vertex_neighbors(w));
        }
    }
    ring.sort_unstable();
    ring.dedup();
    ring
}

/// Principal curvatures and directions at one vertex.
fn vertex_tensor<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    v: VertexId<I>,
    dihedral: &[f64],
    two_ring: bool,
) -> (f64, f64, Vector3<f64>, Vector3<f64>) {
    let normal = mesh.vertex_normal(v);
    if mesh.is_isolated(v) || normal.norm_squared() == 0.0 {
        return (0.0, 0.0, Vector3::zeros(), Vector3::zeros());
    }

    let mut tensor = Matrix3::zeros();
    let mut area = 0.0;
    for w in neighbourhood(mesh, v, two_ring) {
        area += laplace::barycentric_area(mesh, w);
        // Each endpoint inside the region owns half of the edge
        for h in mesh.vertex_halfedges(w) {
            let beta = dihedral[h.edge().index()];
            if beta == 0.0 {
                continue;
            }
            let d = mesh.halfedge_vector(h);
            let length = d.norm();
            if length < f64::MIN_POSITIVE {
                continue;
            }
            let dir = d / length;
            tensor += (beta * 0.5 * length) * dir * dir.transpose();
        }
    }
    if area < f64::MIN_POSITIVE {
        return (0.0, 0.0, Vector3::zeros(), Vector3::zeros());
    }
    tensor /= area;

    let eigen = tensor.symmetric_eigen();
    let normal_axis = (0..3)
        .max_by(|&a, &b| {
            let da = eigen.eigenvectors.column(a).dot(&normal).abs();
            let db = eigen.eigenvectors.column(b).dot(&normal).abs();
            da.total_cmp(&db)
        })
        .unwrap_or(0);
    let (a, b) = match normal_axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    let (lo, hi) = if eigen.eigenvalues[a] <= eigen.eigenvalues[b] {
        (a, b)
    } else {
        (b, a)
    };

    let tangent = |i: usize| -> Vector3<f64> {
        let d: Vector3<f64> = eigen.eigenvectors.column(i).into_owned();
        (d - d.dot(&normal) * normal)
            .try_normalize(1e-12)
            .unwrap_or_else(Vector3::zeros)
    };

    // Swapped: the bending direction is orthogonal to the edge direction
    let k_min = eigen.eigenvalues[lo];
    let k_max = eigen.eigenvalues[hi];
    (k_min, k_max, tangent(hi), tangent(lo))
}

/// Average each principal curvature with its neighbours, border vertices fixed.
fn smooth_values<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, values: &mut [f64], weights: &[f64], steps: usize) {
    for _ in 0..steps {
        let previous = values.to_vec();
        for v in mesh.vertex_ids() {
            if mesh.is_boundary_vertex(v) {
                continue;
            }
            let mut sum = 0.0;
            let mut weight_sum = 0.0;
            for h in mesh.vertex_halfedges(v) {
                let w = weights[h.edge().index()];
                sum += w * previous[mesh.target(h).index()];
                weight_sum += w;
            }
            if weight_sum > 0.0 {
                values[v.index()] = sum / weight_sum;
            }
        }
    }
}

/// Estimate principal curvatures with the normal-cycle tensor.
///
/// Does not modify the mesh; see [`compute_curvature`] for the variant that
/// stores the results as vertex properties.
pub fn analyze_tensor<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    options: &CurvatureOptions,
) -> Result<CurvatureResult<I>> {
    if mesh.num_faces() == 0 {
        return Err(MeshError::precondition("curvature requires a mesh with faces"));
    }

    let dihedral = dihedral_angles(mesh);
    let compute = |i: usize| {
        let v = VertexId::new(i);
        if mesh.is_deleted_vertex(v) {
            (0.0, 0.0, Vector3::zeros(), Vector3::zeros())
        } else {
            vertex_tensor(mesh, v, &dihedral, options.two_ring)
        }
    };
    let per_vertex: Vec<_> = if options.parallel {
        (0..mesh.vertex_slots()).into_par_iter().map(compute).collect()
    } else {
        (0..mesh.vertex_slots()).map(compute).collect()
    };

    let n = per_vertex.len();
    let mut min = Vec::with_capacity(n);
    let mut max = Vec::with_capacity(n);
    let mut dir_min = Vec::with_capacity(n);
    let mut dir_max = Vec::with_capacity(n);
    for (kmin, kmax, dmin, dmax) in per_vertex {
        min.push(kmin);
        max.push(kmax);
        dir_min.push(dmin);
        dir_max.push(dmax);
    }

    if options.post_smoothing_steps > 0 {
        let weights = laplace::edge_weights(mesh, LaplaceWeighting::Cotangent);
        smooth_values(mesh, &mut min, &weights, options.post_smoothing_steps);
        smooth_values(mesh, &mut max, &weights, options.post_smoothing_steps);
        // Smoothing may reorder the pair
        for i in 0..n {
            if min[i] > max[i] {
                std::mem::swap(&mut min[i], &mut max[i]);
                std::mem::swap(&mut dir_min[i], &mut dir_max[i]);
            }
        }
    }

    log::debug!(
        "curvature tensor analysed for {} vertices ({} ring)",
        mesh.num_vertices(),
        if options.two_ring { "two" } else { "one" }
    );

    Ok(CurvatureResult {
        min,
        max,
        dir_min,
        dir_max,
        _marker: PhantomData,
    })
}

/// Estimate principal curvatures and store them as vertex properties.
///
/// Writes `v:curv_min`, `v:curv_max`, `v:curv_mean`, `v:curv_gauss`,
/// `v:curv_max_abs` (all `f64`) and `v:curv_dir_min`, `v:curv_dir_max`
/// (`Vector3<f64>`), replacing earlier values.
pub fn compute_curvature<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    options: &CurvatureOptions,
) -> Result<CurvatureResult<I>> {
    let result = analyze_tensor(mesh, options)?;

    let slots = || (0..result.len()).map(VertexId::<I>::new);
    let mean: Vec<f64> = slots().map(|v| result.mean(v)).collect();
    let gauss: Vec<f64> = slots().map(|v| result.gaussian(v)).collect();
    let max_abs: Vec<f64> = slots().map(|v| result.max_abs(v)).collect();

    let props = mesh.properties_mut();
    props.set(ElementKind::Vertex, names::MIN, result.min.clone(), 0.0)?;
    props.set(ElementKind::Vertex, names::MAX, result.max.clone(), 0.0)?;
    props.set(ElementKind::Vertex, names::MEAN, mean, 0.0)?;
    props.set(ElementKind::Vertex, names::GAUSS, gauss, 0.0)?;
    props.set(ElementKind::Vertex, names::MAX_ABS, max_abs, 0.0)?;
    props.set(ElementKind::Vertex, names::DIR_MIN, result.dir_min.clone(), Vector3::zeros())?;
    props.set(ElementKind::Vertex, names::DIR_MAX, result.dir_max.clone(), Vector3::zeros())?;

    Ok(result)
}

/// Angle-defect Gaussian curvature `(2π - Σθ) / A` per vertex slot.
///
/// Border vertices use `π - Σθ`. This function uses parallel computation; use
/// [`gaussian_curvature_sequential`] for single-threaded execution.
pub fn gaussian_curvature<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Vec<f64> {
    gaussian_curvature_impl(mesh, true)
}

/// Angle-defect Gaussian curvature (sequential version).
pub fn gaussian_curvature_sequential<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Vec<f64> {
    gaussian_curvature_impl(mesh, false)
}

/// Integrated angle defect at a vertex.
pub fn angle_defect<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> f64 {
    if mesh.is_isolated(v) {
        return 0.0;
    }
    let full = if mesh.is_boundary_vertex(v) { PI } else { 2.0 * PI };
    full - laplace::angle_sum(mesh, v)
}

fn gaussian_curvature_impl<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, parallel: bool) -> Vec<f64> {
    let compute_vertex = |idx: usize| -> f64 {
        let v = VertexId::<I>::new(idx);
        if mesh.is_deleted_vertex(v) {
            return 0.0;
        }
        let area = laplace::vertex_area(mesh, v);
        if area > 1e-10 {
            angle_defect(mesh, v) / area
        } else {
            0.0
        }
    };

    if parallel {
        (0..mesh.vertex_slots()).into_par_iter().map(compute_vertex).collect()
    } else {
        (0..mesh.vertex_slots()).map(compute_vertex).collect()
    }
}

/// Mean curvature `|Δx| / 2` from the cotangent Laplacian per vertex slot,
/// signed positive where the surface is convex.
pub fn mean_curvature<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Vec<f64> {
    let weights = laplace::edge_weights(mesh, LaplaceWeighting::Cotangent);
    (0..mesh.vertex_slots())
        .into_par_iter()
        .map(|idx| {
            let v = VertexId::<I>::new(idx);
            if mesh.is_deleted_vertex(v) || mesh.is_boundary_vertex(v) {
                return 0.0;
            }
            let area = laplace::vertex_area(mesh, v);
            if area <= 1e-10 {
                return 0.0;
            }
            let laplacian = laplace::umbrella(mesh, v, &weights) / area;
            let h = 0.5 * laplacian.norm();
            if laplacian.dot(&mesh.vertex_normal(v)) > 0.0 {
                -h
            } else {
                h
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_flat_grid_has_zero_curvature() {
        let mesh = fixtures::grid(4);
        let result = analyze_tensor(&mesh, &CurvatureOptions::default()).unwrap();
        for v in mesh.vertex_ids() {
            assert_relative_eq!(result.max_abs(v), 0.0, epsilon = 1e-9);
        }
        for k in gaussian_curvature(&mesh) {
            assert!(k.abs() < 1e-9);
        }
    }

    #[test]
    fn test_sphere_curvature_is_close_to_one() {
        let mesh = fixtures::sphere(2);
        let result = analyze_tensor(&mesh, &CurvatureOptions::default()).unwrap();
        for v in mesh.vertex_ids() {
            let (k1, k2) = result.principal(v);
            assert!(k1 >= k2);
            assert!((result.mean(v) - 1.0).abs() < 0.25, "mean {}", result.mean(v));
            assert!(k2 > 0.5, "convex sphere should have positive k2, got {}", k2);
        }
    }

    #[test]
    fn test_cylinder_principal_directions() {
        let mesh = fixtures::cylinder(8, 32);
        let result = analyze_tensor(&mesh, &CurvatureOptions::default()).unwrap();
        let axis = Vector3::z();
        let mut checked = 0;
        for v in mesh.vertex_ids() {
            let z = mesh.position(v).z;
            if !(0.3..=0.7).contains(&z) {
                continue;
            }
            let (k1, k2) = result.principal(v);
            assert!((k1 - 1.0).abs() < 0.1, "k1 {}", k1);
            assert!(k2.abs() < 0.1, "k2 {}", k2);
            assert!(result.min_direction(v).dot(&axis).abs() > 0.9);
            assert!(result.max_direction(v).dot(&axis).abs() < 0.1);
            checked += 1;
        }
        assert!(checked > 0);
    }

    #[test]
    fn test_one_ring_and_parallel_agree() {
        let mesh = fixtures::sphere(1);
        let par = analyze_tensor(&mesh, &CurvatureOptions::default().with_two_ring(false)).unwrap();
        let seq = analyze_tensor(
            &mesh,
            &CurvatureOptions::default().with_two_ring(false).with_parallel(false),
        )
        .unwrap();
        for v in mesh.vertex_ids() {
            assert_eq!(par.principal(v), seq.principal(v));
        }
    }

    #[test]
    fn test_compute_curvature_writes_properties() {
        let mut mesh = fixtures::sphere(1);
        let options = CurvatureOptions::default().with_post_smoothing_steps(2);
        let result = compute_curvature(&mut mesh, &options).unwrap();

        let mean: &[f64] = mesh.vertex_property(names::MEAN).unwrap();
        let gauss: &[f64] = mesh.vertex_property(names::GAUSS).unwrap();
        let dirs: &[Vector3<f64>] = mesh.vertex_property(names::DIR_MAX).unwrap();
        assert_eq!(mean.len(), mesh.num_vertices());
        assert_eq!(dirs.len(), mesh.num_vertices());
        for v in mesh.vertex_ids() {
            assert_relative_eq!(mean[v.index()], result.mean(v));
            assert_relative_eq!(gauss[v.index()], result.gaussian(v));
            assert!(result.shape_index(v).abs() <= 1.0 + 1e-12);
            assert!(result.curvedness(v) >= 0.0);
        }

        // A second call replaces the stored values
        compute_curvature(&mut mesh, &options).unwrap();
    }

    #[test]
    fn test_empty_mesh_is_rejected() {
        let mesh: HalfEdgeMesh = HalfEdgeMesh::new();
        let err = analyze_tensor(&mesh, &CurvatureOptions::default()).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_gauss_bonnet() {
        // Total angle defect is 2πχ
        let sphere = fixtures::sphere(2);
        let total: f64 = sphere.vertex_ids().map(|v| angle_defect(&sphere, v)).sum();
        assert_relative_eq!(total, 4.0 * PI, epsilon = 1e-9);

        let torus = fixtures::torus(12, 8);
        let total: f64 = torus.vertex_ids().map(|v| angle_defect(&torus, v)).sum();
        assert_relative_eq!(total, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_mean_curvature_sign_on_sphere() {
        let mesh = fixtures::sphere(2);
        let h = mean_curvature(&mesh);
        let k = gaussian_curvature_sequential(&mesh);
        for v in mesh.vertex_ids() {
            assert!(h[v.index()] > 0.5, "mean {}", h[v.index()]);
            assert!(k[v.index()] > 0.5, "gauss {}", k[v.index()]);
        }
    }
}
