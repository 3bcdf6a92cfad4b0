//! Discrete Laplace–Beltrami building blocks.
//!
//! Edge weights, vertex areas and corner angles shared by curvature
//! estimation, smoothing, fairing and parameterization.
//!
//! Cotangent weights are `0.5 * (cot α + cot β)` where α and β are the angles
//! opposite the edge in its incident triangles. Degenerate configurations
//! (sliver triangles, strongly obtuse pairs giving a non-positive weight,
//! polygonal neighbours) fall back to the uniform weight `1.0` for that edge,
//! which keeps every assembled matrix symmetric with a positive diagonal.
//!
//! # References
//!
//! - Meyer, M., et al. (2003). "Discrete Differential-Geometry Operators for
//!   Triangulated 2-Manifolds." Visualization and Mathematics III.

use std::f64::consts::FRAC_PI_2;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::mesh::{EdgeId, FaceId, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Smallest cotangent weight accepted before falling back to uniform.
const MIN_COT_WEIGHT: f64 = 1e-8;

/// Edge weighting scheme for Laplacian operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaplaceWeighting {
    /// Every edge has weight one.
    Uniform,
    /// Cotangent weights with a per-edge uniform fallback.
    #[default]
    Cotangent,
}

/// Angle at vertex `a` in triangle (a, b, c).
pub fn triangle_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let denom = ab.norm() * ac.norm();
    if denom < f64::MIN_POSITIVE {
        return 0.0;
    }
    (ab.dot(&ac) / denom).clamp(-1.0, 1.0).acos()
}

/// Cotangent of the angle at vertex `a` in triangle (a, b, c).
///
/// Returns zero for degenerate triangles.
pub fn cotangent(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let cross_norm = ab.cross(&ac).norm();
    if cross_norm < 1e-10 {
        0.0
    } else {
        ab.dot(&ac) / cross_norm
    }
}

/// Cotangent of the corner opposite halfedge `h` in its face, if that face
/// is a triangle.
fn opposite_cotangent<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, h: HalfEdgeId<I>) -> Option<f64> {
    let f = mesh.face_of(h);
    if !f.is_valid() {
        return Some(0.0);
    }
    if mesh.face_degree(f) != 3 {
        return None;
    }
    let a = mesh.position(mesh.source(h));
    let b = mesh.position(mesh.target(h));
    let c = mesh.position(mesh.target(mesh.next(h)));
    Some(cotangent(c, a, b))
}

/// Laplacian weight of a single edge.
pub fn edge_weight<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    e: EdgeId<I>,
    weighting: LaplaceWeighting,
) -> f64 {
    match weighting {
        LaplaceWeighting::Uniform => 1.0,
        LaplaceWeighting::Cotangent => {
            let h0 = e.halfedge(0);
            let h1 = e.halfedge(1);
            match (opposite_cotangent(mesh, h0), opposite_cotangent(mesh, h1)) {
                (Some(c0), Some(c1)) => {
                    let w = 0.5 * (c0 + c1);
                    if w.is_finite() && w > MIN_COT_WEIGHT {
                        w
                    } else {
                        1.0
                    }
                }
                _ => 1.0,
            }
        }
    }
}

/// Laplacian weights for every edge slot (deleted edges get zero).
pub fn edge_weights<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, weighting: LaplaceWeighting) -> Vec<f64> {
    (0..mesh.edge_slots())
        .into_par_iter()
        .map(|i| {
            let e = EdgeId::new(i);
            if mesh.is_deleted_edge(e) {
                0.0
            } else {
                edge_weight(mesh, e, weighting)
            }
        })
        .collect()
}

/// Interior angle of the corner of a face at the target of `h`.
///
/// Works for any polygon: the corner is spanned by `h` and `next(h)`.
pub fn corner_angle<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, h: HalfEdgeId<I>) -> f64 {
    let v = mesh.position(mesh.target(h));
    let prev = mesh.position(mesh.source(h));
    let next = mesh.position(mesh.target(mesh.next(h)));
    triangle_angle(v, prev, next)
}

/// Sum of the face corner angles around a vertex.
pub fn angle_sum<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> f64 {
    mesh.vertex_halfedges(v)
        .map(|h| h.opposite())
        .filter(|&h| mesh.face_of(h).is_valid())
        .map(|h| corner_angle(mesh, h))
        .sum()
}

/// Share of a face's area assigned to vertex `v` in the mixed Voronoi scheme.
///
/// `h` is the halfedge of the face pointing into `v`. Polygons fall back to an
/// equal split.
fn mixed_area_contribution<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, f: FaceId<I>, h: HalfEdgeId<I>) -> f64 {
    let area = mesh.face_area(f);
    if mesh.face_degree(f) != 3 {
        return area / mesh.face_degree(f) as f64;
    }

    let p = mesh.position(mesh.target(h));
    let q = mesh.position(mesh.source(h));
    let r = mesh.position(mesh.target(mesh.next(h)));

    let angle_p = triangle_angle(p, q, r);
    let angle_q = triangle_angle(q, p, r);
    let angle_r = triangle_angle(r, p, q);

    if angle_p > FRAC_PI_2 {
        area / 2.0
    } else if angle_q > FRAC_PI_2 || angle_r > FRAC_PI_2 {
        area / 4.0
    } else {
        // (1/8) * (|PR|² cot Q + |PQ|² cot R)
        let cot_q = cotangent(q, p, r);
        let cot_r = cotangent(r, p, q);
        0.125 * ((r - p).norm_squared() * cot_q + (q - p).norm_squared() * cot_r)
    }
}

/// Mixed Voronoi area of a vertex.
///
/// Falls back to the barycentric area when the mixed area vanishes.
pub fn vertex_area<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> f64 {
    let mut area = 0.0;
    let mut barycentric = 0.0;
    for h in mesh.vertex_halfedges(v) {
        let h_in = h.opposite();
        let f = mesh.face_of(h_in);
        if !f.is_valid() {
            continue;
        }
        area += mixed_area_contribution(mesh, f, h_in);
        barycentric += mesh.face_area(f) / mesh.face_degree(f) as f64;
    }
    if area < 1e-12 {
        barycentric
    } else {
        area
    }
}

/// Mixed Voronoi areas for every vertex slot (deleted vertices get zero).
pub fn vertex_areas<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Vec<f64> {
    (0..mesh.vertex_slots())
        .into_par_iter()
        .map(|i| {
            let v = VertexId::new(i);
            if mesh.is_deleted_vertex(v) {
                0.0
            } else {
                vertex_area(mesh, v)
            }
        })
        .collect()
}

/// Barycentric (one third of each triangle) area of a vertex.
pub fn barycentric_area<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> f64 {
    mesh.vertex_faces(v)
        .map(|f| mesh.face_area(f) / mesh.face_degree(f) as f64)
        .sum()
}

/// Weighted umbrella vector `Σ w_ij (p_j - p_i)` at a vertex.
///
/// `weights` is indexed by edge slot, as returned by [`edge_weights`].
pub fn umbrella<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>, weights: &[f64]) -> Vector3<f64> {
    let p = mesh.position(v);
    let mut sum = Vector3::zeros();
    for h in mesh.vertex_halfedges(v) {
        sum += weights[h.edge().index()] * (mesh.position(mesh.target(h)) - p);
    }
    sum
}

/// Dense numbering of a subset of the mesh vertices.
///
/// Linear systems are assembled over the unknown vertices only; this maps
/// vertex handles to matrix rows and back.
#[derive(Debug, Clone)]
pub struct VertexNumbering<I: MeshIndex = u32> {
    row_of: Vec<usize>,
    vertices: Vec<VertexId<I>>,
}

impl<I: MeshIndex> VertexNumbering<I> {
    /// Number the live vertices accepted by `keep`, in handle order.
    pub fn new<F: Fn(VertexId<I>) -> bool>(mesh: &HalfEdgeMesh<I>, keep: F) -> Self {
        let mut row_of = vec![usize::MAX; mesh.vertex_slots()];
        let mut vertices = Vec::new();
        for v in mesh.vertex_ids() {
            if keep(v) {
                row_of[v.index()] = vertices.len();
                vertices.push(v);
            }
        }
        Self { row_of, vertices }
    }

    /// Matrix row of `v`, if it is numbered.
    #[inline]
    pub fn row(&self, v: VertexId<I>) -> Option<usize> {
        match self.row_of.get(v.index()) {
            Some(&r) if r != usize::MAX => Some(r),
            _ => None,
        }
    }

    /// Vertex at matrix row `r`.
    #[inline]
    pub fn vertex(&self, r: usize) -> VertexId<I> {
        self.vertices[r]
    }

    /// Numbered vertices in row order.
    pub fn vertices(&self) -> &[VertexId<I>] {
        &self.vertices
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// True when no vertex is numbered.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}
