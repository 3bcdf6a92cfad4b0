//! Mesh simplification by greedy quadric-error edge collapse.
//!
//! Every vertex carries the sum of the plane quadrics of its incident faces
//! (Garland & Heckbert, 1997). Halfedge collapses are ranked by the error of
//! the merged quadric at the surviving endpoint and applied cheapest first.
//! A collapse is rejected when it would
//!
//! - break the kernel's manifold rules,
//! - widen any face's normal cone beyond `normal_deviation_max_degrees`,
//! - leave a triangle with aspect ratio below `aspect_ratio_min` (unless the
//!   neighbourhood was already worse),
//! - create an edge longer than `edge_length_max`,
//! - raise the surviving vertex above `max_valence`,
//! - move a feature edge or a border, or remove a border or feature vertex
//!   that is not on a straight stretch of its line.
//!
//! Simplification stops at `target_vertex_count` or when no legal collapse
//! remains.
//!
//! # Example
//!
//! ```no_run
//! use tessera::prelude::*;
//! use tessera::algo::simplify::{simplify, SimplifyOptions};
//!
//! let mut mesh: HalfEdgeMesh = tessera::io::load("input.obj").unwrap();
//! let target = mesh.num_vertices() / 2;
//! let report = simplify(&mut mesh, &SimplifyOptions::with_target_vertices(target)).unwrap();
//! println!("{} collapses ({})", report.collapses, report.termination);
//! ```
//!
//! # References
//!
//! - Garland, M. & Heckbert, P. (1997). "Surface Simplification Using Quadric
//!   Error Metrics." SIGGRAPH '97.

mod quadric;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::{Point3, Vector3};

use super::features::{self, line_is_straight};
use super::progress::Progress;
use super::Termination;
use crate::error::{MeshError, Result};
use crate::mesh::{EdgeId, FaceId, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

pub use quadric::{NormalCone, Quadric};

/// Options for simplification.
#[derive(Debug, Clone)]
pub struct SimplifyOptions {
    /// Stop once the mesh has at most this many vertices.
    pub target_vertex_count: usize,

    /// Smallest acceptable triangle aspect ratio, in [0, 1] (1 = equilateral).
    pub aspect_ratio_min: Option<f64>,

    /// Largest allowed opening of any face's normal cone, in degrees.
    pub normal_deviation_max_degrees: Option<f64>,

    /// Longest allowed edge created by a collapse.
    pub edge_length_max: Option<f64>,

    /// Largest allowed valence of a surviving vertex.
    pub max_valence: Option<usize>,

    /// Never remove border vertices. When off, a border vertex can still
    /// only be removed where its two border edges are collinear.
    pub preserve_boundary: bool,

    /// Progress callback.
    pub progress: Progress,
}

impl SimplifyOptions {
    /// Simplify down to `target` vertices with no quality constraint.
    pub fn with_target_vertices(target: usize) -> Self {
        Self {
            target_vertex_count: target,
            aspect_ratio_min: None,
            normal_deviation_max_degrees: None,
            edge_length_max: None,
            max_valence: None,
            preserve_boundary: true,
            progress: Progress::none(),
        }
    }

    /// Reject collapses producing triangles with a worse aspect ratio.
    pub fn with_aspect_ratio_min(mut self, ratio: f64) -> Self {
        self.aspect_ratio_min = Some(ratio);
        self
    }

    /// Bound the normal deviation of every face.
    pub fn with_normal_deviation(mut self, degrees: f64) -> Self {
        self.normal_deviation_max_degrees = Some(degrees);
        self
    }

    /// Bound the length of created edges.
    pub fn with_edge_length_max(mut self, length: f64) -> Self {
        self.edge_length_max = Some(length);
        self
    }

    /// Bound the valence of surviving vertices.
    pub fn with_max_valence(mut self, valence: usize) -> Self {
        self.max_valence = Some(valence);
        self
    }

    /// Set whether border vertices may be removed (along the border only).
    pub fn with_preserve_boundary(mut self, preserve: bool) -> Self {
        self.preserve_boundary = preserve;
        self
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some(r) = self.aspect_ratio_min {
            if !(0.0..=1.0).contains(&r) {
                return Err(MeshError::invalid_param("aspect_ratio_min", r, "must be in [0, 1]"));
            }
        }
        if let Some(d) = self.normal_deviation_max_degrees {
            if !(d > 0.0 && d <= 180.0) {
                return Err(MeshError::invalid_param(
                    "normal_deviation_max_degrees",
                    d,
                    "must be in (0, 180]",
                ));
            }
        }
        if let Some(l) = self.edge_length_max {
            if !(l > 0.0) {
                return Err(MeshError::invalid_param("edge_length_max", l, "must be positive"));
            }
        }
        if let Some(v) = self.max_valence {
            if v < 3 {
                return Err(MeshError::invalid_param("max_valence", v, "must be at least 3"));
            }
        }
        Ok(())
    }
}

/// Outcome of [`simplify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimplifyReport {
    /// Collapses performed.
    pub collapses: usize,
    /// Vertices before simplification.
    pub vertices_before: usize,
    /// Vertices after simplification.
    pub vertices_after: usize,
    /// `Completed` when the target was reached, `Stalled` when no legal
    /// collapse remained.
    pub termination: Termination,
}

/// Shape quality of a triangle: shortest altitude over longest edge,
/// normalized so that an equilateral triangle scores 1.
pub fn aspect_ratio(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let longest = (b - a).norm().max((c - b).norm()).max((a - c).norm());
    if longest <= 0.0 {
        return 0.0;
    }
    let double_area = (b - a).cross(&(c - a)).norm();
    let altitude = double_area / longest;
    altitude / longest * 2.0 / 3.0_f64.sqrt()
}

/// Heap entry; ordered so the cheapest collapse pops first.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    seq: u64,
    halfedge: usize,
    version: u64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Simplifier<'a, I: MeshIndex> {
    mesh: &'a mut HalfEdgeMesh<I>,
    options: &'a SimplifyOptions,
    quadrics: Vec<Quadric>,
    cones: Vec<NormalCone>,
    features: Vec<bool>,
    versions: Vec<u64>,
    heap: BinaryHeap<Candidate>,
    seq: u64,
    max_cone_angle: f64,
}

impl<'a, I: MeshIndex> Simplifier<'a, I> {
    fn new(mesh: &'a mut HalfEdgeMesh<I>, options: &'a SimplifyOptions) -> Self {
        let mut quadrics = vec![Quadric::default(); mesh.vertex_slots()];
        let mut cones = vec![NormalCone::new(Vector3::z()); mesh.face_slots()];
        for f in mesh.face_ids() {
            let n = mesh.face_normal(f);
            cones[f.index()] = NormalCone::new(n);
            let q = Quadric::from_plane(&n, &mesh.face_centroid(f));
            for v in mesh.face_vertices(f) {
                quadrics[v.index()] += q;
            }
        }
        let features = features::feature_edges(mesh);
        let versions = vec![0; mesh.edge_slots()];
        let max_cone_angle = options
            .normal_deviation_max_degrees
            .map_or(f64::INFINITY, |d| 0.5 * d.to_radians());
        Self {
            mesh,
            options,
            quadrics,
            cones,
            features,
            versions,
            heap: BinaryHeap::new(),
            seq: 0,
            max_cone_angle,
        }
    }

    fn feature_degree(&self, v: VertexId<I>) -> usize {
        self.mesh
            .vertex_halfedges(v)
            .filter(|h| self.features[h.edge().index()])
            .count()
    }

    /// Triangle `f` with `from` replaced by `to` at `position`.
    fn moved_triangle(&self, f: FaceId<I>, from: VertexId<I>, position: &Point3<f64>) -> [Point3<f64>; 3] {
        let mut corners = [Point3::origin(); 3];
        for (k, v) in self.mesh.face_vertices(f).take(3).enumerate() {
            corners[k] = if v == from { *position } else { *self.mesh.position(v) };
        }
        corners
    }

    /// Whether collapsing `h` passes every configured constraint; returns the
    /// merged normal cones of the changed faces when it does.
    fn check(&self, h: HalfEdgeId<I>) -> Option<Vec<(FaceId<I>, NormalCone)>> {
        let mesh = &*self.mesh;
        let v0 = mesh.source(h);
        let v1 = mesh.target(h);
        let e = h.edge();

        if mesh.is_boundary_vertex(v0) {
            // Border vertices slide only along a straight stretch of border
            if self.options.preserve_boundary
                || !mesh.is_boundary_edge(e)
                || !line_is_straight(mesh, v0, |g| mesh.is_boundary_edge(g.edge()))
            {
                return None;
            }
        }
        let degree = self.feature_degree(v0);
        if degree > 0
            && (!self.features[e.index()]
                || degree != 2
                || !line_is_straight(mesh, v0, |g| self.features[g.edge().index()]))
        {
            return None;
        }
        if !mesh.is_collapse_ok(h) {
            return None;
        }

        let removed = [mesh.face_of(h), mesh.face_of(h.opposite())];
        let p1 = *mesh.position(v1);

        if let Some(max) = self.options.max_valence {
            let mut ring: Vec<VertexId<I>> = mesh
                .vertex_neighbors(v0)
                .chain(mesh.vertex_neighbors(v1))
                .filter(|&w| w != v0 && w != v1)
                .collect();
            ring.sort_unstable();
            ring.dedup();
            if ring.len() > max {
                return None;
            }
        }

        if let Some(max) = self.options.edge_length_max {
            if mesh
                .vertex_neighbors(v0)
                .any(|w| w != v1 && (mesh.position(w) - p1).norm() > max)
            {
                return None;
            }
        }

        let mut quality_before = f64::INFINITY;
        if self.options.aspect_ratio_min.is_some() {
            for f in mesh.vertex_faces(v0).chain(mesh.vertex_faces(v1)) {
                let [a, b, c] = mesh.face_positions(f);
                quality_before = quality_before.min(aspect_ratio(&a, &b, &c));
            }
        }

        let mut quality_after = f64::INFINITY;
        let mut cones = Vec::new();
        for f in mesh.vertex_faces(v0) {
            if removed.contains(&f) {
                continue;
            }
            let [a, b, c] = self.moved_triangle(f, v0, &p1);
            let normal = (b - a).cross(&(c - a));
            let length = normal.norm();
            if length < 1e-14 {
                return None;
            }
            let normal = normal / length;
            // Flipped face
            if normal.dot(&mesh.face_normal(f)) <= 0.0 {
                return None;
            }
            let cone = self.cones[f.index()].merge_normal(&normal);
            if cone.angle() > self.max_cone_angle {
                return None;
            }
            cones.push((f, cone));
            quality_after = quality_after.min(aspect_ratio(&a, &b, &c));
        }

        if let Some(min) = self.options.aspect_ratio_min {
            if quality_after < min && quality_after < quality_before {
                return None;
            }
        }
        Some(cones)
    }

    fn cost(&self, h: HalfEdgeId<I>) -> f64 {
        let v0 = self.mesh.source(h);
        let v1 = self.mesh.target(h);
        (self.quadrics[v0.index()] + self.quadrics[v1.index()]).evaluate(self.mesh.position(v1))
    }

    /// Push the cheaper legal direction of `e`, invalidating older entries.
    fn enqueue(&mut self, e: EdgeId<I>) {
        self.versions[e.index()] += 1;
        let best = [e.halfedge(0), e.halfedge(1)]
            .into_iter()
            .filter(|&h| self.check(h).is_some())
            .map(|h| (self.cost(h), h))
            .min_by(|a, b| a.0.total_cmp(&b.0));
        if let Some((cost, h)) = best {
            self.heap.push(Candidate {
                cost,
                seq: self.seq,
                halfedge: h.index(),
                version: self.versions[e.index()],
            });
            self.seq += 1;
        }
    }

    fn run(mut self) -> SimplifyReport {
        let vertices_before = self.mesh.num_vertices();
        let target = self.options.target_vertex_count;
        let to_remove = vertices_before.saturating_sub(target);

        let edges: Vec<EdgeId<I>> = self.mesh.edge_ids().collect();
        for e in edges {
            self.enqueue(e);
        }

        let mut collapses = 0;
        while self.mesh.num_vertices() > target {
            let Some(candidate) = self.heap.pop() else {
                break;
            };
            let h: HalfEdgeId<I> = HalfEdgeId::new(candidate.halfedge);
            let e = h.edge();
            if self.mesh.is_deleted_edge(e) || candidate.version != self.versions[e.index()] {
                continue;
            }
            // Re-check: a neighbour's collapse may have changed the geometry
            let Some(cones) = self.check(h) else {
                continue;
            };

            let v0 = self.mesh.source(h);
            let q0 = self.quadrics[v0.index()];
            let Ok(survivor) = self.mesh.collapse_edge(h) else {
                continue;
            };
            self.quadrics[survivor.index()] += q0;
            for (f, cone) in cones {
                self.cones[f.index()] = cone;
            }
            collapses += 1;
            if collapses % 256 == 0 {
                self.options.progress.report(collapses, to_remove, "collapsing edges");
            }

            // Costs and constraints change for every edge touching the new fan
            let mut touched: Vec<EdgeId<I>> = Vec::new();
            let ring: Vec<VertexId<I>> = self.mesh.vertex_neighbors(survivor).collect();
            for v in std::iter::once(survivor).chain(ring) {
                touched.extend(self.mesh.vertex_halfedges(v).map(|g| g.edge()));
            }
            touched.sort_unstable();
            touched.dedup();
            for e in touched {
                self.enqueue(e);
            }
        }

        let termination = if self.mesh.num_vertices() <= target {
            Termination::Completed
        } else {
            Termination::Stalled
        };
        self.mesh.compact();
        SimplifyReport {
            collapses,
            vertices_before,
            vertices_after: self.mesh.num_vertices(),
            termination,
        }
    }
}

/// Simplify a triangle mesh in place.
///
/// Fails with `PreconditionUnmet` for a mesh without faces or with
/// non-triangular faces. The mesh is compacted before returning.
pub fn simplify<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &SimplifyOptions) -> Result<SimplifyReport> {
    options.validate()?;
    if mesh.num_faces() == 0 {
        return Err(MeshError::precondition("simplification requires a mesh with faces"));
    }
    if !mesh.is_triangle_mesh() {
        return Err(MeshError::precondition("simplification requires a triangle mesh"));
    }

    let report = Simplifier::new(mesh, options).run();
    log::info!(
        "simplification: {} -> {} vertices in {} collapses ({})",
        report.vertices_before,
        report.vertices_after,
        report.collapses,
        report.termination
    );
    Ok(report)
}
