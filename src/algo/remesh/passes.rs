//! The four local passes of a remeshing iteration.
//!
//! All passes work on the live mesh through the kernel's edit primitives.
//! Splits only append elements and collapses only mark them, so handles stay
//! valid until the driver compacts at the end.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::reference::ReferenceSurface;
use crate::algo::features::line_is_straight;
use crate::mesh::{EdgeId, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Per-slot state carried through the passes.
pub(super) struct RemeshState {
    /// Target edge length per vertex slot.
    pub sizing: Vec<f64>,
    /// Feature flag per edge slot.
    pub features: Vec<bool>,
}

impl RemeshState {
    fn target(&self, a: usize, b: usize) -> f64 {
        0.5 * (self.sizing[a] + self.sizing[b])
    }

    fn feature_degree<I: MeshIndex>(&self, mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> usize {
        mesh.vertex_halfedges(v)
            .filter(|h| self.features[h.edge().index()])
            .count()
    }

    /// Vertices that never move during relaxation.
    pub(super) fn is_pinned<I: MeshIndex>(&self, mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> bool {
        mesh.is_boundary_vertex(v) || self.feature_degree(mesh, v) > 0
    }
}

/// Split every edge longer than 4/3 of its target at its midpoint, until
/// none is left or `max_passes` sweeps ran. Returns the number of splits.
pub(super) fn split_long_edges<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    state: &mut RemeshState,
    max_passes: usize,
) -> usize {
    let mut splits = 0;
    for _ in 0..max_passes {
        let candidates: Vec<EdgeId<I>> = mesh.edge_ids().collect();
        let mut changed = false;
        for e in candidates {
            let h = e.halfedge(0);
            let a = mesh.source(h);
            let b = mesh.target(h);
            let target = state.target(a.index(), b.index());
            if mesh.edge_length(e) <= 4.0 / 3.0 * target {
                continue;
            }
            let midpoint = mesh.edge_midpoint(e);
            let feature = state.features[e.index()];
            let Ok(v) = mesh.split_edge(e, midpoint) else {
                continue;
            };
            state.sizing.resize(mesh.vertex_slots(), 0.0);
            state.sizing[v.index()] = target;
            state.features.resize(mesh.edge_slots(), false);
            if feature {
                // Both halves of a split feature edge stay features
                for endpoint in [a, b] {
                    if let Some(half) = mesh.find_edge(v, endpoint) {
                        state.features[half.index()] = true;
                    }
                }
            }
            splits += 1;
            changed = true;
        }
        if !changed {
            break;
        }
    }
    splits
}

/// Whether collapsing `h` (removing its source) is allowed by the remeshing
/// rules on top of the kernel's topological check.
fn collapse_allowed<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    state: &RemeshState,
    h: HalfEdgeId<I>,
    high: f64,
) -> bool {
    let v0 = mesh.source(h);
    let v1 = mesh.target(h);
    let e = h.edge();

    if mesh.is_boundary_vertex(v0) {
        // Border vertices slide only along a straight stretch of border
        if !mesh.is_boundary_edge(e) || !line_is_straight(mesh, v0, |g| mesh.is_boundary_edge(g.edge())) {
            return false;
        }
    }

    let degree = state.feature_degree(mesh, v0);
    if degree > 0 {
        if !state.features[e.index()]
            || degree != 2
            || !line_is_straight(mesh, v0, |g| state.features[g.edge().index()])
        {
            return false;
        }
    }

    if !mesh.is_collapse_ok(h) {
        return false;
    }

    // No edge of the merged fan may become long
    let p1 = mesh.position(v1);
    mesh.vertex_neighbors(v0)
        .all(|w| w == v1 || (mesh.position(w) - p1).norm() <= high * state.target(v1.index(), w.index()))
}

/// Collapse every edge shorter than 4/5 of its target when the merged fan
/// stays below 4/3 of the target. Returns the number of collapses.
pub(super) fn collapse_short_edges<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, state: &RemeshState) -> usize {
    let mut collapses = 0;
    let candidates: Vec<EdgeId<I>> = mesh.edge_ids().collect();
    for e in candidates {
        if mesh.is_deleted_edge(e) {
            continue;
        }
        let h01 = e.halfedge(0);
        let h10 = e.halfedge(1);
        let v0 = mesh.source(h01);
        let v1 = mesh.target(h01);
        if mesh.edge_length(e) >= 0.8 * state.target(v0.index(), v1.index()) {
            continue;
        }

        let ok01 = collapse_allowed(mesh, state, h01, 4.0 / 3.0);
        let ok10 = collapse_allowed(mesh, state, h10, 4.0 / 3.0);
        let h = match (ok01, ok10) {
            // Remove the lower-valence endpoint
            (true, true) if mesh.valence(v1) < mesh.valence(v0) => h10,
            (true, _) => h01,
            (false, true) => h10,
            (false, false) => continue,
        };
        if mesh.collapse_edge(h).is_ok() {
            collapses += 1;
        }
    }
    collapses
}

fn valence_target<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> i64 {
    if mesh.is_boundary_vertex(v) {
        4
    } else {
        6
    }
}

fn triangle_normal(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Vector3<f64> {
    (b - a).cross(&(c - a))
}

/// Flip interior non-feature edges whenever that lowers the squared valence
/// deviation of the four involved vertices and the two new triangles keep
/// the orientation of the old pair. Returns the number of flips.
pub(super) fn flip_for_valence<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    state: &RemeshState,
    max_passes: usize,
) -> usize {
    let mut flips = 0;
    for _ in 0..max_passes {
        let candidates: Vec<EdgeId<I>> = mesh.edge_ids().collect();
        let mut changed = false;
        for e in candidates {
            if state.features[e.index()] || !mesh.is_flip_ok(e) {
                continue;
            }
            let h0 = e.halfedge(0);
            let h1 = e.halfedge(1);
            let v0 = mesh.target(h0);
            let v1 = mesh.target(h1);
            let v2 = mesh.target(mesh.next(h0));
            let v3 = mesh.target(mesh.next(h1));

            let deviation = |v: VertexId<I>, delta: i64| {
                let d = mesh.valence(v) as i64 + delta - valence_target(mesh, v);
                d * d
            };
            let before = deviation(v0, 0) + deviation(v1, 0) + deviation(v2, 0) + deviation(v3, 0);
            let after = deviation(v0, -1) + deviation(v1, -1) + deviation(v2, 1) + deviation(v3, 1);
            if after >= before {
                continue;
            }

            let [p0, p1, p2, p3] = [v0, v1, v2, v3].map(|v| *mesh.position(v));
            // h0 runs v1 -> v0 with v2 opposite; h1 runs v0 -> v1 with v3 opposite
            let reference = triangle_normal(&p1, &p0, &p2) + triangle_normal(&p0, &p1, &p3);
            let new_a = triangle_normal(&p2, &p1, &p3);
            let new_b = triangle_normal(&p3, &p0, &p2);
            if new_a.dot(&reference) <= 0.0 || new_b.dot(&reference) <= 0.0 {
                continue;
            }

            if mesh.flip_edge(e).is_ok() {
                flips += 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    flips
}

/// Move every free vertex towards the centroid of its neighbours within the
/// tangent plane, then project onto the reference surface, when given, and
/// refresh its target length there.
pub(super) fn tangential_relaxation<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    state: &mut RemeshState,
    reference: Option<&ReferenceSurface>,
    lambda: f64,
    parallel: bool,
) {
    let free: Vec<VertexId<I>> = mesh
        .vertex_ids()
        .filter(|&v| !mesh.is_isolated(v) && !state.is_pinned(mesh, v))
        .collect();

    let relax = |&v: &VertexId<I>| -> (Point3<f64>, Option<f64>) {
        let p = *mesh.position(v);
        let mut centroid = Vector3::zeros();
        let mut count = 0.0;
        for w in mesh.vertex_neighbors(v) {
            centroid += mesh.position(w).coords;
            count += 1.0;
        }
        if count == 0.0 {
            return (p, None);
        }
        let n = mesh.vertex_normal(v);
        let mut u = centroid / count - p.coords;
        u -= u.dot(&n) * n;
        let moved = p + lambda * u;
        match reference.and_then(|r| r.project(&moved)) {
            Some((q, size)) => (q, Some(size)),
            None => (moved, None),
        }
    };

    let updates: Vec<(Point3<f64>, Option<f64>)> = if parallel {
        free.par_iter().map(relax).collect()
    } else {
        free.iter().map(relax).collect()
    };

    for (v, (p, size)) in free.into_iter().zip(updates) {
        mesh.set_position(v, p);
        if let Some(size) = size {
            state.sizing[v.index()] = size;
        }
    }
}
