//! Wavefront propagation for geodesic distances.
//!
//! A Dijkstra-style front: vertices are frozen in order of increasing
//! distance. When a vertex freezes, each unfrozen neighbour is updated from
//! the edge between them and, where both other corners of an incident
//! triangle are frozen, from the planar unfolding of that triangle. The
//! unfolded update places a virtual source at the known distances from the
//! two frozen corners and measures the straight line to the third corner,
//! which removes most of the zig-zag bias of pure edge-graph distances.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::Point3;

use crate::algo::Termination;
use crate::mesh::{HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

use super::GeodesicOptions;

/// Entry in the propagation queue.
#[derive(Debug, Clone, Copy)]
struct FrontEntry {
    distance: f64,
    /// Push order, so equal distances pop first-in first-out.
    seq: u64,
    vertex: usize,
}

impl PartialEq for FrontEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontEntry {}

impl PartialOrd for FrontEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Distance at `c` from a wave that has distance `da` at `a` and `db` at `b`.
///
/// Returns `None` when no virtual source exists or the straight ray from it
/// to `c` does not cross the segment `ab`.
pub(super) fn unfolded_distance(
    a: &Point3<f64>,
    da: f64,
    b: &Point3<f64>,
    db: f64,
    c: &Point3<f64>,
) -> Option<f64> {
    let ab = b - a;
    let len = ab.norm();
    if len < 1e-12 {
        return None;
    }
    let ux = ab / len;
    let ac = c - a;
    let cx = ac.dot(&ux);
    let cy = (ac.norm_squared() - cx * cx).max(0.0).sqrt();
    if cy < 1e-12 {
        return None;
    }

    // Virtual source on the far side of ab
    let sx = (da * da - db * db + len * len) / (2.0 * len);
    let sy2 = da * da - sx * sx;
    if sy2 < 0.0 {
        return None;
    }
    let sy = -sy2.sqrt();

    let t = -sy / (cy - sy);
    let crossing = sx + t * (cx - sx);
    let slack = 1e-9 * len;
    if crossing < -slack || crossing > len + slack {
        return None;
    }

    Some(((cx - sx).powi(2) + (cy - sy).powi(2)).sqrt())
}

/// Third corner of the triangle on the left of `h`, if it is a triangle.
fn opposite_corner<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, h: HalfEdgeId<I>) -> Option<VertexId<I>> {
    let f = mesh.face_of(h);
    if !f.is_valid() || mesh.face_degree(f) != 3 {
        return None;
    }
    Some(mesh.target(mesh.next(h)))
}

/// Outcome of a propagation, indexed by vertex slot.
pub(super) struct Front {
    pub distances: Vec<f64>,
    pub seeds: Vec<usize>,
    pub termination: Termination,
}

/// Propagate distances from `seeds` (already validated as live vertices).
pub(super) fn propagate<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    seeds: &[VertexId<I>],
    options: &GeodesicOptions,
) -> Front {
    let n = mesh.vertex_slots();
    let mut distances = vec![f64::INFINITY; n];
    let mut seed_of = vec![usize::MAX; n];
    let mut frozen = vec![false; n];
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    for (k, &s) in seeds.iter().enumerate() {
        let i = s.index();
        if seed_of[i] == usize::MAX {
            distances[i] = 0.0;
            seed_of[i] = k;
            heap.push(FrontEntry {
                distance: 0.0,
                seq,
                vertex: i,
            });
            seq += 1;
        }
    }

    let max_distance = options.max_distance.unwrap_or(f64::INFINITY);
    let max_vertices = options.max_vertices.unwrap_or(usize::MAX);
    let mut termination = Termination::Completed;
    let mut frozen_count = 0usize;

    while let Some(entry) = heap.pop() {
        let u = entry.vertex;
        if frozen[u] || entry.distance > distances[u] {
            continue;
        }
        if entry.distance > max_distance {
            termination = Termination::ResourceExhausted;
            break;
        }
        if frozen_count >= max_vertices {
            termination = Termination::ResourceExhausted;
            break;
        }
        frozen[u] = true;
        frozen_count += 1;

        let uv: VertexId<I> = VertexId::new(u);
        let pu = *mesh.position(uv);
        for h in mesh.vertex_halfedges(uv) {
            let w = mesh.target(h);
            let wi = w.index();
            if frozen[wi] {
                continue;
            }
            let pw = mesh.position(w);

            let mut candidate = distances[u] + (pw - pu).norm();
            let mut label = seed_of[u];

            if options.unfold {
                for side in [h, h.opposite()] {
                    let Some(x) = opposite_corner(mesh, side) else {
                        continue;
                    };
                    let xi = x.index();
                    if !frozen[xi] {
                        continue;
                    }
                    let px = mesh.position(x);
                    if let Some(d) = unfolded_distance(&pu, distances[u], px, distances[xi], pw) {
                        if d < candidate {
                            candidate = d;
                            label = nearer_seed(distances[u], seed_of[u], distances[xi], seed_of[xi]);
                        }
                    }
                }
            }

            if candidate < distances[wi] || (candidate == distances[wi] && label < seed_of[wi]) {
                distances[wi] = candidate;
                seed_of[wi] = label;
                heap.push(FrontEntry {
                    distance: candidate,
                    seq,
                    vertex: wi,
                });
                seq += 1;
            }
        }
    }

    // Tentative values beyond the frozen front are not final
    if termination == Termination::ResourceExhausted {
        for i in 0..n {
            if !frozen[i] {
                distances[i] = f64::INFINITY;
                seed_of[i] = usize::MAX;
            }
        }
    }

    Front {
        distances,
        seeds: seed_of,
        termination,
    }
}

/// Seed label inherited from the closer of two frozen corners.
fn nearer_seed(da: f64, sa: usize, db: f64, sb: usize) -> usize {
    match da.total_cmp(&db) {
        Ordering::Less => sa,
        Ordering::Greater => sb,
        Ordering::Equal => sa.min(sb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unfolded_distance_recovers_planar_source() {
        // Source at the origin, wave known exactly at a and b
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(1.0, 1.0, 0.0);
        let c = Point3::new(2.0, 1.0, 0.0);
        let d = unfolded_distance(&a, 1.0, &b, 2.0_f64.sqrt(), &c).unwrap();
        assert_relative_eq!(d, 5.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_unfolded_distance_rejects_outside_ray() {
        // The ray from the source to c misses the segment ab
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(1.0, 1.0, 0.0);
        let c = Point3::new(1.5, 5.0, 0.0);
        assert!(unfolded_distance(&a, 1.0, &b, 2.0_f64.sqrt(), &c).is_none());
    }

    #[test]
    fn test_front_entry_is_min_heap_with_fifo_ties() {
        let mut heap = BinaryHeap::new();
        heap.push(FrontEntry { distance: 2.0, seq: 0, vertex: 0 });
        heap.push(FrontEntry { distance: 1.0, seq: 1, vertex: 1 });
        heap.push(FrontEntry { distance: 1.0, seq: 2, vertex: 2 });
        assert_eq!(heap.pop().map(|e| e.vertex), Some(1));
        assert_eq!(heap.pop().map(|e| e.vertex), Some(2));
        assert_eq!(heap.pop().map(|e| e.vertex), Some(0));
    }

    #[test]
    fn test_nearer_seed() {
        assert_eq!(nearer_seed(1.0, 3, 2.0, 0), 3);
        assert_eq!(nearer_seed(2.0, 3, 1.0, 0), 0);
        assert_eq!(nearer_seed(1.0, 3, 1.0, 1), 1);
    }
}
