//! Hole filling.
//!
//! A hole is a loop of border halfedges. Each accepted hole is closed by the
//! triangulation of its border polygon that minimizes, lexicographically,
//! the largest dihedral angle against its neighbours and then the total
//! area (Liepa, 2003). The patch can then be refined to the density of the
//! surrounding mesh and faired so it blends with it.
//!
//! Holes longer than [`HoleFillOptions::max_size`] halfedges or touching a
//! non-manifold vertex are skipped and counted, never filled.
//!
//! # Example
//!
//! ```no_run
//! use tessera::prelude::*;
//! use tessera::algo::hole_fill::{fill_holes, HoleFillOptions};
//!
//! let mut mesh: HalfEdgeMesh = tessera::io::load("scan.ply").unwrap();
//! let report = fill_holes(&mut mesh, &HoleFillOptions::new(500)).unwrap();
//! println!("{} of {} holes filled", report.filled, report.found);
//! ```
//!
//! # References
//!
//! - Liepa, P. (2003). "Filling Holes in Meshes." Symposium on Geometry
//!   Processing.

use std::collections::{HashSet, VecDeque};

use nalgebra::{Point3, Vector3};

use super::fair::{self, FairOptions, SELECTION_PROPERTY};
use crate::error::{MeshError, Result};
use crate::mesh::{EdgeId, ElementKind, FaceId, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Options for hole filling.
#[derive(Debug, Clone)]
pub struct HoleFillOptions {
    /// Holes with more border halfedges than this are skipped.
    pub max_size: usize,

    /// Split and flip the patch towards the mean border edge length, then
    /// fair the inserted vertices.
    pub refine: bool,
}

impl Default for HoleFillOptions {
    fn default() -> Self {
        Self::new(500)
    }
}

impl HoleFillOptions {
    /// Fill holes up to `max_size` border halfedges, with refinement.
    pub fn new(max_size: usize) -> Self {
        Self { max_size, refine: true }
    }

    /// Set whether the patch is refined and faired.
    pub fn with_refine(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }
}

/// A border loop found by [`find_holes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hole<I: MeshIndex = u32> {
    /// One border halfedge of the loop.
    pub halfedge: HalfEdgeId<I>,
    /// Number of halfedges in the loop.
    pub size: usize,
    /// Whether every vertex of the loop is manifold.
    pub manifold: bool,
}

/// Outcome of filling a single hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilledHole {
    /// Triangles added by the initial triangulation.
    pub triangles: usize,
    /// Vertices inserted by refinement.
    pub vertices: usize,
}

/// Outcome of [`fill_holes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HoleFillReport {
    /// Border loops found.
    pub found: usize,
    /// Holes closed.
    pub filled: usize,
    /// Holes skipped for exceeding `max_size`.
    pub skipped_too_large: usize,
    /// Holes skipped for touching a non-manifold vertex.
    pub skipped_non_manifold: usize,
    /// Holes whose filling failed and was rolled back.
    pub failed: usize,
}

/// Every border loop of the mesh, in order of its first halfedge.
pub fn find_holes<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Vec<Hole<I>> {
    let mut visited = vec![false; 2 * mesh.edge_slots()];
    let mut holes = Vec::new();
    for h in mesh.halfedge_ids() {
        if visited[h.index()] || !mesh.is_boundary_halfedge(h) {
            continue;
        }
        let mut size = 0;
        let mut manifold = true;
        for hh in mesh.loop_halfedges(h) {
            visited[hh.index()] = true;
            size += 1;
            manifold &= mesh.is_manifold(mesh.target(hh));
        }
        holes.push(Hole { halfedge: h, size, manifold });
    }
    holes
}

/// Close every acceptable hole.
///
/// Per-hole failures are counted in the report rather than aborting the
/// batch. A closed mesh has no holes and is left untouched.
pub fn fill_holes<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &HoleFillOptions) -> Result<HoleFillReport> {
    let holes = find_holes(mesh);
    let mut report = HoleFillReport {
        found: holes.len(),
        ..Default::default()
    };

    for hole in holes {
        if hole.size > options.max_size {
            report.skipped_too_large += 1;
            continue;
        }
        if !hole.manifold {
            report.skipped_non_manifold += 1;
            continue;
        }
        // Filling an earlier hole can consume this one
        if !mesh.is_boundary_halfedge(hole.halfedge) {
            continue;
        }
        match fill_hole(mesh, hole.halfedge, options) {
            Ok(_) => report.filled += 1,
            Err(err) => {
                log::warn!("skipping hole at {:?}: {}", hole.halfedge, err);
                report.failed += 1;
            }
        }
    }

    log::info!(
        "hole filling: {} of {} holes filled ({} too large, {} non-manifold, {} failed)",
        report.filled,
        report.found,
        report.skipped_too_large,
        report.skipped_non_manifold,
        report.failed
    );
    Ok(report)
}

/// Lexicographic triangulation cost: worst dihedral angle, then area.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Weight {
    angle: f64,
    area: f64,
}

impl Weight {
    const ZERO: Weight = Weight { angle: 0.0, area: 0.0 };
    const INFINITE: Weight = Weight {
        angle: f64::INFINITY,
        area: f64::INFINITY,
    };

    fn combine(self, other: Weight) -> Weight {
        Weight {
            angle: self.angle.max(other.angle),
            area: self.area + other.area,
        }
    }

    fn less_than(&self, other: &Weight) -> bool {
        self.angle < other.angle || (self.angle == other.angle && self.area < other.area)
    }
}

struct HoleTriangulation<'a, I: MeshIndex> {
    mesh: &'a HalfEdgeMesh<I>,
    vertices: Vec<VertexId<I>>,
    /// Third vertex of the existing face across border edge `(i, i + 1)`.
    outside: Vec<VertexId<I>>,
    weights: Vec<Vec<Weight>>,
    split: Vec<Vec<usize>>,
}

fn normal(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Vector3<f64> {
    (b - a).cross(&(c - a)).try_normalize(1e-300).unwrap_or_else(Vector3::zeros)
}

impl<'a, I: MeshIndex> HoleTriangulation<'a, I> {
    fn new(mesh: &'a HalfEdgeMesh<I>, h: HalfEdgeId<I>) -> Self {
        let halfedges: Vec<HalfEdgeId<I>> = mesh.loop_halfedges(h).collect();
        let vertices = halfedges.iter().map(|&hh| mesh.source(hh)).collect();
        let outside = halfedges
            .iter()
            .map(|&hh| mesh.target(mesh.next(hh.opposite())))
            .collect();
        let n = halfedges.len();
        Self {
            mesh,
            vertices,
            outside,
            weights: vec![vec![Weight::INFINITE; n]; n],
            split: vec![vec![usize::MAX; n]; n],
        }
    }

    fn position(&self, i: usize) -> &Point3<f64> {
        self.mesh.position(self.vertices[i])
    }

    /// Vertex across edge `(i, j)`, `i < j`, on the far side from the
    /// triangle being built.
    fn across(&self, i: usize, j: usize) -> Point3<f64> {
        let n = self.vertices.len();
        if j == i + 1 {
            *self.mesh.position(self.outside[i])
        } else if i == 0 && j == n - 1 {
            *self.mesh.position(self.outside[n - 1])
        } else {
            *self.position(self.split[i][j])
        }
    }

    fn triangle_weight(&self, i: usize, m: usize, k: usize) -> Weight {
        let (a, b, c) = (self.vertices[i], self.vertices[m], self.vertices[k]);
        // A diagonal that already is an interior edge would become complex
        for (u, w) in [(a, b), (b, c), (c, a)] {
            if let Some(e) = self.mesh.find_edge(u, w) {
                if !self.mesh.is_boundary_edge(e) {
                    return Weight::INFINITE;
                }
            }
        }

        let (pa, pb, pc) = (self.position(i), self.position(m), self.position(k));
        let n = normal(pa, pb, pc);
        let last = self.vertices.len() - 1;
        let mut angle: f64 = 0.0;
        for (x, y, px, py) in [(i, m, pa, pb), (m, k, pb, pc), (i, k, pa, pc)] {
            // The far side of diagonal (i, k) is not built yet; its parent counts it
            if (x, y) == (i, k) && !(i == 0 && k == last) {
                continue;
            }
            let other = self.across(x, y);
            // Neighbour triangles run the shared edge backwards
            let on = if (x, y) == (i, k) {
                normal(px, py, &other)
            } else {
                normal(py, px, &other)
            };
            angle = angle.max(n.dot(&on).clamp(-1.0, 1.0).acos());
        }
        let area = 0.5 * (pb - pa).cross(&(pc - pa)).norm();
        Weight { angle, area }
    }

    fn solve(&mut self) -> Result<Vec<[VertexId<I>; 3]>> {
        let n = self.vertices.len();
        for i in 0..n - 1 {
            self.weights[i][i + 1] = Weight::ZERO;
        }
        for len in 2..n {
            for i in 0..n - len {
                let k = i + len;
                let mut best = Weight::INFINITE;
                let mut best_m = usize::MAX;
                for m in i + 1..k {
                    let w = self.weights[i][m]
                        .combine(self.weights[m][k])
                        .combine(self.triangle_weight(i, m, k));
                    if best_m == usize::MAX || w.less_than(&best) {
                        best = w;
                        best_m = m;
                    }
                }
                self.weights[i][k] = best;
                self.split[i][k] = best_m;
            }
        }
        if !self.weights[0][n - 1].angle.is_finite() {
            return Err(MeshError::topology(
                "fill_hole",
                "every triangulation of the hole would duplicate an existing edge",
            ));
        }

        let mut triangles = Vec::with_capacity(n - 2);
        let mut stack = vec![(0, n - 1)];
        while let Some((i, k)) = stack.pop() {
            if k <= i + 1 {
                continue;
            }
            let m = self.split[i][k];
            triangles.push([self.vertices[i], self.vertices[m], self.vertices[k]]);
            stack.push((i, m));
            stack.push((m, k));
        }
        Ok(triangles)
    }
}

/// Close the hole bounded by border halfedge `h`.
///
/// Fails with `PreconditionUnmet` if `h` is not a border halfedge or the loop
/// touches a non-manifold vertex, and with `TopologyViolation` if no
/// triangulation fits. The mesh is unchanged on failure. Once the patch is
/// in, the call succeeds; problems during refinement are only logged.
pub fn fill_hole<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    h: HalfEdgeId<I>,
    options: &HoleFillOptions,
) -> Result<FilledHole> {
    if h.index() >= 2 * mesh.edge_slots() || mesh.is_deleted_edge(h.edge()) || !mesh.is_boundary_halfedge(h) {
        return Err(MeshError::precondition(format!("{:?} is not a border halfedge", h)));
    }
    if mesh.loop_halfedges(h).any(|hh| !mesh.is_manifold(mesh.target(hh))) {
        return Err(MeshError::precondition("hole touches a non-manifold vertex"));
    }
    let border: Vec<(VertexId<I>, VertexId<I>)> = mesh
        .loop_halfedges(h)
        .map(|hh| (mesh.source(hh), mesh.target(hh)))
        .collect();
    if border.len() < 3 {
        return Err(MeshError::degenerate("hole with fewer than 3 edges"));
    }

    let triangles = HoleTriangulation::new(mesh, h).solve()?;

    let mut added: Vec<FaceId<I>> = Vec::with_capacity(triangles.len());
    for [a, b, c] in &triangles {
        match mesh.add_triangle(*a, *b, *c) {
            Ok(f) => added.push(f),
            Err(err) => {
                for f in added.into_iter().rev() {
                    mesh.delete_face(f)?;
                }
                return Err(err);
            }
        }
    }

    let mut filled = FilledHole {
        triangles: added.len(),
        vertices: 0,
    };
    if options.refine {
        filled.vertices = refine_patch(mesh, &border);
    }
    log::debug!(
        "filled hole of {} edges with {} triangles and {} new vertices",
        border.len(),
        filled.triangles,
        filled.vertices
    );
    Ok(filled)
}

/// Faces of the patch: everything reachable from the inner side of the
/// former border without crossing it.
fn patch_faces<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, border: &[(VertexId<I>, VertexId<I>)]) -> Vec<FaceId<I>> {
    let border_edges: HashSet<EdgeId<I>> = border
        .iter()
        .filter_map(|&(a, b)| mesh.find_edge(a, b))
        .collect();
    let mut seen: HashSet<FaceId<I>> = HashSet::new();
    let mut queue: VecDeque<FaceId<I>> = border
        .iter()
        .filter_map(|&(a, b)| mesh.find_halfedge(a, b))
        .map(|hh| mesh.face_of(hh))
        .filter(|f| f.is_valid())
        .collect();
    let mut faces = Vec::new();
    while let Some(f) = queue.pop_front() {
        if !seen.insert(f) {
            continue;
        }
        faces.push(f);
        for hh in mesh.face_halfedges(f) {
            if border_edges.contains(&hh.edge()) {
                continue;
            }
            let g = mesh.face_of(hh.opposite());
            if g.is_valid() && !seen.contains(&g) {
                queue.push_back(g);
            }
        }
    }
    faces
}

fn patch_edges<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, faces: &[FaceId<I>], border: &HashSet<EdgeId<I>>) -> Vec<EdgeId<I>> {
    let mut edges: Vec<EdgeId<I>> = faces
        .iter()
        .flat_map(|&f| mesh.face_halfedges(f).map(|h| h.edge()))
        .filter(|e| !border.contains(e))
        .collect();
    edges.sort_unstable();
    edges.dedup();
    edges
}

/// Whether flipping `e` makes its two triangles locally Delaunay.
fn should_flip<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, e: EdgeId<I>) -> bool {
    let h = e.halfedge(0);
    let a = mesh.position(mesh.source(h));
    let b = mesh.position(mesh.target(h));
    let c = mesh.position(mesh.target(mesh.next(h)));
    let d = mesh.position(mesh.target(mesh.next(h.opposite())));
    let angle = |apex: &Point3<f64>| {
        let u = a - apex;
        let v = b - apex;
        u.angle(&v)
    };
    angle(c) + angle(d) > std::f64::consts::PI + 1e-10
}

/// Split long patch edges, flip towards Delaunay, and fair the new vertices.
/// Returns the number of inserted vertices.
///
/// The hole is already closed at this point, so a failed split, flip or
/// fairing solve is logged and whatever was reached is kept.
fn refine_patch<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, border: &[(VertexId<I>, VertexId<I>)]) -> usize {
    let first_new = mesh.vertex_slots();
    if let Err(err) = split_and_flip(mesh, border) {
        log::warn!("patch refinement stopped early, keeping the patch: {}", err);
    }

    let inserted = mesh.vertex_slots() - first_new;
    if inserted > 0 {
        if let Err(err) = fair_inserted(mesh, first_new) {
            log::warn!("patch fairing failed, keeping the refined patch: {}", err);
        }
    }
    inserted
}

fn split_and_flip<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, border: &[(VertexId<I>, VertexId<I>)]) -> Result<()> {
    let target = border
        .iter()
        .map(|&(a, b)| (mesh.position(a) - mesh.position(b)).norm())
        .sum::<f64>()
        / border.len() as f64;
    let border_edges: HashSet<EdgeId<I>> = border
        .iter()
        .filter_map(|&(a, b)| mesh.find_edge(a, b))
        .collect();

    for _ in 0..10 {
        let faces = patch_faces(mesh, border);
        let long: Vec<EdgeId<I>> = patch_edges(mesh, &faces, &border_edges)
            .into_iter()
            .filter(|&e| mesh.edge_length(e) > 4.0 / 3.0 * target)
            .collect();
        if long.is_empty() {
            break;
        }
        for e in long {
            let midpoint = mesh.edge_midpoint(e);
            mesh.split_edge(e, midpoint)?;
        }

        for _ in 0..10 {
            let faces = patch_faces(mesh, border);
            let mut flipped = 0;
            for e in patch_edges(mesh, &faces, &border_edges) {
                if mesh.is_flip_ok(e) && should_flip(mesh, e) {
                    mesh.flip_edge(e)?;
                    flipped += 1;
                }
            }
            if flipped == 0 {
                break;
            }
        }
    }
    Ok(())
}

/// Fair the vertices from slot `first_new` on, preserving any caller selection.
fn fair_inserted<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, first_new: usize) -> Result<()> {
    let previous = mesh.vertex_property::<bool>(SELECTION_PROPERTY).ok().map(<[bool]>::to_vec);
    let selection: Vec<bool> = (0..mesh.vertex_slots()).map(|i| i >= first_new).collect();
    mesh.properties_mut()
        .set(ElementKind::Vertex, SELECTION_PROPERTY, selection, false)?;
    let faired = fair::fair(mesh, &FairOptions::minimize_curvature());
    match previous {
        Some(values) => mesh
            .properties_mut()
            .set(ElementKind::Vertex, SELECTION_PROPERTY, values, false)?,
        None => {
            mesh.properties_mut().remove(ElementKind::Vertex, SELECTION_PROPERTY);
        }
    }
    faired.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::components::topology_info;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;

    /// Icosahedron sphere with the faces around the north-most vertex removed.
    fn sphere_with_hole(levels: usize) -> HalfEdgeMesh {
        let mut mesh = fixtures::sphere(levels);
        let top = mesh
            .vertex_ids()
            .max_by(|&a, &b| mesh.position(a).z.total_cmp(&mesh.position(b).z))
            .unwrap();
        mesh.delete_vertex(top).unwrap();
        mesh.compact();
        mesh
    }

    #[test]
    fn test_closed_mesh_has_no_holes() {
        let mut mesh = fixtures::icosahedron();
        let before = mesh.positions();
        let report = fill_holes(&mut mesh, &HoleFillOptions::default()).unwrap();
        assert_eq!(report, HoleFillReport::default());
        assert_eq!(mesh.positions(), before);
        assert_eq!(mesh.num_faces(), 20);
    }

    #[test]
    fn test_find_holes() {
        let mesh = sphere_with_hole(1);
        let holes = find_holes(&mesh);
        assert_eq!(holes.len(), 1);
        assert!(holes[0].size >= 5);
        assert!(holes[0].manifold);
        assert_eq!(find_holes(&fixtures::cylinder(2, 8)).len(), 2);
    }

    #[test]
    fn test_fill_planar_polygon() {
        // A disc with its interior removed leaves an octagonal ring
        let mut mesh = fixtures::disc(2, 8);
        mesh.delete_vertex(VertexId::new(0)).unwrap();
        mesh.compact();
        // The inner ring holds the lowest indices after compaction
        let h = find_holes(&mesh)
            .into_iter()
            .find(|hole| mesh.source(hole.halfedge).index() < 8)
            .map(|hole| hole.halfedge)
            .unwrap();

        let filled = fill_hole(&mut mesh, h, &HoleFillOptions::new(100).with_refine(false)).unwrap();
        assert_eq!(filled.triangles, 6);
        assert!(mesh.is_valid());
        assert_eq!(find_holes(&mesh).len(), 1);
        assert_eq!(topology_info(&mesh).euler_characteristic, 1);
        for f in mesh.face_ids() {
            assert_relative_eq!(mesh.face_normal(f).z, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fill_restores_closed_sphere() {
        let mut mesh = sphere_with_hole(2);
        let report = fill_holes(&mut mesh, &HoleFillOptions::new(100)).unwrap();
        assert_eq!(report.filled, 1);
        assert!(mesh.is_closed());
        assert!(mesh.is_valid());
        assert_eq!(topology_info(&mesh).euler_characteristic, 2);
        assert!(!mesh.properties().contains(ElementKind::Vertex, SELECTION_PROPERTY));
    }

    #[test]
    fn test_refinement_adds_vertices_to_large_holes() {
        let mut mesh = fixtures::cylinder(2, 16);
        let v = mesh.num_vertices();
        let report = fill_holes(&mut mesh, &HoleFillOptions::new(100)).unwrap();
        assert_eq!(report.filled, 2);
        assert!(mesh.is_closed());
        assert!(mesh.num_vertices() > v);
        assert_eq!(topology_info(&mesh).euler_characteristic, 2);
    }

    #[test]
    fn test_refined_fill_reports_inserted_vertices() {
        let mut mesh = fixtures::cylinder(2, 16);
        let selection = vec![true; mesh.vertex_slots()];
        mesh.properties_mut()
            .set(ElementKind::Vertex, SELECTION_PROPERTY, selection, false)
            .unwrap();
        let h = find_holes(&mesh)[0].halfedge;
        let before = mesh.num_vertices();

        let filled = fill_hole(&mut mesh, h, &HoleFillOptions::new(100)).unwrap();
        assert!(filled.vertices > 0);
        assert_eq!(mesh.num_vertices(), before + filled.vertices);
        assert_eq!(find_holes(&mesh).len(), 1);
        assert!(mesh.is_valid());
        // The caller's selection comes back untouched
        let restored = mesh.vertex_property::<bool>(SELECTION_PROPERTY).unwrap();
        assert!(restored[..before].iter().all(|&s| s));
    }

    #[test]
    fn test_size_limit_and_invalid_halfedge() {
        let mut mesh = fixtures::cylinder(2, 16);
        let report = fill_holes(&mut mesh, &HoleFillOptions::new(10)).unwrap();
        assert_eq!(report.found, 2);
        assert_eq!(report.skipped_too_large, 2);
        assert_eq!(report.filled, 0);

        let interior = mesh
            .halfedge_ids()
            .find(|&h| !mesh.is_boundary_halfedge(h))
            .unwrap();
        let err = fill_hole(&mut mesh, interior, &HoleFillOptions::default()).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_weight_order() {
        let flat = Weight { angle: 0.1, area: 5.0 };
        let steep = Weight { angle: 0.5, area: 1.0 };
        assert!(flat.less_than(&steep));
        assert!(Weight::ZERO.combine(steep).less_than(&Weight::INFINITE));
        assert_eq!(flat.combine(steep), Weight { angle: 0.5, area: 6.0 });
    }
}
