//! Border stitching.
//!
//! Meshes assembled from separate pieces (CAD patches, polygon soups) carry
//! duplicated vertices along seams, so the pieces meet along pairs of border
//! halfedges instead of interior edges. Stitching welds every pair of
//! opposite border halfedges whose endpoints coincide within a tolerance.
//!
//! Pieces with inconsistent orientation meet along border halfedges running
//! the *same* way and cannot be welded until one of them is reversed;
//! [`StitchBackend::merge_reversible_connected_components`] does that first.
//!
//! Both operations rebuild connectivity, so per-element properties are not
//! carried over. A rebuild that would produce a non-manifold mesh fails
//! with the mesh unchanged.
//!
//! The operations sit behind [`StitchBackend`] so an exact-arithmetic
//! implementation can replace [`NativeStitcher`].

use std::collections::{HashMap, VecDeque};

use nalgebra::Point3;

use super::components::face_labels;
use crate::error::{MeshError, Result};
use crate::mesh::{build_from_polygons, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Options for stitching.
#[derive(Debug, Clone)]
pub struct StitchOptions {
    /// Largest distance between two endpoints that are welded.
    pub tolerance: f64,

    /// Reverse inconsistently oriented pieces before welding.
    pub merge_components: bool,
}

impl Default for StitchOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            merge_components: true,
        }
    }
}

impl StitchOptions {
    /// Set the welding tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set whether inconsistently oriented pieces are reversed first.
    pub fn with_merge_components(mut self, merge: bool) -> Self {
        self.merge_components = merge;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.tolerance >= 0.0) || !self.tolerance.is_finite() {
            return Err(MeshError::invalid_param(
                "tolerance",
                self.tolerance,
                "must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Outcome of [`stitch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StitchReport {
    /// Connected components before stitching.
    pub components_before: usize,
    /// Pieces reversed to match their neighbours.
    pub reversed_components: usize,
    /// Border halfedge pairs welded into interior edges.
    pub stitched_edges: usize,
    /// Vertices removed by welding.
    pub merged_vertices: usize,
    /// Connected components after stitching.
    pub components_after: usize,
}

/// Implementation of the stitching operations.
pub trait StitchBackend {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Weld coincident opposite border halfedges. Returns the number of
    /// welded pairs.
    fn stitch_borders<I: MeshIndex>(&self, mesh: &mut HalfEdgeMesh<I>, options: &StitchOptions) -> Result<usize>;

    /// Reverse pieces whose borders coincide with a neighbour's running the
    /// same way. Returns the number of reversed pieces.
    fn merge_reversible_connected_components<I: MeshIndex>(
        &self,
        mesh: &mut HalfEdgeMesh<I>,
        options: &StitchOptions,
    ) -> Result<usize>;
}

/// Stitching with floating-point tolerance matching on a spatial hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeStitcher;

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets of `a` and `b`; the smaller root survives.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[drop] = keep;
        }
    }
}

type Cell = (i64, i64, i64);

/// Border halfedges bucketed by the position of their source vertex.
struct BorderIndex<I: MeshIndex> {
    cell_size: f64,
    cells: HashMap<Cell, Vec<HalfEdgeId<I>>>,
}

impl<I: MeshIndex> BorderIndex<I> {
    fn new(mesh: &HalfEdgeMesh<I>, tolerance: f64) -> Self {
        // Cells no finer than the coordinate resolution keep cell keys far
        // from the i64 range
        let extent = mesh
            .halfedge_ids()
            .filter(|&h| mesh.is_boundary_halfedge(h))
            .map(|h| mesh.position(mesh.source(h)).coords.amax())
            .filter(|m| m.is_finite())
            .fold(0.0, f64::max);
        let cell_size = tolerance.max(4.0 * f64::EPSILON * extent).max(1e-12);
        let mut index = Self {
            cell_size,
            cells: HashMap::new(),
        };
        for h in mesh.halfedge_ids().filter(|&h| mesh.is_boundary_halfedge(h)) {
            let cell = index.cell_of(mesh.position(mesh.source(h)));
            index.cells.entry(cell).or_default().push(h);
        }
        index
    }

    fn cell_of(&self, p: &Point3<f64>) -> Cell {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }

    /// Border halfedges whose source lies in the 27 cells around `p`.
    fn near<'a>(&'a self, p: &Point3<f64>) -> impl Iterator<Item = HalfEdgeId<I>> + 'a {
        let (x, y, z) = self.cell_of(p);
        (-1..=1)
            .flat_map(move |dx| {
                (-1..=1).flat_map(move |dy| {
                    (-1..=1).map(move |dz| (x.saturating_add(dx), y.saturating_add(dy), z.saturating_add(dz)))
                })
            })
            .filter_map(move |cell| self.cells.get(&cell))
            .flatten()
            .copied()
    }
}

/// For every border halfedge in index order, the best unmatched partner
/// whose endpoints lie within `tolerance`. With `reversed`, the partner runs
/// the opposite way (a weld); otherwise it runs the same way.
fn match_borders<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    tolerance: f64,
    reversed: bool,
) -> Vec<(HalfEdgeId<I>, HalfEdgeId<I>)> {
    let index = BorderIndex::new(mesh, tolerance);
    let mut matched = vec![false; 2 * mesh.edge_slots()];
    let mut pairs = Vec::new();

    for h in mesh.halfedge_ids() {
        if matched[h.index()] || !mesh.is_boundary_halfedge(h) {
            continue;
        }
        let a = mesh.source(h);
        let b = mesh.target(h);
        let (near_source, near_target) = if reversed { (b, a) } else { (a, b) };

        let mut best: Option<(f64, HalfEdgeId<I>)> = None;
        for g in index.near(mesh.position(near_source)) {
            if g == h || matched[g.index()] {
                continue;
            }
            let (c, d) = (mesh.source(g), mesh.target(g));
            // Welding must not collapse an edge
            if c == near_target || d == near_source {
                continue;
            }
            let d0 = (mesh.position(c) - mesh.position(near_source)).norm();
            let d1 = (mesh.position(d) - mesh.position(near_target)).norm();
            if d0 > tolerance || d1 > tolerance {
                continue;
            }
            if best.map_or(true, |(score, _)| d0 + d1 < score) {
                best = Some((d0 + d1, g));
            }
        }

        if let Some((_, g)) = best {
            matched[h.index()] = true;
            matched[g.index()] = true;
            pairs.push((h, g));
        }
    }
    pairs
}

/// Rebuild `mesh` from its faces with vertex slots merged by `merge`, and
/// the faces flagged in `reverse` turned around. Returns the number of
/// vertices removed. The mesh is unchanged on failure.
fn rebuild<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, merge: &mut UnionFind, reverse: &[bool]) -> Result<usize> {
    let mut new_index = vec![usize::MAX; mesh.vertex_slots()];
    let mut positions = Vec::with_capacity(mesh.num_vertices());
    for v in mesh.vertex_ids() {
        let root = merge.find(v.index());
        if new_index[root] == usize::MAX {
            new_index[root] = positions.len();
            positions.push(*mesh.position(VertexId::new(root)));
        }
    }

    let mut polygons: Vec<Vec<usize>> = Vec::with_capacity(mesh.num_faces());
    for f in mesh.face_ids() {
        let mut polygon: Vec<usize> = mesh
            .face_vertices(f)
            .map(|v| new_index[merge.find(v.index())])
            .collect();
        if reverse[f.index()] {
            polygon.reverse();
        }
        polygons.push(polygon);
    }

    let removed = mesh.num_vertices() - positions.len();
    *mesh = build_from_polygons::<I, _>(&positions, &polygons)?;
    Ok(removed)
}

impl StitchBackend for NativeStitcher {
    fn name(&self) -> &'static str {
        "native"
    }

    fn stitch_borders<I: MeshIndex>(&self, mesh: &mut HalfEdgeMesh<I>, options: &StitchOptions) -> Result<usize> {
        options.validate()?;
        let pairs = match_borders(mesh, options.tolerance, true);
        if pairs.is_empty() {
            return Ok(0);
        }

        let mut merge = UnionFind::new(mesh.vertex_slots());
        for &(h, g) in &pairs {
            merge.union(mesh.source(h).index(), mesh.target(g).index());
            merge.union(mesh.target(h).index(), mesh.source(g).index());
        }
        let reverse = vec![false; mesh.face_slots()];
        let merged = rebuild(mesh, &mut merge, &reverse)?;
        log::debug!("welded {} border pairs, {} vertices merged", pairs.len(), merged);
        Ok(pairs.len())
    }

    fn merge_reversible_connected_components<I: MeshIndex>(
        &self,
        mesh: &mut HalfEdgeMesh<I>,
        options: &StitchOptions,
    ) -> Result<usize> {
        options.validate()?;
        let (labels, groups) = face_labels(mesh);
        if groups.len() < 2 {
            return Ok(0);
        }

        // Component graph: an edge flagged `true` joins pieces of opposite orientation
        let mut adjacency: Vec<Vec<(usize, bool)>> = vec![Vec::new(); groups.len()];
        for (flip, pairs) in [
            (true, match_borders(mesh, options.tolerance, false)),
            (false, match_borders(mesh, options.tolerance, true)),
        ] {
            for (h, g) in pairs {
                let a = labels[mesh.face_of(h.opposite()).index()];
                let b = labels[mesh.face_of(g.opposite()).index()];
                if a != b {
                    adjacency[a].push((b, flip));
                    adjacency[b].push((a, flip));
                }
            }
        }

        // Largest pieces keep their orientation
        let mut order: Vec<usize> = (0..groups.len()).collect();
        order.sort_by_key(|&c| std::cmp::Reverse(groups[c].len()));
        let mut flipped: Vec<Option<bool>> = vec![None; groups.len()];
        for root in order {
            if flipped[root].is_some() {
                continue;
            }
            flipped[root] = Some(false);
            let mut queue = VecDeque::from([root]);
            while let Some(c) = queue.pop_front() {
                let state = flipped[c].unwrap_or(false);
                for &(d, flip) in &adjacency[c] {
                    if flipped[d].is_none() {
                        flipped[d] = Some(state ^ flip);
                        queue.push_back(d);
                    }
                }
            }
        }

        let reversed = flipped.iter().filter(|f| **f == Some(true)).count();
        if reversed == 0 {
            return Ok(0);
        }
        let reverse: Vec<bool> = (0..mesh.face_slots())
            .map(|f| labels[f] != usize::MAX && flipped[labels[f]] == Some(true))
            .collect();
        let mut identity = UnionFind::new(mesh.vertex_slots());
        rebuild(mesh, &mut identity, &reverse)?;
        log::debug!("reversed {} of {} components", reversed, groups.len());
        Ok(reversed)
    }
}

/// Stitch with [`NativeStitcher`].
pub fn stitch<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &StitchOptions) -> Result<StitchReport> {
    stitch_with(mesh, options, &NativeStitcher)
}

/// Reverse inconsistent pieces (if enabled), then weld borders, using `backend`.
///
/// Either both steps succeed or the mesh is left as it was.
pub fn stitch_with<I: MeshIndex, B: StitchBackend>(
    mesh: &mut HalfEdgeMesh<I>,
    options: &StitchOptions,
    backend: &B,
) -> Result<StitchReport> {
    options.validate()?;
    let vertices_before = mesh.num_vertices();
    let mut report = StitchReport {
        components_before: face_labels(mesh).1.len(),
        ..Default::default()
    };

    // Both steps run on a copy so a failure in either leaves `mesh` untouched
    let mut work = mesh.clone();
    if options.merge_components {
        report.reversed_components = backend.merge_reversible_connected_components(&mut work, options)?;
    }
    report.stitched_edges = backend.stitch_borders(&mut work, options)?;
    report.merged_vertices = vertices_before - work.num_vertices();
    report.components_after = face_labels(&work).1.len();
    *mesh = work;

    log::info!(
        "stitching ({}): {} edges welded, {} vertices merged, {} pieces reversed, {} -> {} components",
        backend.name(),
        report.stitched_edges,
        report.merged_vertices,
        report.reversed_components,
        report.components_before,
        report.components_after
    );
    Ok(report)
}
