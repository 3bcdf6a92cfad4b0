//! Surface fairing: minimize area, curvature or curvature variation.
//!
//! Fairing of order `k` solves `Δᵏ x = 0` on the free vertices, with the
//! remaining vertices as Dirichlet constraints:
//!
//! | order | energy                | operator       |
//! |-------|-----------------------|----------------|
//! | 1     | membrane (area)       | Laplacian      |
//! | 2     | thin plate (curvature)| bi-Laplacian   |
//! | 3     | curvature variation   | tri-Laplacian  |
//!
//! With `L` the cotangent stiffness matrix and `D` the diagonal of mixed
//! vertex areas, the free rows of `(D⁻¹L)ᵏ x = 0` are scaled by `D` to give
//! the symmetric system `L (D⁻¹L)ᵏ⁻¹ x = 0`, which is solved per coordinate
//! with conjugate gradients.
//!
//! Locked vertices are the border vertices together with `k − 1` rings
//! around them, plus every vertex not selected in the optional `"v:selected"`
//! property. Fairing a closed mesh therefore requires a selection.

use std::collections::BTreeMap;

use nalgebra::{DVector, Point3};

use super::laplace::{self, LaplaceWeighting, VertexNumbering};
use super::progress::Progress;
use super::sparse::{self, CsrMatrix, SolverOptions};
use crate::error::{MeshError, Result};
use crate::mesh::{ElementKind, HalfEdgeMesh, MeshIndex, VertexId};

/// Vertex selection property (`bool`); unselected vertices stay fixed.
pub const SELECTION_PROPERTY: &str = "v:selected";

/// Options for fairing.
#[derive(Debug, Clone)]
pub struct FairOptions {
    /// Order of the Laplacian energy, at least 1.
    pub order: usize,
    /// Edge weighting of the stiffness matrix.
    pub weighting: LaplaceWeighting,
    /// Solve the three coordinates in parallel.
    pub parallel: bool,
    /// Linear solver limits.
    pub solver: SolverOptions,
    /// Progress callback.
    pub progress: Progress,
}

impl Default for FairOptions {
    fn default() -> Self {
        Self::minimize_curvature()
    }
}

impl FairOptions {
    /// Fairing of arbitrary order `k`.
    pub fn order(k: usize) -> Self {
        Self {
            order: k,
            weighting: LaplaceWeighting::Cotangent,
            parallel: true,
            solver: SolverOptions::default(),
            progress: Progress::none(),
        }
    }

    /// Membrane energy (k = 1).
    pub fn minimize_area() -> Self {
        Self::order(1)
    }

    /// Thin plate energy (k = 2).
    pub fn minimize_curvature() -> Self {
        Self::order(2)
    }

    /// Curvature variation energy (k = 3).
    pub fn minimize_curvature_variation() -> Self {
        Self::order(3)
    }

    /// Choose uniform or cotangent weights.
    pub fn with_weighting(mut self, weighting: LaplaceWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Set whether to solve coordinates in parallel.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the linear solver limits.
    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }
}

/// Outcome of a fairing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FairReport {
    /// Vertices whose positions were solved for.
    pub free_vertices: usize,
    /// Vertices held fixed.
    pub locked_vertices: usize,
}

/// Lock flags per vertex slot.
fn locked_vertices<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, order: usize) -> Vec<bool> {
    let n = mesh.vertex_slots();
    let mut locked: Vec<bool> = (0..n)
        .map(|i| {
            let v = VertexId::new(i);
            !mesh.is_deleted_vertex(v) && mesh.is_boundary_vertex(v)
        })
        .collect();

    // Grow the boundary lock by order - 1 rings
    for _ in 1..order {
        let ring: Vec<usize> = mesh
            .vertex_ids()
            .filter(|v| locked[v.index()])
            .flat_map(|v| mesh.vertex_neighbors(v).map(|u| u.index()).collect::<Vec<_>>())
            .collect();
        for i in ring {
            locked[i] = true;
        }
    }

    if let Ok(selected) = mesh.vertex_property::<bool>(SELECTION_PROPERTY) {
        for v in mesh.vertex_ids() {
            if !selected[v.index()] {
                locked[v.index()] = true;
            }
        }
    }
    locked
}

/// Row of `L` for every vertex slot: `(neighbour slot, coefficient)` with the
/// diagonal first.
fn stiffness_rows<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, weights: &[f64]) -> Vec<Vec<(usize, f64)>> {
    let mut rows = vec![Vec::new(); mesh.vertex_slots()];
    for v in mesh.vertex_ids() {
        let mut row = vec![(v.index(), 0.0)];
        let mut diagonal = 0.0;
        for h in mesh.vertex_halfedges(v) {
            let w = weights[h.edge().index()];
            diagonal += w;
            row.push((mesh.target(h).index(), -w));
        }
        row[0].1 = diagonal;
        rows[v.index()] = row;
    }
    rows
}

/// Row `v` of `L (D⁻¹L)ᵏ⁻¹`.
fn stencil(rows: &[Vec<(usize, f64)>], inverse_areas: &[f64], v: usize, order: usize) -> BTreeMap<usize, f64> {
    let mut current: BTreeMap<usize, f64> = BTreeMap::new();
    for &(u, c) in &rows[v] {
        *current.entry(u).or_insert(0.0) += c;
    }
    for _ in 1..order {
        let mut next = BTreeMap::new();
        for (&u, &c) in &current {
            let scale = c * inverse_areas[u];
            for &(w, l) in &rows[u] {
                *next.entry(w).or_insert(0.0) += scale * l;
            }
        }
        current = next;
    }
    current
}

/// Fair the free region of the mesh in place.
///
/// Fails with `PreconditionUnmet` when the mesh has no faces or when no vertex
/// is locked (a closed mesh without a selection). The mesh is unchanged on
/// failure.
pub fn fair<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &FairOptions) -> Result<FairReport> {
    if options.order == 0 {
        return Err(MeshError::invalid_param("order", options.order, "must be at least 1"));
    }
    if mesh.num_faces() == 0 {
        return Err(MeshError::precondition("fairing requires a mesh with faces"));
    }
    if mesh.properties().contains(ElementKind::Vertex, SELECTION_PROPERTY) {
        // Surface a type mismatch instead of silently ignoring the selection
        mesh.vertex_property::<bool>(SELECTION_PROPERTY)?;
    }

    let locked = locked_vertices(mesh, options.order);
    let locked_count = mesh
        .vertex_ids()
        .filter(|&v| locked[v.index()] && !mesh.is_isolated(v))
        .count();
    if locked_count == 0 {
        return Err(MeshError::precondition(
            "fairing needs fixed vertices: the mesh has no border and no selection",
        ));
    }

    let numbering = VertexNumbering::new(mesh, |v| !locked[v.index()] && !mesh.is_isolated(v));
    let report = FairReport {
        free_vertices: numbering.len(),
        locked_vertices: locked_count,
    };
    if numbering.is_empty() {
        log::debug!("fairing: every vertex is locked");
        return Ok(report);
    }
    options.progress.report(0, 2, "assembling");

    let weights = laplace::edge_weights(mesh, options.weighting);
    let rows = stiffness_rows(mesh, &weights);
    let inverse_areas: Vec<f64> = laplace::vertex_areas(mesh)
        .into_iter()
        .map(|a| 1.0 / a.max(f64::EPSILON))
        .collect();

    let n = numbering.len();
    let mut triplets = Vec::new();
    let mut rhs = vec![DVector::zeros(n), DVector::zeros(n), DVector::zeros(n)];
    let mut guess = vec![DVector::zeros(n), DVector::zeros(n), DVector::zeros(n)];
    for (r, &v) in numbering.vertices().iter().enumerate() {
        for (u, c) in stencil(&rows, &inverse_areas, v.index(), options.order) {
            let u: VertexId<I> = VertexId::new(u);
            match numbering.row(u) {
                Some(col) => triplets.push((r, col, c)),
                None => {
                    let p = mesh.position(u);
                    for axis in 0..3 {
                        rhs[axis][r] -= c * p[axis];
                    }
                }
            }
        }
        let p = mesh.position(v);
        for axis in 0..3 {
            guess[axis][r] = p[axis];
        }
    }

    let matrix = CsrMatrix::from_triplets(n, n, triplets);
    options.progress.report(1, 2, "solving");
    let solution = sparse::solve_columns(&matrix, &rhs, Some(&guess), options.solver, options.parallel)?;

    for (r, &v) in numbering.vertices().iter().enumerate() {
        mesh.set_position(v, Point3::new(solution[0][r], solution[1][r], solution[2][r]));
    }
    options.progress.report(2, 2, "done");
    log::info!(
        "fairing (order {}): {} free, {} locked vertices",
        options.order,
        report.free_vertices,
        report.locked_vertices
    );
    Ok(report)
}

/// Membrane fairing with default options.
pub fn minimize_area<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) -> Result<FairReport> {
    fair(mesh, &FairOptions::minimize_area())
}

/// Thin plate fairing with default options.
pub fn minimize_curvature<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) -> Result<FairReport> {
    fair(mesh, &FairOptions::minimize_curvature())
}
