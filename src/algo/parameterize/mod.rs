//! UV parameterization of disc-shaped triangle meshes.
//!
//! Both methods assemble one global sparse system and solve it with the
//! crate's conjugate gradient solver:
//!
//! - [`harmonic`]: the border loop is fixed to a convex shape (circle or
//!   square, by arc length) and every interior vertex is placed at the
//!   weighted average of its neighbours. With positive weights the map is a
//!   bijection onto the convex domain.
//! - [`lscm`]: Least Squares Conformal Maps. Two vertices are pinned and
//!   the border is left free, which minimizes angle distortion.
//!
//! The result is returned as a [`UVMap`] and also stored as the vertex
//! property `"v:tex"` ([`TEX_COORD_PROPERTY`]).
//!
//! # Requirements
//!
//! The mesh must be a single triangulated disc: one connected component,
//! exactly one border loop, Euler characteristic 1 and no non-manifold
//! vertex. Anything else fails with `PreconditionUnmet` and leaves the mesh
//! unchanged. Closed meshes must first be cut.
//!
//! # Example
//!
//! ```no_run
//! use tessera::prelude::*;
//! use tessera::algo::parameterize::{harmonic, ParameterizeOptions};
//!
//! let mut mesh: HalfEdgeMesh = tessera::io::load("disc.obj").unwrap();
//! let uv_map = harmonic(&mut mesh, &ParameterizeOptions::default()).unwrap();
//! for v in mesh.vertex_ids() {
//!     let uv = uv_map.get(v);
//!     println!("{:?}: u={:.3}, v={:.3}", v, uv.x, uv.y);
//! }
//! ```
//!
//! # References
//!
//! - Floater, M. (1997). "Parametrization and smooth approximation of
//!   surface triangulations." CAGD.
//! - Lévy, B., Petitjean, S., Ray, N., & Maillot, J. (2002). "Least squares
//!   conformal maps for automatic texture atlas generation." ACM SIGGRAPH.

mod harmonic;
mod lscm;
mod uv;

use std::fmt;

pub use harmonic::harmonic;
pub use lscm::lscm;
pub use uv::{UVMap, TEX_COORD_PROPERTY};

use super::components::{extract_components, topology_info};
use super::laplace::LaplaceWeighting;
use super::sparse::SolverOptions;
use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeId, HalfEdgeMesh, MeshIndex};

/// Parameterization method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// Discrete harmonic map with a fixed convex border.
    #[default]
    Harmonic,
    /// Least Squares Conformal Maps with two pinned vertices.
    Lscm,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Harmonic => write!(f, "harmonic"),
            Method::Lscm => write!(f, "LSCM"),
        }
    }
}

/// Convex shape the border is fixed to by [`harmonic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryShape {
    /// Circle of radius 1/2 centred at (1/2, 1/2).
    #[default]
    Circle,
    /// Perimeter of the unit square.
    Square,
}

/// Strategy for selecting which vertices [`lscm`] pins.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PinStrategy {
    /// Pin the two border vertices farthest apart.
    #[default]
    Automatic,
    /// Pin the given vertices.
    Manual(PinnedVertex, PinnedVertex),
}

/// A vertex pinned to a specific UV coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinnedVertex {
    /// Vertex slot index.
    pub vertex: usize,
    /// Fixed U coordinate.
    pub u: f64,
    /// Fixed V coordinate.
    pub v: f64,
}

impl PinnedVertex {
    /// Create a new pinned vertex.
    pub fn new(vertex: usize, u: f64, v: f64) -> Self {
        Self { vertex, u, v }
    }
}

/// Options for parameterization.
#[derive(Debug, Clone)]
pub struct ParameterizeOptions {
    /// Border shape for the harmonic map.
    pub boundary: BoundaryShape,
    /// Edge weights for the harmonic map.
    pub weighting: LaplaceWeighting,
    /// Pinned vertices for LSCM.
    pub pins: PinStrategy,
    /// Linear solver limits.
    pub solver: SolverOptions,
    /// Solve the two coordinates of the harmonic map in parallel.
    pub parallel: bool,
}

impl Default for ParameterizeOptions {
    fn default() -> Self {
        Self {
            boundary: BoundaryShape::Circle,
            weighting: LaplaceWeighting::Cotangent,
            pins: PinStrategy::Automatic,
            solver: SolverOptions::default(),
            parallel: true,
        }
    }
}

impl ParameterizeOptions {
    /// Set the harmonic border shape.
    pub fn with_boundary(mut self, boundary: BoundaryShape) -> Self {
        self.boundary = boundary;
        self
    }

    /// Set the harmonic edge weighting.
    pub fn with_weighting(mut self, weighting: LaplaceWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Pin two vertices for LSCM.
    pub fn with_pins(mut self, pin0: PinnedVertex, pin1: PinnedVertex) -> Self {
        self.pins = PinStrategy::Manual(pin0, pin1);
        self
    }

    /// Set the linear solver limits.
    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// Set whether to solve in parallel.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Parameterize with the chosen method.
pub fn parameterize<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    method: Method,
    options: &ParameterizeOptions,
) -> Result<UVMap<I>> {
    match method {
        Method::Harmonic => harmonic(mesh, options),
        Method::Lscm => lscm(mesh, options),
    }
}

/// Check that the mesh is a triangulated disc and return its border loop.
fn disc_border<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Result<Vec<HalfEdgeId<I>>> {
    if mesh.num_faces() == 0 {
        return Err(MeshError::precondition("parameterization requires a mesh with faces"));
    }
    if !mesh.is_triangle_mesh() {
        return Err(MeshError::precondition("parameterization requires a triangle mesh"));
    }
    let info = topology_info(mesh);
    if info.components != 1 || info.borders != 1 || info.euler_characteristic != 1 {
        return Err(MeshError::precondition(format!(
            "parameterization requires disc topology, got {} component(s), {} border(s), χ = {}",
            info.components, info.borders, info.euler_characteristic
        )));
    }
    if info.non_manifold_vertices > 0 {
        return Err(MeshError::precondition(format!(
            "parameterization requires a manifold mesh, found {} non-manifold vertices",
            info.non_manifold_vertices
        )));
    }
    if mesh.vertex_ids().any(|v| mesh.is_isolated(v)) {
        return Err(MeshError::precondition("parameterization does not accept isolated vertices"));
    }

    let mut loops = extract_components(mesh)
        .into_iter()
        .flat_map(|c| c.border_loops())
        .collect::<Vec<_>>();
    loops
        .pop()
        .ok_or_else(|| MeshError::precondition("parameterization found no border loop"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;

    #[test]
    fn test_disc_border_accepts_disc() {
        let mesh = fixtures::disc(2, 6);
        let border = disc_border(&mesh).unwrap();
        assert_eq!(border.len(), 6);
        assert!(border.iter().all(|&h| mesh.is_boundary_halfedge(h)));
    }

    #[test]
    fn test_disc_border_rejects_other_topologies() {
        assert!(disc_border(&fixtures::icosahedron()).unwrap_err().is_precondition());
        assert!(disc_border(&fixtures::cylinder(2, 8)).unwrap_err().is_precondition());
        assert!(disc_border(&fixtures::cube()).unwrap_err().is_precondition());
        assert!(disc_border(&HalfEdgeMesh::<u32>::new()).unwrap_err().is_precondition());
    }

    #[test]
    fn test_parameterize_dispatch() {
        let mut a = fixtures::grid(3);
        let mut b = fixtures::grid(3);
        let options = ParameterizeOptions::default();
        let ha = parameterize(&mut a, Method::Harmonic, &options).unwrap();
        let hb = harmonic(&mut b, &options).unwrap();
        assert_eq!(ha.as_slice(), hb.as_slice());
        assert_eq!(Method::Lscm.to_string(), "LSCM");
    }
}
