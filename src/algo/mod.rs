//! Mesh processing algorithms.
//!
//! - **Analysis**: connected components and surface classification, curvature,
//!   geodesic distances, feature detection
//! - **Differential operators**: Laplace–Beltrami weights and vertex areas,
//!   sparse matrices and a conjugate gradient solver
//! - **Smoothing and fairing**: explicit and implicit Laplacian smoothing,
//!   harmonic, biharmonic and triharmonic fairing
//! - **Remeshing**: uniform and curvature-adaptive isotropic remeshing
//! - **Simplification**: quadric error edge collapse with quality constraints
//! - **Subdivision**: Loop, Catmull–Clark and √3
//! - **Repair**: hole filling, border stitching
//! - **Parameterization**: discrete harmonic and LSCM
//! - **Conversion**: triangulation, polygonization, surface sampling,
//!   tetrahedralization backends
//!
//! Algorithms borrow the mesh for the duration of a call. Mutating
//! algorithms either succeed or leave the mesh unchanged when they fail a
//! precondition; iteration or size caps are reported through
//! [`Termination`] rather than as errors.

pub mod components;
pub mod curvature;
pub mod fair;
pub mod features;
pub mod geodesic;
pub mod hole_fill;
pub mod laplace;
pub mod parameterize;
pub mod polygonize;
pub mod progress;
pub mod remesh;
pub mod sample;
pub mod simplify;
pub mod smooth;
pub mod sparse;
pub mod stitch;
pub mod subdivide;
pub mod tetrahedralize;
pub mod triangulate;

/// How an iterative or greedy algorithm stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// The requested goal was reached.
    Completed,
    /// No further legal operation was available before the goal.
    Stalled,
    /// An iteration or size cap was hit; the result is well-formed but partial.
    ResourceExhausted,
}

impl Termination {
    /// Whether the algorithm reached its goal.
    pub fn is_completed(self) -> bool {
        self == Termination::Completed
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Termination::Completed => "completed",
            Termination::Stalled => "stalled",
            Termination::ResourceExhausted => "resource limit reached",
        })
    }
}
