//! Error types for tessera.
//!
//! Errors follow a small taxonomy shared by the kernel and every algorithm:
//!
//! - [`MeshError::TopologyViolation`]: an edit was rejected because it would break
//!   manifoldness. The mesh is left untouched.
//! - [`MeshError::DegenerateInput`]: the input is geometrically degenerate in a way
//!   the algorithm cannot work around.
//! - [`MeshError::PreconditionUnmet`]: the mesh has the wrong base type or topology
//!   for the requested algorithm (or a property was requested with the wrong type).
//!   The whole call fails and the mesh is unchanged.
//!
//! Hitting an iteration or size cap is not an error: algorithms return a report
//! flagged with [`crate::algo::Termination::ResourceExhausted`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur during mesh operations.
#[derive(Error, Debug)]
pub enum MeshError {
    /// An edit would break the manifold structure of the mesh.
    #[error("{operation} rejected: {details}")]
    TopologyViolation {
        /// The rejected operation.
        operation: &'static str,
        /// Description of the violation.
        details: String,
    },

    /// Degenerate geometry or connectivity (zero area, repeated vertices, singular system).
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// The mesh does not satisfy the requirements of the requested operation.
    #[error("precondition not met: {0}")]
    PreconditionUnmet(String),

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading (parsing) a mesh from file.
    #[error("failed to load mesh from {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving mesh to file.
    #[error("failed to save mesh to {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Iterative solver failed to converge.
    #[error("algorithm failed to converge after {iterations} iterations")]
    ConvergenceFailed {
        /// Number of iterations attempted.
        iterations: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a topology violation error for the named operation.
    pub fn topology(operation: &'static str, details: impl Into<String>) -> Self {
        MeshError::TopologyViolation {
            operation,
            details: details.into(),
        }
    }

    /// Create a precondition error.
    pub fn precondition(details: impl Into<String>) -> Self {
        MeshError::PreconditionUnmet(details.into())
    }

    /// Create a degenerate input error.
    pub fn degenerate(details: impl Into<String>) -> Self {
        MeshError::DegenerateInput(details.into())
    }

    /// Whether this error belongs to the topology-violation class.
    pub fn is_topology_violation(&self) -> bool {
        matches!(self, MeshError::TopologyViolation { .. })
    }

    /// Whether this error belongs to the precondition class.
    pub fn is_precondition(&self) -> bool {
        matches!(self, MeshError::PreconditionUnmet(_))
    }
}
