//! Core mesh data structures.
//!
//! This module provides the halfedge mesh kernel: element handles, the
//! connectivity store with its O(1) adjacency queries, named per-element
//! properties, local topological edits and construction helpers.
//!
//! # Overview
//!
//! The primary type is [`HalfEdgeMesh`], a polygon mesh stored as a halfedge
//! (doubly-connected edge list) structure. Faces are inserted incrementally with
//! [`HalfEdgeMesh::add_face`], which rejects any face that would make the
//! surface non-manifold.
//!
//! # Handles
//!
//! Mesh elements are identified by typed handles:
//! - [`VertexId`], [`HalfEdgeId`], [`EdgeId`], [`FaceId`]
//!
//! Handles are generic over the underlying integer type ([`MeshIndex`]).
//!
//! # Construction
//!
//! ```
//! use tessera::mesh::{HalfEdgeMesh, build_from_polygons};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let faces = vec![vec![0, 1, 2, 3]];
//!
//! let mesh: HalfEdgeMesh = build_from_polygons(&vertices, &faces).unwrap();
//! assert_eq!(mesh.num_edges(), 4);
//! ```

mod builder;
mod edit;
mod halfedge;
mod index;
mod property;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builder::{
    build_from_polygons, build_from_polygons_lenient, build_from_triangles, to_face_vertex,
    to_triangles,
};
pub use halfedge::{Face, HalfEdge, HalfEdgeMesh, LoopIter, Vertex, VertexHalfEdgeIter};
pub use index::{EdgeId, FaceId, HalfEdgeId, MeshIndex, VertexId};
pub use property::{ElementKind, PropertyContainer, PropertyStore, PropertyValue};
