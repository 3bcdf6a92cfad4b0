//! # Tessera
//!
//! A halfedge polygon mesh kernel with a collection of geometry processing
//! algorithms: topology analysis, curvature, geodesics, smoothing and
//! fairing, remeshing, simplification, subdivision, hole filling,
//! stitching, parameterization and conversions between representations.
//!
//! ## Features
//!
//! - **Halfedge kernel**: O(1) adjacency queries through typed handles,
//!   atomic local edits (flip, split, collapse, insert) and mark-and-compact
//!   deletion
//! - **Flexible indexing**: 16-, 32- and 64-bit handles
//! - **Named properties**: typed per-vertex, per-edge and per-face data that
//!   algorithms read and write by name
//! - **File formats**: OBJ, PLY and STL
//!
//! ## Quick Start
//!
//! ```no_run
//! use tessera::prelude::*;
//! use tessera::algo::components::topology_info;
//!
//! let mesh: HalfEdgeMesh = tessera::io::load("model.obj").unwrap();
//! let info = topology_info(&mesh);
//! println!("V={} E={} F={} χ={}", info.vertices, info.edges, info.faces, info.euler_characteristic);
//!
//! for f in mesh.face_ids() {
//!     println!("{:?}: area {}", f, mesh.face_area(f));
//! }
//! tessera::io::save(&mesh, "model.ply").unwrap();
//! ```
//!
//! ## Building Meshes Programmatically
//!
//! ```
//! use tessera::prelude::*;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
//!
//! let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//! assert!(mesh.is_closed());
//!
//! // Split an edge at its midpoint
//! let e = mesh.find_edge(VertexId::new(0), VertexId::new(1)).unwrap();
//! let v = mesh.split_edge(e, Point3::new(0.5, 0.0, 0.0)).unwrap();
//! assert_eq!(mesh.valence(v), 4);
//! assert_eq!(mesh.num_faces(), 6);
//! assert!(mesh.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod io;
pub mod mesh;

/// Commonly used types.
///
/// ```
/// use tessera::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::Termination;
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{
        build_from_polygons, build_from_triangles, to_face_vertex, EdgeId, ElementKind, FaceId, HalfEdgeId,
        HalfEdgeMesh, MeshIndex, VertexId,
    };
}

pub use nalgebra;

#[cfg(test)]
mod tests {
    use crate::mesh::fixtures;

    #[test]
    fn test_edits_keep_halfedge_invariants() {
        let mut mesh = fixtures::icosahedron();
        let e = mesh.edge_ids().next().unwrap();
        let p = mesh.edge_midpoint(e);
        let v = mesh.split_edge(e, p).unwrap();
        let flip = mesh.edge_ids().find(|&e| mesh.is_flip_ok(e)).unwrap();
        mesh.flip_edge(flip).unwrap();
        let h = mesh.vertex_halfedges(v).find(|&h| mesh.is_collapse_ok(h)).unwrap();
        mesh.collapse_edge(h).unwrap();
        mesh.compact();

        assert!(mesh.is_valid());
        for h in mesh.halfedge_ids() {
            assert_eq!(mesh.opposite(mesh.opposite(h)), h);
        }
        for v in mesh.vertex_ids() {
            // The one-ring closes on itself
            let start = mesh.vertex_halfedge(v);
            let mut h = start;
            let mut steps = 0;
            loop {
                h = mesh.cw_rotated_halfedge(h);
                steps += 1;
                if h == start || steps > 100 {
                    break;
                }
            }
            assert_eq!(h, start);
            assert_eq!(steps, mesh.valence(v));
        }
        assert_eq!(mesh.num_vertices() as i64 - mesh.num_edges() as i64 + mesh.num_faces() as i64, 2);
    }
}
