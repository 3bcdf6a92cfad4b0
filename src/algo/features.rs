//! Feature edge detection.
//!
//! Feature edges are stored as the edge property `"e:feature"` and their
//! endpoints as the vertex property `"v:feature"`, both `bool`. Detection
//! adds to existing marks; [`clear_features`] resets them. Remeshing and
//! simplification read `"e:feature"` and leave marked edges in place.

use crate::error::{MeshError, Result};
use nalgebra::Vector3;

use crate::mesh::{EdgeId, ElementKind, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Edge property marking feature edges.
pub const FEATURE_EDGE_PROPERTY: &str = "e:feature";
/// Vertex property marking endpoints of feature edges.
pub const FEATURE_VERTEX_PROPERTY: &str = "v:feature";

/// Feature flags per edge slot; all `false` when the property is absent.
pub fn feature_edges<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Vec<bool> {
    match mesh.edge_property::<bool>(FEATURE_EDGE_PROPERTY) {
        Ok(flags) => flags.to_vec(),
        Err(_) => vec![false; mesh.edge_slots()],
    }
}

/// Cosine above which two consecutive border or feature segments count as
/// collinear, allowing their shared vertex to be removed.
const COLLINEAR_COS: f64 = 0.9998;

/// Whether exactly two line segments meet at `v` and they are collinear.
///
/// `on_line` selects the outgoing halfedges that belong to the line, e.g.
/// border edges or feature edges.
pub(crate) fn line_is_straight<I: MeshIndex, F>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>, on_line: F) -> bool
where
    F: Fn(HalfEdgeId<I>) -> bool,
{
    let line: Vec<Vector3<f64>> = mesh
        .vertex_halfedges(v)
        .filter(|&h| on_line(h))
        .map(|h| mesh.halfedge_vector(h))
        .collect();
    if line.len() != 2 {
        return false;
    }
    let (a, b) = (line[0], line[1]);
    let norms = a.norm() * b.norm();
    norms > 0.0 && -a.dot(&b) / norms > COLLINEAR_COS
}

/// Angle in radians between the normals of the two faces at `e`.
///
/// Zero for border edges and flat configurations.
pub fn dihedral_angle<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, e: EdgeId<I>) -> f64 {
    if mesh.is_boundary_edge(e) {
        return 0.0;
    }
    let n0 = mesh.face_normal(mesh.face_of(e.halfedge(0)));
    let n1 = mesh.face_normal(mesh.face_of(e.halfedge(1)));
    n0.dot(&n1).clamp(-1.0, 1.0).acos()
}

fn mark<I: MeshIndex, F>(mesh: &mut HalfEdgeMesh<I>, predicate: F) -> Result<usize>
where
    F: Fn(&HalfEdgeMesh<I>, EdgeId<I>) -> bool,
{
    let marked: Vec<EdgeId<I>> = mesh.edge_ids().filter(|&e| predicate(mesh, e)).collect();
    let endpoints: Vec<usize> = marked
        .iter()
        .flat_map(|e| [mesh.target(e.halfedge(0)).index(), mesh.target(e.halfedge(1)).index()])
        .collect();

    let props = mesh.properties_mut();
    let edge_flags = props.get_or_add::<bool>(ElementKind::Edge, FEATURE_EDGE_PROPERTY, false)?;
    let mut added = 0;
    for e in &marked {
        if !edge_flags[e.index()] {
            edge_flags[e.index()] = true;
            added += 1;
        }
    }
    let vertex_flags = props.get_or_add::<bool>(ElementKind::Vertex, FEATURE_VERTEX_PROPERTY, false)?;
    for v in endpoints {
        vertex_flags[v] = true;
    }
    Ok(added)
}

/// Mark edges whose dihedral angle exceeds `degrees`.
///
/// Returns the number of newly marked edges.
pub fn detect_angle<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, degrees: f64) -> Result<usize> {
    if !(0.0..=180.0).contains(&degrees) {
        return Err(MeshError::invalid_param("degrees", degrees, "must be in [0, 180]"));
    }
    let threshold = degrees.to_radians();
    let added = mark(mesh, |m, e| dihedral_angle(m, e) > threshold)?;
    log::debug!("feature detection: {} edges above {}°", added, degrees);
    Ok(added)
}

/// Mark every border edge. Returns the number of newly marked edges.
pub fn detect_boundary<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) -> Result<usize> {
    let added = mark(mesh, |m, e| m.is_boundary_edge(e))?;
    log::debug!("feature detection: {} border edges", added);
    Ok(added)
}

/// Remove both feature properties.
pub fn clear_features<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) {
    let props = mesh.properties_mut();
    props.remove(ElementKind::Edge, FEATURE_EDGE_PROPERTY);
    props.remove(ElementKind::Vertex, FEATURE_VERTEX_PROPERTY);
}
