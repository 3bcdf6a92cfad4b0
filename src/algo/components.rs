//! Connected components and surface classification.
//!
//! Components are found by flood-filling across shared edges, starting from
//! faces in handle order, so the discovery order is deterministic. A
//! [`Component`] borrows the mesh and only stores handle lists.
//!
//! Closed and open surfaces are classified from the Euler characteristic
//! χ = V − E + F and the number of border loops B.
//!
//! # Example
//!
//! ```no_run
//! use tessera::prelude::*;
//! use tessera::algo::components::{extract_components, SurfaceType};
//!
//! let mesh: HalfEdgeMesh = tessera::io::load("mesh.obj").unwrap();
//! for component in extract_components(&mesh) {
//!     let info = component.info();
//!     println!("{:?}: {} faces, {} borders", info.surface, info.faces, info.borders);
//! }
//! ```

use std::collections::VecDeque;
use std::fmt;

use crate::error::Result;
use crate::mesh::{EdgeId, ElementKind, FaceId, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Name of the face property written by [`label_components`].
pub const COMPONENT_PROPERTY: &str = "f:connected_component";

/// Topological type of a connected surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceType {
    /// Closed, χ = 2.
    Sphere,
    /// One border, χ = 1.
    Disc,
    /// Two borders, χ = 0.
    Cylinder,
    /// Closed, χ = 0.
    Torus,
    /// Closed with any other χ.
    UnknownClosed,
    /// Open, not a disc or cylinder.
    UnknownOpen,
}

impl SurfaceType {
    /// Classify from Euler characteristic and border count.
    pub fn classify(euler_characteristic: i64, borders: usize) -> Self {
        match (borders, euler_characteristic) {
            (0, 2) => SurfaceType::Sphere,
            (0, 0) => SurfaceType::Torus,
            (0, _) => SurfaceType::UnknownClosed,
            (1, 1) => SurfaceType::Disc,
            (2, 0) => SurfaceType::Cylinder,
            _ => SurfaceType::UnknownOpen,
        }
    }

    /// Whether the surface has no border.
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            SurfaceType::Sphere | SurfaceType::Torus | SurfaceType::UnknownClosed
        )
    }
}

impl fmt::Display for SurfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SurfaceType::Sphere => "sphere",
            SurfaceType::Disc => "disc",
            SurfaceType::Cylinder => "cylinder",
            SurfaceType::Torus => "torus",
            SurfaceType::UnknownClosed => "unknown (closed)",
            SurfaceType::UnknownOpen => "unknown (open)",
        };
        f.write_str(name)
    }
}

/// Summary statistics of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInfo {
    /// Number of faces.
    pub faces: usize,
    /// Number of vertices.
    pub vertices: usize,
    /// Number of edges.
    pub edges: usize,
    /// Euler characteristic V − E + F.
    pub euler_characteristic: i64,
    /// Number of border loops.
    pub borders: usize,
    /// Halfedge count of the largest border loop (0 if closed).
    pub largest_border: usize,
    /// Total length of all border loops.
    pub border_length: f64,
    /// Sum of face areas.
    pub area: f64,
    /// Topological type.
    pub surface: SurfaceType,
}

/// A connected set of faces, with the vertices and edges they touch.
#[derive(Debug, Clone)]
pub struct Component<'a, I: MeshIndex = u32> {
    mesh: &'a HalfEdgeMesh<I>,
    faces: Vec<FaceId<I>>,
    vertices: Vec<VertexId<I>>,
    edges: Vec<EdgeId<I>>,
}

impl<'a, I: MeshIndex> Component<'a, I> {
    fn new(mesh: &'a HalfEdgeMesh<I>, faces: Vec<FaceId<I>>) -> Self {
        let mut vertices = Vec::new();
        let mut edges = Vec::new();
        for &f in &faces {
            for h in mesh.face_halfedges(f) {
                vertices.push(mesh.target(h));
                edges.push(h.edge());
            }
        }
        vertices.sort_unstable();
        vertices.dedup();
        edges.sort_unstable();
        edges.dedup();
        Self {
            mesh,
            faces,
            vertices,
            edges,
        }
    }

    /// The mesh this component belongs to.
    pub fn mesh(&self) -> &'a HalfEdgeMesh<I> {
        self.mesh
    }

    /// Faces in discovery order.
    pub fn faces(&self) -> &[FaceId<I>] {
        &self.faces
    }

    /// Vertices in handle order.
    pub fn vertices(&self) -> &[VertexId<I>] {
        &self.vertices
    }

    /// Edges in handle order.
    pub fn edges(&self) -> &[EdgeId<I>] {
        &self.edges
    }

    /// Number of faces.
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Euler characteristic V − E + F.
    pub fn euler_characteristic(&self) -> i64 {
        self.vertices.len() as i64 - self.edges.len() as i64 + self.faces.len() as i64
    }

    /// Sum of face areas.
    pub fn surface_area(&self) -> f64 {
        self.faces.iter().map(|&f| self.mesh.face_area(f)).sum()
    }

    /// Border loops, each given as its border halfedges in loop order.
    pub fn border_loops(&self) -> Vec<Vec<HalfEdgeId<I>>> {
        let mesh = self.mesh;
        let mut visited = vec![false; mesh.halfedge_slots()];
        let mut loops = Vec::new();
        for &e in &self.edges {
            for side in 0..2 {
                let h = e.halfedge(side);
                if !mesh.is_boundary_halfedge(h) || visited[h.index()] {
                    continue;
                }
                let border: Vec<HalfEdgeId<I>> = mesh.loop_halfedges(h).collect();
                for &b in &border {
                    visited[b.index()] = true;
                }
                loops.push(border);
            }
        }
        loops
    }

    /// Number of border loops.
    pub fn num_borders(&self) -> usize {
        self.border_loops().len()
    }

    /// Total length of all border loops.
    pub fn border_length(&self) -> f64 {
        self.edges
            .iter()
            .filter(|&&e| self.mesh.is_boundary_edge(e))
            .map(|&e| self.mesh.edge_length(e))
            .sum()
    }

    /// Topological type of the component.
    pub fn classify(&self) -> SurfaceType {
        SurfaceType::classify(self.euler_characteristic(), self.num_borders())
    }

    /// All statistics in one pass over the border loops.
    pub fn info(&self) -> ComponentInfo {
        let loops = self.border_loops();
        let euler_characteristic = self.euler_characteristic();
        ComponentInfo {
            faces: self.num_faces(),
            vertices: self.num_vertices(),
            edges: self.num_edges(),
            euler_characteristic,
            borders: loops.len(),
            largest_border: loops.iter().map(Vec::len).max().unwrap_or(0),
            border_length: self.border_length(),
            area: self.surface_area(),
            surface: SurfaceType::classify(euler_characteristic, loops.len()),
        }
    }
}

/// Per-face component labels (indexed by face slot, `usize::MAX` for deleted
/// faces) and the number of components.
pub(crate) fn face_labels<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> (Vec<usize>, Vec<Vec<FaceId<I>>>) {
    let mut label = vec![usize::MAX; mesh.face_slots()];
    let mut groups = Vec::new();
    let mut queue = VecDeque::new();

    for seed in mesh.face_ids() {
        if label[seed.index()] != usize::MAX {
            continue;
        }
        let id = groups.len();
        let mut faces = Vec::new();
        label[seed.index()] = id;
        queue.push_back(seed);
        while let Some(f) = queue.pop_front() {
            faces.push(f);
            for g in mesh.face_neighbors(f) {
                if label[g.index()] == usize::MAX {
                    label[g.index()] = id;
                    queue.push_back(g);
                }
            }
        }
        groups.push(faces);
    }

    (label, groups)
}

/// Split the mesh into connected face sets, in discovery order.
pub fn extract_components<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Vec<Component<'_, I>> {
    let (_, groups) = face_labels(mesh);
    log::debug!("found {} connected components", groups.len());
    groups
        .into_iter()
        .map(|faces| Component::new(mesh, faces))
        .collect()
}

/// Store the component index of every face in `f:connected_component`.
///
/// Returns the number of components.
pub fn label_components<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) -> Result<usize> {
    let (labels, groups) = face_labels(mesh);
    mesh.properties_mut()
        .set(ElementKind::Face, COMPONENT_PROPERTY, labels, usize::MAX)?;
    Ok(groups.len())
}

/// Whole-mesh topological summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyInfo {
    /// Live vertices (including isolated ones).
    pub vertices: usize,
    /// Live edges.
    pub edges: usize,
    /// Live faces.
    pub faces: usize,
    /// Euler characteristic of the whole mesh.
    pub euler_characteristic: i64,
    /// Number of border loops.
    pub borders: usize,
    /// Number of connected face components.
    pub components: usize,
    /// Vertices whose fan has more than one gap.
    pub non_manifold_vertices: usize,
    /// Sum of the genera of the closed components.
    pub genus: i64,
}

/// Compute the [`TopologyInfo`] of a mesh.
pub fn topology_info<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> TopologyInfo {
    let components = extract_components(mesh);
    let mut borders = 0;
    let mut genus = 0;
    for c in &components {
        let b = c.num_borders();
        borders += b;
        if b == 0 {
            genus += (2 - c.euler_characteristic()) / 2;
        }
    }
    TopologyInfo {
        vertices: mesh.num_vertices(),
        edges: mesh.num_edges(),
        faces: mesh.num_faces(),
        euler_characteristic: mesh.num_vertices() as i64 - mesh.num_edges() as i64
            + mesh.num_faces() as i64,
        borders,
        components: components.len(),
        non_manifold_vertices: mesh.vertex_ids().filter(|&v| !mesh.is_manifold(v)).count(),
        genus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{build_from_triangles, fixtures};
    use nalgebra::Point3;

    fn two_separate_triangles() -> HalfEdgeMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
            Point3::new(6.0, 0.0, 0.0),
            Point3::new(5.0, 1.0, 0.0),
        ];
        build_from_triangles(&vertices, &[[0, 1, 2], [3, 4, 5]]).unwrap()
    }

    #[test]
    fn test_components_partition_faces() {
        let mesh = two_separate_triangles();
        let components = extract_components(&mesh);
        assert_eq!(components.len(), 2);

        let mut seen = vec![0usize; mesh.face_slots()];
        for c in &components {
            for f in c.faces() {
                seen[f.index()] += 1;
            }
        }
        assert!(mesh.face_ids().all(|f| seen[f.index()] == 1));
        assert_eq!(components[0].faces()[0], FaceId::new(0));
    }

    #[test]
    fn test_icosahedron_is_sphere() {
        let mesh = fixtures::icosahedron();
        let components = extract_components(&mesh);
        assert_eq!(components.len(), 1);
        let info = components[0].info();
        assert_eq!(info.euler_characteristic, 2);
        assert_eq!(info.borders, 0);
        assert_eq!(info.largest_border, 0);
        assert_eq!(info.surface, SurfaceType::Sphere);
        assert!(info.surface.is_closed());
    }

    #[test]
    fn test_classify_disc_cylinder_torus() {
        let disc = fixtures::disc(2, 6);
        let info = extract_components(&disc)[0].info();
        assert_eq!(info.surface, SurfaceType::Disc);
        assert_eq!(info.largest_border, 6);
        assert!((info.border_length - 6.0).abs() < 1e-9);

        let cylinder = fixtures::cylinder(3, 8);
        let c = &extract_components(&cylinder)[0];
        assert_eq!(c.classify(), SurfaceType::Cylinder);
        assert_eq!(c.num_borders(), 2);

        let torus = fixtures::torus(8, 6);
        let info = extract_components(&torus)[0].info();
        assert_eq!(info.euler_characteristic, 0);
        assert_eq!(info.surface, SurfaceType::Torus);
    }

    #[test]
    fn test_classify_table() {
        assert_eq!(SurfaceType::classify(-2, 0), SurfaceType::UnknownClosed);
        assert_eq!(SurfaceType::classify(0, 1), SurfaceType::UnknownOpen);
        assert_eq!(SurfaceType::classify(-1, 3), SurfaceType::UnknownOpen);
    }

    #[test]
    fn test_label_components() {
        let mut mesh = two_separate_triangles();
        assert_eq!(label_components(&mut mesh).unwrap(), 2);
        let labels: &[usize] = mesh.face_property(COMPONENT_PROPERTY).unwrap();
        assert_eq!(labels, &[0, 1]);
    }

    #[test]
    fn test_topology_info() {
        let info = topology_info(&fixtures::torus(8, 6));
        assert_eq!(info.components, 1);
        assert_eq!(info.genus, 1);
        assert_eq!(info.borders, 0);
        assert_eq!(info.non_manifold_vertices, 0);

        let info = topology_info(&two_separate_triangles());
        assert_eq!(info.components, 2);
        assert_eq!(info.borders, 2);
        assert_eq!(info.euler_characteristic, 2);
    }
}
