//! Halfedge mesh data structure.
//!
//! This module provides a halfedge (doubly-connected edge list) representation
//! for polygon meshes. All adjacency queries are O(1).
//!
//! # Structure
//!
//! - Each edge is split into two **halfedges** pointing in opposite directions,
//!   stored next to each other so that `opposite(h)` is `h ^ 1`
//! - Each halfedge stores its **target vertex**, the **next** and **previous**
//!   halfedges around its face (or border loop) and its **face**
//! - Each vertex stores one outgoing halfedge
//! - Each face stores one halfedge on its boundary
//!
//! # Boundary Handling
//!
//! Border halfedges have an invalid face handle and are linked into closed
//! loops through `next`/`prev`. The outgoing halfedge of a border vertex is
//! always a border halfedge, so `is_boundary_vertex` is O(1).
//!
//! # Deletion
//!
//! Deleting elements only marks them. Handle iterators (`vertex_ids`,
//! `face_ids`, ...) skip deleted elements, so they stay usable while edits are
//! in flight. [`HalfEdgeMesh::compact`] removes the marked elements and
//! renumbers handles; handles held across a `compact` call are invalidated.

use nalgebra::{Point3, Vector3};

use super::index::{EdgeId, FaceId, HalfEdgeId, MeshIndex, VertexId};
use super::property::{ElementKind, PropertyStore, PropertyValue};
use crate::error::{MeshError, Result};

/// A vertex in the halfedge mesh.
#[derive(Debug, Clone)]
pub struct Vertex<I: MeshIndex = u32> {
    /// The 3D position of this vertex.
    pub position: Point3<f64>,

    /// One outgoing halfedge, invalid for isolated vertices.
    /// For boundary vertices this is a boundary halfedge.
    pub halfedge: HalfEdgeId<I>,
}

impl<I: MeshIndex> Vertex<I> {
    /// Create a new isolated vertex at the given position.
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            halfedge: HalfEdgeId::invalid(),
        }
    }
}

/// A halfedge in the mesh.
#[derive(Debug, Clone, Copy)]
pub struct HalfEdge<I: MeshIndex = u32> {
    /// The vertex this halfedge points to.
    pub vertex: VertexId<I>,

    /// The next halfedge around the face or border loop.
    pub next: HalfEdgeId<I>,

    /// The previous halfedge around the face or border loop.
    pub prev: HalfEdgeId<I>,

    /// The incident face, invalid for boundary halfedges.
    pub face: FaceId<I>,
}

impl<I: MeshIndex> Default for HalfEdge<I> {
    fn default() -> Self {
        Self {
            vertex: VertexId::invalid(),
            next: HalfEdgeId::invalid(),
            prev: HalfEdgeId::invalid(),
            face: FaceId::invalid(),
        }
    }
}

/// A face in the halfedge mesh.
#[derive(Debug, Clone, Copy)]
pub struct Face<I: MeshIndex = u32> {
    /// One halfedge on the boundary of this face.
    pub halfedge: HalfEdgeId<I>,
}

impl<I: MeshIndex> Default for Face<I> {
    fn default() -> Self {
        Self {
            halfedge: HalfEdgeId::invalid(),
        }
    }
}

/// A halfedge polygon mesh.
///
/// The mesh owns its element arrays and all property arrays. Algorithms borrow
/// it for the duration of a call and never keep references to it.
#[derive(Debug, Clone)]
pub struct HalfEdgeMesh<I: MeshIndex = u32> {
    pub(crate) vertices: Vec<Vertex<I>>,
    pub(crate) halfedges: Vec<HalfEdge<I>>,
    pub(crate) faces: Vec<Face<I>>,

    pub(crate) vertex_deleted: Vec<bool>,
    pub(crate) edge_deleted: Vec<bool>,
    pub(crate) face_deleted: Vec<bool>,

    pub(crate) deleted_vertices: usize,
    pub(crate) deleted_edges: usize,
    pub(crate) deleted_faces: usize,

    pub(crate) properties: PropertyStore,
}

impl<I: MeshIndex> Default for HalfEdgeMesh<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MeshIndex> HalfEdgeMesh<I> {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            halfedges: Vec::new(),
            faces: Vec::new(),
            vertex_deleted: Vec::new(),
            edge_deleted: Vec::new(),
            face_deleted: Vec::new(),
            deleted_vertices: 0,
            deleted_edges: 0,
            deleted_faces: 0,
            properties: PropertyStore::new(),
        }
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(num_vertices: usize, num_faces: usize) -> Self {
        // Closed triangle meshes have E = 3F/2 edges
        let num_edges = num_faces * 3 / 2 + num_faces / 4;
        let mut mesh = Self::new();
        mesh.vertices.reserve(num_vertices);
        mesh.vertex_deleted.reserve(num_vertices);
        mesh.halfedges.reserve(2 * num_edges);
        mesh.edge_deleted.reserve(num_edges);
        mesh.faces.reserve(num_faces);
        mesh.face_deleted.reserve(num_faces);
        mesh
    }

    /// Remove all elements and properties.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    // ==================== Counts ====================

    /// Number of live vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() - self.deleted_vertices
    }

    /// Number of live halfedges.
    #[inline]
    pub fn num_halfedges(&self) -> usize {
        2 * self.num_edges()
    }

    /// Number of live edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edge_deleted.len() - self.deleted_edges
    }

    /// Number of live faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len() - self.deleted_faces
    }

    /// Number of vertex slots, deleted ones included. Per-vertex arrays are sized by this.
    #[inline]
    pub fn vertex_slots(&self) -> usize {
        self.vertices.len()
    }

    /// Number of halfedge slots, deleted ones included.
    #[inline]
    pub fn halfedge_slots(&self) -> usize {
        self.halfedges.len()
    }

    /// Number of edge slots, deleted ones included.
    #[inline]
    pub fn edge_slots(&self) -> usize {
        self.edge_deleted.len()
    }

    /// Number of face slots, deleted ones included.
    #[inline]
    pub fn face_slots(&self) -> usize {
        self.faces.len()
    }

    /// Whether any element is marked deleted and awaits [`compact`](Self::compact).
    pub fn has_garbage(&self) -> bool {
        self.deleted_vertices + self.deleted_edges + self.deleted_faces > 0
    }

    /// Check if the mesh has no vertices.
    pub fn is_empty(&self) -> bool {
        self.num_vertices() == 0
    }

    // ==================== Element access ====================

    /// Get a vertex by handle.
    #[inline]
    pub fn vertex(&self, id: VertexId<I>) -> &Vertex<I> {
        &self.vertices[id.index()]
    }

    /// Get a halfedge by handle.
    #[inline]
    pub fn halfedge(&self, id: HalfEdgeId<I>) -> &HalfEdge<I> {
        &self.halfedges[id.index()]
    }

    /// Get a face by handle.
    #[inline]
    pub fn face(&self, id: FaceId<I>) -> &Face<I> {
        &self.faces[id.index()]
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId<I>) -> &Point3<f64> {
        &self.vertices[v.index()].position
    }

    /// Set the position of a vertex.
    #[inline]
    pub fn set_position(&mut self, v: VertexId<I>, pos: Point3<f64>) {
        self.vertices[v.index()].position = pos;
    }

    /// Positions of all vertex slots (deleted slots included).
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    /// Whether the vertex is marked deleted.
    #[inline]
    pub fn is_deleted_vertex(&self, v: VertexId<I>) -> bool {
        self.vertex_deleted[v.index()]
    }

    /// Whether the edge is marked deleted.
    #[inline]
    pub fn is_deleted_edge(&self, e: EdgeId<I>) -> bool {
        self.edge_deleted[e.index()]
    }

    /// Whether the face is marked deleted.
    #[inline]
    pub fn is_deleted_face(&self, f: FaceId<I>) -> bool {
        self.face_deleted[f.index()]
    }

    // ==================== Connectivity ====================

    /// The vertex a halfedge points to.
    #[inline]
    pub fn target(&self, h: HalfEdgeId<I>) -> VertexId<I> {
        self.halfedges[h.index()].vertex
    }

    /// The vertex a halfedge starts from.
    #[inline]
    pub fn source(&self, h: HalfEdgeId<I>) -> VertexId<I> {
        self.target(h.opposite())
    }

    /// The opposite halfedge.
    #[inline]
    pub fn opposite(&self, h: HalfEdgeId<I>) -> HalfEdgeId<I> {
        h.opposite()
    }

    /// The next halfedge around the face or border loop.
    #[inline]
    pub fn next(&self, h: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.halfedges[h.index()].next
    }

    /// The previous halfedge around the face or border loop.
    #[inline]
    pub fn prev(&self, h: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.halfedges[h.index()].prev
    }

    /// The face of a halfedge (invalid on the boundary).
    #[inline]
    pub fn face_of(&self, h: HalfEdgeId<I>) -> FaceId<I> {
        self.halfedges[h.index()].face
    }

    /// The outgoing halfedge of a vertex (invalid if isolated).
    #[inline]
    pub fn vertex_halfedge(&self, v: VertexId<I>) -> HalfEdgeId<I> {
        self.vertices[v.index()].halfedge
    }

    /// One halfedge of a face.
    #[inline]
    pub fn face_halfedge(&self, f: FaceId<I>) -> HalfEdgeId<I> {
        self.faces[f.index()].halfedge
    }

    /// One of the two halfedges of an edge.
    #[inline]
    pub fn edge_halfedge(&self, e: EdgeId<I>, side: usize) -> HalfEdgeId<I> {
        e.halfedge(side)
    }

    /// Rotate counter-clockwise around the source vertex of `h`.
    #[inline]
    pub fn ccw_rotated_halfedge(&self, h: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.prev(h).opposite()
    }

    /// Rotate clockwise around the source vertex of `h`.
    #[inline]
    pub fn cw_rotated_halfedge(&self, h: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.next(h.opposite())
    }

    /// Find the halfedge from `start` to `end`.
    pub fn find_halfedge(&self, start: VertexId<I>, end: VertexId<I>) -> Option<HalfEdgeId<I>> {
        self.vertex_halfedges(start).find(|&h| self.target(h) == end)
    }

    /// Find the edge between two vertices.
    pub fn find_edge(&self, a: VertexId<I>, b: VertexId<I>) -> Option<EdgeId<I>> {
        self.find_halfedge(a, b).map(HalfEdgeId::edge)
    }

    // ==================== Boundary & manifoldness ====================

    /// Check if a halfedge is on the boundary (has no face).
    #[inline]
    pub fn is_boundary_halfedge(&self, h: HalfEdgeId<I>) -> bool {
        !self.face_of(h).is_valid()
    }

    /// Check if an edge is on the boundary.
    #[inline]
    pub fn is_boundary_edge(&self, e: EdgeId<I>) -> bool {
        self.is_boundary_halfedge(e.halfedge(0)) || self.is_boundary_halfedge(e.halfedge(1))
    }

    /// Check if a vertex is on the boundary. Isolated vertices count as boundary.
    #[inline]
    pub fn is_boundary_vertex(&self, v: VertexId<I>) -> bool {
        let h = self.vertex_halfedge(v);
        !(h.is_valid() && self.face_of(h).is_valid())
    }

    /// Check if a face touches the boundary with one of its edges.
    pub fn is_boundary_face(&self, f: FaceId<I>) -> bool {
        self.face_halfedges(f)
            .any(|h| self.is_boundary_halfedge(h.opposite()))
    }

    /// Check if a vertex has no incident edges.
    #[inline]
    pub fn is_isolated(&self, v: VertexId<I>) -> bool {
        !self.vertex_halfedge(v).is_valid()
    }

    /// Check if the faces around a vertex form a single fan.
    ///
    /// A vertex whose fan has two or more boundary gaps is non-manifold.
    pub fn is_manifold(&self, v: VertexId<I>) -> bool {
        self.vertex_halfedges(v)
            .filter(|&h| self.is_boundary_halfedge(h))
            .count()
            < 2
    }

    /// Check if the mesh has no boundary edges.
    pub fn is_closed(&self) -> bool {
        self.edge_ids().all(|e| !self.is_boundary_edge(e))
    }

    /// Check if every face is a triangle.
    pub fn is_triangle_mesh(&self) -> bool {
        self.face_ids().all(|f| self.face_degree(f) == 3)
    }

    /// Check if every face is a quad.
    pub fn is_quad_mesh(&self) -> bool {
        self.face_ids().all(|f| self.face_degree(f) == 4)
    }

    // ==================== Iteration ====================

    /// Iterate over live vertex handles.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        (0..self.vertices.len())
            .filter(move |&i| !self.vertex_deleted[i])
            .map(VertexId::new)
    }

    /// Iterate over live halfedge handles.
    pub fn halfedge_ids(&self) -> impl Iterator<Item = HalfEdgeId<I>> + '_ {
        (0..self.halfedges.len())
            .filter(move |&i| !self.edge_deleted[i >> 1])
            .map(HalfEdgeId::new)
    }

    /// Iterate over live edge handles.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId<I>> + '_ {
        (0..self.edge_deleted.len())
            .filter(move |&i| !self.edge_deleted[i])
            .map(EdgeId::new)
    }

    /// Iterate over live face handles.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId<I>> + '_ {
        (0..self.faces.len())
            .filter(move |&i| !self.face_deleted[i])
            .map(FaceId::new)
    }

    /// Iterate over the outgoing halfedges of a vertex (clockwise).
    pub fn vertex_halfedges(&self, v: VertexId<I>) -> VertexHalfEdgeIter<'_, I> {
        VertexHalfEdgeIter::new(self, v)
    }

    /// Iterate over vertices adjacent to a vertex.
    pub fn vertex_neighbors(&self, v: VertexId<I>) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.vertex_halfedges(v).map(|h| self.target(h))
    }

    /// Iterate over faces incident to a vertex.
    pub fn vertex_faces(&self, v: VertexId<I>) -> impl Iterator<Item = FaceId<I>> + '_ {
        self.vertex_halfedges(v)
            .map(|h| self.face_of(h))
            .filter(|f| f.is_valid())
    }

    /// Iterate over the halfedges of a face.
    pub fn face_halfedges(&self, f: FaceId<I>) -> LoopIter<'_, I> {
        LoopIter::new(self, self.face_halfedge(f))
    }

    /// Iterate over the halfedges of the loop (face or border) containing `h`.
    pub fn loop_halfedges(&self, h: HalfEdgeId<I>) -> LoopIter<'_, I> {
        LoopIter::new(self, h)
    }

    /// Iterate over the vertices of a face, in order.
    pub fn face_vertices(&self, f: FaceId<I>) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.face_halfedges(f).map(|h| self.target(h))
    }

    /// Iterate over the faces sharing an edge with `f`.
    pub fn face_neighbors(&self, f: FaceId<I>) -> impl Iterator<Item = FaceId<I>> + '_ {
        self.face_halfedges(f)
            .map(|h| self.face_of(h.opposite()))
            .filter(|g| g.is_valid())
    }

    /// Get the three vertices of a triangular face.
    pub fn face_triangle(&self, f: FaceId<I>) -> [VertexId<I>; 3] {
        let h0 = self.face_halfedge(f);
        let h1 = self.next(h0);
        let h2 = self.next(h1);
        [self.target(h0), self.target(h1), self.target(h2)]
    }

    /// Get the positions of the three vertices of a triangular face.
    pub fn face_positions(&self, f: FaceId<I>) -> [Point3<f64>; 3] {
        let [v0, v1, v2] = self.face_triangle(f);
        [*self.position(v0), *self.position(v1), *self.position(v2)]
    }

    /// Number of edges around a face.
    pub fn face_degree(&self, f: FaceId<I>) -> usize {
        self.face_halfedges(f).count()
    }

    /// Number of edges incident to a vertex.
    pub fn valence(&self, v: VertexId<I>) -> usize {
        self.vertex_halfedges(v).count()
    }

    // ==================== Geometry ====================

    /// Area-scaled normal of a polygon (Newell's method); its length is twice the area.
    fn face_normal_scaled(&self, f: FaceId<I>) -> Vector3<f64> {
        let mut n = Vector3::zeros();
        for h in self.face_halfedges(f) {
            let p = self.position(self.source(h));
            let q = self.position(self.target(h));
            n.x += (p.y - q.y) * (p.z + q.z);
            n.y += (p.z - q.z) * (p.x + q.x);
            n.z += (p.x - q.x) * (p.y + q.y);
        }
        n
    }

    /// Unit normal of a face (zero for degenerate faces).
    pub fn face_normal(&self, f: FaceId<I>) -> Vector3<f64> {
        self.face_normal_scaled(f)
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    /// Area of a planar polygon face.
    pub fn face_area(&self, f: FaceId<I>) -> f64 {
        0.5 * self.face_normal_scaled(f).norm()
    }

    /// Average of the vertex positions of a face.
    pub fn face_centroid(&self, f: FaceId<I>) -> Point3<f64> {
        let mut sum = Vector3::zeros();
        let mut count = 0usize;
        for v in self.face_vertices(f) {
            sum += self.position(v).coords;
            count += 1;
        }
        Point3::from(sum / count.max(1) as f64)
    }

    /// Area-weighted vertex normal (zero for isolated vertices).
    pub fn vertex_normal(&self, v: VertexId<I>) -> Vector3<f64> {
        let mut normal = Vector3::zeros();
        for f in self.vertex_faces(v) {
            normal += self.face_normal_scaled(f);
        }
        normal
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    /// Vector from source to target of a halfedge.
    pub fn halfedge_vector(&self, h: HalfEdgeId<I>) -> Vector3<f64> {
        self.position(self.target(h)) - self.position(self.source(h))
    }

    /// Length of an edge.
    pub fn edge_length(&self, e: EdgeId<I>) -> f64 {
        self.halfedge_vector(e.halfedge(0)).norm()
    }

    /// Midpoint of an edge.
    pub fn edge_midpoint(&self, e: EdgeId<I>) -> Point3<f64> {
        let h = e.halfedge(0);
        let p0 = self.position(self.source(h));
        let p1 = self.position(self.target(h));
        Point3::from((p0.coords + p1.coords) * 0.5)
    }

    /// Mean length of all live edges (0 for meshes without edges).
    pub fn mean_edge_length(&self) -> f64 {
        let (sum, count) = self
            .edge_ids()
            .fold((0.0, 0usize), |(s, c), e| (s + self.edge_length(e), c + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Axis-aligned bounding box of the live vertices.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut ids = self.vertex_ids();
        let first = *self.position(ids.next()?);
        let mut min = first;
        let mut max = first;
        for v in ids {
            let p = self.position(v);
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Some((min, max))
    }

    /// Length of the bounding box diagonal.
    pub fn bounding_box_diagonal(&self) -> f64 {
        self.bounding_box()
            .map(|(min, max)| (max - min).norm())
            .unwrap_or(0.0)
    }

    /// Total surface area.
    pub fn surface_area(&self) -> f64 {
        self.face_ids().map(|f| self.face_area(f)).sum()
    }

    // ==================== Properties ====================

    /// The property store of this mesh.
    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    /// Mutable access to the property store.
    pub fn properties_mut(&mut self) -> &mut PropertyStore {
        &mut self.properties
    }

    /// Typed read access to a vertex property.
    pub fn vertex_property<T: PropertyValue>(&self, name: &str) -> Result<&[T]> {
        self.properties.get(ElementKind::Vertex, name)
    }

    /// Typed read access to an edge property.
    pub fn edge_property<T: PropertyValue>(&self, name: &str) -> Result<&[T]> {
        self.properties.get(ElementKind::Edge, name)
    }

    /// Typed read access to a face property.
    pub fn face_property<T: PropertyValue>(&self, name: &str) -> Result<&[T]> {
        self.properties.get(ElementKind::Face, name)
    }

    // ==================== Construction ====================

    /// Add a new isolated vertex and return its handle.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> VertexId<I> {
        let id = VertexId::new(self.vertices.len());
        self.vertices.push(Vertex::new(position));
        self.vertex_deleted.push(false);
        self.properties.push(ElementKind::Vertex);
        id
    }

    /// Allocate an edge from `start` to `end`; returns the halfedge `start -> end`.
    pub(crate) fn new_edge(&mut self, start: VertexId<I>, end: VertexId<I>) -> HalfEdgeId<I> {
        let h = HalfEdgeId::new(self.halfedges.len());
        self.halfedges.push(HalfEdge {
            vertex: end,
            ..HalfEdge::default()
        });
        self.halfedges.push(HalfEdge {
            vertex: start,
            ..HalfEdge::default()
        });
        self.edge_deleted.push(false);
        self.properties.push(ElementKind::HalfEdge);
        self.properties.push(ElementKind::HalfEdge);
        self.properties.push(ElementKind::Edge);
        h
    }

    pub(crate) fn new_face(&mut self) -> FaceId<I> {
        let f = FaceId::new(self.faces.len());
        self.faces.push(Face::default());
        self.face_deleted.push(false);
        self.properties.push(ElementKind::Face);
        f
    }

    #[inline]
    pub(crate) fn set_next(&mut self, h: HalfEdgeId<I>, next: HalfEdgeId<I>) {
        self.halfedges[h.index()].next = next;
        self.halfedges[next.index()].prev = h;
    }

    #[inline]
    pub(crate) fn set_target(&mut self, h: HalfEdgeId<I>, v: VertexId<I>) {
        self.halfedges[h.index()].vertex = v;
    }

    #[inline]
    pub(crate) fn set_face(&mut self, h: HalfEdgeId<I>, f: FaceId<I>) {
        self.halfedges[h.index()].face = f;
    }

    #[inline]
    pub(crate) fn set_vertex_halfedge(&mut self, v: VertexId<I>, h: HalfEdgeId<I>) {
        self.vertices[v.index()].halfedge = h;
    }

    #[inline]
    pub(crate) fn set_face_halfedge(&mut self, f: FaceId<I>, h: HalfEdgeId<I>) {
        self.faces[f.index()].halfedge = h;
    }

    /// Make the outgoing halfedge of `v` a boundary halfedge if one exists.
    pub(crate) fn adjust_outgoing_halfedge(&mut self, v: VertexId<I>) {
        let start = self.vertex_halfedge(v);
        if !start.is_valid() {
            return;
        }
        let mut h = start;
        loop {
            if self.is_boundary_halfedge(h) {
                self.set_vertex_halfedge(v, h);
                return;
            }
            h = self.cw_rotated_halfedge(h);
            if h == start {
                return;
            }
        }
    }

    /// Add a triangle.
    pub fn add_triangle(&mut self, v0: VertexId<I>, v1: VertexId<I>, v2: VertexId<I>) -> Result<FaceId<I>> {
        self.add_face(&[v0, v1, v2])
    }

    /// Add a quad.
    pub fn add_quad(
        &mut self,
        v0: VertexId<I>,
        v1: VertexId<I>,
        v2: VertexId<I>,
        v3: VertexId<I>,
    ) -> Result<FaceId<I>> {
        self.add_face(&[v0, v1, v2, v3])
    }

    /// Add a polygon face given its vertices in counter-clockwise order.
    ///
    /// Fails without modifying the mesh if the face would create a
    /// non-manifold vertex or edge ([`MeshError::TopologyViolation`]) or has
    /// fewer than three distinct vertices ([`MeshError::DegenerateInput`]).
    pub fn add_face(&mut self, vertices: &[VertexId<I>]) -> Result<FaceId<I>> {
        let n = vertices.len();
        if n < 3 {
            return Err(MeshError::degenerate(format!(
                "face needs at least 3 vertices, got {}",
                n
            )));
        }
        for (i, &v) in vertices.iter().enumerate() {
            if !v.is_valid() || v.index() >= self.vertices.len() || self.is_deleted_vertex(v) {
                return Err(MeshError::precondition(format!("{:?} is not a live vertex", v)));
            }
            if vertices[..i].contains(&v) {
                return Err(MeshError::degenerate(format!("{:?} repeats in face", v)));
            }
        }

        let mut halfedges = vec![HalfEdgeId::invalid(); n];
        let mut is_new = vec![false; n];
        let mut needs_adjust = vec![false; n];
        let mut next_cache: Vec<(HalfEdgeId<I>, HalfEdgeId<I>)> = Vec::with_capacity(3 * n);

        // Every vertex must be on the boundary and every existing edge must have a free side
        for i in 0..n {
            let ii = (i + 1) % n;
            if !self.is_boundary_vertex(vertices[i]) {
                return Err(MeshError::topology(
                    "add_face",
                    format!("complex vertex {:?}", vertices[i]),
                ));
            }
            match self.find_halfedge(vertices[i], vertices[ii]) {
                Some(h) => {
                    if !self.is_boundary_halfedge(h) {
                        return Err(MeshError::topology(
                            "add_face",
                            format!("complex edge {:?}-{:?}", vertices[i], vertices[ii]),
                        ));
                    }
                    halfedges[i] = h;
                }
                None => is_new[i] = true,
            }
        }

        // Re-link border patches so that consecutive existing halfedges become adjacent
        for i in 0..n {
            let ii = (i + 1) % n;
            if is_new[i] || is_new[ii] {
                continue;
            }
            let inner_prev = halfedges[i];
            let inner_next = halfedges[ii];
            if self.next(inner_prev) == inner_next {
                continue;
            }

            // Find a free gap around the shared vertex
            let outer_prev = inner_next.opposite();
            let mut boundary_prev = outer_prev;
            loop {
                boundary_prev = self.next(boundary_prev).opposite();
                if self.is_boundary_halfedge(boundary_prev) && boundary_prev != inner_prev {
                    break;
                }
                if boundary_prev == outer_prev {
                    return Err(MeshError::topology("add_face", "no free gap for patch re-linking"));
                }
            }
            let boundary_next = self.next(boundary_prev);
            if boundary_next == inner_next {
                return Err(MeshError::topology("add_face", "patch re-linking failed"));
            }

            let patch_start = self.next(inner_prev);
            let patch_end = self.prev(inner_next);
            next_cache.push((boundary_prev, patch_start));
            next_cache.push((patch_end, boundary_next));
            next_cache.push((inner_prev, inner_next));
        }

        // All checks passed; from here on the mesh is modified
        for i in 0..n {
            if is_new[i] {
                let ii = (i + 1) % n;
                halfedges[i] = self.new_edge(vertices[i], vertices[ii]);
            }
        }

        let f = self.new_face();
        self.set_face_halfedge(f, halfedges[n - 1]);

        for i in 0..n {
            let ii = (i + 1) % n;
            let v = vertices[ii];
            let inner_prev = halfedges[i];
            let inner_next = halfedges[ii];

            match (is_new[i], is_new[ii]) {
                (false, false) => {
                    needs_adjust[ii] = self.vertex_halfedge(v) == inner_next;
                }
                (prev_new, next_new) => {
                    let outer_prev = inner_next.opposite();
                    let outer_next = inner_prev.opposite();

                    if prev_new && !next_new {
                        let boundary_prev = self.prev(inner_next);
                        next_cache.push((boundary_prev, outer_next));
                        self.set_vertex_halfedge(v, outer_next);
                    } else if !prev_new && next_new {
                        let boundary_next = self.next(inner_prev);
                        next_cache.push((outer_prev, boundary_next));
                        self.set_vertex_halfedge(v, boundary_next);
                    } else if !self.vertex_halfedge(v).is_valid() {
                        self.set_vertex_halfedge(v, outer_next);
                        next_cache.push((outer_prev, outer_next));
                    } else {
                        let boundary_next = self.vertex_halfedge(v);
                        let boundary_prev = self.prev(boundary_next);
                        next_cache.push((boundary_prev, outer_next));
                        next_cache.push((outer_prev, boundary_next));
                    }

                    next_cache.push((inner_prev, inner_next));
                }
            }

            self.set_face(halfedges[i], f);
        }

        for (h, next) in next_cache {
            self.set_next(h, next);
        }

        for (i, &adjust) in needs_adjust.iter().enumerate() {
            if adjust {
                self.adjust_outgoing_halfedge(vertices[i]);
            }
        }

        Ok(f)
    }

    // ==================== Validation ====================

    /// Check that all connectivity of live elements is consistent.
    pub fn is_valid(&self) -> bool {
        for v in self.vertex_ids() {
            let h = self.vertex_halfedge(v);
            if h.is_valid() {
                if self.is_deleted_edge(h.edge()) || self.source(h) != v {
                    return false;
                }
                // A boundary vertex must expose a boundary halfedge
                if self.vertex_halfedges(v).any(|o| self.is_boundary_halfedge(o))
                    && !self.is_boundary_halfedge(h)
                {
                    return false;
                }
            }
        }

        for h in self.halfedge_ids() {
            let he = self.halfedge(h);
            if !he.next.is_valid() || !he.prev.is_valid() || !he.vertex.is_valid() {
                return false;
            }
            if self.prev(he.next) != h || self.next(he.prev) != h {
                return false;
            }
            if self.source(he.next) != he.vertex {
                return false;
            }
            if self.face_of(he.next) != he.face {
                return false;
            }
            if self.is_deleted_vertex(he.vertex) {
                return false;
            }
            if he.face.is_valid() && self.is_deleted_face(he.face) {
                return false;
            }
            if self.opposite(self.opposite(h)) != h {
                return false;
            }
        }

        for f in self.face_ids() {
            let h = self.face_halfedge(f);
            if !h.is_valid() || self.face_of(h) != f {
                return false;
            }
            // The face loop must close within the number of halfedges
            let mut steps = 0;
            let mut cur = h;
            loop {
                cur = self.next(cur);
                steps += 1;
                if cur == h {
                    break;
                }
                if steps > self.halfedges.len() {
                    return false;
                }
            }
        }

        true
    }
}

/// Iterator over the outgoing halfedges of a vertex.
pub struct VertexHalfEdgeIter<'a, I: MeshIndex = u32> {
    mesh: &'a HalfEdgeMesh<I>,
    start: HalfEdgeId<I>,
    current: HalfEdgeId<I>,
    done: bool,
}

impl<'a, I: MeshIndex> VertexHalfEdgeIter<'a, I> {
    fn new(mesh: &'a HalfEdgeMesh<I>, v: VertexId<I>) -> Self {
        let start = mesh.vertex_halfedge(v);
        Self {
            mesh,
            start,
            current: start,
            done: !start.is_valid(),
        }
    }
}

impl<'a, I: MeshIndex> Iterator for VertexHalfEdgeIter<'a, I> {
    type Item = HalfEdgeId<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current;
        self.current = self.mesh.cw_rotated_halfedge(self.current);
        if self.current == self.start {
            self.done = true;
        }

        Some(result)
    }
}

/// Iterator over the halfedges of a face or border loop.
pub struct LoopIter<'a, I: MeshIndex = u32> {
    mesh: &'a HalfEdgeMesh<I>,
    start: HalfEdgeId<I>,
    current: HalfEdgeId<I>,
    done: bool,
}

impl<'a, I: MeshIndex> LoopIter<'a, I> {
    fn new(mesh: &'a HalfEdgeMesh<I>, start: HalfEdgeId<I>) -> Self {
        Self {
            mesh,
            start,
            current: start,
            done: !start.is_valid(),
        }
    }
}

impl<'a, I: MeshIndex> Iterator for LoopIter<'a, I> {
    type Item = HalfEdgeId<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current;
        self.current = self.mesh.next(self.current);
        if self.current == self.start {
            self.done = true;
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_mesh() {
        let mesh = HalfEdgeMesh::<u32>::new();
        assert_eq!(mesh.num_vertices(), 0);
        assert_eq!(mesh.num_halfedges(), 0);
        assert_eq!(mesh.num_faces(), 0);
        assert!(mesh.is_valid());
        assert!(mesh.bounding_box().is_none());
    }

    #[test]
    fn test_single_triangle() {
        let mut mesh = HalfEdgeMesh::<u32>::new();
        let v0 = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let v1 = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        let v2 = mesh.add_vertex(Point3::new(0.0, 1.0, 0.0));
        let f = mesh.add_triangle(v0, v1, v2).unwrap();

        assert_eq!(mesh.num_edges(), 3);
        assert_eq!(mesh.num_faces(), 1);
        assert!(mesh.is_valid());
        assert_relative_eq!(mesh.face_area(f), 0.5, epsilon = 1e-12);
        assert_relative_eq!(mesh.face_normal(f).z, 1.0, epsilon = 1e-12);
        for v in mesh.vertex_ids() {
            assert!(mesh.is_boundary_vertex(v));
            assert!(mesh.is_boundary_halfedge(mesh.vertex_halfedge(v)));
            assert!(mesh.is_manifold(v));
        }
        let verts: Vec<_> = mesh.face_vertices(f).collect();
        assert_eq!(verts.len(), 3);
        assert!(verts.contains(&v0) && verts.contains(&v1) && verts.contains(&v2));
    }

    #[test]
    fn test_add_face_rejects_complex_edge() {
        let mut mesh = HalfEdgeMesh::<u32>::new();
        let v: Vec<_> = (0..4)
            .map(|i| mesh.add_vertex(Point3::new(i as f64, (i % 2) as f64, 0.0)))
            .collect();
        mesh.add_triangle(v[0], v[1], v[2]).unwrap();
        let edges_before = mesh.num_edges();

        // Same orientation on the shared edge 0->1 makes it non-manifold
        let err = mesh.add_triangle(v[0], v[1], v[3]).unwrap_err();
        assert!(err.is_topology_violation());
        assert_eq!(mesh.num_edges(), edges_before);
        assert_eq!(mesh.num_faces(), 1);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_add_face_rejects_degenerate() {
        let mut mesh = HalfEdgeMesh::<u32>::new();
        let a = mesh.add_vertex(Point3::origin());
        let b = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        assert!(matches!(
            mesh.add_face(&[a, b]),
            Err(MeshError::DegenerateInput(_))
        ));
        assert!(matches!(
            mesh.add_face(&[a, b, a]),
            Err(MeshError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_closed_mesh_queries() {
        let mesh = fixtures::tetrahedron();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_edges(), 6);
        assert_eq!(mesh.num_faces(), 4);
        assert!(mesh.is_valid());
        assert!(mesh.is_closed());
        assert!(mesh.is_triangle_mesh());
        for v in mesh.vertex_ids() {
            assert!(!mesh.is_boundary_vertex(v));
            assert_eq!(mesh.valence(v), 3);
            for h in mesh.vertex_halfedges(v) {
                assert_eq!(mesh.source(h), v);
            }
        }
    }

    #[test]
    fn test_fan_around_shared_vertex_relinks() {
        // Faces added in an order that leaves the centre vertex with two gaps,
        // then closes them.
        let mut mesh = HalfEdgeMesh::<u32>::new();
        let c = mesh.add_vertex(Point3::origin());
        let ring: Vec<_> = (0..6)
            .map(|i| {
                let a = i as f64 * std::f64::consts::PI / 3.0;
                mesh.add_vertex(Point3::new(a.cos(), a.sin(), 0.0))
            })
            .collect();
        for &i in &[0usize, 3, 1, 4, 2, 5] {
            mesh.add_triangle(c, ring[i], ring[(i + 1) % 6]).unwrap();
        }
        assert!(mesh.is_valid());
        assert!(!mesh.is_boundary_vertex(c));
        assert!(mesh.is_manifold(c));
        assert_eq!(mesh.valence(c), 6);
    }

    #[test]
    fn test_non_manifold_vertex_detected() {
        // Two triangles sharing only a vertex
        let mut mesh = HalfEdgeMesh::<u32>::new();
        let c = mesh.add_vertex(Point3::origin());
        let a = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        let b = mesh.add_vertex(Point3::new(1.0, 1.0, 0.0));
        let d = mesh.add_vertex(Point3::new(-1.0, 0.0, 0.0));
        let e = mesh.add_vertex(Point3::new(-1.0, -1.0, 0.0));
        mesh.add_triangle(c, a, b).unwrap();
        mesh.add_triangle(c, d, e).unwrap();
        assert!(mesh.is_valid());
        assert!(!mesh.is_manifold(c));
        assert!(mesh.is_manifold(a));
    }

    #[test]
    fn test_quad_geometry() {
        let mesh = fixtures::cube();
        assert!(mesh.is_quad_mesh());
        for f in mesh.face_ids() {
            assert_relative_eq!(mesh.face_area(f), 1.0, epsilon = 1e-12);
            assert_relative_eq!(mesh.face_normal(f).norm(), 1.0, epsilon = 1e-12);
        }
        assert_relative_eq!(mesh.surface_area(), 6.0, epsilon = 1e-12);
        assert_relative_eq!(mesh.mean_edge_length(), 1.0, epsilon = 1e-12);
    }
}
