//! Local topological edits and garbage collection.
//!
//! Every edit runs all of its checks before the first write, so a rejected
//! edit leaves the mesh exactly as it was.
//!
//! Iteration safety: `split_edge`, `insert_edge` and `flip_edge` only append or relink
//! elements. `collapse_edge`, `delete_*` mark elements as deleted; live handle
//! iterators skip them. `compact` renumbers every handle.

use nalgebra::Point3;

use super::halfedge::HalfEdgeMesh;
use super::index::{EdgeId, FaceId, HalfEdgeId, MeshIndex, VertexId};
use super::property::ElementKind;
use crate::error::{MeshError, Result};

impl<I: MeshIndex> HalfEdgeMesh<I> {
    fn check_live_edge(&self, operation: &'static str, e: EdgeId<I>) -> Result<()> {
        if !e.is_valid() || e.index() >= self.edge_slots() || self.is_deleted_edge(e) {
            return Err(MeshError::topology(operation, format!("{:?} is not a live edge", e)));
        }
        Ok(())
    }

    fn is_triangle_side(&self, h: HalfEdgeId<I>) -> bool {
        self.is_boundary_halfedge(h) || self.next(self.next(self.next(h))) == h
    }

    // ==================== Flip ====================

    /// Whether flipping `e` keeps the mesh a manifold triangle mesh.
    pub fn is_flip_ok(&self, e: EdgeId<I>) -> bool {
        if self.check_live_edge("flip_edge", e).is_err() || self.is_boundary_edge(e) {
            return false;
        }
        let h0 = e.halfedge(0);
        let h1 = e.halfedge(1);
        if !self.is_triangle_side(h0) || !self.is_triangle_side(h1) {
            return false;
        }

        let v0 = self.target(self.next(h0));
        let v1 = self.target(self.next(h1));
        if v0 == v1 {
            return false;
        }
        // The flipped edge must not already exist
        self.find_halfedge(v0, v1).is_none()
    }

    /// Flip an interior edge shared by two triangles.
    pub fn flip_edge(&mut self, e: EdgeId<I>) -> Result<()> {
        if !self.is_flip_ok(e) {
            return Err(MeshError::topology("flip_edge", format!("{:?} cannot be flipped", e)));
        }

        let a0 = e.halfedge(0);
        let b0 = e.halfedge(1);
        let a1 = self.next(a0);
        let a2 = self.next(a1);
        let b1 = self.next(b0);
        let b2 = self.next(b1);

        let va0 = self.target(a0);
        let va1 = self.target(a1);
        let vb0 = self.target(b0);
        let vb1 = self.target(b1);

        let fa = self.face_of(a0);
        let fb = self.face_of(b0);

        self.set_target(a0, va1);
        self.set_target(b0, vb1);

        self.set_next(a0, a2);
        self.set_next(a2, b1);
        self.set_next(b1, a0);

        self.set_next(b0, b2);
        self.set_next(b2, a1);
        self.set_next(a1, b0);

        self.set_face(a1, fb);
        self.set_face(b1, fa);

        self.set_face_halfedge(fa, a0);
        self.set_face_halfedge(fb, b0);

        if self.vertex_halfedge(va0) == b0 {
            self.set_vertex_halfedge(va0, a1);
        }
        if self.vertex_halfedge(vb0) == a0 {
            self.set_vertex_halfedge(vb0, b1);
        }

        Ok(())
    }

    // ==================== Split ====================

    /// Split an edge of a triangle mesh at `position`.
    ///
    /// The new vertex is connected to the opposite corner of each incident
    /// triangle. Returns the new vertex.
    pub fn split_edge(&mut self, e: EdgeId<I>, position: Point3<f64>) -> Result<VertexId<I>> {
        self.check_live_edge("split_edge", e)?;
        let h0 = e.halfedge(0);
        let o0 = e.halfedge(1);
        if !self.is_triangle_side(h0) || !self.is_triangle_side(o0) {
            return Err(MeshError::precondition("split_edge needs triangles on both sides"));
        }

        let v = self.add_vertex(position);
        let v2 = self.target(o0);

        let e1 = self.new_edge(v, v2);
        let t1 = e1.opposite();

        let f0 = self.face_of(h0);
        let f3 = self.face_of(o0);

        self.set_vertex_halfedge(v, h0);
        self.set_target(o0, v);

        if !self.is_boundary_halfedge(h0) {
            let h1 = self.next(h0);
            let h2 = self.next(h1);
            let v1 = self.target(h1);

            let e0 = self.new_edge(v, v1);
            let t0 = e0.opposite();

            let f1 = self.new_face();
            self.set_face_halfedge(f0, h0);
            self.set_face_halfedge(f1, h2);

            self.set_face(h1, f0);
            self.set_face(t0, f0);
            self.set_face(h0, f0);

            self.set_face(h2, f1);
            self.set_face(t1, f1);
            self.set_face(e0, f1);

            self.set_next(h0, h1);
            self.set_next(h1, t0);
            self.set_next(t0, h0);

            self.set_next(e0, h2);
            self.set_next(h2, t1);
            self.set_next(t1, e0);
        } else {
            let prev = self.prev(h0);
            self.set_next(prev, t1);
            self.set_next(t1, h0);
        }

        if !self.is_boundary_halfedge(o0) {
            let o1 = self.next(o0);
            let o2 = self.next(o1);
            let v3 = self.target(o1);

            let e2 = self.new_edge(v, v3);
            let t2 = e2.opposite();

            let f2 = self.new_face();
            self.set_face_halfedge(f2, o1);
            self.set_face_halfedge(f3, o0);

            self.set_face(o1, f2);
            self.set_face(t2, f2);
            self.set_face(e1, f2);

            self.set_face(o2, f3);
            self.set_face(o0, f3);
            self.set_face(e2, f3);

            self.set_next(e1, o1);
            self.set_next(o1, t2);
            self.set_next(t2, e1);

            self.set_next(o0, e2);
            self.set_next(e2, o2);
            self.set_next(o2, o0);
        } else {
            let next = self.next(o0);
            self.set_next(e1, next);
            self.set_next(o0, e1);
            self.set_vertex_halfedge(v, e1);
        }

        if self.vertex_halfedge(v2) == h0 {
            self.set_vertex_halfedge(v2, t1);
        }

        Ok(v)
    }

    /// Split the face shared by `h0` and `h1` with a new edge from
    /// `target(h0)` to `target(h1)`.
    ///
    /// The face keeps the part that starts at `h0`; the part that starts at
    /// `h1` becomes a new face. Returns the new halfedge
    /// `target(h0) -> target(h1)`.
    pub fn insert_edge(&mut self, h0: HalfEdgeId<I>, h1: HalfEdgeId<I>) -> Result<HalfEdgeId<I>> {
        for h in [h0, h1] {
            if !h.is_valid() || h.index() >= self.halfedge_slots() || self.is_deleted_edge(h.edge()) {
                return Err(MeshError::topology("insert_edge", format!("{:?} is not a live halfedge", h)));
            }
        }
        let f0 = self.face_of(h0);
        if !f0.is_valid() || self.face_of(h1) != f0 {
            return Err(MeshError::topology("insert_edge", "halfedges do not share a face"));
        }
        if h0 == h1 || self.next(h0) == h1 || self.next(h1) == h0 {
            return Err(MeshError::topology("insert_edge", "halfedges are adjacent"));
        }
        let v0 = self.target(h0);
        let v1 = self.target(h1);
        if self.find_halfedge(v0, v1).is_some() {
            return Err(MeshError::topology(
                "insert_edge",
                format!("edge {:?}-{:?} already exists", v0, v1),
            ));
        }

        let h2 = self.next(h0);
        let h3 = self.next(h1);
        let h4 = self.new_edge(v0, v1);
        let h5 = h4.opposite();
        let f1 = self.new_face();

        self.set_face_halfedge(f0, h0);
        self.set_face_halfedge(f1, h1);
        self.set_next(h0, h4);
        self.set_next(h4, h3);
        self.set_face(h4, f0);
        self.set_next(h1, h5);
        self.set_next(h5, h2);

        let mut h = h2;
        loop {
            self.set_face(h, f1);
            h = self.next(h);
            if h == h2 {
                break;
            }
        }
        Ok(h4)
    }

    // ==================== Collapse ====================

    /// Whether collapsing `h` (moving its source into its target) keeps the
    /// mesh a manifold triangle mesh.
    pub fn is_collapse_ok(&self, h: HalfEdgeId<I>) -> bool {
        if self.check_live_edge("collapse_edge", h.edge()).is_err() {
            return false;
        }
        let v0v1 = h;
        let v1v0 = h.opposite();
        if !self.is_triangle_side(v0v1) || !self.is_triangle_side(v1v0) {
            return false;
        }
        let v0 = self.target(v1v0);
        let v1 = self.target(v0v1);

        let mut vl = VertexId::invalid();
        let mut vr = VertexId::invalid();

        // The edges v1-vl and vl-v0 must not both be boundary edges
        if !self.is_boundary_halfedge(v0v1) {
            let h1 = self.next(v0v1);
            let h2 = self.next(h1);
            vl = self.target(h1);
            if self.is_boundary_halfedge(h1.opposite()) && self.is_boundary_halfedge(h2.opposite()) {
                return false;
            }
        }

        // The edges v0-vr and vr-v1 must not both be boundary edges
        if !self.is_boundary_halfedge(v1v0) {
            let h1 = self.next(v1v0);
            let h2 = self.next(h1);
            vr = self.target(h1);
            if self.is_boundary_halfedge(h1.opposite()) && self.is_boundary_halfedge(h2.opposite()) {
                return false;
            }
        }

        if vl == vr {
            return false;
        }

        // Interior corners left with valence 2 would produce a doubled triangle
        for x in [vl, vr] {
            if x.is_valid() && !self.is_boundary_vertex(x) && self.valence(x) <= 3 {
                return false;
            }
        }

        // An edge between two boundary vertices must itself be a boundary edge
        if self.is_boundary_vertex(v0)
            && self.is_boundary_vertex(v1)
            && !self.is_boundary_halfedge(v0v1)
            && !self.is_boundary_halfedge(v1v0)
        {
            return false;
        }

        // Link condition: the one-rings of v0 and v1 may only share vl and vr
        for vv in self.vertex_neighbors(v0) {
            if vv != v1 && vv != vl && vv != vr && self.find_halfedge(vv, v1).is_some() {
                return false;
            }
        }

        true
    }

    /// Collapse halfedge `h`: its source vertex is removed and merged into its
    /// target, which keeps its position. Returns the surviving vertex.
    pub fn collapse_edge(&mut self, h: HalfEdgeId<I>) -> Result<VertexId<I>> {
        if !self.is_collapse_ok(h) {
            return Err(MeshError::topology(
                "collapse_edge",
                format!("collapsing {:?} would break manifoldness", h),
            ));
        }

        let h0 = h;
        let h1 = self.prev(h0);
        let o0 = h0.opposite();
        let o1 = self.next(o0);
        let survivor = self.target(h0);

        self.remove_edge_helper(h0);

        if self.next(self.next(h1)) == h1 {
            self.remove_loop_helper(h1);
        }
        if self.next(self.next(o1)) == o1 {
            self.remove_loop_helper(o1);
        }

        Ok(survivor)
    }

    fn remove_edge_helper(&mut self, h: HalfEdgeId<I>) {
        let hn = self.next(h);
        let hp = self.prev(h);

        let o = h.opposite();
        let on = self.next(o);
        let op = self.prev(o);

        let fh = self.face_of(h);
        let fo = self.face_of(o);

        let vh = self.target(h);
        let vo = self.target(o);

        let incoming: Vec<HalfEdgeId<I>> =
            self.vertex_halfedges(vo).map(|hc| hc.opposite()).collect();
        for hc in incoming {
            self.set_target(hc, vh);
        }

        self.set_next(hp, hn);
        self.set_next(op, on);

        if fh.is_valid() {
            self.set_face_halfedge(fh, hn);
        }
        if fo.is_valid() {
            self.set_face_halfedge(fo, on);
        }

        if self.vertex_halfedge(vh) == o {
            self.set_vertex_halfedge(vh, hn);
        }
        self.adjust_outgoing_halfedge(vh);
        self.set_vertex_halfedge(vo, HalfEdgeId::invalid());

        self.mark_vertex_deleted(vo);
        self.mark_edge_deleted(h.edge());
    }

    fn remove_loop_helper(&mut self, h: HalfEdgeId<I>) {
        let h0 = h;
        let h1 = self.next(h0);

        let o0 = h0.opposite();
        let o1 = h1.opposite();

        let v0 = self.target(h0);
        let v1 = self.target(h1);

        let fh = self.face_of(h0);
        let fo = self.face_of(o0);

        debug_assert!(self.next(h1) == h0 && h1 != o0);

        let o0_next = self.next(o0);
        let o0_prev = self.prev(o0);
        self.set_next(h1, o0_next);
        self.set_next(o0_prev, h1);

        self.set_face(h1, fo);

        self.set_vertex_halfedge(v0, h1);
        self.adjust_outgoing_halfedge(v0);
        self.set_vertex_halfedge(v1, o1);
        self.adjust_outgoing_halfedge(v1);

        if fo.is_valid() && self.face_halfedge(fo) == o0 {
            self.set_face_halfedge(fo, h1);
        }

        if fh.is_valid() {
            self.mark_face_deleted(fh);
        }
        self.mark_edge_deleted(h0.edge());
    }

    // ==================== Deletion ====================

    fn mark_vertex_deleted(&mut self, v: VertexId<I>) {
        if !self.vertex_deleted[v.index()] {
            self.vertex_deleted[v.index()] = true;
            self.deleted_vertices += 1;
        }
    }

    fn mark_edge_deleted(&mut self, e: EdgeId<I>) {
        if !self.edge_deleted[e.index()] {
            self.edge_deleted[e.index()] = true;
            self.deleted_edges += 1;
        }
    }

    fn mark_face_deleted(&mut self, f: FaceId<I>) {
        if !self.face_deleted[f.index()] {
            self.face_deleted[f.index()] = true;
            self.deleted_faces += 1;
        }
    }

    /// Delete a face. Edges left without faces and vertices left without
    /// edges are deleted as well.
    ///
    /// Removing a face can leave a vertex with two boundary gaps; such
    /// vertices are reported by [`is_manifold`](Self::is_manifold).
    pub fn delete_face(&mut self, f: FaceId<I>) -> Result<()> {
        if !f.is_valid() || f.index() >= self.face_slots() || self.is_deleted_face(f) {
            return Err(MeshError::precondition(format!("{:?} is not a live face", f)));
        }
        self.mark_face_deleted(f);

        let mut dead_edges = Vec::new();
        let mut touched = Vec::new();
        let loop_halfedges: Vec<HalfEdgeId<I>> = self.face_halfedges(f).collect();
        for &hc in &loop_halfedges {
            self.set_face(hc, FaceId::invalid());
            if self.is_boundary_halfedge(hc.opposite()) {
                dead_edges.push(hc.edge());
            }
            touched.push(self.target(hc));
        }

        for e in dead_edges {
            let h0 = e.halfedge(0);
            let v0 = self.target(h0);
            let next0 = self.next(h0);
            let prev0 = self.prev(h0);

            let h1 = e.halfedge(1);
            let v1 = self.target(h1);
            let next1 = self.next(h1);
            let prev1 = self.prev(h1);

            self.set_next(prev0, next1);
            self.set_next(prev1, next0);

            self.mark_edge_deleted(e);

            if self.vertex_halfedge(v0) == h1 {
                if next0 == h1 {
                    self.mark_vertex_deleted(v0);
                    self.set_vertex_halfedge(v0, HalfEdgeId::invalid());
                } else {
                    self.set_vertex_halfedge(v0, next0);
                }
            }

            if self.vertex_halfedge(v1) == h0 {
                if next1 == h0 {
                    self.mark_vertex_deleted(v1);
                    self.set_vertex_halfedge(v1, HalfEdgeId::invalid());
                } else {
                    self.set_vertex_halfedge(v1, next1);
                }
            }
        }

        for v in touched {
            if !self.is_deleted_vertex(v) {
                self.adjust_outgoing_halfedge(v);
            }
        }

        Ok(())
    }

    /// Delete all faces incident to a vertex, then the vertex itself.
    pub fn delete_vertex(&mut self, v: VertexId<I>) -> Result<()> {
        if !v.is_valid() || v.index() >= self.vertex_slots() || self.is_deleted_vertex(v) {
            return Err(MeshError::precondition(format!("{:?} is not a live vertex", v)));
        }
        let faces: Vec<FaceId<I>> = self.vertex_faces(v).collect();
        for f in faces {
            self.delete_face(f)?;
        }
        // Deleting the faces removes v as soon as its last edge goes away;
        // isolated vertices (or dangling edges) are handled here.
        if !self.is_deleted_vertex(v) {
            if self.vertex_halfedge(v).is_valid() {
                return Err(MeshError::topology(
                    "delete_vertex",
                    format!("{:?} keeps edges without faces", v),
                ));
            }
            self.mark_vertex_deleted(v);
        }
        Ok(())
    }

    /// Delete the faces on both sides of an edge (and the edge with them).
    pub fn delete_edge(&mut self, e: EdgeId<I>) -> Result<()> {
        self.check_live_edge("delete_edge", e)?;
        let f0 = self.face_of(e.halfedge(0));
        let f1 = self.face_of(e.halfedge(1));
        if f0.is_valid() {
            self.delete_face(f0)?;
        }
        if f1.is_valid() {
            self.delete_face(f1)?;
        }
        Ok(())
    }

    // ==================== Garbage collection ====================

    /// Remove all deleted elements and renumber handles.
    ///
    /// Live elements keep their relative order, and property arrays are
    /// filtered alongside. Every handle obtained before this call is invalid
    /// afterwards.
    pub fn compact(&mut self) {
        if !self.has_garbage() {
            return;
        }

        let keep_vertex: Vec<bool> = self.vertex_deleted.iter().map(|&d| !d).collect();
        let keep_edge: Vec<bool> = self.edge_deleted.iter().map(|&d| !d).collect();
        let keep_halfedge: Vec<bool> = keep_edge.iter().flat_map(|&k| [k, k]).collect();
        let keep_face: Vec<bool> = self.face_deleted.iter().map(|&d| !d).collect();

        let vmap = remap_table(&keep_vertex);
        let hmap = remap_table(&keep_halfedge);
        let fmap = remap_table(&keep_face);

        let remap_v = |v: VertexId<I>| -> VertexId<I> {
            if v.is_valid() {
                VertexId::new(vmap[v.index()])
            } else {
                v
            }
        };
        let remap_h = |h: HalfEdgeId<I>| -> HalfEdgeId<I> {
            if h.is_valid() {
                HalfEdgeId::new(hmap[h.index()])
            } else {
                h
            }
        };
        let remap_f = |f: FaceId<I>| -> FaceId<I> {
            if f.is_valid() {
                FaceId::new(fmap[f.index()])
            } else {
                f
            }
        };

        let vertices = self
            .vertices
            .iter()
            .zip(&keep_vertex)
            .filter(|(_, &k)| k)
            .map(|(v, _)| {
                let mut v = v.clone();
                v.halfedge = remap_h(v.halfedge);
                v
            })
            .collect();

        let halfedges = self
            .halfedges
            .iter()
            .zip(&keep_halfedge)
            .filter(|(_, &k)| k)
            .map(|(h, _)| {
                let mut h = *h;
                h.vertex = remap_v(h.vertex);
                h.next = remap_h(h.next);
                h.prev = remap_h(h.prev);
                h.face = remap_f(h.face);
                h
            })
            .collect();

        let faces = self
            .faces
            .iter()
            .zip(&keep_face)
            .filter(|(_, &k)| k)
            .map(|(f, _)| {
                let mut f = *f;
                f.halfedge = remap_h(f.halfedge);
                f
            })
            .collect();

        self.vertices = vertices;
        self.halfedges = halfedges;
        self.faces = faces;

        self.properties.retain(ElementKind::Vertex, &keep_vertex);
        self.properties.retain(ElementKind::HalfEdge, &keep_halfedge);
        self.properties.retain(ElementKind::Edge, &keep_edge);
        self.properties.retain(ElementKind::Face, &keep_face);

        self.vertex_deleted = vec![false; self.vertices.len()];
        self.edge_deleted = vec![false; self.halfedges.len() / 2];
        self.face_deleted = vec![false; self.faces.len()];
        self.deleted_vertices = 0;
        self.deleted_edges = 0;
        self.deleted_faces = 0;

        log::debug!(
            "compacted mesh to {} vertices, {} edges, {} faces",
            self.vertices.len(),
            self.edge_deleted.len(),
            self.faces.len()
        );
    }
}

/// Old slot -> new slot for kept slots (removed slots map to `usize::MAX`).
fn remap_table(keep: &[bool]) -> Vec<usize> {
    let mut next = 0;
    keep.iter()
        .map(|&k| {
            if k {
                next += 1;
                next - 1
            } else {
                usize::MAX
            }
        })
        .collect()
}
