//! UV coordinate storage.
//!
//! This module provides the [`UVMap`] type for storing 2D parameterization
//! coordinates for mesh vertices, and its round trip through the
//! `"v:tex"` vertex property.

use std::marker::PhantomData;

use nalgebra::Point2;

use crate::error::Result;
use crate::mesh::{ElementKind, FaceId, HalfEdgeMesh, MeshIndex, VertexId};

/// Name of the vertex property holding texture coordinates.
pub const TEX_COORD_PROPERTY: &str = "v:tex";

/// UV coordinates for mesh vertices, indexed by vertex slot.
///
/// Parameterization results are normalized into the unit square, but the
/// map itself places no restriction on its values.
#[derive(Debug, Clone)]
pub struct UVMap<I: MeshIndex = u32> {
    coords: Vec<Point2<f64>>,
    _marker: PhantomData<I>,
}

impl<I: MeshIndex> UVMap<I> {
    /// Create a UV map from per-slot coordinates.
    pub fn new(coords: Vec<Point2<f64>>) -> Self {
        Self {
            coords,
            _marker: PhantomData,
        }
    }

    /// Create a UV map filled with zeros.
    pub fn zeros(n: usize) -> Self {
        Self::new(vec![Point2::origin(); n])
    }

    /// Read the coordinates stored in the mesh's `"v:tex"` property.
    pub fn from_mesh(mesh: &HalfEdgeMesh<I>) -> Result<Self> {
        Ok(Self::new(mesh.vertex_property::<Point2<f64>>(TEX_COORD_PROPERTY)?.to_vec()))
    }

    /// Store the coordinates as the mesh's `"v:tex"` property.
    pub fn store(&self, mesh: &mut HalfEdgeMesh<I>) -> Result<()> {
        mesh.properties_mut().set(
            ElementKind::Vertex,
            TEX_COORD_PROPERTY,
            self.coords.clone(),
            Point2::origin(),
        )
    }

    /// Get the UV coordinates for a vertex.
    #[inline]
    pub fn get(&self, v: VertexId<I>) -> Point2<f64> {
        self.coords[v.index()]
    }

    /// Set the UV coordinates for a vertex.
    #[inline]
    pub fn set(&mut self, v: VertexId<I>, uv: Point2<f64>) {
        self.coords[v.index()] = uv;
    }

    /// Number of vertex slots covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Raw coordinates.
    pub fn as_slice(&self) -> &[Point2<f64>] {
        &self.coords
    }

    /// Bounding box over the live vertices of `mesh`.
    pub fn bounding_box(&self, mesh: &HalfEdgeMesh<I>) -> Option<(Point2<f64>, Point2<f64>)> {
        let mut live = mesh.vertex_ids().map(|v| self.get(v));
        let first = live.next()?;
        Some(live.fold((first, first), |(min, max), uv| {
            (
                Point2::new(min.x.min(uv.x), min.y.min(uv.y)),
                Point2::new(max.x.max(uv.x), max.y.max(uv.y)),
            )
        }))
    }

    /// Translate and scale uniformly so the live vertices fit in [0, 1]²,
    /// keeping the aspect ratio.
    pub fn normalize(&mut self, mesh: &HalfEdgeMesh<I>) {
        if let Some((min, max)) = self.bounding_box(mesh) {
            let scale = (max.x - min.x).max(max.y - min.y);
            if scale > 1e-10 {
                for v in mesh.vertex_ids() {
                    let uv = self.get(v);
                    self.set(v, Point2::from((uv - min) / scale));
                }
            }
        }
    }

    /// Signed UV area of a triangle face; positive when the face keeps its
    /// orientation in the plane.
    pub fn signed_area(&self, mesh: &HalfEdgeMesh<I>, f: FaceId<I>) -> f64 {
        let [a, b, c] = mesh.face_triangle(f).map(|v| self.get(v));
        0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;

    #[test]
    fn test_uv_map_basic() {
        let mut uv_map: UVMap<u32> = UVMap::zeros(3);
        assert_eq!(uv_map.len(), 3);
        assert!(!uv_map.is_empty());

        let v1: VertexId<u32> = VertexId::new(1);
        uv_map.set(v1, Point2::new(1.0, 0.5));
        assert_eq!(uv_map.get(v1), Point2::new(1.0, 0.5));
        assert_eq!(uv_map.get(VertexId::new(0)), Point2::origin());
    }

    #[test]
    fn test_uv_map_normalize_keeps_aspect() {
        let mut mesh = fixtures::grid(2);
        let coords = mesh.positions().iter().map(|p| Point2::new(4.0 * p.x, 2.0 * p.y)).collect();
        let mut uv_map: UVMap = UVMap::new(coords);
        uv_map.normalize(&mesh);

        let (min, max) = uv_map.bounding_box(&mesh).unwrap();
        assert!((min.x).abs() < 1e-10 && (min.y).abs() < 1e-10);
        assert!((max.x - 1.0).abs() < 1e-10);
        assert!((max.y - 0.5).abs() < 1e-10);

        uv_map.store(&mut mesh).unwrap();
        let restored = UVMap::from_mesh(&mesh).unwrap();
        assert_eq!(restored.as_slice(), uv_map.as_slice());
    }

    #[test]
    fn test_signed_area() {
        let mesh = fixtures::grid(1);
        let uv_map: UVMap = UVMap::new(mesh.positions().iter().map(|p| Point2::new(p.x, p.y)).collect());
        for f in mesh.face_ids() {
            assert!((uv_map.signed_area(&mesh, f) - 0.5).abs() < 1e-12);
        }
        let mirrored: UVMap = UVMap::new(mesh.positions().iter().map(|p| Point2::new(-p.x, p.y)).collect());
        for f in mesh.face_ids() {
            assert!(mirrored.signed_area(&mesh, f) < 0.0);
        }
    }
}
