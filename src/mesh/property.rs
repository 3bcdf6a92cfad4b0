//! Named per-element properties.
//!
//! Every element kind owns a [`PropertyContainer`] of type-erased arrays, one
//! entry per element slot (deleted slots included until [`compact`] runs).
//! Arrays are keyed by name; the element type is checked on every typed access
//! and a mismatch is reported as [`MeshError::PreconditionUnmet`].
//!
//! Property lifetime is independent of element lifetime: arrays grow when
//! elements are added, are filtered by `compact`, and only disappear through an
//! explicit [`PropertyStore::remove`].
//!
//! [`compact`]: crate::mesh::HalfEdgeMesh::compact

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{MeshError, Result};

/// The element kinds a property can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    /// Per-vertex data.
    Vertex,
    /// Per-halfedge data.
    HalfEdge,
    /// Per-edge data.
    Edge,
    /// Per-face data.
    Face,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Vertex => "vertex",
            ElementKind::HalfEdge => "halfedge",
            ElementKind::Edge => "edge",
            ElementKind::Face => "face",
        };
        f.write_str(name)
    }
}

/// Values that can be stored in a property array.
pub trait PropertyValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> PropertyValue for T {}

trait PropertyArray: Send + Sync {
    fn len(&self) -> usize;
    fn push_default(&mut self);
    fn retain_mask(&mut self, keep: &[bool]);
    fn clone_box(&self) -> Box<dyn PropertyArray>;
    fn value_type(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypedArray<T> {
    data: Vec<T>,
    default: T,
}

impl<T: PropertyValue> PropertyArray for TypedArray<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn push_default(&mut self) {
        self.data.push(self.default.clone());
    }

    fn retain_mask(&mut self, keep: &[bool]) {
        let mut slot = 0;
        self.data.retain(|_| {
            let k = keep[slot];
            slot += 1;
            k
        });
    }

    fn clone_box(&self) -> Box<dyn PropertyArray> {
        Box::new(TypedArray {
            data: self.data.clone(),
            default: self.default.clone(),
        })
    }

    fn value_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The property arrays of one element kind.
#[derive(Default)]
pub struct PropertyContainer {
    len: usize,
    arrays: BTreeMap<String, Box<dyn PropertyArray>>,
}

impl Clone for PropertyContainer {
    fn clone(&self) -> Self {
        Self {
            len: self.len,
            arrays: self
                .arrays
                .iter()
                .map(|(name, array)| (name.clone(), array.clone_box()))
                .collect(),
        }
    }
}

impl fmt::Debug for PropertyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, array) in &self.arrays {
            map.entry(name, &array.value_type());
        }
        map.finish()
    }
}

impl PropertyContainer {
    /// Number of element slots each array holds.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the container has no element slots.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Names of all arrays, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.arrays.keys().map(String::as_str)
    }

    fn push(&mut self) {
        self.len += 1;
        for array in self.arrays.values_mut() {
            array.push_default();
        }
    }

    fn retain(&mut self, keep: &[bool]) {
        debug_assert_eq!(keep.len(), self.len);
        self.len = keep.iter().filter(|&&k| k).count();
        for array in self.arrays.values_mut() {
            array.retain_mask(keep);
        }
    }

    fn clear(&mut self) {
        self.len = 0;
        self.arrays.clear();
    }

    fn typed<T: PropertyValue>(&self, kind: ElementKind, name: &str) -> Result<&TypedArray<T>> {
        let array = self
            .arrays
            .get(name)
            .ok_or_else(|| MeshError::precondition(format!("no {} property '{}'", kind, name)))?;
        let found = array.value_type();
        array.as_any().downcast_ref::<TypedArray<T>>().ok_or_else(|| {
            MeshError::precondition(format!(
                "{} property '{}' holds {}, requested {}",
                kind,
                name,
                found,
                type_name::<T>()
            ))
        })
    }

    fn typed_mut<T: PropertyValue>(
        &mut self,
        kind: ElementKind,
        name: &str,
    ) -> Result<&mut TypedArray<T>> {
        let array = self
            .arrays
            .get_mut(name)
            .ok_or_else(|| MeshError::precondition(format!("no {} property '{}'", kind, name)))?;
        let found = array.value_type();
        array
            .as_any_mut()
            .downcast_mut::<TypedArray<T>>()
            .ok_or_else(|| {
                MeshError::precondition(format!(
                    "{} property '{}' holds {}, requested {}",
                    kind,
                    name,
                    found,
                    type_name::<T>()
                ))
            })
    }
}

/// Property arrays for all four element kinds of a mesh.
#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    vertex: PropertyContainer,
    halfedge: PropertyContainer,
    edge: PropertyContainer,
    face: PropertyContainer,
}

impl PropertyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The container for one element kind.
    pub fn container(&self, kind: ElementKind) -> &PropertyContainer {
        match kind {
            ElementKind::Vertex => &self.vertex,
            ElementKind::HalfEdge => &self.halfedge,
            ElementKind::Edge => &self.edge,
            ElementKind::Face => &self.face,
        }
    }

    fn container_mut(&mut self, kind: ElementKind) -> &mut PropertyContainer {
        match kind {
            ElementKind::Vertex => &mut self.vertex,
            ElementKind::HalfEdge => &mut self.halfedge,
            ElementKind::Edge => &mut self.edge,
            ElementKind::Face => &mut self.face,
        }
    }

    /// Whether a property named `name` exists for `kind` (of any type).
    pub fn contains(&self, kind: ElementKind, name: &str) -> bool {
        self.container(kind).arrays.contains_key(name)
    }

    /// Add a new property filled with `default`.
    ///
    /// Fails if a property with that name already exists.
    pub fn add<T: PropertyValue>(&mut self, kind: ElementKind, name: &str, default: T) -> Result<()> {
        let container = self.container_mut(kind);
        if container.arrays.contains_key(name) {
            return Err(MeshError::precondition(format!(
                "{} property '{}' already exists",
                kind, name
            )));
        }
        let array = TypedArray {
            data: vec![default.clone(); container.len],
            default,
        };
        container.arrays.insert(name.to_string(), Box::new(array));
        Ok(())
    }

    /// Typed read access to a property.
    pub fn get<T: PropertyValue>(&self, kind: ElementKind, name: &str) -> Result<&[T]> {
        Ok(&self.container(kind).typed::<T>(kind, name)?.data)
    }

    /// Typed write access to a property.
    pub fn get_mut<T: PropertyValue>(&mut self, kind: ElementKind, name: &str) -> Result<&mut [T]> {
        Ok(&mut self.container_mut(kind).typed_mut::<T>(kind, name)?.data)
    }

    /// Typed write access, adding the property with `default` if it is missing.
    pub fn get_or_add<T: PropertyValue>(
        &mut self,
        kind: ElementKind,
        name: &str,
        default: T,
    ) -> Result<&mut [T]> {
        if !self.contains(kind, name) {
            self.add(kind, name, default)?;
        }
        self.get_mut(kind, name)
    }

    /// Replace (or create) a property with the given values.
    ///
    /// `values` must hold exactly one entry per element slot. An existing
    /// property of a different type is replaced.
    pub fn set<T: PropertyValue>(
        &mut self,
        kind: ElementKind,
        name: &str,
        values: Vec<T>,
        default: T,
    ) -> Result<()> {
        let container = self.container_mut(kind);
        if values.len() != container.len {
            return Err(MeshError::precondition(format!(
                "{} property '{}' needs {} values, got {}",
                kind,
                name,
                container.len,
                values.len()
            )));
        }
        container.arrays.insert(
            name.to_string(),
            Box::new(TypedArray {
                data: values,
                default,
            }),
        );
        Ok(())
    }

    /// Remove a property. Returns whether it existed.
    pub fn remove(&mut self, kind: ElementKind, name: &str) -> bool {
        self.container_mut(kind).arrays.remove(name).is_some()
    }

    /// Names of the properties attached to `kind`.
    pub fn names(&self, kind: ElementKind) -> Vec<&str> {
        self.container(kind).names().collect()
    }

    pub(crate) fn push(&mut self, kind: ElementKind) {
        self.container_mut(kind).push();
    }

    pub(crate) fn retain(&mut self, kind: ElementKind, keep: &[bool]) {
        self.container_mut(kind).retain(keep);
    }

    pub(crate) fn clear(&mut self) {
        self.vertex.clear();
        self.halfedge.clear();
        self.edge.clear();
        self.face.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_vertices(n: usize) -> PropertyStore {
        let mut store = PropertyStore::new();
        for _ in 0..n {
            store.push(ElementKind::Vertex);
        }
        store
    }

    #[test]
    fn test_add_and_get() {
        let mut store = store_with_vertices(3);
        store.add(ElementKind::Vertex, "v:weight", 1.5f64).unwrap();

        let weights = store.get::<f64>(ElementKind::Vertex, "v:weight").unwrap();
        assert_eq!(weights, &[1.5, 1.5, 1.5]);

        store.get_mut::<f64>(ElementKind::Vertex, "v:weight").unwrap()[1] = 4.0;
        assert_eq!(store.get::<f64>(ElementKind::Vertex, "v:weight").unwrap()[1], 4.0);
    }

    #[test]
    fn test_type_mismatch_is_precondition() {
        let mut store = store_with_vertices(2);
        store.add(ElementKind::Vertex, "v:flag", false).unwrap();

        let err = store.get::<f64>(ElementKind::Vertex, "v:flag").unwrap_err();
        assert!(err.is_precondition());
        let err = store.get::<bool>(ElementKind::Face, "v:flag").unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_duplicate_add_fails() {
        let mut store = store_with_vertices(1);
        store.add(ElementKind::Vertex, "v:x", 0u32).unwrap();
        assert!(store.add(ElementKind::Vertex, "v:x", 0u32).is_err());
        assert!(store.get_or_add(ElementKind::Vertex, "v:x", 7u32).is_ok());
    }

    #[test]
    fn test_push_extends_arrays_with_default() {
        let mut store = store_with_vertices(1);
        store.add(ElementKind::Vertex, "v:id", 9i32).unwrap();
        store.push(ElementKind::Vertex);
        assert_eq!(store.get::<i32>(ElementKind::Vertex, "v:id").unwrap(), &[9, 9]);
    }

    #[test]
    fn test_retain_filters_slots() {
        let mut store = store_with_vertices(4);
        store
            .set(ElementKind::Vertex, "v:i", vec![0, 1, 2, 3], 0usize)
            .unwrap();
        store.retain(ElementKind::Vertex, &[true, false, true, false]);
        assert_eq!(store.container(ElementKind::Vertex).len(), 2);
        assert_eq!(store.get::<usize>(ElementKind::Vertex, "v:i").unwrap(), &[0, 2]);
    }

    #[test]
    fn test_set_checks_length_and_remove() {
        let mut store = store_with_vertices(2);
        assert!(store.set(ElementKind::Vertex, "v:s", vec![1.0], 0.0).is_err());
        store.set(ElementKind::Vertex, "v:s", vec![1.0, 2.0], 0.0).unwrap();
        assert!(store.contains(ElementKind::Vertex, "v:s"));
        assert!(store.remove(ElementKind::Vertex, "v:s"));
        assert!(!store.remove(ElementKind::Vertex, "v:s"));
    }
}
