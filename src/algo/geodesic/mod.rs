//! Geodesic distance computation on meshes.
//!
//! Computes, for every vertex, the on-surface distance to the nearest of a
//! set of seed vertices together with the index of that seed. Distances are
//! propagated by a wavefront that uses unfolded triangles rather than pure
//! edge paths (see [`GeodesicOptions::unfold`]).
//!
//! Vertices not connected to any seed keep an infinite distance.
//!
//! # Example
//!
//! ```no_run
//! use tessera::prelude::*;
//! use tessera::algo::geodesic::{compute_geodesics, GeodesicOptions};
//!
//! let mut mesh: HalfEdgeMesh = tessera::io::load("mesh.obj").unwrap();
//! let seeds = [VertexId::new(0), VertexId::new(10)];
//! let result = compute_geodesics(&mut mesh, &seeds, &GeodesicOptions::default()).unwrap();
//!
//! if let Some((v, d)) = result.farthest_vertex() {
//!     println!("farthest vertex {:?} at {}", v, d);
//! }
//! ```

mod dijkstra;

use std::marker::PhantomData;

use crate::algo::Termination;
use crate::error::{MeshError, Result};
use crate::mesh::{ElementKind, HalfEdgeMesh, MeshIndex, VertexId};

/// Vertex property holding the geodesic distance (`f64`).
pub const DISTANCE_PROPERTY: &str = "v:geodesic:distance";
/// Vertex property holding the index of the nearest seed (`usize`).
pub const SEED_PROPERTY: &str = "v:geodesic:seed";

/// Options for geodesic propagation.
#[derive(Debug, Clone)]
pub struct GeodesicOptions {
    /// Stop once the front passes this distance.
    pub max_distance: Option<f64>,
    /// Stop after this many vertices have been reached.
    pub max_vertices: Option<usize>,
    /// Use unfolded triangle updates in addition to edge updates.
    pub unfold: bool,
}

impl Default for GeodesicOptions {
    fn default() -> Self {
        Self {
            max_distance: None,
            max_vertices: None,
            unfold: true,
        }
    }
}

impl GeodesicOptions {
    /// Limit the propagation radius.
    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    /// Limit the number of reached vertices.
    pub fn with_max_vertices(mut self, max_vertices: usize) -> Self {
        self.max_vertices = Some(max_vertices);
        self
    }

    /// Enable or disable triangle unfolding (edge-graph distances when off).
    pub fn with_unfold(mut self, unfold: bool) -> Self {
        self.unfold = unfold;
        self
    }
}

/// Result of a geodesic computation, indexed by vertex slot.
#[derive(Debug, Clone)]
pub struct GeodesicResult<I: MeshIndex = u32> {
    distances: Vec<f64>,
    seeds: Vec<usize>,
    termination: Termination,
    _marker: PhantomData<I>,
}

impl<I: MeshIndex> GeodesicResult<I> {
    /// Distance to the nearest seed, `f64::INFINITY` if unreached.
    #[inline]
    pub fn distance(&self, v: VertexId<I>) -> f64 {
        self.distances[v.index()]
    }

    /// Position in the seed list of the nearest seed, if reached.
    #[inline]
    pub fn nearest_seed(&self, v: VertexId<I>) -> Option<usize> {
        match self.seeds[v.index()] {
            usize::MAX => None,
            s => Some(s),
        }
    }

    /// All distances as a slice.
    #[inline]
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Whether the front covered every reachable vertex.
    #[inline]
    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// Check if a vertex was reached.
    #[inline]
    pub fn is_reachable(&self, v: VertexId<I>) -> bool {
        self.distances[v.index()].is_finite()
    }

    /// Count the reached vertices.
    pub fn reachable_count(&self) -> usize {
        self.distances.iter().filter(|d| d.is_finite()).count()
    }

    /// The vertex with the largest finite distance.
    pub fn farthest_vertex(&self) -> Option<(VertexId<I>, f64)> {
        self.distances
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, &d)| (VertexId::new(i), d))
    }

    /// Iterate over reached vertices with their distances.
    pub fn reachable_iter(&self) -> impl Iterator<Item = (VertexId<I>, f64)> + '_ {
        self.distances
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_finite())
            .map(|(i, &d)| (VertexId::new(i), d))
    }
}

/// Compute distances from `seeds` without modifying the mesh.
///
/// Fails with `PreconditionUnmet` if `seeds` is empty or names a deleted or
/// out-of-range vertex.
pub fn geodesic_distances<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    seeds: &[VertexId<I>],
    options: &GeodesicOptions,
) -> Result<GeodesicResult<I>> {
    if seeds.is_empty() {
        return Err(MeshError::precondition("geodesics need at least one seed"));
    }
    for &s in seeds {
        if s.index() >= mesh.vertex_slots() || mesh.is_deleted_vertex(s) {
            return Err(MeshError::precondition(format!("seed {:?} is not a live vertex", s)));
        }
    }
    if let Some(d) = options.max_distance {
        if d.is_nan() || d <= 0.0 {
            return Err(MeshError::invalid_param("max_distance", d, "must be positive"));
        }
    }

    let front = dijkstra::propagate(mesh, seeds, options);
    let result = GeodesicResult {
        distances: front.distances,
        seeds: front.seeds,
        termination: front.termination,
        _marker: PhantomData,
    };
    log::debug!(
        "geodesics from {} seeds reached {} vertices ({:?})",
        seeds.len(),
        result.reachable_count(),
        result.termination
    );
    Ok(result)
}

/// Compute distances from `seeds` and store them as vertex properties.
///
/// Writes `v:geodesic:distance` and `v:geodesic:seed`.
pub fn compute_geodesics<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    seeds: &[VertexId<I>],
    options: &GeodesicOptions,
) -> Result<GeodesicResult<I>> {
    let result = geodesic_distances(mesh, seeds, options)?;
    let props = mesh.properties_mut();
    props.set(
        ElementKind::Vertex,
        DISTANCE_PROPERTY,
        result.distances.clone(),
        f64::INFINITY,
    )?;
    props.set(ElementKind::Vertex, SEED_PROPERTY, result.seeds.clone(), usize::MAX)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{build_from_triangles, fixtures};
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_flat_grid_is_euclidean() {
        let mesh = fixtures::grid(4);
        let seed = VertexId::new(0);
        let result = geodesic_distances(&mesh, &[seed], &GeodesicOptions::default()).unwrap();
        assert_eq!(result.termination(), Termination::Completed);
        for v in mesh.vertex_ids() {
            let euclid = (mesh.position(v) - mesh.position(seed)).norm();
            assert_relative_eq!(result.distance(v), euclid, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unfolding_beats_edge_graph() {
        let mesh = fixtures::grid(4);
        let seeds = [VertexId::new(0)];
        let unfolded = geodesic_distances(&mesh, &seeds, &GeodesicOptions::default()).unwrap();
        let graph =
            geodesic_distances(&mesh, &seeds, &GeodesicOptions::default().with_unfold(false)).unwrap();
        // Vertex (2, 1): sqrt(5) on the surface, 1 + sqrt(2) along edges
        let v = VertexId::new(7);
        assert_relative_eq!(graph.distance(v), 1.0 + 2.0_f64.sqrt(), epsilon = 1e-12);
        assert!(unfolded.distance(v) < graph.distance(v));
        for v in mesh.vertex_ids() {
            assert!(unfolded.distance(v) <= graph.distance(v) + 1e-12);
        }
    }

    #[test]
    fn test_sphere_distances_are_bounded_by_pi() {
        let mesh = fixtures::sphere(2);
        let seed = VertexId::new(0);
        let result = geodesic_distances(&mesh, &[seed], &GeodesicOptions::default()).unwrap();
        let (_, far) = result.farthest_vertex().unwrap();
        // Antipodal distance on the unit sphere is π
        assert!(far > 2.8 && far < 3.4, "far {}", far);
        for v in mesh.vertex_ids() {
            let chord = (mesh.position(v) - mesh.position(seed)).norm();
            assert!(result.distance(v) >= chord - 1e-9);
        }
    }

    #[test]
    fn test_multiple_seeds_label_nearest() {
        let mut mesh = fixtures::grid(4);
        let seeds = [VertexId::new(0), VertexId::new(24)];
        let result = compute_geodesics(&mut mesh, &seeds, &GeodesicOptions::default()).unwrap();
        assert_eq!(result.nearest_seed(VertexId::new(1)), Some(0));
        assert_eq!(result.nearest_seed(VertexId::new(23)), Some(1));
        assert_eq!(result.distance(VertexId::new(24)), 0.0);

        let labels: &[usize] = mesh.vertex_property("v:geodesic:seed").unwrap();
        assert_eq!(labels[1], 0);
        let distances: &[f64] = mesh.vertex_property("v:geodesic:distance").unwrap();
        assert_relative_eq!(distances[6], 2.0_f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_disconnected_vertices_stay_unreached() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
            Point3::new(6.0, 0.0, 0.0),
            Point3::new(5.0, 1.0, 0.0),
        ];
        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2], [3, 4, 5]]).unwrap();
        let result = geodesic_distances(&mesh, &[VertexId::new(0)], &GeodesicOptions::default()).unwrap();
        assert_eq!(result.reachable_count(), 3);
        assert!(result.distance(VertexId::new(4)).is_infinite());
        assert_eq!(result.nearest_seed(VertexId::new(4)), None);
        assert_eq!(result.termination(), Termination::Completed);
    }

    #[test]
    fn test_caps_report_resource_exhausted() {
        let mesh = fixtures::grid(4);
        let seeds = [VertexId::new(0)];

        let capped =
            geodesic_distances(&mesh, &seeds, &GeodesicOptions::default().with_max_vertices(3)).unwrap();
        assert_eq!(capped.termination(), Termination::ResourceExhausted);
        assert_eq!(capped.reachable_count(), 3);

        let radius =
            geodesic_distances(&mesh, &seeds, &GeodesicOptions::default().with_max_distance(1.5)).unwrap();
        assert_eq!(radius.termination(), Termination::ResourceExhausted);
        for (v, d) in radius.reachable_iter() {
            assert!(d <= 1.5);
            assert!((mesh.position(v) - mesh.position(seeds[0])).norm() <= 1.5 + 1e-9);
        }
        assert_eq!(radius.reachable_count(), 4);
    }

    #[test]
    fn test_invalid_seeds() {
        let mesh = fixtures::grid(2);
        assert!(geodesic_distances(&mesh, &[], &GeodesicOptions::default())
            .unwrap_err()
            .is_precondition());
        assert!(geodesic_distances(&mesh, &[VertexId::new(99)], &GeodesicOptions::default())
            .unwrap_err()
            .is_precondition());
    }
}
