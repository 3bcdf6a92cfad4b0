//! Merging coplanar faces into polygons.
//!
//! [`planar_components`] partitions the faces into planar regions by flood
//! fill: a neighbour joins the region when its normal is within the angle
//! threshold of the region's seed face. [`polygonize`] then replaces every
//! region that is a topological disc (one simple border loop) by a single
//! polygon made of that loop. Other regions are left as they are.
//!
//! With [`PolygonizeOptions::dissolve_straight_vertices`], interior vertices
//! left with valence 2 on a straight line between two polygons are removed
//! from both, so a finely tessellated box collapses back to six quads.

use std::collections::VecDeque;

use crate::error::{MeshError, Result};
use crate::mesh::{build_from_polygons, ElementKind, FaceId, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Face property holding the planar region label (`usize`).
pub const PLANAR_PARTITION_PROPERTY: &str = "f:planar_partition";

/// Options for polygonization.
#[derive(Debug, Clone, Copy)]
pub struct PolygonizeOptions {
    /// Largest angle between face normals, in degrees, that still counts as
    /// coplanar.
    pub angle_degrees: f64,
    /// Remove valence-2 interior vertices lying on a straight polygon side.
    pub dissolve_straight_vertices: bool,
}

impl Default for PolygonizeOptions {
    fn default() -> Self {
        Self {
            angle_degrees: 1.0,
            dissolve_straight_vertices: true,
        }
    }
}

impl PolygonizeOptions {
    /// Set the coplanarity threshold in degrees.
    pub fn with_angle(mut self, degrees: f64) -> Self {
        self.angle_degrees = degrees;
        self
    }

    /// Set whether to dissolve straight valence-2 vertices.
    pub fn with_dissolve_straight_vertices(mut self, dissolve: bool) -> Self {
        self.dissolve_straight_vertices = dissolve;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.angle_degrees >= 0.0 && self.angle_degrees < 90.0) {
            return Err(MeshError::invalid_param(
                "angle_degrees",
                self.angle_degrees,
                "must be in [0, 90)",
            ));
        }
        Ok(())
    }
}

/// Outcome of [`polygonize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolygonizeReport {
    /// Planar regions found.
    pub regions: usize,
    /// Regions of two or more faces replaced by one polygon.
    pub merged_regions: usize,
    /// Regions of two or more faces left alone because they are not discs.
    pub skipped_regions: usize,
    /// Vertices removed, inside merged regions or dissolved on straight sides.
    pub removed_vertices: usize,
    /// Face count before.
    pub faces_before: usize,
    /// Face count after.
    pub faces_after: usize,
}

/// Label faces by planar region and store the labels in
/// `"f:planar_partition"`. Returns the number of regions.
pub fn planar_components<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, angle_degrees: f64) -> Result<usize> {
    PolygonizeOptions::default().with_angle(angle_degrees).validate()?;
    let (labels, count) = planar_labels(mesh, angle_degrees);
    mesh.properties_mut()
        .set(ElementKind::Face, PLANAR_PARTITION_PROPERTY, labels, usize::MAX)?;
    Ok(count)
}

fn planar_labels<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, angle_degrees: f64) -> (Vec<usize>, usize) {
    let cos_max = angle_degrees.to_radians().cos();
    let mut labels = vec![usize::MAX; mesh.face_slots()];
    let mut count = 0;
    let mut queue = VecDeque::new();
    for seed in mesh.face_ids() {
        if labels[seed.index()] != usize::MAX {
            continue;
        }
        let normal = mesh.face_normal(seed);
        labels[seed.index()] = count;
        queue.push_back(seed);
        while let Some(f) = queue.pop_front() {
            for g in mesh.face_neighbors(f) {
                if labels[g.index()] == usize::MAX && mesh.face_normal(g).dot(&normal) >= cos_max {
                    labels[g.index()] = count;
                    queue.push_back(g);
                }
            }
        }
        count += 1;
    }
    (labels, count)
}

/// Border loop of a region as vertex slots in face order, or `None` when
/// the region is not a disc with one simple border.
fn region_loop<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, labels: &[usize], faces: &[FaceId<I>]) -> Option<Vec<usize>> {
    let label = labels[faces[0].index()];
    let outside = |h: HalfEdgeId<I>| {
        let g = mesh.face_of(h.opposite());
        !g.is_valid() || labels[g.index()] != label
    };

    let mut leaving = vec![HalfEdgeId::<I>::invalid(); mesh.vertex_slots()];
    let mut border = 0usize;
    let mut interior_halfedges = 0usize;
    let mut vertices = Vec::new();
    let mut seen = vec![false; mesh.vertex_slots()];
    for &f in faces {
        for h in mesh.face_halfedges(f) {
            let s = mesh.source(h);
            if !seen[s.index()] {
                seen[s.index()] = true;
                vertices.push(s);
            }
            if outside(h) {
                if leaving[s.index()].is_valid() {
                    // Two border halfedges leave one vertex: not simple
                    return None;
                }
                leaving[s.index()] = h;
                border += 1;
            } else {
                interior_halfedges += 1;
            }
        }
    }
    if border == 0 {
        return None;
    }

    // χ = V − E + F must be 1 for a disc
    let edges = border + interior_halfedges / 2;
    if vertices.len() as i64 - edges as i64 + faces.len() as i64 != 1 {
        return None;
    }

    let start = vertices.iter().map(|v| leaving[v.index()]).find(|h| h.is_valid())?;
    let mut polygon = Vec::with_capacity(border);
    let mut h = start;
    loop {
        polygon.push(mesh.source(h).index());
        h = leaving[mesh.target(h).index()];
        if !h.is_valid() || polygon.len() > border {
            return None;
        }
        if h == start {
            break;
        }
    }
    (polygon.len() == border).then_some(polygon)
}

/// Interior vertices of valence 2 whose two edges are collinear, chosen so
/// that no polygon drops below three corners.
fn straight_vertices<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, cos_max: f64) -> Vec<bool> {
    let mut remove = vec![false; mesh.vertex_slots()];
    let mut degree: Vec<usize> = (0..mesh.face_slots())
        .map(|f| {
            let f = FaceId::new(f);
            if mesh.is_deleted_face(f) {
                0
            } else {
                mesh.face_degree(f)
            }
        })
        .collect();
    for v in mesh.vertex_ids() {
        if mesh.is_boundary_vertex(v) || mesh.valence(v) != 2 {
            continue;
        }
        let p = mesh.position(v);
        let ends: Vec<VertexId<I>> = mesh.vertex_neighbors(v).collect();
        let (Some(a), Some(b)) = ((mesh.position(ends[0]) - p).try_normalize(1e-12), (mesh.position(ends[1]) - p).try_normalize(1e-12)) else {
            continue;
        };
        if a.dot(&b) > -cos_max {
            continue;
        }
        let faces: Vec<FaceId<I>> = mesh.vertex_faces(v).collect();
        if faces.iter().all(|f| degree[f.index()] > 3) {
            for f in &faces {
                degree[f.index()] -= 1;
            }
            remove[v.index()] = true;
        }
    }
    remove
}

/// Polygon list of the mesh after merging, as vertex slots.
fn merged_polygons<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    labels: &[usize],
    regions: usize,
    report: &mut PolygonizeReport,
) -> Vec<Vec<usize>> {
    let mut members: Vec<Vec<FaceId<I>>> = vec![Vec::new(); regions];
    for f in mesh.face_ids() {
        members[labels[f.index()]].push(f);
    }

    let mut polygons = Vec::new();
    for faces in &members {
        if faces.len() > 1 {
            if let Some(polygon) = region_loop(mesh, labels, faces) {
                polygons.push(polygon);
                report.merged_regions += 1;
                continue;
            }
            report.skipped_regions += 1;
        }
        for &f in faces {
            polygons.push(mesh.face_vertices(f).map(|v| v.index()).collect());
        }
    }
    polygons
}

/// Merge planar disc regions into single polygon faces.
///
/// The mesh is rebuilt: vertices that no longer belong to any face are
/// dropped (order of the remaining ones is kept) and properties are not
/// carried over. On failure the mesh is unchanged.
pub fn polygonize<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, options: &PolygonizeOptions) -> Result<PolygonizeReport> {
    options.validate()?;
    let mut report = PolygonizeReport {
        faces_before: mesh.num_faces(),
        ..Default::default()
    };
    if mesh.num_faces() == 0 {
        return Ok(report);
    }

    let (labels, regions) = planar_labels(mesh, options.angle_degrees);
    report.regions = regions;
    let polygons = merged_polygons(mesh, &labels, regions, &mut report);
    let mut merged = rebuild(mesh, &polygons)?;

    if options.dissolve_straight_vertices {
        let remove = straight_vertices(&merged, options.angle_degrees.to_radians().cos());
        if remove.iter().any(|&r| r) {
            let polygons: Vec<Vec<usize>> = merged
                .face_ids()
                .map(|f| {
                    merged
                        .face_vertices(f)
                        .filter(|v| !remove[v.index()])
                        .map(|v| v.index())
                        .collect()
                })
                .collect();
            merged = rebuild(&merged, &polygons)?;
        }
    }

    report.removed_vertices = mesh.num_vertices() - merged.num_vertices();
    report.faces_after = merged.num_faces();
    *mesh = merged;
    log::info!(
        "polygonization: {} regions, {} merged, {} skipped, {} -> {} faces",
        report.regions,
        report.merged_regions,
        report.skipped_regions,
        report.faces_before,
        report.faces_after
    );
    Ok(report)
}

/// Build a mesh from polygons over the vertex slots of `mesh`, keeping only
/// the vertices the polygons use.
fn rebuild<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, polygons: &[Vec<usize>]) -> Result<HalfEdgeMesh<I>> {
    let mut index = vec![usize::MAX; mesh.vertex_slots()];
    for &v in polygons.iter().flatten() {
        index[v] = 0;
    }
    let mut positions = Vec::new();
    for (slot, entry) in index.iter_mut().enumerate() {
        if *entry == 0 {
            *entry = positions.len();
            positions.push(*mesh.position(VertexId::new(slot)));
        }
    }
    let remapped: Vec<Vec<usize>> = polygons
        .iter()
        .map(|polygon| polygon.iter().map(|&v| index[v]).collect())
        .collect();
    build_from_polygons::<I, _>(&positions, &remapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::components::topology_info;
    use crate::algo::triangulate::{triangulate, TriangulateOptions};
    use crate::mesh::fixtures;
    use nalgebra::Point3;

    fn point_index(p: Point3<f64>, points: &mut Vec<Point3<f64>>) -> usize {
        match points.iter().position(|q| (q - p).norm() < 1e-9) {
            Some(i) => i,
            None => {
                points.push(p);
                points.len() - 1
            }
        }
    }

    /// Unit cube with every side split into 2×2 quads.
    fn refined_cube() -> HalfEdgeMesh {
        let cube = fixtures::cube();
        let mut points = cube.positions();
        let mut quads = Vec::new();
        for f in cube.face_ids() {
            let c: Vec<usize> = cube.face_vertices(f).map(|v| v.index()).collect();
            let center = point_index(cube.face_centroid(f), &mut points);
            let mut mids = Vec::new();
            for k in 0..4 {
                let p = Point3::from((points[c[k]].coords + points[c[(k + 1) % 4]].coords) * 0.5);
                mids.push(point_index(p, &mut points));
            }
            for k in 0..4 {
                quads.push([c[k], mids[k], center, mids[(k + 3) % 4]]);
            }
        }
        build_from_polygons(&points, &quads).unwrap()
    }

    #[test]
    fn test_planar_components_of_triangulated_cube() {
        let mut mesh = fixtures::cube();
        triangulate(&mut mesh, &TriangulateOptions::default()).unwrap();
        assert_eq!(planar_components(&mut mesh, 1.0).unwrap(), 6);
        let labels = mesh.face_property::<usize>(PLANAR_PARTITION_PROPERTY).unwrap();
        for label in 0..6 {
            assert_eq!(labels.iter().filter(|&&l| l == label).count(), 2);
        }
    }

    #[test]
    fn test_triangulated_cube_back_to_quads() {
        let mut mesh = fixtures::cube();
        triangulate(&mut mesh, &TriangulateOptions::default()).unwrap();
        let report = polygonize(&mut mesh, &PolygonizeOptions::default()).unwrap();
        assert_eq!(report.regions, 6);
        assert_eq!(report.merged_regions, 6);
        assert_eq!(report.faces_before, 12);
        assert_eq!(report.faces_after, 6);
        assert!(mesh.is_quad_mesh());
        assert_eq!(mesh.num_vertices(), 8);
        assert_eq!(topology_info(&mesh).euler_characteristic, 2);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_refined_cube_dissolves_edge_midpoints() {
        let mut mesh = refined_cube();
        assert_eq!(mesh.num_vertices(), 26);
        let report = polygonize(&mut mesh, &PolygonizeOptions::default()).unwrap();
        assert_eq!(report.merged_regions, 6);
        assert_eq!(report.removed_vertices, 18);
        assert_eq!(mesh.num_vertices(), 8);
        assert_eq!(mesh.num_faces(), 6);
        assert!(mesh.is_quad_mesh());
        assert!(mesh.is_closed());

        let mut kept = refined_cube();
        let options = PolygonizeOptions::default().with_dissolve_straight_vertices(false);
        polygonize(&mut kept, &options).unwrap();
        // Face centres go, edge midpoints stay as octagon corners
        assert_eq!(kept.num_vertices(), 20);
        assert!(kept.face_ids().all(|f| kept.face_degree(f) == 8));
    }

    #[test]
    fn test_flat_grid_becomes_one_polygon() {
        let mut mesh = fixtures::grid(3);
        let report = polygonize(&mut mesh, &PolygonizeOptions::default()).unwrap();
        assert_eq!(report.merged_regions, 1);
        assert_eq!(mesh.num_faces(), 1);
        assert_eq!(mesh.num_vertices(), 12);
        // Border vertices are never dissolved
        assert_eq!(mesh.face_degree(mesh.face_ids().next().unwrap()), 12);
    }

    #[test]
    fn test_annulus_region_is_skipped() {
        let mut mesh = fixtures::grid(3);
        let centre: Vec<FaceId> = mesh
            .face_ids()
            .filter(|&f| {
                let c = mesh.face_centroid(f);
                c.x > 1.0 && c.x < 2.0 && c.y > 1.0 && c.y < 2.0
            })
            .collect();
        assert_eq!(centre.len(), 2);
        for f in centre {
            mesh.delete_face(f).unwrap();
        }
        mesh.compact();

        let report = polygonize(&mut mesh, &PolygonizeOptions::default()).unwrap();
        assert_eq!(report.regions, 1);
        assert_eq!(report.skipped_regions, 1);
        assert_eq!(report.merged_regions, 0);
        assert_eq!(mesh.num_faces(), 16);
    }

    #[test]
    fn test_curved_surface_keeps_triangles() {
        let mut mesh = fixtures::icosahedron();
        let report = polygonize(&mut mesh, &PolygonizeOptions::default()).unwrap();
        assert_eq!(report.regions, 20);
        assert_eq!(mesh.num_faces(), 20);
    }

    #[test]
    fn test_invalid_angle() {
        let mut mesh = fixtures::grid(1);
        let err = polygonize(&mut mesh, &PolygonizeOptions::default().with_angle(95.0)).unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "angle_degrees", .. }));
    }
}
