//! Uniform random sampling of a mesh surface.
//!
//! Faces are fanned into triangles, a triangle is picked with probability
//! proportional to its area, and a point is placed inside it with uniformly
//! distributed barycentric coordinates
//! `(1 − √r₁, √r₁ (1 − r₂), √r₁ r₂)`. The result is a point set whose density
//! is uniform per unit area.

use nalgebra::{Point3, Vector3};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{MeshError, Result};
use crate::mesh::{FaceId, HalfEdgeMesh, MeshIndex, VertexId};

/// Options for surface sampling.
#[derive(Debug, Clone)]
pub struct SampleOptions {
    /// Number of points to draw.
    pub count: usize,
    /// RNG seed; `None` seeds from system entropy.
    pub seed: Option<u64>,
    /// Also produce a normal per sample, interpolated from vertex normals.
    pub normals: bool,
}

impl SampleOptions {
    /// Draw `count` points without normals, seeded from entropy.
    pub fn new(count: usize) -> Self {
        Self {
            count,
            seed: None,
            normals: false,
        }
    }

    /// Use a fixed seed for reproducible output.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set whether to produce normals.
    pub fn with_normals(mut self, normals: bool) -> Self {
        self.normals = normals;
        self
    }
}

/// Sampled points, with the face each point lies on.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    /// Sample positions.
    pub points: Vec<Point3<f64>>,
    /// Unit normals, present when requested.
    pub normals: Option<Vec<Vector3<f64>>>,
    /// Face slot index of each sample.
    pub faces: Vec<usize>,
}

impl PointCloud {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One triangle of a face fan.
struct FanTriangle<I: MeshIndex> {
    face: FaceId<I>,
    corners: [VertexId<I>; 3],
}

fn fan_triangles<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> (Vec<FanTriangle<I>>, Vec<f64>) {
    let mut triangles = Vec::new();
    let mut areas = Vec::new();
    for f in mesh.face_ids() {
        let vertices: Vec<VertexId<I>> = mesh.face_vertices(f).collect();
        for k in 1..vertices.len() - 1 {
            let corners = [vertices[0], vertices[k], vertices[k + 1]];
            let [a, b, c] = corners.map(|v| *mesh.position(v));
            areas.push(0.5 * (b - a).cross(&(c - a)).norm());
            triangles.push(FanTriangle { face: f, corners });
        }
    }
    (triangles, areas)
}

/// Sample points uniformly over the surface.
///
/// Fails with `PreconditionUnmet` when the mesh has no faces and with
/// `DegenerateInput` when its total area is zero.
pub fn sample<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, options: &SampleOptions) -> Result<PointCloud> {
    if mesh.num_faces() == 0 {
        return Err(MeshError::precondition("sampling requires a mesh with faces"));
    }
    let (triangles, areas) = fan_triangles(mesh);
    let picker = WeightedIndex::new(&areas)
        .map_err(|err| MeshError::degenerate(format!("cannot sample surface: {}", err)))?;

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let vertex_normals: Option<Vec<Vector3<f64>>> = options.normals.then(|| {
        (0..mesh.vertex_slots())
            .map(|i| {
                let v = VertexId::new(i);
                if mesh.is_deleted_vertex(v) {
                    Vector3::zeros()
                } else {
                    mesh.vertex_normal(v)
                }
            })
            .collect()
    });

    let mut cloud = PointCloud {
        points: Vec::with_capacity(options.count),
        normals: options.normals.then(|| Vec::with_capacity(options.count)),
        faces: Vec::with_capacity(options.count),
    };

    for _ in 0..options.count {
        let triangle = &triangles[picker.sample(&mut rng)];
        let s = rng.gen::<f64>().sqrt();
        let t = rng.gen::<f64>();
        let weights = [1.0 - s, s * (1.0 - t), s * t];

        let [a, b, c] = triangle.corners.map(|v| mesh.position(v).coords);
        cloud
            .points
            .push(Point3::from(a * weights[0] + b * weights[1] + c * weights[2]));
        cloud.faces.push(triangle.face.index());

        if let (Some(normals), Some(vertex_normals)) = (cloud.normals.as_mut(), vertex_normals.as_ref()) {
            let [na, nb, nc] = triangle.corners.map(|v| vertex_normals[v.index()]);
            let n = na * weights[0] + nb * weights[1] + nc * weights[2];
            normals.push(n.try_normalize(1e-12).unwrap_or_else(|| mesh.face_normal(triangle.face)));
        }
    }

    log::info!(
        "sampled {} points over {} faces (area {:.6})",
        cloud.len(),
        mesh.num_faces(),
        areas.iter().sum::<f64>()
    );
    Ok(cloud)
}
