//! Small reference meshes shared by the unit tests.

use std::f64::consts::TAU;

use nalgebra::Point3;

use super::{build_from_polygons, build_from_triangles, HalfEdgeMesh};

pub fn tetrahedron() -> HalfEdgeMesh {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.5, 1.0, 0.0),
        Point3::new(0.5, 0.5, 1.0),
    ];
    let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Unit cube made of six quads.
pub fn cube() -> HalfEdgeMesh {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(1.0, 0.0, 1.0),
        Point3::new(1.0, 1.0, 1.0),
        Point3::new(0.0, 1.0, 1.0),
    ];
    let faces = vec![
        [0, 3, 2, 1],
        [4, 5, 6, 7],
        [0, 1, 5, 4],
        [2, 3, 7, 6],
        [0, 4, 7, 3],
        [1, 2, 6, 5],
    ];
    build_from_polygons(&vertices, &faces).unwrap()
}

/// Icosahedron inscribed in the unit sphere.
pub fn icosahedron() -> HalfEdgeMesh {
    let t = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let raw = [
        (-1.0, t, 0.0),
        (1.0, t, 0.0),
        (-1.0, -t, 0.0),
        (1.0, -t, 0.0),
        (0.0, -1.0, t),
        (0.0, 1.0, t),
        (0.0, -1.0, -t),
        (0.0, 1.0, -t),
        (t, 0.0, -1.0),
        (t, 0.0, 1.0),
        (-t, 0.0, -1.0),
        (-t, 0.0, 1.0),
    ];
    let vertices: Vec<Point3<f64>> = raw
        .iter()
        .map(|&(x, y, z)| Point3::from(Point3::new(x, y, z).coords.normalize()))
        .collect();
    let faces = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Flat `n x n` grid of unit squares, each split into two triangles.
pub fn grid(n: usize) -> HalfEdgeMesh {
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    for j in 0..=n {
        for i in 0..=n {
            vertices.push(Point3::new(i as f64, j as f64, 0.0));
        }
    }
    let mut faces = Vec::with_capacity(2 * n * n);
    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1);
            let v11 = v01 + 1;
            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
        }
    }
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Planar disc in the xy-plane: a centre vertex and `rings` concentric rings of
/// `segments` vertices each (outer radius 1).
pub fn disc(rings: usize, segments: usize) -> HalfEdgeMesh {
    let ring_vertex = |k: usize, s: usize| 1 + (k - 1) * segments + (s % segments);
    let mut vertices = vec![Point3::origin()];
    for k in 1..=rings {
        let r = k as f64 / rings as f64;
        for s in 0..segments {
            let a = TAU * s as f64 / segments as f64;
            vertices.push(Point3::new(r * a.cos(), r * a.sin(), 0.0));
        }
    }
    let mut faces = Vec::new();
    for s in 0..segments {
        faces.push([0, ring_vertex(1, s), ring_vertex(1, s + 1)]);
    }
    for k in 1..rings {
        for s in 0..segments {
            let a = ring_vertex(k, s);
            let b = ring_vertex(k + 1, s);
            let c = ring_vertex(k + 1, s + 1);
            let d = ring_vertex(k, s + 1);
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Open cylinder of radius 1 along z with `rings` rows of triangles.
pub fn cylinder(rings: usize, segments: usize) -> HalfEdgeMesh {
    let mut vertices = Vec::new();
    for r in 0..=rings {
        for s in 0..segments {
            let a = TAU * s as f64 / segments as f64;
            vertices.push(Point3::new(a.cos(), a.sin(), r as f64 / rings as f64));
        }
    }
    let mut faces = Vec::new();
    for r in 0..rings {
        for s in 0..segments {
            let a = r * segments + s;
            let b = r * segments + (s + 1) % segments;
            let c = (r + 1) * segments + (s + 1) % segments;
            let d = (r + 1) * segments + s;
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Torus with major radius 2 and minor radius 0.5.
pub fn torus(n: usize, m: usize) -> HalfEdgeMesh {
    let mut vertices = Vec::new();
    for i in 0..n {
        let u = TAU * i as f64 / n as f64;
        for j in 0..m {
            let v = TAU * j as f64 / m as f64;
            let w = 2.0 + 0.5 * v.cos();
            vertices.push(Point3::new(w * u.cos(), w * u.sin(), 0.5 * v.sin()));
        }
    }
    let idx = |i: usize, j: usize| (i % n) * m + (j % m);
    let mut faces = Vec::new();
    for i in 0..n {
        for j in 0..m {
            let a = idx(i, j);
            let b = idx(i + 1, j);
            let c = idx(i + 1, j + 1);
            let d = idx(i, j + 1);
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Unit sphere approximation: icosahedron refined by midpoint splits and
/// projected onto the sphere.
pub fn sphere(levels: usize) -> HalfEdgeMesh {
    let mut mesh = icosahedron();
    for _ in 0..levels {
        let (vertices, faces) = super::to_face_vertex(&mesh);
        let mut vertices = vertices;
        let mut midpoint = std::collections::BTreeMap::new();
        let mut mid = |a: usize, b: usize, vertices: &mut Vec<Point3<f64>>| -> usize {
            let key = (a.min(b), a.max(b));
            *midpoint.entry(key).or_insert_with(|| {
                let p = (vertices[a].coords + vertices[b].coords).normalize();
                vertices.push(Point3::from(p));
                vertices.len() - 1
            })
        };
        let mut refined = Vec::new();
        for f in &faces {
            let (a, b, c) = (f[0], f[1], f[2]);
            let ab = mid(a, b, &mut vertices);
            let bc = mid(b, c, &mut vertices);
            let ca = mid(c, a, &mut vertices);
            refined.push([a, ab, ca]);
            refined.push([b, bc, ab]);
            refined.push([c, ca, bc]);
            refined.push([ab, bc, ca]);
        }
        mesh = build_from_triangles(&vertices, &refined).unwrap();
    }
    mesh
}
