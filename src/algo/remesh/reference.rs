//! Frozen copy of the input surface used as the projection target.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};

use crate::mesh::{HalfEdgeMesh, MeshIndex};

/// Closest point on triangle `(a, b, c)` to `p`, with its barycentric
/// coordinates.
pub(crate) fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> (Point3<f64>, [f64; 3]) {
    // Voronoi region walk (Ericson, Real-Time Collision Detection 5.1.5)
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (*a, [1.0, 0.0, 0.0]);
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (*b, [0.0, 1.0, 0.0]);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        return (a + t * ab, [1.0 - t, t, 0.0]);
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (*c, [0.0, 0.0, 1.0]);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        return (a + t * ac, [1.0 - t, 0.0, t]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + t * (c - b), [0.0, 1.0 - t, t]);
    }

    let denom = va + vb + vc;
    if denom.abs() < 1e-300 {
        return (*a, [1.0, 0.0, 0.0]);
    }
    let v = vb / denom;
    let w = vc / denom;
    (a + v * ab + w * ac, [1.0 - v - w, v, w])
}

type Cell = (i64, i64, i64);

/// Triangles of the original surface bucketed in a uniform grid, with a
/// scalar per original vertex interpolated on projection.
pub(crate) struct ReferenceSurface {
    positions: Vec<Point3<f64>>,
    triangles: Vec<[usize; 3]>,
    values: Vec<f64>,
    origin: Point3<f64>,
    cell_size: f64,
    cells: HashMap<Cell, Vec<usize>>,
    last_cell: Cell,
}

impl ReferenceSurface {
    /// Snapshot the faces of a triangle mesh. `values` holds one scalar per
    /// vertex slot.
    pub(crate) fn new<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, values: Vec<f64>) -> Self {
        let positions = mesh.positions();
        let triangles: Vec<[usize; 3]> = mesh
            .face_ids()
            .map(|f| mesh.face_triangle(f).map(|v| v.index()))
            .collect();

        let (min, max) = mesh
            .bounding_box()
            .unwrap_or((Point3::origin(), Point3::origin()));
        let cell_size = (2.0 * mesh.mean_edge_length()).max((max - min).norm() * 1e-3).max(1e-12);

        let mut surface = Self {
            positions,
            triangles,
            values,
            origin: min,
            cell_size,
            cells: HashMap::new(),
            last_cell: (0, 0, 0),
        };

        surface.last_cell = surface.cell_of(&max);
        for (t, tri) in surface.triangles.iter().enumerate() {
            let corners = tri.map(|i| surface.positions[i]);
            let lo = surface.cell_of(&Point3::from(corners[0].coords.inf(&corners[1].coords).inf(&corners[2].coords)));
            let hi = surface.cell_of(&Point3::from(corners[0].coords.sup(&corners[1].coords).sup(&corners[2].coords)));
            for x in lo.0..=hi.0 {
                for y in lo.1..=hi.1 {
                    for z in lo.2..=hi.2 {
                        surface.cells.entry((x, y, z)).or_default().push(t);
                    }
                }
            }
        }
        surface
    }

    fn cell_of(&self, p: &Point3<f64>) -> Cell {
        let d: Vector3<f64> = (p - self.origin) / self.cell_size;
        (d.x.floor() as i64, d.y.floor() as i64, d.z.floor() as i64)
    }

    /// Closest point on the reference surface and the interpolated scalar
    /// there. `None` only for an empty reference.
    pub(crate) fn project(&self, p: &Point3<f64>) -> Option<(Point3<f64>, f64)> {
        let center = self.cell_of(p);
        let mut best: Option<(f64, Point3<f64>, f64)> = None;

        // Shells beyond this ring hold no cells of the grid
        let last_ring = [
            center.0.abs().max((center.0 - self.last_cell.0).abs()),
            center.1.abs().max((center.1 - self.last_cell.1).abs()),
            center.2.abs().max((center.2 - self.last_cell.2).abs()),
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        for ring in 0..=last_ring {
            // Any triangle in a farther shell is at least this far away
            if let Some((d2, _, _)) = best {
                let reach = (ring - 1).max(0) as f64 * self.cell_size;
                if reach * reach > d2 {
                    break;
                }
            }
            for x in -ring..=ring {
                for y in -ring..=ring {
                    for z in -ring..=ring {
                        if x.abs() != ring && y.abs() != ring && z.abs() != ring {
                            continue;
                        }
                        let Some(bucket) = self.cells.get(&(center.0 + x, center.1 + y, center.2 + z)) else {
                            continue;
                        };
                        for &t in bucket {
                            let [i, j, k] = self.triangles[t];
                            let (q, bary) = closest_point_on_triangle(
                                p,
                                &self.positions[i],
                                &self.positions[j],
                                &self.positions[k],
                            );
                            let d2 = (q - p).norm_squared();
                            if best.map_or(true, |(b, _, _)| d2 < b) {
                                let value = bary[0] * self.values[i] + bary[1] * self.values[j] + bary[2] * self.values[k];
                                best = Some((d2, q, value));
                            }
                        }
                    }
                }
            }
        }

        best.map(|(_, q, value)| (q, value))
    }
}
