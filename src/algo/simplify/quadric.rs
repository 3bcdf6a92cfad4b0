//! Error quadrics and normal cones.

use nalgebra::{Matrix4, Point3, Unit, UnitQuaternion, Vector3, Vector4};

/// Sum of squared distances to a set of planes, as a symmetric 4×4 matrix.
///
/// Only the upper triangle is stored:
///
/// ```text
/// | a b c d |
/// | b e f g |
/// | c f h i |
/// | d g i j |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric {
    data: [f64; 10],
}

impl Default for Quadric {
    fn default() -> Self {
        Self { data: [0.0; 10] }
    }
}

impl Quadric {
    /// Quadric of the plane through `point` with unit `normal`.
    pub fn from_plane(normal: &Vector3<f64>, point: &Point3<f64>) -> Self {
        let (a, b, c) = (normal.x, normal.y, normal.z);
        let d = -normal.dot(&point.coords);
        Self {
            data: [
                a * a,
                a * b,
                a * c,
                a * d,
                b * b,
                b * c,
                b * d,
                c * c,
                c * d,
                d * d,
            ],
        }
    }

    /// Scale every coefficient.
    pub fn scaled(mut self, weight: f64) -> Self {
        for x in &mut self.data {
            *x *= weight;
        }
        self
    }

    /// Squared distance sum at `p`, i.e. `vᵀ Q v` with `v = (p, 1)`.
    pub fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let v = Vector4::new(p.x, p.y, p.z, 1.0);
        (v.transpose() * self.to_matrix() * v)[0]
    }

    /// Full matrix form.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let q = &self.data;
        Matrix4::new(
            q[0], q[1], q[2], q[3],
            q[1], q[4], q[5], q[6],
            q[2], q[5], q[7], q[8],
            q[3], q[6], q[8], q[9],
        )
    }
}

impl std::ops::Add for Quadric {
    type Output = Quadric;

    fn add(mut self, other: Quadric) -> Quadric {
        self += other;
        self
    }
}

impl std::ops::AddAssign for Quadric {
    fn add_assign(&mut self, other: Quadric) {
        for (a, b) in self.data.iter_mut().zip(other.data) {
            *a += b;
        }
    }
}

/// A cone of unit normals: a centre direction and a half opening angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalCone {
    center: Vector3<f64>,
    angle: f64,
}

impl NormalCone {
    /// The cone holding a single normal.
    pub fn new(normal: Vector3<f64>) -> Self {
        Self {
            center: normal,
            angle: 0.0,
        }
    }

    /// Half opening angle in radians.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Centre direction.
    pub fn center(&self) -> &Vector3<f64> {
        &self.center
    }

    /// Smallest cone containing both this cone and `normal`.
    pub fn merge_normal(&self, normal: &Vector3<f64>) -> Self {
        self.merge(&NormalCone::new(*normal))
    }

    /// Smallest cone containing both cones.
    pub fn merge(&self, other: &NormalCone) -> Self {
        let distance = self.center.dot(&other.center).clamp(-1.0, 1.0).acos();

        if distance + other.angle <= self.angle + 1e-12 {
            return *self;
        }
        if distance + self.angle <= other.angle + 1e-12 {
            return *other;
        }

        let angle = 0.5 * (distance + self.angle + other.angle);
        if angle >= std::f64::consts::PI {
            return Self {
                center: self.center,
                angle: std::f64::consts::PI,
            };
        }

        // Rotate the centre towards the other cone
        let axis = self.center.cross(&other.center);
        match Unit::try_new(axis, 1e-12) {
            Some(axis) => Self {
                center: UnitQuaternion::from_axis_angle(&axis, angle - self.angle) * self.center,
                angle,
            },
            // Antiparallel centres
            None => Self {
                center: self.center,
                angle: std::f64::consts::PI,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_quadric_measures_squared_distance() {
        let q = Quadric::from_plane(&Vector3::z(), &Point3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(q.evaluate(&Point3::new(5.0, -2.0, 1.0)), 0.0, epsilon = 1e-12);
        assert_relative_eq!(q.evaluate(&Point3::new(0.0, 0.0, 4.0)), 9.0, epsilon = 1e-12);

        let sum = q + Quadric::from_plane(&Vector3::x(), &Point3::origin()).scaled(2.0);
        assert_relative_eq!(sum.evaluate(&Point3::new(1.0, 0.0, 0.0)), 1.0 + 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cone_merge() {
        let cone = NormalCone::new(Vector3::z()).merge_normal(&Vector3::x());
        assert_relative_eq!(cone.angle(), std::f64::consts::FRAC_PI_4, epsilon = 1e-12);
        let expected = Vector3::new(1.0, 0.0, 1.0).normalize();
        assert_relative_eq!(*cone.center(), expected, epsilon = 1e-12);

        // A normal inside the cone leaves it unchanged
        let inside = cone.merge_normal(&expected);
        assert_eq!(inside, cone);

        // Opposite normals span everything
        let full = NormalCone::new(Vector3::z()).merge_normal(&-Vector3::z());
        assert_relative_eq!(full.angle(), std::f64::consts::PI, epsilon = 1e-12);
    }
}
