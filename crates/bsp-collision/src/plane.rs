//! Plane representation and classification for BSP trees.

use nalgebra::{Point3, Vector3};

/// Thickness (+-) of a plane.
///
/// Points within this distance of a plane are considered "on" the plane.
/// The same tolerance drives partitioning, planarity checks, traversal
/// slab tests and the inclusive point-in-polygon test.
pub const PLANE_EPSILON: f32 = 1e-3;

/// Side of a plane a single point is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSide {
    Front,
    Back,
    /// Within [`PLANE_EPSILON`] of the plane.
    OnPlane,
}

/// Where a polygon lies relative to a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Some vertex in front, none behind.
    Front,
    /// Some vertex behind, none in front.
    Back,
    /// Every vertex within [`PLANE_EPSILON`].
    Coplanar,
    /// Vertices on both sides.
    Spanning,
}

/// Classifies a sequence of signed vertex distances against [`PLANE_EPSILON`].
pub fn classify_distances(distances: impl IntoIterator<Item = f32>) -> Classification {
    let mut front = false;
    let mut back = false;

    for dist in distances {
        if dist >= PLANE_EPSILON {
            front = true;
        } else if dist <= -PLANE_EPSILON {
            back = true;
        }
    }

    match (front, back) {
        (false, false) => Classification::Coplanar,
        (true, false) => Classification::Front,
        (false, true) => Classification::Back,
        (true, true) => Classification::Spanning,
    }
}

/// Oriented plane `normal · p = offset` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane3D {
    normal: Vector3<f32>,
    offset: f32,
}

impl Plane3D {
    /// Plane `normal · p = offset`, rescaled so the normal has unit length.
    ///
    /// # Panics
    /// If `normal` is zero.
    pub fn new(normal: Vector3<f32>, offset: f32) -> Self {
        let norm = normal.norm();
        assert!(norm > f32::EPSILON, "Plane normal cannot be zero");
        Self {
            normal: normal / norm,
            offset: offset / norm,
        }
    }

    /// Plane through `point` facing along `normal` (not necessarily unit).
    ///
    /// # Panics
    /// If `normal` is zero.
    pub fn from_point_and_normal(point: Point3<f32>, normal: Vector3<f32>) -> Self {
        let norm = normal.norm();
        assert!(norm > f32::EPSILON, "Plane normal cannot be zero");
        let unit_normal = normal / norm;
        let offset = unit_normal.dot(&point.coords);
        Self {
            normal: unit_normal,
            offset,
        }
    }

    /// Plane through a counter-clockwise triangle, normal `(b - a) × (c - a)`.
    ///
    /// # Panics
    /// If the points are collinear.
    pub fn from_three_points(a: Point3<f32>, b: Point3<f32>, c: Point3<f32>) -> Self {
        let ab = b - a;
        let ac = c - a;
        let normal = ab.cross(&ac);
        Self::from_point_and_normal(a, normal)
    }

    /// Unit normal.
    #[inline]
    pub fn normal(&self) -> Vector3<f32> {
        self.normal
    }

    /// Distance of the plane from the origin along the normal.
    #[inline]
    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Returns the plane as `(nx, ny, nz, w)` with `n·p + w = 0`.
    #[inline]
    pub fn to_array(&self) -> [f32; 4] {
        [self.normal.x, self.normal.y, self.normal.z, -self.offset]
    }

    /// Builds a plane from `(nx, ny, nz, w)` with `n·p + w = 0`.
    ///
    /// The normal is taken as is; stored planes are already normalized.
    #[inline]
    pub fn from_array(v: [f32; 4]) -> Self {
        Self {
            normal: Vector3::new(v[0], v[1], v[2]),
            offset: -v[3],
        }
    }

    /// Returns `true` if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.normal.iter().all(|c| c.is_finite()) && self.offset.is_finite()
    }

    /// Signed distance of `point`; positive on the side the normal faces.
    #[inline]
    pub fn signed_distance(&self, point: Point3<f32>) -> f32 {
        self.normal.dot(&point.coords) - self.offset
    }

    /// Classifies which side of the plane a point lies on, using [`PLANE_EPSILON`].
    pub fn classify_point(&self, point: Point3<f32>) -> PlaneSide {
        let dist = self.signed_distance(point);
        if dist >= PLANE_EPSILON {
            PlaneSide::Front
        } else if dist <= -PLANE_EPSILON {
            PlaneSide::Back
        } else {
            PlaneSide::OnPlane
        }
    }

    /// Classifies polygon vertices against the plane.
    pub fn classify_points<I>(&self, points: I) -> Classification
    where
        I: IntoIterator<Item = Point3<f32>>,
    {
        classify_distances(points.into_iter().map(|p| self.signed_distance(p)))
    }

    /// Closest point on the plane.
    #[inline]
    pub fn project_point(&self, point: Point3<f32>) -> Point3<f32> {
        point - self.normal * self.signed_distance(point)
    }

    /// Finds where a ray starting on the positive side first reaches the plane.
    ///
    /// Returns the ray parameter `t >= 0` (in units of `dir`), or `None` if the
    /// origin is on or behind the plane, or the ray points away or along it.
    pub fn ray_entry(&self, origin: Point3<f32>, dir: Vector3<f32>) -> Option<f32> {
        let dist = self.signed_distance(origin);
        if dist <= 0.0 {
            return None;
        }

        let denom = self.normal.dot(&dir);
        if denom > -f32::MIN_POSITIVE {
            return None;
        }

        Some(-dist / denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes() {
        let plane = Plane3D::new(Vector3::new(0.0, 2.0, 0.0), 4.0);
        assert!((plane.normal() - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-6);
        assert!((plane.offset() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn from_three_points_follows_winding() {
        let plane = Plane3D::from_three_points(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        assert!(plane.normal().z > 0.99);
        assert_eq!(plane.classify_point(Point3::new(0.0, 0.0, 1.0)), PlaneSide::Front);
        assert_eq!(plane.classify_point(Point3::new(0.0, 0.0, -1.0)), PlaneSide::Back);
        assert_eq!(plane.classify_point(Point3::new(5.0, 5.0, 0.0)), PlaneSide::OnPlane);
    }

    #[test]
    fn array_form_stores_negated_offset() {
        let plane = Plane3D::from_point_and_normal(Point3::new(0.0, 3.0, 0.0), Vector3::y());
        let arr = plane.to_array();
        assert_eq!(arr, [0.0, 1.0, 0.0, -3.0]);
        assert_eq!(Plane3D::from_array(arr), plane);
    }

    #[test]
    fn classify_distances_buckets() {
        assert_eq!(classify_distances([0.0, 1e-4, -1e-4]), Classification::Coplanar);
        assert_eq!(classify_distances([0.0, 1.0, 0.5]), Classification::Front);
        assert_eq!(classify_distances([0.0, -1.0]), Classification::Back);
        assert_eq!(classify_distances([1.0, -1.0]), Classification::Spanning);
    }

    #[test]
    fn ray_entry_requires_front_origin() {
        let plane = Plane3D::new(Vector3::new(0.0, 0.0, 1.0), 0.0);
        let t = plane
            .ray_entry(Point3::new(0.0, 0.0, 2.0), Vector3::new(0.0, 0.0, -4.0))
            .unwrap();
        assert!((t - 0.5).abs() < 1e-6);

        assert!(plane
            .ray_entry(Point3::new(0.0, 0.0, -2.0), Vector3::new(0.0, 0.0, 4.0))
            .is_none());
        assert!(plane
            .ray_entry(Point3::new(0.0, 0.0, 2.0), Vector3::new(1.0, 0.0, 0.0))
            .is_none());
    }
}
