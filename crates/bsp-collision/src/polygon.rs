//! Convex polygon stored in a BSP tree's polygon pool.

use nalgebra::{Point3, Vector3};

use crate::{Classification, Plane3D, PLANE_EPSILON};

/// Polygons whose Newell normal (twice the area) is shorter than this are degenerate.
pub const MIN_POLYGON_AREA: f32 = 1e-6;

/// Edges shorter than this are treated as zero length.
pub const MIN_EDGE_LENGTH: f32 = 1e-6;

/// Index of a polygon in its tree's polygon pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolygonId(u32);

impl PolygonId {
    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the position of the polygon in [`BspTree::polygons`](crate::BspTree::polygons).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A planar convex polygon referencing vertices of a shared vertex pool.
///
/// The face normal follows the right-hand rule over the vertex winding.
/// Each edge `i` runs from vertex `i` to vertex `i + 1` and has an edge plane
/// perpendicular to the face, with the polygon interior on its positive side.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    id: i32,
    collision_mask: i32,
    indices: Vec<u32>,
    plane: Plane3D,
    edge_planes: Vec<Plane3D>,
    bound_center: Point3<f32>,
    bound_radius_sq: f32,
}

impl Polygon {
    /// Creates a polygon from vertex indices into `vertices`.
    ///
    /// # Panics
    /// Panics if fewer than 3 indices are given, an index is out of range,
    /// or the polygon is degenerate (zero area or a zero-length edge).
    pub fn new(indices: Vec<u32>, id: i32, collision_mask: i32, vertices: &[Point3<f32>]) -> Self {
        Self::try_new(indices, id, collision_mask, vertices)
            .unwrap_or_else(|| panic!("Polygon {id} is degenerate"))
    }

    /// Creates a polygon from vertex indices into `vertices`.
    ///
    /// Returns `None` if the polygon is degenerate (zero area or a
    /// zero-length edge).
    ///
    /// # Panics
    /// Panics if fewer than 3 indices are given or an index is out of range.
    pub fn try_new(
        indices: Vec<u32>,
        id: i32,
        collision_mask: i32,
        vertices: &[Point3<f32>],
    ) -> Option<Self> {
        assert!(indices.len() >= 3, "Polygon must have at least 3 vertices");
        assert!(
            indices.iter().all(|&i| (i as usize) < vertices.len()),
            "Polygon vertex index out of range"
        );

        let points: Vec<Point3<f32>> = indices.iter().map(|&i| vertices[i as usize]).collect();

        let normal = newell_normal(&points);
        let len = normal.norm();
        if len < MIN_POLYGON_AREA {
            return None;
        }
        let normal = normal / len;

        let center = centroid(&points);
        let plane = Plane3D::from_point_and_normal(center, normal);

        let n = points.len();
        let mut edge_planes = Vec::with_capacity(n);
        for i in 0..n {
            let a = points[i];
            let b = points[(i + 1) % n];
            let edge = b - a;
            if edge.norm() < MIN_EDGE_LENGTH {
                return None;
            }
            let inward = normal.cross(&edge);
            if inward.norm() <= f32::EPSILON {
                return None;
            }
            edge_planes.push(Plane3D::from_point_and_normal(a, inward));
        }

        let bound_radius_sq = points
            .iter()
            .map(|p| (p - center).norm_squared())
            .fold(0.0, f32::max);

        Some(Self {
            id,
            collision_mask,
            indices,
            plane,
            edge_planes,
            bound_center: center,
            bound_radius_sq,
        })
    }

    /// Returns the user defined id of the polygon.
    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the collision mask used to filter queries.
    #[inline]
    pub fn collision_mask(&self) -> i32 {
        self.collision_mask
    }

    /// Returns `true` if this polygon takes part in queries using `mask`.
    #[inline]
    pub fn matches_mask(&self, mask: i32) -> bool {
        self.collision_mask & mask != 0
    }

    /// Returns the number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.indices.len()
    }

    /// Returns the vertex pool indices of the polygon, in winding order.
    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Returns the pool index of the `i`th vertex.
    #[inline]
    pub fn vertex_index(&self, i: usize) -> u32 {
        self.indices[i]
    }

    /// Returns the `i`th vertex position, looked up in the owning vertex pool.
    #[inline]
    pub fn vertex(&self, pool: &[Point3<f32>], i: usize) -> Point3<f32> {
        pool[self.indices[i] as usize]
    }

    /// Iterates the vertex positions, looked up in the owning vertex pool.
    pub fn vertices<'a>(&'a self, pool: &'a [Point3<f32>]) -> impl Iterator<Item = Point3<f32>> + 'a {
        self.indices.iter().map(move |&i| pool[i as usize])
    }

    /// Returns the supporting plane of the polygon.
    #[inline]
    pub fn plane(&self) -> &Plane3D {
        &self.plane
    }

    /// Returns the plane of edge `i` (from vertex `i` to vertex `i + 1`).
    #[inline]
    pub fn edge_plane(&self, i: usize) -> &Plane3D {
        &self.edge_planes[i]
    }

    /// Returns all edge planes.
    #[inline]
    pub fn edge_planes(&self) -> &[Plane3D] {
        &self.edge_planes
    }

    /// Returns `true` if the point is inside the polygon (inclusive).
    ///
    /// Assumes the point lies on the polygon plane.
    pub fn contains_point(&self, point: Point3<f32>) -> bool {
        self.edge_planes
            .iter()
            .all(|ep| ep.signed_distance(point) >= -PLANE_EPSILON)
    }

    /// Returns the centre of the bounding sphere.
    #[inline]
    pub fn bound_center(&self) -> Point3<f32> {
        self.bound_center
    }

    /// Returns the bounding sphere radius squared.
    #[inline]
    pub fn bound_radius_squared(&self) -> f32 {
        self.bound_radius_sq
    }

    /// Returns the squared distance to the bounding sphere centre minus the
    /// squared bounding radius. Negative inside the bounding sphere.
    #[inline]
    pub fn distance_squared(&self, point: Point3<f32>) -> f32 {
        (self.bound_center - point).norm_squared() - self.bound_radius_sq
    }

    /// Computes the polygon area.
    pub fn area(&self, pool: &[Point3<f32>]) -> f32 {
        let points: Vec<Point3<f32>> = self.vertices(pool).collect();
        newell_normal(&points).norm() * 0.5
    }

    /// Classifies this polygon relative to a plane.
    pub fn classify(&self, plane: &Plane3D, pool: &[Point3<f32>]) -> Classification {
        plane.classify_points(self.vertices(pool))
    }
}

/// Computes the (unnormalized) polygon normal with Newell's method.
///
/// The length is twice the polygon area; the direction follows the winding.
pub fn newell_normal(points: &[Point3<f32>]) -> Vector3<f32> {
    let n = points.len();
    let mut normal = Vector3::zeros();
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    normal
}

/// Computes the centroid (vertex average) of a point set.
pub fn centroid(points: &[Point3<f32>]) -> Point3<f32> {
    let sum: Vector3<f32> = points.iter().map(|p| p.coords).sum();
    Point3::from(sum / points.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_pool() -> Vec<Point3<f32>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn plane_follows_winding() {
        let pool = square_pool();
        let poly = Polygon::new(vec![0, 1, 2, 3], 7, -1, &pool);

        assert_eq!(poly.id(), 7);
        assert_eq!(poly.vertex_count(), 4);
        assert!((poly.plane().normal() - Vector3::z()).norm() < 1e-6);
        assert!(poly.plane().offset().abs() < 1e-6);
        assert_eq!(poly.edge_planes().len(), 4);
    }

    #[test]
    fn edge_planes_face_inward() {
        let pool = square_pool();
        let poly = Polygon::new(vec![0, 1, 2, 3], 0, -1, &pool);
        let center = Point3::new(0.5, 0.5, 0.0);

        for ep in poly.edge_planes() {
            assert!(ep.signed_distance(center) > 0.0);
        }
    }

    #[test]
    fn contains_point_is_inclusive() {
        let pool = square_pool();
        let poly = Polygon::new(vec![0, 1, 2, 3], 0, -1, &pool);

        assert!(poly.contains_point(Point3::new(0.5, 0.5, 0.0)));
        assert!(poly.contains_point(Point3::new(1.0, 1.0, 0.0)));
        assert!(poly.contains_point(Point3::new(0.0, 0.5, 0.0)));
        assert!(!poly.contains_point(Point3::new(1.5, 0.5, 0.0)));
        assert!(!poly.contains_point(Point3::new(0.5, -0.1, 0.0)));
    }

    #[test]
    fn bound_sphere_covers_vertices() {
        let pool = square_pool();
        let poly = Polygon::new(vec![0, 1, 2, 3], 0, -1, &pool);

        assert!((poly.bound_radius_squared() - 0.5).abs() < 1e-6);
        for v in poly.vertices(&pool) {
            assert!(poly.distance_squared(v) <= 1e-6);
        }
        assert!(poly.distance_squared(Point3::new(5.0, 5.0, 5.0)) > 0.0);
    }

    #[test]
    fn degenerate_polygon_rejected() {
        let pool = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        assert!(Polygon::try_new(vec![0, 1, 2], 0, -1, &pool).is_none());
    }

    #[test]
    #[should_panic(expected = "at least 3 vertices")]
    fn too_few_vertices_panics() {
        let pool = square_pool();
        let _ = Polygon::try_new(vec![0, 1], 0, -1, &pool);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_index_panics() {
        let pool = square_pool();
        let _ = Polygon::try_new(vec![0, 1, 9], 0, -1, &pool);
    }

    #[test]
    fn mask_filtering() {
        let pool = square_pool();
        let poly = Polygon::new(vec![0, 1, 2, 3], 0, 0b0110, &pool);

        assert!(poly.matches_mask(-1));
        assert!(poly.matches_mask(0b0010));
        assert!(!poly.matches_mask(0b1001));
        assert!(!poly.matches_mask(0));
    }

    #[test]
    fn area_of_unit_square() {
        let pool = square_pool();
        let poly = Polygon::new(vec![0, 1, 2, 3], 0, -1, &pool);
        assert!((poly.area(&pool) - 1.0).abs() < 1e-6);
    }
}
