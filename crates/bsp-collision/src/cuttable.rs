//! Working polygons used during tree construction, and splitting them by planes.

use nalgebra::Point3;

use crate::polygon::{newell_normal, MIN_POLYGON_AREA};
use crate::vertex_pool::VertexPool;
use crate::{Classification, Plane3D, PlaneSide};

/// A source polygon (or a fragment of one) awaiting placement in the tree.
///
/// Fragments keep the id, collision mask and supporting plane of the
/// polygon they were cut from.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPolygon {
    indices: Vec<u32>,
    plane: Plane3D,
    id: i32,
    collision_mask: i32,
}

impl BuildPolygon {
    pub(crate) fn new(indices: Vec<u32>, plane: Plane3D, id: i32, collision_mask: i32) -> Self {
        debug_assert!(indices.len() >= 3, "Polygon must have at least 3 vertices");
        Self {
            indices,
            plane,
            id,
            collision_mask,
        }
    }

    /// Returns the vertex pool indices in winding order.
    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Returns the supporting plane.
    #[inline]
    pub fn plane(&self) -> &Plane3D {
        &self.plane
    }

    /// Returns the user defined id.
    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the collision mask.
    #[inline]
    pub fn collision_mask(&self) -> i32 {
        self.collision_mask
    }

    /// Iterates the vertex positions.
    pub fn vertices<'a>(&'a self, pool: &'a [Point3<f32>]) -> impl Iterator<Item = Point3<f32>> + 'a {
        self.indices.iter().map(move |&i| pool[i as usize])
    }

    /// Classifies this polygon relative to a plane.
    pub fn classify(&self, plane: &Plane3D, pool: &[Point3<f32>]) -> Classification {
        plane.classify_points(self.vertices(pool))
    }

    pub(crate) fn into_indices(self) -> Vec<u32> {
        self.indices
    }
}

/// Trait for geometry that can be cut by a plane.
pub trait Cuttable: Sized {
    /// Cuts the geometry by a plane, inserting new vertices into `pool`.
    ///
    /// Returns `(front, back)`:
    ///
    /// - **Front**: `(Some(self), None)`
    /// - **Back**: `(None, Some(self))`
    /// - **Coplanar**: `(Some(self), None)`, treated as front
    /// - **Spanning**: the two pieces; a piece thinner than the plane
    ///   tolerance collapses to `None`
    fn cut(&self, plane: &Plane3D, pool: &mut VertexPool) -> (Option<Self>, Option<Self>);
}

impl Cuttable for BuildPolygon {
    fn cut(&self, plane: &Plane3D, pool: &mut VertexPool) -> (Option<Self>, Option<Self>) {
        match self.classify(plane, pool.as_slice()) {
            Classification::Front | Classification::Coplanar => (Some(self.clone()), None),
            Classification::Back => (None, Some(self.clone())),
            Classification::Spanning => split_polygon(self, plane, pool),
        }
    }
}

/// Splits a spanning polygon into front and back parts.
///
/// Walks the polygon edges Sutherland-Hodgman style and builds two index
/// lists, inserting intersection vertices where edges cross the plane.
fn split_polygon(
    polygon: &BuildPolygon,
    plane: &Plane3D,
    pool: &mut VertexPool,
) -> (Option<BuildPolygon>, Option<BuildPolygon>) {
    let indices = polygon.indices();
    let n = indices.len();

    let mut front_idx = Vec::with_capacity(n + 1);
    let mut back_idx = Vec::with_capacity(n + 1);

    let sides: Vec<PlaneSide> = indices
        .iter()
        .map(|&i| plane.classify_point(pool.as_slice()[i as usize]))
        .collect();

    for i in 0..n {
        let current = indices[i];
        let current_side = sides[i];
        let next = indices[(i + 1) % n];
        let next_side = sides[(i + 1) % n];

        match current_side {
            PlaneSide::Front => front_idx.push(current),
            PlaneSide::Back => back_idx.push(current),
            PlaneSide::OnPlane => {
                front_idx.push(current);
                back_idx.push(current);
            }
        }

        let crosses = matches!(
            (current_side, next_side),
            (PlaneSide::Front, PlaneSide::Back) | (PlaneSide::Back, PlaneSide::Front)
        );

        if crosses {
            let split = edge_split_point(plane, current, next, pool.as_slice());
            let index = pool.insert(split);
            front_idx.push(index);
            back_idx.push(index);
        }
    }

    let front = make_fragment(polygon, front_idx, pool.as_slice());
    let back = make_fragment(polygon, back_idx, pool.as_slice());
    (front, back)
}

/// Computes where the edge `a`-`b` crosses the plane.
///
/// Endpoints are ordered by pool index so the shared edge of two
/// neighbouring polygons yields a bit-identical (and thus welded) vertex.
fn edge_split_point(plane: &Plane3D, a: u32, b: u32, pool: &[Point3<f32>]) -> Point3<f32> {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    let p0 = pool[lo as usize];
    let p1 = pool[hi as usize];
    let d0 = plane.signed_distance(p0);
    let d1 = plane.signed_distance(p1);
    let t = d0 / (d0 - d1);
    p0 + (p1 - p0) * t
}

fn make_fragment(
    parent: &BuildPolygon,
    mut indices: Vec<u32>,
    pool: &[Point3<f32>],
) -> Option<BuildPolygon> {
    indices.dedup();
    while indices.len() > 1 && indices.first() == indices.last() {
        indices.pop();
    }
    if indices.len() < 3 {
        return None;
    }

    let points: Vec<Point3<f32>> = indices.iter().map(|&i| pool[i as usize]).collect();
    if newell_normal(&points).norm() < MIN_POLYGON_AREA {
        return None;
    }

    Some(BuildPolygon::new(
        indices,
        parent.plane,
        parent.id,
        parent.collision_mask,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn quad(pool: &mut VertexPool, points: [[f32; 3]; 4], id: i32) -> BuildPolygon {
        let indices: Vec<u32> = points
            .iter()
            .map(|p| pool.insert(Point3::new(p[0], p[1], p[2])))
            .collect();
        let plane = Plane3D::from_three_points(
            pool.as_slice()[indices[0] as usize],
            pool.as_slice()[indices[1] as usize],
            pool.as_slice()[indices[2] as usize],
        );
        BuildPolygon::new(indices, plane, id, 3)
    }

    fn area(poly: &BuildPolygon, pool: &VertexPool) -> f32 {
        let points: Vec<_> = poly.vertices(pool.as_slice()).collect();
        newell_normal(&points).norm() * 0.5
    }

    #[test]
    fn cut_front_keeps_polygon() {
        let mut pool = VertexPool::new();
        let poly = quad(
            &mut pool,
            [[0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 2.0, 0.0], [0.0, 2.0, 0.0]],
            1,
        );
        let plane = Plane3D::new(Vector3::y(), 0.0);

        let (front, back) = poly.cut(&plane, &mut pool);
        assert_eq!(front, Some(poly));
        assert!(back.is_none());
    }

    #[test]
    fn cut_coplanar_is_front() {
        let mut pool = VertexPool::new();
        let poly = quad(
            &mut pool,
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            1,
        );
        let plane = Plane3D::new(Vector3::z(), 0.0);

        let (front, back) = poly.cut(&plane, &mut pool);
        assert!(front.is_some());
        assert!(back.is_none());
    }

    #[test]
    fn spanning_quad_splits_in_two() {
        let mut pool = VertexPool::new();
        let poly = quad(
            &mut pool,
            [[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]],
            9,
        );
        let before = area(&poly, &pool);
        let plane = Plane3D::new(Vector3::x(), 0.0);

        let (front, back) = poly.cut(&plane, &mut pool);
        let front = front.unwrap();
        let back = back.unwrap();

        assert_eq!(front.indices().len(), 4);
        assert_eq!(back.indices().len(), 4);
        assert_eq!(front.id(), 9);
        assert_eq!(back.collision_mask(), 3);
        assert_eq!(front.plane(), poly.plane());

        for v in front.vertices(pool.as_slice()) {
            assert!(v.x >= -1e-6);
        }
        for v in back.vertices(pool.as_slice()) {
            assert!(v.x <= 1e-6);
        }

        let after = area(&front, &pool) + area(&back, &pool);
        assert!((before - after).abs() < 1e-5);

        // the fragments keep the parent's winding
        let n_front = {
            let pts: Vec<_> = front.vertices(pool.as_slice()).collect();
            newell_normal(&pts)
        };
        assert!(n_front.dot(&poly.plane().normal()) > 0.0);
    }

    #[test]
    fn neighbours_share_split_vertex() {
        let mut pool = VertexPool::new();
        let a = quad(
            &mut pool,
            [[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]],
            0,
        );
        let b = quad(
            &mut pool,
            [[-1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 2.0, 0.0], [-1.0, 2.0, 0.0]],
            1,
        );
        let plane = Plane3D::new(Vector3::new(1.0, 0.3, 0.0), 0.1);

        let before = pool.len();
        let _ = a.cut(&plane, &mut pool);
        let after_a = pool.len();
        let _ = b.cut(&plane, &mut pool);

        // a adds two split points; b reuses the one on the shared edge
        assert_eq!(after_a - before, 2);
        assert_eq!(pool.len() - after_a, 1);
    }

    #[test]
    fn triangle_split_through_vertex() {
        let mut pool = VertexPool::new();
        let i0 = pool.insert(Point3::new(0.0, 0.0, 0.0));
        let i1 = pool.insert(Point3::new(1.0, -1.0, 0.0));
        let i2 = pool.insert(Point3::new(1.0, 1.0, 0.0));
        let plane0 = Plane3D::new(Vector3::z(), 0.0);
        let tri = BuildPolygon::new(vec![i0, i1, i2], plane0, 4, -1);

        // cuts through vertex 0 and the opposite edge
        let plane = Plane3D::new(Vector3::y(), 0.0);
        let (front, back) = tri.cut(&plane, &mut pool);

        assert_eq!(front.unwrap().indices().len(), 3);
        assert_eq!(back.unwrap().indices().len(), 3);
    }
}
