//! Line segment and swept sphere queries against a [`BspTree`].
//!
//! Polygons are single-sided: a segment only hits a polygon when it comes
//! from the front of the polygon plane. Every query takes a collision mask;
//! polygons whose mask shares no bit with it are ignored, so `-1` collides
//! with everything.
//!
//! ```ignore
//! let mut collider = Collider::new(&tree);
//! if let Some(hit) = collider.find_moving_sphere_intersection(start, delta, 0.5, -1) {
//!     let stop = start + delta * hit.t;
//! }
//! ```

use nalgebra::{Point3, Vector3};

use crate::bsp::{BspTree, NodeId};
use crate::polygon::MIN_EDGE_LENGTH;
use crate::{PolygonId, PLANE_EPSILON};

/// A line segment hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineHit {
    /// Relative position `[0, 1]` of the hit along the segment.
    pub t: f32,
    /// The polygon that was hit.
    pub polygon: PolygonId,
}

impl LineHit {
    /// Returns the hit position on the segment `start + delta * t`.
    #[inline]
    pub fn point(&self, start: Point3<f32>, delta: Vector3<f32>) -> Point3<f32> {
        start + delta * self.t
    }
}

/// The first contact of a swept sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereHit {
    /// Relative position `[0, 1]` of the sphere centre along the sweep.
    pub t: f32,
    /// The polygon that was hit.
    pub polygon: PolygonId,
    /// Contact normal: the face normal, or the direction from the touched
    /// edge or vertex towards the sphere centre.
    pub normal: Vector3<f32>,
    /// Contact point on the polygon.
    pub point: Point3<f32>,
}

/// Counters of polygon tests done by a [`Collider`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionStats {
    /// Polygons tested by line queries.
    pub line_polygon_tests: u64,
    /// Polygons tested by sphere queries (after bounding sphere rejection).
    pub sphere_polygon_tests: u64,
}

impl CollisionStats {
    /// Resets all counters to zero.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Query context over a tree.
///
/// A collider holds only per-query state and statistics; any number of them
/// can query the same tree concurrently.
#[derive(Debug, Clone)]
pub struct Collider<'a> {
    tree: &'a BspTree,
    stats: CollisionStats,
    line_steps: Vec<LineStep>,
    sphere_steps: Vec<SphereStep>,
}

impl<'a> Collider<'a> {
    /// Creates a collider for `tree`.
    pub fn new(tree: &'a BspTree) -> Self {
        Self {
            tree,
            stats: CollisionStats::default(),
            line_steps: Vec::new(),
            sphere_steps: Vec::new(),
        }
    }

    /// Returns the queried tree.
    #[inline]
    pub fn tree(&self) -> &'a BspTree {
        self.tree
    }

    /// Returns the statistics accumulated so far.
    #[inline]
    pub fn stats(&self) -> &CollisionStats {
        &self.stats
    }

    /// Resets the statistics.
    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    /// Finds the nearest hit of the segment `[start, start + delta]`.
    ///
    /// A zero-length segment never hits anything.
    pub fn find_line_intersection(
        &mut self,
        start: Point3<f32>,
        delta: Vector3<f32>,
        collision_mask: i32,
    ) -> Option<LineHit> {
        self.line_query(start, delta, collision_mask, LineOrder::Nearest)
    }

    /// Finds the farthest hit of the segment `[start, start + delta]`.
    pub fn find_last_line_intersection(
        &mut self,
        start: Point3<f32>,
        delta: Vector3<f32>,
        collision_mask: i32,
    ) -> Option<LineHit> {
        self.line_query(start, delta, collision_mask, LineOrder::Farthest)
    }

    /// Finds the first contact of a sphere of `radius` moving from `start`
    /// to `start + delta`.
    ///
    /// Faces, edges and vertices are tested. If the sphere already touches
    /// a polygon at `start` the hit has `t = 0`; among several such contacts
    /// the one closest to the sphere centre is reported. With zero-length
    /// `delta` only those initial contacts are found.
    ///
    /// A `radius <= 0` is a line query: the hit reports the face normal and
    /// the point on the segment.
    pub fn find_moving_sphere_intersection(
        &mut self,
        start: Point3<f32>,
        delta: Vector3<f32>,
        radius: f32,
        collision_mask: i32,
    ) -> Option<SphereHit> {
        if radius <= 0.0 {
            let hit = self.find_line_intersection(start, delta, collision_mask)?;
            return Some(SphereHit {
                t: hit.t,
                polygon: hit.polygon,
                normal: self.tree.polygon(hit.polygon).plane().normal(),
                point: hit.point(start, delta),
            });
        }

        let query = SphereQuery {
            start,
            end: start + delta,
            delta,
            radius,
            mask: collision_mask,
            move_center: start + delta * 0.5,
            move_radius: delta.norm() * 0.5 + radius,
        };
        let mut best = SphereBest {
            t: 1.0,
            contact: None,
        };
        self.sphere_walk(&query, &mut best);

        best.contact.map(|(polygon, normal, point)| SphereHit {
            t: best.t,
            polygon,
            normal,
            point,
        })
    }

    fn line_query(
        &mut self,
        start: Point3<f32>,
        delta: Vector3<f32>,
        mask: i32,
        order: LineOrder,
    ) -> Option<LineHit> {
        if delta.norm_squared() < f32::MIN_POSITIVE {
            return None;
        }

        let query = LineQuery {
            start,
            end: start + delta,
            delta,
            mask,
            order,
        };
        let mut best = LineBest {
            t: order.initial_t(),
            polygon: None,
        };
        self.line_walk(&query, &mut best);

        best.polygon.map(|polygon| LineHit { t: best.t, polygon })
    }

    /// Visits nodes front to back along the segment, or back to front for
    /// [`LineOrder::Farthest`].
    fn line_walk(&mut self, q: &LineQuery, best: &mut LineBest) {
        let tree = self.tree;
        let mut steps = std::mem::take(&mut self.line_steps);
        steps.clear();
        steps.extend(tree.root().map(LineStep::Visit));

        while let Some(step) = steps.pop() {
            let id = match step {
                LineStep::Visit(id) => id,
                LineStep::Polygons(id) => {
                    self.line_polygons(id, q, best);
                    continue;
                }
                LineStep::Crossed { node, before, second } => {
                    // anything found on the first side beats the plane and beyond
                    if best.polygon == before {
                        steps.extend(second.map(LineStep::Visit));
                        steps.push(LineStep::Polygons(node));
                    }
                    continue;
                }
            };

            let node = tree.node(id);
            let s = node.plane().signed_distance(q.start);
            let e = node.plane().signed_distance(q.end);

            if s > 0.0 && e > 0.0 {
                if s <= PLANE_EPSILON || e <= PLANE_EPSILON {
                    steps.push(LineStep::Polygons(id));
                }
                steps.extend(node.positive().map(LineStep::Visit));
            } else if s <= 0.0 && e <= 0.0 {
                if -s <= PLANE_EPSILON || -e <= PLANE_EPSILON {
                    steps.push(LineStep::Polygons(id));
                }
                steps.extend(node.negative().map(LineStep::Visit));
            } else {
                let (start_side, end_side) = if s > 0.0 {
                    (node.positive(), node.negative())
                } else {
                    (node.negative(), node.positive())
                };
                let (first, second) = match q.order {
                    LineOrder::Nearest => (start_side, end_side),
                    LineOrder::Farthest => (end_side, start_side),
                };
                steps.push(LineStep::Crossed {
                    node: id,
                    before: best.polygon,
                    second,
                });
                steps.extend(first.map(LineStep::Visit));
            }
        }

        self.line_steps = steps;
    }

    fn line_polygons(&mut self, node: NodeId, q: &LineQuery, best: &mut LineBest) {
        let tree = self.tree;
        for &id in tree.node_polygons(node) {
            let polygon = tree.polygon(id);
            if !polygon.matches_mask(q.mask) {
                continue;
            }
            self.stats.line_polygon_tests += 1;

            let s = polygon.plane().signed_distance(q.start);
            let e = polygon.plane().signed_distance(q.end);
            if s <= -PLANE_EPSILON || e >= PLANE_EPSILON {
                continue;
            }

            let dd = s - e;
            if dd <= f32::MIN_POSITIVE {
                // along the plane
                continue;
            }

            let u = (s / dd).clamp(0.0, 1.0);
            if q.order.improves(u, best.t) && polygon.contains_point(q.start + q.delta * u) {
                best.t = u;
                best.polygon = Some(id);
            }
        }
    }

    fn sphere_walk(&mut self, q: &SphereQuery, best: &mut SphereBest) {
        let tree = self.tree;
        let r = q.radius;
        let mut steps = std::mem::take(&mut self.sphere_steps);
        steps.clear();
        steps.extend(tree.root().map(SphereStep::Visit));

        while let Some(step) = steps.pop() {
            let id = match step {
                SphereStep::Visit(id) => id,
                SphereStep::Polygons(id) => {
                    self.sphere_polygons(id, q, best);
                    continue;
                }
            };

            let node = tree.node(id);
            let s = node.plane().signed_distance(q.start);
            let e = node.plane().signed_distance(q.end);

            // pushed in reverse visiting order
            if s > 0.0 && e > 0.0 {
                if s - r <= PLANE_EPSILON || e - r <= PLANE_EPSILON {
                    steps.extend(node.negative().map(SphereStep::Visit));
                    steps.push(SphereStep::Polygons(id));
                }
                steps.extend(node.positive().map(SphereStep::Visit));
            } else if s <= 0.0 && e <= 0.0 {
                if -s - r <= PLANE_EPSILON || -e - r <= PLANE_EPSILON {
                    steps.extend(node.positive().map(SphereStep::Visit));
                    steps.push(SphereStep::Polygons(id));
                }
                steps.extend(node.negative().map(SphereStep::Visit));
            } else {
                let (first, second) = if s > 0.0 {
                    (node.positive(), node.negative())
                } else {
                    (node.negative(), node.positive())
                };
                steps.extend(second.map(SphereStep::Visit));
                steps.push(SphereStep::Polygons(id));
                steps.extend(first.map(SphereStep::Visit));
            }
        }

        self.sphere_steps = steps;
    }

    fn sphere_polygons(&mut self, node: NodeId, q: &SphereQuery, best: &mut SphereBest) {
        let tree = self.tree;
        for &id in tree.node_polygons(node) {
            let polygon = tree.polygon(id);
            if !polygon.matches_mask(q.mask) {
                continue;
            }

            // bounding spheres of the sweep and the polygon must overlap
            let bound_radius = polygon.bound_radius_squared().sqrt();
            let reach = q.move_radius + PLANE_EPSILON;
            if polygon.distance_squared(q.move_center) > reach * (reach + 2.0 * bound_radius) {
                continue;
            }
            self.stats.sphere_polygon_tests += 1;

            self.sphere_polygon(id, q, best);
        }
    }

    fn sphere_polygon(&mut self, id: PolygonId, q: &SphereQuery, best: &mut SphereBest) {
        let polygon = self.tree.polygon(id);
        let pool = self.tree.vertices();
        let plane = polygon.plane();
        let normal = plane.normal();
        let r = q.radius;

        let s = plane.signed_distance(q.start);
        let e = plane.signed_distance(q.end);
        if (s - r > PLANE_EPSILON && e - r > PLANE_EPSILON)
            || (-s - r > PLANE_EPSILON && -e - r > PLANE_EPSILON)
        {
            return;
        }

        // face; resting exactly at distance r is already a contact
        if s > 0.0 && s <= r {
            let point = plane.project_point(q.start);
            if polygon.contains_point(point) {
                best.offer(q.start, 0.0, id, normal, point);
                return;
            }
        } else {
            let shifted = q.start - normal * r;
            if let Some(u) = plane.ray_entry(shifted, q.delta) {
                if u < 1.0 && u <= best.t {
                    let point = shifted + q.delta * u;
                    if polygon.contains_point(point) {
                        best.offer(q.start, u, id, normal, point);
                        return;
                    }
                }
            }
        }

        // vertices
        for vertex in polygon.vertices(pool) {
            let Some(u) = sweep_point(q.start, q.delta, vertex, r) else {
                continue;
            };
            if u > best.t {
                continue;
            }
            let center = q.start + q.delta * u;
            let contact_normal = (center - vertex)
                .try_normalize(f32::MIN_POSITIVE)
                .unwrap_or(normal);
            let point = if u == 0.0 {
                vertex
            } else {
                center - contact_normal * r
            };
            best.offer(q.start, u, id, contact_normal, point);
        }

        // edges
        let n = polygon.vertex_count();
        for i in 0..n {
            let a = polygon.vertex(pool, i);
            let b = polygon.vertex(pool, (i + 1) % n);
            if let Some(contact) = sweep_edge(q.start, q.delta, a, b, r, normal) {
                if contact.t <= best.t {
                    best.offer(q.start, contact.t, id, contact.normal, contact.point);
                }
            }
        }
    }
}

/// Finds the nearest hit of the segment `[start, start + delta]` in `tree`.
pub fn find_line_intersection(
    tree: &BspTree,
    start: Point3<f32>,
    delta: Vector3<f32>,
    collision_mask: i32,
) -> Option<LineHit> {
    Collider::new(tree).find_line_intersection(start, delta, collision_mask)
}

/// Finds the farthest hit of the segment `[start, start + delta]` in `tree`.
pub fn find_last_line_intersection(
    tree: &BspTree,
    start: Point3<f32>,
    delta: Vector3<f32>,
    collision_mask: i32,
) -> Option<LineHit> {
    Collider::new(tree).find_last_line_intersection(start, delta, collision_mask)
}

/// Finds the first contact of a sphere swept through `tree`.
///
/// See [`Collider::find_moving_sphere_intersection`].
pub fn find_moving_sphere_intersection(
    tree: &BspTree,
    start: Point3<f32>,
    delta: Vector3<f32>,
    radius: f32,
    collision_mask: i32,
) -> Option<SphereHit> {
    Collider::new(tree).find_moving_sphere_intersection(start, delta, radius, collision_mask)
}

/// Pending work of a line walk.
#[derive(Debug, Clone, Copy)]
enum LineStep {
    Visit(NodeId),
    Polygons(NodeId),
    /// The first side of a crossed node is done; `before` is the best
    /// polygon from before it was visited.
    Crossed {
        node: NodeId,
        before: Option<PolygonId>,
        second: Option<NodeId>,
    },
}

#[derive(Debug, Clone, Copy)]
enum SphereStep {
    Visit(NodeId),
    Polygons(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineOrder {
    Nearest,
    Farthest,
}

impl LineOrder {
    fn initial_t(self) -> f32 {
        match self {
            Self::Nearest => 1.0,
            Self::Farthest => 0.0,
        }
    }

    fn improves(self, u: f32, t: f32) -> bool {
        match self {
            Self::Nearest => u < t,
            Self::Farthest => u > t,
        }
    }
}

struct LineQuery {
    start: Point3<f32>,
    end: Point3<f32>,
    delta: Vector3<f32>,
    mask: i32,
    order: LineOrder,
}

struct LineBest {
    t: f32,
    polygon: Option<PolygonId>,
}

struct SphereQuery {
    start: Point3<f32>,
    end: Point3<f32>,
    delta: Vector3<f32>,
    radius: f32,
    mask: i32,
    move_center: Point3<f32>,
    move_radius: f32,
}

struct SphereBest {
    t: f32,
    contact: Option<(PolygonId, Vector3<f32>, Point3<f32>)>,
}

impl SphereBest {
    fn offer(
        &mut self,
        start: Point3<f32>,
        u: f32,
        polygon: PolygonId,
        normal: Vector3<f32>,
        point: Point3<f32>,
    ) {
        let replace = if u < self.t {
            true
        } else if u == 0.0 {
            // both touching at start: keep the contact closest to the centre
            self.contact.is_none_or(|(_, _, old)| {
                (point - start).norm_squared() < (old - start).norm_squared()
            })
        } else {
            false
        };

        if replace {
            self.t = u;
            self.contact = Some((polygon, normal, point));
        }
    }
}

struct EdgeContact {
    t: f32,
    normal: Vector3<f32>,
    point: Point3<f32>,
}

/// Time `[0, 1)` at which a sphere moving along `delta` first touches `point`.
fn sweep_point(start: Point3<f32>, delta: Vector3<f32>, point: Point3<f32>, r: f32) -> Option<f32> {
    let m = start - point;
    let c = m.norm_squared() - r * r;
    if c <= 0.0 {
        return Some(0.0);
    }

    let a = delta.norm_squared();
    if a < f32::MIN_POSITIVE {
        return None;
    }
    let b = 2.0 * m.dot(&delta);
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }

    let t0 = (-b - disc.sqrt()) / (2.0 * a);
    (0.0..1.0).contains(&t0).then_some(t0)
}

/// First contact of a moving sphere with the side of the edge `a`-`b`.
///
/// The ends of the edge are left to [`sweep_point`].
fn sweep_edge(
    start: Point3<f32>,
    delta: Vector3<f32>,
    a: Point3<f32>,
    b: Point3<f32>,
    r: f32,
    face_normal: Vector3<f32>,
) -> Option<EdgeContact> {
    let axis = b - a;
    let len = axis.norm();
    if len < MIN_EDGE_LENGTH {
        return None;
    }
    let d = axis / len;

    let m = start - a;
    let m_perp = m - d * m.dot(&d);
    let c = m_perp.norm_squared() - r * r;

    if c <= 0.0 {
        let h = m.dot(&d);
        if !(0.0..=len).contains(&h) {
            return None;
        }
        return Some(EdgeContact {
            t: 0.0,
            normal: m_perp.try_normalize(f32::MIN_POSITIVE).unwrap_or(face_normal),
            point: a + d * h,
        });
    }

    let v_perp = delta - d * delta.dot(&d);
    let qa = v_perp.norm_squared();
    if qa < f32::MIN_POSITIVE {
        return None;
    }
    let qb = 2.0 * m_perp.dot(&v_perp);
    let disc = qb * qb - 4.0 * qa * c;
    if disc < 0.0 {
        return None;
    }

    let t = (-qb - disc.sqrt()) / (2.0 * qa);
    if !(0.0..1.0).contains(&t) {
        return None;
    }

    let center = start + delta * t;
    let h = (center - a).dot(&d);
    if !(0.0..=len).contains(&h) {
        return None;
    }

    let normal = (m_perp + v_perp * t).try_normalize(f32::MIN_POSITIVE)?;
    Some(EdgeContact {
        t,
        normal,
        point: center - normal * r,
    })
}
