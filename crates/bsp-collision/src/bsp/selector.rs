//! Split plane selection strategies for BSP tree construction.
//!
//! The choice of splitting plane affects tree balance and the number of
//! polygon splits during construction. Different strategies offer different
//! trade-offs between build time and tree quality.

use nalgebra::{Point3, Vector3};

use crate::{BuildPolygon, Classification, Plane3D};

/// Strategy for choosing the splitting plane of a BSP node.
///
/// The builder only keeps the returned plane if at least one working
/// polygon lies on it; otherwise it falls back to the first polygon's
/// plane, so construction terminates for any strategy.
pub trait SplitSelector {
    /// Chooses a splitting plane for the working set.
    ///
    /// Returns `None` if the slice is empty.
    fn select_plane(&self, polygons: &[BuildPolygon], vertices: &[Point3<f32>]) -> Option<Plane3D>;
}

/// Selects the plane of the first polygon in the list.
///
/// This is the simplest and fastest selector, but may produce unbalanced
/// trees depending on input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstPolygon;

impl SplitSelector for FirstPolygon {
    fn select_plane(&self, polygons: &[BuildPolygon], _vertices: &[Point3<f32>]) -> Option<Plane3D> {
        polygons.first().map(|p| *p.plane())
    }
}

/// Per-plane partition counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneScore {
    /// Polygons entirely in front of the plane.
    pub positive: usize,
    /// Polygons entirely behind the plane.
    pub negative: usize,
    /// Polygons on the plane.
    pub coplanar: usize,
    /// Polygons that would be split.
    pub spanning: usize,
}

impl PlaneScore {
    /// Classifies every polygon against `plane`.
    pub fn evaluate(plane: &Plane3D, polygons: &[BuildPolygon], vertices: &[Point3<f32>]) -> Self {
        let mut score = Self::default();
        for polygon in polygons {
            match polygon.classify(plane, vertices) {
                Classification::Front => score.positive += 1,
                Classification::Back => score.negative += 1,
                Classification::Coplanar => score.coplanar += 1,
                Classification::Spanning => score.spanning += 1,
            }
        }
        score
    }

    /// Returns the size of the smaller half.
    #[inline]
    pub fn balance(&self) -> usize {
        self.positive.min(self.negative)
    }
}

/// Selects the polygon plane that splits the working set most evenly.
///
/// Every `poly_skip + 1`th polygon plane is a candidate; the score is
/// `min(positive, negative)`. Ties go to the plane causing fewer splits,
/// then to the earlier candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceSplitSelector {
    poly_skip: usize,
}

impl BalanceSplitSelector {
    /// Creates a selector testing every `poly_skip + 1`th polygon plane.
    pub fn new(poly_skip: usize) -> Self {
        Self { poly_skip }
    }

    /// Returns the number of polygons skipped between candidates.
    pub fn poly_skip(&self) -> usize {
        self.poly_skip
    }
}

impl SplitSelector for BalanceSplitSelector {
    fn select_plane(&self, polygons: &[BuildPolygon], vertices: &[Point3<f32>]) -> Option<Plane3D> {
        let mut best: Option<(usize, usize, Plane3D)> = None;

        for candidate in polygons.iter().step_by(self.poly_skip + 1) {
            let plane = *candidate.plane();
            let score = PlaneScore::evaluate(&plane, polygons, vertices);
            let better = match best {
                None => true,
                Some((balance, spanning, _)) => {
                    score.balance() > balance
                        || (score.balance() == balance && score.spanning < spanning)
                }
            };
            if better {
                best = Some((score.balance(), score.spanning, plane));
            }
        }

        best.map(|(_, _, plane)| plane)
    }
}

/// Selects polygon planes that subdivide the working set's bounding box.
///
/// Candidates score higher when their normal is aligned with the longest
/// box axis and when they pass close to the box centre; each polygon the
/// plane would split costs `split_weight / polygons`.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBoxSplitSelector {
    split_weight: f32,
}

impl BoundingBoxSplitSelector {
    /// Creates a selector with the given split penalty weight.
    pub fn new(split_weight: f32) -> Self {
        Self { split_weight }
    }

    /// Returns the split penalty weight.
    pub fn split_weight(&self) -> f32 {
        self.split_weight
    }
}

impl Default for BoundingBoxSplitSelector {
    fn default() -> Self {
        Self { split_weight: 0.5 }
    }
}

impl SplitSelector for BoundingBoxSplitSelector {
    fn select_plane(&self, polygons: &[BuildPolygon], vertices: &[Point3<f32>]) -> Option<Plane3D> {
        let (min, max) = bounding_box(polygons, vertices)?;
        let extent = max - min;
        let center = min + extent * 0.5;

        let axis_index = extent.imax();
        let axis = Vector3::ith(axis_index, 1.0);
        let half_extent = (extent[axis_index] * 0.5).max(f32::EPSILON);

        let mut best: Option<(f32, Plane3D)> = None;
        for candidate in polygons {
            let plane = *candidate.plane();
            let alignment = plane.normal().dot(&axis).abs();
            let offset = (plane.signed_distance(center).abs() / half_extent).min(1.0);
            let spanning = PlaneScore::evaluate(&plane, polygons, vertices).spanning;

            let score = alignment * (1.0 - offset)
                - self.split_weight * spanning as f32 / polygons.len() as f32;

            if best.is_none_or(|(s, _)| score > s) {
                best = Some((score, plane));
            }
        }

        best.map(|(_, plane)| plane)
    }
}

/// Computes the axis aligned bounds of every polygon vertex.
fn bounding_box(
    polygons: &[BuildPolygon],
    vertices: &[Point3<f32>],
) -> Option<(Point3<f32>, Point3<f32>)> {
    let mut points = polygons.iter().flat_map(|p| p.vertices(vertices));
    let first = points.next()?;
    Some(points.fold((first, first), |(lo, hi), p| (lo.inf(&p), hi.sup(&p))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex_pool::VertexPool;

    /// Builds an axis aligned quad lying on `x = offset` (normal +x).
    fn wall_x(pool: &mut VertexPool, offset: f32, id: i32) -> BuildPolygon {
        let pts = [
            Point3::new(offset, 0.0, 0.0),
            Point3::new(offset, 1.0, 0.0),
            Point3::new(offset, 1.0, 1.0),
            Point3::new(offset, 0.0, 1.0),
        ];
        let indices: Vec<u32> = pts.iter().map(|p| pool.insert(*p)).collect();
        let plane = Plane3D::from_three_points(pts[0], pts[1], pts[2]);
        BuildPolygon::new(indices, plane, id, -1)
    }

    #[test]
    fn first_polygon_empty_list() {
        let selector = FirstPolygon;
        assert!(selector.select_plane(&[], &[]).is_none());
    }

    #[test]
    fn first_polygon_multiple() {
        let mut pool = VertexPool::new();
        let a = wall_x(&mut pool, 0.0, 0);
        let b = wall_x(&mut pool, 1.0, 1);
        let selected = FirstPolygon
            .select_plane(&[a.clone(), b], pool.as_slice())
            .unwrap();
        assert_eq!(&selected, a.plane());
    }

    #[test]
    fn balance_prefers_middle_plane() {
        let mut pool = VertexPool::new();
        let polys: Vec<_> = (0..5).map(|i| wall_x(&mut pool, i as f32, i)).collect();

        let plane = BalanceSplitSelector::new(0)
            .select_plane(&polys, pool.as_slice())
            .unwrap();
        assert_eq!(&plane, polys[2].plane());

        let score = PlaneScore::evaluate(&plane, &polys, pool.as_slice());
        assert_eq!(score.positive, 2);
        assert_eq!(score.negative, 2);
        assert_eq!(score.coplanar, 1);
        assert_eq!(score.balance(), 2);
    }

    #[test]
    fn balance_skip_limits_candidates() {
        let mut pool = VertexPool::new();
        let polys: Vec<_> = (0..5).map(|i| wall_x(&mut pool, i as f32, i)).collect();

        // candidates are polygons 0, 3
        let plane = BalanceSplitSelector::new(2)
            .select_plane(&polys, pool.as_slice())
            .unwrap();
        assert_eq!(&plane, polys[3].plane());
    }

    #[test]
    fn bounding_box_prefers_centre_plane() {
        let mut pool = VertexPool::new();
        let polys: Vec<_> = (0..5)
            .map(|i| wall_x(&mut pool, i as f32 * 10.0, i))
            .collect();

        let plane = BoundingBoxSplitSelector::default()
            .select_plane(&polys, pool.as_slice())
            .unwrap();
        assert_eq!(&plane, polys[2].plane());
    }
}
