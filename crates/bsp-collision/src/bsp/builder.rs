//! BSP tree construction from polygon soup.

use std::mem;
use std::sync::Arc;
use std::time::Instant;

use nalgebra::Point3;
use tracing::{debug, trace, warn};

use crate::polygon::{centroid, newell_normal, MIN_EDGE_LENGTH, MIN_POLYGON_AREA};
use crate::vertex_pool::VertexPool;
use crate::{BuildPolygon, Classification, Cuttable, Plane3D, Polygon, PolygonId};

use super::node::NodeId;
use super::progress::{BuildProgress, ProgressTracker};
use super::selector::SplitSelector;
use super::tree::BspTree;

/// Collects source polygons and partitions them into a [`BspTree`].
///
/// ```ignore
/// use bsp_collision::bsp::{BspTreeBuilder, BalanceSplitSelector};
///
/// let mut builder = BspTreeBuilder::new();
/// for (id, quad) in walls.iter().enumerate() {
///     builder.add_polygon(quad, id as i32, -1);
/// }
/// let tree = builder.build(&BalanceSplitSelector::default());
/// ```
///
/// Polygons straddling a splitting plane are cut in two; both fragments
/// keep the source polygon's id and collision mask.
#[derive(Debug, Default)]
pub struct BspTreeBuilder {
    polygons: Vec<BuildPolygon>,
    vertices: VertexPool,
    progress: Arc<BuildProgress>,
}

impl BspTreeBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a convex source polygon.
    ///
    /// `collision_mask` filters run-time queries; pass `-1` to collide with
    /// everything. Degenerate polygons (fewer than 3 vertices, zero-length
    /// edges, zero area) and non-planar polygons are ignored and `false` is
    /// returned.
    pub fn add_polygon(&mut self, vertices: &[Point3<f32>], id: i32, collision_mask: i32) -> bool {
        if vertices.len() < 3 {
            warn!("bsp: ignoring polygon {id} with {} vertices", vertices.len());
            return false;
        }

        let n = vertices.len();
        if (0..n).any(|i| (vertices[(i + 1) % n] - vertices[i]).norm() < MIN_EDGE_LENGTH) {
            warn!("bsp: ignoring polygon {id} with a zero-length edge");
            return false;
        }

        let normal = newell_normal(vertices);
        if normal.norm() < MIN_POLYGON_AREA {
            warn!("bsp: ignoring degenerate polygon {id}");
            return false;
        }

        let plane = Plane3D::from_point_and_normal(centroid(vertices), normal);
        if plane.classify_points(vertices.iter().copied()) != Classification::Coplanar {
            warn!("bsp: ignoring non-planar polygon {id}");
            return false;
        }

        let indices = vertices.iter().map(|v| self.vertices.insert(*v)).collect();
        self.polygons
            .push(BuildPolygon::new(indices, plane, id, collision_mask));

        if self.polygons.len() % 1000 == 0 {
            debug!("bsp: added polygon {}", self.polygons.len());
        }
        true
    }

    /// Removes all source polygons and vertices.
    pub fn remove_polygons(&mut self) {
        self.polygons.clear();
        self.vertices = VertexPool::new();
        self.progress.set(0.0);
    }

    /// Returns the number of source polygons.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// Returns the number of distinct source vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Returns the relative amount `[0, 1]` of build work done.
    #[inline]
    pub fn progress(&self) -> f32 {
        self.progress.get()
    }

    /// Returns a handle for polling progress from another thread while
    /// [`build`](Self::build) runs.
    pub fn progress_handle(&self) -> Arc<BuildProgress> {
        Arc::clone(&self.progress)
    }

    /// Builds the tree from the added polygons using `selector` to choose
    /// splitting planes.
    ///
    /// The builder is left empty afterwards, ready for an unrelated tree.
    /// Building without polygons returns an empty tree.
    pub fn build<S: SplitSelector + ?Sized>(&mut self, selector: &S) -> BspTree {
        let polygons = mem::take(&mut self.polygons);
        let vertices = mem::take(&mut self.vertices);
        let source_count = polygons.len();

        self.progress.set(0.0);
        let started = Instant::now();

        let mut ctx = BuildContext {
            tree: BspTree::new(),
            vertices,
            tracker: ProgressTracker::new(source_count),
            progress: &self.progress,
            splits: 0,
        };
        let root = ctx.build_nodes(polygons, selector);

        let splits = ctx.splits;
        let mut tree = ctx.tree;
        tree.set_vertices(ctx.vertices.into_vec());
        tree.set_root(root);
        self.progress.set(1.0);

        debug!(
            "bsp: build done in {:.3}s: depth {}, {} source polys, {} splits, {} polys, {} verts",
            started.elapsed().as_secs_f32(),
            tree.depth(),
            source_count,
            splits,
            tree.polygon_count(),
            tree.vertices().len(),
        );

        tree
    }
}

/// Mutable state of a single [`BspTreeBuilder::build`] call.
struct BuildContext<'a> {
    tree: BspTree,
    vertices: VertexPool,
    tracker: ProgressTracker,
    progress: &'a BuildProgress,
    splits: usize,
}

/// Pending work of a build.
enum BuildStep {
    /// Partition a working set into a subtree.
    Split(Vec<BuildPolygon>),
    /// Both subtrees are done; create their parent.
    Join { plane: Plane3D, polygons: Vec<PolygonId> },
}

impl BuildContext<'_> {
    /// Builds the subtree of a working set of polygons.
    ///
    /// Nodes are created in post-order, positive subtree first. Degenerate
    /// inputs can make the tree as deep as the polygon count, so the work is
    /// kept on an explicit stack.
    fn build_nodes<S: SplitSelector + ?Sized>(
        &mut self,
        polygons: Vec<BuildPolygon>,
        selector: &S,
    ) -> Option<NodeId> {
        let mut steps = vec![BuildStep::Split(polygons)];
        let mut built: Vec<Option<NodeId>> = Vec::new();

        while let Some(step) = steps.pop() {
            match step {
                BuildStep::Split(polygons) if polygons.is_empty() => built.push(None),
                BuildStep::Split(polygons) => {
                    let (plane, ids, positive, negative) = self.partition(polygons, selector);
                    steps.push(BuildStep::Join {
                        plane,
                        polygons: ids,
                    });
                    steps.push(BuildStep::Split(negative));
                    steps.push(BuildStep::Split(positive));
                }
                BuildStep::Join { plane, polygons } => {
                    let negative = built.pop().flatten();
                    let positive = built.pop().flatten();
                    built.push(Some(self.tree.create_node(plane, &polygons, positive, negative)));
                }
            }
        }

        built.pop().flatten()
    }

    /// Splits a non-empty working set by its chosen plane.
    ///
    /// Polygons on the plane are placed in the tree; the rest are returned
    /// as the positive and negative working sets.
    fn partition<S: SplitSelector + ?Sized>(
        &mut self,
        polygons: Vec<BuildPolygon>,
        selector: &S,
    ) -> (Plane3D, Vec<PolygonId>, Vec<BuildPolygon>, Vec<BuildPolygon>) {
        let taken = polygons.len();
        let plane = self.choose_plane(&polygons, selector);

        let mut on_plane = Vec::new();
        let mut positive = Vec::new();
        let mut negative = Vec::new();

        for polygon in polygons {
            match polygon.classify(&plane, self.vertices.as_slice()) {
                Classification::Coplanar => on_plane.push(polygon),
                Classification::Front => positive.push(polygon),
                Classification::Back => negative.push(polygon),
                Classification::Spanning => {
                    self.splits += 1;
                    let (front, back) = polygon.cut(&plane, &mut self.vertices);
                    if front.is_none() || back.is_none() {
                        trace!("bsp: dropped sliver of polygon {}", polygon.id());
                    }
                    positive.extend(front);
                    negative.extend(back);
                }
            }
        }

        let ids: Vec<PolygonId> = on_plane
            .into_iter()
            .filter_map(|p| self.place(p))
            .collect();

        self.tracker.advance(
            self.progress,
            taken,
            ids.len(),
            positive.len() + negative.len(),
        );

        (plane, ids, positive, negative)
    }

    /// Asks the selector for a plane, keeping it only if some polygon lies on it.
    fn choose_plane<S: SplitSelector + ?Sized>(
        &self,
        polygons: &[BuildPolygon],
        selector: &S,
    ) -> Plane3D {
        let fallback = *polygons[0].plane();
        if polygons.len() == 1 {
            return fallback;
        }

        let vertices = self.vertices.as_slice();
        match selector.select_plane(polygons, vertices) {
            Some(plane)
                if plane.is_finite()
                    && polygons
                        .iter()
                        .any(|p| p.classify(&plane, vertices) == Classification::Coplanar) =>
            {
                plane
            }
            _ => fallback,
        }
    }

    /// Moves a finished polygon fragment into the tree's polygon pool.
    fn place(&mut self, polygon: BuildPolygon) -> Option<PolygonId> {
        let id = polygon.id();
        let mask = polygon.collision_mask();
        match Polygon::try_new(polygon.into_indices(), id, mask, self.vertices.as_slice()) {
            Some(p) => Some(self.tree.push_polygon(p)),
            None => {
                trace!("bsp: dropped degenerate fragment of polygon {id}");
                None
            }
        }
    }
}
