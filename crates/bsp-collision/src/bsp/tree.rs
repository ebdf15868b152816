//! BSP tree container.

use nalgebra::Point3;

use crate::{Plane3D, Polygon, PolygonId};

use super::node::{BspNode, NodeId};

/// A Binary Space Partitioning tree of collision polygons.
///
/// The tree owns every pool: vertices, polygons, nodes and the shared
/// node-polygon list. Nodes and polygons refer to each other through
/// [`NodeId`] / [`PolygonId`] indices, so the structure is a plain arena
/// with no back references.
///
/// # Construction
///
/// Trees are built from polygon soup with
/// [`BspTreeBuilder`](super::BspTreeBuilder), or read from a stream with
/// [`read_tree`](crate::file::read_tree). Both create nodes bottom-up:
/// children are always created before their parent.
///
/// ```ignore
/// use bsp_collision::bsp::{BspTreeBuilder, BalanceSplitSelector};
///
/// let mut builder = BspTreeBuilder::new();
/// builder.add_polygon(&quad, 0, -1);
/// let tree = builder.build(&BalanceSplitSelector::default());
/// ```
///
/// # Sharing
///
/// A built tree is never mutated by queries, so it can be shared between
/// threads and queried concurrently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BspTree {
    vertices: Vec<Point3<f32>>,
    polygons: Vec<Polygon>,
    nodes: Vec<BspNode>,
    node_polygons: Vec<PolygonId>,
    root: Option<NodeId>,
}

impl BspTree {
    /// Creates an empty BSP tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty tree owning the given vertex pool.
    pub fn with_vertices(vertices: Vec<Point3<f32>>) -> Self {
        Self {
            vertices,
            ..Self::default()
        }
    }

    /// Reserves room for `additional` nodes.
    pub fn reserve_nodes(&mut self, additional: usize) {
        self.nodes.reserve(additional);
    }

    /// Reserves room for `additional` polygons.
    pub fn reserve_polygons(&mut self, additional: usize) {
        self.polygons.reserve(additional);
    }

    /// Reserves room for `additional` node-polygon references.
    pub fn reserve_node_polygons(&mut self, additional: usize) {
        self.node_polygons.reserve(additional);
    }

    /// Appends a vertex to the pool and returns its index.
    pub fn push_vertex(&mut self, vertex: Point3<f32>) -> u32 {
        self.vertices.push(vertex);
        (self.vertices.len() - 1) as u32
    }

    /// Creates a polygon from indices into this tree's vertex pool.
    ///
    /// Returns `None` if the polygon is degenerate.
    ///
    /// # Panics
    /// Panics if fewer than 3 indices are given or an index is out of range.
    pub fn create_polygon(
        &mut self,
        indices: Vec<u32>,
        id: i32,
        collision_mask: i32,
    ) -> Option<PolygonId> {
        let polygon = Polygon::try_new(indices, id, collision_mask, &self.vertices)?;
        Some(self.push_polygon(polygon))
    }

    pub(crate) fn push_polygon(&mut self, polygon: Polygon) -> PolygonId {
        self.polygons.push(polygon);
        PolygonId::new(self.polygons.len() - 1)
    }

    pub(crate) fn set_vertices(&mut self, vertices: Vec<Point3<f32>>) {
        self.vertices = vertices;
    }

    /// Creates a node from its splitting plane, the polygons on that plane
    /// and the two already created half space subtrees.
    ///
    /// # Panics
    /// Panics if a polygon or child id does not belong to this tree.
    pub fn create_node(
        &mut self,
        plane: Plane3D,
        polygons: &[PolygonId],
        positive: Option<NodeId>,
        negative: Option<NodeId>,
    ) -> NodeId {
        assert!(
            polygons.iter().all(|p| p.index() < self.polygons.len()),
            "Node polygon id out of range"
        );
        assert!(
            [positive, negative]
                .iter()
                .flatten()
                .all(|c| c.index() < self.nodes.len()),
            "Node child must be created before its parent"
        );

        let first = self.node_polygons.len();
        self.node_polygons.extend_from_slice(polygons);
        self.nodes.push(BspNode::new(
            plane,
            first..self.node_polygons.len(),
            positive,
            negative,
        ));
        NodeId::new(self.nodes.len() - 1)
    }

    /// Sets the root node.
    pub fn set_root(&mut self, root: Option<NodeId>) {
        debug_assert!(root.is_none_or(|r| r.index() < self.nodes.len()));
        self.root = root;
    }

    /// Returns `true` if the tree has no root.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the root node id, if any.
    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Returns a reference to the root node, if any.
    #[inline]
    pub fn root_node(&self) -> Option<&BspNode> {
        self.root.map(|id| self.node(id))
    }

    /// Returns a node by id.
    #[inline]
    pub fn node(&self, id: NodeId) -> &BspNode {
        &self.nodes[id.index()]
    }

    /// Returns the node pool.
    #[inline]
    pub fn nodes(&self) -> &[BspNode] {
        &self.nodes
    }

    /// Returns the number of nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the polygons lying on a node's plane.
    #[inline]
    pub fn node_polygons(&self, id: NodeId) -> &[PolygonId] {
        &self.node_polygons[self.node(id).polygon_range()]
    }

    /// Returns the total number of node-polygon references.
    #[inline]
    pub fn node_polygon_count(&self) -> usize {
        self.node_polygons.len()
    }

    /// Returns a polygon by id.
    #[inline]
    pub fn polygon(&self, id: PolygonId) -> &Polygon {
        &self.polygons[id.index()]
    }

    /// Returns the polygon pool.
    #[inline]
    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Returns the number of polygons.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// Returns the id of a polygon owned by this tree.
    ///
    /// Returns `None` if the reference points outside the polygon pool.
    pub fn polygon_index(&self, polygon: &Polygon) -> Option<PolygonId> {
        let size = std::mem::size_of::<Polygon>();
        let base = self.polygons.as_ptr() as usize;
        let addr = polygon as *const Polygon as usize;
        if addr < base || (addr - base) % size != 0 {
            return None;
        }

        let index = (addr - base) / size;
        (index < self.polygons.len() && std::ptr::eq(&self.polygons[index], polygon))
            .then(|| PolygonId::new(index))
    }

    /// Returns the vertex pool.
    #[inline]
    pub fn vertices(&self) -> &[Point3<f32>] {
        &self.vertices
    }

    /// Returns a vertex by pool index.
    #[inline]
    pub fn vertex(&self, index: u32) -> Point3<f32> {
        self.vertices[index as usize]
    }

    /// Returns the maximum depth of the tree (0 for empty tree).
    pub fn depth(&self) -> usize {
        self.root.map_or(0, |r| self.subtree_depth(r))
    }

    /// Returns the depth of the subtree rooted at `id` (1 for a leaf).
    pub fn subtree_depth(&self, id: NodeId) -> usize {
        self.walk(id).map(|(_, depth)| depth).max().unwrap_or(0)
    }

    /// Returns the number of nodes in the subtree rooted at `id`, `id` included.
    pub fn subtree_node_count(&self, id: NodeId) -> usize {
        self.walk(id).count()
    }

    /// Returns the number of polygon references in the subtree rooted at `id`.
    pub fn subtree_polygon_count(&self, id: NodeId) -> usize {
        self.walk(id)
            .map(|(node, _)| self.node(node).polygon_count())
            .sum()
    }

    /// Iterates the subtree rooted at `id` depth first, yielding each node
    /// with its depth (1 for `id`).
    fn walk(&self, id: NodeId) -> impl Iterator<Item = (NodeId, usize)> + '_ {
        let mut pending = vec![(id, 1)];
        std::iter::from_fn(move || {
            let (id, depth) = pending.pop()?;
            let node = self.node(id);
            pending.extend(node.negative().map(|n| (n, depth + 1)));
            pending.extend(node.positive().map(|n| (n, depth + 1)));
            Some((id, depth))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn tree_with_square(z: f32) -> (BspTree, PolygonId) {
        let mut tree = BspTree::with_vertices(vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(1.0, 1.0, z),
            Point3::new(0.0, 1.0, z),
        ]);
        let id = tree.create_polygon(vec![0, 1, 2, 3], 5, -1).unwrap();
        (tree, id)
    }

    #[test]
    fn empty_tree() {
        let tree = BspTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.polygon_count(), 0);
        assert_eq!(tree.node_count(), 0);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn single_node_tree() {
        let (mut tree, poly) = tree_with_square(0.0);
        let plane = *tree.polygon(poly).plane();
        let root = tree.create_node(plane, &[poly], None, None);
        tree.set_root(Some(root));

        assert!(!tree.is_empty());
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.node_polygons(root), &[poly]);
        assert_eq!(tree.root_node().unwrap().polygon_count(), 1);
        assert_eq!(tree.polygon(poly).id(), 5);
    }

    #[test]
    fn bottom_up_construction() {
        let (mut tree, poly) = tree_with_square(0.0);
        let plane = Plane3D::new(Vector3::z(), 0.0);
        let leaf_a = tree.create_node(plane, &[poly], None, None);
        let leaf_b = tree.create_node(plane, &[], None, None);
        let mid = tree.create_node(plane, &[], Some(leaf_a), None);
        let root = tree.create_node(plane, &[poly], Some(mid), Some(leaf_b));
        tree.set_root(Some(root));

        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.subtree_node_count(root), 4);
        assert_eq!(tree.subtree_polygon_count(root), 2);
        assert_eq!(tree.node_polygon_count(), 2);
    }

    #[test]
    #[should_panic(expected = "created before its parent")]
    fn child_must_exist() {
        let mut tree = BspTree::new();
        let plane = Plane3D::new(Vector3::z(), 0.0);
        tree.create_node(plane, &[], Some(NodeId::new(3)), None);
    }

    #[test]
    fn deep_chain_statistics() {
        let mut tree = BspTree::new();
        let plane = Plane3D::new(Vector3::z(), 0.0);
        let mut top = None;
        for _ in 0..100_000 {
            top = Some(tree.create_node(plane, &[], None, top));
        }
        tree.set_root(top);

        assert_eq!(tree.depth(), 100_000);
        assert_eq!(tree.subtree_node_count(top.unwrap()), 100_000);
        assert_eq!(tree.subtree_polygon_count(top.unwrap()), 0);
    }

    #[test]
    fn polygon_index_round_trip() {
        let (mut tree, first) = tree_with_square(0.0);
        let second = tree.create_polygon(vec![3, 2, 1, 0], 6, -1).unwrap();

        assert_eq!(tree.polygon_index(tree.polygon(first)), Some(first));
        assert_eq!(tree.polygon_index(tree.polygon(second)), Some(second));

        let (other, other_id) = tree_with_square(1.0);
        assert_eq!(tree.polygon_index(other.polygon(other_id)), None);
    }

    #[test]
    fn degenerate_polygon_not_created() {
        let mut tree = BspTree::with_vertices(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(2.0, 2.0, 2.0),
        ]);
        assert!(tree.create_polygon(vec![0, 1, 2], 0, -1).is_none());
        assert_eq!(tree.polygon_count(), 0);
    }
}
