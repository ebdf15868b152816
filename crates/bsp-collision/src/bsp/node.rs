//! BSP tree node implementation.

use std::ops::Range;

use crate::Plane3D;

/// Index of a node in its tree's node pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the position of the node in [`BspTree::nodes`](super::BspTree::nodes).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node in the BSP tree.
///
/// Each node divides space about its splitting plane into two half spaces
/// and stores the polygons lying on that plane (within
/// [`PLANE_EPSILON`](crate::PLANE_EPSILON)). Polygons in front of the plane
/// live in the `positive` subtree, polygons behind it in the `negative` one.
///
/// The polygon list is a contiguous slice of the tree's shared node-polygon
/// pool; use [`BspTree::node_polygons`](super::BspTree::node_polygons) to
/// read it. Nodes are immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct BspNode {
    /// The splitting plane for this node.
    plane: Plane3D,

    /// First entry of this node's polygons in the node-polygon pool.
    first_polygon: u32,

    /// Number of polygons on the plane.
    polygon_count: u32,

    /// Subtree in FRONT of the splitting plane.
    positive: Option<NodeId>,

    /// Subtree BEHIND the splitting plane.
    negative: Option<NodeId>,
}

impl BspNode {
    pub(crate) fn new(
        plane: Plane3D,
        polygons: Range<usize>,
        positive: Option<NodeId>,
        negative: Option<NodeId>,
    ) -> Self {
        Self {
            plane,
            first_polygon: polygons.start as u32,
            polygon_count: polygons.len() as u32,
            positive,
            negative,
        }
    }

    /// Returns a reference to the splitting plane.
    #[inline]
    pub fn plane(&self) -> &Plane3D {
        &self.plane
    }

    /// Returns the number of polygons on the node plane.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.polygon_count as usize
    }

    /// Returns the range of this node's entries in the node-polygon pool.
    #[inline]
    pub fn polygon_range(&self) -> Range<usize> {
        let start = self.first_polygon as usize;
        start..start + self.polygon_count as usize
    }

    /// Returns the positive half space subtree.
    #[inline]
    pub fn positive(&self) -> Option<NodeId> {
        self.positive
    }

    /// Returns the negative half space subtree.
    #[inline]
    pub fn negative(&self) -> Option<NodeId> {
        self.negative
    }

    /// Checks if this node has any children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.positive.is_none() && self.negative.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn new_node_is_leaf() {
        let plane = Plane3D::new(Vector3::new(0.0, 1.0, 0.0), 0.0);
        let node = BspNode::new(plane, 3..5, None, None);

        assert!(node.is_leaf());
        assert_eq!(node.polygon_count(), 2);
        assert_eq!(node.polygon_range(), 3..5);
    }

    #[test]
    fn children_clear_leaf_status() {
        let plane = Plane3D::new(Vector3::new(0.0, 1.0, 0.0), 0.0);
        let node = BspNode::new(plane, 0..0, Some(NodeId::new(0)), None);
        assert!(!node.is_leaf());
        assert_eq!(node.positive(), Some(NodeId::new(0)));
        assert_eq!(node.negative(), None);

        let node = BspNode::new(plane, 0..0, None, Some(NodeId::new(1)));
        assert!(!node.is_leaf());
        assert_eq!(node.negative().map(NodeId::index), Some(1));
    }
}
