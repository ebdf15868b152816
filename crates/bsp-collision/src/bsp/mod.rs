//! Binary Space Partitioning tree for polygon collision detection.
//!
//! This module builds a BSP tree from convex polygon soup. Every node stores
//! a splitting plane and the polygons lying on it; polygons in front of the
//! plane go to the positive subtree, those behind it to the negative one,
//! and polygons straddling the plane are cut in two.
//!
//! # Example
//!
//! ```ignore
//! use bsp_collision::bsp::{BalanceSplitSelector, BspTreeBuilder};
//! use bsp_collision::collision::find_line_intersection;
//! use nalgebra::Point3;
//!
//! let mut builder = BspTreeBuilder::new();
//! builder.add_polygon(&quad, 0, -1);
//! let tree = builder.build(&BalanceSplitSelector::new(0));
//!
//! let hit = find_line_intersection(&tree, start, end, -1);
//! ```
//!
//! # Architecture
//!
//! - [`BspTree`]: Arena owning vertices, polygons and nodes
//! - [`BspNode`]: A splitting plane and the polygons lying on it
//! - [`BspTreeBuilder`]: Collects source polygons and partitions them
//! - [`SplitSelector`]: Strategy trait for choosing splitting planes

mod builder;
mod node;
mod progress;
mod selector;
mod tree;

pub use builder::BspTreeBuilder;
pub use node::{BspNode, NodeId};
pub use progress::BuildProgress;
pub use selector::{
    BalanceSplitSelector, BoundingBoxSplitSelector, FirstPolygon, PlaneScore, SplitSelector,
};
pub use tree::BspTree;
