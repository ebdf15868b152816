//! BSP (Binary Space Partitioning) trees for static collision geometry.
//!
//! Convex polygons are partitioned into a [`BspTree`] by a
//! [`BspTreeBuilder`](bsp::BspTreeBuilder). The tree answers line segment
//! and swept sphere queries ([`collision`]) and can be stored in a chunked
//! binary file ([`file`]).

pub mod bsp;
pub mod chunk;
pub mod collision;
mod cuttable;
pub mod error;
pub mod file;
mod plane;
mod polygon;
mod vertex_pool;

#[cfg(test)]
mod test_fixtures;

pub use bsp::{BspNode, BspTree, NodeId};
pub use collision::{Collider, CollisionStats, LineHit, SphereHit};
pub use cuttable::{BuildPolygon, Cuttable};
pub use error::{BspError, Result};
pub use plane::{classify_distances, Classification, Plane3D, PlaneSide, PLANE_EPSILON};
pub use polygon::{
    centroid, newell_normal, Polygon, PolygonId, MIN_EDGE_LENGTH, MIN_POLYGON_AREA,
};
pub use vertex_pool::VertexPool;
