//! Reading and writing BSP trees as chunked binary files.
//!
//! Layout of a tree stream:
//!
//! ```text
//! "bsptree"
//!     int     version (BSP_FILE_VERSION)
//!     int     node count
//!     int     total polygon references over all nodes
//!     "vertices"
//!         int     count
//!         float*3 x, y, z per vertex
//!     "polygons"
//!         int     count
//!         per polygon: int id, int vertex count, int collision mask,
//!                      int vertex index per vertex
//!     "node" (root, absent for an empty tree)
//!         float*4 plane nx, ny, nz, w
//!         int     child flags (bit 0 positive, bit 1 negative)
//!         "node"  positive child, if flagged
//!         "node"  negative child, if flagged
//!         int     polygon count
//!         int     polygon index per polygon
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::mem;
use std::path::Path;

use nalgebra::Point3;
use tracing::{debug, trace, warn};

use crate::bsp::{BspTree, NodeId};
use crate::chunk::{ChunkReader, ChunkWriter};
use crate::error::{BspError, Result};
use crate::{Plane3D, PolygonId};

/// Format version written to and required from every tree stream.
pub const BSP_FILE_VERSION: i32 = 6;

const POSITIVE_CHILD: i32 = 1;
const NEGATIVE_CHILD: i32 = 2;

/// Upper bound for pool pre-sizing from header counts, which come from
/// untrusted data.
const MAX_RESERVE: usize = 1 << 20;

/// Writes a tree to a stream.
pub fn write_tree<W: Write>(tree: &BspTree, out: W) -> Result<()> {
    let mut out = ChunkWriter::new(out);

    let (node_count, node_polygon_count) = match tree.root() {
        Some(root) => (
            tree.subtree_node_count(root),
            tree.subtree_polygon_count(root),
        ),
        None => (0, 0),
    };

    out.begin_chunk("bsptree")?;
    out.write_int(BSP_FILE_VERSION)?;
    write_count(&mut out, "node", node_count)?;
    write_count(&mut out, "node polygon", node_polygon_count)?;

    out.begin_chunk("vertices")?;
    write_count(&mut out, "vertex", tree.vertices().len())?;
    for v in tree.vertices() {
        out.write_float(v.x)?;
        out.write_float(v.y)?;
        out.write_float(v.z)?;
    }
    out.end_chunk()?;

    out.begin_chunk("polygons")?;
    write_count(&mut out, "polygon", tree.polygon_count())?;
    for polygon in tree.polygons() {
        out.write_int(polygon.id())?;
        write_count(&mut out, "polygon vertex", polygon.vertex_count())?;
        out.write_int(polygon.collision_mask())?;
        for &index in polygon.indices() {
            write_count(&mut out, "vertex index", index as usize)?;
        }
    }
    out.end_chunk()?;

    if let Some(root) = tree.root() {
        write_nodes(&mut out, tree, root)?;
    }

    out.end_chunk()?;
    out.flush()?;

    debug!(
        "bsp: wrote tree of {} nodes, {} polygons, {} vertices",
        node_count,
        tree.polygon_count(),
        tree.vertices().len()
    );
    Ok(())
}

/// Writes the node chunks of a subtree; children are nested inside their
/// parent, before the parent's polygon list.
fn write_nodes<W: Write>(out: &mut ChunkWriter<W>, tree: &BspTree, root: NodeId) -> Result<()> {
    // (node, children written)
    let mut pending = vec![(root, false)];

    while let Some((id, children_done)) = pending.pop() {
        let node = tree.node(id);

        if children_done {
            let polygons = tree.node_polygons(id);
            write_count(out, "node polygon", polygons.len())?;
            for polygon in polygons {
                write_count(out, "polygon index", polygon.index())?;
            }
            out.end_chunk()?;
            continue;
        }

        trace!("bsp: writing node of {} polygons", node.polygon_count());
        out.begin_chunk("node")?;
        for component in node.plane().to_array() {
            out.write_float(component)?;
        }

        let mut flags = 0;
        if node.positive().is_some() {
            flags |= POSITIVE_CHILD;
        }
        if node.negative().is_some() {
            flags |= NEGATIVE_CHILD;
        }
        out.write_int(flags)?;

        pending.push((id, true));
        pending.extend(node.negative().map(|n| (n, false)));
        pending.extend(node.positive().map(|n| (n, false)));
    }
    Ok(())
}

fn write_count<W: Write>(out: &mut ChunkWriter<W>, what: &'static str, count: usize) -> Result<()> {
    let value = i32::try_from(count).map_err(|_| BspError::InvalidCount {
        what,
        count: i32::MAX,
    })?;
    out.write_int(value)
}

/// Reads a tree from a stream.
///
/// Every vertex and polygon reference is validated; corrupt data is reported
/// as an error, never repaired. The one exception is a polygon with valid
/// indices but (near) zero area: it is skipped with a warning, and node
/// references to it are dropped.
pub fn read_tree<R: Read>(input: R) -> Result<BspTree> {
    let mut input = ChunkReader::new(input);
    input.expect_chunk("bsptree")?;

    let version = input.read_int()?;
    if version != BSP_FILE_VERSION {
        return Err(BspError::VersionMismatch {
            found: version,
            expected: BSP_FILE_VERSION,
        });
    }

    let node_count = read_count(&mut input, "node")?;
    let node_polygon_count = read_count(&mut input, "node polygon")?;

    let mut tree = BspTree::new();
    tree.reserve_nodes(node_count.min(MAX_RESERVE));
    tree.reserve_node_polygons(node_polygon_count.min(MAX_RESERVE));

    input.expect_chunk("vertices")?;
    let vertex_count = read_count(&mut input, "vertex")?;
    for _ in 0..vertex_count {
        let x = input.read_float()?;
        let y = input.read_float()?;
        let z = input.read_float()?;
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(BspError::NonFinite("vertex"));
        }
        tree.push_vertex(Point3::new(x, y, z));
    }
    input.end_chunk()?;

    input.expect_chunk("polygons")?;
    let polygon_count = read_count(&mut input, "polygon")?;
    tree.reserve_polygons(polygon_count.min(MAX_RESERVE));
    let mut indices = Vec::new();
    let mut polygons = Vec::with_capacity(polygon_count.min(MAX_RESERVE));
    for polygon in 0..polygon_count {
        polygons.push(read_polygon(&mut input, &mut tree, polygon, &mut indices)?);
    }
    input.end_chunk()?;

    let skipped = polygon_count - tree.polygon_count();
    if skipped > 0 {
        warn!("bsp: skipped {skipped} degenerate polygons");
    }

    if node_count > 0 {
        let mut nodes = NodeReader {
            input: &mut input,
            tree: &mut tree,
            limit: node_count,
            read: 0,
            polygons: &polygons,
            scratch: Vec::new(),
        };
        let root = nodes.read_nodes()?;
        tree.set_root(Some(root));
    }

    input.end_chunk()?;

    debug!(
        "bsp: read tree of {} nodes, {} polygons, {} vertices",
        tree.node_count(),
        tree.polygon_count(),
        tree.vertices().len()
    );
    Ok(tree)
}

/// Reads a polygon record, returning its id in the tree or `None` if it was
/// skipped as degenerate.
fn read_polygon<R: Read>(
    input: &mut ChunkReader<R>,
    tree: &mut BspTree,
    polygon: usize,
    indices: &mut Vec<u32>,
) -> Result<Option<PolygonId>> {
    let id = input.read_int()?;
    let vertex_count = read_count(input, "polygon vertex")?;
    let collision_mask = input.read_int()?;

    if vertex_count < 3 {
        return Err(BspError::InvalidPolygon {
            polygon,
            reason: "fewer than 3 vertices",
        });
    }

    indices.clear();
    for _ in 0..vertex_count {
        let index = input.read_int()?;
        if index < 0 || index as usize >= tree.vertices().len() {
            return Err(BspError::InvalidVertexIndex { polygon, index });
        }
        indices.push(index as u32);
    }

    let created = tree.create_polygon(indices.clone(), id, collision_mask);
    if created.is_none() {
        trace!("bsp: skipping degenerate polygon {polygon} (id {id})");
    }
    Ok(created)
}

/// A node chunk whose children are still being read.
struct PendingNode {
    plane: Plane3D,
    flags: i32,
    positive: Option<NodeId>,
    negative: Option<NodeId>,
}

impl PendingNode {
    fn wants_positive(&self) -> bool {
        self.flags & POSITIVE_CHILD != 0 && self.positive.is_none()
    }

    fn wants_child(&self) -> bool {
        self.wants_positive() || (self.flags & NEGATIVE_CHILD != 0 && self.negative.is_none())
    }

    fn attach(&mut self, child: NodeId) {
        if self.wants_positive() {
            self.positive = Some(child);
        } else {
            self.negative = Some(child);
        }
    }
}

/// Node chunk parser.
///
/// Nesting depth is only bounded by the node count, so open chunks are kept
/// on an explicit stack.
struct NodeReader<'a, R: Read> {
    input: &'a mut ChunkReader<R>,
    tree: &'a mut BspTree,
    limit: usize,
    read: usize,
    /// Tree polygon of each polygon record, `None` if it was skipped.
    polygons: &'a [Option<PolygonId>],
    /// A node's polygon list; children are complete before it is filled.
    scratch: Vec<PolygonId>,
}

impl<R: Read> NodeReader<'_, R> {
    /// Reads the root node chunk and everything nested in it.
    fn read_nodes(&mut self) -> Result<NodeId> {
        let mut current = self.begin_node()?;
        let mut parents = Vec::new();

        loop {
            if current.wants_child() {
                let child = self.begin_node()?;
                parents.push(mem::replace(&mut current, child));
                continue;
            }

            let id = self.finish_node(&current)?;
            match parents.pop() {
                Some(mut parent) => {
                    parent.attach(id);
                    current = parent;
                }
                None => return Ok(id),
            }
        }
    }

    /// Reads a node chunk header up to its child flags.
    fn begin_node(&mut self) -> Result<PendingNode> {
        self.input.expect_chunk("node")?;
        if self.read == self.limit {
            return Err(BspError::NodeCountExceeded(self.limit));
        }
        self.read += 1;

        let mut plane = [0.0; 4];
        for component in &mut plane {
            *component = self.input.read_float()?;
        }
        let plane = Plane3D::from_array(plane);
        if !plane.is_finite() {
            return Err(BspError::NonFinite("node plane"));
        }

        let flags = self.input.read_int()?;
        if flags & !(POSITIVE_CHILD | NEGATIVE_CHILD) != 0 {
            return Err(BspError::InvalidChildFlags(flags));
        }

        Ok(PendingNode {
            plane,
            flags,
            positive: None,
            negative: None,
        })
    }

    /// Reads the polygon list after the children and creates the node.
    fn finish_node(&mut self, node: &PendingNode) -> Result<NodeId> {
        let count = read_count(self.input, "node polygon")?;
        self.scratch.clear();
        for _ in 0..count {
            let index = self.input.read_int()?;
            let polygon = usize::try_from(index)
                .ok()
                .and_then(|i| self.polygons.get(i).copied())
                .ok_or(BspError::InvalidPolygonIndex(index))?;
            self.scratch.extend(polygon);
        }

        self.input.end_chunk()?;
        Ok(self
            .tree
            .create_node(node.plane, &self.scratch, node.positive, node.negative))
    }
}

fn read_count<R: Read>(input: &mut ChunkReader<R>, what: &'static str) -> Result<usize> {
    let count = input.read_int()?;
    usize::try_from(count).map_err(|_| BspError::InvalidCount { what, count })
}

/// Writes a tree to a file.
pub fn save(tree: &BspTree, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    debug!("bsp: writing tree to {}", path.display());
    write_tree(tree, BufWriter::new(File::create(path)?))
}

/// Reads a tree from a file.
pub fn load(path: impl AsRef<Path>) -> Result<BspTree> {
    let path = path.as_ref();
    debug!("bsp: reading tree from {}", path.display());
    read_tree(BufReader::new(File::open(path)?))
}
