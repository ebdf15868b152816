//! Welding vertex pool used while building a tree.

use std::collections::HashMap;

use nalgebra::Point3;

/// Append-only vertex storage that merges bit-identical positions.
#[derive(Debug, Clone, Default)]
pub struct VertexPool {
    vertices: Vec<Point3<f32>>,
    lookup: HashMap<[u32; 3], u32>,
}

impl VertexPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a position and returns its index, reusing an identical vertex if present.
    pub fn insert(&mut self, point: Point3<f32>) -> u32 {
        let key = weld_key(point);
        if let Some(&index) = self.lookup.get(&key) {
            return index;
        }

        let index = self.vertices.len() as u32;
        self.vertices.push(point);
        self.lookup.insert(key, index);
        index
    }

    /// Returns the vertex positions.
    #[inline]
    pub fn as_slice(&self) -> &[Point3<f32>] {
        &self.vertices
    }

    /// Returns the number of distinct vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Returns `true` if the pool holds no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Consumes the pool, returning the vertex positions.
    pub fn into_vec(self) -> Vec<Point3<f32>> {
        self.vertices
    }
}

fn weld_key(point: Point3<f32>) -> [u32; 3] {
    // -0.0 + 0.0 == +0.0, so both zeros share a key
    [
        (point.x + 0.0).to_bits(),
        (point.y + 0.0).to_bits(),
        (point.z + 0.0).to_bits(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_are_welded() {
        let mut pool = VertexPool::new();
        let a = pool.insert(Point3::new(1.0, 2.0, 3.0));
        let b = pool.insert(Point3::new(4.0, 5.0, 6.0));
        let c = pool.insert(Point3::new(1.0, 2.0, 3.0));

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(c, a);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn signed_zeros_share_an_index() {
        let mut pool = VertexPool::new();
        let a = pool.insert(Point3::new(0.0, 1.0, 0.0));
        let b = pool.insert(Point3::new(-0.0, 1.0, -0.0));
        assert_eq!(a, b);
    }
}
