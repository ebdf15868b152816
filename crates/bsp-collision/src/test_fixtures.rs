//! Shared geometry for unit tests.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};

use crate::bsp::{BspTree, BspTreeBuilder};

/// Floor plan edges of an irregular room cross-section.
pub(crate) const ROOM_WALLS: [[(f32, f32); 2]; 4] = [
    [(10.0, 10.0), (20.0, 20.0)],
    [(10.0, 25.0), (30.0, 25.0)],
    [(10.0, 40.0), (20.0, 30.0)],
    [(25.0, 30.0), (25.0, 50.0)],
];

/// Extrudes a floor plan edge into a quad from z = -20 to z = 20.
pub(crate) fn wall_quad(a: (f32, f32), b: (f32, f32)) -> [Point3<f32>; 4] {
    let up = Vector3::new(0.0, 0.0, 40.0);
    let v0 = Point3::new(a.0, a.1, -20.0);
    let v1 = Point3::new(b.0, b.1, -20.0);
    [v0, v1, v1 + up, v0 + up]
}

/// A builder holding the room walls, ids 0..4, colliding with everything.
pub(crate) fn room_builder() -> BspTreeBuilder {
    room_builder_with_mask(-1)
}

pub(crate) fn room_builder_with_mask(collision_mask: i32) -> BspTreeBuilder {
    let mut builder = BspTreeBuilder::new();
    for (id, [a, b]) in ROOM_WALLS.into_iter().enumerate() {
        assert!(builder.add_polygon(&wall_quad(a, b), id as i32, collision_mask));
    }
    builder
}

/// Sums polygon fragment areas per source polygon id.
pub(crate) fn total_area_by_id(tree: &BspTree) -> HashMap<i32, f32> {
    let mut areas = HashMap::new();
    for polygon in tree.polygons() {
        *areas.entry(polygon.id()).or_insert(0.0) += polygon.area(tree.vertices());
    }
    areas
}

/// A builder holding `count` unit quads stacked at z = 0, 1, 2, ..., facing
/// +z, with the stack index as id.
pub(crate) fn stacked_quads(count: usize) -> BspTreeBuilder {
    let mut builder = BspTreeBuilder::new();
    for i in 0..count {
        let z = i as f32;
        let quad = [
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(1.0, 1.0, z),
            Point3::new(0.0, 1.0, z),
        ];
        assert!(builder.add_polygon(&quad, i as i32, -1));
    }
    builder
}
