use std::f32::consts::TAU;

use crate::uniforms::GeometryVertex;

pub const PARTICLE_RADIUS: f32 = 0.05;
pub const PARTICLE_SEGMENTS: u32 = 8;
pub const LINK_WIDTH: f32 = 0.02;
pub const BACKGROUND_EXTENT: f32 = 10.0;
pub const BACKGROUND_DEPTH: f32 = -1.0;
/// Vertices in a [`plane`] quad.
pub const PLANE_VERTEX_COUNT: u32 = 6;

/// Triangle-list disc centred on the origin.
pub fn circle(radius: f32, segments: u32) -> Vec<GeometryVertex> {
    let segments = segments.max(3);
    let rim = |index: u32| {
        let angle = index as f32 / segments as f32 * TAU;
        let (sin, cos) = angle.sin_cos();
        GeometryVertex {
            position: [cos * radius, sin * radius, 0.0],
            uv: [cos * 0.5 + 0.5, sin * 0.5 + 0.5],
        }
    };
    let centre = GeometryVertex {
        position: [0.0, 0.0, 0.0],
        uv: [0.5, 0.5],
    };

    let mut vertices = Vec::with_capacity(segments as usize * 3);
    for index in 0..segments {
        vertices.push(centre);
        vertices.push(rim(index));
        vertices.push(rim(index + 1));
    }
    vertices
}

/// Two-triangle quad in the XY plane at depth `z`.
pub fn plane(width: f32, height: f32, z: f32) -> Vec<GeometryVertex> {
    let (hw, hh) = (width * 0.5, height * 0.5);
    let corner = |x: f32, y: f32| GeometryVertex {
        position: [x * hw, y * hh, z],
        uv: [x * 0.5 + 0.5, y * 0.5 + 0.5],
    };
    vec![
        corner(-1.0, -1.0),
        corner(1.0, -1.0),
        corner(1.0, 1.0),
        corner(-1.0, -1.0),
        corner(1.0, 1.0),
        corner(-1.0, 1.0),
    ]
}

pub fn particle_disc() -> Vec<GeometryVertex> {
    circle(PARTICLE_RADIUS, PARTICLE_SEGMENTS)
}

/// Unit-length strip the link vertex shader stretches between endpoints.
pub fn link_strip() -> Vec<GeometryVertex> {
    plane(1.0, LINK_WIDTH, 0.0)
}

pub fn background_plane() -> Vec<GeometryVertex> {
    plane(BACKGROUND_EXTENT, BACKGROUND_EXTENT, BACKGROUND_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disc_has_three_vertices_per_segment() {
        let disc = particle_disc();
        assert_eq!(disc.len(), 24);
        let max_radius = disc
            .iter()
            .map(|v| (v.position[0].powi(2) + v.position[1].powi(2)).sqrt())
            .fold(0.0_f32, f32::max);
        assert!((max_radius - PARTICLE_RADIUS).abs() < 1e-6);
    }

    #[test]
    fn background_sits_behind_scene() {
        let plane = background_plane();
        assert_eq!(plane.len(), 6);
        assert!(plane.iter().all(|v| v.position[2] == BACKGROUND_DEPTH));
        assert_eq!(plane[2].position[0], 5.0);
    }
}
