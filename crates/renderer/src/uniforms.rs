//! std140 uniform blocks and instance layouts shared with `assets/shaders`.
//!
//! Every struct here is `Pod` and written verbatim into a backend buffer, so
//! field order and padding must match the GLSL declarations exactly.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use heroconfig::Color;

use crate::field::Particle;
use crate::links::Link;

/// Scene-wide block bound at `set = 0, binding = 0` for every material.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub resolution: [f32; 2],
    pub time: f32,
    pub scroll: f32,
}

impl SceneUniforms {
    pub fn new(view_proj: Mat4, width: f32, height: f32) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            resolution: [width, height],
            time: 0.0,
            scroll: 0.0,
        }
    }

    pub fn set_view_proj(&mut self, view_proj: Mat4) {
        self.view_proj = view_proj.to_cols_array_2d();
    }

    pub fn set_resolution(&mut self, width: f32, height: f32) {
        self.resolution = [width, height];
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
    }

    pub fn set_scroll(&mut self, scroll: f32) {
        self.scroll = scroll.clamp(0.0, 1.0);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BackgroundUniforms {
    pub primary: [f32; 4],
    pub secondary: [f32; 4],
    pub intensity: f32,
    pub reduced_motion: f32,
    pub complexity: f32,
    pub _pad: f32,
}

impl BackgroundUniforms {
    pub fn new(primary: Color, secondary: Color, intensity: f32, reduced_motion: bool) -> Self {
        Self {
            primary: primary.with_alpha(1.0),
            secondary: secondary.with_alpha(1.0),
            intensity,
            reduced_motion: flag(reduced_motion),
            complexity: 1.0,
            _pad: 0.0,
        }
    }

    pub fn set_colors(&mut self, primary: Color, secondary: Color) {
        self.primary = primary.with_alpha(1.0);
        self.secondary = secondary.with_alpha(1.0);
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
    }

    pub fn set_complexity(&mut self, complex: bool) {
        self.complexity = flag(complex);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticleUniforms {
    pub color: [f32; 4],
    pub mouse: [f32; 2],
    pub intensity: f32,
    pub scale: f32,
    pub reduced_motion: f32,
    pub _pad: [f32; 3],
}

impl ParticleUniforms {
    pub fn new(color: Color, intensity: f32, reduced_motion: bool) -> Self {
        Self {
            color: color.with_alpha(1.0),
            mouse: [0.0, 0.0],
            intensity,
            scale: 1.0,
            reduced_motion: flag(reduced_motion),
            _pad: [0.0; 3],
        }
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color.with_alpha(1.0);
    }

    pub fn set_mouse(&mut self, pointer: [f32; 2]) {
        self.mouse = pointer;
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LinkUniforms {
    pub color: [f32; 4],
    pub intensity: f32,
    pub reduced_motion: f32,
    pub width: f32,
    pub _pad: f32,
}

/// Links render dimmer than the rest of the scene.
pub const LINK_INTENSITY_SCALE: f32 = 0.6;

impl LinkUniforms {
    pub fn new(color: Color, intensity: f32, reduced_motion: bool) -> Self {
        Self {
            color: color.with_alpha(1.0),
            intensity: intensity * LINK_INTENSITY_SCALE,
            reduced_motion: flag(reduced_motion),
            width: 0.02,
            _pad: 0.0,
        }
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color.with_alpha(1.0);
    }

    /// Takes the scene intensity; the link scale is applied here.
    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity * LINK_INTENSITY_SCALE;
    }
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Per-vertex layout of every base geometry (`location = 0, 1`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GeometryVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Per-instance particle layout (`location = 2, 3, 4`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    pub position: [f32; 3],
    pub activity: f32,
    pub phase: f32,
}

impl From<&Particle> for ParticleInstance {
    fn from(particle: &Particle) -> Self {
        Self {
            position: particle.position.to_array(),
            activity: particle.activity,
            phase: particle.phase,
        }
    }
}

/// Per-instance link layout (`location = 2, 3, 4`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LinkInstance {
    pub start: [f32; 3],
    pub end: [f32; 3],
    pub pulse: f32,
}

impl From<&Link> for LinkInstance {
    fn from(link: &Link) -> Self {
        Self {
            start: link.start.to_array(),
            end: link.end.to_array(),
            pulse: link.pulse_phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn std140_sizes_match_shader_blocks() {
        assert_eq!(size_of::<SceneUniforms>(), 80);
        assert_eq!(offset_of!(SceneUniforms, resolution), 64);
        assert_eq!(size_of::<BackgroundUniforms>(), 48);
        assert_eq!(offset_of!(BackgroundUniforms, intensity), 32);
        assert_eq!(size_of::<ParticleUniforms>(), 48);
        assert_eq!(offset_of!(ParticleUniforms, mouse), 16);
        assert_eq!(size_of::<LinkUniforms>(), 32);
        assert_eq!(size_of::<ParticleInstance>(), 20);
        assert_eq!(size_of::<LinkInstance>(), 28);
        assert_eq!(offset_of!(LinkInstance, pulse), 24);
    }

    #[test]
    fn link_intensity_is_scaled() {
        let mut uniforms = LinkUniforms::new(Color::from_hex(0x6366F1), 1.0, false);
        assert!((uniforms.intensity - 0.6).abs() < 1e-6);
        uniforms.set_intensity(0.5);
        assert!((uniforms.intensity - 0.3).abs() < 1e-6);
    }
}
