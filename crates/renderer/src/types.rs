use std::fmt;

use heroconfig::{BloomSettings, Color, ThemePalette};

/// Category of a backend-owned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Buffer,
    Material,
    RenderTarget,
    BloomChain,
}

/// Opaque reference to a backend resource. Ids are never reused, so a handle
/// minted after a context restore never aliases one from before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuHandle {
    pub kind: ResourceKind,
    pub id: u64,
}

impl GpuHandle {
    pub const fn new(kind: ResourceKind, id: u64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for GpuHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Instance,
    Uniform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    Background,
    Particles,
    Links,
}

impl MaterialKind {
    pub fn label(self) -> &'static str {
        match self {
            MaterialKind::Background => "background",
            MaterialKind::Particles => "particles",
            MaterialKind::Links => "links",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Straight alpha blending.
    Alpha,
    /// `src * alpha + dst`.
    Additive,
}

pub struct MaterialDescriptor<'a> {
    pub kind: MaterialKind,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    pub scene_uniforms: GpuHandle,
    pub material_uniforms: GpuHandle,
    pub blend: BlendMode,
}

/// Size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Backing-store size for a logical viewport at the given pixel ratio.
    pub fn scaled(&self, pixel_ratio: f32) -> Self {
        let ratio = if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 };
        Self {
            width: ((self.width as f32 * ratio).round() as u32).max(1),
            height: ((self.height as f32 * ratio).round() as u32).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomParams {
    pub strength: f32,
    pub radius: f32,
    pub threshold: f32,
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            strength: 0.3,
            radius: 0.5,
            threshold: 0.8,
        }
    }
}

impl From<BloomSettings> for BloomParams {
    fn from(value: BloomSettings) -> Self {
        Self {
            strength: value.strength,
            radius: value.radius,
            threshold: value.threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRange {
    pub buffer: GpuHandle,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub material: GpuHandle,
    pub geometry: GpuHandle,
    pub vertex_count: u32,
    pub instances: Option<InstanceRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    /// Present the render target as is.
    Direct,
    /// Run the bloom chain before presenting.
    Bloom(GpuHandle),
}

pub struct FramePlan<'a> {
    pub target: GpuHandle,
    pub clear_color: [f32; 4],
    pub draws: &'a [DrawCall],
    pub composite: Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Running,
    Paused,
    ContextLost,
    /// Static presentation after an unrecoverable initialization failure.
    Fallback,
    Destroyed,
}

/// Flat diagonal gradient shown whenever the GPU path is unavailable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackGradient {
    pub from: Color,
    pub to: Color,
    pub angle_degrees: f32,
    pub opacity: f32,
}

impl FallbackGradient {
    pub fn for_palette(palette: &ThemePalette) -> Self {
        Self {
            from: palette.primary,
            to: palette.secondary,
            angle_degrees: 135.0,
            opacity: 0.3,
        }
    }

    /// CSS-style rendering, handy for hosts embedding the hero in a page.
    pub fn css(&self) -> String {
        format!(
            "linear-gradient({}deg, #{:06X} 0%, #{:06X} 100%); opacity: {}",
            self.angle_degrees,
            self.from.to_hex(),
            self.to.to_hex(),
            self.opacity
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presentation {
    /// Nothing presented yet.
    Blank,
    Canvas,
    Fallback(FallbackGradient),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// Pointer position in normalized device coordinates.
    Pointer { x: f32, y: f32 },
    /// Fraction of the host page scrolled, `[0, 1]`.
    Scroll(f32),
    Visibility(bool),
    Resize(SurfaceSize),
    Theme(heroconfig::Theme),
    ContextLost,
    ContextRestored,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_size_rounds_and_never_collapses() {
        let size = SurfaceSize::new(801, 601);
        assert_eq!(size.scaled(1.5), SurfaceSize::new(1202, 902));
        assert_eq!(SurfaceSize::new(1, 1).scaled(0.25), SurfaceSize::new(1, 1));
    }

    #[test]
    fn fallback_matches_light_palette() {
        let gradient = FallbackGradient::for_palette(&ThemePalette::LIGHT);
        assert_eq!(
            gradient.css(),
            "linear-gradient(135deg, #1E40AF 0%, #3B82F6 100%); opacity: 0.3"
        );
    }
}
