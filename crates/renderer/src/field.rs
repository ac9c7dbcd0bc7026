//! Particle placement.
//!
//! The first `glyph_fraction` of the particles trace an "H": left stroke,
//! crossbar, right stroke, each covering `segment_span` of the normalized
//! index. The rest scatter uniformly inside a box. All constants come from
//! [`FieldLayout`] so the shape can be tuned without code changes.

use std::f32::consts::TAU;

use glam::Vec3;
use heroconfig::{FieldSettings, VisualMode};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    /// Brightness weight in `[0, 1]`.
    pub activity: f32,
    /// Animation phase in `[0, 2pi)`.
    pub phase: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldLayout {
    pub glyph_fraction: f32,
    pub segment_span: f32,
    pub jitter: f32,
    pub depth_jitter: f32,
    pub stroke_offset: f32,
    pub stroke_length: f32,
    pub scatter_extent: Vec3,
}

impl FieldLayout {
    pub fn for_mode(mode: VisualMode) -> Self {
        Self {
            glyph_fraction: 0.6,
            segment_span: 0.2,
            jitter: 0.25,
            depth_jitter: 0.0,
            stroke_offset: 2.0,
            stroke_length: 4.0,
            scatter_extent: default_extent(mode),
        }
    }

    pub fn from_settings(settings: &FieldSettings, mode: VisualMode) -> Self {
        Self {
            glyph_fraction: settings.glyph_fraction,
            segment_span: settings.segment_span,
            jitter: settings.jitter,
            depth_jitter: settings.depth_jitter,
            stroke_offset: settings.stroke_offset,
            stroke_length: settings.stroke_length,
            scatter_extent: settings
                .scatter_extent
                .map(Vec3::from_array)
                .unwrap_or_else(|| default_extent(mode)),
        }
    }

    /// Point on the H path for normalized index `t < glyph_fraction`, before jitter.
    fn glyph_point(&self, t: f32) -> Vec3 {
        let span = self.segment_span;
        if t < span {
            let local = t / span;
            Vec3::new(-self.stroke_offset, (local - 0.5) * self.stroke_length, 0.0)
        } else if t < span * 2.0 {
            let local = (t - span) / span;
            Vec3::new((local - 0.5) * self.stroke_length, 0.0, 0.0)
        } else {
            let local = ((t - span * 2.0) / span).min(1.0);
            Vec3::new(self.stroke_offset, (local - 0.5) * self.stroke_length, 0.0)
        }
    }
}

impl Default for FieldLayout {
    fn default() -> Self {
        Self::for_mode(VisualMode::Glyph)
    }
}

fn default_extent(mode: VisualMode) -> Vec3 {
    match mode {
        VisualMode::Glyph => Vec3::new(4.0, 4.0, 0.0),
        VisualMode::Constellation => Vec3::new(10.0, 10.0, 10.0),
    }
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, half: f32) -> f32 {
    if half > 0.0 {
        rng.gen_range(-half..half)
    } else {
        0.0
    }
}

pub fn generate_field<R: Rng + ?Sized>(count: usize, layout: &FieldLayout, rng: &mut R) -> Vec<Particle> {
    let mut particles = Vec::with_capacity(count);
    for index in 0..count {
        let t = index as f32 / count as f32;
        let position = if t < layout.glyph_fraction {
            let base = layout.glyph_point(t);
            base + Vec3::new(
                symmetric(rng, layout.jitter),
                symmetric(rng, layout.jitter),
                symmetric(rng, layout.jitter * layout.depth_jitter),
            )
        } else {
            let extent = layout.scatter_extent;
            Vec3::new(
                symmetric(rng, extent.x),
                symmetric(rng, extent.y),
                symmetric(rng, extent.z),
            )
        };
        particles.push(Particle {
            position,
            activity: rng.gen_range(0.0..1.0),
            phase: rng.gen_range(0.0..TAU),
        });
    }
    particles
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn first_particle_starts_left_stroke() {
        let mut rng = StdRng::seed_from_u64(9);
        let particles = generate_field(100, &FieldLayout::default(), &mut rng);
        let first = particles[0].position;
        assert!((first.x + 2.0).abs() <= 0.25);
        assert!((first.y + 2.0).abs() <= 0.25);
        assert_eq!(first.z, 0.0);
    }

    #[test]
    fn glyph_segments_follow_the_h() {
        let mut rng = StdRng::seed_from_u64(1);
        let layout = FieldLayout::default();
        let particles = generate_field(100, &layout, &mut rng);
        for (index, particle) in particles.iter().enumerate() {
            let p = particle.position;
            match index {
                0..=19 => assert!((p.x + 2.0).abs() <= 0.25 && p.y.abs() <= 2.25),
                20..=39 => assert!(p.y.abs() <= 0.25 && p.x.abs() <= 2.25),
                40..=59 => assert!((p.x - 2.0).abs() <= 0.25 && p.y.abs() <= 2.25),
                _ => assert!(p.x.abs() <= 4.0 && p.y.abs() <= 4.0 && p.z == 0.0),
            }
            assert!((0.0..1.0).contains(&particle.activity));
            assert!((0.0..TAU).contains(&particle.phase));
        }
    }

    #[test]
    fn constellation_scatters_in_depth() {
        let mut rng = StdRng::seed_from_u64(3);
        let layout = FieldLayout::for_mode(VisualMode::Constellation);
        let particles = generate_field(100, &layout, &mut rng);
        assert!(particles[60..].iter().any(|p| p.position.z != 0.0));
        assert!(particles[60..]
            .iter()
            .all(|p| p.position.abs().max_element() <= 10.0));
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let layout = FieldLayout::default();
        let a = generate_field(40, &layout, &mut StdRng::seed_from_u64(5));
        let b = generate_field(40, &layout, &mut StdRng::seed_from_u64(5));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_field_is_empty() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(generate_field(0, &FieldLayout::default(), &mut rng).is_empty());
    }
}
