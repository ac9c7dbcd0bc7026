use glam::{Mat4, Vec3};
use heroconfig::VisualMode;

const ORTHO_HALF_HEIGHT: f32 = 5.0;
const PERSPECTIVE_FOV_DEGREES: f32 = 75.0;
const NEAR: f32 = 0.1;
const FAR: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    mode: VisualMode,
    aspect: f32,
    eye: Vec3,
}

impl Camera {
    pub fn for_mode(mode: VisualMode, aspect: f32) -> Self {
        let eye = match mode {
            VisualMode::Glyph => Vec3::new(0.0, 0.0, 1.0),
            VisualMode::Constellation => Vec3::new(0.0, 0.0, 5.0),
        };
        Self {
            mode,
            aspect: sanitize_aspect(aspect),
            eye,
        }
    }

    pub fn mode(&self) -> VisualMode {
        self.mode
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = sanitize_aspect(aspect);
    }

    /// Horizontal extent of the orthographic frustum, `(left, right)`.
    pub fn horizontal_bounds(&self) -> (f32, f32) {
        let half = ORTHO_HALF_HEIGHT * self.aspect;
        (-half, half)
    }

    pub fn projection(&self) -> Mat4 {
        match self.mode {
            VisualMode::Glyph => {
                let (left, right) = self.horizontal_bounds();
                Mat4::orthographic_rh(
                    left,
                    right,
                    -ORTHO_HALF_HEIGHT,
                    ORTHO_HALF_HEIGHT,
                    NEAR,
                    FAR,
                )
            }
            VisualMode::Constellation => Mat4::perspective_rh(
                PERSPECTIVE_FOV_DEGREES.to_radians(),
                self.aspect,
                NEAR,
                FAR,
            ),
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.eye - Vec3::Z, Vec3::Y)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

fn sanitize_aspect(aspect: f32) -> f32 {
    if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn glyph_frustum_spans_five_units_times_aspect() {
        let camera = Camera::for_mode(VisualMode::Glyph, 2.0);
        assert_eq!(camera.horizontal_bounds(), (-10.0, 10.0));
        let edge = camera.view_projection() * Vec4::new(10.0, 5.0, 0.0, 1.0);
        assert!((edge.x / edge.w - 1.0).abs() < 1e-5);
        assert!((edge.y / edge.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn background_plane_is_inside_depth_range() {
        for mode in [VisualMode::Glyph, VisualMode::Constellation] {
            let camera = Camera::for_mode(mode, 1.5);
            let clip = camera.view_projection() * Vec4::new(0.0, 0.0, -1.0, 1.0);
            let depth = clip.z / clip.w;
            assert!((0.0..=1.0).contains(&depth), "{mode:?} depth {depth}");
        }
    }

    #[test]
    fn invalid_aspect_falls_back_to_square() {
        let mut camera = Camera::for_mode(VisualMode::Constellation, f32::NAN);
        assert_eq!(camera.aspect(), 1.0);
        camera.set_aspect(0.0);
        assert_eq!(camera.aspect(), 1.0);
    }
}
