/// Fraction of the remaining distance covered per rendered frame.
pub const SMOOTHING_FACTOR: f32 = 0.05;

/// Passive pointer and scroll sampling with per-frame easing.
///
/// Hosts write raw targets whenever input arrives; the engine calls
/// [`InputState::advance`] once per rendered frame and reads the eased values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputState {
    pointer_target: [f32; 2],
    pointer: [f32; 2],
    scroll_target: f32,
    scroll: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer in normalized device coordinates; clamped to `[-1, 1]`.
    pub fn set_pointer(&mut self, x: f32, y: f32) {
        self.pointer_target = [clamp_finite(x, -1.0, 1.0), clamp_finite(y, -1.0, 1.0)];
    }

    pub fn set_scroll(&mut self, fraction: f32) {
        self.scroll_target = clamp_finite(fraction, 0.0, 1.0);
    }

    pub fn advance(&mut self) {
        for axis in 0..2 {
            self.pointer[axis] = lerp(self.pointer[axis], self.pointer_target[axis]);
        }
        self.scroll = lerp(self.scroll, self.scroll_target);
    }

    pub fn pointer(&self) -> [f32; 2] {
        self.pointer
    }

    pub fn scroll(&self) -> f32 {
        self.scroll
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn lerp(current: f32, target: f32) -> f32 {
    current + (target - current) * SMOOTHING_FACTOR
}

fn clamp_finite(value: f32, min: f32, max: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        0.0
    }
}

/// Maps a window-space cursor position to NDC with +y up.
pub fn window_to_ndc(x: f64, y: f64, width: u32, height: u32) -> (f32, f32) {
    let w = f64::from(width.max(1));
    let h = f64::from(height.max(1));
    ((x / w * 2.0 - 1.0) as f32, (-(y / h) * 2.0 + 1.0) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_eases_towards_target() {
        let mut input = InputState::new();
        input.set_pointer(1.0, -1.0);
        input.advance();
        assert!((input.pointer()[0] - 0.05).abs() < 1e-6);
        assert!((input.pointer()[1] + 0.05).abs() < 1e-6);
        for _ in 0..400 {
            input.advance();
        }
        assert!((input.pointer()[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn targets_are_clamped() {
        let mut input = InputState::new();
        input.set_pointer(4.0, f32::NAN);
        input.set_scroll(2.0);
        for _ in 0..1000 {
            input.advance();
        }
        assert!(input.pointer()[0] <= 1.0);
        assert_eq!(input.pointer()[1], 0.0);
        assert!(input.scroll() <= 1.0);
    }

    #[test]
    fn window_corners_map_to_ndc() {
        assert_eq!(window_to_ndc(0.0, 0.0, 200, 100), (-1.0, 1.0));
        assert_eq!(window_to_ndc(200.0, 100.0, 200, 100), (1.0, -1.0));
    }
}
