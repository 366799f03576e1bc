//! Tracks the render surface's logical size and device pixel ratio.

/// Cached window metrics shared by the camera, renderer and compositor.
///
/// Sizes are in logical pixels; multiply by `pixel_ratio` for physical
/// texture dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Width over height. Falls back to 1.0 when height is zero so a
    /// minimized window never poisons the projection matrix.
    pub ratio: f32,
    /// Device scale factor, capped at [`Self::MAX_PIXEL_RATIO`].
    pub pixel_ratio: f32,
}

impl Viewport {
    /// High-DPI displays report ratios of 3 or more; rendering above 2x
    /// costs fill rate without a visible payoff.
    pub const MAX_PIXEL_RATIO: f32 = 2.0;

    pub fn new(width: u32, height: u32, scale_factor: f32) -> Self {
        let mut viewport = Self {
            width: 0,
            height: 0,
            ratio: 1.0,
            pixel_ratio: 1.0,
        };
        viewport.measure(width, height, scale_factor);
        viewport
    }

    /// Recomputes all metrics from a new window size and scale factor.
    pub fn measure(&mut self, width: u32, height: u32, scale_factor: f32) {
        self.width = width;
        self.height = height;
        self.ratio = if height == 0 {
            log::warn!("viewport measured with zero height, keeping aspect ratio 1.0");
            1.0
        } else {
            width as f32 / height as f32
        };
        self.pixel_ratio = scale_factor.max(1.0).min(Self::MAX_PIXEL_RATIO);
    }

    /// Physical width in device pixels, never zero.
    pub fn physical_width(&self) -> u32 {
        ((self.width as f32 * self.pixel_ratio) as u32).max(1)
    }

    /// Physical height in device pixels, never zero.
    pub fn physical_height(&self) -> u32 {
        ((self.height as f32 * self.pixel_ratio) as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_ratio_is_capped() {
        let viewport = Viewport::new(800, 600, 3.0);
        assert_eq!(viewport.pixel_ratio, Viewport::MAX_PIXEL_RATIO);
        assert_eq!(viewport.physical_width(), 1600);
        assert_eq!(viewport.physical_height(), 1200);
    }

    #[test]
    fn zero_height_keeps_safe_aspect() {
        let mut viewport = Viewport::new(800, 600, 1.0);
        assert!((viewport.ratio - 800.0 / 600.0).abs() < 1e-6);

        viewport.measure(800, 0, 1.0);
        assert_eq!(viewport.ratio, 1.0);
        // Physical sizes stay valid surface dimensions.
        assert_eq!(viewport.physical_height(), 1);
    }

    #[test]
    fn fractional_scale_factors_round_down() {
        let viewport = Viewport::new(1000, 500, 1.25);
        assert_eq!(viewport.physical_width(), 1250);
        assert_eq!(viewport.physical_height(), 625);
    }
}
