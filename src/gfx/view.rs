//! Perspective camera state and matrix construction.

use cgmath::{perspective, Deg, InnerSpace, Matrix4, Point3, Vector3};

use crate::core::viewport::Viewport;

/// Maps OpenGL clip space (z in -1..1) to wgpu clip space (z in 0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// The scene camera. Orbit controls write `eye`/`target` each tick; the
/// viewport resize path keeps `aspect` in sync with the window.
#[derive(Debug, Clone, Copy)]
pub struct View {
    pub eye: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    pub fovy: Deg<f32>,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl View {
    pub fn new(viewport: &Viewport) -> Self {
        Self {
            eye: Point3::new(10.0, 10.0, 10.0),
            target: Point3::new(0.0, 0.0, 0.0),
            up: Vector3::unit_y(),
            fovy: Deg(45.0),
            aspect: viewport.ratio,
            znear: 0.1,
            zfar: 1000.0,
        }
    }

    /// Adopts the viewport's aspect ratio. Registered on the resize
    /// channel so it runs before the renderer reconfigures the surface.
    pub fn resize(&mut self, viewport: &Viewport) {
        self.aspect = viewport.ratio;
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }

    /// Unit vector from the eye toward the target.
    pub fn forward(&self) -> Vector3<f32> {
        (self.target - self.eye).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    #[test]
    fn resize_tracks_viewport_aspect() {
        let mut view = View::new(&Viewport::new(100, 100, 1.0));
        assert!((view.aspect - 1.0).abs() < 1e-6);

        view.resize(&Viewport::new(200, 100, 1.0));
        assert!((view.aspect - 2.0).abs() < 1e-6);
    }

    #[test]
    fn view_projection_is_invertible() {
        let view = View::new(&Viewport::new(800, 600, 1.0));
        assert!(view.view_projection().invert().is_some());
    }

    #[test]
    fn target_projects_to_screen_center() {
        let view = View::new(&Viewport::new(800, 600, 1.0));
        let clip = view.view_projection() * view.target.to_homogeneous();
        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        assert!(ndc_x.abs() < 1e-4 && ndc_y.abs() < 1e-4);
    }
}
