//! Scene lighting rig: one ambient term plus one shadow-casting
//! directional light.

use cgmath::{Matrix4, Point3, Vector3};

use crate::gfx::view::OPENGL_TO_WGPU_MATRIX;

#[derive(Debug, Clone, Copy)]
pub struct AmbientLight {
    pub color: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    /// Position the light shines from, toward the origin.
    pub position: Vector3<f32>,
    pub color: [f32; 3],
    pub intensity: f32,
    pub cast_shadows: bool,
}

/// The fixed light rig every scene gets.
#[derive(Debug, Clone, Copy)]
pub struct Lights {
    pub ambient: AmbientLight,
    pub directional: DirectionalLight,
}

impl Default for Lights {
    fn default() -> Self {
        Self {
            ambient: AmbientLight {
                color: [1.0, 1.0, 1.0],
                intensity: 1.5,
            },
            directional: DirectionalLight {
                position: Vector3::new(5.0, 10.0, 15.0),
                color: [1.0, 1.0, 1.0],
                intensity: 1.0,
                cast_shadows: true,
            },
        }
    }
}

impl Lights {
    /// Orthographic view-projection used to render the shadow map from the
    /// directional light. The frustum is a fixed box around the origin
    /// large enough for the models this viewer targets.
    pub fn light_view_proj(&self) -> Matrix4<f32> {
        let eye = Point3::new(
            self.directional.position.x,
            self.directional.position.y,
            self.directional.position.z,
        );
        let view = Matrix4::look_at_rh(eye, Point3::new(0.0, 0.0, 0.0), Vector3::unit_y());
        let proj = cgmath::ortho(-30.0, 30.0, -30.0, 30.0, 0.1, 100.0);
        OPENGL_TO_WGPU_MATRIX * proj * view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_inside_the_shadow_frustum() {
        let lights = Lights::default();
        let clip = lights.light_view_proj() * cgmath::Vector4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
        assert!((0.0..=1.0).contains(&ndc.z));
    }
}
