//! Orbit camera controls: rotate, pan, dolly and fit-to-box framing.

use cgmath::{Deg, EuclideanSpace, InnerSpace, Point3, Rad, Vector3};
use winit::{
    dpi::PhysicalPosition,
    event::{DeviceEvent, ElementState, KeyEvent, MouseButton, MouseScrollDelta},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::gfx::view::View;
use crate::scene::geometry::Aabb;

/// Spherical-coordinate orbit state driving the [`View`] each tick.
///
/// Right-drag rotates, shift + right-drag pans, the wheel dollies. The
/// left button stays free for picking.
pub struct CameraControls {
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    distance: f32,
    pitch: f32,
    yaw: f32,
    target: Point3<f32>,
    is_rotate_pressed: bool,
    is_shift_held: bool,
}

impl Default for CameraControls {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraControls {
    pub fn new() -> Self {
        // Matches the default view eye at (10, 10, 10) looking at origin.
        Self {
            rotate_speed: 0.005,
            zoom_speed: 1.0,
            pan_speed: 0.01,
            distance: 17.32,
            pitch: 0.6155,
            yaw: std::f32::consts::FRAC_PI_4,
            target: Point3::origin(),
            is_rotate_pressed: false,
            is_shift_held: false,
        }
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn target(&self) -> Point3<f32> {
        self.target
    }

    pub fn is_rotating(&self) -> bool {
        self.is_rotate_pressed && !self.is_shift_held
    }

    pub fn is_panning(&self) -> bool {
        self.is_rotate_pressed && self.is_shift_held
    }

    /// Tracks the orbit button from window mouse events.
    pub fn process_mouse_input(&mut self, button: MouseButton, state: ElementState) {
        if button == MouseButton::Right {
            self.is_rotate_pressed = state == ElementState::Pressed;
        }
    }

    /// Raw motion and wheel input.
    pub fn process_device_event(&mut self, event: &DeviceEvent) {
        match event {
            DeviceEvent::MouseMotion { delta } => {
                if self.is_rotate_pressed {
                    if self.is_shift_held {
                        self.pan(-delta.0 as f32 * self.pan_speed, delta.1 as f32 * self.pan_speed);
                    } else {
                        self.add_yaw(-delta.0 as f32 * self.rotate_speed);
                        self.add_pitch(delta.1 as f32 * self.rotate_speed);
                    }
                }
            }
            DeviceEvent::MouseWheel { delta } => {
                let scroll = -match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(PhysicalPosition { y, .. }) => *y as f32 * 0.05,
                };
                self.add_distance(scroll * self.zoom_speed);
            }
            _ => (),
        }
    }

    pub fn process_key_event(&mut self, event: &KeyEvent) {
        if let KeyEvent {
            physical_key: PhysicalKey::Code(KeyCode::ShiftLeft | KeyCode::ShiftRight),
            state,
            ..
        } = event
        {
            self.is_shift_held = *state == ElementState::Pressed;
        }
    }

    pub fn add_pitch(&mut self, delta: f32) {
        let limit = std::f32::consts::FRAC_PI_2 - 1e-4;
        self.pitch = (self.pitch + delta).clamp(-limit, limit);
    }

    pub fn add_yaw(&mut self, delta: f32) {
        self.yaw += delta;
    }

    /// Dolly with a logarithmic correction so zoom feels uniform whether
    /// the camera is near or far.
    pub fn add_distance(&mut self, delta: f32) {
        let corrected = f32::log10(self.distance.max(1.1)) * delta;
        self.set_distance(self.distance + corrected);
    }

    pub fn set_distance(&mut self, distance: f32) {
        self.distance = distance.max(0.1);
    }

    /// Pans in view space, moving the orbit target with the camera.
    fn pan(&mut self, dx: f32, dy: f32) {
        let eye = self.eye_position();
        let forward = (self.target - eye).normalize();
        let right = forward.cross(Vector3::unit_y()).normalize();
        let up = right.cross(forward).normalize();

        // Scale by distance for a consistent feel at any zoom level.
        let scale = self.distance * 0.1;
        self.target += right * dx * scale + up * dy * scale;
    }

    /// Frames a bounding box: centers the target on it and backs the
    /// camera off far enough for the box's bounding sphere to fit the
    /// vertical field of view, keeping the current orbit angles.
    pub fn fit_to_box(&mut self, aabb: &Aabb, fovy: Deg<f32>) {
        let center = aabb.center();
        self.target = Point3::new(center.x, center.y, center.z);

        let radius = aabb.bounding_radius().max(1e-3);
        let half_fov = Rad::from(fovy).0 * 0.5;
        self.set_distance(radius / half_fov.sin() * 1.1);
    }

    fn eye_position(&self) -> Point3<f32> {
        self.target
            + Vector3::new(
                self.distance * self.yaw.sin() * self.pitch.cos(),
                self.distance * self.pitch.sin(),
                self.distance * self.yaw.cos() * self.pitch.cos(),
            )
    }

    /// Writes the orbit state into the camera. Runs every tick before the
    /// frame is rendered.
    pub fn update(&mut self, view: &mut View) {
        view.eye = self.eye_position();
        view.target = self.target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::viewport::Viewport;

    #[test]
    fn update_places_eye_at_orbit_distance() {
        let mut controls = CameraControls::new();
        let mut view = View::new(&Viewport::new(800, 600, 1.0));
        controls.update(&mut view);

        let d = (view.eye - view.target).magnitude();
        assert!((d - controls.distance()).abs() < 1e-3);
    }

    #[test]
    fn pitch_is_clamped_short_of_the_poles() {
        let mut controls = CameraControls::new();
        controls.add_pitch(10.0);
        let mut view = View::new(&Viewport::new(800, 600, 1.0));
        controls.update(&mut view);
        // Eye must not sit exactly above the target.
        let flat = Vector3::new(
            view.eye.x - view.target.x,
            0.0,
            view.eye.z - view.target.z,
        );
        assert!(flat.magnitude() > 0.0);
    }

    #[test]
    fn fit_to_box_contains_bounding_sphere() {
        let mut controls = CameraControls::new();
        let aabb = Aabb {
            min: Vector3::new(-2.0, -2.0, -2.0),
            max: Vector3::new(2.0, 2.0, 2.0),
        };
        let fovy = Deg(45.0);
        controls.fit_to_box(&aabb, fovy);

        assert_eq!(controls.target(), Point3::new(0.0, 0.0, 0.0));
        // Sphere must subtend no more than the field of view.
        let radius = aabb.bounding_radius();
        let min_distance = radius / (Rad::from(fovy).0 * 0.5).sin();
        assert!(controls.distance() >= min_distance);
    }

    #[test]
    fn distance_never_collapses() {
        let mut controls = CameraControls::new();
        for _ in 0..1000 {
            controls.add_distance(-5.0);
        }
        assert!(controls.distance() >= 0.1);
    }
}
