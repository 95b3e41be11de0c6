use std::cell::Cell;

use glam::{Mat4, Vec3};

/// Anything that can report where the viewer's eye is in world space.
///
/// The volume renderer only needs the eye position to start its rays; view
/// and projection matrices are passed in separately.
pub trait EyePosition {
    fn eye_position(&self) -> Vec3;
}

/// A simple camera for 3D scenes.
///
/// Provides position, orientation, and field of view, and builds right-handed
/// view and projection matrices (depth range 0..1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub fov: f32, // radians
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_2, // 90 degrees
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn looking_at(mut self, target: Vec3) -> Self {
        self.forward = (target - self.position).normalize_or(Vec3::NEG_Z);
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    /// Compute the right vector from forward and up.
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or_zero()
    }

    /// Recompute up to be orthogonal to forward and right.
    pub fn orthogonal_up(&self) -> Vec3 {
        self.right().cross(self.forward).normalize_or_zero()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, near, far)
    }
}

impl EyePosition for Camera {
    fn eye_position(&self) -> Vec3 {
        self.position
    }
}

// a host that moves its camera every frame shares it as `Rc<Cell<Camera>>`
impl<T: EyePosition + Copy> EyePosition for Cell<T> {
    fn eye_position(&self) -> Vec3 {
        self.get().eye_position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looking_at_origin_from_negative_z() {
        let camera = Camera::new().at(Vec3::new(0.0, 0.0, -5.0)).looking_at(Vec3::ZERO);
        assert_eq!(camera.forward, Vec3::Z);

        // the target lands straight ahead, 5 units away
        let in_view = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!(in_view.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    }

    #[test]
    fn basis_is_orthonormal() {
        let camera = Camera::new().at(Vec3::new(3.0, 2.0, 1.0)).looking_at(Vec3::ZERO);
        let right = camera.right();
        let up = camera.orthogonal_up();

        assert!(right.dot(camera.forward).abs() < 1e-5);
        assert!(up.dot(camera.forward).abs() < 1e-5);
        assert!((right.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn eye_is_position() {
        let camera = Camera::new().at(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(camera.eye_position(), Vec3::new(1.0, 2.0, 3.0));
    }
}
