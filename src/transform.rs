//! Position, rotation and scale of an object in world space.
//!
//! [`Transform`] stores its three components separately and composes them
//! into a world matrix on demand, applied in **Scale → Rotate → Translate**
//! order. Rotation is always a quaternion; Euler angles are accepted through
//! [`Transform::with_euler`] and [`Transform::set_euler`] and converted
//! immediately.
//!
//! ```
//! use plume::{Transform, Vec3, Quat};
//!
//! let transform = Transform::new()
//!     .position(Vec3::new(0.0, 2.0, -5.0))
//!     .rotation(Quat::from_rotation_y(0.5))
//!     .uniform_scale(2.0);
//!
//! let world = transform.world_matrix();
//! # let _ = world;
//! ```

use glam::{Mat4, Quat, Vec3};

use crate::game_object::ObjectId;

/// Rotation from Euler angles in radians, applied about X, then Y, then Z.
pub fn euler_to_quat(angles: Vec3) -> Quat {
    Quat::from_rotation_z(angles.z) * Quat::from_rotation_y(angles.y) * Quat::from_rotation_x(angles.x)
}

/// A flat (non-hierarchical) spatial transform.
///
/// # Default Values
///
/// - `position`: `(0, 0, 0)`
/// - `rotation`: identity
/// - `scale`: `(1, 1, 1)`
///
/// Scale components never go negative: the setters clamp negative input to
/// zero. A zero component is allowed and produces a degenerate matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// World-space position (translation).
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    scale: Vec3,
    owner: Option<ObjectId>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            owner: None,
        }
    }
}

impl Transform {
    /// Creates an identity transform (origin, no rotation, unit scale).
    pub fn new() -> Self {
        Self::default()
    }

    /// An identity transform belonging to `owner`.
    pub fn owned_by(owner: ObjectId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }

    /// Creates a transform positioned at the given location.
    ///
    /// ```
    /// use plume::{Transform, Vec3};
    ///
    /// let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
    /// assert_eq!(transform.position, Vec3::new(1.0, 2.0, 3.0));
    /// ```
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Sets the rotation from Euler angles (radians, X then Y then Z).
    pub fn with_euler(mut self, angles: Vec3) -> Self {
        self.set_euler(angles);
        self
    }

    /// Sets per-axis scale. Negative components become zero.
    pub fn scale(mut self, scale: Vec3) -> Self {
        self.set_scale(scale);
        self
    }

    /// Sets uniform scale on all axes.
    ///
    /// ```
    /// use plume::{Transform, Vec3};
    ///
    /// let transform = Transform::new().uniform_scale(2.0);
    /// assert_eq!(transform.scale_factors(), Vec3::splat(2.0));
    /// ```
    pub fn uniform_scale(self, scale: f32) -> Self {
        self.scale(Vec3::splat(scale))
    }

    pub fn set_euler(&mut self, angles: Vec3) {
        self.rotation = euler_to_quat(angles);
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale.max(Vec3::ZERO);
    }

    pub fn scale_factors(&self) -> Vec3 {
        self.scale
    }

    /// The object this transform belongs to, if any. Identity only.
    pub fn owner(&self) -> Option<ObjectId> {
        self.owner
    }

    /// Copies position, rotation and scale from `other`, keeping this owner.
    pub fn copy_spatial_from(&mut self, other: &Transform) {
        self.position = other.position;
        self.rotation = other.rotation;
        self.scale = other.scale;
    }

    /// The local-to-world matrix, recomputed on every call.
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPS: f32 = 1e-5;

    #[test]
    fn default_is_identity() {
        assert_eq!(Transform::new().world_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn world_matrix_decomposes() {
        let tilted = Vec3::new(1.0, 1.0, 0.0).normalize();
        let cases = [
            (Vec3::ZERO, Quat::IDENTITY, Vec3::ONE),
            (Vec3::new(3.0, -1.0, 2.5), Quat::from_axis_angle(tilted, 0.7), Vec3::new(2.0, 0.5, 1.5)),
            (Vec3::new(-7.0, 0.25, 40.0), euler_to_quat(Vec3::new(0.3, -2.1, 1.4)), Vec3::new(0.1, 8.0, 3.0)),
            (Vec3::new(0.0, 5.0, 0.0), Quat::from_rotation_y(3.0), Vec3::splat(64.0)),
        ];

        for (position, rotation, scale) in cases {
            let transform = Transform::new().position(position).rotation(rotation).scale(scale);

            let (s, r, t) = transform.world_matrix().to_scale_rotation_translation();

            assert!(s.abs_diff_eq(scale, EPS * scale.max_element()), "{scale} vs {s}");
            assert!(t.abs_diff_eq(position, EPS * 10.0), "{position} vs {t}");
            // q and -q are the same rotation
            assert!(r.dot(rotation).abs() > 1.0 - EPS, "{rotation} vs {r}");
        }
    }

    #[test]
    fn zero_scale_axis_still_translates() {
        let position = Vec3::new(1.5, -2.0, 4.0);
        let rotation = Quat::from_axis_angle(Vec3::new(0.0, 1.0, 1.0).normalize(), 1.1);
        let transform = Transform::new()
            .position(position)
            .rotation(rotation)
            .scale(Vec3::new(2.0, 0.0, 1.0));
        let world = transform.world_matrix();

        assert!(world.transform_point3(Vec3::ZERO).abs_diff_eq(position, EPS));
        // everything along the flattened axis lands on the same point
        assert!(world.transform_point3(Vec3::Y * 3.0).abs_diff_eq(position, EPS));
        let expected = position + rotation * Vec3::new(2.0, 0.0, 0.5);
        assert!(world.transform_point3(Vec3::new(1.0, 7.0, 0.5)).abs_diff_eq(expected, EPS));
    }

    #[test]
    fn scale_is_applied_before_rotation() {
        let transform = Transform::new()
            .rotation(Quat::from_rotation_z(FRAC_PI_2))
            .scale(Vec3::new(2.0, 1.0, 1.0))
            .position(Vec3::new(0.0, 0.0, 10.0));

        let p = transform.world_matrix().transform_point3(Vec3::X);

        // scaled along X first, then turned onto Y, then moved
        assert!(p.abs_diff_eq(Vec3::new(0.0, 2.0, 10.0), EPS));
    }

    #[test]
    fn euler_rotates_x_then_y_then_z() {
        let angles = Vec3::new(0.3, -0.8, 1.1);
        let transform = Transform::new().with_euler(angles);

        let expected = Mat4::from_rotation_z(angles.z)
            * Mat4::from_rotation_y(angles.y)
            * Mat4::from_rotation_x(angles.x);
        let v = Vec3::new(0.2, 0.9, -0.4);

        assert!(
            transform
                .world_matrix()
                .transform_vector3(v)
                .abs_diff_eq(expected.transform_vector3(v), EPS)
        );
    }

    #[test]
    fn negative_scale_clamps_to_zero() {
        let mut transform = Transform::new();
        transform.set_scale(Vec3::new(-1.0, 2.0, 0.0));
        assert_eq!(transform.scale_factors(), Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn copy_keeps_owner() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        let source = Transform::owned_by(a).position(Vec3::ONE);
        let mut target = Transform::owned_by(b);

        target.copy_spatial_from(&source);

        assert_eq!(target.position, Vec3::ONE);
        assert_eq!(target.owner(), Some(b));
    }
}
