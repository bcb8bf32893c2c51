use nalgebra::UnitQuaternion;

use crate::math::{Matrix3, Quaternion, Real, Vector3, EPSILON};

/// Advances an orientation by an angular velocity over `dt`.
///
/// Uses the first-order quaternion update `q' = q + 0.5 * dt * [w, 0] * q`
/// followed by renormalization, which is the integration rule XPBD uses for
/// both prediction and rotational corrections.
#[inline]
pub fn integrate_orientation(orientation: Quaternion, angular_velocity: Vector3, dt: Real) -> Quaternion {
    apply_rotation_delta(orientation, angular_velocity * dt)
}

/// Applies a small rotation vector (axis * angle) to an orientation and renormalizes.
pub fn apply_rotation_delta(orientation: Quaternion, delta: Vector3) -> Quaternion {
    if delta.norm_squared() <= EPSILON * EPSILON {
        return orientation;
    }

    let q = orientation.into_inner();
    let omega = nalgebra::Quaternion::from_parts(0.0, delta);
    UnitQuaternion::new_normalize(q + omega * q * 0.5)
}

/// Recovers the angular velocity that rotates `previous` into `current` over `dt`.
pub fn angular_velocity_from_delta(previous: Quaternion, current: Quaternion, dt: Real) -> Vector3 {
    let delta = current.into_inner() * previous.into_inner().conjugate();
    let omega = delta.vector() * (2.0 / dt);

    // Take the short way around
    if delta.w < 0.0 {
        -omega
    } else {
        omega.into_owned()
    }
}

/// Transforms a body-frame inverse inertia tensor into world space: `R * I^-1 * R^T`.
#[inline]
pub fn world_inverse_inertia(orientation: Quaternion, inv_inertia_body: &Matrix3) -> Matrix3 {
    let r = orientation.to_rotation_matrix();
    r.matrix() * inv_inertia_body * r.matrix().transpose()
}

/// Spherically interpolates between two orientations, falling back to `to` when they are opposite.
pub fn interpolate_orientation(from: Quaternion, to: Quaternion, t: Real) -> Quaternion {
    from.try_slerp(&to, t, EPSILON).unwrap_or(to)
}
