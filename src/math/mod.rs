mod rotation;

pub use rotation::{
    angular_velocity_from_delta, apply_rotation_delta, integrate_orientation,
    interpolate_orientation, world_inverse_inertia,
};

/// Scalar type used by the solver
pub type Real = f64;

/// A 3D vector
pub type Vector3 = nalgebra::Vector3<Real>;

/// A 3x3 matrix, used for inertia tensors and deformation gradients
pub type Matrix3 = nalgebra::Matrix3<Real>;

/// A unit quaternion representing a body orientation
pub type Quaternion = nalgebra::UnitQuaternion<Real>;

/// Constant for a very small number, used for comparisons and degenerate-denominator checks
pub const EPSILON: Real = 1.0e-10;

/// Wraps an angle into `[-pi, pi]`
#[inline]
pub fn wrap_angle(angle: Real) -> Real {
    use std::f64::consts::PI;

    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}
