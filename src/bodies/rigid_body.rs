use crate::math::{Matrix3, Quaternion, Real, Vector3};

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Describes one 6-DOF rigid body before it is added to the body state store
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct RigidBodyDesc {
    /// Center of mass in world space
    pub position: Vector3,

    /// Initial orientation
    pub orientation: Quaternion,

    /// Initial linear velocity
    pub linear_velocity: Vector3,

    /// Initial angular velocity in world space
    pub angular_velocity: Vector3,

    /// The body's mass; zero means infinite
    pub mass: Real,

    /// The inertia tensor in the body frame
    pub inertia: Matrix3,

    /// Whether the body is immovable by constraints
    pub fixed: bool,
}

impl RigidBodyDesc {
    /// Creates a dynamic body with unit inertia
    pub fn dynamic(mass: Real, position: Vector3) -> Self {
        Self {
            position,
            orientation: Quaternion::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            mass,
            inertia: Matrix3::identity() * mass,
            fixed: false,
        }
    }

    /// Creates a fixed body (infinite mass), moved only by kinematic targets
    pub fn fixed(position: Vector3) -> Self {
        Self {
            mass: 0.0,
            inertia: Matrix3::zeros(),
            fixed: true,
            ..Self::dynamic(0.0, position)
        }
    }

    /// Sets the inertia of a solid box with the given half extents
    pub fn with_box_inertia(mut self, half_extents: Vector3) -> Self {
        // I = m/12 * (b^2 + c^2) per axis, with full side lengths
        let size = half_extents * 2.0;
        let (x2, y2, z2) = (size.x * size.x, size.y * size.y, size.z * size.z);
        let factor = self.mass / 12.0;
        self.inertia = Matrix3::from_diagonal(&Vector3::new(
            factor * (y2 + z2),
            factor * (x2 + z2),
            factor * (x2 + y2),
        ));
        self
    }

    /// Sets the inertia of a solid sphere
    pub fn with_sphere_inertia(mut self, radius: Real) -> Self {
        let inertia = 0.4 * self.mass * radius * radius;
        self.inertia = Matrix3::from_diagonal_element(inertia);
        self
    }

    /// Sets an arbitrary body-frame inertia tensor
    pub fn with_inertia(mut self, inertia: Matrix3) -> Self {
        self.inertia = inertia;
        self
    }

    pub fn with_orientation(mut self, orientation: Quaternion) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_velocity(mut self, linear: Vector3, angular: Vector3) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    /// Returns the inverse mass, zero for fixed or massless bodies
    pub fn inverse_mass(&self) -> Real {
        if self.fixed || self.mass <= 0.0 {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Returns the body-frame inverse inertia, zero when the tensor is singular or the body is fixed
    pub fn inverse_inertia(&self) -> Matrix3 {
        if self.fixed || self.mass <= 0.0 {
            return Matrix3::zeros();
        }
        self.inertia.try_inverse().unwrap_or_else(Matrix3::zeros)
    }
}
