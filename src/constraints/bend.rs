use crate::constraints::ConstraintGradient;
use crate::core::{BodyState, ParticleId};
use crate::math::{Real, Vector3, EPSILON};

/// Preserves the bend of a three-particle strip.
///
/// The bend is measured as the distance of the middle particle from the
/// centroid of the triple, which is zero for a straight strip.
#[derive(Debug, Clone, PartialEq)]
pub struct BendConstraint {
    pub(crate) particles: [ParticleId; 3],
    rest_distance: Real,
    pub(crate) compliance: Real,
    pub(crate) lambda: Real,
}

impl BendConstraint {
    pub fn new(particles: [ParticleId; 3], rest_distance: Real, compliance: Real) -> Self {
        Self {
            particles,
            rest_distance: rest_distance.max(0.0),
            compliance,
            lambda: 0.0,
        }
    }

    /// Creates a constraint that keeps the current bend
    pub fn from_state(particles: [ParticleId; 3], state: &BodyState, compliance: Real) -> Self {
        let [x0, x1, x2] = particles.map(|id| state.position(id));
        Self::new(particles, (x1 - centroid(x0, x1, x2)).norm(), compliance)
    }

    pub fn rest_distance(&self) -> Real {
        self.rest_distance
    }

    pub fn value_and_gradient(&self, state: &BodyState) -> Option<ConstraintGradient> {
        let [x0, x1, x2] = self.particles.map(|id| state.position(id));
        let offset = x1 - centroid(x0, x1, x2);
        let length = offset.norm();
        let c = length - self.rest_distance;
        if length < EPSILON {
            return Some(ConstraintGradient::undefined(c, 3));
        }
        let n = offset / length;
        Some(ConstraintGradient::linear(
            c,
            &[-n / 3.0, n * (2.0 / 3.0), -n / 3.0],
        ))
    }
}

#[inline]
fn centroid(x0: Vector3, x1: Vector3, x2: Vector3) -> Vector3 {
    (x0 + x1 + x2) / 3.0
}
