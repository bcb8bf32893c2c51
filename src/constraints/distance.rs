use crate::constraints::ConstraintGradient;
use crate::core::{BodyState, ParticleId};
use crate::math::{Real, EPSILON};

/// Keeps two particles at a fixed rest length
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceConstraint {
    pub(crate) particles: [ParticleId; 2],
    rest_length: Real,
    pub(crate) compliance: Real,
    pub(crate) lambda: Real,
}

impl DistanceConstraint {
    /// Creates a new distance constraint
    pub fn new(a: ParticleId, b: ParticleId, rest_length: Real, compliance: Real) -> Self {
        Self {
            particles: [a, b],
            rest_length: rest_length.max(0.0),
            compliance,
            lambda: 0.0,
        }
    }

    /// Creates a constraint whose rest length is the current distance
    pub fn from_state(a: ParticleId, b: ParticleId, state: &BodyState, compliance: Real) -> Self {
        let rest_length = (state.position(b) - state.position(a)).norm();
        Self::new(a, b, rest_length, compliance)
    }

    pub fn rest_length(&self) -> Real {
        self.rest_length
    }

    /// `c = |x1 - x0| - rest`
    pub fn value_and_gradient(&self, state: &BodyState) -> Option<ConstraintGradient> {
        let [a, b] = self.particles;
        let d = state.position(b) - state.position(a);
        let length = d.norm();
        let c = length - self.rest_length;
        if length < EPSILON {
            return Some(ConstraintGradient::undefined(c, 2));
        }
        let n = d / length;
        Some(ConstraintGradient::linear(c, &[-n, n]))
    }
}
