use crate::constraints::ConstraintGradient;
use crate::core::{BodyState, ParticleId};
use crate::math::{Real, Vector3};

/// Preserves the signed volume of a tetrahedron
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeConstraint {
    pub(crate) particles: [ParticleId; 4],
    rest_volume: Real,
    pub(crate) compliance: Real,
    pub(crate) lambda: Real,
}

impl VolumeConstraint {
    pub fn new(particles: [ParticleId; 4], rest_volume: Real, compliance: Real) -> Self {
        Self {
            particles,
            rest_volume,
            compliance,
            lambda: 0.0,
        }
    }

    pub fn from_state(particles: [ParticleId; 4], state: &BodyState, compliance: Real) -> Self {
        let x = particles.map(|id| state.position(id));
        Self::new(particles, signed_volume(&x), compliance)
    }

    pub fn rest_volume(&self) -> Real {
        self.rest_volume
    }

    pub fn value_and_gradient(&self, state: &BodyState) -> Option<ConstraintGradient> {
        let x = self.particles.map(|id| state.position(id));
        let a = x[1] - x[0];
        let b = x[2] - x[0];
        let c = x[3] - x[0];

        let g1 = b.cross(&c) / 6.0;
        let g2 = c.cross(&a) / 6.0;
        let g3 = a.cross(&b) / 6.0;
        let g0 = -(g1 + g2 + g3);

        let value = signed_volume(&x) - self.rest_volume;
        Some(ConstraintGradient::linear(value, &[g0, g1, g2, g3]))
    }
}

/// `V = (x1 - x0) . ((x2 - x0) x (x3 - x0)) / 6`
pub fn signed_volume(x: &[Vector3; 4]) -> Real {
    (x[1] - x[0]).dot(&(x[2] - x[0]).cross(&(x[3] - x[0]))) / 6.0
}
