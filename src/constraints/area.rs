use crate::constraints::ConstraintGradient;
use crate::core::{BodyState, ParticleId};
use crate::math::{Real, EPSILON};

/// Preserves the area of a triangle
#[derive(Debug, Clone, PartialEq)]
pub struct AreaConstraint {
    pub(crate) particles: [ParticleId; 3],
    rest_area: Real,
    pub(crate) compliance: Real,
    pub(crate) lambda: Real,
}

impl AreaConstraint {
    pub fn new(particles: [ParticleId; 3], rest_area: Real, compliance: Real) -> Self {
        Self {
            particles,
            rest_area,
            compliance,
            lambda: 0.0,
        }
    }

    pub fn from_state(particles: [ParticleId; 3], state: &BodyState, compliance: Real) -> Self {
        let [x0, x1, x2] = particles.map(|id| state.position(id));
        let rest_area = 0.5 * (x1 - x0).cross(&(x2 - x0)).norm();
        Self::new(particles, rest_area, compliance)
    }

    pub fn rest_area(&self) -> Real {
        self.rest_area
    }

    pub fn value_and_gradient(&self, state: &BodyState) -> Option<ConstraintGradient> {
        let [x0, x1, x2] = self.particles.map(|id| state.position(id));
        let e1 = x1 - x0;
        let e2 = x2 - x0;
        let n = e1.cross(&e2);
        let twice_area = n.norm();
        let c = 0.5 * twice_area - self.rest_area;
        if twice_area < EPSILON {
            return Some(ConstraintGradient::undefined(c, 3));
        }
        let n = n / twice_area;
        let g1 = e2.cross(&n) * 0.5;
        let g2 = n.cross(&e1) * 0.5;
        Some(ConstraintGradient::linear(c, &[-(g1 + g2), g1, g2]))
    }
}
