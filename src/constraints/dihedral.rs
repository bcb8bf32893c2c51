use crate::constraints::ConstraintGradient;
use crate::core::{BodyState, ParticleId};
use crate::math::{wrap_angle, Real, Vector3, EPSILON};

/// Preserves the angle between two triangles sharing an edge.
///
/// Particle order is `[p0, p1, p2, p3]` where `p0` and `p1` are the opposite
/// vertices and `p2 -> p3` is the shared edge. A flat pair has angle zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DihedralConstraint {
    pub(crate) particles: [ParticleId; 4],
    rest_angle: Real,
    pub(crate) compliance: Real,
    pub(crate) lambda: Real,
}

impl DihedralConstraint {
    pub fn new(particles: [ParticleId; 4], rest_angle: Real, compliance: Real) -> Self {
        Self {
            particles,
            rest_angle,
            compliance,
            lambda: 0.0,
        }
    }

    /// Creates a constraint that keeps the current angle
    pub fn from_state(particles: [ParticleId; 4], state: &BodyState, compliance: Real) -> Self {
        let p = particles.map(|id| state.position(id));
        let rest_angle = dihedral_angle(&p).unwrap_or(0.0);
        Self::new(particles, rest_angle, compliance)
    }

    pub fn rest_angle(&self) -> Real {
        self.rest_angle
    }

    pub fn value_and_gradient(&self, state: &BodyState) -> Option<ConstraintGradient> {
        let [p0, p1, p2, p3] = self.particles.map(|id| state.position(id));

        let e = p3 - p2;
        let l = e.norm();
        let n1 = (p2 - p0).cross(&(p3 - p0));
        let n2 = (p3 - p1).cross(&(p2 - p1));
        let a1 = n1.norm_squared();
        let a2 = n2.norm_squared();
        if l < EPSILON || a1 < EPSILON || a2 < EPSILON {
            return Some(ConstraintGradient::undefined(wrap_angle(-self.rest_angle), 4));
        }

        let angle = angle_from_normals(n1, n2, e / l);
        let c = wrap_angle(angle - self.rest_angle);

        let g0 = -n1 * (l / a1);
        let g1 = -n2 * (l / a2);
        let g2 = n1 * ((p3 - p0).dot(&e) / (l * a1)) + n2 * ((p3 - p1).dot(&e) / (l * a2));
        let g3 = n1 * ((p0 - p2).dot(&e) / (l * a1)) + n2 * ((p1 - p2).dot(&e) / (l * a2));

        Some(ConstraintGradient::linear(c, &[g0, g1, g2, g3]))
    }
}

fn angle_from_normals(n1: Vector3, n2: Vector3, edge: Vector3) -> Real {
    let n1 = n1.normalize();
    let n2 = n2.normalize();
    n1.cross(&n2).dot(&edge).atan2(n1.dot(&n2))
}

fn dihedral_angle(p: &[Vector3; 4]) -> Option<Real> {
    let e = p[3] - p[2];
    let l = e.norm();
    let n1 = (p[2] - p[0]).cross(&(p[3] - p[0]));
    let n2 = (p[3] - p[1]).cross(&(p[2] - p[1]));
    if l < EPSILON || n1.norm_squared() < EPSILON || n2.norm_squared() < EPSILON {
        return None;
    }
    Some(angle_from_normals(n1, n2, e / l))
}
