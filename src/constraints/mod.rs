//! The closed set of constraint variants and their XPBD projection.

mod constraint;
mod distance;
mod bend;
mod dihedral;
mod area;
mod volume;
mod fem;
mod contact;

pub use self::constraint::{
    apply_to_state, xpbd_correction, ConstraintGradient, Correction, Projection, MAX_PARTICIPANTS,
};
pub use self::distance::DistanceConstraint;
pub use self::bend::BendConstraint;
pub use self::dihedral::DihedralConstraint;
pub use self::area::AreaConstraint;
pub use self::volume::{signed_volume, VolumeConstraint};
pub use self::fem::FemConstraint;
pub use self::contact::{local_arm, ContactConstraint, ContactKind, ContactResponse};

use crate::bodies::ConstraintFamily;
use crate::core::{BodyState, ParticleId};
use crate::math::Real;

macro_rules! dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            Constraint::Distance($c) => $body,
            Constraint::Bend($c) => $body,
            Constraint::Dihedral($c) => $body,
            Constraint::Area($c) => $body,
            Constraint::Volume($c) => $body,
            Constraint::Fem($c) => $body,
            Constraint::Contact($c) => $body,
        }
    };
}

/// A constraint of any variant
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Distance(DistanceConstraint),
    Bend(BendConstraint),
    Dihedral(DihedralConstraint),
    Area(AreaConstraint),
    Volume(VolumeConstraint),
    Fem(FemConstraint),
    Contact(ContactConstraint),
}

impl Constraint {
    /// The particles the constraint reads and writes, in gradient order
    pub fn particles(&self) -> &[ParticleId] {
        match self {
            Constraint::Distance(c) => &c.particles[..],
            Constraint::Bend(c) => &c.particles[..],
            Constraint::Dihedral(c) => &c.particles[..],
            Constraint::Area(c) => &c.particles[..],
            Constraint::Volume(c) => &c.particles[..],
            Constraint::Fem(c) => &c.particles[..],
            Constraint::Contact(c) => c.participants(),
        }
    }

    pub fn compliance(&self) -> Real {
        dispatch!(self, c => c.compliance)
    }

    pub fn set_compliance(&mut self, compliance: Real) {
        dispatch!(self, c => c.compliance = compliance.max(0.0))
    }

    /// The Lagrange multiplier accumulated since the last reset
    pub fn lambda(&self) -> Real {
        dispatch!(self, c => c.lambda)
    }

    pub fn reset_lambda(&mut self) {
        dispatch!(self, c => c.lambda = 0.0)
    }

    /// The family this constraint belongs to, `None` for contacts and grasps
    pub fn family(&self) -> Option<ConstraintFamily> {
        match self {
            Constraint::Distance(_) => Some(ConstraintFamily::Distance),
            Constraint::Bend(_) => Some(ConstraintFamily::Bend),
            Constraint::Dihedral(_) => Some(ConstraintFamily::Dihedral),
            Constraint::Area(_) => Some(ConstraintFamily::Area),
            Constraint::Volume(_) => Some(ConstraintFamily::Volume),
            Constraint::Fem(_) => Some(ConstraintFamily::Fem),
            Constraint::Contact(_) => None,
        }
    }

    /// Evaluates the error and its gradient; `None` when the constraint is inactive
    pub fn compute_value_and_gradient(&self, state: &BodyState) -> Option<ConstraintGradient> {
        dispatch!(self, c => c.value_and_gradient(state))
    }

    /// Computes one XPBD update without touching the state
    pub fn compute_correction(&self, state: &BodyState, dt: Real) -> Correction {
        match self.compute_value_and_gradient(state) {
            Some(gradient) => xpbd_correction(
                self.particles(),
                &gradient,
                self.compliance(),
                self.lambda(),
                state,
                dt,
            ),
            None => Correction::skipped(Projection::Inactive, 0.0),
        }
    }

    /// Writes a correction computed by [`Constraint::compute_correction`]
    pub fn apply_correction(&mut self, state: &mut BodyState, correction: &Correction) -> Projection {
        if correction.outcome == Projection::Applied {
            dispatch!(self, c => c.lambda += correction.delta_lambda);
            apply_to_state(self.particles(), correction, state);
        }
        correction.outcome
    }

    /// Projects the constraint once: compute then apply
    pub fn project(&mut self, state: &mut BodyState, dt: Real) -> Projection {
        let correction = self.compute_correction(state, dt);
        self.apply_correction(state, &correction)
    }

    /// Called once before the iterations of a substep
    pub fn prepare(&mut self, state: &BodyState) {
        if let Constraint::Contact(c) = self {
            c.prepare(state);
        }
    }

    /// Velocity-level correction after velocities are derived; contacts only
    pub fn correct_velocity(&self, state: &mut BodyState, dt: Real) {
        if let Constraint::Contact(c) = self {
            c.correct_velocity(state, dt);
        }
    }

    pub fn as_contact(&self) -> Option<&ContactConstraint> {
        match self {
            Constraint::Contact(c) => Some(c),
            _ => None,
        }
    }
}

impl From<DistanceConstraint> for Constraint {
    fn from(c: DistanceConstraint) -> Self {
        Constraint::Distance(c)
    }
}

impl From<BendConstraint> for Constraint {
    fn from(c: BendConstraint) -> Self {
        Constraint::Bend(c)
    }
}

impl From<DihedralConstraint> for Constraint {
    fn from(c: DihedralConstraint) -> Self {
        Constraint::Dihedral(c)
    }
}

impl From<AreaConstraint> for Constraint {
    fn from(c: AreaConstraint) -> Self {
        Constraint::Area(c)
    }
}

impl From<VolumeConstraint> for Constraint {
    fn from(c: VolumeConstraint) -> Self {
        Constraint::Volume(c)
    }
}

impl From<FemConstraint> for Constraint {
    fn from(c: FemConstraint) -> Self {
        Constraint::Fem(c)
    }
}

impl From<ContactConstraint> for Constraint {
    fn from(c: ContactConstraint) -> Self {
        Constraint::Contact(c)
    }
}
