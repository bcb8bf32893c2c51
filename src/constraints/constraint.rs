use crate::core::{BodyState, ParticleId};
use crate::math::{Real, Vector3, EPSILON};

/// The largest number of particles a single constraint references
pub const MAX_PARTICIPANTS: usize = 4;

/// Scalar error and its derivatives at one body state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintGradient {
    /// The constraint error `c`
    pub value: Real,

    /// Number of participants the gradient covers
    pub count: usize,

    /// `dc/dx` per participant
    pub linear: [Vector3; MAX_PARTICIPANTS],

    /// `dc/dtheta` per participant, zero for point particles
    pub angular: [Vector3; MAX_PARTICIPANTS],
}

impl ConstraintGradient {
    /// Builds a gradient with linear terms only
    pub fn linear(value: Real, gradients: &[Vector3]) -> Self {
        let mut linear = [Vector3::zeros(); MAX_PARTICIPANTS];
        linear[..gradients.len()].copy_from_slice(gradients);
        Self {
            value,
            count: gradients.len(),
            linear,
            angular: [Vector3::zeros(); MAX_PARTICIPANTS],
        }
    }

    /// A measured error whose direction is undefined (coincident or collapsed particles)
    pub fn undefined(value: Real, count: usize) -> Self {
        Self {
            value,
            count,
            linear: [Vector3::zeros(); MAX_PARTICIPANTS],
            angular: [Vector3::zeros(); MAX_PARTICIPANTS],
        }
    }

    pub fn with_angular(mut self, participant: usize, angular: Vector3) -> Self {
        self.angular[participant] = angular;
        self
    }
}

/// Outcome of one projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// A correction was computed and applied
    Applied,
    /// The error is zero and there is nothing to move
    Satisfied,
    /// The constraint does not act at this state (separated contact)
    Inactive,
    /// The denominator vanished while the error did not; the update was skipped
    Degenerate,
}

/// A correction computed from an immutable body state, applied later
#[derive(Debug, Clone, Copy)]
pub struct Correction {
    pub outcome: Projection,

    /// The constraint error the correction was computed from
    pub error: Real,

    pub delta_lambda: Real,
    pub count: usize,

    /// Position change per participant
    pub linear: [Vector3; MAX_PARTICIPANTS],

    /// Rotation vector per participant
    pub angular: [Vector3; MAX_PARTICIPANTS],
}

impl Correction {
    /// A correction that moves nothing
    pub fn skipped(outcome: Projection, error: Real) -> Self {
        Self {
            outcome,
            error,
            delta_lambda: 0.0,
            count: 0,
            linear: [Vector3::zeros(); MAX_PARTICIPANTS],
            angular: [Vector3::zeros(); MAX_PARTICIPANTS],
        }
    }
}

/// Computes one XPBD update.
///
/// `alpha = compliance / dt^2`,
/// `delta_lambda = (-c - alpha * lambda) / (sum w |grad|^2 + sum a^T I^-1 a + alpha)`.
pub fn xpbd_correction(
    particles: &[ParticleId],
    gradient: &ConstraintGradient,
    compliance: Real,
    lambda: Real,
    state: &BodyState,
    dt: Real,
) -> Correction {
    let c = gradient.value;
    let alpha = compliance / (dt * dt);

    let mut weight = 0.0;
    for (i, &id) in particles.iter().enumerate().take(gradient.count) {
        weight += state.inv_mass(id) * gradient.linear[i].norm_squared();
        if state.is_rigid(id) {
            let a = gradient.angular[i];
            weight += a.dot(&(state.world_inverse_inertia(id) * a));
        }
    }

    // With every participant immovable, compliance alone must not accumulate lambda
    if weight < EPSILON {
        let outcome = if c.abs() < EPSILON {
            Projection::Satisfied
        } else {
            Projection::Degenerate
        };
        return Correction::skipped(outcome, c);
    }

    let delta_lambda = (-c - alpha * lambda) / (weight + alpha);

    let mut correction = Correction {
        outcome: Projection::Applied,
        error: c,
        delta_lambda,
        count: gradient.count,
        linear: [Vector3::zeros(); MAX_PARTICIPANTS],
        angular: [Vector3::zeros(); MAX_PARTICIPANTS],
    };
    for (i, &id) in particles.iter().enumerate().take(gradient.count) {
        if !state.is_movable(id) {
            continue;
        }
        correction.linear[i] = gradient.linear[i] * (state.inv_mass(id) * delta_lambda);
        if state.is_rigid(id) {
            correction.angular[i] = state.world_inverse_inertia(id) * gradient.angular[i] * delta_lambda;
        }
    }
    correction
}

/// Writes a correction into the body state. Fixed participants are skipped by the store.
pub fn apply_to_state(particles: &[ParticleId], correction: &Correction, state: &mut BodyState) {
    for (i, &id) in particles.iter().enumerate().take(correction.count) {
        let dx = correction.linear[i];
        if dx != Vector3::zeros() {
            state.apply_position_correction(id, dx);
        }
        let dtheta = correction.angular[i];
        if dtheta != Vector3::zeros() {
            state.apply_rotation_correction(id, dtheta);
        }
    }
}
