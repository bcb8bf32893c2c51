use crate::bodies::ParticleFlags;
use crate::core::{ModelState, SimulationConfig};
use crate::integration::Integrator;
use crate::math::{self, Real, Vector3};

/// Symplectic Euler integrator (semi-implicit Euler)
///
/// Velocities are updated first and positions advance with the new velocity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymplecticEulerIntegrator;

impl SymplecticEulerIntegrator {
    /// Creates a new Symplectic Euler integrator
    pub fn new() -> Self {
        Self
    }
}

impl Integrator for SymplecticEulerIntegrator {
    fn integrate_velocities(&self, model: &mut ModelState, config: &SimulationConfig, dt: Real) {
        let linear_keep = 1.0 - config.linear_damping;
        let angular_keep = 1.0 - config.angular_damping;

        for i in 0..model.len() {
            let flags = model.flags[i];
            // Fixed particles only move through kinematic targets
            if flags.contains(ParticleFlags::FIXED) {
                continue;
            }

            let mut acceleration = model.forces[i] * model.inv_masses[i];
            if flags.contains(ParticleFlags::AFFECTED_BY_GRAVITY) {
                acceleration += config.gravity;
            }
            model.velocities[i] = (model.velocities[i] + acceleration * dt) * linear_keep;

            if flags.contains(ParticleFlags::RIGID) {
                let orientation = model.orientations[i];
                let inv_inertia = math::world_inverse_inertia(orientation, &model.inv_inertias[i]);
                let omega = model.angular_velocities[i];

                // Gyroscopic term: tau - w x (I w)
                let gyroscopic = match inv_inertia.try_inverse() {
                    Some(inertia) => omega.cross(&(inertia * omega)),
                    None => Vector3::zeros(),
                };
                let alpha = inv_inertia * (model.torques[i] - gyroscopic);
                model.angular_velocities[i] = (omega + alpha * dt) * angular_keep;
            }
        }
    }

    fn predict_positions(&self, model: &mut ModelState, dt: Real) {
        for i in 0..model.len() {
            let flags = model.flags[i];
            if flags.contains(ParticleFlags::FIXED) {
                continue;
            }
            model.positions[i] += model.velocities[i] * dt;
            if flags.contains(ParticleFlags::RIGID) {
                model.orientations[i] =
                    math::integrate_orientation(model.orientations[i], model.angular_velocities[i], dt);
            }
            model.mark_changed();
        }
    }

    fn update_velocities(&self, model: &mut ModelState, dt: Real) {
        for i in 0..model.len() {
            model.velocities[i] = (model.positions[i] - model.previous_positions[i]) / dt;
            if model.flags[i].contains(ParticleFlags::RIGID) {
                model.angular_velocities[i] = math::angular_velocity_from_delta(
                    model.previous_orientations[i],
                    model.orientations[i],
                    dt,
                );
            }
        }
    }

    fn name(&self) -> &str {
        "SymplecticEuler"
    }
}
