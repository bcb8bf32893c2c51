use crate::core::{ModelState, SimulationConfig};
use crate::math::Real;

/// Time integration of one model around the constraint solve.
///
/// The solver only moves positions. An integrator predicts positions from
/// velocities before the solve and derives velocities from the pose change
/// after it.
pub trait Integrator: Send + Sync {
    /// Adds gravity and accumulated external forces to velocities, then applies damping
    fn integrate_velocities(&self, model: &mut ModelState, config: &SimulationConfig, dt: Real);

    /// Advances positions and orientations by the current velocities
    fn predict_positions(&self, model: &mut ModelState, dt: Real);

    /// Sets velocities from the change since the previous pose
    fn update_velocities(&self, model: &mut ModelState, dt: Real);

    /// Returns the name of the integrator
    fn name(&self) -> &str;
}
