//! The body state store.
//!
//! Every particle and rigid body lives in a [`ModelState`], a struct of
//! arrays indexed by the local particle index. The [`BodyState`] owns all
//! models and resolves a [`ParticleId`] to its slot in O(1).

use crate::bodies::ParticleFlags;
use crate::core::{ModelHandle, ParticleId};
use crate::error::PbdError;
use crate::math::{self, Matrix3, Quaternion, Real, Vector3};
use crate::Result;

/// Per-model particle and rigid body state
#[derive(Debug, Clone)]
pub struct ModelState {
    pub(crate) name: String,
    pub(crate) positions: Vec<Vector3>,
    pub(crate) previous_positions: Vec<Vector3>,
    pub(crate) velocities: Vec<Vector3>,
    pub(crate) inv_masses: Vec<Real>,
    pub(crate) forces: Vec<Vector3>,
    pub(crate) orientations: Vec<Quaternion>,
    pub(crate) previous_orientations: Vec<Quaternion>,
    pub(crate) angular_velocities: Vec<Vector3>,
    pub(crate) inv_inertias: Vec<Matrix3>,
    pub(crate) torques: Vec<Vector3>,
    pub(crate) flags: Vec<ParticleFlags>,
    pub(crate) dirty: bool,
    pub(crate) changed: bool,
}

impl ModelState {
    /// Creates an empty model state
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            positions: Vec::new(),
            previous_positions: Vec::new(),
            velocities: Vec::new(),
            inv_masses: Vec::new(),
            forces: Vec::new(),
            orientations: Vec::new(),
            previous_orientations: Vec::new(),
            angular_velocities: Vec::new(),
            inv_inertias: Vec::new(),
            torques: Vec::new(),
            flags: Vec::new(),
            dirty: true,
            changed: true,
        }
    }

    /// Adds a point mass and returns its local index
    pub fn push_particle(&mut self, position: Vector3, velocity: Vector3, inv_mass: Real) -> usize {
        let mut flags = ParticleFlags::AFFECTED_BY_GRAVITY;
        if inv_mass <= 0.0 {
            flags.insert(ParticleFlags::FIXED);
        }
        self.push_slot(
            position,
            velocity,
            inv_mass.max(0.0),
            Quaternion::identity(),
            Vector3::zeros(),
            Matrix3::zeros(),
            flags,
        )
    }

    /// Adds a 6-DOF rigid body and returns its local index
    pub fn push_rigid_body(
        &mut self,
        position: Vector3,
        orientation: Quaternion,
        velocity: Vector3,
        angular_velocity: Vector3,
        inv_mass: Real,
        inv_inertia: Matrix3,
    ) -> usize {
        let mut flags = ParticleFlags::RIGID | ParticleFlags::AFFECTED_BY_GRAVITY;
        let (inv_mass, inv_inertia) = if inv_mass <= 0.0 {
            flags.insert(ParticleFlags::FIXED);
            (0.0, Matrix3::zeros())
        } else {
            (inv_mass, inv_inertia)
        };
        self.push_slot(position, velocity, inv_mass, orientation, angular_velocity, inv_inertia, flags)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_slot(
        &mut self,
        position: Vector3,
        velocity: Vector3,
        inv_mass: Real,
        orientation: Quaternion,
        angular_velocity: Vector3,
        inv_inertia: Matrix3,
        flags: ParticleFlags,
    ) -> usize {
        let index = self.positions.len();
        self.positions.push(position);
        self.previous_positions.push(position);
        self.velocities.push(velocity);
        self.inv_masses.push(inv_mass);
        self.forces.push(Vector3::zeros());
        self.orientations.push(orientation);
        self.previous_orientations.push(orientation);
        self.angular_velocities.push(angular_velocity);
        self.inv_inertias.push(inv_inertia);
        self.torques.push(Vector3::zeros());
        self.flags.push(flags);
        self.mark_changed();
        index
    }

    /// Marks a particle as fixed: infinite mass and inertia, immune to constraint corrections
    pub fn fix_particle(&mut self, index: usize) {
        self.inv_masses[index] = 0.0;
        self.inv_inertias[index] = Matrix3::zeros();
        self.velocities[index] = Vector3::zeros();
        self.angular_velocities[index] = Vector3::zeros();
        self.flags[index].insert(ParticleFlags::FIXED);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Vector3] {
        &self.positions
    }

    /// Mutable positions; marks the model dirty
    pub fn positions_mut(&mut self) -> &mut [Vector3] {
        self.mark_changed();
        &mut self.positions
    }

    pub fn previous_positions(&self) -> &[Vector3] {
        &self.previous_positions
    }

    pub fn velocities(&self) -> &[Vector3] {
        &self.velocities
    }

    pub fn velocities_mut(&mut self) -> &mut [Vector3] {
        &mut self.velocities
    }

    pub fn inv_masses(&self) -> &[Real] {
        &self.inv_masses
    }

    pub fn forces(&self) -> &[Vector3] {
        &self.forces
    }

    pub fn orientations(&self) -> &[Quaternion] {
        &self.orientations
    }

    /// Mutable orientations; marks the model dirty
    pub fn orientations_mut(&mut self) -> &mut [Quaternion] {
        self.mark_changed();
        &mut self.orientations
    }

    pub fn previous_orientations(&self) -> &[Quaternion] {
        &self.previous_orientations
    }

    pub fn angular_velocities(&self) -> &[Vector3] {
        &self.angular_velocities
    }

    pub fn angular_velocities_mut(&mut self) -> &mut [Vector3] {
        &mut self.angular_velocities
    }

    /// Body-frame inverse inertia tensors (zero for point particles)
    pub fn inv_inertias(&self) -> &[Matrix3] {
        &self.inv_inertias
    }

    pub fn torques(&self) -> &[Vector3] {
        &self.torques
    }

    pub fn flags(&self) -> &[ParticleFlags] {
        &self.flags
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Copies the current pose of every particle into the previous-pose buffers
    pub fn save_previous(&mut self) {
        self.previous_positions.copy_from_slice(&self.positions);
        self.previous_orientations.copy_from_slice(&self.orientations);
    }

    /// Clears accumulated external forces and torques
    pub fn clear_forces(&mut self) {
        self.forces.iter_mut().for_each(|f| *f = Vector3::zeros());
        self.torques.iter_mut().for_each(|t| *t = Vector3::zeros());
    }

    /// Marks the geometry as changed, for both the dirty flag and the per-step change report
    #[inline]
    pub(crate) fn mark_changed(&mut self) {
        self.dirty = true;
        self.changed = true;
    }

    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// Whether the geometry changed since the last call
    pub(crate) fn take_changed(&mut self) -> bool {
        std::mem::replace(&mut self.changed, false)
    }
}

/// A step-complete copy of one model's pose data
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub name: String,
    pub positions: Vec<Vector3>,
    pub orientations: Vec<Quaternion>,
    pub dirty: bool,
}

/// A step-complete copy of the whole store, handed to visual and collision sync
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    pub models: Vec<ModelSnapshot>,
}

impl StateSnapshot {
    /// Returns the position of a particle in the snapshot
    pub fn position(&self, id: ParticleId) -> Option<Vector3> {
        self.models
            .get(id.model as usize)
            .and_then(|m| m.positions.get(id.index as usize))
            .copied()
    }
}

/// The body state store: owns every model's particles and rigid bodies
#[derive(Debug, Clone, Default)]
pub struct BodyState {
    models: Vec<ModelState>,
}

impl BodyState {
    /// Creates an empty store
    pub fn new() -> Self {
        Self { models: Vec::new() }
    }

    /// Adds a model and returns its handle
    pub fn add_model(&mut self, model: ModelState) -> ModelHandle {
        let handle = ModelHandle(self.models.len() as u32);
        self.models.push(model);
        handle
    }

    pub fn model(&self, handle: ModelHandle) -> Option<&ModelState> {
        self.models.get(handle.index())
    }

    pub fn model_mut(&mut self, handle: ModelHandle) -> Option<&mut ModelState> {
        self.models.get_mut(handle.index())
    }

    pub fn models(&self) -> &[ModelState] {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut [ModelState] {
        &mut self.models
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Total number of particles across all models
    pub fn particle_count(&self) -> usize {
        self.models.iter().map(ModelState::len).sum()
    }

    /// Checks that a particle id refers to an existing slot
    pub fn validate(&self, id: ParticleId) -> Result<()> {
        match self.models.get(id.model as usize) {
            Some(model) if (id.index as usize) < model.len() => Ok(()),
            Some(model) => Err(PbdError::ParticleOutOfRange { id, len: model.len() }),
            None => Err(PbdError::ParticleOutOfRange { id, len: 0 }),
        }
    }

    /// Checks every id in a slice
    pub fn validate_all(&self, ids: &[ParticleId]) -> Result<()> {
        ids.iter().try_for_each(|&id| self.validate(id))
    }

    #[inline]
    fn slot(&self, id: ParticleId) -> (&ModelState, usize) {
        (&self.models[id.model as usize], id.index as usize)
    }

    #[inline]
    fn slot_mut(&mut self, id: ParticleId) -> (&mut ModelState, usize) {
        (&mut self.models[id.model as usize], id.index as usize)
    }

    #[inline]
    pub fn position(&self, id: ParticleId) -> Vector3 {
        let (m, i) = self.slot(id);
        m.positions[i]
    }

    #[inline]
    pub fn previous_position(&self, id: ParticleId) -> Vector3 {
        let (m, i) = self.slot(id);
        m.previous_positions[i]
    }

    #[inline]
    pub fn velocity(&self, id: ParticleId) -> Vector3 {
        let (m, i) = self.slot(id);
        m.velocities[i]
    }

    #[inline]
    pub fn inv_mass(&self, id: ParticleId) -> Real {
        let (m, i) = self.slot(id);
        m.inv_masses[i]
    }

    #[inline]
    pub fn flags(&self, id: ParticleId) -> ParticleFlags {
        let (m, i) = self.slot(id);
        m.flags[i]
    }

    #[inline]
    pub fn is_fixed(&self, id: ParticleId) -> bool {
        self.flags(id).contains(ParticleFlags::FIXED)
    }

    #[inline]
    pub fn is_rigid(&self, id: ParticleId) -> bool {
        self.flags(id).contains(ParticleFlags::RIGID)
    }

    /// Whether constraint corrections can move this particle
    #[inline]
    pub fn is_movable(&self, id: ParticleId) -> bool {
        !self.is_fixed(id) && self.inv_mass(id) > 0.0
    }

    #[inline]
    pub fn orientation(&self, id: ParticleId) -> Quaternion {
        let (m, i) = self.slot(id);
        m.orientations[i]
    }

    #[inline]
    pub fn angular_velocity(&self, id: ParticleId) -> Vector3 {
        let (m, i) = self.slot(id);
        m.angular_velocities[i]
    }

    /// World-space inverse inertia; zero for point particles and fixed bodies
    pub fn world_inverse_inertia(&self, id: ParticleId) -> Matrix3 {
        let (m, i) = self.slot(id);
        if !m.flags[i].contains(ParticleFlags::RIGID) || m.flags[i].contains(ParticleFlags::FIXED) {
            return Matrix3::zeros();
        }
        math::world_inverse_inertia(m.orientations[i], &m.inv_inertias[i])
    }

    /// Moves a particle by a constraint correction. Fixed particles ignore the write.
    pub fn apply_position_correction(&mut self, id: ParticleId, delta: Vector3) {
        let (m, i) = self.slot_mut(id);
        if m.flags[i].contains(ParticleFlags::FIXED) {
            return;
        }
        m.positions[i] += delta;
        m.mark_changed();
    }

    /// Rotates a rigid body by a constraint correction given as a rotation vector.
    /// Fixed bodies and point particles ignore the write.
    pub fn apply_rotation_correction(&mut self, id: ParticleId, delta: Vector3) {
        let (m, i) = self.slot_mut(id);
        if m.flags[i].contains(ParticleFlags::FIXED) || !m.flags[i].contains(ParticleFlags::RIGID) {
            return;
        }
        m.orientations[i] = math::apply_rotation_delta(m.orientations[i], delta);
        m.mark_changed();
    }

    /// Changes a particle's velocity from a velocity-level correction. Fixed particles ignore it.
    pub fn apply_velocity_change(&mut self, id: ParticleId, delta: Vector3) {
        let (m, i) = self.slot_mut(id);
        if m.flags[i].contains(ParticleFlags::FIXED) {
            return;
        }
        m.velocities[i] += delta;
    }

    /// Changes a rigid body's angular velocity. Fixed bodies and point particles ignore it.
    pub fn apply_angular_velocity_change(&mut self, id: ParticleId, delta: Vector3) {
        let (m, i) = self.slot_mut(id);
        if m.flags[i].contains(ParticleFlags::FIXED) || !m.flags[i].contains(ParticleFlags::RIGID) {
            return;
        }
        m.angular_velocities[i] += delta;
    }

    /// Moves a particle from an external kinematic driver.
    ///
    /// This is the only mutation path for fixed particles. The world applies
    /// queued targets once at the start of a step, never during the solve.
    pub fn set_kinematic_pose(&mut self, id: ParticleId, position: Vector3, orientation: Option<Quaternion>) {
        let (m, i) = self.slot_mut(id);
        m.positions[i] = position;
        if let Some(orientation) = orientation {
            if m.flags[i].contains(ParticleFlags::RIGID) {
                m.orientations[i] = orientation;
            }
        }
        m.flags[i].insert(ParticleFlags::KINEMATIC);
        m.mark_changed();
    }

    /// Teleports a particle; used to set up initial conditions
    pub fn set_position(&mut self, id: ParticleId, position: Vector3) {
        let (m, i) = self.slot_mut(id);
        m.positions[i] = position;
        m.mark_changed();
    }

    pub fn set_velocity(&mut self, id: ParticleId, velocity: Vector3) {
        let (m, i) = self.slot_mut(id);
        m.velocities[i] = velocity;
    }

    pub fn set_angular_velocity(&mut self, id: ParticleId, angular_velocity: Vector3) {
        let (m, i) = self.slot_mut(id);
        if m.flags[i].contains(ParticleFlags::RIGID) {
            m.angular_velocities[i] = angular_velocity;
        }
    }

    /// Accumulates an external force, consumed by the next velocity integration
    pub fn apply_force(&mut self, id: ParticleId, force: Vector3) {
        let (m, i) = self.slot_mut(id);
        m.forces[i] += force;
    }

    /// Accumulates an external torque on a rigid body
    pub fn apply_torque(&mut self, id: ParticleId, torque: Vector3) {
        let (m, i) = self.slot_mut(id);
        m.torques[i] += torque;
    }

    /// Copies the pose data of every model
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            models: self
                .models
                .iter()
                .map(|m| ModelSnapshot {
                    name: m.name.clone(),
                    positions: m.positions.clone(),
                    orientations: m.orientations.clone(),
                    dirty: m.dirty,
                })
                .collect(),
        }
    }

    /// Returns the handles of dirty models and clears their flags
    pub fn take_dirty_models(&mut self) -> Vec<ModelHandle> {
        self.models
            .iter_mut()
            .enumerate()
            .filter_map(|(i, m)| m.take_dirty().then_some(ModelHandle(i as u32)))
            .collect()
    }
}
