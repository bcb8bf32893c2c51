use tracing::{debug, debug_span, info, warn};

use crate::bodies::ModelDesc;
use crate::collision::{ContactGenerator, ContactProvider, ContactRecord};
use crate::constraints::{local_arm, Constraint, ContactConstraint};
use crate::core::events::{GraspEvent, GraspEventType, ModelEvent, ModelEventType};
use crate::core::scheduler::{StepGraph, StepNode};
use crate::core::storage::{OrderedStorage, Storage};
use crate::core::{
    BodyState, ConstraintHandle, EventQueue, GraspHandle, ModelHandle, ParticleId,
    SimulationConfig, StateSnapshot,
};
use crate::error::PbdError;
use crate::integration::{Integrator, SymplecticEulerIntegrator};
use crate::math::{self, Quaternion, Real, Vector3};
use crate::solver::{
    ConstraintGroups, ConstraintPartition, IterativeSolver, NoopObserver, SolverObserver, SolverStats,
};
use crate::Result;

/// A pose request from an external driver (a haptic device, a scripted tool)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KinematicTarget {
    /// Move to this pose by the end of the next step
    Absolute {
        position: Vector3,
        orientation: Option<Quaternion>,
    },
    /// Move by this offset over the next step
    Offset {
        translation: Vector3,
        rotation: Option<Quaternion>,
    },
}

/// What happened during one step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// The step length
    pub dt: Real,

    pub substeps: u32,

    pub contacts_generated: usize,
    pub contacts_dropped: usize,
    pub contacts_unsupported: usize,

    /// Solver counters summed over all substeps
    pub solver: SolverStats,

    /// Models whose geometry changed during the step
    pub dirty_models: Vec<ModelHandle>,
}

/// The constraints held by one grasp
#[derive(Debug, Clone)]
struct Grasp {
    tool: ParticleId,
    constraints: Vec<ConstraintHandle>,
}

/// A kinematic target resolved against the pose at the start of the step
#[derive(Debug, Clone, Copy)]
struct KinematicPath {
    id: ParticleId,
    from: Vector3,
    to: Vector3,
    from_orientation: Quaternion,
    to_orientation: Option<Quaternion>,
}

impl KinematicPath {
    fn pose_at(&self, t: Real) -> (Vector3, Option<Quaternion>) {
        let position = self.from + (self.to - self.from) * t;
        let orientation = self
            .to_orientation
            .map(|to| math::interpolate_orientation(self.from_orientation, to, t));
        (position, orientation)
    }
}

/// What a step needs to undo itself when it fails after the state has moved
struct Rollback {
    state: BodyState,
    records: Vec<ContactRecord>,
    targets: Vec<(ParticleId, KinematicTarget)>,
}

/// The main simulation world: owns the body state, all constraints and the step schedule
pub struct PhysicsWorld {
    /// All particles and rigid bodies
    state: BodyState,

    /// Constraints generated by models or added directly
    structural: OrderedStorage<ConstraintHandle, Constraint>,

    /// Constraints held by active grasps, in grasp order
    grasp_constraints: OrderedStorage<ConstraintHandle, Constraint>,

    grasps: OrderedStorage<GraspHandle, Grasp>,

    /// This step's contacts, discarded at step end
    contacts: Vec<Constraint>,

    /// Records submitted since the last step
    pending_records: Vec<ContactRecord>,

    providers: Vec<Box<dyn ContactProvider>>,

    pending_targets: Vec<(ParticleId, KinematicTarget)>,

    config: SimulationConfig,
    generator: ContactGenerator,
    solver: IterativeSolver,
    integrator: Box<dyn Integrator>,

    /// Colouring of the structural constraints and the storage revision it was built for
    partition: Option<(u64, ConstraintPartition)>,

    graph: StepGraph,

    /// Queue of simulation events
    events: EventQueue,

    /// The total elapsed simulation time
    time: Real,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    /// Creates a new world with default settings
    pub fn new() -> Self {
        Self::build(SimulationConfig::default())
    }

    /// Creates a new world with the given configuration, rejecting invalid options
    pub fn with_config(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimulationConfig) -> Self {
        Self {
            state: BodyState::new(),
            structural: OrderedStorage::default(),
            grasp_constraints: OrderedStorage::default(),
            grasps: OrderedStorage::default(),
            contacts: Vec::new(),
            pending_records: Vec::new(),
            providers: Vec::new(),
            pending_targets: Vec::new(),
            generator: ContactGenerator::new(&config),
            solver: IterativeSolver::new(config.iterations),
            integrator: Box::new(SymplecticEulerIntegrator::new()),
            partition: None,
            graph: StepGraph::for_models(&[]),
            events: EventQueue::new(),
            time: 0.0,
            config,
        }
    }

    /// Returns the current simulation time
    pub fn time(&self) -> Real {
        self.time
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Replaces the configuration. Model materials are kept.
    pub fn set_config(&mut self, config: SimulationConfig) -> Result<()> {
        config.validate()?;
        self.generator.reconfigure(&config);
        self.solver.set_iterations(config.iterations);
        self.partition = None;
        self.config = config;
        Ok(())
    }

    /// Replaces the time integrator
    pub fn set_integrator(&mut self, integrator: Box<dyn Integrator>) {
        self.integrator = integrator;
    }

    /// Adds a model and generates its structural constraints
    pub fn add_model(&mut self, desc: ModelDesc) -> Result<ModelHandle> {
        let model_state = desc.build_state()?;
        let particles = model_state.len();
        let handle = self.state.add_model(model_state);
        // creation is reported by `Added`, not as a geometry change
        if let Some(model) = self.state.model_mut(handle) {
            model.take_changed();
        }

        let constraints = desc.build_constraints(handle, &self.state, &self.config.compliance);
        let constraint_count = constraints.len();
        for constraint in constraints {
            self.structural.add(constraint);
        }

        self.generator.set_material(handle, desc.contact_material());
        self.rebuild_graph();

        self.events.add_model_event(ModelEvent {
            event_type: ModelEventType::Added,
            model: handle,
        });
        info!(model = desc.name(), particles, constraints = constraint_count, "added model");
        Ok(handle)
    }

    fn rebuild_graph(&mut self) {
        let models: Vec<ModelHandle> = (0..self.state.model_count())
            .map(|i| ModelHandle(i as u32))
            .collect();
        self.graph = StepGraph::for_models(&models);
    }

    /// Adds a constraint to the world and returns its handle
    pub fn add_constraint(&mut self, constraint: impl Into<Constraint>) -> Result<ConstraintHandle> {
        let constraint = constraint.into();
        self.state.validate_all(constraint.particles())?;
        Ok(self.structural.add(constraint))
    }

    /// Removes a constraint from the world
    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> Result<Constraint> {
        self.structural
            .remove(handle)
            .ok_or_else(|| PbdError::UnknownHandle(format!("{:?}", handle)))
    }

    /// Gets a constraint by its handle
    pub fn constraint(&self, handle: ConstraintHandle) -> Result<&Constraint> {
        self.structural.get_checked(handle)
    }

    /// Structural constraints in solve order
    pub fn constraints(&self) -> &[Constraint] {
        self.structural.as_slice()
    }

    pub fn constraint_count(&self) -> usize {
        self.structural.len()
    }

    /// Attaches vertices to a tool body at their current offsets
    pub fn begin_vertex_grasp(&mut self, tool: ParticleId, vertices: &[ParticleId]) -> Result<GraspHandle> {
        self.state.validate(tool)?;
        self.state.validate_all(vertices)?;
        if vertices.is_empty() {
            return Err(PbdError::InvalidConfig("a vertex grasp needs at least one vertex".into()));
        }

        let compliance = self.config.compliance.grasp;
        let constraints = vertices
            .iter()
            .map(|&vertex| {
                let arm = local_arm(&self.state, tool, self.state.position(vertex));
                ContactConstraint::vertex_grasp(tool, arm, vertex, compliance)
            })
            .collect();
        Ok(self.begin_grasp(tool, constraints))
    }

    /// Pins a point on a body to the same point on a tool body
    pub fn begin_body_grasp(&mut self, tool: ParticleId, body: ParticleId, world_point: Vector3) -> Result<GraspHandle> {
        self.state.validate(tool)?;
        self.state.validate(body)?;

        let constraint = ContactConstraint::body_to_body_distance(
            tool,
            local_arm(&self.state, tool, world_point),
            body,
            local_arm(&self.state, body, world_point),
            0.0,
            self.config.compliance.grasp,
        );
        Ok(self.begin_grasp(tool, vec![constraint]))
    }

    fn begin_grasp(&mut self, tool: ParticleId, constraints: Vec<ContactConstraint>) -> GraspHandle {
        let handles: Vec<ConstraintHandle> = constraints
            .into_iter()
            .map(|c| self.grasp_constraints.add(Constraint::Contact(c)))
            .collect();
        let constraint_count = handles.len();
        let handle = self.grasps.add(Grasp { tool, constraints: handles });

        self.events.add_grasp_event(GraspEvent {
            event_type: GraspEventType::Began,
            grasp: handle,
            tool,
            constraint_count,
        });
        info!(?handle, ?tool, constraints = constraint_count, "grasp began");
        handle
    }

    /// Releases a grasp. Other grasps are unaffected.
    pub fn end_grasp(&mut self, handle: GraspHandle) -> Result<()> {
        let grasp = self
            .grasps
            .remove(handle)
            .ok_or_else(|| PbdError::UnknownHandle(format!("{:?}", handle)))?;
        for constraint in &grasp.constraints {
            self.grasp_constraints.remove(*constraint);
        }

        self.events.add_grasp_event(GraspEvent {
            event_type: GraspEventType::Ended,
            grasp: handle,
            tool: grasp.tool,
            constraint_count: grasp.constraints.len(),
        });
        info!(?handle, tool = ?grasp.tool, "grasp ended");
        Ok(())
    }

    pub fn grasp_count(&self) -> usize {
        self.grasps.len()
    }

    /// Constraints held by all active grasps
    pub fn grasp_constraints(&self) -> &[Constraint] {
        self.grasp_constraints.as_slice()
    }

    /// Queues collision records for the next step
    pub fn submit_contacts(&mut self, records: impl IntoIterator<Item = ContactRecord>) {
        self.pending_records.extend(records);
    }

    /// Registers a source of contact records sampled every step
    pub fn add_contact_provider(&mut self, provider: Box<dyn ContactProvider>) {
        self.providers.push(provider);
    }

    /// Queues a pose for a kinematically driven particle, applied at the start of the next step
    pub fn set_kinematic_target(&mut self, id: ParticleId, target: KinematicTarget) -> Result<()> {
        self.state.validate(id)?;
        if !self.state.is_fixed(id) {
            warn!(?id, "kinematic target on a particle that is not fixed");
        }
        self.pending_targets.retain(|(other, _)| *other != id);
        self.pending_targets.push((id, target));
        Ok(())
    }

    /// Accumulates an external force for the next step
    pub fn apply_force(&mut self, id: ParticleId, force: Vector3) -> Result<()> {
        self.state.validate(id)?;
        self.state.apply_force(id, force);
        Ok(())
    }

    /// Accumulates an external torque for the next step
    pub fn apply_torque(&mut self, id: ParticleId, torque: Vector3) -> Result<()> {
        self.state.validate(id)?;
        self.state.apply_torque(id, torque);
        Ok(())
    }

    pub fn state(&self) -> &BodyState {
        &self.state
    }

    /// Mutable state access between steps, for initial conditions
    pub fn state_mut(&mut self) -> &mut BodyState {
        &mut self.state
    }

    /// A copy of every model's pose
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    /// Returns the handles of dirty models and clears their flags
    pub fn take_dirty_models(&mut self) -> Vec<ModelHandle> {
        self.state.take_dirty_models()
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// The ordered nodes of one substep
    pub fn step_schedule(&self) -> Result<Vec<StepNode>> {
        self.graph.topological_order()
    }

    /// Advances the simulation by `config.time_step`
    pub fn step_fixed(&mut self) -> Result<StepReport> {
        self.step(self.config.time_step)
    }

    /// Advances the simulation by `dt`
    pub fn step(&mut self, dt: Real) -> Result<StepReport> {
        self.step_with_observer(dt, &mut NoopObserver)
    }

    /// Advances the simulation by `dt`, reporting every solver iteration to `observer`
    pub fn step_with_observer(&mut self, dt: Real, observer: &mut dyn SolverObserver) -> Result<StepReport> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(PbdError::InvalidConfig(format!("step length must be positive, got {}", dt)));
        }
        let span = debug_span!("step", dt, time = self.time);
        let _enter = span.enter();

        let order = self.graph.topological_order()?;

        for record in &self.pending_records {
            self.state.validate_all(record.entity_a.particles())?;
            self.state.validate_all(record.entity_b.particles())?;
        }

        // Provider records are checked after prediction, so keep the step-start state
        let rollback = (!self.providers.is_empty()).then(|| Rollback {
            state: self.state.clone(),
            records: self.pending_records.clone(),
            targets: self.pending_targets.clone(),
        });

        let records = std::mem::take(&mut self.pending_records);
        let paths = self.resolve_targets();

        if self.config.partitioning {
            self.refresh_partition();
        }

        let result = self.run_substeps(&order, records, &paths, dt, observer);
        self.contacts.clear();

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                self.solver.reset();
                if let Some(rollback) = rollback {
                    self.state = rollback.state;
                    self.pending_records = rollback.records;
                    self.pending_targets = rollback.targets;
                }
                warn!(%err, "step rejected, state restored");
                return Err(err);
            }
        };
        self.state.models_mut().iter_mut().for_each(|m| m.clear_forces());

        self.events.discard_model_events(ModelEventType::GeometryChanged);
        for &model in &report.dirty_models {
            self.events.add_model_event(ModelEvent {
                event_type: ModelEventType::GeometryChanged,
                model,
            });
        }
        self.time += dt;

        debug!(
            contacts = report.contacts_generated,
            dropped = report.contacts_dropped,
            unsupported = report.contacts_unsupported,
            projections = report.solver.projections,
            skipped = report.solver.skipped_projections,
            max_error = report.solver.max_error,
            "step complete"
        );
        Ok(report)
    }

    fn resolve_targets(&mut self) -> Vec<KinematicPath> {
        std::mem::take(&mut self.pending_targets)
            .into_iter()
            .map(|(id, target)| {
                let from = self.state.position(id);
                let from_orientation = self.state.orientation(id);
                let (to, to_orientation) = match target {
                    KinematicTarget::Absolute { position, orientation } => (position, orientation),
                    KinematicTarget::Offset { translation, rotation } => {
                        (from + translation, rotation.map(|r| r * from_orientation))
                    }
                };
                KinematicPath { id, from, to, from_orientation, to_orientation }
            })
            .collect()
    }

    fn refresh_partition(&mut self) {
        let revision = self.structural.revision();
        let stale = self.partition.as_ref().map_or(true, |(built, _)| *built != revision);
        if stale {
            let partition = ConstraintPartition::build(
                self.structural.as_slice(),
                &self.state,
                self.config.max_colors,
            );
            debug!(colors = partition.color_count(), overflow = partition.overflow().len(), "rebuilt partition");
            self.partition = Some((revision, partition));
        }
    }

    fn run_substeps(
        &mut self,
        order: &[StepNode],
        mut records: Vec<ContactRecord>,
        paths: &[KinematicPath],
        dt: Real,
        observer: &mut dyn SolverObserver,
    ) -> Result<StepReport> {
        let substeps = self.config.substeps;
        let sub_dt = dt / substeps as Real;
        let mut report = StepReport {
            dt,
            substeps,
            ..StepReport::default()
        };
        let mut changed = vec![false; self.state.model_count()];

        for substep in 0..substeps {
            for node in order {
                match *node {
                    StepNode::SavePrevious(m) => {
                        if let Some(model) = self.state.model_mut(m) {
                            model.save_previous();
                        }
                    }
                    StepNode::ApplyKinematics => {
                        let t = (substep + 1) as Real / substeps as Real;
                        for path in paths {
                            let (position, orientation) = path.pose_at(t);
                            self.state.set_kinematic_pose(path.id, position, orientation);
                        }
                    }
                    StepNode::IntegrateVelocities(m) => {
                        if let Some(model) = self.state.model_mut(m) {
                            self.integrator.integrate_velocities(model, &self.config, sub_dt);
                        }
                    }
                    StepNode::PredictPositions(m) => {
                        if let Some(model) = self.state.model_mut(m) {
                            self.integrator.predict_positions(model, sub_dt);
                        }
                    }
                    StepNode::GenerateContacts => {
                        self.solver.begin();
                        if substep == 0 {
                            for provider in &mut self.providers {
                                provider.contacts(&self.state, &mut records);
                            }
                            let generated = self.generator.generate(&records, &self.state, &mut self.contacts)?;
                            report.contacts_generated += generated.generated;
                            report.contacts_dropped += generated.dropped;
                            report.contacts_unsupported += generated.unsupported;
                        }
                    }
                    StepNode::Solve => {
                        let groups = ConstraintGroups {
                            structural: self.structural.as_mut_slice(),
                            partition: if self.config.partitioning {
                                self.partition.as_ref().map(|(_, p)| p)
                            } else {
                                None
                            },
                            grasps: self.grasp_constraints.as_mut_slice(),
                            contacts: &mut self.contacts,
                        };
                        let stats = self.solver.solve(&mut self.state, groups, sub_dt, observer);
                        report.solver.accumulate(&stats);
                    }
                    StepNode::UpdateVelocities(m) => {
                        if let Some(model) = self.state.model_mut(m) {
                            self.integrator.update_velocities(model, sub_dt);
                        }
                    }
                    StepNode::CorrectVelocities => {
                        self.solver.correct_velocities(
                            &mut self.state,
                            self.grasp_constraints.as_slice(),
                            &self.contacts,
                            sub_dt,
                        );
                        self.solver.finish();
                    }
                    StepNode::SyncGeometry(m) => {
                        if let Some(model) = self.state.model_mut(m) {
                            changed[m.index()] |= model.take_changed();
                        }
                    }
                }
            }
        }

        report.dirty_models = changed
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| c.then_some(ModelHandle(i as u32)))
            .collect();
        Ok(report)
    }
}
