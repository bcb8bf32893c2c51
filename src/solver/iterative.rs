use tracing::trace;

use crate::constraints::{Constraint, Correction, Projection};
use crate::core::BodyState;
use crate::math::Real;
use crate::solver::partition::{compute_color, ConstraintPartition};

/// Where the solver is within one substep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverPhase {
    /// Between substeps
    Idle,
    /// Contacts are being generated
    Collecting,
    /// Position iterations are running
    Solving { iteration: u32 },
    /// Velocity correction is done
    Corrected,
}

/// Counters from one solve
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverStats {
    /// Position iterations run
    pub iterations: u32,

    /// Constraints visited per iteration
    pub constraint_count: usize,

    /// Corrections applied
    pub projections: usize,

    /// Degenerate projections skipped
    pub skipped_projections: usize,

    /// Projections whose error was already zero
    pub satisfied_projections: usize,

    /// Projections of inactive (separated) contacts
    pub inactive_projections: usize,

    /// Colours used by the structural partition, zero when unpartitioned
    pub colors: usize,

    /// Largest |c| seen in the last iteration
    pub max_error: Real,
}

impl SolverStats {
    /// Adds the counters of a later solve; `max_error` follows the later solve
    pub fn accumulate(&mut self, later: &SolverStats) {
        self.iterations += later.iterations;
        self.constraint_count = later.constraint_count;
        self.projections += later.projections;
        self.skipped_projections += later.skipped_projections;
        self.satisfied_projections += later.satisfied_projections;
        self.inactive_projections += later.inactive_projections;
        self.colors = later.colors;
        self.max_error = later.max_error;
    }

    fn record(&mut self, correction: &Correction, error: &mut Real) {
        match correction.outcome {
            Projection::Applied => self.projections += 1,
            Projection::Satisfied => self.satisfied_projections += 1,
            Projection::Inactive => self.inactive_projections += 1,
            Projection::Degenerate => {
                trace!(error = correction.error, "skipped degenerate projection");
                self.skipped_projections += 1;
            }
        }
        *error = error.max(correction.error.abs());
    }
}

/// Hooks into the solve, used by diagnostics and convergence tests
pub trait SolverObserver {
    /// Called after every position iteration
    fn on_iteration(&mut self, _iteration: u32, _state: &BodyState) {}

    /// Called once the iterations of a solve are done
    fn on_solve_complete(&mut self, _stats: &SolverStats) {}
}

/// An observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SolverObserver for NoopObserver {}

/// The constraint sets of one solve, in solve order
pub struct ConstraintGroups<'a> {
    pub structural: &'a mut [Constraint],

    /// Colouring of `structural`, if partitioned projection is enabled
    pub partition: Option<&'a ConstraintPartition>,

    pub grasps: &'a mut [Constraint],
    pub contacts: &'a mut [Constraint],
}

impl ConstraintGroups<'_> {
    fn len(&self) -> usize {
        self.structural.len() + self.grasps.len() + self.contacts.len()
    }

    fn for_each_mut(&mut self, mut f: impl FnMut(&mut Constraint)) {
        self.structural.iter_mut().for_each(&mut f);
        self.grasps.iter_mut().for_each(&mut f);
        self.contacts.iter_mut().for_each(&mut f);
    }
}

/// Gauss-Seidel XPBD solver running a fixed number of iterations
#[derive(Debug, Clone)]
pub struct IterativeSolver {
    iterations: u32,
    phase: SolverPhase,
    stats: SolverStats,
}

impl IterativeSolver {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
            phase: SolverPhase::Idle,
            stats: SolverStats::default(),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn set_iterations(&mut self, iterations: u32) {
        self.iterations = iterations.max(1);
    }

    pub fn phase(&self) -> SolverPhase {
        self.phase
    }

    /// Stats of the last solve
    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    fn transition(&mut self, next: SolverPhase) {
        let legal = matches!(
            (self.phase, next),
            (SolverPhase::Idle, SolverPhase::Collecting)
                | (SolverPhase::Collecting, SolverPhase::Solving { .. })
                | (SolverPhase::Solving { .. }, SolverPhase::Solving { .. })
                | (SolverPhase::Solving { .. }, SolverPhase::Corrected)
                | (SolverPhase::Corrected, SolverPhase::Idle)
        );
        debug_assert!(legal, "illegal solver transition {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Starts a substep: contacts may now be collected
    pub fn begin(&mut self) {
        self.transition(SolverPhase::Collecting);
    }

    /// Runs the position iterations over all groups.
    ///
    /// Every constraint is prepared and its multiplier reset first. Each
    /// iteration then visits structural constraints, grasps and contacts in
    /// that order.
    pub fn solve(
        &mut self,
        state: &mut BodyState,
        mut groups: ConstraintGroups<'_>,
        dt: Real,
        observer: &mut dyn SolverObserver,
    ) -> SolverStats {
        self.transition(SolverPhase::Solving { iteration: 0 });

        let mut stats = SolverStats {
            constraint_count: groups.len(),
            colors: groups.partition.map_or(0, ConstraintPartition::color_count),
            ..SolverStats::default()
        };

        groups.for_each_mut(|c| {
            c.prepare(state);
            c.reset_lambda();
        });

        for iteration in 0..self.iterations {
            self.phase = SolverPhase::Solving { iteration };
            let mut max_error: Real = 0.0;

            match groups.partition {
                Some(partition) => {
                    Self::solve_partitioned(groups.structural, partition, state, dt, &mut stats, &mut max_error)
                }
                None => Self::solve_sequential(groups.structural, state, dt, &mut stats, &mut max_error),
            }
            Self::solve_sequential(groups.grasps, state, dt, &mut stats, &mut max_error);
            Self::solve_sequential(groups.contacts, state, dt, &mut stats, &mut max_error);

            stats.iterations += 1;
            stats.max_error = max_error;
            observer.on_iteration(iteration, state);
        }

        observer.on_solve_complete(&stats);
        self.stats = stats;
        stats
    }

    fn solve_sequential(
        constraints: &mut [Constraint],
        state: &mut BodyState,
        dt: Real,
        stats: &mut SolverStats,
        max_error: &mut Real,
    ) {
        for constraint in constraints {
            let correction = constraint.compute_correction(state, dt);
            constraint.apply_correction(state, &correction);
            stats.record(&correction, max_error);
        }
    }

    fn solve_partitioned(
        constraints: &mut [Constraint],
        partition: &ConstraintPartition,
        state: &mut BodyState,
        dt: Real,
        stats: &mut SolverStats,
        max_error: &mut Real,
    ) {
        let colors = partition.colors();
        let regular = colors.len().saturating_sub(1);

        for color in &colors[..regular] {
            let corrections = compute_color(constraints, color, state, dt);
            for (&i, correction) in color.iter().zip(&corrections) {
                constraints[i].apply_correction(state, correction);
                stats.record(correction, max_error);
            }
        }

        for &i in partition.overflow() {
            let correction = constraints[i].compute_correction(state, dt);
            constraints[i].apply_correction(state, &correction);
            stats.record(&correction, max_error);
        }
    }

    /// Velocity pass over grasps and contacts, after velocities are derived
    pub fn correct_velocities(
        &mut self,
        state: &mut BodyState,
        grasps: &[Constraint],
        contacts: &[Constraint],
        dt: Real,
    ) {
        self.transition(SolverPhase::Corrected);
        for constraint in grasps.iter().chain(contacts) {
            constraint.correct_velocity(state, dt);
        }
    }

    /// Ends the substep
    pub fn finish(&mut self) {
        self.transition(SolverPhase::Idle);
    }

    /// Returns to `Idle` after an aborted step
    pub fn reset(&mut self) {
        self.phase = SolverPhase::Idle;
    }
}
