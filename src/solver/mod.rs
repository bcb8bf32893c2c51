mod iterative;
mod partition;

pub use self::iterative::{
    ConstraintGroups, IterativeSolver, NoopObserver, SolverObserver, SolverPhase, SolverStats,
};
pub use self::partition::ConstraintPartition;
