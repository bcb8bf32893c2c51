//! Extended position-based dynamics (XPBD) for particles, deformable models and rigid bodies.
//!
//! The crate is organised around a [`PhysicsWorld`] that owns a [`BodyState`]
//! store, the persistent constraints of every model, active grasps and the
//! transient contacts generated each step from external collision records.

pub mod math;
pub mod core;
pub mod bodies;
pub mod constraints;
pub mod collision;
pub mod integration;
pub mod solver;

/// Re-export common types for easier usage
pub use crate::core::{
    BodyState, ConstraintHandle, GraspHandle, KinematicTarget, ModelHandle, ParticleId,
    PhysicsWorld, SimulationConfig, StepReport,
};
pub use crate::bodies::{
    ConstraintFamily, ContactMaterial, FemMaterial, FemModel, ModelDesc, RigidBodyDesc, Topology,
};
pub use crate::constraints::{Constraint, Projection};
pub use crate::collision::{ContactEntity, ContactProvider, ContactRecord};
pub use crate::solver::{SolverObserver, SolverStats};
pub use crate::error::PbdError;
pub use crate::math::{Real, Vector3, Quaternion};

/// Error types for the solver
pub mod error {
    use thiserror::Error;

    use crate::core::ParticleId;

    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum PbdError {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Model '{0}' has no particles")]
        EmptyModel(String),

        #[error("Invalid topology: {0}")]
        InvalidTopology(String),

        #[error("Particle {id:?} is out of range (model has {len} particles)")]
        ParticleOutOfRange { id: ParticleId, len: usize },

        #[error("Unknown handle: {0}")]
        UnknownHandle(String),

        #[error("Step schedule contains a cycle")]
        ScheduleCycle,
    }
}

/// Result type for solver operations
pub type Result<T> = std::result::Result<T, error::PbdError>;

/// Engine version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
