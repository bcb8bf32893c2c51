pub mod world;
pub mod config;
pub mod storage;
pub mod state;
pub mod events;
pub mod scheduler;

pub use self::world::{PhysicsWorld, StepReport, KinematicTarget};
pub use self::config::{SimulationConfig, ComplianceDefaults};
pub use self::storage::{OrderedStorage, Storage, StorageHandle};
pub use self::state::{BodyState, ModelState, StateSnapshot, ModelSnapshot};
pub use self::events::{EventQueue, ModelEvent, ModelEventType, GraspEvent, GraspEventType};
pub use self::scheduler::{StepGraph, StepNode};

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Identifies a model (a group of particles sharing one geometry) in the body state store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ModelHandle(pub(crate) u32);

impl ModelHandle {
    /// Returns the index of the model in the store
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque reference to one particle or rigid body: its owning model and its local index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ParticleId {
    /// The owning model
    pub model: u32,

    /// The index of the particle inside its model
    pub index: u32,
}

impl ParticleId {
    /// Creates a new particle id
    #[inline]
    pub const fn new(model: u32, index: u32) -> Self {
        Self { model, index }
    }

    /// Creates a particle id from a model handle and a local index
    #[inline]
    pub fn of(model: ModelHandle, index: usize) -> Self {
        Self { model: model.0, index: index as u32 }
    }

    /// Returns the handle of the owning model
    #[inline]
    pub fn model_handle(self) -> ModelHandle {
        ModelHandle(self.model)
    }
}

/// A unique identifier for a persistent or grasp constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintHandle(pub(crate) u32);

/// A unique identifier for an active grasp interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraspHandle(pub(crate) u32);

impl StorageHandle for ConstraintHandle {
    fn from_raw(id: u32) -> Self {
        Self(id)
    }

    fn raw(self) -> u32 {
        self.0
    }
}

impl StorageHandle for GraspHandle {
    fn from_raw(id: u32) -> Self {
        Self(id)
    }

    fn raw(self) -> u32 {
        self.0
    }
}
