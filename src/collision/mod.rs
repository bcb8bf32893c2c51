//! The boundary to collision detection.
//!
//! Detection itself lives outside the crate. It hands over [`ContactRecord`]s,
//! either submitted directly to the world or sampled from registered
//! [`ContactProvider`]s, and the [`ContactGenerator`] turns them into
//! transient contact constraints.

mod contact_generator;

pub use self::contact_generator::{ContactGenerator, GenerationReport};

use crate::core::{BodyState, ParticleId};
use crate::math::{Real, Vector3};

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// The geometric feature a collision record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ContactEntity {
    /// A rigid body, or a particle treated as one
    Body(ParticleId),
    /// A single mesh vertex
    Vertex(ParticleId),
    /// A mesh edge
    Edge([ParticleId; 2]),
    /// A mesh triangle
    Triangle([ParticleId; 3]),
}

impl ContactEntity {
    /// The particles the feature spans
    pub fn particles(&self) -> &[ParticleId] {
        match self {
            ContactEntity::Body(id) | ContactEntity::Vertex(id) => std::slice::from_ref(id),
            ContactEntity::Edge(ids) => ids,
            ContactEntity::Triangle(ids) => ids,
        }
    }

    /// Orders features so the body side comes first
    pub(crate) fn rank(&self) -> u8 {
        match self {
            ContactEntity::Body(_) => 0,
            ContactEntity::Vertex(_) => 1,
            ContactEntity::Edge(_) => 2,
            ContactEntity::Triangle(_) => 3,
        }
    }
}

/// One contact reported by collision detection
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ContactRecord {
    pub entity_a: ContactEntity,
    pub entity_b: ContactEntity,

    /// Contact point on A in world space
    pub point_a: Vector3,

    /// Contact point on B in world space
    pub point_b: Vector3,

    /// Unit normal pointing from A toward B
    pub normal: Vector3,

    /// Penetration depth, positive when overlapping
    pub depth: Real,
}

impl ContactRecord {
    pub fn new(
        entity_a: ContactEntity,
        entity_b: ContactEntity,
        point_a: Vector3,
        point_b: Vector3,
        normal: Vector3,
        depth: Real,
    ) -> Self {
        Self { entity_a, entity_b, point_a, point_b, normal, depth }
    }

    /// The same contact seen from the other side
    pub fn flipped(&self) -> Self {
        Self {
            entity_a: self.entity_b,
            entity_b: self.entity_a,
            point_a: self.point_b,
            point_b: self.point_a,
            normal: -self.normal,
            depth: self.depth,
        }
    }
}

/// A source of contact records, sampled once per step after positions are predicted
pub trait ContactProvider: Send + Sync {
    /// Appends this step's records
    fn contacts(&mut self, state: &BodyState, out: &mut Vec<ContactRecord>);

    /// Returns the name of the provider
    fn name(&self) -> &str {
        "contacts"
    }
}
