mod rigid_body;
mod material;
mod model;

pub use self::rigid_body::RigidBodyDesc;
pub use self::material::{ContactMaterial, FemMaterial, FemModel};
pub use self::model::{ModelDesc, Topology, ConstraintFamily};

/// Flags for controlling particle behavior
pub mod particle_flags {
    use bitflags::bitflags;

    bitflags! {
        /// Flags describing a particle slot in the body state store
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
        pub struct ParticleFlags: u32 {
            /// Particle has orientation, angular velocity and inertia (6-DOF rigid body)
            const RIGID = 0x01;

            /// Particle has infinite mass and ignores constraint corrections
            const FIXED = 0x02;

            /// Particle is driven by an external kinematic target
            const KINEMATIC = 0x04;

            /// Particle is affected by gravity
            const AFFECTED_BY_GRAVITY = 0x08;
        }
    }
}

pub use self::particle_flags::ParticleFlags;
