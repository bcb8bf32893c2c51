use crate::error::PbdError;
use crate::math::{Real, Vector3};
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Default compliance (inverse stiffness) for each constraint family.
///
/// A compliance of zero makes the constraint infinitely stiff.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ComplianceDefaults {
    pub distance: Real,
    pub bend: Real,
    pub dihedral: Real,
    pub area: Real,
    pub volume: Real,
    pub fem: Real,
    pub contact: Real,
    pub grasp: Real,
}

impl Default for ComplianceDefaults {
    fn default() -> Self {
        Self {
            distance: 0.0,
            bend: 1.0e-4,
            dihedral: 1.0e-3,
            area: 0.0,
            volume: 0.0,
            fem: 0.0,
            contact: 0.0,
            grasp: 0.0,
        }
    }
}

impl ComplianceDefaults {
    fn iter(&self) -> impl Iterator<Item = (&'static str, Real)> {
        [
            ("distance", self.distance),
            ("bend", self.bend),
            ("dihedral", self.dihedral),
            ("area", self.area),
            ("volume", self.volume),
            ("fem", self.fem),
            ("contact", self.contact),
            ("grasp", self.grasp),
        ]
        .into_iter()
    }
}

/// Configuration parameters for the simulation
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// The fixed time step used by `PhysicsWorld::step_fixed`
    pub time_step: Real,

    /// Number of equal substeps each step is divided into
    pub substeps: u32,

    /// Number of Gauss-Seidel passes over all constraints per substep
    pub iterations: u32,

    /// Gravity acceleration applied to every movable particle
    pub gravity: Vector3,

    /// Default compliance per constraint family
    pub compliance: ComplianceDefaults,

    /// Global friction coefficient for contacts
    pub friction: Real,

    /// Global restitution coefficient for contacts
    pub restitution: Real,

    /// Normal speeds below this threshold are treated as resting contact (no bounce)
    pub restitution_velocity_threshold: Real,

    /// Separated contacts closer than this distance are kept as speculative contacts
    pub contact_proximity: Real,

    /// Whether structural constraints are graph-coloured into independent batches
    pub partitioning: bool,

    /// The maximum number of colours, the last one being the sequential overflow colour
    pub max_colors: usize,

    /// Fraction of linear velocity removed after each substep
    pub linear_damping: Real,

    /// Fraction of angular velocity removed after each substep
    pub angular_damping: Real,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 60.0,
            substeps: 1,
            iterations: 10,
            gravity: Vector3::new(0.0, -9.81, 0.0),
            compliance: ComplianceDefaults::default(),
            friction: 0.0,
            restitution: 0.0,
            restitution_velocity_threshold: 0.05,
            contact_proximity: 0.0,
            partitioning: false,
            max_colors: 12,
            linear_damping: 0.0,
            angular_damping: 0.0,
        }
    }
}

impl SimulationConfig {
    /// A config for interactive use: few iterations, two substeps
    pub fn realtime() -> Self {
        Self {
            iterations: 5,
            substeps: 2,
            linear_damping: 0.01,
            angular_damping: 0.01,
            ..Self::default()
        }
    }

    /// A config for accuracy: many iterations and substeps
    pub fn accurate() -> Self {
        Self {
            iterations: 30,
            substeps: 4,
            ..Self::default()
        }
    }

    /// Checks that every option is inside its valid range
    pub fn validate(&self) -> Result<()> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(PbdError::InvalidConfig(format!(
                "time step must be positive, got {}",
                self.time_step
            )));
        }
        if self.iterations == 0 {
            return Err(PbdError::InvalidConfig("iteration count must be at least 1".into()));
        }
        if self.substeps == 0 {
            return Err(PbdError::InvalidConfig("substep count must be at least 1".into()));
        }
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(PbdError::InvalidConfig("gravity must be finite".into()));
        }
        for (family, compliance) in self.compliance.iter() {
            if !(compliance.is_finite() && compliance >= 0.0) {
                return Err(PbdError::InvalidConfig(format!(
                    "{} compliance must be non-negative, got {}",
                    family, compliance
                )));
            }
        }
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return Err(PbdError::InvalidConfig(format!(
                "friction must be non-negative, got {}",
                self.friction
            )));
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(PbdError::InvalidConfig(format!(
                "restitution must lie in [0, 1], got {}",
                self.restitution
            )));
        }
        if !(self.contact_proximity.is_finite() && self.contact_proximity >= 0.0) {
            return Err(PbdError::InvalidConfig("contact proximity must be non-negative".into()));
        }
        if self.max_colors < 2 {
            return Err(PbdError::InvalidConfig("at least two colours are required".into()));
        }
        for (name, damping) in [("linear", self.linear_damping), ("angular", self.angular_damping)] {
            if !(0.0..=1.0).contains(&damping) {
                return Err(PbdError::InvalidConfig(format!(
                    "{} damping must lie in [0, 1], got {}",
                    name, damping
                )));
            }
        }
        Ok(())
    }
}
