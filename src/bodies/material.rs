use crate::error::PbdError;
use crate::math::Real;
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Surface properties used by contact velocity correction
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ContactMaterial {
    /// Coulomb friction coefficient, non-negative
    pub friction: Real,

    /// Coefficient of restitution (bounciness), 0-1
    pub restitution: Real,
}

impl ContactMaterial {
    pub fn new(friction: Real, restitution: Real) -> Self {
        Self { friction, restitution }
    }

    /// Combines the materials of two touching models.
    ///
    /// The bouncier surface wins, the slicker surface wins.
    pub fn combine(self, other: ContactMaterial) -> ContactMaterial {
        ContactMaterial {
            friction: self.friction.min(other.friction),
            restitution: self.restitution.max(other.restitution),
        }
    }

    /// Creates a material for ice (low friction, high restitution)
    pub fn ice() -> Self {
        Self::new(0.05, 0.4)
    }

    /// Creates a material for rubber (high friction, medium restitution)
    pub fn rubber() -> Self {
        Self::new(0.8, 0.7)
    }

    /// Creates a material for soft tissue (medium friction, no bounce)
    pub fn tissue() -> Self {
        Self::new(0.3, 0.0)
    }

    /// Creates a material for metal (medium friction, medium restitution)
    pub fn metal() -> Self {
        Self::new(0.4, 0.5)
    }
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Strain energy density used by tetrahedral FEM constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum FemModel {
    /// Small-strain linear elasticity
    Linear,
    /// Linear elasticity in the rotated frame of the polar decomposition
    Corotational,
    /// Saint Venant-Kirchhoff
    StVK,
    /// Compressible Neo-Hookean
    NeoHookean,
}

/// Elastic material of a tetrahedral model
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct FemMaterial {
    /// Young's modulus (Pa)
    pub young_modulus: Real,

    /// Poisson's ratio, below 0.5
    pub poisson_ratio: Real,

    /// The energy model
    pub model: FemModel,
}

impl FemMaterial {
    pub fn new(young_modulus: Real, poisson_ratio: Real, model: FemModel) -> Self {
        Self { young_modulus, poisson_ratio, model }
    }

    /// Rejects materials whose Lamé parameters are undefined or non-physical
    pub fn validate(&self) -> Result<()> {
        if !(self.young_modulus.is_finite() && self.young_modulus > 0.0) {
            return Err(PbdError::InvalidConfig(format!(
                "Young's modulus must be positive, got {}",
                self.young_modulus
            )));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(PbdError::InvalidConfig(format!(
                "Poisson's ratio must lie in (-1, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        Ok(())
    }

    /// Returns the Lamé parameters `(mu, lambda)`
    pub fn lame(&self) -> (Real, Real) {
        let e = self.young_modulus;
        let nu = self.poisson_ratio;
        let mu = e / (2.0 * (1.0 + nu));
        let lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
        (mu, lambda)
    }
}

impl Default for FemMaterial {
    fn default() -> Self {
        Self::new(1000.0, 0.2, FemModel::StVK)
    }
}
