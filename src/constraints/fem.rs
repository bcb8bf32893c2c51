use crate::bodies::{FemMaterial, FemModel};
use crate::constraints::ConstraintGradient;
use crate::core::{BodyState, ParticleId};
use crate::math::{Matrix3, Real, Vector3, EPSILON};

/// Projects the strain energy of a tetrahedral element towards zero.
///
/// The error is `c = V0 * psi(F)` with `F = Ds * Dm^-1`, and the gradient
/// with respect to vertices 1..3 is the columns of `V0 * P(F) * Dm^-T`,
/// vertex 0 taking the negated sum.
#[derive(Debug, Clone, PartialEq)]
pub struct FemConstraint {
    pub(crate) particles: [ParticleId; 4],
    rest_inverse: Matrix3,
    rest_volume: Real,
    mu: Real,
    lame_lambda: Real,
    model: FemModel,
    pub(crate) compliance: Real,
    pub(crate) lambda: Real,
}

impl FemConstraint {
    /// Creates an element from the current positions. Returns `None` for a
    /// collapsed tetrahedron, whose rest shape cannot be inverted.
    pub fn from_state(
        particles: [ParticleId; 4],
        state: &BodyState,
        material: &FemMaterial,
        compliance: Real,
    ) -> Option<Self> {
        let x = particles.map(|id| state.position(id));
        let rest_shape = edge_matrix(&x);
        let rest_volume = rest_shape.determinant().abs() / 6.0;
        if rest_volume < EPSILON {
            return None;
        }
        let rest_inverse = rest_shape.try_inverse()?;
        let (mu, lame_lambda) = material.lame();
        Some(Self {
            particles,
            rest_inverse,
            rest_volume,
            mu,
            lame_lambda,
            model: material.model,
            compliance,
            lambda: 0.0,
        })
    }

    pub fn model(&self) -> FemModel {
        self.model
    }

    pub fn rest_volume(&self) -> Real {
        self.rest_volume
    }

    pub fn value_and_gradient(&self, state: &BodyState) -> Option<ConstraintGradient> {
        let x = self.particles.map(|id| state.position(id));
        let f = edge_matrix(&x) * self.rest_inverse;

        let Some((psi, stress)) = self.energy(&f) else {
            // collapsed element, no usable direction
            return Some(ConstraintGradient::undefined(self.rest_volume, 4));
        };

        let h = stress * self.rest_inverse.transpose() * self.rest_volume;
        let g1 = h.column(0).into_owned();
        let g2 = h.column(1).into_owned();
        let g3 = h.column(2).into_owned();
        let g0 = -(g1 + g2 + g3);

        Some(ConstraintGradient::linear(
            self.rest_volume * psi,
            &[g0, g1, g2, g3],
        ))
    }

    /// Energy density and first Piola-Kirchhoff stress
    fn energy(&self, f: &Matrix3) -> Option<(Real, Matrix3)> {
        let (mu, lambda) = (self.mu, self.lame_lambda);
        let identity = Matrix3::identity();
        match self.model {
            FemModel::Linear => {
                let strain = (f + f.transpose()) * 0.5 - identity;
                let tr = strain.trace();
                let psi = mu * strain.norm_squared() + 0.5 * lambda * tr * tr;
                let stress = strain * (2.0 * mu) + identity * (lambda * tr);
                Some((psi, stress))
            }
            FemModel::StVK => {
                let strain = (f.transpose() * f - identity) * 0.5;
                let tr = strain.trace();
                let psi = mu * strain.norm_squared() + 0.5 * lambda * tr * tr;
                let stress = f * (strain * (2.0 * mu) + identity * (lambda * tr));
                Some((psi, stress))
            }
            FemModel::NeoHookean => {
                let c = f.transpose() * f;
                let det_c = c.determinant();
                if det_c < EPSILON {
                    return None;
                }
                let f_inv_t = f.try_inverse()?.transpose();
                let log_det = det_c.ln();
                let psi = 0.5 * mu * (c.trace() - log_det - 3.0) + lambda / 8.0 * log_det * log_det;
                let stress = (f - f_inv_t) * mu + f_inv_t * (0.5 * lambda * log_det);
                Some((psi, stress))
            }
            FemModel::Corotational => {
                let r = rotation_of(f)?;
                let stretch = r.transpose() * f - identity;
                let tr = stretch.trace();
                let psi = mu * (f - r).norm_squared() + 0.5 * lambda * tr * tr;
                let stress = (f - r) * (2.0 * mu) + r * (lambda * tr);
                Some((psi, stress))
            }
        }
    }
}

/// Columns `x1 - x0`, `x2 - x0`, `x3 - x0`
fn edge_matrix(x: &[Vector3; 4]) -> Matrix3 {
    Matrix3::from_columns(&[x[1] - x[0], x[2] - x[0], x[3] - x[0]])
}

/// Rotation part of the polar decomposition, with reflections removed
fn rotation_of(f: &Matrix3) -> Option<Matrix3> {
    let svd = f.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;
    if (u * v_t).determinant() < 0.0 {
        let smallest = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(2);
        let mut column = u.column_mut(smallest);
        column.neg_mut();
    }
    Some(u * v_t)
}
