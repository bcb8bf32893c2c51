//! Greedy graph colouring of structural constraints.
//!
//! Two constraints in the same colour never share a movable particle, so a
//! colour's corrections can be computed independently from one immutable
//! state. Fixed particles are never written and may be shared freely.
//! Constraints that find no free colour land in the overflow colour, which
//! is always solved sequentially.

use std::collections::HashSet;

use crate::constraints::{Constraint, Correction};
use crate::core::{BodyState, ParticleId};
use crate::math::Real;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Constraint indices grouped by colour; the last colour is the overflow colour
#[derive(Debug, Clone, Default)]
pub struct ConstraintPartition {
    colors: Vec<Vec<usize>>,
}

impl ConstraintPartition {
    /// Colours `constraints` with at most `max_colors - 1` regular colours plus overflow
    pub fn build(constraints: &[Constraint], state: &BodyState, max_colors: usize) -> Self {
        let regular = max_colors.max(2) - 1;
        let mut colors: Vec<Vec<usize>> = vec![Vec::new(); regular + 1];
        let mut particle_sets: Vec<HashSet<ParticleId>> = vec![HashSet::new(); regular];

        for (index, constraint) in constraints.iter().enumerate() {
            let movable: Vec<ParticleId> = constraint
                .particles()
                .iter()
                .copied()
                .filter(|&id| state.is_movable(id))
                .collect();

            let color = particle_sets
                .iter()
                .position(|set| movable.iter().all(|id| !set.contains(id)));

            match color {
                Some(color) => {
                    particle_sets[color].extend(movable);
                    colors[color].push(index);
                }
                None => colors[regular].push(index),
            }
        }

        Self { colors }
    }

    /// Every colour in solve order, overflow last
    pub fn colors(&self) -> &[Vec<usize>] {
        &self.colors
    }

    /// Constraints that did not fit any regular colour
    pub fn overflow(&self) -> &[usize] {
        self.colors.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of non-empty colours, overflow included
    pub fn color_count(&self) -> usize {
        self.colors.iter().filter(|c| !c.is_empty()).count()
    }

    /// Checks that no regular colour holds two constraints sharing a movable particle
    pub fn is_conflict_free(&self, constraints: &[Constraint], state: &BodyState) -> bool {
        let regular = self.colors.len().saturating_sub(1);
        self.colors[..regular].iter().all(|color| {
            let mut seen = HashSet::new();
            color.iter().all(|&i| {
                constraints[i]
                    .particles()
                    .iter()
                    .filter(|&&id| state.is_movable(id))
                    .all(|&id| seen.insert(id))
            })
        })
    }
}

/// Computes the corrections of one colour from the same state
#[cfg(feature = "parallel")]
pub(crate) fn compute_color(
    constraints: &[Constraint],
    color: &[usize],
    state: &BodyState,
    dt: Real,
) -> Vec<Correction> {
    color
        .par_iter()
        .map(|&i| constraints[i].compute_correction(state, dt))
        .collect()
}

/// Computes the corrections of one colour from the same state
#[cfg(not(feature = "parallel"))]
pub(crate) fn compute_color(
    constraints: &[Constraint],
    color: &[usize],
    state: &BodyState,
    dt: Real,
) -> Vec<Correction> {
    color
        .iter()
        .map(|&i| constraints[i].compute_correction(state, dt))
        .collect()
}
