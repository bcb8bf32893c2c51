use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::bodies::{ContactMaterial, FemMaterial, RigidBodyDesc};
use crate::constraints::{
    AreaConstraint, BendConstraint, Constraint, DihedralConstraint, DistanceConstraint,
    FemConstraint, VolumeConstraint,
};
use crate::core::{BodyState, ComplianceDefaults, ModelHandle, ModelState, ParticleId};
use crate::error::PbdError;
use crate::math::{Real, Vector3, EPSILON};
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Connectivity of a point model
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Topology {
    /// Unconnected particles
    Points,
    /// Segments; consecutive segments sharing a vertex form a strip
    Lines(Vec<[usize; 2]>),
    /// A triangle surface
    Triangles(Vec<[usize; 3]>),
    /// A tetrahedral volume
    Tetrahedra(Vec<[usize; 4]>),
}

impl Topology {
    fn name(&self) -> &'static str {
        match self {
            Topology::Points => "points",
            Topology::Lines(_) => "lines",
            Topology::Triangles(_) => "triangles",
            Topology::Tetrahedra(_) => "tetrahedra",
        }
    }

    fn indices(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        match self {
            Topology::Points => Box::new(std::iter::empty()),
            Topology::Lines(l) => Box::new(l.iter().flatten().copied()),
            Topology::Triangles(t) => Box::new(t.iter().flatten().copied()),
            Topology::Tetrahedra(t) => Box::new(t.iter().flatten().copied()),
        }
    }

    /// Unique edges in first-seen order
    fn edges(&self) -> Vec<[usize; 2]> {
        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        let mut push = |a: usize, b: usize| {
            if a != b && seen.insert((a.min(b), a.max(b))) {
                edges.push([a, b]);
            }
        };
        match self {
            Topology::Points => {}
            Topology::Lines(lines) => lines.iter().for_each(|&[a, b]| push(a, b)),
            Topology::Triangles(tris) => {
                for &[a, b, c] in tris {
                    push(a, b);
                    push(b, c);
                    push(c, a);
                }
            }
            Topology::Tetrahedra(tets) => {
                for &[a, b, c, d] in tets {
                    push(a, b);
                    push(a, c);
                    push(a, d);
                    push(b, c);
                    push(b, d);
                    push(c, d);
                }
            }
        }
        edges
    }
}

/// Families of structural constraints a model can enable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ConstraintFamily {
    Distance,
    Bend,
    Dihedral,
    Area,
    Volume,
    Fem,
}

impl ConstraintFamily {
    /// The configured default compliance for the family
    pub fn default_compliance(self, defaults: &ComplianceDefaults) -> Real {
        match self {
            ConstraintFamily::Distance => defaults.distance,
            ConstraintFamily::Bend => defaults.bend,
            ConstraintFamily::Dihedral => defaults.dihedral,
            ConstraintFamily::Area => defaults.area,
            ConstraintFamily::Volume => defaults.volume,
            ConstraintFamily::Fem => defaults.fem,
        }
    }

    fn supports(self, topology: &Topology) -> bool {
        matches!(
            (self, topology),
            (ConstraintFamily::Distance, Topology::Lines(_) | Topology::Triangles(_) | Topology::Tetrahedra(_))
                | (ConstraintFamily::Bend, Topology::Lines(_))
                | (ConstraintFamily::Dihedral, Topology::Triangles(_))
                | (ConstraintFamily::Area, Topology::Triangles(_))
                | (ConstraintFamily::Volume, Topology::Tetrahedra(_))
                | (ConstraintFamily::Fem, Topology::Tetrahedra(_))
        )
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
enum Particles {
    Points {
        positions: Vec<Vector3>,
        mass: Real,
        velocity: Vector3,
    },
    Rigid(Vec<RigidBodyDesc>),
}

/// Describes a model: its particles, connectivity and structural constraints
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ModelDesc {
    name: String,
    particles: Particles,
    topology: Topology,
    families: Vec<(ConstraintFamily, Option<Real>)>,
    fixed: Vec<usize>,
    contact_material: Option<ContactMaterial>,
    fem_material: FemMaterial,
}

impl ModelDesc {
    /// A model of point masses, every particle with the same mass
    pub fn points(name: impl Into<String>, positions: Vec<Vector3>, mass: Real) -> Self {
        Self::with_particles(name, Particles::Points { positions, mass, velocity: Vector3::zeros() })
    }

    /// A model of rigid bodies
    pub fn rigid(name: impl Into<String>, bodies: Vec<RigidBodyDesc>) -> Self {
        Self::with_particles(name, Particles::Rigid(bodies))
    }

    fn with_particles(name: impl Into<String>, particles: Particles) -> Self {
        Self {
            name: name.into(),
            particles,
            topology: Topology::Points,
            families: Vec::new(),
            fixed: Vec::new(),
            contact_material: None,
            fem_material: FemMaterial::default(),
        }
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Enables a structural constraint family. `None` uses the configured default compliance.
    pub fn enable_constraint(mut self, family: ConstraintFamily, compliance: Option<Real>) -> Self {
        self.families.retain(|(f, _)| *f != family);
        self.families.push((family, compliance));
        self
    }

    /// Marks particles as fixed (infinite mass)
    pub fn fix_particles(mut self, indices: &[usize]) -> Self {
        self.fixed.extend_from_slice(indices);
        self
    }

    /// Sets the initial velocity of every point particle
    pub fn with_velocity(mut self, initial: Vector3) -> Self {
        if let Particles::Points { velocity, .. } = &mut self.particles {
            *velocity = initial;
        }
        self
    }

    pub fn with_contact_material(mut self, material: ContactMaterial) -> Self {
        self.contact_material = Some(material);
        self
    }

    pub fn with_fem_material(mut self, material: FemMaterial) -> Self {
        self.fem_material = material;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact_material(&self) -> Option<ContactMaterial> {
        self.contact_material
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn particle_count(&self) -> usize {
        match &self.particles {
            Particles::Points { positions, .. } => positions.len(),
            Particles::Rigid(bodies) => bodies.len(),
        }
    }

    /// Validates the description and builds its particle state
    pub fn build_state(&self) -> Result<ModelState> {
        let count = self.particle_count();
        if count == 0 {
            return Err(PbdError::EmptyModel(self.name.clone()));
        }
        if let Some(index) = self.topology.indices().find(|&i| i >= count) {
            return Err(PbdError::InvalidTopology(format!(
                "model '{}' references vertex {} but has {} particles",
                self.name, index, count
            )));
        }
        if let Some(&index) = self.fixed.iter().find(|&&i| i >= count) {
            return Err(PbdError::InvalidTopology(format!(
                "model '{}' fixes particle {} but has {} particles",
                self.name, index, count
            )));
        }
        for &(family, compliance) in &self.families {
            if !family.supports(&self.topology) {
                return Err(PbdError::InvalidTopology(format!(
                    "{:?} constraints cannot be built on {} topology",
                    family,
                    self.topology.name()
                )));
            }
            if let Some(c) = compliance {
                if !(c.is_finite() && c >= 0.0) {
                    return Err(PbdError::InvalidConfig(format!(
                        "{:?} compliance must be non-negative, got {}",
                        family, c
                    )));
                }
            }
        }

        if self.families.iter().any(|&(family, _)| family == ConstraintFamily::Fem) {
            self.fem_material.validate()?;
        }

        let mut state = ModelState::new(self.name.clone());
        match &self.particles {
            Particles::Points { positions, mass, velocity } => {
                let inv_mass = if *mass > 0.0 { 1.0 / mass } else { 0.0 };
                for &p in positions {
                    state.push_particle(p, *velocity, inv_mass);
                }
            }
            Particles::Rigid(bodies) => {
                for body in bodies {
                    state.push_rigid_body(
                        body.position,
                        body.orientation,
                        body.linear_velocity,
                        body.angular_velocity,
                        body.inverse_mass(),
                        body.inverse_inertia(),
                    );
                }
            }
        }
        for &index in &self.fixed {
            state.fix_particle(index);
        }
        Ok(state)
    }

    /// Generates the structural constraints of a model already in the store.
    ///
    /// Rest measures are taken from the current positions.
    pub fn build_constraints(
        &self,
        model: ModelHandle,
        state: &BodyState,
        defaults: &ComplianceDefaults,
    ) -> Vec<Constraint> {
        let id = |i: usize| ParticleId::of(model, i);
        let mut constraints = Vec::new();

        for &(family, compliance) in &self.families {
            let compliance = compliance.unwrap_or_else(|| family.default_compliance(defaults));
            let before = constraints.len();
            match (family, &self.topology) {
                (ConstraintFamily::Distance, topology) => {
                    for [a, b] in topology.edges() {
                        constraints.push(DistanceConstraint::from_state(id(a), id(b), state, compliance).into());
                    }
                }
                (ConstraintFamily::Bend, Topology::Lines(lines)) => {
                    for pair in lines.windows(2) {
                        let ([a, b], [b2, c]) = (pair[0], pair[1]);
                        if b == b2 {
                            constraints.push(BendConstraint::from_state([id(a), id(b), id(c)], state, compliance).into());
                        }
                    }
                }
                (ConstraintFamily::Dihedral, Topology::Triangles(tris)) => {
                    for [p0, p1, e0, e1] in shared_edges(tris) {
                        constraints.push(
                            DihedralConstraint::from_state([id(p0), id(p1), id(e0), id(e1)], state, compliance).into(),
                        );
                    }
                }
                (ConstraintFamily::Area, Topology::Triangles(tris)) => {
                    for &[a, b, c] in tris {
                        let area = AreaConstraint::from_state([id(a), id(b), id(c)], state, compliance);
                        if area.rest_area() < EPSILON {
                            debug!(model = %self.name, triangle = ?[a, b, c], "skipping degenerate triangle");
                            continue;
                        }
                        constraints.push(area.into());
                    }
                }
                (ConstraintFamily::Volume, Topology::Tetrahedra(tets)) => {
                    for &[a, b, c, d] in tets {
                        let volume = VolumeConstraint::from_state([id(a), id(b), id(c), id(d)], state, compliance);
                        if volume.rest_volume().abs() < EPSILON {
                            debug!(model = %self.name, tetrahedron = ?[a, b, c, d], "skipping degenerate tetrahedron");
                            continue;
                        }
                        constraints.push(volume.into());
                    }
                }
                (ConstraintFamily::Fem, Topology::Tetrahedra(tets)) => {
                    for &[a, b, c, d] in tets {
                        let particles = [id(a), id(b), id(c), id(d)];
                        match FemConstraint::from_state(particles, state, &self.fem_material, compliance) {
                            Some(fem) => constraints.push(fem.into()),
                            None => debug!(model = %self.name, tetrahedron = ?[a, b, c, d], "skipping degenerate element"),
                        }
                    }
                }
                // rejected by build_state
                _ => {}
            }
            debug!(model = %self.name, ?family, count = constraints.len() - before, "generated constraints");
        }
        constraints
    }
}

/// Interior edges of a triangle mesh as `[opposite0, opposite1, edge0, edge1]`
fn shared_edges(triangles: &[[usize; 3]]) -> Vec<[usize; 4]> {
    let mut order = Vec::new();
    let mut opposite: HashMap<(usize, usize), Vec<(usize, [usize; 2])>> = HashMap::new();
    for &[a, b, c] in triangles {
        for (e0, e1, o) in [(a, b, c), (b, c, a), (c, a, b)] {
            let key = (e0.min(e1), e0.max(e1));
            let entry = opposite.entry(key).or_default();
            if entry.is_empty() {
                order.push(key);
            }
            entry.push((o, [e0, e1]));
        }
    }
    order
        .into_iter()
        .filter_map(|key| match opposite.get(&key).map(Vec::as_slice) {
            Some([(o0, [e0, e1]), (o1, _)]) => Some([*o0, *o1, *e0, *e1]),
            _ => None,
        })
        .collect()
}
