use tracing::debug;

use crate::bodies::ContactMaterial;
use crate::collision::{ContactEntity, ContactRecord};
use crate::constraints::{local_arm, Constraint, ContactConstraint, ContactResponse};
use crate::core::{BodyState, ModelHandle, ParticleId, SimulationConfig};
use crate::math::{Real, Vector3, EPSILON};
use crate::Result;

/// Counts from one generation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Contact constraints created
    pub generated: usize,

    /// Records rejected for being too far apart or having a degenerate normal
    pub dropped: usize,

    /// Records whose feature pair has no constraint variant
    pub unsupported: usize,
}

/// Turns collision records into contact constraints
#[derive(Debug, Clone)]
pub struct ContactGenerator {
    proximity: Real,
    compliance: Real,
    default_response: ContactResponse,
    materials: Vec<Option<ContactMaterial>>,
}

impl ContactGenerator {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            proximity: config.contact_proximity,
            compliance: config.compliance.contact,
            default_response: ContactResponse {
                friction: config.friction,
                restitution: config.restitution,
                restitution_threshold: config.restitution_velocity_threshold,
            },
            materials: Vec::new(),
        }
    }

    /// Picks up new contact settings, keeping model materials
    pub fn reconfigure(&mut self, config: &SimulationConfig) {
        let materials = std::mem::take(&mut self.materials);
        *self = Self { materials, ..Self::new(config) };
    }

    /// Sets the surface material of a model, overriding the configured friction and restitution
    pub fn set_material(&mut self, model: ModelHandle, material: Option<ContactMaterial>) {
        if self.materials.len() <= model.index() {
            self.materials.resize(model.index() + 1, None);
        }
        self.materials[model.index()] = material;
    }

    fn material(&self, id: ParticleId) -> Option<ContactMaterial> {
        self.materials.get(id.model as usize).copied().flatten()
    }

    /// Response for a contact between two models: two materials combine,
    /// one material wins, none falls back to the config
    fn response(&self, a: ParticleId, b: ParticleId) -> ContactResponse {
        let material = match (self.material(a), self.material(b)) {
            (Some(ma), Some(mb)) => ma.combine(mb),
            (Some(m), None) | (None, Some(m)) => m,
            (None, None) => return self.default_response,
        };
        ContactResponse {
            friction: material.friction,
            restitution: material.restitution,
            ..self.default_response
        }
    }

    /// Generates zero or one constraint per record.
    ///
    /// Fails with `ParticleOutOfRange` if any record references a particle
    /// that does not exist; nothing is generated in that case.
    pub fn generate(
        &self,
        records: &[ContactRecord],
        state: &BodyState,
        out: &mut Vec<Constraint>,
    ) -> Result<GenerationReport> {
        for record in records {
            state.validate_all(record.entity_a.particles())?;
            state.validate_all(record.entity_b.particles())?;
        }

        let mut report = GenerationReport::default();
        for record in records {
            match self.build(record, state) {
                Outcome::Generated(contact) => {
                    out.push(Constraint::Contact(contact));
                    report.generated += 1;
                }
                Outcome::Dropped(reason) => {
                    debug!(?record.entity_a, ?record.entity_b, depth = record.depth, reason, "dropped contact");
                    report.dropped += 1;
                }
                Outcome::Unsupported => {
                    debug!(?record.entity_a, ?record.entity_b, "unsupported contact feature pair");
                    report.unsupported += 1;
                }
            }
        }
        Ok(report)
    }

    fn build(&self, record: &ContactRecord, state: &BodyState) -> Outcome {
        // The feature side always becomes B
        let record = if record.entity_a.rank() > record.entity_b.rank() {
            record.flipped()
        } else {
            *record
        };

        let a = match record.entity_a {
            ContactEntity::Body(id) | ContactEntity::Vertex(id) => id,
            ContactEntity::Edge(_) | ContactEntity::Triangle(_) => return Outcome::Unsupported,
        };

        if record.depth < -self.proximity {
            return Outcome::Dropped("separated beyond proximity");
        }
        let length = record.normal.norm();
        if !length.is_finite() || length < EPSILON {
            return Outcome::Dropped("degenerate normal");
        }
        let normal = record.normal / length;
        let arm_a = local_arm(state, a, record.point_a);

        let contact = match record.entity_b {
            ContactEntity::Body(b) => {
                let arm_b = local_arm(state, b, record.point_b);
                ContactConstraint::body_to_body(a, arm_a, b, arm_b, normal, self.compliance)
                    .with_response(self.response(a, b))
            }
            ContactEntity::Vertex(b) => {
                let arm_b = local_arm(state, b, record.point_b);
                ContactConstraint::vertex_to_body(a, arm_a, b, arm_b, normal, self.compliance)
                    .with_response(self.response(a, b))
            }
            ContactEntity::Edge(edge) => {
                let x = edge.map(|id| state.position(id));
                let weights = edge_weights(x, record.point_b);
                ContactConstraint::edge_to_body(a, arm_a, edge, weights, normal, self.compliance)
                    .with_response(self.response(a, edge[0]))
            }
            ContactEntity::Triangle(triangle) => {
                let x = triangle.map(|id| state.position(id));
                let weights = triangle_weights(x, record.point_b);
                ContactConstraint::triangle_to_body(a, arm_a, triangle, weights, normal, self.compliance)
                    .with_response(self.response(a, triangle[0]))
            }
        };
        Outcome::Generated(contact)
    }
}

enum Outcome {
    Generated(ContactConstraint),
    Dropped(&'static str),
    Unsupported,
}

/// Weights of the closest point on a segment
pub(crate) fn edge_weights(x: [Vector3; 2], point: Vector3) -> [Real; 2] {
    let e = x[1] - x[0];
    let length_squared = e.norm_squared();
    if length_squared < EPSILON {
        return [0.5, 0.5];
    }
    let t = ((point - x[0]).dot(&e) / length_squared).clamp(0.0, 1.0);
    [1.0 - t, t]
}

/// Barycentric weights of a point projected onto a triangle, clamped to the triangle
pub(crate) fn triangle_weights(x: [Vector3; 3], point: Vector3) -> [Real; 3] {
    let v0 = x[1] - x[0];
    let v1 = x[2] - x[0];
    let v2 = point - x[0];
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denominator = d00 * d11 - d01 * d01;
    if denominator.abs() < EPSILON {
        return [1.0 / 3.0; 3];
    }
    let v = (d11 * d20 - d01 * d21) / denominator;
    let w = (d00 * d21 - d01 * d20) / denominator;
    let weights = [(1.0 - v - w).max(0.0), v.max(0.0), w.max(0.0)];
    let sum: Real = weights.iter().sum();
    if sum < EPSILON {
        return [1.0 / 3.0; 3];
    }
    weights.map(|b| b / sum)
}
