use crate::constraints::ConstraintGradient;
use crate::core::{BodyState, ParticleId};
use crate::math::{Real, Vector3, EPSILON};

/// The feature pair a contact constraint resolves.
///
/// Participant 0 is always the body side ("A"); the remaining participants
/// are the feature side ("B").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactKind {
    /// A point on a body against a single vertex (or a grasped vertex)
    VertexToBody,
    /// A point on a body against a point on an edge
    EdgeToBody,
    /// A point on a body against a point on a triangle
    TriangleToBody,
    /// A point on one body against a point on another, along a fixed normal
    BodyToBody,
    /// Two points on two bodies held at a rest length
    BodyToBodyDistance,
}

/// Surface response used by velocity correction
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactResponse {
    pub friction: Real,
    pub restitution: Real,

    /// Pre-solve normal speeds below this value do not bounce
    pub restitution_threshold: Real,
}

/// A transient contact or a persistent grasp between a body and a feature
#[derive(Debug, Clone, PartialEq)]
pub struct ContactConstraint {
    kind: ContactKind,
    pub(crate) particles: [ParticleId; 4],
    count: usize,
    arm_a: Vector3,
    arm_b: Vector3,
    weights: [Real; 3],
    normal: Vector3,
    rest_length: Real,
    unilateral: bool,
    response: ContactResponse,
    pre_normal_velocity: Real,
    pub(crate) compliance: Real,
    pub(crate) lambda: Real,
}

impl ContactConstraint {
    #[allow(clippy::too_many_arguments)]
    fn new(
        kind: ContactKind,
        body: ParticleId,
        arm_a: Vector3,
        feature: &[ParticleId],
        arm_b: Vector3,
        weights: &[Real],
        normal: Vector3,
        unilateral: bool,
        compliance: Real,
    ) -> Self {
        let mut particles = [body; 4];
        particles[1..=feature.len()].copy_from_slice(feature);
        let mut w = [0.0; 3];
        w[..weights.len()].copy_from_slice(weights);
        Self {
            kind,
            particles,
            count: 1 + feature.len(),
            arm_a,
            arm_b,
            weights: w,
            normal,
            rest_length: 0.0,
            unilateral,
            response: ContactResponse::default(),
            pre_normal_velocity: 0.0,
            compliance,
            lambda: 0.0,
        }
    }

    /// Unilateral contact between a point on a body and a vertex.
    ///
    /// Arms are local offsets: rotated by the participant's orientation each
    /// evaluation, never recomputed.
    pub fn vertex_to_body(
        body: ParticleId,
        body_arm: Vector3,
        vertex: ParticleId,
        vertex_arm: Vector3,
        normal: Vector3,
        compliance: Real,
    ) -> Self {
        Self::new(ContactKind::VertexToBody, body, body_arm, &[vertex], vertex_arm, &[1.0], normal, true, compliance)
    }

    /// Unilateral contact between a point on a body and a point on an edge with fixed weights
    pub fn edge_to_body(
        body: ParticleId,
        body_arm: Vector3,
        edge: [ParticleId; 2],
        weights: [Real; 2],
        normal: Vector3,
        compliance: Real,
    ) -> Self {
        Self::new(ContactKind::EdgeToBody, body, body_arm, &edge, Vector3::zeros(), &weights, normal, true, compliance)
    }

    /// Unilateral contact between a point on a body and a point on a triangle with fixed weights
    pub fn triangle_to_body(
        body: ParticleId,
        body_arm: Vector3,
        triangle: [ParticleId; 3],
        weights: [Real; 3],
        normal: Vector3,
        compliance: Real,
    ) -> Self {
        Self::new(ContactKind::TriangleToBody, body, body_arm, &triangle, Vector3::zeros(), &weights, normal, true, compliance)
    }

    /// Unilateral contact between points on two bodies
    pub fn body_to_body(
        body_a: ParticleId,
        arm_a: Vector3,
        body_b: ParticleId,
        arm_b: Vector3,
        normal: Vector3,
        compliance: Real,
    ) -> Self {
        Self::new(ContactKind::BodyToBody, body_a, arm_a, &[body_b], arm_b, &[1.0], normal, true, compliance)
    }

    /// Bilateral attachment of a vertex to a point on a tool body, `c = |x_v - (x_tool + R r)|`
    pub fn vertex_grasp(tool: ParticleId, tool_arm: Vector3, vertex: ParticleId, compliance: Real) -> Self {
        Self::new(ContactKind::VertexToBody, tool, tool_arm, &[vertex], Vector3::zeros(), &[1.0], Vector3::zeros(), false, compliance)
    }

    /// Bilateral distance between points on two bodies, `c = |p1 - p0| - rest_length`
    pub fn body_to_body_distance(
        body_a: ParticleId,
        arm_a: Vector3,
        body_b: ParticleId,
        arm_b: Vector3,
        rest_length: Real,
        compliance: Real,
    ) -> Self {
        let mut contact = Self::new(
            ContactKind::BodyToBodyDistance,
            body_a,
            arm_a,
            &[body_b],
            arm_b,
            &[1.0],
            Vector3::zeros(),
            false,
            compliance,
        );
        contact.rest_length = rest_length.max(0.0);
        contact
    }

    pub fn with_response(mut self, response: ContactResponse) -> Self {
        self.response = response;
        self
    }

    pub fn kind(&self) -> ContactKind {
        self.kind
    }

    pub fn participants(&self) -> &[ParticleId] {
        &self.particles[..self.count]
    }

    pub fn normal(&self) -> Vector3 {
        self.normal
    }

    pub fn is_unilateral(&self) -> bool {
        self.unilateral
    }

    pub fn response(&self) -> ContactResponse {
        self.response
    }

    /// Normal relative velocity recorded by the last `prepare`
    pub fn pre_normal_velocity(&self) -> Real {
        self.pre_normal_velocity
    }

    fn single_feature(&self) -> bool {
        self.count == 2
    }

    fn world_arm_a(&self, state: &BodyState) -> Vector3 {
        state.orientation(self.particles[0]) * self.arm_a
    }

    fn world_arm_b(&self, state: &BodyState) -> Vector3 {
        state.orientation(self.particles[1]) * self.arm_b
    }

    /// Current world position of the contact point on side A
    pub fn point_a(&self, state: &BodyState) -> Vector3 {
        state.position(self.particles[0]) + self.world_arm_a(state)
    }

    /// Current world position of the contact point on side B
    pub fn point_b(&self, state: &BodyState) -> Vector3 {
        if self.single_feature() {
            return state.position(self.particles[1]) + self.world_arm_b(state);
        }
        self.particles[1..self.count]
            .iter()
            .zip(self.weights.iter())
            .map(|(&id, &w)| state.position(id) * w)
            .sum()
    }

    fn velocity_a(&self, state: &BodyState) -> Vector3 {
        let id = self.particles[0];
        state.velocity(id) + state.angular_velocity(id).cross(&self.world_arm_a(state))
    }

    fn velocity_b(&self, state: &BodyState) -> Vector3 {
        if self.single_feature() {
            let id = self.particles[1];
            return state.velocity(id) + state.angular_velocity(id).cross(&self.world_arm_b(state));
        }
        self.particles[1..self.count]
            .iter()
            .zip(self.weights.iter())
            .map(|(&id, &w)| state.velocity(id) * w)
            .sum()
    }

    pub fn value_and_gradient(&self, state: &BodyState) -> Option<ConstraintGradient> {
        let r_a = self.world_arm_a(state);
        let d = self.point_b(state) - self.point_a(state);

        let (c, n) = if self.unilateral {
            let c = d.dot(&self.normal);
            if c >= 0.0 {
                return None;
            }
            (c, self.normal)
        } else {
            let length = d.norm();
            let c = length - self.rest_length;
            if length < EPSILON {
                return Some(ConstraintGradient::undefined(c, self.count));
            }
            (c, d / length)
        };

        let mut gradient = ConstraintGradient::undefined(c, self.count);
        gradient.linear[0] = -n;
        gradient.angular[0] = -r_a.cross(&n);
        if self.single_feature() {
            gradient.linear[1] = n;
            gradient.angular[1] = self.world_arm_b(state).cross(&n);
        } else {
            for i in 1..self.count {
                gradient.linear[i] = n * self.weights[i - 1];
            }
        }
        Some(gradient)
    }

    /// Records the pre-solve normal velocity used by restitution
    pub fn prepare(&mut self, state: &BodyState) {
        self.pre_normal_velocity = if self.unilateral {
            self.normal.dot(&(self.velocity_b(state) - self.velocity_a(state)))
        } else {
            0.0
        };
    }

    /// Applies friction and restitution to the relative velocity at the contact.
    ///
    /// Only unilateral contacts that pushed during the last solve (`lambda != 0`)
    /// are corrected.
    pub fn correct_velocity(&self, state: &mut BodyState, dt: Real) {
        if !self.unilateral || self.lambda == 0.0 {
            return;
        }
        let n = self.normal;
        let relative = self.velocity_b(state) - self.velocity_a(state);
        let vn = n.dot(&relative);
        let vt = relative - n * vn;

        let mut dv = Vector3::zeros();
        let vt_length = vt.norm();
        if vt_length > EPSILON && self.response.friction > 0.0 {
            let limit = self.response.friction * self.lambda.abs() / dt;
            dv -= vt / vt_length * limit.min(vt_length);
        }

        let restitution = if self.pre_normal_velocity.abs() < self.response.restitution_threshold {
            0.0
        } else {
            self.response.restitution
        };
        dv += n * (-vn + (-restitution * self.pre_normal_velocity).max(0.0));

        self.apply_velocity_change(state, dv);
    }

    /// Applies an impulse that changes the relative velocity at the contact by `dv`
    fn apply_velocity_change(&self, state: &mut BodyState, dv: Vector3) {
        let magnitude = dv.norm();
        if magnitude < EPSILON {
            return;
        }
        let direction = dv / magnitude;

        let a = self.particles[0];
        let r_a = self.world_arm_a(state);
        let r_b = if self.single_feature() {
            self.world_arm_b(state)
        } else {
            Vector3::zeros()
        };

        let angular_weight = |id: ParticleId, r: Vector3| {
            let rn = r.cross(&direction);
            rn.dot(&(state.world_inverse_inertia(id) * rn))
        };

        let mut weight = state.inv_mass(a) + angular_weight(a, r_a);
        if self.single_feature() {
            let b = self.particles[1];
            weight += state.inv_mass(b) + angular_weight(b, r_b);
        } else {
            for i in 1..self.count {
                let w = self.weights[i - 1];
                weight += w * w * state.inv_mass(self.particles[i]);
            }
        }
        if weight < EPSILON {
            return;
        }

        let impulse = direction * (magnitude / weight);

        let inv_inertia_a = state.world_inverse_inertia(a);
        state.apply_velocity_change(a, -impulse * state.inv_mass(a));
        state.apply_angular_velocity_change(a, -(inv_inertia_a * r_a.cross(&impulse)));

        if self.single_feature() {
            let b = self.particles[1];
            let inv_inertia_b = state.world_inverse_inertia(b);
            state.apply_velocity_change(b, impulse * state.inv_mass(b));
            state.apply_angular_velocity_change(b, inv_inertia_b * r_b.cross(&impulse));
        } else {
            for i in 1..self.count {
                let id = self.particles[i];
                state.apply_velocity_change(id, impulse * (self.weights[i - 1] * state.inv_mass(id)));
            }
        }
    }
}

/// Offset of a world point in a participant's body frame: `R^T (point - x)`
pub fn local_arm(state: &BodyState, id: ParticleId, point: Vector3) -> Vector3 {
    state.orientation(id).inverse_transform_vector(&(point - state.position(id)))
}
