use approx::assert_relative_eq;

use xpbd_engine::collision::ContactEntity;
use xpbd_engine::constraints::DistanceConstraint;
use xpbd_engine::core::{GraspEventType, ModelEventType};
use xpbd_engine::{
    BodyState, ConstraintFamily, ContactMaterial, ContactProvider, ContactRecord, FemMaterial,
    FemModel, KinematicTarget, ModelDesc, ModelHandle, ParticleId, PbdError, PhysicsWorld, Real,
    RigidBodyDesc, SimulationConfig, SolverObserver, Topology, Vector3,
};

const DT: Real = 1.0 / 60.0;

fn weightless() -> SimulationConfig {
    SimulationConfig {
        gravity: Vector3::zeros(),
        ..SimulationConfig::default()
    }
}

fn ground(world: &mut PhysicsWorld) -> ParticleId {
    let handle = world
        .add_model(ModelDesc::rigid("ground", vec![RigidBodyDesc::fixed(Vector3::zeros())]))
        .expect("valid ground");
    ParticleId::of(handle, 0)
}

fn point(world: &mut PhysicsWorld, position: Vector3, velocity: Vector3) -> ParticleId {
    let handle = world
        .add_model(ModelDesc::points("point", vec![position], 1.0).with_velocity(velocity))
        .expect("valid point");
    ParticleId::of(handle, 0)
}

fn cloth(width: usize, height: usize) -> ModelDesc {
    let mut positions = Vec::new();
    for j in 0..height {
        for i in 0..width {
            positions.push(Vector3::new(i as Real * 0.1, 1.0, j as Real * 0.1));
        }
    }
    let mut triangles = Vec::new();
    for j in 0..height - 1 {
        for i in 0..width - 1 {
            let a = j * width + i;
            triangles.push([a, a + 1, a + width + 1]);
            triangles.push([a, a + width + 1, a + width]);
        }
    }
    ModelDesc::points("cloth", positions, 0.01)
        .with_topology(Topology::Triangles(triangles))
        .enable_constraint(ConstraintFamily::Distance, None)
        .enable_constraint(ConstraintFamily::Dihedral, None)
        .fix_particles(&[0, width - 1])
}

#[test]
fn test_free_fall_matches_closed_form() {
    let mut world = PhysicsWorld::new();
    let start = Vector3::new(0.0, 10.0, 0.0);
    let id = point(&mut world, start, Vector3::zeros());
    let g = world.config().gravity;

    for n in 1..=30u32 {
        world.step(DT).expect("step succeeds");
        let n = n as Real;
        let expected = start + g * (DT * DT * n * (n + 1.0) / 2.0);
        assert_relative_eq!(world.state().position(id), expected, epsilon = 1.0e-9);
        assert_relative_eq!(world.state().velocity(id), g * (DT * n), epsilon = 1.0e-9);
    }
    assert_relative_eq!(world.time(), 30.0 * DT, epsilon = 1.0e-12);
}

#[test]
fn test_substeps_share_the_step() {
    let config = SimulationConfig {
        substeps: 4,
        ..SimulationConfig::default()
    };
    let mut world = PhysicsWorld::with_config(config).expect("valid config");
    let id = point(&mut world, Vector3::zeros(), Vector3::zeros());
    let g = world.config().gravity;

    let report = world.step(DT).expect("step succeeds");
    assert_eq!(report.substeps, 4);

    let h = DT / 4.0;
    assert_relative_eq!(world.state().position(id), g * (h * h * 10.0), epsilon = 1.0e-12);
}

#[test]
fn test_fixed_particles_stay_put() {
    let mut world = PhysicsWorld::new();
    let handle = world.add_model(cloth(5, 5)).expect("valid cloth");
    let corner = ParticleId::of(handle, 4);
    let before = world.state().position(corner);

    for _ in 0..20 {
        world.step(DT).expect("step succeeds");
    }
    assert_eq!(world.state().position(corner), before);
    assert!(world.state().position(ParticleId::of(handle, 24)).y < 1.0);
}

#[test]
fn test_plane_contact_stops_normal_velocity() {
    let mut world = PhysicsWorld::new();
    let plane = ground(&mut world);
    let boxed = world
        .add_model(ModelDesc::rigid(
            "box",
            vec![RigidBodyDesc::dynamic(1.0, Vector3::new(0.0, 0.45, 0.0))
                .with_box_inertia(Vector3::new(0.5, 0.5, 0.5))],
        ))
        .expect("valid box");
    let body = ParticleId::of(boxed, 0);

    world.submit_contacts([ContactRecord::new(
        ContactEntity::Body(plane),
        ContactEntity::Body(body),
        Vector3::zeros(),
        Vector3::new(0.0, -0.05, 0.0),
        Vector3::y(),
        0.05,
    )]);
    let report = world.step(DT).expect("step succeeds");
    assert_eq!(report.contacts_generated, 1);

    let g = world.config().gravity.y;
    let state = world.state();
    assert_relative_eq!(state.position(body).y, 0.45 + g * DT * DT + 0.05, epsilon = 1.0e-9);
    assert_relative_eq!(state.velocity(body), Vector3::zeros(), epsilon = 1.0e-9);
    assert_relative_eq!(state.angular_velocity(body), Vector3::zeros(), epsilon = 1.0e-9);
    assert_eq!(state.position(plane), Vector3::zeros());
}

#[test]
fn test_restitution_reflects_approach_velocity() {
    let config = SimulationConfig {
        restitution: 0.5,
        ..weightless()
    };
    let mut world = PhysicsWorld::with_config(config).expect("valid config");
    let plane = ground(&mut world);
    let start = Vector3::new(0.0, 0.01, 0.0);
    let velocity = Vector3::new(0.0, -2.0, 0.0);
    let vertex = point(&mut world, start, velocity);

    world.submit_contacts([ContactRecord::new(
        ContactEntity::Body(plane),
        ContactEntity::Vertex(vertex),
        Vector3::zeros(),
        start + velocity * DT,
        Vector3::y(),
        0.0,
    )]);
    world.step(DT).expect("step succeeds");

    assert_relative_eq!(world.state().position(vertex).y, 0.0, epsilon = 1.0e-9);
    assert_relative_eq!(world.state().velocity(vertex), Vector3::new(0.0, 1.0, 0.0), epsilon = 1.0e-9);
}

fn sliding_vertex(config: SimulationConfig, material: Option<ContactMaterial>) -> Vector3 {
    let mut world = PhysicsWorld::with_config(config).expect("valid config");
    let plane = ground(&mut world);
    let start = Vector3::new(0.0, -0.01, 0.0);
    let mut desc = ModelDesc::points("slider", vec![start], 1.0).with_velocity(Vector3::x());
    if let Some(material) = material {
        desc = desc.with_contact_material(material);
    }
    let vertex = ParticleId::of(world.add_model(desc).expect("valid slider"), 0);

    world.submit_contacts([ContactRecord::new(
        ContactEntity::Body(plane),
        ContactEntity::Vertex(vertex),
        Vector3::zeros(),
        start,
        Vector3::y(),
        0.01,
    )]);
    world.step(DT).expect("step succeeds");
    world.state().velocity(vertex)
}

#[test]
fn test_friction_is_bounded_by_the_normal_impulse() {
    // |lambda| = 0.01, so the tangential change is capped at mu * 0.01 / dt = 0.6 mu
    let config = SimulationConfig {
        friction: 0.5,
        ..weightless()
    };
    let velocity = sliding_vertex(config, None);
    assert_relative_eq!(velocity, Vector3::new(0.7, 0.0, 0.0), epsilon = 1.0e-9);

    let frictionless = sliding_vertex(weightless(), None);
    assert_relative_eq!(frictionless, Vector3::new(1.0, 0.0, 0.0), epsilon = 1.0e-9);
}

#[test]
fn test_model_material_overrides_config() {
    let config = SimulationConfig {
        friction: 0.5,
        ..weightless()
    };
    let velocity = sliding_vertex(config, Some(ContactMaterial::new(0.2, 0.0)));
    assert_relative_eq!(velocity, Vector3::new(0.88, 0.0, 0.0), epsilon = 1.0e-9);
}

#[test]
fn test_unsupported_and_distant_records_are_reported() {
    let mut world = PhysicsWorld::with_config(weightless()).expect("valid config");
    let handle = world.add_model(cloth(3, 3)).expect("valid cloth");
    let id = |i| ParticleId::of(handle, i);

    world.submit_contacts([
        ContactRecord::new(
            ContactEntity::Edge([id(0), id(1)]),
            ContactEntity::Triangle([id(3), id(4), id(6)]),
            Vector3::zeros(),
            Vector3::zeros(),
            Vector3::y(),
            0.1,
        ),
        ContactRecord::new(
            ContactEntity::Vertex(id(4)),
            ContactEntity::Vertex(id(8)),
            Vector3::zeros(),
            Vector3::zeros(),
            Vector3::y(),
            -1.0,
        ),
    ]);
    let report = world.step(DT).expect("step succeeds");
    assert_eq!(report.contacts_generated, 0);
    assert_eq!(report.contacts_unsupported, 1);
    assert_eq!(report.contacts_dropped, 1);
}

#[test]
fn test_bad_record_fails_the_step_before_anything_moves() {
    let mut world = PhysicsWorld::new();
    let id = point(&mut world, Vector3::new(0.0, 1.0, 0.0), Vector3::zeros());
    let bogus = ParticleId::new(id.model, 7);

    world.submit_contacts([ContactRecord::new(
        ContactEntity::Vertex(id),
        ContactEntity::Vertex(bogus),
        Vector3::zeros(),
        Vector3::zeros(),
        Vector3::y(),
        0.1,
    )]);
    let err = world.step(DT).unwrap_err();
    assert_eq!(err, PbdError::ParticleOutOfRange { id: bogus, len: 1 });
    assert_eq!(world.state().position(id), Vector3::new(0.0, 1.0, 0.0));
    assert_eq!(world.time(), 0.0);

    // The failed records are gone and the next step runs normally
    world.step(DT).expect("step succeeds");
    assert!(world.state().position(id).y < 1.0);
}

#[test]
fn test_invalid_inputs_are_rejected() {
    let invalid = SimulationConfig {
        iterations: 0,
        ..SimulationConfig::default()
    };
    assert!(matches!(PhysicsWorld::with_config(invalid), Err(PbdError::InvalidConfig(_))));

    let negative = SimulationConfig {
        friction: -1.0,
        ..SimulationConfig::default()
    };
    let mut world = PhysicsWorld::new();
    assert!(matches!(world.set_config(negative), Err(PbdError::InvalidConfig(_))));
    assert!(matches!(world.step(0.0), Err(PbdError::InvalidConfig(_))));
    assert!(matches!(world.step(Real::NAN), Err(PbdError::InvalidConfig(_))));

    assert_eq!(
        world.add_model(ModelDesc::points("empty", Vec::new(), 1.0)),
        Err(PbdError::EmptyModel("empty".into()))
    );

    let bad_lines = ModelDesc::points("rope", vec![Vector3::zeros(), Vector3::x()], 1.0)
        .with_topology(Topology::Lines(vec![[0, 2]]));
    assert!(matches!(world.add_model(bad_lines), Err(PbdError::InvalidTopology(_))));

    let volume_on_lines = ModelDesc::points("rope", vec![Vector3::zeros(), Vector3::x()], 1.0)
        .with_topology(Topology::Lines(vec![[0, 1]]))
        .enable_constraint(ConstraintFamily::Volume, None);
    assert!(matches!(world.add_model(volume_on_lines), Err(PbdError::InvalidTopology(_))));

    let soft = ModelDesc::points("rope", vec![Vector3::zeros(), Vector3::x()], 1.0)
        .with_topology(Topology::Lines(vec![[0, 1]]))
        .enable_constraint(ConstraintFamily::Distance, Some(-1.0));
    assert!(matches!(world.add_model(soft), Err(PbdError::InvalidConfig(_))));

    let missing = ParticleId::new(3, 0);
    assert!(matches!(
        world.apply_force(missing, Vector3::x()),
        Err(PbdError::ParticleOutOfRange { .. })
    ));
}

#[test]
fn test_identical_worlds_step_identically() {
    let run = || {
        let mut world = PhysicsWorld::with_config(SimulationConfig::realtime()).expect("valid config");
        let handle = world.add_model(cloth(6, 6)).expect("valid cloth");
        world
            .apply_force(ParticleId::of(handle, 20), Vector3::new(0.0, 0.0, 3.0))
            .expect("particle exists");
        for _ in 0..25 {
            world.step(DT).expect("step succeeds");
        }
        world.snapshot()
    };

    let a = run();
    let b = run();
    assert_eq!(a.models[0].positions, b.models[0].positions);
    assert_eq!(a.models[0].orientations, b.models[0].orientations);
}

#[test]
fn test_partitioned_world_keeps_rope_length() {
    let config = SimulationConfig {
        partitioning: true,
        iterations: 20,
        ..SimulationConfig::default()
    };
    let mut world = PhysicsWorld::with_config(config).expect("valid config");
    let positions: Vec<Vector3> = (0..10).map(|i| Vector3::new(i as Real * 0.1, 0.0, 0.0)).collect();
    let lines = (0..9).map(|i| [i, i + 1]).collect();
    let handle = world
        .add_model(
            ModelDesc::points("rope", positions, 0.1)
                .with_topology(Topology::Lines(lines))
                .enable_constraint(ConstraintFamily::Distance, None)
                .fix_particles(&[0]),
        )
        .expect("valid rope");

    let mut report = None;
    for _ in 0..30 {
        report = Some(world.step(DT).expect("step succeeds"));
    }
    assert!(report.expect("stepped").solver.colors >= 2);

    for i in 0..9 {
        let a = world.state().position(ParticleId::of(handle, i));
        let b = world.state().position(ParticleId::of(handle, i + 1));
        assert_relative_eq!((b - a).norm(), 0.1, epsilon = 1.0e-2);
    }
}

#[test]
fn test_vertex_grasp_follows_the_tool() {
    let mut world = PhysicsWorld::new();
    let tool_model = world
        .add_model(ModelDesc::rigid("tool", vec![RigidBodyDesc::fixed(Vector3::new(0.0, 1.2, 0.0))]))
        .expect("valid tool");
    let tool = ParticleId::of(tool_model, 0);
    let cloth_model = world.add_model(cloth(4, 4)).expect("valid cloth");
    let held = [ParticleId::of(cloth_model, 5), ParticleId::of(cloth_model, 6)];
    let before = held.map(|id| world.state().position(id));

    let grasp = world.begin_vertex_grasp(tool, &held).expect("valid grasp");
    assert_eq!(world.grasp_count(), 1);
    assert_eq!(world.grasp_constraints().len(), 2);

    let offset = Vector3::new(0.2, 0.1, 0.0);
    world
        .set_kinematic_target(tool, KinematicTarget::Offset { translation: offset, rotation: None })
        .expect("tool exists");
    world.step(DT).expect("step succeeds");

    assert_relative_eq!(world.state().position(tool), Vector3::new(0.2, 1.3, 0.0), epsilon = 1.0e-12);
    assert_relative_eq!(world.state().velocity(tool), offset / DT, epsilon = 1.0e-9);
    for (id, start) in held.iter().zip(before) {
        assert_relative_eq!(world.state().position(*id), start + offset, epsilon = 1.0e-9);
    }

    world.end_grasp(grasp).expect("grasp is active");
    assert_eq!(world.grasp_count(), 0);
    assert!(world.grasp_constraints().is_empty());
    assert!(matches!(world.end_grasp(grasp), Err(PbdError::UnknownHandle(_))));

    let events = world.events().get_grasp_events_for(grasp);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, GraspEventType::Began);
    assert_eq!(events[0].constraint_count, 2);
    assert_eq!(events[1].event_type, GraspEventType::Ended);
}

#[test]
fn test_grasps_are_independent() {
    let mut world = PhysicsWorld::with_config(weightless()).expect("valid config");
    let tools = world
        .add_model(ModelDesc::rigid(
            "tools",
            vec![
                RigidBodyDesc::fixed(Vector3::new(0.0, 1.0, 0.0)),
                RigidBodyDesc::fixed(Vector3::new(1.0, 1.0, 0.0)),
            ],
        ))
        .expect("valid tools");
    let (left, right) = (ParticleId::of(tools, 0), ParticleId::of(tools, 1));
    let a = point(&mut world, Vector3::new(0.0, 0.5, 0.0), Vector3::zeros());
    let b = point(&mut world, Vector3::new(1.0, 0.5, 0.0), Vector3::zeros());

    let first = world.begin_vertex_grasp(left, &[a]).expect("valid grasp");
    let _second = world.begin_vertex_grasp(right, &[b]).expect("valid grasp");
    world.end_grasp(first).expect("grasp is active");
    assert_eq!(world.grasp_constraints().len(), 1);

    world
        .set_kinematic_target(left, KinematicTarget::Offset { translation: Vector3::x(), rotation: None })
        .expect("tool exists");
    world
        .set_kinematic_target(right, KinematicTarget::Offset { translation: Vector3::z(), rotation: None })
        .expect("tool exists");
    world.step(DT).expect("step succeeds");

    assert_relative_eq!(world.state().position(a), Vector3::new(0.0, 0.5, 0.0), epsilon = 1.0e-12);
    assert_relative_eq!(world.state().position(b), Vector3::new(1.0, 0.5, 1.0), epsilon = 1.0e-9);
}

#[test]
fn test_body_grasp_drags_a_rigid_body() {
    let mut world = PhysicsWorld::with_config(SimulationConfig {
        iterations: 20,
        ..weightless()
    })
    .expect("valid config");
    let tool_model = world
        .add_model(ModelDesc::rigid("tool", vec![RigidBodyDesc::fixed(Vector3::new(0.0, 2.0, 0.0))]))
        .expect("valid tool");
    let tool = ParticleId::of(tool_model, 0);
    let body_model = world
        .add_model(ModelDesc::rigid(
            "organ",
            vec![RigidBodyDesc::dynamic(1.0, Vector3::new(0.0, 1.0, 0.0)).with_sphere_inertia(0.5)],
        ))
        .expect("valid body");
    let body = ParticleId::of(body_model, 0);

    world
        .begin_body_grasp(tool, body, Vector3::new(0.0, 1.5, 0.0))
        .expect("valid grasp");
    world
        .set_kinematic_target(
            tool,
            KinematicTarget::Absolute { position: Vector3::new(0.0, 2.1, 0.0), orientation: None },
        )
        .expect("tool exists");
    world.step(DT).expect("step succeeds");

    // The grasp point was straight below the tool, so the pull is pure translation
    assert_relative_eq!(world.state().position(body), Vector3::new(0.0, 1.1, 0.0), epsilon = 1.0e-9);
}

#[test]
fn test_kinematic_target_is_interpolated_across_substeps() {
    let config = SimulationConfig {
        substeps: 2,
        ..weightless()
    };
    let mut world = PhysicsWorld::with_config(config).expect("valid config");
    let tool_model = world
        .add_model(ModelDesc::rigid("tool", vec![RigidBodyDesc::fixed(Vector3::zeros())]))
        .expect("valid tool");
    let tool = ParticleId::of(tool_model, 0);

    let target = Vector3::new(1.0, 0.0, 0.0);
    world
        .set_kinematic_target(tool, KinematicTarget::Absolute { position: target, orientation: None })
        .expect("tool exists");
    world.step(DT).expect("step succeeds");

    assert_eq!(world.state().position(tool), target);
    // The last substep covers half the path
    assert_relative_eq!(world.state().velocity(tool), target / DT, epsilon = 1.0e-9);

    // Without a new target the tool holds its pose
    world.step(DT).expect("step succeeds");
    assert_eq!(world.state().position(tool), target);
}

#[test]
fn test_model_events() {
    let mut world = PhysicsWorld::new();
    let anchor = world
        .add_model(ModelDesc::points("anchor", vec![Vector3::zeros()], 1.0).fix_particles(&[0]))
        .expect("valid anchor");
    let falling = point(&mut world, Vector3::new(0.0, 5.0, 0.0), Vector3::zeros()).model_handle();

    assert_eq!(world.events().get_model_events_of_type(ModelEventType::Added).len(), 2);

    let report = world.step(DT).expect("step succeeds");
    assert_eq!(report.dirty_models, vec![falling]);

    let changed = world.events().get_model_events_of_type(ModelEventType::GeometryChanged);
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].model, falling);
    assert!(world
        .events()
        .get_model_events_for_model(anchor)
        .iter()
        .all(|e| e.event_type == ModelEventType::Added));

    // Both models were new, and the falling one moved since
    let mut dirty = world.take_dirty_models();
    dirty.sort();
    assert_eq!(dirty, vec![anchor, falling]);
    assert!(world.take_dirty_models().is_empty());
}

struct FloorProvider {
    floor: ParticleId,
    vertex: ParticleId,
}

impl ContactProvider for FloorProvider {
    fn contacts(&mut self, state: &BodyState, out: &mut Vec<ContactRecord>) {
        let p = state.position(self.vertex);
        if p.y < 0.0 {
            out.push(ContactRecord::new(
                ContactEntity::Body(self.floor),
                ContactEntity::Vertex(self.vertex),
                Vector3::new(p.x, 0.0, p.z),
                p,
                Vector3::y(),
                -p.y,
            ));
        }
    }

    fn name(&self) -> &str {
        "floor"
    }
}

#[test]
fn test_contact_provider_keeps_a_particle_above_the_floor() {
    let mut world = PhysicsWorld::new();
    let floor = ground(&mut world);
    let vertex = point(&mut world, Vector3::new(0.0, 0.05, 0.0), Vector3::zeros());
    world.add_contact_provider(Box::new(FloorProvider { floor, vertex }));

    let mut generated = 0;
    for _ in 0..60 {
        generated += world.step(DT).expect("step succeeds").contacts_generated;
        assert!(world.state().position(vertex).y > -1.0e-9);
    }
    assert!(generated > 0);
    assert!(world.state().velocity(vertex).y.abs() < 0.2);
}

#[test]
fn test_step_schedule_orders_every_node() {
    let mut world = PhysicsWorld::new();
    let a: ModelHandle = point(&mut world, Vector3::zeros(), Vector3::zeros()).model_handle();
    let _b = point(&mut world, Vector3::x(), Vector3::zeros()).model_handle();

    let schedule = world.step_schedule().expect("acyclic");
    assert_eq!(schedule.len(), 2 * 5 + 4);
    assert_eq!(schedule[0], xpbd_engine::core::StepNode::SavePrevious(a));
}

/// Reports the lowest point of a ball resting on the plane y = 0
struct BallOnPlane {
    plane: ParticleId,
    ball: ParticleId,
    radius: Real,
}

impl ContactProvider for BallOnPlane {
    fn contacts(&mut self, state: &BodyState, out: &mut Vec<ContactRecord>) {
        let center = state.position(self.ball);
        let lowest = center - Vector3::y() * self.radius;
        if lowest.y < 0.0 {
            out.push(ContactRecord::new(
                ContactEntity::Body(self.plane),
                ContactEntity::Body(self.ball),
                Vector3::new(lowest.x, 0.0, lowest.z),
                lowest,
                Vector3::y(),
                -lowest.y,
            ));
        }
    }
}

#[test]
fn test_ball_settles_on_plane_without_sinking() {
    let radius = 0.5;
    let mut world = PhysicsWorld::new();
    let plane = ground(&mut world);
    let handle = world
        .add_model(ModelDesc::rigid(
            "ball",
            vec![RigidBodyDesc::dynamic(2.0, Vector3::new(0.0, 0.6, 0.0)).with_sphere_inertia(radius)],
        ))
        .expect("valid ball");
    let ball = ParticleId::of(handle, 0);
    world.add_contact_provider(Box::new(BallOnPlane { plane, ball, radius }));

    let mut touched = false;
    for _ in 0..120 {
        let report = world.step(DT).expect("step succeeds");
        let state = world.state();
        assert!(state.position(ball).y >= radius - 1.0e-9);
        if report.contacts_generated > 0 {
            touched = true;
            assert!(state.velocity(ball).y >= -1.0e-9);
        }
    }
    assert!(touched);
    assert_relative_eq!(world.state().position(ball).y, radius, epsilon = 1.0e-6);
    assert_relative_eq!(world.state().angular_velocity(ball), Vector3::zeros(), epsilon = 1.0e-9);
}

/// Tracks the penetration of one body point below the plane y = 0 after every iteration
struct PenetrationTrace {
    body: ParticleId,
    arm: Vector3,
    depths: Vec<Real>,
}

impl SolverObserver for PenetrationTrace {
    fn on_iteration(&mut self, _iteration: u32, state: &BodyState) {
        let point = state.position(self.body) + state.orientation(self.body) * self.arm;
        self.depths.push((-point.y).max(0.0));
    }
}

#[test]
fn test_heavy_box_penetration_shrinks_every_iteration() {
    let mut world = PhysicsWorld::new();
    let plane = ground(&mut world);
    let handle = world
        .add_model(ModelDesc::rigid(
            "crate",
            vec![RigidBodyDesc::dynamic(100.0, Vector3::new(0.0, 0.45, 0.0))
                .with_box_inertia(Vector3::new(0.5, 0.5, 0.5))],
        ))
        .expect("valid box");
    let body = ParticleId::of(handle, 0);
    let arm = Vector3::new(0.3, -0.5, 0.0);

    world.submit_contacts([ContactRecord::new(
        ContactEntity::Body(plane),
        ContactEntity::Body(body),
        Vector3::new(0.3, 0.0, 0.0),
        Vector3::new(0.3, -0.05, 0.0),
        Vector3::y(),
        0.05,
    )]);
    let mut trace = PenetrationTrace { body, arm, depths: Vec::new() };
    let report = world.step_with_observer(DT, &mut trace).expect("step succeeds");

    assert_eq!(report.contacts_generated, 1);
    assert_eq!(trace.depths.len(), world.config().iterations as usize);
    assert!(trace.depths[0] < 0.05);
    for pair in trace.depths.windows(2) {
        assert!(pair[1] <= pair[0] + 1.0e-12, "penetration grew: {:?}", pair);
    }

    let state = world.state();
    let r = state.orientation(body) * arm;
    let point_velocity = state.velocity(body) + state.angular_velocity(body).cross(&r);
    assert!(point_velocity.y >= -1.0e-9);
}

#[test]
fn test_distance_to_fixed_particle_converges() {
    let mut world = PhysicsWorld::with_config(SimulationConfig {
        iterations: 20,
        ..weightless()
    })
    .expect("valid config");
    let handle = world
        .add_model(
            ModelDesc::points("pair", vec![Vector3::zeros(), Vector3::new(2.0, 0.0, 0.0)], 1.0)
                .fix_particles(&[0]),
        )
        .expect("valid pair");
    let (anchor, free) = (ParticleId::of(handle, 0), ParticleId::of(handle, 1));
    world
        .add_constraint(DistanceConstraint::new(anchor, free, 1.0, 0.0))
        .expect("known particles");

    let report = world.step(DT).expect("step succeeds");

    assert_eq!(report.solver.iterations, 20);
    assert_eq!(world.state().position(anchor), Vector3::zeros());
    let distance = (world.state().position(free) - world.state().position(anchor)).norm();
    assert!((distance - 1.0).abs() < 1.0e-6);
}

/// Reports a contact against a particle that does not exist, once
struct BrokenOnce {
    vertex: ParticleId,
    reported: bool,
}

impl ContactProvider for BrokenOnce {
    fn contacts(&mut self, _state: &BodyState, out: &mut Vec<ContactRecord>) {
        if !self.reported {
            self.reported = true;
            let missing = ParticleId::new(self.vertex.model, 99);
            out.push(ContactRecord::new(
                ContactEntity::Vertex(self.vertex),
                ContactEntity::Vertex(missing),
                Vector3::zeros(),
                Vector3::zeros(),
                Vector3::y(),
                0.01,
            ));
        }
    }
}

#[test]
fn test_rejected_provider_record_leaves_state_untouched() {
    let mut world = PhysicsWorld::new();
    let anchor = world
        .add_model(ModelDesc::points("anchor", vec![Vector3::zeros()], 1.0).fix_particles(&[0]))
        .expect("valid anchor");
    let anchor = ParticleId::of(anchor, 0);
    let vertex = point(&mut world, Vector3::new(0.0, 1.0, 0.0), Vector3::zeros());
    world.add_contact_provider(Box::new(BrokenOnce { vertex, reported: false }));

    // Holds the vertex against gravity
    let g = world.config().gravity;
    world.apply_force(vertex, -g).expect("known particle");
    world
        .set_kinematic_target(anchor, KinematicTarget::Absolute {
            position: Vector3::new(1.0, 0.0, 0.0),
            orientation: None,
        })
        .expect("known particle");
    world.take_dirty_models();

    let err = world.step(DT).expect_err("missing particle");
    assert!(matches!(err, PbdError::ParticleOutOfRange { .. }));
    assert_eq!(world.time(), 0.0);
    assert_eq!(world.state().position(vertex), Vector3::new(0.0, 1.0, 0.0));
    assert_eq!(world.state().velocity(vertex), Vector3::zeros());
    assert_eq!(world.snapshot().position(vertex), Some(Vector3::new(0.0, 1.0, 0.0)));
    assert_eq!(world.state().position(anchor), Vector3::zeros());
    assert!(world.take_dirty_models().is_empty());
    assert!(world.events().get_model_events_of_type(ModelEventType::GeometryChanged).is_empty());

    // The queued force and target survive into the next step
    world.step(DT).expect("step succeeds");
    assert_relative_eq!(world.time(), DT);
    assert_eq!(world.state().position(vertex), Vector3::new(0.0, 1.0, 0.0));
    assert_eq!(world.state().position(anchor), Vector3::new(1.0, 0.0, 0.0));
}

#[test]
fn test_geometry_events_cover_only_the_last_step() {
    let mut world = PhysicsWorld::new();
    let falling = point(&mut world, Vector3::new(0.0, 5.0, 0.0), Vector3::zeros()).model_handle();

    for _ in 0..30 {
        world.step(DT).expect("step succeeds");
    }

    let changed = world.events().get_model_events_of_type(ModelEventType::GeometryChanged);
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].model, falling);
    assert_eq!(world.events().get_model_events_of_type(ModelEventType::Added).len(), 1);
}

fn tetrahedron(material: FemMaterial) -> ModelDesc {
    ModelDesc::points(
        "tet",
        vec![
            Vector3::zeros(),
            Vector3::x(),
            Vector3::y(),
            Vector3::z(),
        ],
        1.0,
    )
    .with_topology(Topology::Tetrahedra(vec![[0, 1, 2, 3]]))
    .enable_constraint(ConstraintFamily::Fem, None)
    .with_fem_material(material)
}

#[test]
fn test_invalid_fem_material_is_rejected() {
    let mut world = PhysicsWorld::new();
    for material in [
        FemMaterial::new(1000.0, 0.5, FemModel::StVK),
        FemMaterial::new(1000.0, 0.7, FemModel::NeoHookean),
        FemMaterial::new(1000.0, -1.0, FemModel::Linear),
        FemMaterial::new(0.0, 0.3, FemModel::Corotational),
        FemMaterial::new(Real::NAN, 0.3, FemModel::StVK),
    ] {
        assert!(
            matches!(world.add_model(tetrahedron(material)), Err(PbdError::InvalidConfig(_))),
            "{:?} accepted",
            material
        );
    }
    assert_eq!(world.state().model_count(), 0);

    let handle = world
        .add_model(tetrahedron(FemMaterial::new(1000.0, 0.45, FemModel::StVK)))
        .expect("valid material");
    for _ in 0..3 {
        world.step(DT).expect("step succeeds");
    }
    let model = world.state().model(handle).expect("model exists");
    assert!(model.positions().iter().all(|p| p.iter().all(|v| v.is_finite())));
}
