//! A kinematic tool grasps the free edge of a hanging rope, lifts it and lets go.

use xpbd_engine::core::{GraspEventType, ModelEventType};
use xpbd_engine::{
    ConstraintFamily, KinematicTarget, ModelDesc, ParticleId, PhysicsWorld, Real, RigidBodyDesc,
    SimulationConfig, Topology, Vector3,
};

const LINKS: usize = 20;

fn main() -> xpbd_engine::Result<()> {
    let mut world = PhysicsWorld::with_config(SimulationConfig::accurate())?;

    let positions: Vec<Vector3> = (0..=LINKS)
        .map(|i| Vector3::new(0.0, -(i as Real) * 0.05, 0.0))
        .collect();
    let lines = (0..LINKS).map(|i| [i, i + 1]).collect();
    let rope = world.add_model(
        ModelDesc::points("rope", positions, 0.02)
            .with_topology(Topology::Lines(lines))
            .enable_constraint(ConstraintFamily::Distance, None)
            .enable_constraint(ConstraintFamily::Bend, None)
            .fix_particles(&[0]),
    )?;
    let tip = ParticleId::of(rope, LINKS);

    let start = world.state().position(tip);
    let tool_model = world.add_model(ModelDesc::rigid("tool", vec![RigidBodyDesc::fixed(start)]))?;
    let tool = ParticleId::of(tool_model, 0);

    let grasp = world.begin_vertex_grasp(tool, &[tip])?;
    let lift = Vector3::new(0.01, 0.008, 0.0);

    for frame in 0..120 {
        if frame == 90 {
            world.end_grasp(grasp)?;
        } else if frame < 90 {
            world.set_kinematic_target(tool, KinematicTarget::Offset { translation: lift, rotation: None })?;
        }
        world.step_fixed()?;

        if frame % 15 == 0 {
            let p = world.state().position(tip);
            println!(
                "frame {:3}: tip = ({:+.3}, {:+.3}, {:+.3})  grasps = {}",
                frame,
                p.x,
                p.y,
                p.z,
                world.grasp_count()
            );
        }
    }

    let events = world.events_mut();
    while let Some(event) = events.next_grasp_event() {
        let verb = match event.event_type {
            GraspEventType::Began => "began",
            GraspEventType::Ended => "ended",
        };
        println!("grasp {:?} {} ({} constraints)", event.grasp, verb, event.constraint_count);
    }
    let changes = events.get_model_events_of_type(ModelEventType::GeometryChanged).len();
    println!("{} models changed in the last step", changes);
    Ok(())
}
