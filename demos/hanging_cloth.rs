//! A square of cloth pinned at two corners falls onto a floor and is printed
//! as a side view in the terminal.

use xpbd_engine::collision::ContactEntity;
use xpbd_engine::{
    BodyState, ConstraintFamily, ContactMaterial, ContactProvider, ContactRecord, ModelDesc,
    ParticleId, PhysicsWorld, Real, RigidBodyDesc, SimulationConfig, Topology, Vector3,
};

const SIZE: usize = 16;
const SPACING: Real = 0.1;
const FLOOR: Real = -1.0;
const COLUMNS: usize = 64;
const ROWS: usize = 20;

/// Reports every cloth vertex below the floor plane
struct Floor {
    body: ParticleId,
    cloth: Vec<ParticleId>,
}

impl ContactProvider for Floor {
    fn contacts(&mut self, state: &BodyState, out: &mut Vec<ContactRecord>) {
        for &vertex in &self.cloth {
            let p = state.position(vertex);
            if p.y < FLOOR {
                out.push(ContactRecord::new(
                    ContactEntity::Body(self.body),
                    ContactEntity::Vertex(vertex),
                    Vector3::new(p.x, FLOOR, p.z),
                    p,
                    Vector3::y(),
                    FLOOR - p.y,
                ));
            }
        }
    }

    fn name(&self) -> &str {
        "floor"
    }
}

fn cloth() -> ModelDesc {
    let mut positions = Vec::new();
    for j in 0..SIZE {
        for i in 0..SIZE {
            positions.push(Vector3::new(i as Real * SPACING, 0.0, j as Real * SPACING));
        }
    }
    let mut triangles = Vec::new();
    for j in 0..SIZE - 1 {
        for i in 0..SIZE - 1 {
            let a = j * SIZE + i;
            triangles.push([a, a + 1, a + SIZE + 1]);
            triangles.push([a, a + SIZE + 1, a + SIZE]);
        }
    }
    ModelDesc::points("cloth", positions, 0.005)
        .with_topology(Topology::Triangles(triangles))
        .enable_constraint(ConstraintFamily::Distance, None)
        .enable_constraint(ConstraintFamily::Dihedral, Some(1.0e-2))
        .with_contact_material(ContactMaterial::new(0.4, 0.0))
        .fix_particles(&[0, SIZE - 1])
}

fn render(world: &PhysicsWorld, cloth: &[ParticleId]) -> String {
    let mut canvas = vec![vec![' '; COLUMNS]; ROWS];
    let width = SIZE as Real * SPACING;
    for &id in cloth {
        let p = world.state().position(id);
        let column = ((p.z / width) * (COLUMNS - 1) as Real).round();
        let row = ((-p.y / (-FLOOR + 0.2)) * (ROWS - 1) as Real).round();
        if (0.0..COLUMNS as Real).contains(&column) && (0.0..ROWS as Real).contains(&row) {
            canvas[row as usize][column as usize] = '*';
        }
    }
    let floor_row = ((-FLOOR / (-FLOOR + 0.2)) * (ROWS - 1) as Real).round() as usize;
    for cell in canvas[floor_row.min(ROWS - 1)].iter_mut().filter(|c| **c == ' ') {
        *cell = '_';
    }
    canvas.into_iter().map(|row| row.into_iter().collect::<String>() + "\n").collect()
}

fn main() -> xpbd_engine::Result<()> {
    let mut world = PhysicsWorld::with_config(SimulationConfig {
        partitioning: true,
        ..SimulationConfig::realtime()
    })?;

    let floor = world.add_model(ModelDesc::rigid(
        "floor",
        vec![RigidBodyDesc::fixed(Vector3::new(0.0, FLOOR, 0.0))],
    ))?;
    let handle = world.add_model(cloth())?;
    let vertices: Vec<ParticleId> = (0..SIZE * SIZE).map(|i| ParticleId::of(handle, i)).collect();
    world.add_contact_provider(Box::new(Floor {
        body: ParticleId::of(floor, 0),
        cloth: vertices.clone(),
    }));

    for frame in 0..180 {
        let report = world.step_fixed()?;
        if frame % 30 == 0 {
            println!(
                "t = {:.2}s  contacts = {}  max error = {:.2e}  colours = {}",
                world.time(),
                report.contacts_generated,
                report.solver.max_error,
                report.solver.colors,
            );
            print!("{}", render(&world, &vertices));
        }
    }
    Ok(())
}
