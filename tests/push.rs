use std::collections::HashSet;
use std::sync::Arc;

use approx::assert_relative_eq;
use piccore::config::PushConfig;
use piccore::core::{
    Absorb, Domain, DomainType, Face, FieldSample, Geometry, KineticSpecies, Mesh, NodeType,
    Particle, SpecularReflect, StepContext, TraceLog, UniformField, UniformMesh,
};
use piccore::error::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

const DT: f64 = 0.01;

/// Unit square, 11 x 11 nodes, with `setup` applied before it is boxed.
fn unit_domain(
    domain_type: DomainType,
    geometry: Geometry,
    setup: impl FnOnce(&mut UniformMesh),
) -> Result<Domain> {
    let mut mesh = UniformMesh::new(0, [0.0, 0.0], [1.0, 1.0], 11, 11)?.with_domain_type(domain_type);
    mesh.register_geometry(&geometry);
    setup(&mut mesh);
    let mut domain = Domain::new(domain_type, geometry);
    domain.add_mesh(Box::new(mesh))?;
    Ok(domain)
}

fn species(domain: &Domain, mass: f64, charge: f64, num_blocks: usize) -> Result<KineticSpecies> {
    let push = PushConfig {
        num_blocks,
        ..PushConfig::default()
    };
    KineticSpecies::new("test", 0, mass, charge, 1.0, domain, &push)
}

fn ctx(field: &UniformField, iteration: u64) -> StepContext<'_> {
    StepContext {
        dt: DT,
        iteration,
        fields: field,
        tracer: None,
    }
}

#[test]
fn electric_push_is_exact_euler() -> Result<()> {
    let domain = unit_domain(DomainType::XY, Geometry::new(), |_| {})?;
    let mut s = species(&domain, 1.0, 2.0, 2)?;
    let field = UniformField(FieldSample::new([1.0, 0.0, 0.0], [0.0; 3]));
    assert!(s.add_particle(&domain, &ctx(&field, 0), [0.5, 0.5, 0.0], [0.0; 3])?);

    s.advance(&domain, &ctx(&field, 1));
    let (_, p) = s.find_particle(0).expect("particle still live");
    // Rewound to -qm E dt/2, then a full kick.
    assert_relative_eq!(p.vel[0], 2.0 * DT / 2.0, epsilon = 1e-15);
    assert_relative_eq!(p.pos[0], 0.5 + p.vel[0] * DT, epsilon = 1e-15);
    Ok(())
}

#[test]
fn magnetic_push_preserves_speed() -> Result<()> {
    let domain = unit_domain(DomainType::XY, Geometry::new(), |m| {
        for face in Face::ALL {
            m.set_face(face, NodeType::Periodic);
        }
    })?;
    let mut s = species(&domain, 1.0, 1.0, 1)?;
    let field = UniformField(FieldSample::new([0.0; 3], [0.3, -0.2, 1.0]));
    let v0 = [0.05, -0.02, 0.01];
    let speed0 = v0.iter().map(|v| v * v).sum::<f64>().sqrt();
    s.add_particle(&domain, &ctx(&field, 0), [0.5, 0.5, 0.0], v0)?;
    for it in 1..=200 {
        s.advance(&domain, &ctx(&field, it));
    }
    let (_, p) = s.find_particle(0).expect("periodic box keeps the particle");
    assert_relative_eq!(p.speed2().sqrt(), speed0, max_relative = 1e-12);
    Ok(())
}

#[test]
fn open_edge_removes_particle_and_density() -> Result<()> {
    let domain = unit_domain(DomainType::XY, Geometry::new(), |_| {})?;
    let mut s = species(&domain, 1.0, 0.0, 2)?;
    let field = UniformField::zero();
    s.add_particle(&domain, &ctx(&field, 0), [0.95, 0.5, 0.0], [10.0, 0.0, 0.0])?;

    let report = s.advance(&domain, &ctx(&field, 1));
    assert_eq!(report.escaped, 1);
    assert_eq!(s.num_particles(), 0);
    let den = &s.moments(0).expect("mesh 0").den;
    assert_eq!(den.sum(), 0.0);
    Ok(())
}

#[test]
fn periodic_faces_shift_by_extent() -> Result<()> {
    let domain = unit_domain(DomainType::XY, Geometry::new(), |m| {
        m.set_face(Face::Left, NodeType::Periodic);
        m.set_face(Face::Right, NodeType::Periodic);
    })?;
    let mut s = species(&domain, 1.0, 0.0, 1)?;
    let field = UniformField::zero();
    s.add_particle(&domain, &ctx(&field, 0), [0.95, 0.5, 0.0], [10.0, 0.0, 0.0])?;

    let report = s.advance(&domain, &ctx(&field, 1));
    assert_eq!(report.escaped, 0);
    let (_, p) = s.find_particle(0).expect("wrapped particle is live");
    assert_relative_eq!(p.pos[0], 0.05, epsilon = 1e-12);
    assert_relative_eq!(p.pos[1], 0.5, epsilon = 1e-12);
    assert_eq!(p.vel, [10.0, 0.0, 0.0]);
    Ok(())
}

#[test]
fn symmetry_face_reflects_into_range() -> Result<()> {
    let domain = unit_domain(DomainType::XY, Geometry::new(), |m| {
        m.set_face(Face::Bottom, NodeType::Symmetry)
    })?;
    let mut s = species(&domain, 1.0, 0.0, 1)?;
    let field = UniformField::zero();
    s.add_particle(&domain, &ctx(&field, 0), [0.5, 0.02, 0.0], [0.0, -5.0, 0.0])?;

    s.advance(&domain, &ctx(&field, 1));
    let (_, p) = s.find_particle(0).expect("mirrored particle is live");
    assert_relative_eq!(p.pos[1], 0.03, epsilon = 1e-12);
    assert_relative_eq!(p.vel[1], 5.0, epsilon = 1e-12);
    let lc = p.lc.expect("logical coordinate cached");
    assert!((0.0..=10.0).contains(&lc[1]));
    Ok(())
}

#[test]
fn deposited_density_integrates_to_total_weight() -> Result<()> {
    let domain = unit_domain(DomainType::XY, Geometry::new(), |_| {})?;
    let mut s = species(&domain, 1.0, 0.0, 3)?;
    let field = UniformField::zero();
    let mut rng = StdRng::seed_from_u64(42);
    let mut total_weight = 0.0;
    for _ in 0..200 {
        let pos = [rng.random_range(0.0..1.0), rng.random_range(0.0..1.0), 0.0];
        let spwt = rng.random_range(0.5..5.0);
        total_weight += spwt;
        s.insert(&domain, &ctx(&field, 0), Particle::new(pos, [0.0; 3], spwt, 1.0)?)?;
    }
    s.advance(&domain, &ctx(&field, 1));

    let mesh = domain.mesh(0).expect("mesh 0");
    let den = &s.moments(0).expect("mesh 0").den;
    let mut integral = 0.0;
    for i in 0..mesh.ni() {
        for j in 0..mesh.nj() {
            integral += den.get(i, j) * mesh.node_volume(i, j);
        }
    }
    assert_relative_eq!(integral, total_weight, max_relative = 1e-10);
    Ok(())
}

#[test]
fn insertion_keeps_blocks_balanced() -> Result<()> {
    let domain = unit_domain(DomainType::XY, Geometry::new(), |_| {})?;
    let mut s = species(&domain, 1.0, 0.0, 4)?;
    let field = UniformField::zero();
    for k in 0..13 {
        let x = 0.05 + 0.07 * k as f64;
        s.add_particle(&domain, &ctx(&field, 0), [x, 0.5, 0.0], [0.0; 3])?;
    }
    let sizes = s.store(0).expect("mesh 0").block_sizes();
    let max = sizes.iter().copied().max().unwrap_or(0);
    let min = sizes.iter().copied().min().unwrap_or(0);
    assert!(max - min <= 1, "unbalanced blocks {sizes:?}");
    assert_eq!(sizes.iter().sum::<usize>(), 13);
    Ok(())
}

#[test]
fn ids_are_unique_across_meshes() -> Result<()> {
    let mut domain = Domain::new(DomainType::XY, Geometry::new());
    domain.add_mesh(Box::new(UniformMesh::new(0, [0.0, 0.0], [1.0, 1.0], 5, 5)?))?;
    domain.add_mesh(Box::new(UniformMesh::new(1, [2.0, 0.0], [3.0, 1.0], 5, 5)?))?;
    let mut s = species(&domain, 1.0, 0.0, 2)?;
    let field = UniformField::zero();
    for k in 0..20 {
        let x = if k % 2 == 0 { 0.5 } else { 2.5 };
        assert!(s.add_particle(&domain, &ctx(&field, 0), [x, 0.5, 0.0], [0.0; 3])?);
    }
    let ids: HashSet<u64> = s
        .iter_mesh(0)
        .chain(s.iter_mesh(1))
        .map(|p| p.id)
        .collect();
    assert_eq!(ids.len(), 20);
    assert_eq!(s.iter_mesh(1).count(), 10);
    Ok(())
}

#[test]
fn absorbing_wall_tallies_momentum_and_mass() -> Result<()> {
    let mut g = Geometry::new();
    let wall = g.add_boundary("wall", NodeType::Dirichlet, &[[0.5, 1.0], [0.5, 0.0]])?;
    g.set_material(wall, Arc::new(Absorb))?;
    let domain = unit_domain(DomainType::XY, g, |_| {})?;
    let mass = 2.0;
    let mut s = species(&domain, mass, 0.0, 1)?;
    let field = UniformField::zero();
    s.add_particle(&domain, &ctx(&field, 0), [0.3, 0.5, 0.0], [30.0, 0.0, 0.0])?;

    let report = s.advance(&domain, &ctx(&field, 1));
    assert_eq!(report.absorbed, 1);
    assert_eq!(s.num_particles(), 0);
    let tally = s.surface_tally();
    assert_relative_eq!(tally.total_mass(), mass * 1.0, epsilon = 1e-12);
    let px: f64 = tally.momentum(wall).expect("wall tallied").iter().map(|m| m[0]).sum();
    assert_relative_eq!(px, mass * 1.0 * 30.0, epsilon = 1e-9);
    Ok(())
}

#[test]
fn coincident_segments_resolve_to_lowest_id() -> Result<()> {
    let mut g = Geometry::new();
    let mirror = g.add_boundary("mirror", NodeType::Dirichlet, &[[0.5, 1.0], [0.5, 0.0]])?;
    let sink = g.add_boundary("sink", NodeType::Dirichlet, &[[0.5, 1.0], [0.5, 0.0]])?;
    g.set_material(mirror, Arc::new(SpecularReflect))?;
    g.set_material(sink, Arc::new(Absorb))?;
    let domain = unit_domain(DomainType::XY, g, |_| {})?;
    let mut s = species(&domain, 1.0, 0.0, 1)?;
    let field = UniformField::zero();
    s.add_particle(&domain, &ctx(&field, 0), [0.3, 0.5, 0.0], [30.0, 0.0, 0.0])?;

    let report = s.advance(&domain, &ctx(&field, 1));
    assert_eq!(report.absorbed, 0);
    let (_, p) = s.find_particle(0).expect("reflected particle is live");
    // 0.3 -> 0.6 folded back at the wall.
    assert_relative_eq!(p.pos[0], 0.4, epsilon = 1e-12);
    assert_eq!(s.surface_tally().mass(sink).map(|m| m.iter().sum::<f64>()), Some(0.0));
    Ok(())
}

#[test]
fn mesh_face_without_receiver_loses_particle() -> Result<()> {
    let mut domain = Domain::new(DomainType::XY, Geometry::new());
    let mut m0 = UniformMesh::new(0, [0.0, 0.0], [1.0, 1.0], 11, 11)?;
    m0.link_neighbor(Face::Right, 1);
    domain.add_mesh(Box::new(m0))?;
    domain.add_mesh(Box::new(UniformMesh::new(1, [5.0, 0.0], [6.0, 1.0], 11, 11)?))?;
    let mut s = species(&domain, 1.0, 0.0, 1)?;
    let field = UniformField::zero();
    s.add_particle(&domain, &ctx(&field, 0), [0.95, 0.5, 0.0], [10.0, 0.0, 0.0])?;

    let report = s.advance(&domain, &ctx(&field, 1));
    assert_eq!(report.lost, 1);
    assert_eq!(s.num_particles(), 0);
    Ok(())
}

#[test]
fn axisymmetric_step_rotates_velocity_pair() -> Result<()> {
    let domain = unit_domain(DomainType::RZ, Geometry::new(), |_| {})?;
    let mut s = species(&domain, 1.0, 0.0, 1)?;
    let field = UniformField::zero();
    s.add_particle(&domain, &ctx(&field, 0), [0.5, 0.5, 0.0], [1.0, 0.0, 3.0])?;

    s.advance(&domain, &ctx(&field, 1));
    let (_, p) = s.find_particle(0).expect("particle stays inside");
    assert_relative_eq!(p.vel[0].hypot(p.vel[2]), 10.0_f64.sqrt(), epsilon = 1e-12);
    let r = (0.5_f64 + DT).hypot(3.0 * DT);
    assert_relative_eq!(p.pos[0], r, epsilon = 1e-12);
    assert!(p.vel[0] > 1.0, "radial velocity gains from the azimuthal component");
    Ok(())
}

#[test]
fn zr_step_rotates_about_the_second_axis() -> Result<()> {
    let domain = unit_domain(DomainType::ZR, Geometry::new(), |_| {})?;
    let mut s = species(&domain, 1.0, 0.0, 1)?;
    let field = UniformField::zero();
    s.add_particle(&domain, &ctx(&field, 0), [0.5, 0.5, 0.0], [0.0, 1.0, 3.0])?;

    s.advance(&domain, &ctx(&field, 1));
    let (_, p) = s.find_particle(0).expect("particle stays inside");
    let r = (0.5_f64 + DT).hypot(3.0 * DT);
    assert_relative_eq!(p.pos[1], r, epsilon = 1e-12);
    assert_relative_eq!(p.pos[0], 0.5, epsilon = 1e-12);
    assert_relative_eq!(p.pos[2], (-3.0 * DT / r).asin(), epsilon = 1e-12);
    assert!(p.pos[2] < 0.0, "azimuth turns the opposite way to RZ");
    assert_relative_eq!(p.vel[1].hypot(p.vel[2]), 10.0_f64.sqrt(), epsilon = 1e-12);
    assert_eq!(p.vel[0], 0.0);
    assert!(p.vel[1] > 1.0, "radial velocity gains from the azimuthal component");
    Ok(())
}

#[test]
fn traced_particles_are_recorded() -> Result<()> {
    let domain = unit_domain(DomainType::XY, Geometry::new(), |_| {})?;
    let mut s = species(&domain, 1.0, 0.0, 2)?;
    let field = UniformField::zero();
    let log = TraceLog::new([0]);
    let traced = StepContext {
        dt: DT,
        iteration: 3,
        fields: &field,
        tracer: Some(&log),
    };
    s.add_particle(&domain, &traced, [0.2, 0.5, 0.0], [1.0, 0.0, 0.0])?;
    s.add_particle(&domain, &traced, [0.4, 0.5, 0.0], [1.0, 0.0, 0.0])?;
    assert!(s.find_particle(0).map(|(_, p)| p.trace).unwrap_or(false));

    s.advance(&domain, &traced);
    let samples = log.samples();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].id, 0);
    assert_eq!(samples[0].iteration, 3);
    Ok(())
}
