use std::collections::HashSet;

use piccore::config::RunConfig;
use piccore::core::{
    Domain, Face, Geometry, KineticSpecies, MaxwellianSource, NodeType, StepContext,
    UniformField, UniformMesh,
};
use piccore::error::Result;

const CONFIG: &str = r#"{
    "dt": 1e-3,
    "domain_type": "XY",
    "push": { "num_blocks": 4, "max_bounces": 12 },
    "species": [
        { "name": "Ar+", "molwt": 39.948, "charge": 1.0, "spwt": 1e6 },
        { "name": "Ar", "molwt": 39.948, "spwt": 1e7 }
    ]
}"#;

/// Periodic-in-x channel with open top and bottom.
fn channel(cfg: &RunConfig) -> Result<Domain> {
    let mut mesh = UniformMesh::new(0, [0.0, 0.0], [1.0, 0.5], 21, 11)?
        .with_domain_type(cfg.domain_type);
    mesh.set_face(Face::Left, NodeType::Periodic);
    mesh.set_face(Face::Right, NodeType::Periodic);
    let mut domain = Domain::new(cfg.domain_type, Geometry::new());
    domain.add_mesh(Box::new(mesh))?;
    Ok(domain)
}

#[test]
fn species_built_from_config_run_with_source() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let cfg = RunConfig::from_json_str(CONFIG)?;
    let domain = channel(&cfg)?;
    let mut all = cfg
        .species
        .iter()
        .enumerate()
        .map(|(i, sc)| KineticSpecies::from_config(i, sc, &domain, &cfg.push))
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(all[1].params().charge, 0.0);
    assert_eq!(all[0].params().index, 0);

    let field = UniformField::zero();
    let mut source = MaxwellianSource::new([0.1, 0.1], [0.9, 0.4], [50.0, 0.0, 0.0], 20.0, 100, Some(7))?;
    let neutrals = &mut all[1];
    for it in 0..5u64 {
        let ctx = StepContext {
            dt: cfg.dt,
            iteration: it,
            fields: &field,
            tracer: None,
        };
        let inserted = source.emit(neutrals, &domain, &ctx)?;
        assert_eq!(inserted, 100);
        let before = neutrals.num_particles();
        let report = neutrals.advance(&domain, &ctx);
        assert_eq!(report.moved, before);
        assert_eq!(neutrals.num_particles(), before - report.escaped - report.absorbed);
    }

    let ids: HashSet<u64> = neutrals.iter_mesh(0).map(|p| p.id).collect();
    assert_eq!(ids.len(), neutrals.num_particles());
    assert!(neutrals.total_momentum() > 0.0);
    let sizes = neutrals.store(0).map(|s| s.num_blocks());
    assert_eq!(sizes, Some(4));
    Ok(())
}

#[test]
fn invalid_config_is_rejected_before_building() {
    let bad = CONFIG.replace("\"num_blocks\": 4", "\"num_blocks\": 0");
    assert!(RunConfig::from_json_str(&bad).is_err());
}
