//! Kinetic species: particle lifecycle and the two-phase push across all meshes.
//!
//! A step runs in two phases separated by a barrier:
//!
//! 1. every live block of every mesh is pushed in parallel; particles crossing into a
//!    neighbour are collected as outgoing transfers;
//! 2. transfers are spliced into the destination inboxes and moved for the time they have
//!    left, in bounded rounds, until no inbox holds particles.
//!
//! Deposits are made into per-work-item buffers and reduced in collection order once each
//! phase completes, so results do not depend on thread scheduling.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

use crate::config::{PushConfig, SpeciesConfig};
use crate::core::deposit::{DepositBuffer, MeshMoments, SurfaceTally};
use crate::core::domain::Domain;
use crate::core::field::FieldLookup;
use crate::core::integrator::update_velocity;
use crate::core::mesh::{Mesh, MeshId};
use crate::core::particle::Particle;
use crate::core::resolver::{ParticleFate, Resolver};
use crate::core::store::{MeshStore, ParticleBlock};
use crate::core::trace::ParticleTracer;
use crate::error::{Error, Result};

/// Per-step inputs shared by every particle.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub dt: f64,
    pub iteration: u64,
    pub fields: &'a dyn FieldLookup,
    pub tracer: Option<&'a dyn ParticleTracer>,
}

/// Counters for one call to [`KineticSpecies::advance`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Resolver invocations (phase 1 particles plus every transfer round).
    pub moved: usize,
    pub absorbed: usize,
    pub escaped: usize,
    /// Hand-overs to a neighbouring mesh.
    pub transferred: usize,
    /// Particles that reached a mesh face with no neighbour to take them.
    pub lost: usize,
    /// Particles frozen by the bounce cap or by running out of transfer rounds.
    pub truncated: usize,
}

impl StepReport {
    fn record(&mut self, fate: ParticleFate) {
        self.moved += 1;
        match fate {
            ParticleFate::Settled { truncated } => {
                if truncated {
                    self.truncated += 1;
                }
            }
            ParticleFate::Absorbed => self.absorbed += 1,
            ParticleFate::Escaped => self.escaped += 1,
            ParticleFate::Transferred(_) => self.transferred += 1,
            ParticleFate::Lost => self.lost += 1,
        }
    }

    pub(crate) fn merge(&mut self, other: &StepReport) {
        self.moved += other.moved;
        self.absorbed += other.absorbed;
        self.escaped += other.escaped;
        self.transferred += other.transferred;
        self.lost += other.lost;
        self.truncated += other.truncated;
    }
}

/// Physical constants of a species.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeciesParams {
    /// Position of the species in the simulation, passed to surface materials.
    pub index: usize,
    /// Mass of one physical particle.
    pub mass: f64,
    /// Charge of one physical particle.
    pub charge: f64,
    pub q_over_m: f64,
    /// Default specific weight.
    pub spwt0: f64,
}

/// What one work item produced.
struct BatchResult {
    mesh: MeshId,
    deposit: Option<DepositBuffer>,
    /// Phase 2 survivors, to be spliced into the live blocks.
    settled: Vec<Particle>,
    outgoing: Vec<(MeshId, Particle)>,
    report: StepReport,
}

/// A population of kinetic macro-particles spread over every mesh of a domain.
#[derive(Debug)]
pub struct KineticSpecies {
    name: String,
    params: SpeciesParams,
    push: PushConfig,
    next_id: AtomicU64,
    stores: Vec<MeshStore>,
    moments: Vec<MeshMoments>,
    surface: SurfaceTally,
    total_momentum: f64,
}

impl KineticSpecies {
    /// Create an empty species with one store per mesh of `domain`.
    ///
    /// Errors:
    /// - `Error::InvalidParam` for non-positive mass or weight, a non-finite charge, or an
    ///   invalid push configuration.
    pub fn new(
        name: &str,
        index: usize,
        mass: f64,
        charge: f64,
        spwt0: f64,
        domain: &Domain,
        push: &PushConfig,
    ) -> Result<Self> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(Error::InvalidParam("mass must be finite and > 0".into()));
        }
        if !charge.is_finite() {
            return Err(Error::InvalidParam("charge must be finite".into()));
        }
        if !spwt0.is_finite() || spwt0 <= 0.0 {
            return Err(Error::InvalidParam("spwt must be finite and > 0".into()));
        }
        push.validate()?;

        let stores = domain
            .meshes()
            .map(|m| MeshStore::new(m.id(), push.num_blocks))
            .collect::<Result<Vec<_>>>()?;
        let moments = domain.meshes().map(MeshMoments::for_mesh).collect();

        log::info!(
            "species '{}': charge {:.4e} C, mass {:.4e} kg, spwt {:.4e}, {} mesh(es) x {} block(s)",
            name,
            charge,
            mass,
            spwt0,
            domain.num_meshes(),
            push.num_blocks
        );

        Ok(Self {
            name: name.to_string(),
            params: SpeciesParams {
                index,
                mass,
                charge,
                q_over_m: charge / mass,
                spwt0,
            },
            push: push.clone(),
            next_id: AtomicU64::new(0),
            stores,
            moments,
            surface: SurfaceTally::for_geometry(domain.geometry()),
            total_momentum: 0.0,
        })
    }

    pub fn from_config(
        index: usize,
        config: &SpeciesConfig,
        domain: &Domain,
        push: &PushConfig,
    ) -> Result<Self> {
        config.validate()?;
        log::info!(
            "species '{}' from config: molwt {}, charge {} e",
            config.name,
            config.molwt,
            config.charge
        );
        Self::new(
            &config.name,
            index,
            config.mass(),
            config.charge_coulomb(),
            config.spwt,
            domain,
            push,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &SpeciesParams {
        &self.params
    }

    /// Insert a particle with the species' mass and default weight.
    ///
    /// Returns `Ok(false)` if no mesh contains `pos`.
    pub fn add_particle(
        &mut self,
        domain: &Domain,
        ctx: &StepContext<'_>,
        pos: [f64; 3],
        vel: [f64; 3],
    ) -> Result<bool> {
        let particle = Particle::new(pos, vel, self.params.spwt0, self.params.mass)?;
        self.insert(domain, ctx, particle)
    }

    /// Insert an already constructed particle into whichever mesh contains it.
    ///
    /// Returns `Ok(false)` if no mesh contains its position.
    pub fn insert(&mut self, domain: &Domain, ctx: &StepContext<'_>, particle: Particle) -> Result<bool> {
        match domain.locate(particle.pos2()) {
            Some(mesh) => {
                self.add_particle_to(domain, ctx, mesh, particle)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Insert `particle` into `mesh`.
    ///
    /// The velocity is rewound by half a step under the local field so velocities lag
    /// positions by `dt/2`. The particle receives the next id, the current iteration as its
    /// birth iteration and its trace flag.
    ///
    /// Errors:
    /// - `Error::UnknownMesh` if the domain or the species has no such mesh.
    pub fn add_particle_to(
        &mut self,
        domain: &Domain,
        ctx: &StepContext<'_>,
        mesh: MeshId,
        mut particle: Particle,
    ) -> Result<()> {
        let m = domain.mesh(mesh).ok_or(Error::UnknownMesh(mesh))?;
        if mesh >= self.stores.len() {
            return Err(Error::UnknownMesh(mesh));
        }
        let lc = m.to_logical(particle.pos2());
        let lc = [
            lc[0].clamp(0.0, (m.ni() - 1) as f64),
            lc[1].clamp(0.0, (m.nj() - 1) as f64),
        ];
        particle.lc = Some(lc);

        let field = ctx.fields.sample(mesh, lc);
        update_velocity(&mut particle.vel, &field, -0.5 * ctx.dt, self.params.q_over_m);

        particle.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        particle.born_it = ctx.iteration;
        particle.trace = ctx.tracer.is_some_and(|t| t.is_traced(particle.id));
        particle.dt = 0.0;
        self.stores[mesh].add(particle);
        Ok(())
    }

    /// Advance every particle by one step, then rebuild the moment fields and surface
    /// tallies from where the particles ended up.
    pub fn advance(&mut self, domain: &Domain, ctx: &StepContext<'_>) -> StepReport {
        for m in self.moments.iter_mut() {
            m.clear();
        }
        self.surface.clear();
        self.total_momentum = 0.0;

        let params = self.params;
        let resolver = Resolver {
            domain,
            species: params.index,
            max_bounces: self.push.max_bounces,
            iteration: ctx.iteration,
            tracer: ctx.tracer,
        };
        let mut report = StepReport::default();

        // Phase 1: live blocks.
        let results: Vec<BatchResult> = self
            .stores
            .par_iter_mut()
            .flat_map(|store| {
                let mesh = store.mesh();
                store
                    .blocks
                    .par_iter_mut()
                    .map(move |block| push_block(block, mesh, &resolver, ctx, &params))
            })
            .collect();
        for result in results {
            self.absorb(result, &mut report);
        }

        // Phase 2: transfers, in rounds.
        for round in 0..self.push.max_transfer_rounds {
            let work: Vec<(MeshId, Vec<Particle>)> = self
                .stores
                .iter_mut()
                .flat_map(|store| {
                    let mesh = store.mesh();
                    store.take_inbox().into_iter().map(move |batch| (mesh, batch))
                })
                .collect();
            if work.is_empty() {
                break;
            }
            log::trace!("{}: transfer round {} with {} batch(es)", self.name, round, work.len());
            let results: Vec<BatchResult> = work
                .into_par_iter()
                .map(|(mesh, batch)| push_transfers(batch, mesh, &resolver, ctx, &params))
                .collect();
            for result in results {
                self.absorb(result, &mut report);
            }
        }
        self.freeze_pending_transfers(domain, &mut report);

        self.finalize(domain);

        log::debug!(
            "{} it={}: moved {} absorbed {} escaped {} transferred {} lost {} truncated {} live {}",
            self.name,
            ctx.iteration,
            report.moved,
            report.absorbed,
            report.escaped,
            report.transferred,
            report.lost,
            report.truncated,
            self.num_particles()
        );
        report
    }

    /// Reduce one work item into the species.
    fn absorb(&mut self, result: BatchResult, report: &mut StepReport) {
        report.merge(&result.report);
        if let Some(buffer) = result.deposit {
            if let Some(moments) = self.moments.get_mut(buffer.mesh) {
                if let Err(e) = moments.merge(&buffer.moments) {
                    log::warn!("{}: dropping deposit for mesh {}: {}", self.name, buffer.mesh, e);
                }
            }
            if let Err(e) = self.surface.merge(&buffer.surface) {
                log::warn!("{}: dropping surface tally: {}", self.name, e);
            }
            self.total_momentum += buffer.momentum_sum;
        }
        if let Some(store) = self.stores.get_mut(result.mesh) {
            for p in result.settled {
                store.add(p);
            }
        }
        for (dest, p) in result.outgoing {
            match self.stores.get_mut(dest) {
                Some(store) => store.add_transfer(p),
                None => log::warn!("{}: transfer to unknown mesh {} dropped", self.name, dest),
            }
        }
    }

    /// Particles still waiting after the last transfer round stay where they were handed
    /// over, without further motion.
    fn freeze_pending_transfers(&mut self, domain: &Domain, report: &mut StepReport) {
        for (store, moments) in self.stores.iter_mut().zip(self.moments.iter_mut()) {
            let Some(mesh) = domain.mesh(store.mesh()) else {
                continue;
            };
            for batch in store.take_inbox() {
                for mut p in batch {
                    p.dt = 0.0;
                    let lc = p.logical(mesh);
                    moments.scatter(lc, &p);
                    self.total_momentum += p.spwt * p.speed2();
                    report.truncated += 1;
                    store.add(p);
                }
            }
        }
    }

    fn finalize(&mut self, domain: &Domain) {
        for (store, moments) in self.stores.iter().zip(self.moments.iter_mut()) {
            if let Some(mesh) = domain.mesh(store.mesh()) {
                if let Err(e) = moments.finalize(mesh) {
                    log::warn!("{}: cannot finalize mesh {}: {}", self.name, store.mesh(), e);
                }
            }
        }
        self.total_momentum *= self.params.mass;
        self.surface.scale(self.params.mass);
    }

    /// Live particles across all meshes.
    pub fn num_particles(&self) -> usize {
        self.stores.iter().map(MeshStore::len).sum()
    }

    /// Store of `mesh`; logs a warning and returns `None` for an unknown mesh.
    pub fn store(&self, mesh: MeshId) -> Option<&MeshStore> {
        let store = self.stores.get(mesh);
        if store.is_none() {
            log::warn!("{}: no particle store for mesh {}", self.name, mesh);
        }
        store
    }

    /// Live particles of one mesh (empty for an unknown mesh).
    pub fn iter_mesh(&self, mesh: MeshId) -> impl Iterator<Item = &Particle> {
        self.store(mesh).into_iter().flat_map(MeshStore::iter)
    }

    /// Look a particle up by id across every mesh.
    pub fn find_particle(&self, id: u64) -> Option<(MeshId, &Particle)> {
        self.stores
            .iter()
            .find_map(|s| s.find(id).map(|p| (s.mesh(), p)))
    }

    /// Density and mean velocity of `mesh` after the last step.
    pub fn moments(&self, mesh: MeshId) -> Option<&MeshMoments> {
        let moments = self.moments.get(mesh);
        if moments.is_none() {
            log::warn!("{}: no moments for mesh {}", self.name, mesh);
        }
        moments
    }

    pub fn surface_tally(&self) -> &SurfaceTally {
        &self.surface
    }

    /// `m Σ spwt |v|²` over every particle that finished the last step.
    pub fn total_momentum(&self) -> f64 {
        self.total_momentum
    }
}

/// Phase 1 work item: kick and move every particle of one live block.
fn push_block(
    block: &mut ParticleBlock,
    mesh_id: MeshId,
    resolver: &Resolver<'_>,
    ctx: &StepContext<'_>,
    params: &SpeciesParams,
) -> BatchResult {
    let mut result = BatchResult {
        mesh: mesh_id,
        deposit: None,
        settled: Vec::new(),
        outgoing: Vec::new(),
        report: StepReport::default(),
    };
    let Some(mesh) = resolver.domain.mesh(mesh_id) else {
        return result;
    };
    let mut buffer = DepositBuffer::new(mesh, resolver.domain.geometry());

    let mut cursor = block.cursor();
    while let Some(part) = cursor.next_particle() {
        part.dt = ctx.dt;
        let fate = kick_and_resolve(part, mesh, resolver, ctx, params, &mut buffer);
        result.report.record(fate);
        match fate {
            ParticleFate::Settled { .. } => {}
            ParticleFate::Transferred(dest) => {
                if let Some(p) = cursor.remove() {
                    result.outgoing.push((dest, p));
                }
            }
            _ => {
                cursor.remove();
            }
        }
    }
    result.deposit = Some(buffer);
    result
}

/// Phase 2 work item: move particles handed over to `mesh_id` for their leftover time.
fn push_transfers(
    batch: Vec<Particle>,
    mesh_id: MeshId,
    resolver: &Resolver<'_>,
    ctx: &StepContext<'_>,
    params: &SpeciesParams,
) -> BatchResult {
    let mut result = BatchResult {
        mesh: mesh_id,
        deposit: None,
        settled: Vec::with_capacity(batch.len()),
        outgoing: Vec::new(),
        report: StepReport::default(),
    };
    let Some(mesh) = resolver.domain.mesh(mesh_id) else {
        return result;
    };
    let mut buffer = DepositBuffer::new(mesh, resolver.domain.geometry());

    for mut part in batch {
        let fate = kick_and_resolve(&mut part, mesh, resolver, ctx, params, &mut buffer);
        result.report.record(fate);
        match fate {
            ParticleFate::Settled { .. } => result.settled.push(part),
            ParticleFate::Transferred(dest) => result.outgoing.push((dest, part)),
            _ => {}
        }
    }
    result.deposit = Some(buffer);
    result
}

/// Velocity update for the particle's remaining `dt`, then the bounce loop. Settled
/// particles are deposited.
#[inline]
fn kick_and_resolve(
    part: &mut Particle,
    mesh: &dyn Mesh,
    resolver: &Resolver<'_>,
    ctx: &StepContext<'_>,
    params: &SpeciesParams,
    buffer: &mut DepositBuffer,
) -> ParticleFate {
    let lc = part.logical(mesh);
    let field = ctx.fields.sample(mesh.id(), lc);
    update_velocity(&mut part.vel, &field, part.dt, params.q_over_m);
    let fate = resolver.resolve(mesh, part, &mut buffer.surface);
    if fate.is_alive() {
        let lc = part.logical(mesh);
        buffer.deposit(lc, part);
    }
    fate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::DomainType;
    use crate::core::field::UniformField;
    use crate::core::geometry::Geometry;
    use crate::core::integrator::FieldSample;
    use crate::core::mesh::UniformMesh;
    use approx::assert_relative_eq;

    fn domain() -> Result<Domain> {
        let mut d = Domain::new(DomainType::XY, Geometry::new());
        d.add_mesh(Box::new(UniformMesh::new(0, [0.0, 0.0], [1.0, 1.0], 11, 11)?))?;
        Ok(d)
    }

    fn push(num_blocks: usize) -> PushConfig {
        PushConfig {
            num_blocks,
            ..PushConfig::default()
        }
    }

    #[test]
    fn rejects_bad_parameters() -> Result<()> {
        let d = domain()?;
        assert!(KineticSpecies::new("e", 0, 0.0, 1.0, 1.0, &d, &push(2)).is_err());
        assert!(KineticSpecies::new("e", 0, 1.0, 1.0, -1.0, &d, &push(2)).is_err());
        assert!(KineticSpecies::new("e", 0, 1.0, 1.0, 1.0, &d, &push(0)).is_err());
        Ok(())
    }

    #[test]
    fn insertion_rewinds_half_step() -> Result<()> {
        let d = domain()?;
        let mut s = KineticSpecies::new("ion", 0, 2.0, 4.0, 1.0, &d, &push(2))?;
        let field = UniformField(FieldSample::new([1.0, 0.0, 0.0], [0.0; 3]));
        let ctx = StepContext {
            dt: 0.1,
            iteration: 7,
            fields: &field,
            tracer: None,
        };
        assert!(s.add_particle(&d, &ctx, [0.5, 0.5, 0.0], [1.0, 0.0, 0.0])?);
        let (_, p) = s.find_particle(0).expect("first id is 0");
        // q/m = 2, E = 1, -dt/2 = -0.05
        assert_relative_eq!(p.vel[0], 1.0 - 0.1, epsilon = 1e-12);
        assert_eq!(p.born_it, 7);
        assert_eq!(p.spwt, 1.0);
        Ok(())
    }

    #[test]
    fn outside_insertion_is_refused() -> Result<()> {
        let d = domain()?;
        let mut s = KineticSpecies::new("n", 0, 1.0, 0.0, 1.0, &d, &push(1))?;
        let field = UniformField::zero();
        let ctx = StepContext {
            dt: 0.1,
            iteration: 0,
            fields: &field,
            tracer: None,
        };
        assert!(!s.add_particle(&d, &ctx, [2.0, 0.5, 0.0], [0.0; 3])?);
        assert!(matches!(
            s.add_particle_to(&d, &ctx, 3, Particle::new([0.5; 3], [0.0; 3], 1.0, 1.0)?),
            Err(Error::UnknownMesh(3))
        ));
        assert_eq!(s.num_particles(), 0);
        assert!(s.store(5).is_none());
        assert!(s.moments(5).is_none());
        assert!(s.moments(0).is_some());
        Ok(())
    }

    #[test]
    fn report_counts_fates() {
        let mut r = StepReport::default();
        r.record(ParticleFate::Settled { truncated: true });
        r.record(ParticleFate::Escaped);
        r.record(ParticleFate::Transferred(1));
        assert_eq!(r.moved, 3);
        assert_eq!(r.truncated, 1);
        assert_eq!(r.escaped, 1);
        assert_eq!(r.transferred, 1);
    }

    #[test]
    fn reports_merge_every_counter() {
        let mut a = StepReport::default();
        a.record(ParticleFate::Lost);
        a.record(ParticleFate::Absorbed);
        let mut b = StepReport::default();
        b.record(ParticleFate::Transferred(0));
        b.record(ParticleFate::Settled { truncated: true });
        a.merge(&b);
        assert_eq!(
            a,
            StepReport {
                moved: 4,
                absorbed: 1,
                escaped: 0,
                transferred: 1,
                lost: 1,
                truncated: 1,
            }
        );
    }
}
