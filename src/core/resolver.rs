//! Per-particle bounce loop: moves a particle through the remainder of its time step,
//! resolving surface hits and mesh-face crossings as they occur.

use crate::core::deposit::SurfaceTally;
use crate::core::domain::{Domain, DomainType};
use crate::core::geometry::{leaving_surface, SegmentId};
use crate::core::hit::SurfaceHit;
use crate::core::mesh::{Face, Mesh, MeshId, NodeType};
use crate::core::particle::Particle;
use crate::core::trace::ParticleTracer;
use crate::core::vector::{lerp2, mirror2};

/// Travel fraction assigned to faces the particle does not cross.
const NO_EXIT: f64 = 99.0;

/// Distance, in cells, by which a hand-over point may miss the receiving mesh.
const HANDOVER_TOL: f64 = 1e-6;

/// Default maximum number of bounces per particle per step.
pub const DEFAULT_MAX_BOUNCES: usize = 10;

/// How a particle's step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleFate {
    /// Used up its time budget inside the mesh. `truncated` is set if the bounce cap cut the
    /// motion short.
    Settled { truncated: bool },
    /// Stuck to a surface.
    Absorbed,
    /// Left the domain through an open face.
    Escaped,
    /// Crossed into a neighbouring mesh; `lc` already refers to that mesh.
    Transferred(MeshId),
    /// Crossed a mesh face with no neighbour containing the exit point.
    Lost,
}

impl ParticleFate {
    #[inline]
    pub fn is_alive(self) -> bool {
        matches!(self, ParticleFate::Settled { .. })
    }
}

/// Borrowed state shared by every particle resolved in one pass.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    pub domain: &'a Domain,
    /// Species index handed to surface materials.
    pub species: usize,
    pub max_bounces: usize,
    pub iteration: u64,
    pub tracer: Option<&'a dyn ParticleTracer>,
}

impl<'a> Resolver<'a> {
    /// Move `part` through its remaining `dt` inside `mesh`.
    ///
    /// Surface momentum and mass deposits go to `tally`. On return the particle's position,
    /// velocity and cached logical coordinate reflect where it ended up; for
    /// [`ParticleFate::Transferred`] the logical coordinate is in the destination mesh.
    pub fn resolve(
        &self,
        mesh: &dyn Mesh,
        part: &mut Particle,
        tally: &mut SurfaceTally,
    ) -> ParticleFate {
        let mut lc = part.logical(mesh);
        let mut bounces = 0;

        while part.dt > 0.0 {
            if bounces == self.max_bounces {
                part.dt = 0.0;
                return ParticleFate::Settled { truncated: true };
            }
            bounces += 1;

            let old_pos = part.pos2();
            let old_lc = lc;
            self.advance_position(part);
            lc = mesh.to_logical(part.pos2());
            part.lc = Some(lc);

            if let Some(hit) = self.first_hit(mesh, part, old_pos, old_lc, lc) {
                let t = hit.t_travel_f64();
                let hit_pos = lerp2(old_pos, part.pos2(), t);
                part.pos[0] = hit_pos[0];
                part.pos[1] = hit_pos[1];
                lc = lerp2(old_lc, lc, t);
                part.lc = Some(lc);
                part.dt *= 1.0 - t;
                if !self.interact(part, hit, tally) {
                    return ParticleFate::Absorbed;
                }
            } else if outside(mesh, lc) {
                let (face, t) = exit_face(mesh, old_lc, lc);
                lc = lerp2(old_lc, lc, t);
                lc[face.axis()] = face_value(mesh, face);
                clamp_logical(mesh, &mut lc);
                let pos = mesh.to_physical(lc);
                part.pos[0] = pos[0];
                part.pos[1] = pos[1];
                part.lc = Some(lc);
                part.dt *= 1.0 - t;

                let index = lc[face.tangent_axis()].max(0.0).floor() as usize;
                match mesh.exit_type(face, index) {
                    NodeType::Symmetry => {
                        mirror2(&mut part.vel, mesh.boundary_normal(face, pos));
                    }
                    NodeType::Periodic => {
                        lc = wrap_periodic(mesh, part, face);
                        part.lc = Some(lc);
                    }
                    NodeType::Mesh => return self.hand_over(mesh, part, face, index),
                    _ => return ParticleFate::Escaped,
                }
            } else {
                part.dt = 0.0;
            }

            if part.trace {
                if let Some(tracer) = self.tracer {
                    tracer.record(part, self.iteration);
                }
            }
        }
        ParticleFate::Settled { truncated: false }
    }

    /// Position update over `part.dt`, turning out-of-plane motion into a rotation for
    /// axisymmetric domains.
    fn advance_position(&self, part: &mut Particle) {
        part.pos[0] += part.vel[0] * part.dt;
        part.pos[1] += part.vel[1] * part.dt;
        let dk = part.vel[2] * part.dt;
        match self.domain.domain_type() {
            DomainType::XY => part.pos[2] += dk,
            DomainType::RZ => rotate_axisymmetric(part, 0, dk),
            DomainType::ZR => rotate_axisymmetric(part, 1, -dk),
        }
    }

    /// Earliest crossing of a surface-interacting segment registered on the nodes spanned
    /// by the travel.
    fn first_hit(
        &self,
        mesh: &dyn Mesh,
        part: &Particle,
        old_pos: [f64; 2],
        old_lc: [f64; 2],
        lc: [f64; 2],
    ) -> Option<SurfaceHit> {
        let geometry = self.domain.geometry();
        let max_i = mesh.ni() - 1;
        let max_j = mesh.nj() - 1;
        let node = |x: f64, max: usize| (x.max(0.0).floor() as usize).min(max);
        let (i0, i1) = (node(old_lc[0].min(lc[0]), max_i), node(old_lc[0].max(lc[0]), max_i));
        let (j0, j1) = (node(old_lc[1].min(lc[1]), max_j), node(old_lc[1].max(lc[1]), max_j));

        let mut candidates: Vec<SegmentId> = Vec::new();
        for i in i0..=i1 {
            for j in j0..=j1 {
                candidates.extend_from_slice(mesh.segments_at(i, j));
            }
        }
        candidates.sort_unstable();
        candidates.dedup();

        let new_pos = part.pos2();
        candidates
            .into_iter()
            .filter_map(|id| geometry.segment(id))
            .filter(|seg| {
                geometry
                    .boundary(seg.boundary)
                    .is_some_and(|b| b.requires_interaction())
            })
            .filter_map(|seg| {
                let (t_surf, t_travel) = seg.intersect(old_pos, new_pos)?;
                if leaving_surface(seg.normal(t_surf), &part.vel, t_travel) {
                    return None;
                }
                SurfaceHit::new(t_travel, seg.id, t_surf).ok()
            })
            .min()
    }

    /// Apply the boundary material at `hit`. Returns `false` if the particle is absorbed.
    fn interact(&self, part: &mut Particle, hit: SurfaceHit, tally: &mut SurfaceTally) -> bool {
        let geometry = self.domain.geometry();
        let Some(seg) = geometry.segment(hit.segment) else {
            return true;
        };
        let t_surf = hit.t_surf_f64();
        let spline_t = seg.index as f64 + t_surf;
        let boundary = geometry.boundary(seg.boundary);
        let alive = boundary
            .and_then(|b| b.material_at(spline_t))
            .map(|m| m.on_impact(&mut part.vel, self.species, seg, t_surf))
            .unwrap_or(false);

        tally.deposit_momentum(seg.boundary, spline_t, &part.vel, part.spwt);
        if !alive {
            tally.deposit_mass(seg.boundary, spline_t, part.spwt);
        }
        alive
    }

    /// Pass a particle sitting on a MESH face to the first neighbour containing it.
    fn hand_over(
        &self,
        mesh: &dyn Mesh,
        part: &mut Particle,
        face: Face,
        index: usize,
    ) -> ParticleFate {
        let pos = part.pos2();
        let target = mesh
            .neighbors(face, index)
            .iter()
            .filter(|&&id| id != mesh.id())
            .filter_map(|&id| self.domain.mesh(id))
            .find(|m| m.contains_pos(pos) || near_mesh(*m, pos));
        match target {
            Some(next) => {
                let mut lc = next.to_logical(pos);
                clamp_logical(next, &mut lc);
                let landed = next.to_physical(lc);
                part.pos[0] = landed[0];
                part.pos[1] = landed[1];
                part.lc = Some(lc);
                ParticleFate::Transferred(next.id())
            }
            None => {
                log::warn!(
                    "particle {} left mesh {} through {:?} face at {:?} with no neighbour to receive it",
                    part.id,
                    mesh.id(),
                    face,
                    pos
                );
                ParticleFate::Lost
            }
        }
    }
}

/// Convert out-of-plane displacement `dk` into motion on the radial axis `r_axis` plus an
/// azimuthal rotation, rotating the (radial, out-of-plane) velocity pair to match.
///
/// `dk` carries the sign convention of the domain: positive azimuth for RZ, negated for ZR.
fn rotate_axisymmetric(part: &mut Particle, r_axis: usize, dk: f64) {
    let r = part.pos[r_axis];
    let r_new = (r * r + dk * dk).sqrt();
    part.pos[r_axis] = r_new;
    if r_new == 0.0 {
        return;
    }
    let cos = r / r_new;
    let sin = dk / r_new;
    part.pos[2] += sin.asin();

    let (a, w) = (part.vel[r_axis], part.vel[2]);
    if r_axis == 0 {
        part.vel[0] = cos * a + sin * w;
        part.vel[2] = -sin * a + cos * w;
    } else {
        part.vel[1] = cos * a - sin * w;
        part.vel[2] = sin * a + cos * w;
    }
}

#[inline]
fn outside(mesh: &dyn Mesh, lc: [f64; 2]) -> bool {
    let max_i = (mesh.ni() - 1) as f64;
    let max_j = (mesh.nj() - 1) as f64;
    lc[0] < 0.0 || lc[0] > max_i || lc[1] < 0.0 || lc[1] > max_j
}

/// Logical coordinate of `face` along its axis.
/// Whether `pos` lies within [`HANDOVER_TOL`] cells of `mesh`.
fn near_mesh(mesh: &dyn Mesh, pos: [f64; 2]) -> bool {
    let lc = mesh.to_logical(pos);
    let max_i = (mesh.ni() - 1) as f64;
    let max_j = (mesh.nj() - 1) as f64;
    (-HANDOVER_TOL..=max_i + HANDOVER_TOL).contains(&lc[0])
        && (-HANDOVER_TOL..=max_j + HANDOVER_TOL).contains(&lc[1])
}

#[inline]
fn face_value(mesh: &dyn Mesh, face: Face) -> f64 {
    match face {
        Face::Right => (mesh.ni() - 1) as f64,
        Face::Top => (mesh.nj() - 1) as f64,
        Face::Left | Face::Bottom => 0.0,
    }
}

#[inline]
fn clamp_logical(mesh: &dyn Mesh, lc: &mut [f64; 2]) {
    lc[0] = lc[0].clamp(0.0, (mesh.ni() - 1) as f64);
    lc[1] = lc[1].clamp(0.0, (mesh.nj() - 1) as f64);
}

/// Face crossed first by the travel `old -> new` and the travel fraction at the crossing.
///
/// Faces are compared in [`Face::ALL`] order, so ties go to the earlier face.
pub fn exit_face(mesh: &dyn Mesh, old: [f64; 2], new: [f64; 2]) -> (Face, f64) {
    let mut best = (Face::Right, NO_EXIT);
    for face in Face::ALL {
        let axis = face.axis();
        let limit = face_value(mesh, face);
        let crossed = match face {
            Face::Right | Face::Top => new[axis] > limit,
            Face::Left | Face::Bottom => new[axis] < limit,
        };
        if !crossed {
            continue;
        }
        let d = new[axis] - old[axis];
        let t = if d != 0.0 {
            ((limit - old[axis]) / d).clamp(0.0, 1.0)
        } else {
            0.0
        };
        if t < best.1 {
            best = (face, t);
        }
    }
    best
}

/// Move a particle sitting on `face` to the opposite face and return its new logical
/// coordinate.
fn wrap_periodic(mesh: &dyn Mesh, part: &mut Particle, face: Face) -> [f64; 2] {
    let (lo, hi) = mesh.bounds();
    let axis = face.axis();
    let extent = hi[axis] - lo[axis];
    match face {
        Face::Right | Face::Top => part.pos[axis] -= extent,
        Face::Left | Face::Bottom => part.pos[axis] += extent,
    }
    let mut lc = mesh.to_logical(part.pos2());
    clamp_logical(mesh, &mut lc);
    lc
}
