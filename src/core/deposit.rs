//! Moment deposition: per-worker buffers, their reduction and the final normalisation.

use crate::core::field::Field2D;
use crate::core::geometry::{BoundaryId, Geometry};
use crate::core::mesh::{Mesh, MeshId};
use crate::core::particle::Particle;
use crate::error::{Error, Result};

/// Density and mean in-plane velocity on the nodes of one mesh.
///
/// While a step is running the fields hold raw sums (`Σ w`, `Σ w·vx`, `Σ w·vy`);
/// [`finalize`](Self::finalize) turns them into number density and mean velocity.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshMoments {
    pub den: Field2D,
    pub u: Field2D,
    pub v: Field2D,
}

impl MeshMoments {
    pub fn for_mesh(mesh: &dyn Mesh) -> Self {
        Self {
            den: Field2D::for_mesh(mesh),
            u: Field2D::for_mesh(mesh),
            v: Field2D::for_mesh(mesh),
        }
    }

    pub fn clear(&mut self) {
        self.den.clear();
        self.u.clear();
        self.v.clear();
    }

    #[inline]
    pub fn scatter(&mut self, lc: [f64; 2], particle: &Particle) {
        self.den.scatter(lc, particle.spwt);
        self.u.scatter(lc, particle.spwt * particle.vel[0]);
        self.v.scatter(lc, particle.spwt * particle.vel[1]);
    }

    pub fn merge(&mut self, other: &MeshMoments) -> Result<()> {
        self.den.add_assign(&other.den)?;
        self.u.add_assign(&other.u)?;
        self.v.add_assign(&other.v)?;
        Ok(())
    }

    /// Mean velocity from the momentum sums, then density from the weight sum.
    pub fn finalize(&mut self, mesh: &dyn Mesh) -> Result<()> {
        self.u.divide_by(&self.den)?;
        self.v.divide_by(&self.den)?;
        self.den.scale_by_volume(mesh);
        Ok(())
    }
}

/// Momentum flux and mass deposit along every boundary, tallied on the boundary's
/// segment endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceTally {
    momentum: Vec<Vec<[f64; 3]>>,
    mass: Vec<Vec<f64>>,
}

impl SurfaceTally {
    pub fn for_geometry(geometry: &Geometry) -> Self {
        let nodes: Vec<usize> = geometry.boundaries().iter().map(|b| b.num_nodes()).collect();
        Self {
            momentum: nodes.iter().map(|&n| vec![[0.0; 3]; n]).collect(),
            mass: nodes.iter().map(|&n| vec![0.0; n]).collect(),
        }
    }

    /// Linear weights onto the two endpoints of the segment containing spline parameter `t`.
    #[inline]
    fn weights(nodes: usize, t: f64) -> (usize, f64) {
        let last = nodes.saturating_sub(2);
        let i = (t.max(0.0).floor() as usize).min(last);
        (i, (t - i as f64).clamp(0.0, 1.0))
    }

    /// Add `spwt · vel` at spline parameter `t` of `boundary`.
    pub fn deposit_momentum(&mut self, boundary: BoundaryId, t: f64, vel: &[f64; 3], spwt: f64) {
        let Some(nodes) = self.momentum.get_mut(boundary) else {
            return;
        };
        let (i, f) = Self::weights(nodes.len(), t);
        for k in 0..3 {
            nodes[i][k] += (1.0 - f) * spwt * vel[k];
            nodes[i + 1][k] += f * spwt * vel[k];
        }
    }

    /// Add `spwt` of stuck particles at spline parameter `t` of `boundary`.
    pub fn deposit_mass(&mut self, boundary: BoundaryId, t: f64, spwt: f64) {
        let Some(nodes) = self.mass.get_mut(boundary) else {
            return;
        };
        let (i, f) = Self::weights(nodes.len(), t);
        nodes[i] += (1.0 - f) * spwt;
        nodes[i + 1] += f * spwt;
    }

    pub fn momentum(&self, boundary: BoundaryId) -> Option<&[[f64; 3]]> {
        self.momentum.get(boundary).map(Vec::as_slice)
    }

    pub fn mass(&self, boundary: BoundaryId) -> Option<&[f64]> {
        self.mass.get(boundary).map(Vec::as_slice)
    }

    pub fn total_mass(&self) -> f64 {
        self.mass.iter().flatten().sum()
    }

    pub fn clear(&mut self) {
        self.momentum.iter_mut().flatten().for_each(|m| *m = [0.0; 3]);
        self.mass.iter_mut().flatten().for_each(|m| *m = 0.0);
    }

    pub fn scale(&mut self, factor: f64) {
        self.momentum
            .iter_mut()
            .flatten()
            .flat_map(|m| m.iter_mut())
            .for_each(|c| *c *= factor);
        self.mass.iter_mut().flatten().for_each(|m| *m *= factor);
    }

    /// Errors:
    /// - `Error::InvalidParam` if the tallies cover different geometries.
    pub fn merge(&mut self, other: &SurfaceTally) -> Result<()> {
        let same_shape = self.mass.len() == other.mass.len()
            && self
                .mass
                .iter()
                .zip(other.mass.iter())
                .all(|(a, b)| a.len() == b.len());
        if !same_shape {
            return Err(Error::InvalidParam("surface tally shape mismatch".into()));
        }
        for (a, b) in self.momentum.iter_mut().zip(other.momentum.iter()) {
            for (x, y) in a.iter_mut().zip(b.iter()) {
                for k in 0..3 {
                    x[k] += y[k];
                }
            }
        }
        for (a, b) in self.mass.iter_mut().zip(other.mass.iter()) {
            for (x, y) in a.iter_mut().zip(b.iter()) {
                *x += y;
            }
        }
        Ok(())
    }
}

/// Everything one worker deposits while moving one block.
#[derive(Debug, Clone)]
pub struct DepositBuffer {
    pub mesh: MeshId,
    pub moments: MeshMoments,
    pub surface: SurfaceTally,
    /// Running `Σ spwt·|v|²` of settled particles.
    pub momentum_sum: f64,
}

impl DepositBuffer {
    pub fn new(mesh: &dyn Mesh, geometry: &Geometry) -> Self {
        Self {
            mesh: mesh.id(),
            moments: MeshMoments::for_mesh(mesh),
            surface: SurfaceTally::for_geometry(geometry),
            momentum_sum: 0.0,
        }
    }

    /// Deposit a particle that finished its step at logical coordinate `lc`.
    #[inline]
    pub fn deposit(&mut self, lc: [f64; 2], particle: &Particle) {
        self.moments.scatter(lc, particle);
        self.momentum_sum += particle.spwt * particle.speed2();
    }
}
