use crate::core::mesh::Mesh;
use crate::error::{Error, Result};

/// Spatial components carried per particle (two in-plane plus one out-of-plane).
pub const DIM: usize = 3;

/// A kinetic macro-particle.
///
/// Fields:
/// - `id`: unique per species, assigned at insertion and never reused
/// - `pos`: position [x, y, k]; `k` is z for planar domains and the azimuth for RZ/ZR
/// - `vel`: velocity [vx, vy, vk]
/// - `spwt`: specific weight, number of physical particles represented (> 0)
/// - `mass`: mass of one physical particle (> 0)
/// - `lc`: logical coordinate in the owning mesh, `None` until first computed
/// - `dt`: time budget left in the current step (>= 0)
/// - `born_it`: iteration the particle was inserted on
/// - `trace`: whether the trace hook records this particle's bounces
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Species-unique identifier.
    pub id: u64,
    /// Position (x, y, k).
    pub pos: [f64; DIM],
    /// Velocity (vx, vy, vk).
    pub vel: [f64; DIM],
    /// Specific weight (> 0).
    pub spwt: f64,
    /// Physical particle mass (> 0).
    pub mass: f64,
    /// Logical coordinate in the owning mesh.
    pub lc: Option<[f64; 2]>,
    /// Remaining time in the current step.
    pub dt: f64,
    /// Insertion iteration.
    pub born_it: u64,
    /// Trace flag.
    pub trace: bool,
}

impl Particle {
    /// Create a new particle after validating invariants. The id is assigned on insertion.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if `spwt` or `mass` is non-positive or any component is NaN/inf.
    pub fn new(pos: [f64; DIM], vel: [f64; DIM], spwt: f64, mass: f64) -> Result<Self> {
        if !spwt.is_finite() || spwt <= 0.0 {
            return Err(Error::InvalidParam("spwt must be finite and > 0".into()));
        }
        if !mass.is_finite() || mass <= 0.0 {
            return Err(Error::InvalidParam("mass must be finite and > 0".into()));
        }
        if !pos.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        if !vel.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        Ok(Self {
            id: 0,
            pos,
            vel,
            spwt,
            mass,
            lc: None,
            dt: 0.0,
            born_it: 0,
            trace: false,
        })
    }

    /// In-plane position.
    #[inline]
    pub fn pos2(&self) -> [f64; 2] {
        [self.pos[0], self.pos[1]]
    }

    /// Logical coordinate in `mesh`, computed and cached on first use.
    #[inline]
    pub fn logical(&mut self, mesh: &dyn Mesh) -> [f64; 2] {
        match self.lc {
            Some(lc) => lc,
            None => {
                let lc = mesh.to_logical(self.pos2());
                self.lc = Some(lc);
                lc
            }
        }
    }

    /// Squared speed |v|^2.
    #[inline]
    pub fn speed2(&self) -> f64 {
        self.vel.iter().map(|&c| c * c).sum()
    }
}
