//! Volume source emitting drifting Maxwellian particles from a rectangle.

use rand::{rng, rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::config::K_B;
use crate::core::domain::Domain;
use crate::core::particle::Particle;
use crate::core::species::{KineticSpecies, StepContext};
use crate::error::{Error, Result};

/// Per-component thermal spread `sqrt(kT/m)` for temperature `t_kelvin`.
pub fn thermal_speed(t_kelvin: f64, mass: f64) -> f64 {
    (K_B * t_kelvin / mass).sqrt()
}

#[derive(Debug, Clone)]
pub struct MaxwellianSource {
    x0: [f64; 2],
    x1: [f64; 2],
    drift: [f64; 3],
    /// Particles emitted per call to [`emit`](Self::emit).
    count: usize,
    normal: Normal<f64>,
    rng: StdRng,
}

impl MaxwellianSource {
    /// Source over the rectangle `[x0, x1)` with drift velocity `drift` and per-component
    /// thermal spread `v_th`. A `seed` makes emission reproducible.
    ///
    /// Errors:
    /// - `Error::InvalidParam` for an empty rectangle, a negative or non-finite spread, or a
    ///   non-finite drift.
    pub fn new(
        x0: [f64; 2],
        x1: [f64; 2],
        drift: [f64; 3],
        v_th: f64,
        count: usize,
        seed: Option<u64>,
    ) -> Result<Self> {
        if !(x0[0] < x1[0] && x0[1] < x1[1]) {
            return Err(Error::InvalidParam(format!(
                "source region {x0:?} -> {x1:?} is empty"
            )));
        }
        if !drift.iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidParam("source drift must be finite".into()));
        }
        let normal = Normal::new(0.0, v_th)
            .map_err(|e| Error::InvalidParam(format!("thermal spread {v_th}: {e}")))?;
        let rng: StdRng = match seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };
        Ok(Self {
            x0,
            x1,
            drift,
            count,
            normal,
            rng,
        })
    }

    /// Draw one position / velocity pair.
    pub fn sample(&mut self) -> ([f64; 3], [f64; 3]) {
        let pos = [
            self.rng.random_range(self.x0[0]..self.x1[0]),
            self.rng.random_range(self.x0[1]..self.x1[1]),
            0.0,
        ];
        let mut vel = self.drift;
        for v in vel.iter_mut() {
            *v += self.normal.sample(&mut self.rng);
        }
        (pos, vel)
    }

    /// Insert `count` particles into `species`. Returns how many landed inside a mesh.
    pub fn emit(
        &mut self,
        species: &mut KineticSpecies,
        domain: &Domain,
        ctx: &StepContext<'_>,
    ) -> Result<usize> {
        let spwt = species.params().spwt0;
        let mass = species.params().mass;
        let mut inserted = 0;
        for _ in 0..self.count {
            let (pos, vel) = self.sample();
            if species.insert(domain, ctx, Particle::new(pos, vel, spwt, mass)?)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
