//! Particle tracing hook.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::core::particle::Particle;

/// Records the trajectory of selected particles.
///
/// `record` is called from worker threads after every bounce a traced particle survives.
pub trait ParticleTracer: Sync {
    /// Whether a particle inserted with `id` should be traced.
    fn is_traced(&self, id: u64) -> bool;

    fn record(&self, particle: &Particle, iteration: u64);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSample {
    pub id: u64,
    pub iteration: u64,
    pub pos: [f64; 3],
    pub vel: [f64; 3],
}

/// In-memory tracer for a fixed set of particle ids.
#[derive(Debug, Default)]
pub struct TraceLog {
    ids: HashSet<u64>,
    samples: Mutex<Vec<TraceSample>>,
}

impl TraceLog {
    pub fn new(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Samples grouped by particle id, each particle's samples in recording order.
    pub fn samples(&self) -> Vec<TraceSample> {
        let mut out = match self.samples.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        out.sort_by_key(|s| s.id);
        out
    }
}

impl ParticleTracer for TraceLog {
    fn is_traced(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    fn record(&self, particle: &Particle, iteration: u64) {
        let sample = TraceSample {
            id: particle.id,
            iteration,
            pos: particle.pos,
            vel: particle.vel,
        };
        match self.samples.lock() {
            Ok(mut guard) => guard.push(sample),
            Err(poisoned) => poisoned.into_inner().push(sample),
        }
    }
}
