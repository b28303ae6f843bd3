#![allow(missing_docs)]

//! Particle push, boundary resolution, multi-mesh transfer and moment deposition.

pub mod deposit;
pub mod domain;
pub mod field;
pub mod geometry;
pub mod hit;
pub mod integrator;
pub mod mesh;
pub mod particle;
pub mod resolver;
pub mod source;
pub mod species;
pub mod store;
pub mod trace;
pub mod vector;

pub use deposit::{DepositBuffer, MeshMoments, SurfaceTally};
pub use domain::{Domain, DomainType};
pub use field::{EmFields, Field2D, FieldLookup, UniformField};
pub use geometry::{Absorb, Boundary, Geometry, Segment, SpecularReflect, SurfaceInteraction};
pub use hit::SurfaceHit;
pub use integrator::{update_velocity, FieldSample};
pub use mesh::{Face, Mesh, MeshId, NodeType, UniformMesh};
pub use particle::Particle;
pub use resolver::{ParticleFate, Resolver};
pub use source::MaxwellianSource;
pub use species::{KineticSpecies, SpeciesParams, StepContext, StepReport};
pub use store::{BlockCursor, MeshStore, ParticleBlock, StoreCursor};
pub use trace::{ParticleTracer, TraceLog, TraceSample};
