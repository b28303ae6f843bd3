//! Particle-in-cell push engine: moves kinetic macro-particles through electromagnetic
//! fields over one or more structured 2-D meshes, resolves their collisions with boundary
//! geometry, hands them between neighbouring meshes and deposits their moments back onto
//! node fields.

pub mod config;
pub mod core;
pub mod error;

#[cfg(feature = "python")]
mod python;
