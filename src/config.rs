//! Run configuration loaded from JSON, plus the physical constants it refers to.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::domain::DomainType;
use crate::core::resolver::DEFAULT_MAX_BOUNCES;
use crate::error::{Error, Result};

/// Atomic mass unit (kg).
pub const AMU: f64 = 1.660_539_066_60e-27;
/// Elementary charge (C).
pub const QE: f64 = 1.602_176_634e-19;
/// Boltzmann constant (J/K).
pub const K_B: f64 = 1.380_649e-23;

/// One kinetic species.
///
/// - `molwt`: molecular weight in atomic mass units
/// - `charge`: charge in units of the elementary charge
/// - `spwt`: default specific weight of inserted particles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesConfig {
    pub name: String,
    pub molwt: f64,
    #[serde(default)]
    pub charge: f64,
    pub spwt: f64,
}

impl SpeciesConfig {
    /// Mass of one physical particle (kg).
    pub fn mass(&self) -> f64 {
        self.molwt * AMU
    }

    /// Charge of one physical particle (C).
    pub fn charge_coulomb(&self) -> f64 {
        self.charge * QE
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidParam("species name must not be empty".into()));
        }
        if !self.molwt.is_finite() || self.molwt <= 0.0 {
            return Err(Error::InvalidParam(format!(
                "species '{}': molwt must be finite and > 0",
                self.name
            )));
        }
        if !self.charge.is_finite() {
            return Err(Error::InvalidParam(format!(
                "species '{}': charge must be finite",
                self.name
            )));
        }
        if !self.spwt.is_finite() || self.spwt <= 0.0 {
            return Err(Error::InvalidParam(format!(
                "species '{}': spwt must be finite and > 0",
                self.name
            )));
        }
        Ok(())
    }
}

/// Tuning of the particle push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Live (and inbox) blocks per mesh.
    pub num_blocks: usize,
    /// Surface or face interactions allowed per particle per step.
    pub max_bounces: usize,
    /// Transfer rounds per step before remaining hand-overs are frozen in place.
    pub max_transfer_rounds: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            num_blocks: rayon::current_num_threads().max(1),
            max_bounces: DEFAULT_MAX_BOUNCES,
            max_transfer_rounds: 4,
        }
    }
}

impl PushConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_blocks == 0 {
            return Err(Error::InvalidParam("num_blocks must be >= 1".into()));
        }
        if self.max_bounces == 0 {
            return Err(Error::InvalidParam("max_bounces must be >= 1".into()));
        }
        if self.max_transfer_rounds == 0 {
            return Err(Error::InvalidParam(
                "max_transfer_rounds must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Top-level run description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Time step (s).
    pub dt: f64,
    #[serde(default)]
    pub domain_type: DomainType,
    #[serde(default)]
    pub push: PushConfig,
    pub species: Vec<SpeciesConfig>,
}

impl RunConfig {
    /// Parse and validate.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(Error::InvalidParam("dt must be finite and > 0".into()));
        }
        self.push.validate()?;
        for species in &self.species {
            species.validate()?;
        }
        let mut names: Vec<&str> = self.species.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::InvalidParam(format!(
                "duplicate species name '{}'",
                w[0]
            )));
        }
        Ok(())
    }
}
