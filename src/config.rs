//! Configuration file parser for reconstruction runs

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::projector::ProjectorConfig;
use crate::signal::PhaseSignal;
use crate::volume::Sampling;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Ray-march increment in mm
    #[serde(default = "default_step_size")]
    pub step_size: f64,

    /// Grid-corner sampling convention (hardware-interpolation semantics);
    /// off means grid-center
    #[serde(default = "default_corner_sampling")]
    pub corner_sampling: bool,

    /// First projection index of the requested sub-range
    #[serde(default)]
    pub first_projection: usize,

    /// Number of projections to process; the whole stack when absent
    #[serde(default)]
    pub n_projections: Option<usize>,

    /// Motion compensation; 3D reconstruction when absent
    pub fourd: Option<FourD>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct FourD {
    /// Whitespace-separated phase values, one per projection
    pub signal_file: PathBuf,

    /// Number of frames in the deformation sequence
    pub frames: usize,
}

fn default_step_size() -> f64 { 1.0 }
fn default_corner_sampling() -> bool { true }

impl Config {
    pub fn sampling(&self) -> Sampling {
        if self.corner_sampling { Sampling::GridCorner } else { Sampling::GridCenter }
    }

    pub fn projector(&self) -> Result<ProjectorConfig> {
        let config = ProjectorConfig { step_size: self.step_size, sampling: self.sampling() };
        config.validate()?;
        Ok(config)
    }

    /// Projection sub-range as `(first, count)`; covers a whole stack of
    /// `n_projections` when no count is configured
    pub fn sub_range(&self, n_projections: usize) -> (usize, usize) {
        (self.first_projection, self.n_projections.unwrap_or(n_projections))
    }

    /// Load the phase signal and frame count of the 4D table, when motion
    /// compensation is configured
    pub fn load_motion(&self) -> Result<Option<(PhaseSignal, usize)>> {
        match &self.fourd {
            None => Ok(None),
            Some(fourd) => {
                let signal = PhaseSignal::from_file(&fourd.signal_file)?;
                Ok(Some((signal, fourd.frames)))
            }
        }
    }
}

pub fn read_config_file(path: PathBuf) -> Result<Config> {
    let text = fs::read_to_string(&path)
        .map_err(|e| Error::config(format!("could not read config file {path:?}: {e}")))?;
    toml::from_str(&text).map_err(|e| Error::config(format!("could not parse config file {path:?}: {e}")))
}
