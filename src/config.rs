//! Resolution parameters.
//!
//! Every struct deserializes with per-field defaults, so a JSON file only
//! needs to name the values it overrides.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::{NccError, Result};

pub const SEP_THRESHOLD: i64 = 20_000_000;
pub const MAX_CONTACTS: usize = 5_000_000;
pub const PRIMARY_LIMIT: f64 = 3.0;

/// Binning and loading limits.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct IndexParams {
    /// Bin size, and the distance below which two contact ends are "local".
    pub sep_threshold: i64,
    pub max_contacts: Option<usize>,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            sep_threshold: SEP_THRESHOLD,
            max_contacts: Some(MAX_CONTACTS),
        }
    }
}

/// Cleanup pass: dense inter-homolog bins, then isolated unambiguous contacts.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CleanParams {
    /// Network score below which an unambiguous contact counts as isolated.
    pub threshold: f64,
    /// Percentile of same-root bin occupancy used as the density ceiling.
    pub homo_trans_dens_quant: f64,
}

impl Default for CleanParams {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            homo_trans_dens_quant: 90.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ResolveParams {
    pub score_threshold: f64,
    pub min_trans_relay: f64,
    pub remove_isolated: bool,
    pub remove_pos_ambig: bool,
}

impl Default for ResolveParams {
    fn default() -> Self {
        Self {
            score_threshold: 2.0,
            min_trans_relay: 5.0,
            remove_isolated: false,
            remove_pos_ambig: false,
        }
    }
}

impl ResolveParams {
    pub fn permissive() -> Self {
        Self {
            score_threshold: 5.0,
            ..Self::default()
        }
    }

    pub fn strict_final() -> Self {
        Self {
            remove_isolated: true,
            ..Self::default()
        }
    }
}

/// Cleanup followed by successive resolution passes.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub index: IndexParams,
    pub clean: CleanParams,
    pub passes: Vec<ResolveParams>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index: IndexParams::default(),
            clean: CleanParams::default(),
            passes: vec![
                ResolveParams::permissive(),
                ResolveParams::default(),
                ResolveParams::strict_final(),
            ],
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: PipelineConfig = serde_json::from_reader(reader)
            .map_err(|e| NccError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.index.validate()?;
        self.clean.validate()?;
        if self.passes.is_empty() {
            return Err(NccError::config("at least one resolution pass is required"));
        }
        for pass in &self.passes {
            pass.validate()?;
        }
        Ok(())
    }
}

impl IndexParams {
    pub fn validate(&self) -> Result<()> {
        if self.sep_threshold <= 0 {
            return Err(NccError::config(format!(
                "separation threshold must be positive, got {}",
                self.sep_threshold
            )));
        }
        Ok(())
    }
}

impl CleanParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.homo_trans_dens_quant) {
            return Err(NccError::config(format!(
                "density percentile must be within [0, 100], got {}",
                self.homo_trans_dens_quant
            )));
        }
        Ok(())
    }
}

impl ResolveParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.score_threshold > 0.0) {
            return Err(NccError::config(format!(
                "score threshold must be positive, got {}",
                self.score_threshold
            )));
        }
        if self.min_trans_relay.is_nan() {
            return Err(NccError::config("trans relay minimum must be a number"));
        }
        Ok(())
    }
}
