//! File-level configuration tying the calibrator, the simulator and the
//! payoff evaluator together.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::calibration::config::OptimizationConfig;
use crate::error::Error;
use crate::model_params::HestonModelParams;
use crate::models::heston::heston_calibrator::HestonParamBounds;
use crate::products::engine::MonteCarloEngine;
use crate::products::valuation::AnomalyPolicy;
use crate::simulation::path_simulator::SimulationConfig;

/// Everything `value_note` needs besides market data and the note itself.
///
/// Every section is optional in TOML; missing sections take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    pub optimization: OptimizationConfig,
    pub bounds: HestonParamBounds,
    pub model: HestonModelParams,
    pub simulation: SimulationConfig,
    pub anomaly_policy: AnomalyPolicy,
}

impl ValuationConfig {
    pub fn production() -> Self {
        Self {
            optimization: OptimizationConfig::production(),
            simulation: SimulationConfig::production(),
            ..Self::default()
        }
    }

    pub fn fast() -> Self {
        Self {
            optimization: OptimizationConfig::fast(),
            simulation: SimulationConfig::fast(),
            ..Self::default()
        }
    }

    pub fn research() -> Self {
        Self {
            optimization: OptimizationConfig::research(),
            simulation: SimulationConfig::research(),
            ..Self::default()
        }
    }

    pub fn minimal() -> Self {
        Self {
            optimization: OptimizationConfig::minimal(),
            simulation: SimulationConfig::minimal(),
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).context("failed to parse valuation config")?;
        config.validate().context("invalid valuation config")?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in config file {}", path.display()))
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        self.bounds.validate()?;
        self.simulation.validate()?;
        let fraction = self.anomaly_policy.max_excluded_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(Error::Config {
                reason: format!("max_excluded_fraction must lie in [0, 1], got {fraction}"),
            });
        }
        Ok(())
    }

    pub fn engine(&self) -> MonteCarloEngine {
        MonteCarloEngine::new(self.simulation, self.anomaly_policy)
    }
}
