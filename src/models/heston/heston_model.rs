// src/models/heston/heston_model.rs

//! Heston stochastic volatility model parameters
//!
//! Under the risk-neutral measure the spot and its instantaneous variance follow
//!
//! dS = (r - q) S dt + sqrt(v) S dW1
//! dv = κ(θ - v) dt + σ sqrt(v) dW2,      d<W1, W2> = ρ dt
//!
//! with
//! - v0: initial variance
//! - κ (kappa): mean-reversion speed
//! - θ (theta): long-run variance
//! - σ (sigma): volatility of variance
//! - ρ (rho): spot/variance correlation
//!
//! The Feller condition 2κθ ≥ σ² is reported but never enforced: every
//! simulation scheme in this crate keeps the variance it feeds back into the
//! dynamics non-negative either way.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of calibrated Heston parameters.
pub const HESTON_PARAM_COUNT: usize = 5;

/// Parameter names in optimization-vector order.
pub const HESTON_PARAM_NAMES: [&str; HESTON_PARAM_COUNT] = ["v0", "kappa", "theta", "sigma", "rho"];

/// Calibrated Heston parameters. Immutable once produced by the calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HestonParameters {
    /// Initial variance
    pub v0: f64,
    /// Mean-reversion speed
    pub kappa: f64,
    /// Long-run variance
    pub theta: f64,
    /// Volatility of variance
    pub sigma: f64,
    /// Spot/variance correlation, in [-1, 1]
    pub rho: f64,
}

fn validate_positive(parameter: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::InvalidParameters {
            parameter,
            value,
            reason: "must be > 0 and finite".to_string(),
        });
    }
    Ok(())
}

/// Shared validation for constructors and trial vectors.
fn validate_heston_params(v0: f64, kappa: f64, theta: f64, sigma: f64, rho: f64) -> Result<()> {
    validate_positive("v0", v0)?;
    validate_positive("kappa", kappa)?;
    validate_positive("theta", theta)?;
    validate_positive("sigma", sigma)?;
    if !rho.is_finite() || !(-1.0..=1.0).contains(&rho) {
        return Err(Error::InvalidParameters {
            parameter: "rho",
            value: rho,
            reason: "must lie in [-1, 1]".to_string(),
        });
    }
    Ok(())
}

impl HestonParameters {
    /// Creates validated parameters.
    pub fn new(v0: f64, kappa: f64, theta: f64, sigma: f64, rho: f64) -> Result<Self> {
        validate_heston_params(v0, kappa, theta, sigma, rho)?;
        Ok(Self {
            v0,
            kappa,
            theta,
            sigma,
            rho,
        })
    }

    /// Builds parameters from an optimization vector `[v0, kappa, theta, sigma, rho]`.
    pub fn from_slice(x: &[f64]) -> Result<Self> {
        if x.len() != HESTON_PARAM_COUNT {
            return Err(Error::InsufficientData {
                reason: format!(
                    "expected {} Heston parameters, got {}",
                    HESTON_PARAM_COUNT,
                    x.len()
                ),
            });
        }
        Self::new(x[0], x[1], x[2], x[3], x[4])
    }

    /// Optimization-vector representation `[v0, kappa, theta, sigma, rho]`.
    pub fn to_array(&self) -> [f64; HESTON_PARAM_COUNT] {
        [self.v0, self.kappa, self.theta, self.sigma, self.rho]
    }

    /// Validates the current parameter set.
    pub fn validate(&self) -> Result<()> {
        validate_heston_params(self.v0, self.kappa, self.theta, self.sigma, self.rho)
    }

    /// `2κθ - σ²`; non-negative when the Feller condition holds.
    pub fn feller_margin(&self) -> f64 {
        2.0 * self.kappa * self.theta - self.sigma * self.sigma
    }

    pub fn satisfies_feller(&self) -> bool {
        self.feller_margin() >= 0.0
    }
}
