use std::io::Read;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::bs::OptionType;
use crate::models::heston::heston_model::HestonParameters;

/// One calibration target: an implied volatility quoted for (expiry, strike).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySurfacePoint {
    pub expiry: NaiveDate,
    pub strike: f64,
    /// Implied volatility as a decimal, e.g. 0.3565
    pub implied_vol: f64,
}

/// Calibration targets ordered by expiry then strike, without duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<VolatilitySurfacePoint>", into = "Vec<VolatilitySurfacePoint>")]
pub struct VolatilitySurface {
    points: Vec<VolatilitySurfacePoint>,
}

impl VolatilitySurface {
    /// Sorts the points and rejects duplicates or invalid quotes.
    ///
    /// An empty collection is accepted here; the calibrator rejects it with
    /// `InsufficientData` when asked to fit it.
    pub fn new(mut points: Vec<VolatilitySurfacePoint>) -> Result<Self> {
        for p in &points {
            if !p.strike.is_finite() || p.strike <= 0.0 {
                return Err(Error::market(format!(
                    "strike must be > 0 (expiry {}, strike {})",
                    p.expiry, p.strike
                )));
            }
            if !p.implied_vol.is_finite() || p.implied_vol <= 0.0 {
                return Err(Error::market(format!(
                    "implied vol must be > 0 (expiry {}, strike {}, vol {})",
                    p.expiry, p.strike, p.implied_vol
                )));
            }
        }

        points.sort_by(|a, b| {
            a.expiry
                .cmp(&b.expiry)
                .then(a.strike.partial_cmp(&b.strike).unwrap_or(std::cmp::Ordering::Equal))
        });

        for pair in points.windows(2) {
            if pair[0].expiry == pair[1].expiry && pair[0].strike == pair[1].strike {
                return Err(Error::market(format!(
                    "duplicate quote for expiry {} and strike {}",
                    pair[0].expiry, pair[0].strike
                )));
            }
        }

        Ok(Self { points })
    }

    /// Builds a surface from a rectangular grid: `vols[i][j]` is the implied
    /// vol for `expiries[i]` and `strikes[j]`.
    pub fn from_grid(expiries: &[NaiveDate], strikes: &[f64], vols: &[Vec<f64>]) -> Result<Self> {
        if vols.len() != expiries.len() {
            return Err(Error::market(format!(
                "vol grid has {} rows for {} expiries",
                vols.len(),
                expiries.len()
            )));
        }

        let mut points = Vec::with_capacity(expiries.len() * strikes.len());
        for (expiry, row) in expiries.iter().zip(vols) {
            if row.len() != strikes.len() {
                return Err(Error::market(format!(
                    "vol row for {} has {} entries for {} strikes",
                    expiry,
                    row.len(),
                    strikes.len()
                )));
            }
            for (&strike, &implied_vol) in strikes.iter().zip(row) {
                points.push(VolatilitySurfacePoint {
                    expiry: *expiry,
                    strike,
                    implied_vol,
                });
            }
        }
        Self::new(points)
    }

    /// Reads `expiry,strike,implied_vol` rows (with header) from CSV.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut points = Vec::new();
        for (line, record) in csv_reader.deserialize().enumerate() {
            let point: VolatilitySurfacePoint = record.map_err(|e| {
                Error::market(format!("malformed surface row {}: {}", line + 1, e))
            })?;
            points.push(point);
        }
        Self::new(points)
    }

    pub fn points(&self) -> &[VolatilitySurfacePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl TryFrom<Vec<VolatilitySurfacePoint>> for VolatilitySurface {
    type Error = Error;

    fn try_from(points: Vec<VolatilitySurfacePoint>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<VolatilitySurface> for Vec<VolatilitySurfacePoint> {
    fn from(surface: VolatilitySurface) -> Self {
        surface.points
    }
}

/// Model calibrator trait for parameter optimization
pub trait ModelCalibrator: Send + Sync {
    /// Returns the name of the model (e.g., "heston")
    fn model_name(&self) -> &str;

    /// How many parameters are in the model's optimization vector
    fn param_count(&self) -> usize;

    /// Returns the vector of (min, max) bounds for each parameter
    fn param_bounds(&self) -> &[(f64, f64)];

    /// Given a parameter vector `x`, returns the objective value.
    ///
    /// Must be a pure function of `x`: the optimizers call it concurrently.
    fn evaluate_objective(&self, x: &[f64]) -> f64;

    /// Returns parameter names in the order they appear in the optimization vector
    fn param_names(&self) -> Vec<&str>;
}

/// Outcome of the optimizer's own termination criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalibrationStatus {
    Converged,
    /// Best-effort parameters are still returned.
    NotConverged { reason: String },
}

/// Model vs market comparison for one surface point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteFit {
    pub expiry: NaiveDate,
    pub strike: f64,
    /// Out-of-the-money side used for the helper
    pub option_type: OptionType,
    pub market_vol: f64,
    pub market_price: f64,
    pub model_price: f64,
    /// Black-Scholes implied vol of the model price, when it can be inverted
    pub model_vol: Option<f64>,
    /// Helper calibration error (relative or absolute, per configuration)
    pub error: f64,
}

/// Fitted parameters plus everything a caller needs to accept or reject them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub params: HestonParameters,
    /// Objective value at `params`
    pub residual: f64,
    pub status: CalibrationStatus,
    /// Objective evaluations spent by the optimizer
    pub evaluations: usize,
    pub quotes: Vec<QuoteFit>,
}

impl CalibrationResult {
    pub fn is_converged(&self) -> bool {
        matches!(self.status, CalibrationStatus::Converged)
    }

    /// Accepts the fit only if its residual is at or below `tolerance`.
    pub fn ensure_residual_below(&self, tolerance: f64) -> Result<&Self> {
        if self.residual.is_finite() && self.residual <= tolerance {
            Ok(self)
        } else {
            Err(Error::CalibrationNonConvergence {
                residual: self.residual,
                tolerance,
                evaluations: self.evaluations,
            })
        }
    }
}
