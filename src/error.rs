//! Structured error type shared by the calibrator, the path simulator and the
//! payoff evaluator.
//!
//! Every variant carries enough context (parameter name, date, path index,
//! counts) for a caller to act on it without parsing the message.

use chrono::NaiveDate;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A calibration bound is empty, non-finite or outside the admissible domain.
    #[error("invalid bounds for {parameter}: ({min}, {max}) - {reason}")]
    InvalidBounds {
        parameter: &'static str,
        min: f64,
        max: f64,
        reason: String,
    },

    /// Not enough market data to run the requested operation.
    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    /// Market inputs (spot, quotes, curves) failed validation.
    #[error("invalid market data: {reason}")]
    InvalidMarketData { reason: String },

    /// A model parameter is outside its domain.
    #[error("invalid parameter {parameter} = {value}: {reason}")]
    InvalidParameters {
        parameter: &'static str,
        value: f64,
        reason: String,
    },

    /// The simulation grid is too short, unordered or misaligned with a path.
    #[error("invalid grid: {reason}")]
    InvalidGrid {
        reason: String,
        index: Option<usize>,
    },

    /// Requested number of Monte Carlo paths is not positive.
    #[error("invalid path count {requested}: at least one path is required")]
    InvalidPathCount { requested: usize },

    /// The product description violates a barrier or schedule invariant.
    #[error("invalid product: {reason}")]
    InvalidProduct { reason: String },

    /// A coupon date on or before the valuation date has no recorded fixing.
    #[error("missing past fixing for observation date {date}")]
    MissingFixing { date: NaiveDate },

    /// Too many paths produced non-finite values.
    #[error(
        "numerical divergence: {anomalous} of {total} paths were anomalous \
         (first at path {first_path}): {reason}"
    )]
    NumericalDivergence {
        anomalous: usize,
        total: usize,
        first_path: usize,
        reason: String,
    },

    /// The calibration residual is above the caller's acceptance threshold.
    #[error(
        "calibration did not converge: residual {residual:.6e} > tolerance {tolerance:.6e} \
         after {evaluations} evaluations"
    )]
    CalibrationNonConvergence {
        residual: f64,
        tolerance: f64,
        evaluations: usize,
    },

    /// A configuration value is inconsistent.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl Error {
    pub(crate) fn grid(reason: impl Into<String>) -> Self {
        Error::InvalidGrid {
            reason: reason.into(),
            index: None,
        }
    }

    pub(crate) fn grid_at(index: usize, reason: impl Into<String>) -> Self {
        Error::InvalidGrid {
            reason: reason.into(),
            index: Some(index),
        }
    }

    pub(crate) fn market(reason: impl Into<String>) -> Self {
        Error::InvalidMarketData {
            reason: reason.into(),
        }
    }

    pub(crate) fn product(reason: impl Into<String>) -> Self {
        Error::InvalidProduct {
            reason: reason.into(),
        }
    }
}
