//! # autocall-lib: Heston calibration and autocallable note pricing
//!
//! `autocall-lib` prices memory-coupon autocallable notes (Athena / Phoenix)
//! under the Heston stochastic-volatility model. The pipeline has three
//! stages, each usable on its own:
//!
//! 1. **Calibration**: fit [`HestonParameters`] to an implied-volatility
//!    surface with CMA-ES or differential evolution (plus optional L-BFGS-B
//!    polish) against a semi-analytic Fourier pricer.
//! 2. **Simulation**: generate reproducible Heston paths on the note's
//!    observation grid with a variance scheme that stays non-negative even
//!    when the Feller condition fails.
//! 3. **Evaluation**: run the autocall/coupon/protection state machine on
//!    every path and average the discounted payoffs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use autocall_lib::{
//!     build_optimizer, calibrate_heston, default_configs, AutocallableNote, CalibrationParams,
//!     CouponSchedule, DayCount, FlatForward, MonteCarloEngine, PastFixings, ProductSpec,
//!     VolatilitySurface,
//! };
//! use chrono::NaiveDate;
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let today = NaiveDate::from_ymd_opt(2024, 7, 20).unwrap();
//! let curve = FlatForward::new(today, 0.02, DayCount::Actual360)?;
//! let dividends = FlatForward::new(today, 0.028, DayCount::Actual360)?;
//! # let surface: VolatilitySurface = unimplemented!();
//!
//! let optimizer = build_optimizer(&default_configs::fast());
//! let fit = calibrate_heston(
//!     &curve,
//!     &dividends,
//!     79.98,
//!     &surface,
//!     optimizer.as_ref(),
//!     CalibrationParams::default(),
//! )?;
//!
//! let schedule = CouponSchedule::periodic(
//!     NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
//!     NaiveDate::from_ymd_opt(2029, 7, 20).unwrap(),
//!     6,
//! )?;
//! let note = AutocallableNote::new(ProductSpec::phoenix(79.98), schedule)?;
//! let value = MonteCarloEngine::default().price(
//!     &note, &fit.params, 79.98, &curve, &dividends, &PastFixings::new(), today,
//! )?;
//! println!("Phoenix: {:.2}% of notional", value.percent_of_notional());
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Presets
//!
//! - `production()`: High accuracy
//! - `fast()`: Balanced speed/accuracy for development
//! - `research()`: High-precision settings for research
//! - `minimal()`: Quick validation settings

// ================================================================================================
// MODULES
// ================================================================================================

pub mod calibration;
pub mod config;
pub mod error;
pub mod market;
pub mod model_params;
pub mod models;
pub mod products;
pub mod simulation;

// ================================================================================================
// IMPORTS
// ================================================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

// ================================================================================================
// PUBLIC RE-EXPORTS
// ================================================================================================

pub use calibration::{
    build_optimizer,
    config::{CmaEsConfig, DifferentialEvolutionConfig, OptimizationConfig, OptimizerKind},
    types::{
        CalibrationResult, CalibrationStatus, QuoteFit, VolatilitySurface, VolatilitySurfacePoint,
    },
    CmaesOptimizer, DifferentialEvolution, OptimizationOutcome, Optimizer,
};
pub use config::ValuationConfig;
pub use error::{Error, Result};
pub use market::{CouponSchedule, DayCount, FlatForward, YieldCurve};
pub use model_params::{CalibrationErrorType, CostFunction, HestonModelParams};
pub use models::bs::OptionType;
pub use models::heston::{
    FourierHestonPricer, HestonModelCalibrator, HestonParamBounds, HestonParameters, HestonPricer,
    OptionSpec,
};
pub use products::{
    AnomalyPolicy, AutocallableNote, MonteCarloEngine, NoteStatus, NoteValuation, PastFixings,
    ProductSpec, RedemptionFormula,
};
pub use simulation::{
    PathAnomaly, ScenarioPath, SimulationConfig, SimulationGrid, VarianceScheme,
};

// ================================================================================================
// DEFAULT CONFIGURATIONS
// ================================================================================================

/// Pre-configured optimization settings for common use cases.
///
/// - [`production()`]: Production-grade settings
/// - [`fast()`]: Development-optimized settings
/// - [`research()`]: High-precision settings for research
/// - [`minimal()`]: Quick validation settings
/// - [`differential_evolution()`]: Differential evolution with a 1000
///   generation budget
pub mod default_configs {
    use crate::calibration::config::OptimizationConfig;

    /// Production-grade configuration.
    ///
    /// **Characteristics:**
    /// - CMA-ES with 5 BIPOP restarts, 200k evaluation budget
    /// - L-BFGS-B tolerance: 1e-8
    ///
    /// # Example
    ///
    /// ```rust
    /// use autocall_lib::default_configs;
    ///
    /// let config = default_configs::production();
    /// assert!(config.lbfgsb_enabled);
    /// ```
    pub fn production() -> OptimizationConfig {
        OptimizationConfig::production()
    }

    /// Fast configuration for development and testing.
    ///
    /// **Characteristics:**
    /// - CMA-ES with 2 BIPOP restarts, 20k evaluation budget
    /// - L-BFGS-B tolerance: 1e-6
    pub fn fast() -> OptimizationConfig {
        OptimizationConfig::fast()
    }

    /// High-precision configuration for research and backtesting.
    ///
    /// **Characteristics:**
    /// - CMA-ES with BIPOP and IPOP restarts, 1M evaluation budget
    /// - L-BFGS-B tolerance: 1e-9
    pub fn research() -> OptimizationConfig {
        OptimizationConfig::research()
    }

    /// Minimal configuration for quick validation and debugging.
    ///
    /// **Characteristics:**
    /// - 2k evaluations, no L-BFGS-B polish
    /// - Lower accuracy, suitable for quick checks and unit tests
    pub fn minimal() -> OptimizationConfig {
        OptimizationConfig::minimal()
    }

    /// Differential evolution (best/1/bin, population 15 per parameter).
    pub fn differential_evolution() -> OptimizationConfig {
        OptimizationConfig::differential_evolution()
    }
}

/// Configuration parameters for Heston calibration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Box searched by the optimizer
    pub param_bounds: HestonParamBounds,
    /// Error measure, cost aggregation and pricer settings
    pub model_params: HestonModelParams,
    /// Optional starting point (e.g. yesterday's fit)
    pub initial_guess: Option<HestonParameters>,
}

/// Market inputs shared by the calibration and valuation stages.
#[derive(Clone, Copy)]
pub struct MarketInputs<'a> {
    pub curve: &'a dyn YieldCurve,
    pub dividend_curve: &'a dyn YieldCurve,
    pub spot: f64,
    pub surface: &'a VolatilitySurface,
}

/// Output of [`value_note`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteReport {
    /// `None` when the note was already settled and no calibration ran
    pub calibration: Option<CalibrationResult>,
    pub valuation: NoteValuation,
}

/// Calibrate Heston parameters to an implied-volatility surface.
///
/// One helper is built per surface point (the out-of-the-money option,
/// market-priced by Black-Scholes at the quoted vol) and `optimizer` minimizes
/// the aggregated helper error inside `calib_params.param_bounds`.
///
/// # Errors
///
/// * [`Error::InsufficientData`] for an empty surface
/// * [`Error::InvalidBounds`] for empty, non-finite or out-of-domain bounds
/// * [`Error::InvalidMarketData`] for a non-positive spot or a quote expiring
///   on or before the curve's reference date
///
/// Running out of optimizer budget is not an error: the result carries
/// [`CalibrationStatus::NotConverged`] with the best parameters found. Use
/// [`CalibrationResult::ensure_residual_below`] to apply an acceptance
/// threshold.
pub fn calibrate_heston(
    curve: &dyn YieldCurve,
    dividend_curve: &dyn YieldCurve,
    spot: f64,
    surface: &VolatilitySurface,
    optimizer: &dyn Optimizer,
    calib_params: CalibrationParams,
) -> Result<CalibrationResult> {
    let calibrator = HestonModelCalibrator::new(
        curve,
        dividend_curve,
        spot,
        surface,
        calib_params.param_bounds,
        calib_params.model_params,
    )?;
    calibrator.calibrate(optimizer, calib_params.initial_guess.as_ref())
}

/// Simulate Heston asset paths on `grid`.
///
/// Each returned path has one level per grid date, starting at `spot`. Path
/// `i` depends only on `config.seed` and `i`.
///
/// # Errors
///
/// * [`Error::InvalidPathCount`] when `num_paths` is zero
/// * [`Error::InvalidMarketData`] for a non-positive spot
/// * [`Error::Config`] for a non-positive step size
pub fn simulate_paths(
    grid: &SimulationGrid,
    params: &HestonParameters,
    spot: f64,
    curve: &dyn YieldCurve,
    dividend_curve: &dyn YieldCurve,
    num_paths: usize,
    config: &SimulationConfig,
) -> Result<Vec<ScenarioPath>> {
    simulation::simulate(grid, params, spot, curve, dividend_curve, num_paths, config)
}

/// Price a note on pre-simulated paths.
///
/// Paths must be aligned with `[valuation_date] + coupon dates after it`
/// (see [`SimulationGrid::for_schedule`]).
pub fn price_note(
    note: &AutocallableNote,
    paths: &[ScenarioPath],
    past_fixings: &PastFixings,
    valuation_date: NaiveDate,
    curve: &dyn YieldCurve,
    policy: &AnomalyPolicy,
) -> Result<NoteValuation> {
    note.price(paths, past_fixings, valuation_date, curve, policy)
}

/// Calibrate, simulate and evaluate in one call.
///
/// Settled notes (matured or already autocalled) are valued at zero without
/// calibrating.
pub fn value_note(
    market: &MarketInputs<'_>,
    note: &AutocallableNote,
    past_fixings: &PastFixings,
    valuation_date: NaiveDate,
    config: &ValuationConfig,
) -> Result<NoteReport> {
    let status = note.status(past_fixings, valuation_date);
    if status != NoteStatus::Live {
        info!(?status, "note settled, skipping calibration");
        return Ok(NoteReport {
            calibration: None,
            valuation: NoteValuation::settled(status, note.spec.notional),
        });
    }

    let optimizer = build_optimizer(&config.optimization);
    let calibration = calibrate_heston(
        market.curve,
        market.dividend_curve,
        market.spot,
        market.surface,
        optimizer.as_ref(),
        CalibrationParams {
            param_bounds: config.bounds,
            model_params: config.model,
            initial_guess: None,
        },
    )?;

    let valuation = config.engine().price(
        note,
        &calibration.params,
        market.spot,
        market.curve,
        market.dividend_curve,
        past_fixings,
        valuation_date,
    )?;

    Ok(NoteReport {
        calibration: Some(calibration),
        valuation,
    })
}
