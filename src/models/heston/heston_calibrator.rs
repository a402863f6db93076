// src/models/heston/heston_calibrator.rs

//! Heston calibrator
//!
//! Each surface point becomes a calibration helper: the out-of-the-money
//! option at that strike and expiry, priced by Black-Scholes at the quoted
//! implied vol. A trial parameter vector is scored by repricing every helper
//! with a [`HestonPricer`] and folding the helper errors with the configured
//! [`CostFunction`](crate::model_params::CostFunction).

use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::calibration::optimizer::Optimizer;
use crate::calibration::pipeline::calibrate_model;
use crate::calibration::types::{
    CalibrationResult, CalibrationStatus, ModelCalibrator, QuoteFit, VolatilitySurface,
};
use crate::error::{Error, Result};
use crate::market::curve::YieldCurve;
use crate::model_params::HestonModelParams;
use crate::models::bs::{bs_price, implied_volatility, OptionType};
use crate::models::heston::heston_model::{
    HestonParameters, HESTON_PARAM_COUNT, HESTON_PARAM_NAMES,
};
use crate::models::heston::heston_pricer::{HestonPricer, OptionSpec};

/// Objective value returned for inadmissible or non-finite trials.
pub const PENALTY: f64 = 1.0e12;

/// Structure to hold parameter bounds for the Heston model calibration
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct HestonParamBounds {
    /// Initial variance bounds
    pub v0: (f64, f64),
    /// Mean-reversion speed bounds
    pub kappa: (f64, f64),
    /// Long-run variance bounds
    pub theta: (f64, f64),
    /// Vol-of-variance bounds
    pub sigma: (f64, f64),
    /// Correlation bounds, inside [-1, 1]
    pub rho: (f64, f64),
}

impl Default for HestonParamBounds {
    fn default() -> Self {
        Self {
            v0: (0.01, 1.0),
            kappa: (0.01, 10.0),
            theta: (0.01, 1.0),
            sigma: (0.01, 1.0),
            rho: (-1.0, 1.0),
        }
    }
}

/// Builds bounds from optimization-vector order, rejecting a wrong length or
/// an inadmissible box.
impl TryFrom<&[(f64, f64)]> for HestonParamBounds {
    type Error = Error;

    fn try_from(bounds: &[(f64, f64)]) -> Result<Self> {
        let &[v0, kappa, theta, sigma, rho] = bounds else {
            return Err(Error::InvalidBounds {
                parameter: "bounds",
                min: f64::NAN,
                max: f64::NAN,
                reason: format!(
                    "expected {HESTON_PARAM_COUNT} (min, max) pairs, got {}",
                    bounds.len()
                ),
            });
        };
        let parsed = Self {
            v0,
            kappa,
            theta,
            sigma,
            rho,
        };
        parsed.validate()?;
        Ok(parsed)
    }
}

impl HestonParamBounds {
    /// Bounds in optimization-vector order.
    pub fn to_vec(&self) -> Vec<(f64, f64)> {
        vec![self.v0, self.kappa, self.theta, self.sigma, self.rho]
    }

    pub fn validate(&self) -> Result<()> {
        for (&parameter, &(min, max)) in HESTON_PARAM_NAMES.iter().zip(self.to_vec().iter()) {
            let invalid = |reason: &str| Error::InvalidBounds {
                parameter,
                min,
                max,
                reason: reason.to_string(),
            };
            if !min.is_finite() || !max.is_finite() {
                return Err(invalid("bounds must be finite"));
            }
            if min >= max {
                return Err(invalid("min must be below max"));
            }
            if parameter == "rho" {
                if min < -1.0 || max > 1.0 {
                    return Err(invalid("correlation bounds must lie in [-1, 1]"));
                }
            } else if min <= 0.0 {
                return Err(invalid("lower bound must be > 0"));
            }
        }
        Ok(())
    }

    /// Whether `params` lies inside the box.
    pub fn contains(&self, params: &HestonParameters) -> bool {
        params
            .to_array()
            .iter()
            .zip(self.to_vec())
            .all(|(x, (lo, hi))| (lo..=hi).contains(x))
    }
}

/// One surface point turned into a priceable option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationHelper {
    pub expiry: NaiveDate,
    pub market_vol: f64,
    pub market_price: f64,
    pub option: OptionSpec,
}

impl CalibrationHelper {
    /// Continuously compounded rates implied by the helper's discount factors.
    fn rates(&self) -> (f64, f64) {
        let t = self.option.maturity;
        (
            -self.option.rate_discount.ln() / t,
            -self.option.dividend_discount.ln() / t,
        )
    }
}

/// Calibrator for the Heston model with 5 parameters:
/// [v0, kappa, theta, sigma, rho]
#[derive(Clone)]
pub struct HestonModelCalibrator {
    helpers: Vec<CalibrationHelper>,
    param_bounds: Vec<(f64, f64)>,
    params: HestonModelParams,
    pricer: Arc<dyn HestonPricer>,
}

impl std::fmt::Debug for HestonModelCalibrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HestonModelCalibrator")
            .field("helpers", &self.helpers.len())
            .field("param_bounds", &self.param_bounds)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl HestonModelCalibrator {
    /// Builds one helper per surface point.
    ///
    /// Maturities are measured with `curve`'s day count from its reference
    /// date; the dividend curve only contributes discount factors.
    pub fn new(
        curve: &dyn YieldCurve,
        dividend_curve: &dyn YieldCurve,
        spot: f64,
        surface: &VolatilitySurface,
        bounds: HestonParamBounds,
        model_params: HestonModelParams,
    ) -> Result<Self> {
        if surface.is_empty() {
            return Err(Error::InsufficientData {
                reason: "volatility surface has no quotes".to_string(),
            });
        }
        if !spot.is_finite() || spot <= 0.0 {
            return Err(Error::market(format!("spot must be > 0, got {spot}")));
        }
        bounds.validate()?;

        let reference = curve.reference_date();
        let helpers = surface
            .points()
            .iter()
            .map(|point| {
                if point.expiry <= reference {
                    return Err(Error::market(format!(
                        "quote expiry {} is not after reference date {}",
                        point.expiry, reference
                    )));
                }

                let maturity = curve.year_fraction(point.expiry);
                let rate_discount = curve.discount(point.expiry);
                let dividend_discount = dividend_curve.discount(point.expiry);

                let option_type = if point.strike * rate_discount >= spot * dividend_discount {
                    OptionType::Call
                } else {
                    OptionType::Put
                };
                let option = OptionSpec {
                    option_type,
                    spot,
                    strike: point.strike,
                    maturity,
                    rate_discount,
                    dividend_discount,
                };

                let mut helper = CalibrationHelper {
                    expiry: point.expiry,
                    market_vol: point.implied_vol,
                    market_price: 0.0,
                    option,
                };
                let (r, q) = helper.rates();
                helper.market_price =
                    bs_price(option_type, spot, point.strike, r, q, maturity, point.implied_vol);
                Ok(helper)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(helpers = helpers.len(), spot, "built Heston calibration helpers");

        Ok(Self {
            helpers,
            param_bounds: bounds.to_vec(),
            params: model_params,
            pricer: Arc::new(model_params.pricer),
        })
    }

    /// Replaces the bundled Fourier pricer.
    pub fn with_pricer(mut self, pricer: Arc<dyn HestonPricer>) -> Self {
        self.pricer = pricer;
        self
    }

    pub fn helpers(&self) -> &[CalibrationHelper] {
        &self.helpers
    }

    /// Per-helper errors for `params`, in surface order.
    pub fn helper_errors(&self, params: &HestonParameters) -> Vec<f64> {
        self.helpers
            .par_iter()
            .map(|h| {
                let model_price = self.pricer.price(params, &h.option);
                self.params.error_type.error(model_price, h.market_price)
            })
            .collect()
    }

    /// Model vs market comparison for every helper.
    pub fn quote_fits(&self, params: &HestonParameters) -> Vec<QuoteFit> {
        self.helpers
            .par_iter()
            .map(|h| {
                let model_price = self.pricer.price(params, &h.option);
                let (r, q) = h.rates();
                let o = &h.option;
                QuoteFit {
                    expiry: h.expiry,
                    strike: o.strike,
                    option_type: o.option_type,
                    market_vol: h.market_vol,
                    market_price: h.market_price,
                    model_price,
                    model_vol: implied_volatility(
                        o.option_type,
                        model_price,
                        o.spot,
                        o.strike,
                        r,
                        q,
                        o.maturity,
                    ),
                    error: self.params.error_type.error(model_price, h.market_price),
                }
            })
            .collect()
    }

    /// Runs `optimizer` over the parameter box and packages the best fit.
    ///
    /// Running out of budget is reported through
    /// [`CalibrationStatus::NotConverged`], not as an error.
    pub fn calibrate(
        &self,
        optimizer: &dyn Optimizer,
        initial_guess: Option<&HestonParameters>,
    ) -> Result<CalibrationResult> {
        let guess = initial_guess.map(|p| p.to_array());
        let run = calibrate_model(self, optimizer, guess.as_ref().map(|g| g.as_slice()));

        let params = HestonParameters::from_slice(&run.outcome.best_params)?;
        if !params.satisfies_feller() {
            warn!(
                feller_margin = params.feller_margin(),
                "calibrated Heston parameters violate the Feller condition"
            );
        }

        let status = if run.outcome.converged {
            CalibrationStatus::Converged
        } else {
            CalibrationStatus::NotConverged {
                reason: run.outcome.message.clone(),
            }
        };

        Ok(CalibrationResult {
            params,
            residual: self.evaluate_objective(&run.outcome.best_params),
            status,
            evaluations: run.evaluations,
            quotes: self.quote_fits(&params),
        })
    }
}

impl ModelCalibrator for HestonModelCalibrator {
    fn model_name(&self) -> &str {
        "heston"
    }

    fn param_count(&self) -> usize {
        HESTON_PARAM_COUNT
    }

    fn param_bounds(&self) -> &[(f64, f64)] {
        &self.param_bounds
    }

    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        let params = match HestonParameters::from_slice(x) {
            Ok(p) => p,
            Err(_) => return PENALTY, // Reject inadmissible trials outright
        };

        let errors = self.helper_errors(&params);
        if errors.iter().any(|e| !e.is_finite()) {
            return PENALTY;
        }

        let obj = self.params.cost_function.aggregate(&errors);
        if obj.is_finite() {
            obj
        } else {
            PENALTY
        }
    }

    fn param_names(&self) -> Vec<&str> {
        HESTON_PARAM_NAMES.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::types::VolatilitySurfacePoint;
    use crate::market::curve::{DayCount, FlatForward};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn curves() -> (FlatForward, FlatForward) {
        let today = date(2024, 7, 20);
        (
            FlatForward::new(today, 0.02, DayCount::Actual360).unwrap(),
            FlatForward::new(today, 0.028, DayCount::Actual360).unwrap(),
        )
    }

    fn surface() -> VolatilitySurface {
        let expiries = [date(2025, 7, 20), date(2026, 7, 20)];
        let strikes = [60.0, 80.0, 100.0];
        VolatilitySurface::from_grid(&expiries, &strikes, &[vec![0.35; 3], vec![0.35; 3]]).unwrap()
    }

    #[test]
    fn test_bounds_validation() {
        assert!(HestonParamBounds::default().validate().is_ok());

        let inverted = HestonParamBounds {
            kappa: (5.0, 1.0),
            ..Default::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(Error::InvalidBounds { parameter: "kappa", .. })
        ));

        let zero_floor = HestonParamBounds {
            v0: (0.0, 1.0),
            ..Default::default()
        };
        assert!(matches!(
            zero_floor.validate(),
            Err(Error::InvalidBounds { parameter: "v0", .. })
        ));

        let wide_rho = HestonParamBounds {
            rho: (-1.5, 0.5),
            ..Default::default()
        };
        assert!(matches!(
            wide_rho.validate(),
            Err(Error::InvalidBounds { parameter: "rho", .. })
        ));

        let infinite = HestonParamBounds {
            sigma: (0.01, f64::INFINITY),
            ..Default::default()
        };
        assert!(infinite.validate().is_err());
    }

    #[test]
    fn test_bounds_from_slice() {
        let defaults = HestonParamBounds::default().to_vec();
        assert_eq!(
            HestonParamBounds::try_from(defaults.as_slice()),
            Ok(HestonParamBounds::default())
        );

        let short = &defaults[..4];
        assert!(matches!(
            HestonParamBounds::try_from(short),
            Err(Error::InvalidBounds { parameter: "bounds", .. })
        ));

        let mut inverted = defaults.clone();
        inverted[2] = (0.5, 0.1);
        assert!(matches!(
            HestonParamBounds::try_from(inverted.as_slice()),
            Err(Error::InvalidBounds { parameter: "theta", .. })
        ));
    }

    #[test]
    fn test_helpers_pick_out_of_the_money_side() {
        let (curve, div) = curves();
        let calibrator = HestonModelCalibrator::new(
            &curve,
            &div,
            80.0,
            &surface(),
            HestonParamBounds::default(),
            HestonModelParams::default(),
        )
        .unwrap();

        for h in calibrator.helpers() {
            let forward_ok = h.option.strike * h.option.rate_discount
                >= h.option.spot * h.option.dividend_discount;
            let expected = if forward_ok { OptionType::Call } else { OptionType::Put };
            assert_eq!(h.option.option_type, expected);
            assert!(h.market_price > 0.0);
        }
        assert_eq!(calibrator.helpers()[0].option.option_type, OptionType::Put);
        assert_eq!(calibrator.helpers()[2].option.option_type, OptionType::Call);
    }

    #[test]
    fn test_rejects_empty_surface_bad_spot_and_expired_quotes() {
        let (curve, div) = curves();
        let bounds = HestonParamBounds::default();
        let params = HestonModelParams::default();

        let empty = VolatilitySurface::new(Vec::new()).unwrap();
        assert!(matches!(
            HestonModelCalibrator::new(&curve, &div, 80.0, &empty, bounds, params),
            Err(Error::InsufficientData { .. })
        ));

        assert!(matches!(
            HestonModelCalibrator::new(&curve, &div, 0.0, &surface(), bounds, params),
            Err(Error::InvalidMarketData { .. })
        ));

        let expired = VolatilitySurface::new(vec![VolatilitySurfacePoint {
            expiry: date(2024, 7, 20),
            strike: 80.0,
            implied_vol: 0.3,
        }])
        .unwrap();
        assert!(matches!(
            HestonModelCalibrator::new(&curve, &div, 80.0, &expired, bounds, params),
            Err(Error::InvalidMarketData { .. })
        ));
    }

    #[test]
    fn test_objective_penalises_inadmissible_trials() {
        let (curve, div) = curves();
        let calibrator = HestonModelCalibrator::new(
            &curve,
            &div,
            80.0,
            &surface(),
            HestonParamBounds::default(),
            HestonModelParams::default(),
        )
        .unwrap();

        assert_eq!(calibrator.evaluate_objective(&[0.1, 1.0, 0.1, 0.3, -1.5]), PENALTY);
        assert_eq!(calibrator.evaluate_objective(&[0.1, 1.0, 0.1]), PENALTY);

        let value = calibrator.evaluate_objective(&[0.1225, 1.0, 0.1225, 0.2, -0.3]);
        assert!(value.is_finite() && value < 1.0, "objective {value}");

        // Pure in x: same input, same output
        let again = calibrator.evaluate_objective(&[0.1225, 1.0, 0.1225, 0.2, -0.3]);
        assert_eq!(value, again);
    }
}
