//! Knobs of the Heston calibrator that are not part of the optimization
//! vector: how a helper's error is measured, how helper errors are folded into
//! one objective value, and the integration settings of the bundled pricer.

use serde::{Deserialize, Serialize};

use crate::models::heston::heston_pricer::FourierHestonPricer;

/// Per-helper calibration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationErrorType {
    /// `(model - market) / market`; falls back to the absolute error when
    /// the market price is numerically zero
    #[default]
    RelativePrice,
    /// `model - market`
    AbsolutePrice,
}

impl CalibrationErrorType {
    pub fn error(&self, model_price: f64, market_price: f64) -> f64 {
        match self {
            CalibrationErrorType::RelativePrice if market_price > 1e-12 => {
                (model_price - market_price) / market_price
            }
            _ => model_price - market_price,
        }
    }
}

/// How helper errors are aggregated into the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostFunction {
    /// `sqrt(mean(err²))`
    #[default]
    Rmse,
    /// `sqrt(Σ|err|)`
    RootSumAbsolute,
}

impl CostFunction {
    pub fn aggregate(&self, errors: &[f64]) -> f64 {
        if errors.is_empty() {
            return f64::INFINITY;
        }
        match self {
            CostFunction::Rmse => {
                (errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt()
            }
            CostFunction::RootSumAbsolute => errors.iter().map(|e| e.abs()).sum::<f64>().sqrt(),
        }
    }
}

/// Parameters that influence the Heston calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HestonModelParams {
    pub error_type: CalibrationErrorType,
    pub cost_function: CostFunction,
    /// Integration settings of the Fourier pricer used for the helpers
    pub pricer: FourierHestonPricer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_relative_error_falls_back_to_absolute_for_zero_price() {
        let rel = CalibrationErrorType::RelativePrice;
        assert_relative_eq!(rel.error(1.1, 1.0), 0.1, epsilon = 1e-12);
        assert_relative_eq!(rel.error(0.002, 0.0), 0.002, epsilon = 1e-15);
        assert_relative_eq!(
            CalibrationErrorType::AbsolutePrice.error(1.1, 1.0),
            0.1,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_cost_functions() {
        let errors = [0.3, -0.4];
        assert_relative_eq!(
            CostFunction::Rmse.aggregate(&errors),
            (0.125_f64).sqrt(),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            CostFunction::RootSumAbsolute.aggregate(&errors),
            (0.7_f64).sqrt(),
            epsilon = 1e-12
        );
        assert!(CostFunction::Rmse.aggregate(&[]).is_infinite());
    }

    #[test]
    fn test_partial_toml() {
        let params: HestonModelParams = toml::from_str(
            r#"
            cost_function = "root_sum_absolute"

            [pricer]
            intervals = 400
            "#,
        )
        .unwrap();
        assert_eq!(params.error_type, CalibrationErrorType::RelativePrice);
        assert_eq!(params.cost_function, CostFunction::RootSumAbsolute);
        assert_eq!(params.pricer.intervals, 400);
        assert_eq!(params.pricer.upper_limit, 200.0);
    }
}
