// Black-Scholes helpers used to turn quoted implied volatilities into market
// prices for the calibration helpers, and model prices back into implied vols
// for the calibration report.

use roots::find_root_brent;
use serde::{Deserialize, Serialize};

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

fn norm_cdf(x: f64) -> f64 {
    // 0.5 * [1 + erf(x / sqrt(2))]
    0.5 * (1.0 + libm::erf(x / (2.0_f64).sqrt()))
}

/// Price of a European call option under Black-Scholes assumptions.
#[allow(non_snake_case)]
pub fn bs_call_price(S: f64, K: f64, r: f64, q: f64, T: f64, sigma: f64) -> f64 {
    if T <= 0.0 || sigma <= 0.0 {
        return (S * (-q * T).exp() - K * (-r * T).exp()).max(0.0);
    }
    let d1 = ((S / K).ln() + (r - q + 0.5 * sigma.powi(2)) * T) / (sigma * T.sqrt());
    let d2 = d1 - sigma * T.sqrt();
    S * (-q * T).exp() * norm_cdf(d1) - K * (-r * T).exp() * norm_cdf(d2)
}

/// Price of a European put option under Black-Scholes assumptions.
#[allow(non_snake_case)]
pub fn bs_put_price(S: f64, K: f64, r: f64, q: f64, T: f64, sigma: f64) -> f64 {
    if T <= 0.0 || sigma <= 0.0 {
        return (K * (-r * T).exp() - S * (-q * T).exp()).max(0.0);
    }
    let d1 = ((S / K).ln() + (r - q + 0.5 * sigma.powi(2)) * T) / (sigma * T.sqrt());
    let d2 = d1 - sigma * T.sqrt();
    K * (-r * T).exp() * norm_cdf(-d2) - S * (-q * T).exp() * norm_cdf(-d1)
}

/// Dispatch on option type.
#[allow(non_snake_case)]
pub fn bs_price(
    option_type: OptionType,
    S: f64,
    K: f64,
    r: f64,
    q: f64,
    T: f64,
    sigma: f64,
) -> f64 {
    match option_type {
        OptionType::Call => bs_call_price(S, K, r, q, T, sigma),
        OptionType::Put => bs_put_price(S, K, r, q, T, sigma),
    }
}

/// Black-Scholes implied volatility by Brent root finding on `[1e-6, 5]`.
///
/// Returns `None` when the price lies outside the no-arbitrage band for that
/// interval (e.g. below intrinsic value) or the solver fails.
#[allow(non_snake_case)]
pub fn implied_volatility(
    option_type: OptionType,
    price: f64,
    S: f64,
    K: f64,
    r: f64,
    q: f64,
    T: f64,
) -> Option<f64> {
    const VOL_MIN: f64 = 1e-6;
    const VOL_MAX: f64 = 5.0;

    if !price.is_finite() || price <= 0.0 || T <= 0.0 {
        return None;
    }

    let objective = |sigma: f64| bs_price(option_type, S, K, r, q, T, sigma) - price;
    if objective(VOL_MIN) > 0.0 || objective(VOL_MAX) < 0.0 {
        return None;
    }

    let mut tol = 1e-10;
    find_root_brent(VOL_MIN, VOL_MAX, &objective, &mut tol).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_put_call_parity() {
        let (s, k, r, q, t, vol) = (100.0, 95.0, 0.02, 0.028, 1.5, 0.3565);
        let call = bs_call_price(s, k, r, q, t, vol);
        let put = bs_put_price(s, k, r, q, t, vol);
        let parity = s * (-q * t).exp() - k * (-r * t).exp();
        assert_relative_eq!(call - put, parity, epsilon = 1e-10);
    }

    #[test]
    fn test_implied_volatility_round_trip() {
        let (s, k, r, q, t) = (79.98, 71.98, 0.02, 0.028, 2.0);
        for &vol in &[0.1, 0.25, 0.3565, 0.8] {
            let price = bs_price(OptionType::Put, s, k, r, q, t, vol);
            let iv = implied_volatility(OptionType::Put, price, s, k, r, q, t).unwrap();
            assert_relative_eq!(iv, vol, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_implied_volatility_rejects_sub_intrinsic_price() {
        let iv = implied_volatility(OptionType::Call, 1e-12, 150.0, 100.0, 0.0, 0.0, 1.0);
        assert!(iv.is_none());
    }
}
