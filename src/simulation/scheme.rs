//! Variance discretisations.
//!
//! All three schemes return a variance that is safe to feed back into the
//! dynamics (`>= 0` after the caller's `max(v, 0)`), whether or not the
//! Feller condition holds.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::models::heston::heston_model::HestonParameters;

/// Andersen's switching threshold between the quadratic and exponential
/// branches.
const PSI_CRITICAL: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceScheme {
    /// Euler step with drift and diffusion evaluated at `max(v, 0)`
    #[default]
    FullTruncation,
    /// Euler step followed by `v <- |v|`
    Reflection,
    /// Andersen's quadratic-exponential moment matching
    QuadraticExponential,
}

impl VarianceScheme {
    /// Advances `v` over `dt` using the correlated normal `z`.
    ///
    /// `normal` is the standard normal used by the exponential branch of the
    /// QE scheme to map `z` to a uniform.
    pub fn step(&self, p: &HestonParameters, v: f64, dt: f64, z: f64, normal: &Normal) -> f64 {
        let v_plus = v.max(0.0);
        match self {
            VarianceScheme::FullTruncation => {
                v + p.kappa * (p.theta - v_plus) * dt + p.sigma * (v_plus * dt).sqrt() * z
            }
            VarianceScheme::Reflection => {
                (v_plus + p.kappa * (p.theta - v_plus) * dt + p.sigma * (v_plus * dt).sqrt() * z)
                    .abs()
            }
            VarianceScheme::QuadraticExponential => qe_step(p, v_plus, dt, z, normal),
        }
    }
}

fn qe_step(p: &HestonParameters, v: f64, dt: f64, z: f64, normal: &Normal) -> f64 {
    let e = (-p.kappa * dt).exp();
    let sigma2 = p.sigma * p.sigma;

    let m = p.theta + (v - p.theta) * e;
    let s2 = v * sigma2 * e * (1.0 - e) / p.kappa
        + p.theta * sigma2 * (1.0 - e).powi(2) / (2.0 * p.kappa);
    let psi = s2 / (m * m);

    if psi <= PSI_CRITICAL {
        let inv = 2.0 / psi;
        let b2 = inv - 1.0 + (inv * (inv - 1.0)).sqrt();
        let a = m / (1.0 + b2);
        a * (b2.sqrt() + z).powi(2)
    } else {
        let prob_zero = (psi - 1.0) / (psi + 1.0);
        let beta = (1.0 - prob_zero) / m;
        let u = normal.cdf(z);
        if u <= prob_zero {
            0.0
        } else {
            ((1.0 - prob_zero) / (1.0 - u).max(f64::MIN_POSITIVE)).ln() / beta
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn normal() -> Normal {
        Normal::new(0.0, 1.0).unwrap()
    }

    #[test]
    fn test_schemes_agree_on_deterministic_variance() {
        // σ → 0: every scheme follows dv = κ(θ - v)dt
        let p = HestonParameters::new(0.09, 2.0, 0.04, 1e-8, -0.5).unwrap();
        let dt: f64 = 1.0 / 52.0;
        let exact = 0.04 + (0.09 - 0.04) * (-2.0 * dt).exp();
        for scheme in [VarianceScheme::FullTruncation, VarianceScheme::Reflection] {
            assert_relative_eq!(
                scheme.step(&p, 0.09, dt, 0.3, &normal()),
                0.09 + 2.0 * (0.04 - 0.09) * dt,
                epsilon = 1e-9
            );
        }
        assert_relative_eq!(
            VarianceScheme::QuadraticExponential.step(&p, 0.09, dt, 0.3, &normal()),
            exact,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_qe_matches_conditional_mean() {
        // Feller violated; QE should still reproduce E[v_{t+dt} | v_t]
        let p = HestonParameters::new(0.02, 0.5, 0.02, 0.9, -0.7).unwrap();
        let (v, dt) = (0.02, 0.25);
        let mut rng = StdRng::seed_from_u64(11);
        let n = 200_000;
        let mean = (0..n)
            .map(|_| {
                let z: f64 = StandardNormal.sample(&mut rng);
                VarianceScheme::QuadraticExponential.step(&p, v, dt, z, &normal())
            })
            .sum::<f64>()
            / n as f64;
        let expected = p.theta + (v - p.theta) * (-p.kappa * dt).exp();
        assert_relative_eq!(mean, expected, max_relative = 0.02);
    }

    #[test]
    fn test_reflection_and_qe_never_negative() {
        let p = HestonParameters::new(0.001, 0.3, 0.01, 1.0, 0.0).unwrap();
        for &z in &[-6.0, -3.0, -1.0, 0.0, 1.0, 3.0, 6.0] {
            assert!(VarianceScheme::Reflection.step(&p, 0.001, 0.1, z, &normal()) >= 0.0);
            assert!(VarianceScheme::QuadraticExponential.step(&p, 0.001, 0.1, z, &normal()) >= 0.0);
        }
    }
}
