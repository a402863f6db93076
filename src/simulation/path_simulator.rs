//! Heston path generation on a [`SimulationGrid`].
//!
//! The log-asset is stepped with
//!
//! ln S += (r_i - q_i - v⁺/2) dt + sqrt(v⁺ dt) Z₁
//!
//! where `r_i - q_i` is the deterministic drift implied by the two curves over
//! grid interval `i`, and the variance follows the configured
//! [`VarianceScheme`] driven by `Z₂ = ρ Z₁ + sqrt(1 - ρ²) ε`.

use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::market::curve::YieldCurve;
use crate::models::heston::heston_model::HestonParameters;
use crate::simulation::grid::SimulationGrid;
use crate::simulation::rng::path_rng;
use crate::simulation::scheme::VarianceScheme;

/// Simulation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Base seed; path `i` draws from a generator derived from `(seed, i)`
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub scheme: VarianceScheme,
    /// Longest time step in years; grid intervals are split evenly so that no
    /// sub-step exceeds it
    #[serde(default = "default_max_step")]
    pub max_step: f64,
    /// Number of paths used by the Monte Carlo engine
    #[serde(default = "default_num_paths")]
    pub num_paths: usize,
    /// Paths per parallel work unit
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_seed() -> u64 {
    42
}

fn default_max_step() -> f64 {
    1.0 / 52.0
}

fn default_num_paths() -> usize {
    10_000
}

fn default_chunk_size() -> usize {
    256
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            scheme: VarianceScheme::default(),
            max_step: default_max_step(),
            num_paths: default_num_paths(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl SimulationConfig {
    /// Weekly steps, 100k paths, QE variance.
    pub fn production() -> Self {
        Self {
            scheme: VarianceScheme::QuadraticExponential,
            num_paths: 100_000,
            ..Self::default()
        }
    }

    /// Monthly steps and 2,000 paths for quick checks.
    pub fn fast() -> Self {
        Self {
            max_step: 1.0 / 12.0,
            num_paths: 2_000,
            ..Self::default()
        }
    }

    /// Daily steps, 500k paths.
    pub fn research() -> Self {
        Self {
            scheme: VarianceScheme::QuadraticExponential,
            max_step: 1.0 / 252.0,
            num_paths: 500_000,
            chunk_size: 1024,
            ..Self::default()
        }
    }

    pub fn minimal() -> Self {
        Self {
            max_step: 0.25,
            num_paths: 256,
            chunk_size: 64,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_step.is_finite() || self.max_step <= 0.0 {
            return Err(Error::Config {
                reason: format!("max_step must be > 0, got {}", self.max_step),
            });
        }
        if self.chunk_size == 0 {
            return Err(Error::Config {
                reason: "chunk_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// A path that produced a non-finite level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathAnomaly {
    pub path_index: usize,
    /// First grid index holding a non-finite level
    pub grid_index: usize,
}

/// Asset levels aligned with the grid; `levels[0]` is spot.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioPath {
    pub index: usize,
    pub levels: Vec<f64>,
    pub anomaly: Option<PathAnomaly>,
}

/// Precomputed stepping plan for one grid interval.
#[derive(Debug, Clone, Copy)]
struct Interval {
    drift: f64,
    sub_steps: usize,
    dt: f64,
}

/// Generates paths one at a time into caller-provided buffers.
#[derive(Debug, Clone)]
pub struct PathSimulator {
    params: HestonParameters,
    spot: f64,
    intervals: Vec<Interval>,
    config: SimulationConfig,
    normal: Normal,
}

impl PathSimulator {
    pub fn new(
        grid: &SimulationGrid,
        params: HestonParameters,
        spot: f64,
        curve: &dyn YieldCurve,
        dividend_curve: &dyn YieldCurve,
        config: SimulationConfig,
    ) -> Result<Self> {
        if !spot.is_finite() || spot <= 0.0 {
            return Err(Error::market(format!("spot must be > 0, got {spot}")));
        }
        params.validate()?;
        config.validate()?;
        if !params.satisfies_feller() {
            debug!(
                feller_margin = params.feller_margin(),
                "simulating with parameters that violate the Feller condition"
            );
        }

        let dates = grid.dates();
        let times = grid.times();
        let intervals = (0..grid.len() - 1)
            .map(|i| {
                let span = times[i + 1] - times[i];
                let rate = (curve.discount(dates[i]) / curve.discount(dates[i + 1])).ln();
                let dividend = (dividend_curve.discount(dates[i])
                    / dividend_curve.discount(dates[i + 1]))
                .ln();
                let sub_steps = ((span / config.max_step).ceil() as usize).max(1);
                Interval {
                    drift: (rate - dividend) / span,
                    sub_steps,
                    dt: span / sub_steps as f64,
                }
            })
            .collect();

        let normal = Normal::new(0.0, 1.0).map_err(|e| Error::Config {
            reason: format!("standard normal unavailable: {e}"),
        })?;

        Ok(Self {
            params,
            spot,
            intervals,
            config,
            normal,
        })
    }

    /// Number of levels per path (grid length).
    pub fn path_len(&self) -> usize {
        self.intervals.len() + 1
    }

    /// Writes path `path_index` into `levels` (length [`path_len`](Self::path_len)).
    pub fn fill_path(&self, path_index: usize, levels: &mut [f64]) -> Option<PathAnomaly> {
        self.generate(path_index, levels, |_, _| {})
    }

    /// Like [`fill_path`](Self::fill_path), also reporting every sub-step's
    /// variance to `observe` as `(fed into the asset step, raw scheme output)`.
    #[cfg(test)]
    pub(crate) fn fill_path_observing_variance(
        &self,
        path_index: usize,
        levels: &mut [f64],
        observe: impl FnMut(f64, f64),
    ) -> Option<PathAnomaly> {
        self.generate(path_index, levels, observe)
    }

    fn generate(
        &self,
        path_index: usize,
        levels: &mut [f64],
        mut observe: impl FnMut(f64, f64),
    ) -> Option<PathAnomaly> {
        let p = &self.params;
        let rho_c = (1.0 - p.rho * p.rho).max(0.0).sqrt();
        let mut rng = path_rng(self.config.seed, path_index);

        let mut log_s = self.spot.ln();
        let mut v = p.v0;
        levels[0] = self.spot;

        let mut anomaly = None;
        for (i, interval) in self.intervals.iter().enumerate() {
            for _ in 0..interval.sub_steps {
                let e1: f64 = StandardNormal.sample(&mut rng);
                let e2: f64 = StandardNormal.sample(&mut rng);
                let z2 = p.rho * e1 + rho_c * e2;

                let v_plus = v.max(0.0);
                log_s += (interval.drift - 0.5 * v_plus) * interval.dt
                    + (v_plus * interval.dt).sqrt() * e1;
                v = self
                    .config
                    .scheme
                    .step(p, v, interval.dt, z2, &self.normal);
                observe(v_plus, v);
            }

            let level = log_s.exp();
            levels[i + 1] = level;
            if anomaly.is_none() && !level.is_finite() {
                anomaly = Some(PathAnomaly {
                    path_index,
                    grid_index: i + 1,
                });
            }
        }
        anomaly
    }
}

/// Simulates `num_paths` paths on `grid`.
///
/// Paths are generated in parallel; path `i` is identical whatever the
/// thread count or chunking.
pub fn simulate(
    grid: &SimulationGrid,
    params: &HestonParameters,
    spot: f64,
    curve: &dyn YieldCurve,
    dividend_curve: &dyn YieldCurve,
    num_paths: usize,
    config: &SimulationConfig,
) -> Result<Vec<ScenarioPath>> {
    if num_paths == 0 {
        return Err(Error::InvalidPathCount { requested: 0 });
    }
    let simulator = PathSimulator::new(grid, *params, spot, curve, dividend_curve, *config)?;
    let len = simulator.path_len();

    let paths: Vec<ScenarioPath> = (0..num_paths)
        .into_par_iter()
        .with_min_len(config.chunk_size)
        .map(|index| {
            let mut levels = vec![0.0; len];
            let anomaly = simulator.fill_path(index, &mut levels);
            ScenarioPath {
                index,
                levels,
                anomaly,
            }
        })
        .collect();

    let anomalous = paths.iter().filter(|p| p.anomaly.is_some()).count();
    if anomalous > 0 {
        warn!(anomalous, total = num_paths, "simulated paths with non-finite levels");
    }
    debug!(paths = num_paths, grid_points = len, scheme = ?config.scheme, "simulated Heston paths");

    Ok(paths)
}

/// One variance sub-step: the value consumed by the asset step and the raw
/// state the scheme returned.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct VarianceStep {
    pub fed: f64,
    pub next: f64,
}

/// Per-sub-step variance trace and levels of one simulated path.
#[cfg(test)]
pub(crate) struct VarianceTrace {
    pub steps: Vec<VarianceStep>,
    pub levels: Vec<f64>,
    pub anomaly: Option<PathAnomaly>,
}

/// Variance traces for the first `num_paths` paths of a run.
#[cfg(test)]
pub(crate) fn simulate_variance(
    grid: &SimulationGrid,
    params: &HestonParameters,
    spot: f64,
    curve: &dyn YieldCurve,
    dividend_curve: &dyn YieldCurve,
    num_paths: usize,
    config: &SimulationConfig,
) -> Result<Vec<VarianceTrace>> {
    let simulator = PathSimulator::new(grid, *params, spot, curve, dividend_curve, *config)?;
    let len = simulator.path_len();
    Ok((0..num_paths)
        .into_par_iter()
        .map(|index| {
            let mut levels = vec![0.0; len];
            let mut steps = Vec::new();
            let anomaly = simulator.fill_path_observing_variance(index, &mut levels, |fed, next| {
                steps.push(VarianceStep { fed, next })
            });
            VarianceTrace {
                steps,
                levels,
                anomaly,
            }
        })
        .collect())
}
