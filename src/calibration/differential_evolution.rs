//! Differential evolution (best/1/bin with dithering).
//!
//! Trial vectors live in the unit hypercube and are scaled to the bounds for
//! evaluation. Each generation is built sequentially from the seeded RNG and
//! then evaluated as a whole (in parallel when enabled), so results do not
//! depend on the number of worker threads.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::calibration::config::OptimizationConfig;
use crate::calibration::optimizer::{lbfgsb_polish, Objective, OptimizationOutcome, Optimizer};

#[derive(Debug, Clone)]
pub struct DifferentialEvolution {
    config: OptimizationConfig,
}

impl DifferentialEvolution {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    fn evaluate(&self, objective: &Objective<'_>, candidates: &[Vec<f64>]) -> Vec<f64> {
        let eval = |x: &Vec<f64>| {
            let value = objective(x.as_slice());
            if value.is_finite() {
                value
            } else {
                f64::INFINITY
            }
        };
        if self.config.differential_evolution.parallel_eval {
            candidates.par_iter().map(eval).collect()
        } else {
            candidates.iter().map(eval).collect()
        }
    }
}

fn scale(unit: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    unit.iter()
        .zip(bounds)
        .map(|(u, (lo, hi))| lo + u * (hi - lo))
        .collect()
}

fn unscale(x: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(bounds)
        .map(|(v, (lo, hi))| ((v - lo) / (hi - lo)).clamp(0.0, 1.0))
        .collect()
}

/// Latin hypercube initialisation: each dimension is split into `n` strata
/// and every stratum receives exactly one member.
fn latin_hypercube(n: usize, dim: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut population = vec![vec![0.0; dim]; n];
    let segment = 1.0 / n as f64;
    for d in 0..dim {
        let mut strata: Vec<usize> = (0..n).collect();
        // Fisher-Yates
        for i in (1..n).rev() {
            let j = rng.gen_range(0..=i);
            strata.swap(i, j);
        }
        for (member, stratum) in population.iter_mut().zip(strata) {
            member[d] = (stratum as f64 + rng.gen::<f64>()) * segment;
        }
    }
    population
}

fn spread_converged(energies: &[f64], tol: f64, atol: f64) -> bool {
    if energies.iter().any(|e| !e.is_finite()) {
        return false;
    }
    let n = energies.len() as f64;
    let mean = energies.iter().sum::<f64>() / n;
    let std = (energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n).sqrt();
    std <= atol + tol * mean.abs()
}

impl Optimizer for DifferentialEvolution {
    fn name(&self) -> &str {
        "differential_evolution"
    }

    fn minimize(
        &self,
        objective: &Objective<'_>,
        bounds: &[(f64, f64)],
        initial_guess: Option<&[f64]>,
    ) -> OptimizationOutcome {
        let de = &self.config.differential_evolution;
        let dim = bounds.len();
        let pop_size = (de.population_factor * dim).max(5);
        let deadline = self
            .config
            .max_duration_secs
            .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));

        let mut rng = StdRng::seed_from_u64(de.seed);
        let mut population = latin_hypercube(pop_size, dim, &mut rng);
        if let Some(guess) = initial_guess {
            population[0] = unscale(guess, bounds);
        }

        let scaled: Vec<Vec<f64>> = population.iter().map(|u| scale(u, bounds)).collect();
        let mut energies = self.evaluate(objective, &scaled);

        let best_index = |energies: &[f64]| {
            energies
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0)
        };

        let mut converged = false;
        let mut message = format!("generation budget of {} exhausted", self.config.max_gen);

        for generation in 0..self.config.max_gen {
            if spread_converged(&energies, de.tol, de.atol) {
                converged = true;
                message = format!("population converged after {generation} generations");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                message = format!("time budget exhausted after {generation} generations");
                break;
            }

            let best = population[best_index(&energies)].clone();
            let f = rng.gen_range(de.mutation.0..=de.mutation.1);

            let trials: Vec<Vec<f64>> = (0..pop_size)
                .map(|i| {
                    let (r1, r2) = loop {
                        let r1 = rng.gen_range(0..pop_size);
                        let r2 = rng.gen_range(0..pop_size);
                        if r1 != r2 && r1 != i && r2 != i {
                            break (r1, r2);
                        }
                    };
                    let forced = rng.gen_range(0..dim);
                    (0..dim)
                        .map(|d| {
                            let value = if d == forced || rng.gen::<f64>() < de.recombination {
                                best[d] + f * (population[r1][d] - population[r2][d])
                            } else {
                                population[i][d]
                            };
                            if (0.0..=1.0).contains(&value) {
                                value
                            } else {
                                rng.gen::<f64>()
                            }
                        })
                        .collect()
                })
                .collect();

            let scaled: Vec<Vec<f64>> = trials.iter().map(|u| scale(u, bounds)).collect();
            let trial_energies = self.evaluate(objective, &scaled);

            for (i, (trial, energy)) in trials.into_iter().zip(trial_energies).enumerate() {
                if energy <= energies[i] {
                    population[i] = trial;
                    energies[i] = energy;
                }
            }

            if generation % 50 == 0 {
                debug!(
                    generation,
                    best = energies[best_index(&energies)],
                    "differential evolution progress"
                );
            }
        }

        let best = best_index(&energies);
        let best_params = scale(&population[best], bounds);
        let best_value = energies[best];

        let (best_value, best_params) = if self.config.lbfgsb_enabled && best_value.is_finite() {
            lbfgsb_polish(objective, bounds, best_params, best_value, &self.config)
        } else {
            (best_value, best_params)
        };

        OptimizationOutcome {
            best_params,
            best_value,
            converged,
            message,
        }
    }
}
