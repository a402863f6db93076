//! Injectable box-constrained optimizers.
//!
//! The calibrator only sees the [`Optimizer`] trait, so tests can swap in a
//! deterministic stand-in and production code can choose between CMA-ES and
//! differential evolution through [`OptimizationConfig`].

use cmaes_lbfgsb::cmaes::{canonical_cmaes_optimize, CmaesCanonicalConfig};
use cmaes_lbfgsb::lbfgsb_optimize::lbfgsb_optimize;
use tracing::debug;

use crate::calibration::config::{OptimizationConfig, OptimizerKind};
use crate::calibration::differential_evolution::DifferentialEvolution;

/// Objective handed to an optimizer: a pure function of the trial vector.
pub type Objective<'a> = dyn Fn(&[f64]) -> f64 + Sync + 'a;

/// What an optimizer found.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub best_params: Vec<f64>,
    pub best_value: f64,
    /// Whether the optimizer's own stopping criterion was met (as opposed to
    /// running out of budget)
    pub converged: bool,
    /// Human-readable termination reason
    pub message: String,
}

/// Global, derivative-free, box-constrained minimizer.
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &str;

    /// Minimize `objective` over the box `bounds`, optionally starting from
    /// `initial_guess`. Must not panic on a non-converging problem.
    fn minimize(
        &self,
        objective: &Objective<'_>,
        bounds: &[(f64, f64)],
        initial_guess: Option<&[f64]>,
    ) -> OptimizationOutcome;
}

/// Builds the optimizer selected in `config`.
pub fn build_optimizer(config: &OptimizationConfig) -> Box<dyn Optimizer> {
    match config.optimizer {
        OptimizerKind::Cmaes => Box::new(CmaesOptimizer::new(config.clone())),
        OptimizerKind::DifferentialEvolution => {
            Box::new(DifferentialEvolution::new(config.clone()))
        }
    }
}

/// Local L-BFGS-B refinement of `start`. Returns the refined point only if it
/// improves on `start_value`.
pub(crate) fn lbfgsb_polish(
    objective: &Objective<'_>,
    bounds: &[(f64, f64)],
    start: Vec<f64>,
    start_value: f64,
    config: &OptimizationConfig,
) -> (f64, Vec<f64>) {
    let obj_fn = |x: &[f64]| objective(x);
    let verbose = tracing::enabled!(tracing::Level::DEBUG);

    let mut refined_solution = start.clone();
    let refine_res = lbfgsb_optimize(
        &mut refined_solution,
        bounds,
        &obj_fn,
        config.lbfgsb_max_iterations,
        config.tolerance,
        if verbose {
            Some(|_current_x: &[f64], current_obj: f64| {
                debug!(objective = current_obj, "L-BFGS-B iteration");
            })
        } else {
            None
        },
        None, // Use default config
    );

    match refine_res {
        Ok((loc_obj, loc_sol)) => {
            if loc_obj < start_value {
                debug!(
                    before = start_value,
                    after = loc_obj,
                    "L-BFGS-B improved objective"
                );
                (loc_obj, loc_sol)
            } else {
                debug!("L-BFGS-B did not improve objective, keeping global solution");
                (start_value, start)
            }
        }
        Err(e) => {
            debug!(error = ?e, "L-BFGS-B failed, keeping global solution");
            (start_value, start)
        }
    }
}

/// CMA-ES global search (BIPOP/IPOP restarts) with optional L-BFGS-B refinement.
#[derive(Debug, Clone)]
pub struct CmaesOptimizer {
    config: OptimizationConfig,
}

impl CmaesOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }
}

impl Optimizer for CmaesOptimizer {
    fn name(&self) -> &str {
        "cmaes"
    }

    fn minimize(
        &self,
        objective: &Objective<'_>,
        bounds: &[(f64, f64)],
        initial_guess: Option<&[f64]>,
    ) -> OptimizationOutcome {
        let config = &self.config;
        let obj_fn = |x: &[f64]| objective(x);

        let cmaes_config = CmaesCanonicalConfig {
            population_size: config.pop_size,
            max_generations: config.max_gen,
            seed: config.cmaes.seed.unwrap_or(123456),
            c1: None,
            c_mu: None,
            c_sigma: None,
            d_sigma: None,
            parallel_eval: config.cmaes.parallel_eval,
            verbosity: 0,
            ipop_restarts: config.cmaes.ipop_restarts,
            ipop_increase_factor: config.cmaes.ipop_increase_factor,
            bipop_restarts: config.cmaes.bipop_restarts,
            total_evals_budget: config.cmaes.total_evals_budget,
            use_subrun_budgeting: config.cmaes.use_subrun_budgeting,
            alpha_mu: None,
            hsig_threshold_factor: None,
            bipop_small_population_factor: None,
            bipop_small_budget_factor: None,
            bipop_large_budget_factor: None,
            bipop_large_pop_increase_factor: None,
            max_bound_iterations: None,
            eig_precision_threshold: None,
            min_eig_value: None,
            matrix_op_threshold: None,
            stagnation_limit: None,
            min_sigma: None,
        };

        match initial_guess {
            Some(guess) => debug!(
                initial_objective = obj_fn(guess),
                "launching CMA-ES around the initial guess"
            ),
            None => debug!("no initial guess, running full CMA-ES with restarts"),
        }

        let cmaes_result = canonical_cmaes_optimize(
            obj_fn,
            bounds,
            cmaes_config,
            initial_guess.map(|g| g.to_vec()),
        );

        // Re-evaluate the reported solution with the objective itself
        let (_, best_sol) = cmaes_result.best_solution;
        let best_obj = objective(&best_sol);

        let (best_value, best_params) = if config.lbfgsb_enabled {
            lbfgsb_polish(objective, bounds, best_sol, best_obj, config)
        } else {
            (best_obj, best_sol)
        };

        let converged = best_value.is_finite() && best_value <= config.obj_tol;
        let message = if converged {
            format!("objective {:.3e} within tolerance {:.3e}", best_value, config.obj_tol)
        } else {
            format!(
                "objective {:.3e} above tolerance {:.3e} after CMA-ES budget",
                best_value, config.obj_tol
            )
        };

        OptimizationOutcome {
            best_params,
            best_value,
            converged,
            message,
        }
    }
}
