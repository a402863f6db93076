use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tracing::{debug, info};

use crate::calibration::optimizer::{OptimizationOutcome, Optimizer};
use crate::calibration::types::ModelCalibrator;

/// Optimizer outcome plus the number of objective evaluations it spent.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub outcome: OptimizationOutcome,
    pub evaluations: usize,
}

/// Runs `optimizer` over the model's objective inside its parameter box.
///
/// The objective stays a pure function of the trial vector; the only shared
/// state is an atomic evaluation counter.
pub fn calibrate_model(
    model: &dyn ModelCalibrator,
    optimizer: &dyn Optimizer,
    initial_guess: Option<&[f64]>,
) -> PipelineOutcome {
    let bounds = model.param_bounds();
    let evaluations = AtomicUsize::new(0);
    let obj_fn = |x: &[f64]| {
        evaluations.fetch_add(1, Ordering::Relaxed);
        model.evaluate_objective(x)
    };

    info!(
        model = model.model_name(),
        optimizer = optimizer.name(),
        params = ?model.param_names(),
        "starting calibration"
    );
    let started = Instant::now();

    let outcome = optimizer.minimize(&obj_fn, bounds, initial_guess);
    let evaluations = evaluations.load(Ordering::Relaxed);

    info!(
        model = model.model_name(),
        objective = outcome.best_value,
        converged = outcome.converged,
        evaluations,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "calibration finished"
    );
    debug!(params = ?outcome.best_params, message = %outcome.message, "best parameters");

    PipelineOutcome {
        outcome,
        evaluations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::optimizer::Objective;

    struct Quadratic {
        bounds: Vec<(f64, f64)>,
    }

    impl ModelCalibrator for Quadratic {
        fn model_name(&self) -> &str {
            "quadratic"
        }

        fn param_count(&self) -> usize {
            2
        }

        fn param_bounds(&self) -> &[(f64, f64)] {
            &self.bounds
        }

        fn evaluate_objective(&self, x: &[f64]) -> f64 {
            (x[0] - 0.5).powi(2) + (x[1] + 0.25).powi(2)
        }

        fn param_names(&self) -> Vec<&str> {
            vec!["x", "y"]
        }
    }

    /// Evaluates a fixed list of candidates and keeps the best one.
    struct GridSearch {
        candidates: Vec<Vec<f64>>,
    }

    impl Optimizer for GridSearch {
        fn name(&self) -> &str {
            "grid"
        }

        fn minimize(
            &self,
            objective: &Objective<'_>,
            _bounds: &[(f64, f64)],
            _initial_guess: Option<&[f64]>,
        ) -> OptimizationOutcome {
            let (best_params, best_value) = self
                .candidates
                .iter()
                .map(|c| (c.clone(), objective(c.as_slice())))
                .fold((Vec::new(), f64::INFINITY), |best, cur| {
                    if cur.1 < best.1 {
                        cur
                    } else {
                        best
                    }
                });
            OptimizationOutcome {
                best_params,
                best_value,
                converged: true,
                message: "grid exhausted".to_string(),
            }
        }
    }

    #[test]
    fn test_counts_every_objective_evaluation() {
        let model = Quadratic {
            bounds: vec![(-1.0, 1.0), (-1.0, 1.0)],
        };
        let optimizer = GridSearch {
            candidates: vec![vec![0.0, 0.0], vec![0.5, -0.25], vec![1.0, 1.0]],
        };

        let result = calibrate_model(&model, &optimizer, None);
        assert_eq!(result.evaluations, 3);
        assert_eq!(result.outcome.best_params, vec![0.5, -0.25]);
        assert_eq!(result.outcome.best_value, 0.0);
    }
}
