use serde::{Deserialize, Serialize};

/// Global optimizer used by the calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// CMA-ES global search followed by optional L-BFGS-B refinement
    #[default]
    Cmaes,
    /// Differential evolution (best/1/bin) followed by optional L-BFGS-B polish
    DifferentialEvolution,
}

/// CMA-ES specific configuration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CmaEsConfig {
    /// Random seed for reproducibility
    pub seed: Option<u64>,
    /// Whether to evaluate the population in parallel
    pub parallel_eval: bool,
    /// Number of IPOP restarts (0 = no IPOP)
    pub ipop_restarts: usize,
    /// Factor to increase population size in IPOP restarts
    pub ipop_increase_factor: f64,
    /// Number of BIPOP restarts (0 = no BIPOP)
    pub bipop_restarts: usize,
    /// Total function evaluations budget
    pub total_evals_budget: usize,
    /// Whether to use advanced sub-run budgeting logic
    pub use_subrun_budgeting: bool,
}

impl Default for CmaEsConfig {
    fn default() -> Self {
        Self {
            seed: Some(123456),
            parallel_eval: true,
            ipop_restarts: 0,
            ipop_increase_factor: 2.0,
            bipop_restarts: 5,
            total_evals_budget: 200000,
            use_subrun_budgeting: false,
        }
    }
}

/// Differential evolution configuration, defaults mirroring the classic
/// best/1/bin setup with dithered mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferentialEvolutionConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Population size = `population_factor * dimension` (at least 5)
    pub population_factor: usize,
    /// Dithering range for the mutation factor, redrawn every generation
    pub mutation: (f64, f64),
    /// Binomial crossover probability
    pub recombination: f64,
    /// Relative convergence tolerance on the population's objective spread
    pub tol: f64,
    /// Absolute convergence tolerance on the population's objective spread
    pub atol: f64,
    /// Whether to evaluate each generation in parallel
    pub parallel_eval: bool,
}

impl Default for DifferentialEvolutionConfig {
    fn default() -> Self {
        Self {
            seed: 123456,
            population_factor: 15,
            mutation: (0.5, 1.0),
            recombination: 0.7,
            tol: 0.01,
            atol: 0.0,
            parallel_eval: true,
        }
    }
}

/// Main configuration struct for optimization
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OptimizationConfig {
    /// Which global optimizer to run
    #[serde(default)]
    pub optimizer: OptimizerKind,

    /// L-BFGS-B convergence tolerance
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Population size for CMA-ES
    #[serde(default = "default_pop_size")]
    pub pop_size: usize,

    /// Maximum generations for evolutionary algorithms
    #[serde(default = "default_max_gen")]
    pub max_gen: usize,

    /// Objective value at or below which a fit counts as converged
    #[serde(default = "default_obj_tol")]
    pub obj_tol: f64,

    /// Enable L-BFGS-B refinement after the global search?
    #[serde(default = "default_lbfgsb_enabled")]
    pub lbfgsb_enabled: bool,

    /// Max iterations for L-BFGS-B
    #[serde(default = "default_lbfgsb_max_iterations")]
    pub lbfgsb_max_iterations: usize,

    /// Wall-clock budget in seconds for the global search (checked between
    /// generations by differential evolution)
    #[serde(default)]
    pub max_duration_secs: Option<f64>,

    /// CMA-ES specific configuration
    #[serde(default)]
    pub cmaes: CmaEsConfig,

    /// Differential evolution specific configuration
    #[serde(default)]
    pub differential_evolution: DifferentialEvolutionConfig,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerKind::default(),
            tolerance: default_tolerance(),
            pop_size: default_pop_size(),
            max_gen: default_max_gen(),
            obj_tol: default_obj_tol(),
            lbfgsb_enabled: default_lbfgsb_enabled(),
            lbfgsb_max_iterations: default_lbfgsb_max_iterations(),
            max_duration_secs: None,
            cmaes: CmaEsConfig::default(),
            differential_evolution: DifferentialEvolutionConfig::default(),
        }
    }
}

impl OptimizationConfig {
    /// Default configuration for production calibration with high accuracy
    pub fn production() -> Self {
        Self {
            tolerance: 1e-8,
            pop_size: 25,
            max_gen: 200,
            obj_tol: 1e-6,
            cmaes: CmaEsConfig {
                total_evals_budget: 200000,
                ..CmaEsConfig::default()
            },
            ..Self::default()
        }
    }

    /// Fast configuration for development and testing
    pub fn fast() -> Self {
        Self {
            tolerance: 1e-6,
            pop_size: 20,
            max_gen: 60,
            obj_tol: 1e-5,
            lbfgsb_max_iterations: 100,
            cmaes: CmaEsConfig {
                total_evals_budget: 20000,
                bipop_restarts: 2,
                ..CmaEsConfig::default()
            },
            ..Self::default()
        }
    }

    /// High-precision configuration for research and backtesting
    pub fn research() -> Self {
        Self {
            tolerance: 1e-9,
            pop_size: 50,
            max_gen: 1000,
            obj_tol: 1e-8,
            lbfgsb_max_iterations: 500,
            cmaes: CmaEsConfig {
                total_evals_budget: 1000000,
                bipop_restarts: 5,
                ipop_restarts: 3,
                ..CmaEsConfig::default()
            },
            ..Self::default()
        }
    }

    /// Minimal configuration for quick validation and debugging
    pub fn minimal() -> Self {
        Self {
            tolerance: 1e-4,
            pop_size: 10,
            max_gen: 20,
            obj_tol: 1e-4,
            lbfgsb_enabled: false,
            cmaes: CmaEsConfig {
                total_evals_budget: 2000,
                bipop_restarts: 1,
                ..CmaEsConfig::default()
            },
            ..Self::default()
        }
    }

    /// The scipy-style differential evolution setup used by the original
    /// autocallable driver: best/1/bin, popsize 15, up to 1000 generations.
    pub fn differential_evolution() -> Self {
        Self {
            optimizer: OptimizerKind::DifferentialEvolution,
            max_gen: 1000,
            ..Self::default()
        }
    }
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_pop_size() -> usize {
    25
}

fn default_max_gen() -> usize {
    100
}

fn default_obj_tol() -> f64 {
    1e-6
}

fn default_lbfgsb_enabled() -> bool {
    true
}

fn default_lbfgsb_max_iterations() -> usize {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: OptimizationConfig = toml::from_str(
            r#"
            optimizer = "differential_evolution"
            max_gen = 250

            [differential_evolution]
            seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.optimizer, OptimizerKind::DifferentialEvolution);
        assert_eq!(config.max_gen, 250);
        assert_eq!(config.differential_evolution.seed, 7);
        assert_eq!(config.differential_evolution.population_factor, 15);
        assert_eq!(config.tolerance, default_tolerance());
        assert_eq!(config.cmaes.total_evals_budget, CmaEsConfig::default().total_evals_budget);
    }

    #[test]
    fn test_presets_are_ordered_by_effort() {
        let minimal = OptimizationConfig::minimal();
        let fast = OptimizationConfig::fast();
        let research = OptimizationConfig::research();
        assert!(minimal.cmaes.total_evals_budget < fast.cmaes.total_evals_budget);
        assert!(fast.cmaes.total_evals_budget < research.cmaes.total_evals_budget);
        assert!(!minimal.lbfgsb_enabled);
    }
}
